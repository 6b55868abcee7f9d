//! Per-component configuration.
//!
//! Each component gets a small builder-style config struct with sane
//! defaults, following the `AgentConfig::new(...).with_x(...)` pattern.
//! Loading these from a file or CLI flags is outside this crate's scope —
//! callers construct them in code.

use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// MemoryBufferConfig
// =============================================================================

/// Configuration for [`crate::memory_buffer::MemoryBuffer`].
#[derive(Debug, Clone)]
pub struct MemoryBufferConfig {
    pub max_lines: usize,
    pub eviction_batch: usize,
    pub term_width: usize,
}

impl MemoryBufferConfig {
    pub const DEFAULT_MAX_LINES: usize = 2000;
    pub const DEFAULT_EVICTION_BATCH: usize = 256;

    pub fn new(term_width: usize) -> Self {
        Self {
            max_lines: Self::DEFAULT_MAX_LINES,
            eviction_batch: Self::DEFAULT_EVICTION_BATCH,
            term_width,
        }
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines.max(1);
        self
    }

    pub fn with_eviction_batch(mut self, eviction_batch: usize) -> Self {
        self.eviction_batch = eviction_batch.max(1);
        self
    }
}

impl Default for MemoryBufferConfig {
    fn default() -> Self {
        Self::new(80)
    }
}

// =============================================================================
// PageStoreConfig
// =============================================================================

/// Configuration for [`crate::page_store::PageStore`].
#[derive(Debug, Clone)]
pub struct PageStoreConfig {
    pub base_dir: PathBuf,
    pub target_page_size: usize,
}

impl PageStoreConfig {
    pub const DEFAULT_TARGET_PAGE_SIZE: usize = 64 * 1024;

    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            target_page_size: Self::DEFAULT_TARGET_PAGE_SIZE,
        }
    }

    pub fn with_target_page_size(mut self, size: usize) -> Self {
        self.target_page_size = size.max(1);
        self
    }
}

// =============================================================================
// WalConfig
// =============================================================================

/// Configuration for [`crate::wal::WriteAheadLog`].
#[derive(Debug, Clone)]
pub struct WalConfig {
    pub path: PathBuf,
    pub checkpoint_size_threshold: u64,
    pub checkpoint_interval: Duration,
}

impl WalConfig {
    pub const DEFAULT_CHECKPOINT_SIZE: u64 = 4 * 1024 * 1024;
    pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            checkpoint_size_threshold: Self::DEFAULT_CHECKPOINT_SIZE,
            checkpoint_interval: Self::DEFAULT_CHECKPOINT_INTERVAL,
        }
    }

    /// A threshold of `0` disables the size-based trigger.
    pub fn with_checkpoint_size_threshold(mut self, bytes: u64) -> Self {
        self.checkpoint_size_threshold = bytes;
        self
    }

    /// An interval of zero disables the interval-based trigger.
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }
}

// =============================================================================
// PersistenceConfig
// =============================================================================

/// Configuration for [`crate::persistence::AdaptivePersistence`].
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Writes/s below which mode is WriteThrough.
    pub write_through_max: f64,
    /// Writes/s at or above which mode is BestEffort.
    pub debounced_max: f64,
    /// Debounce delay at `write_through_max`.
    pub debounce_min: Duration,
    /// Debounce delay at `debounced_max`.
    pub debounce_max: Duration,
    /// Silence duration after which pending lines are force-flushed.
    pub idle_threshold: Duration,
    /// Number of timestamps kept by the rate monitor's ring.
    pub rate_window_capacity: usize,
}

impl PersistenceConfig {
    pub const DEFAULT_WRITE_THROUGH_MAX: f64 = 10.0;
    pub const DEFAULT_DEBOUNCED_MAX: f64 = 100.0;
    pub const DEFAULT_DEBOUNCE_MIN: Duration = Duration::from_millis(50);
    pub const DEFAULT_DEBOUNCE_MAX: Duration = Duration::from_millis(500);
    pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(1);
    pub const DEFAULT_RATE_WINDOW_CAPACITY: usize = 1000;

    pub fn with_write_through_max(mut self, v: f64) -> Self {
        self.write_through_max = v;
        self
    }

    pub fn with_debounced_max(mut self, v: f64) -> Self {
        self.debounced_max = v;
        self
    }

    pub fn with_idle_threshold(mut self, d: Duration) -> Self {
        self.idle_threshold = d;
        self
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            write_through_max: Self::DEFAULT_WRITE_THROUGH_MAX,
            debounced_max: Self::DEFAULT_DEBOUNCED_MAX,
            debounce_min: Self::DEFAULT_DEBOUNCE_MIN,
            debounce_max: Self::DEFAULT_DEBOUNCE_MAX,
            idle_threshold: Self::DEFAULT_IDLE_THRESHOLD,
            rate_window_capacity: Self::DEFAULT_RATE_WINDOW_CAPACITY,
        }
    }
}

// =============================================================================
// HistoryConfig
// =============================================================================

/// Aggregate configuration for the integration bridge.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub memory: MemoryBufferConfig,
    pub page_store: PageStoreConfig,
    pub wal: WalConfig,
    pub persistence: PersistenceConfig,
    /// Extra lines loaded past viewport height on first resize (see
    /// the bridge's history-preload behavior).
    pub preload_margin: usize,
}

impl HistoryConfig {
    pub const DEFAULT_PRELOAD_MARGIN: usize = 500;

    /// Lays out `wal.log` and `pages/` under `<base_dir>/terminals/<terminal_id>/`.
    pub fn for_terminal(base_dir: impl Into<PathBuf>, terminal_id: &str, term_width: usize) -> Self {
        let root = base_dir.into().join("terminals").join(terminal_id);
        Self {
            memory: MemoryBufferConfig::new(term_width),
            page_store: PageStoreConfig::new(root.join("pages")),
            wal: WalConfig::new(root.join("wal.log")),
            persistence: PersistenceConfig::default(),
            preload_margin: Self::DEFAULT_PRELOAD_MARGIN,
        }
    }
}
