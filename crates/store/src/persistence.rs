//! Adaptive write scheduler sitting between the write stream and the WAL.
//!
//! Tracks the incoming write rate and picks one of three modes
//! (`WriteThrough`, `Debounced`, `BestEffort`), flushing dirty lines to the
//! WAL either immediately, after a debounce delay, or on an idle timeout.
//! The idle monitor runs on a background thread, grounded in the same
//! `thread::spawn` + `crossbeam_channel` idiom the PTY reader uses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use termhist_model::LogicalLine;
use tracing::{debug, info};

use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::wal::{ViewportState, WriteAheadLog};

/// Line-source callback: given a global index, return its current content
/// and a timestamp. `AdaptivePersistence` does not own `MemoryBuffer`, so
/// it asks the caller for content at flush time.
pub trait LineSource: Send + Sync {
    fn read_for_flush(&self, global_idx: u64) -> Option<(LogicalLine, u64)>;
}

/// Invoked after a line's APPEND record has been durably written.
pub type OnLineIndexed = Box<dyn Fn(u64, &LogicalLine, u64, bool) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    WriteThrough,
    Debounced,
    BestEffort,
}

/// Fixed-capacity ring of write timestamps used to estimate current rate.
pub struct RateMonitor {
    timestamps: VecDeque<Instant>,
    capacity: usize,
}

impl RateMonitor {
    pub fn new(capacity: usize) -> Self {
        Self { timestamps: VecDeque::with_capacity(capacity), capacity: capacity.max(1) }
    }

    pub fn record_write(&mut self, now: Instant) {
        if self.timestamps.len() == self.capacity {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(now);
    }

    /// `count_of_timestamps_after(now - window) / window_in_seconds`.
    /// Walks back from the head; stops at the first timestamp outside the
    /// window (assumes monotonic insertion).
    pub fn calculate_rate(&self, now: Instant, window: Duration) -> f64 {
        if window.is_zero() {
            return 0.0;
        }
        let cutoff = now.checked_sub(window).unwrap_or(now);
        let mut count = 0usize;
        for ts in self.timestamps.iter().rev() {
            if *ts < cutoff {
                break;
            }
            count += 1;
        }
        count as f64 / window.as_secs_f64()
    }

    pub fn reset(&mut self) {
        self.timestamps.clear();
    }
}

/// Pure functions mapping rate to mode and debounce delay.
pub struct ModeController;

impl ModeController {
    pub fn determine_mode(rate: f64, write_through_max: f64, debounced_max: f64) -> Mode {
        if rate < write_through_max {
            Mode::WriteThrough
        } else if rate < debounced_max {
            Mode::Debounced
        } else {
            Mode::BestEffort
        }
    }

    /// Linearly interpolates between `min` (at `write_through_max`) and
    /// `max` (at `debounced_max`); clamps outside that range.
    pub fn debounce_delay(rate: f64, write_through_max: f64, debounced_max: f64, min: Duration, max: Duration) -> Duration {
        if rate <= write_through_max {
            return min;
        }
        if rate >= debounced_max {
            return max;
        }
        let span = debounced_max - write_through_max;
        let t = if span > 0.0 { (rate - write_through_max) / span } else { 0.0 };
        let min_ns = min.as_nanos() as f64;
        let max_ns = max.as_nanos() as f64;
        Duration::from_nanos((min_ns + t * (max_ns - min_ns)) as u64)
    }
}

#[derive(Debug, Default, Clone)]
pub struct Metrics {
    pub total_writes_received: u64,
    pub total_flushes: u64,
    pub lines_written: u64,
    pub mode_transitions: u64,
    pub failed_writes: u64,
}

struct Inner {
    wal: WriteAheadLog,
    rate_monitor: RateMonitor,
    mode: Mode,
    pending: std::collections::BTreeSet<u64>,
    last_activity: Instant,
    /// One-shot cancellable debounce deadline: every Debounced-mode write
    /// overwrites it with `now + debounce_delay(rate, ...)`, which is what
    /// "reschedule on new write" means in practice. `None` once drained or
    /// while not in Debounced mode.
    debounce_deadline: Option<Instant>,
    latest_metadata: Option<ViewportState>,
    last_written_metadata: Option<ViewportState>,
    metrics: Metrics,
    config: PersistenceConfig,
    on_line_indexed: Option<OnLineIndexed>,
    closed: bool,
}

impl Inner {
    fn refresh_mode(&mut self, now: Instant) -> f64 {
        // writes/s over a fixed 1-second window; `rate_window_capacity`
        // only bounds how many timestamps the ring retains.
        let rate = self.rate_monitor.calculate_rate(now, Duration::from_secs(1));
        let new_mode = ModeController::determine_mode(rate, self.config.write_through_max, self.config.debounced_max);
        if new_mode != self.mode {
            self.metrics.mode_transitions += 1;
            debug!(?new_mode, rate, "persistence mode transition");
            self.mode = new_mode;
            if new_mode != Mode::Debounced {
                self.debounce_deadline = None;
            }
        }
        rate
    }

    fn flush_one(&mut self, source: &dyn LineSource, global_idx: u64) {
        if let Some((line, timestamp)) = source.read_for_flush(global_idx) {
            match self.wal.append(global_idx, line.clone(), timestamp) {
                Ok(()) => {
                    self.metrics.lines_written += 1;
                    if let Some(cb) = &self.on_line_indexed {
                        cb(global_idx, &line, timestamp, false);
                    }
                }
                Err(e) => {
                    self.metrics.failed_writes += 1;
                    tracing::warn!(global_idx, error = %e, "wal append failed");
                }
            }
        }
    }

    /// Drains `pending` (sorted ascending), then flushes metadata if it has
    /// changed since the last write — metadata always follows content.
    fn flush_pending(&mut self, source: &dyn LineSource) -> Result<()> {
        self.debounce_deadline = None;
        let indices: Vec<u64> = self.pending.iter().copied().collect();
        self.pending.clear();
        for g in indices {
            self.flush_one(source, g);
        }
        self.metrics.total_flushes += 1;

        if let Some(state) = self.latest_metadata.clone() {
            let changed = self.last_written_metadata.as_ref() != Some(&state);
            if changed {
                self.wal.write_metadata(state.clone())?;
                self.last_written_metadata = Some(state);
            }
        }
        Ok(())
    }
}

/// Shared handle to the idle-monitor background thread's stop signal.
struct IdleMonitorHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

/// Sits between the write stream and the WAL, batching dirty lines
/// according to the current write rate.
pub struct AdaptivePersistence {
    inner: Arc<Mutex<Inner>>,
    idle: Mutex<Option<IdleMonitorHandle>>,
    closed_once: Arc<AtomicBool>,
}

impl AdaptivePersistence {
    pub fn new(config: PersistenceConfig, wal: WriteAheadLog) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            wal,
            rate_monitor: RateMonitor::new(config.rate_window_capacity),
            mode: Mode::WriteThrough,
            pending: std::collections::BTreeSet::new(),
            last_activity: Instant::now(),
            debounce_deadline: None,
            latest_metadata: None,
            last_written_metadata: None,
            metrics: Metrics::default(),
            config,
            on_line_indexed: None,
            closed: false,
        }));

        Self { inner, idle: Mutex::new(None), closed_once: Arc::new(AtomicBool::new(false)) }
    }

    pub fn set_on_line_indexed(&self, cb: OnLineIndexed) {
        self.inner.lock().unwrap().on_line_indexed = Some(cb);
    }

    /// Starts the background flush monitor. Idempotent; a second call is a
    /// no-op while one is already running. Serves two timers on one thread:
    /// the idle flush (pending lines force-flushed after silence) and the
    /// Debounced-mode one-shot deadline set by `notify_write_batch`. The
    /// wait is shortened to the nearer of the two so a pending debounce
    /// deadline still fires promptly rather than waiting out a full idle
    /// poll interval.
    pub fn start_idle_monitor(&self, source: Arc<dyn LineSource>) {
        let mut guard = self.idle.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let inner = Arc::clone(&self.inner);

        let join = thread::spawn(move || loop {
            let wait = {
                let i = inner.lock().unwrap();
                let base_poll = (i.config.idle_threshold / 2).max(Duration::from_millis(100));
                match i.debounce_deadline {
                    Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(base_poll),
                    None => base_poll,
                }
            };

            match stop_rx.recv_timeout(wait) {
                Ok(()) => break,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            }

            let mut i = inner.lock().unwrap();
            if i.closed {
                break;
            }
            let now = Instant::now();
            let debounce_due = i.mode == Mode::Debounced && i.debounce_deadline.is_some_and(|d| now >= d);
            let idle_due = !i.pending.is_empty() && i.last_activity.elapsed() >= i.config.idle_threshold;
            if debounce_due || idle_due {
                i.debounce_deadline = None;
                let _ = i.flush_pending(source.as_ref());
            }
        });

        *guard = Some(IdleMonitorHandle { stop_tx, join: Some(join) });
    }

    /// Reads a range spanning committed (PageStore) and still-pending
    /// (WAL) lines, for history preload on first resize.
    pub fn read_line_range(&self, start: u64, end: u64) -> Result<Vec<LogicalLine>> {
        self.inner.lock().unwrap().wal.read_line_range(start, end)
    }

    pub fn committed_line_count(&self) -> u64 {
        self.inner.lock().unwrap().wal.committed_line_count()
    }

    pub fn recovered_metadata(&self) -> Option<ViewportState> {
        self.inner.lock().unwrap().wal.recovered_metadata().cloned()
    }

    pub fn notify_write(&self, global_idx: u64, source: &dyn LineSource) -> Result<()> {
        self.notify_write_batch(&[global_idx], source)
    }

    pub fn notify_write_batch(&self, global_indices: &[u64], source: &dyn LineSource) -> Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.metrics.total_writes_received += global_indices.len() as u64;
        for _ in global_indices {
            inner.rate_monitor.record_write(now);
        }
        inner.last_activity = now;

        let rate = inner.refresh_mode(now);
        match inner.mode {
            Mode::WriteThrough => {
                for &g in global_indices {
                    inner.flush_one(source, g);
                }
                inner.metrics.total_flushes += 1;
                if let Some(state) = inner.latest_metadata.clone() {
                    let changed = inner.last_written_metadata.as_ref() != Some(&state);
                    if changed {
                        inner.wal.write_metadata(state.clone())?;
                        inner.last_written_metadata = Some(state);
                    }
                }
            }
            Mode::Debounced => {
                for &g in global_indices {
                    inner.pending.insert(g);
                }
                let delay = ModeController::debounce_delay(
                    rate,
                    inner.config.write_through_max,
                    inner.config.debounced_max,
                    inner.config.debounce_min,
                    inner.config.debounce_max,
                );
                inner.debounce_deadline = Some(now + delay);
            }
            Mode::BestEffort => {
                for &g in global_indices {
                    inner.pending.insert(g);
                }
                // No timer: BestEffort relies solely on the idle monitor.
                inner.debounce_deadline = None;
            }
        }
        Ok(())
    }

    pub fn notify_metadata_change(&self, state: ViewportState) {
        self.inner.lock().unwrap().latest_metadata = Some(state);
    }

    pub fn flush(&self, source: &dyn LineSource) -> Result<()> {
        self.inner.lock().unwrap().flush_pending(source)
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.lock().unwrap().metrics.clone()
    }

    pub fn current_mode(&self) -> Mode {
        self.inner.lock().unwrap().mode
    }

    /// Number of lines batched but not yet flushed to the WAL.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    /// Cancels the idle monitor, performs a final flush (including
    /// metadata), checkpoints, and closes the WAL. Idempotent.
    pub fn close(&self, source: &dyn LineSource) -> Result<()> {
        if self.closed_once.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(handle) = self.idle.lock().unwrap().take() {
            let _ = handle.stop_tx.send(());
            if let Some(join) = handle.join {
                let _ = join.join();
            }
        }

        let mut inner = self.inner.lock().unwrap();
        inner.flush_pending(source)?;
        inner.wal.checkpoint()?;
        inner.closed = true;
        info!("adaptive persistence closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PageStoreConfig, WalConfig};
    use crate::page_store::PageStore;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;
    use termhist_model::{Cell, CellAttrs, Color};

    struct MapSource(StdMutex<HashMap<u64, (LogicalLine, u64)>>);
    impl LineSource for MapSource {
        fn read_for_flush(&self, g: u64) -> Option<(LogicalLine, u64)> {
            self.0.lock().unwrap().get(&g).cloned()
        }
    }

    fn line(text: &str) -> LogicalLine {
        LogicalLine::from_cells(text.chars().map(|c| Cell::new(c as u32, Color::Default, Color::Default, CellAttrs::empty())).collect())
    }

    fn make_persistence(dir: &std::path::Path) -> AdaptivePersistence {
        let store = PageStore::create(PageStoreConfig::new(dir.join("pages"))).unwrap();
        let wal = WriteAheadLog::open(WalConfig::new(dir.join("wal.log")), store).unwrap();
        AdaptivePersistence::new(PersistenceConfig::default(), wal)
    }

    #[test]
    fn test_mode_controller_thresholds() {
        assert_eq!(ModeController::determine_mode(5.0, 10.0, 100.0), Mode::WriteThrough);
        assert_eq!(ModeController::determine_mode(50.0, 10.0, 100.0), Mode::Debounced);
        assert_eq!(ModeController::determine_mode(150.0, 10.0, 100.0), Mode::BestEffort);
    }

    #[test]
    fn test_debounce_delay_interpolates_and_clamps() {
        let min = Duration::from_millis(50);
        let max = Duration::from_millis(500);
        assert_eq!(ModeController::debounce_delay(5.0, 10.0, 100.0, min, max), min);
        assert_eq!(ModeController::debounce_delay(200.0, 10.0, 100.0, min, max), max);
        let mid = ModeController::debounce_delay(55.0, 10.0, 100.0, min, max);
        assert!(mid > min && mid < max);
    }

    #[test]
    fn test_rate_monitor_counts_within_window() {
        let mut rm = RateMonitor::new(100);
        let base = Instant::now();
        for i in 0..5 {
            rm.record_write(base + Duration::from_millis(i * 10));
        }
        let rate = rm.calculate_rate(base + Duration::from_millis(40), Duration::from_secs(1));
        assert!(rate > 0.0);
    }

    #[test]
    fn test_write_through_flushes_immediately() {
        let dir = tempdir().unwrap();
        let p = make_persistence(dir.path());
        let source = MapSource(StdMutex::new(HashMap::from([(0, (line("a"), 1))])));
        p.notify_write(0, &source).unwrap();
        assert_eq!(p.metrics().lines_written, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let p = make_persistence(dir.path());
        let source = MapSource(StdMutex::new(HashMap::new()));
        p.close(&source).unwrap();
        p.close(&source).unwrap();
    }

    #[test]
    fn test_debounce_deadline_drains_pending_without_explicit_flush() {
        let dir = tempdir().unwrap();
        let p = make_persistence(dir.path());
        let source: Arc<MapSource> = Arc::new(MapSource(StdMutex::new(
            (0..50).map(|i| (i, (line(&i.to_string()), i))).collect(),
        )));

        let indices: Vec<u64> = (0..50).collect();
        p.notify_write_batch(&indices, source.as_ref()).unwrap();
        assert_eq!(p.current_mode(), Mode::Debounced);
        assert!(p.pending_count() > 0);

        p.start_idle_monitor(Arc::clone(&source) as Arc<dyn LineSource>);
        // debounce_max defaults to 500ms; give the monitor ample margin.
        thread::sleep(Duration::from_millis(800));
        assert_eq!(p.pending_count(), 0);
        assert_eq!(p.metrics().lines_written, 50);

        p.close(source.as_ref()).unwrap();
    }
}
