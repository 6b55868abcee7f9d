//! termhist-store: tiered storage and scrollable view engine for terminal
//! history.
//!
//! A stream of cell writes from a VT parser lands in [`MemoryBuffer`], a
//! ring-buffered hot tier. [`AdaptivePersistence`] watches the write rate
//! and drains dirty lines into a [`WriteAheadLog`], which periodically
//! checkpoints into [`PageStore`] — durable, page-organized storage for
//! everything that has scrolled out of memory. [`viewport::ViewportWindow`]
//! reads through a [`content_reader::ContentReader`] (memory first, disk on
//! fallback) and uses [`PhysicalLineIndex`] to turn a scroll offset into a
//! wrapped, rendered grid in `O(log n)`.
//!
//! [`bridge::HistoryBridge`] is the thin object a VT parser actually talks
//! to: it owns one of each of the above and exposes write/resize/scroll
//! operations.
//!
//! # Example
//!
//! ```no_run
//! use termhist_store::{HistoryConfig, HistoryBridge};
//! use termhist_model::{CellAttrs, Color};
//!
//! let config = HistoryConfig::for_terminal("/tmp/termhist", "session-1", 80);
//! let mut bridge = HistoryBridge::open(config, 80, 24).unwrap();
//! bridge.write('h' as u32, Color::Default, Color::Default, CellAttrs::empty());
//! let grid = bridge.get_visible_grid();
//! assert_eq!(grid.len(), 24);
//! ```

mod bridge;
mod config;
mod content_reader;
mod error;
mod memory_buffer;
mod page_store;
mod persistence;
mod physical_line_index;
mod viewport;
mod wal;

pub use bridge::{HistoryBridge, SearchHighlight};
pub use config::{HistoryConfig, MemoryBufferConfig, PageStoreConfig, PersistenceConfig, WalConfig};
pub use content_reader::{ContentReader, MemoryBufferReader};
pub use error::{Error, Result};
pub use memory_buffer::MemoryBuffer;
pub use page_store::PageStore;
pub use persistence::{AdaptivePersistence, LineSource, Metrics, Mode, ModeController, OnLineIndexed, RateMonitor};
pub use physical_line_index::{phys_count, PhysicalLineIndex};
pub use viewport::{CoordinateMapper, Grid, PhysicalLine, PhysicalLineBuilder, ScrollManager, ViewportCache, ViewportWindow};
pub use wal::{ViewportState, WriteAheadLog};
