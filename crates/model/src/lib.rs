//! termhist-model: the Cell / LogicalLine data model for terminal history.
//!
//! This crate has no I/O and no locking — it is the vocabulary shared by
//! the storage tiers (MemoryBuffer, PageStore, WriteAheadLog) and the view
//! layer (PhysicalLineIndex, ViewportWindow) in `termhist-store`.
//!
//! # Overview
//!
//! - [`Cell`]: a single styled character slot (codepoint, fg/bg, attrs).
//! - [`Color`]: the terminal's tagged color variants.
//! - [`CellAttrs`]: the bold/underline/reverse/wide bitmask.
//! - [`LogicalLine`]: an ordered run of cells, possibly wrapped across many
//!   physical rows, possibly carrying a pre-rendered overlay.
//!
//! # Example
//!
//! ```
//! use termhist_model::{Cell, CellAttrs, Color, LogicalLine};
//!
//! let cells = vec![
//!     Cell::new('h' as u32, Color::Default, Color::Default, CellAttrs::empty()),
//!     Cell::new('i' as u32, Color::Default, Color::Default, CellAttrs::BOLD),
//! ];
//! let line = LogicalLine::from_cells(cells);
//! assert_eq!(line.cells.len(), 2);
//! ```

mod cell;
mod line;

pub use cell::{Cell, CellAttrs, Color};
pub use line::LogicalLine;
