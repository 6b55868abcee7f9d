//! Wrapped, scrollable, cached read view over a `ContentReader`.

mod builder;
mod cache;
mod coords;
mod scroll;
mod window;

pub use builder::{PhysicalLine, PhysicalLineBuilder};
pub use cache::ViewportCache;
pub use coords::CoordinateMapper;
pub use scroll::ScrollManager;
pub use window::{Grid, ViewportWindow};
