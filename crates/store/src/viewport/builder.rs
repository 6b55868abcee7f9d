//! Wraps a logical line into one or more physical (viewport-width) rows.

use termhist_model::{Cell, LogicalLine};

/// One physical row: up to `width` cells, tagged with the logical line it
/// came from and the column offset within that line.
#[derive(Debug, Clone)]
pub struct PhysicalLine {
    pub cells: Vec<Cell>,
    pub logical_index: u64,
    pub offset: usize,
}

/// Stateless over `(width, show_overlay)` — a pure function of a logical
/// line to zero or more physical lines.
#[derive(Debug, Clone, Copy)]
pub struct PhysicalLineBuilder {
    width: usize,
    show_overlay: bool,
}

impl PhysicalLineBuilder {
    pub fn new(width: usize, show_overlay: bool) -> Self {
        Self { width: width.max(1), show_overlay }
    }

    pub fn set_width(&mut self, width: usize) {
        self.width = width.max(1);
    }

    pub fn set_show_overlay(&mut self, show_overlay: bool) {
        self.show_overlay = show_overlay;
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Builds the physical rows for one logical line, or `None` if the
    /// line is synthetic and overlays are off (callers filter these out).
    pub fn build_line(&self, line: Option<&LogicalLine>, global_idx: u64) -> Option<Vec<PhysicalLine>> {
        let line = match line {
            None => {
                return Some(vec![PhysicalLine { cells: Vec::new(), logical_index: global_idx, offset: 0 }]);
            }
            Some(l) => l,
        };

        if self.show_overlay {
            if let Some(overlay) = &line.overlay {
                return Some(vec![clip_or_pad(overlay, line.overlay_width as usize, global_idx)]);
            }
        } else if line.synthetic {
            return None;
        }

        if line.cells.is_empty() {
            return Some(vec![PhysicalLine { cells: Vec::new(), logical_index: global_idx, offset: 0 }]);
        }

        if line.fixed_width > 0 {
            return Some(vec![clip_or_pad(&line.cells, line.fixed_width as usize, global_idx)]);
        }

        Some(
            line.cells
                .chunks(self.width)
                .enumerate()
                .map(|(i, chunk)| PhysicalLine {
                    cells: chunk.to_vec(),
                    logical_index: global_idx,
                    offset: i * self.width,
                })
                .collect(),
        )
    }
}

fn clip_or_pad(cells: &[Cell], width: usize, global_idx: u64) -> PhysicalLine {
    let mut out = cells[..cells.len().min(width)].to_vec();
    out.resize(width, Cell::default());
    PhysicalLine { cells: out, logical_index: global_idx, offset: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termhist_model::{CellAttrs, Color};

    fn cells(n: usize) -> Vec<Cell> {
        (0..n).map(|_| Cell::new('x' as u32, Color::Default, Color::Default, CellAttrs::empty())).collect()
    }

    #[test]
    fn test_null_line_is_one_empty_row() {
        let b = PhysicalLineBuilder::new(80, false);
        let rows = b.build_line(None, 5).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].cells.is_empty());
    }

    #[test]
    fn test_synthetic_hidden_without_overlay_mode() {
        let b = PhysicalLineBuilder::new(80, false);
        let line = LogicalLine::empty().with_overlay(cells(3), 3).as_synthetic();
        assert!(b.build_line(Some(&line), 0).is_none());
    }

    #[test]
    fn test_overlay_shown_clips_to_overlay_width() {
        let b = PhysicalLineBuilder::new(80, true);
        let line = LogicalLine::from_cells(cells(10)).with_overlay(cells(5), 3);
        let rows = b.build_line(Some(&line), 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells.len(), 3);
    }

    #[test]
    fn test_fixed_width_pads() {
        let b = PhysicalLineBuilder::new(80, false);
        let line = LogicalLine::from_cells(cells(3)).with_fixed_width(10);
        let rows = b.build_line(Some(&line), 2).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells.len(), 10);
    }

    #[test]
    fn test_wraps_into_chunks() {
        let b = PhysicalLineBuilder::new(10, false);
        let line = LogicalLine::from_cells(cells(25));
        let rows = b.build_line(Some(&line), 7).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].offset, 0);
        assert_eq!(rows[1].offset, 10);
        assert_eq!(rows[2].cells.len(), 5);
        assert!(rows.iter().all(|r| r.logical_index == 7));
    }
}
