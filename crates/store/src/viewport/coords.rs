//! Maps between viewport (row, col) coordinates and content (global line,
//! char offset) coordinates, using the same windowing logic as the grid.

use crate::content_reader::ContentReader;
use crate::physical_line_index::PhysicalLineIndex;
use crate::viewport::builder::PhysicalLineBuilder;
use crate::viewport::scroll::ScrollManager;

pub struct CoordinateMapper;

impl CoordinateMapper {
    /// `(row, col)` at the given `height` -> `(global_idx, char_offset)`,
    /// clamped to the logical line's cell length. `None` if out of range.
    #[allow(clippy::too_many_arguments)]
    pub fn viewport_to_content(
        row: usize,
        col: usize,
        height: usize,
        scroll: &ScrollManager,
        index: &mut PhysicalLineIndex,
        builder: &PhysicalLineBuilder,
        reader: &dyn ContentReader,
    ) -> Option<(u64, usize)> {
        let (start_global, end_global) = scroll.visible_range(height, index, reader);
        let physical = build_window(start_global, end_global, builder, reader);

        let total = physical.len();
        let physical_start = total.saturating_sub(height);
        let phys_idx = physical_start + row;
        let phys_line = physical.get(phys_idx)?;

        let line_len = reader.get_line(phys_line.logical_index).map(|l| l.cells.len()).unwrap_or(0);
        let char_offset = (phys_line.offset + col).min(line_len);
        Some((phys_line.logical_index, char_offset))
    }

    /// Inverse of `viewport_to_content`: finds the physical row whose
    /// `[offset, offset+width)` contains `char_offset` for the given
    /// logical line. `None` if the line is not currently visible.
    #[allow(clippy::too_many_arguments)]
    pub fn content_to_viewport(
        global_idx: u64,
        char_offset: usize,
        height: usize,
        scroll: &ScrollManager,
        index: &mut PhysicalLineIndex,
        builder: &PhysicalLineBuilder,
        reader: &dyn ContentReader,
    ) -> Option<(usize, usize)> {
        let (start_global, end_global) = scroll.visible_range(height, index, reader);
        let physical = build_window(start_global, end_global, builder, reader);

        let total = physical.len();
        let physical_start = total.saturating_sub(height);
        let width = builder.width();

        for (phys_idx, p) in physical.iter().enumerate().skip(physical_start) {
            if p.logical_index != global_idx {
                continue;
            }
            let in_range = char_offset >= p.offset && char_offset < p.offset + width;
            let at_line_end = char_offset == p.offset + p.cells.len();
            if in_range || at_line_end {
                return Some((phys_idx - physical_start, char_offset - p.offset));
            }
        }
        None
    }
}

fn build_window(
    start_global: u64,
    end_global: u64,
    builder: &PhysicalLineBuilder,
    reader: &dyn ContentReader,
) -> Vec<crate::viewport::builder::PhysicalLine> {
    let mut out = Vec::new();
    for g in start_global..end_global {
        let line = reader.get_line(g);
        if let Some(rows) = builder.build_line(line.as_ref(), g) {
            out.extend(rows);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryBufferConfig;
    use crate::content_reader::MemoryBufferReader;
    use crate::memory_buffer::MemoryBuffer;
    use termhist_model::{CellAttrs, Color};

    #[test]
    fn test_roundtrip_viewport_to_content_and_back() {
        let mut mem = MemoryBuffer::new(MemoryBufferConfig::new(80).with_max_lines(100));
        for ch in "hello world".chars() {
            mem.write(ch as u32, Color::Default, Color::Default, CellAttrs::empty());
        }
        let reader = MemoryBufferReader::new(&mem);
        let mut index = crate::physical_line_index::PhysicalLineIndex::new(80, false);
        let builder = PhysicalLineBuilder::new(80, false);
        let scroll = ScrollManager::new(24);

        let (g, offset) = CoordinateMapper::viewport_to_content(0, 3, 24, &scroll, &mut index, &builder, &reader).unwrap();
        assert_eq!(g, 0);
        assert_eq!(offset, 3);

        let (row, col) = CoordinateMapper::content_to_viewport(g, offset, 24, &scroll, &mut index, &builder, &reader).unwrap();
        assert_eq!(row, 0);
        assert_eq!(col, 3);
    }

    #[test]
    fn test_out_of_range_row_returns_none() {
        let mem = MemoryBuffer::new(MemoryBufferConfig::new(80).with_max_lines(10));
        let reader = MemoryBufferReader::new(&mem);
        let mut index = crate::physical_line_index::PhysicalLineIndex::new(80, false);
        let builder = PhysicalLineBuilder::new(80, false);
        let scroll = ScrollManager::new(24);
        let result = CoordinateMapper::viewport_to_content(50, 0, 24, &scroll, &mut index, &builder, &reader);
        assert!(result.is_none());
    }
}
