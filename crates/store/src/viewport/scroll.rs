//! Owns the scroll offset and maps it to a logical line range.

use crate::content_reader::ContentReader;
use crate::physical_line_index::PhysicalLineIndex;

/// Physical rows scrolled back from the live edge, plus the logic to turn
/// that offset into a `[start_global, end_global)` logical line range.
pub struct ScrollManager {
    scroll_offset: usize,
    viewport_height: usize,
}

impl ScrollManager {
    pub fn new(viewport_height: usize) -> Self {
        Self { scroll_offset: 0, viewport_height: viewport_height.max(1) }
    }

    pub fn viewport_height(&self) -> usize {
        self.viewport_height
    }

    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height.max(1);
    }

    pub fn offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn max_scroll_offset(&self, total_physical: usize) -> usize {
        total_physical.saturating_sub(self.viewport_height)
    }

    /// Returns the actual number of lines scrolled (may be less than `n`
    /// if clamped against the top).
    pub fn scroll_up(&mut self, n: usize, total_physical: usize) -> usize {
        let max = self.max_scroll_offset(total_physical);
        let before = self.scroll_offset;
        self.scroll_offset = (self.scroll_offset + n).min(max);
        self.scroll_offset - before
    }

    pub fn scroll_down(&mut self, n: usize) -> usize {
        let before = self.scroll_offset;
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
        before - self.scroll_offset
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn scroll_to_top(&mut self, total_physical: usize) {
        self.scroll_offset = self.max_scroll_offset(total_physical);
    }

    pub fn scroll_to_offset(&mut self, n: usize, total_physical: usize) {
        self.scroll_offset = n.min(self.max_scroll_offset(total_physical));
    }

    pub fn is_at_live_edge(&self) -> bool {
        self.scroll_offset == 0
    }

    /// Computes the logical line range `[start_global, end_global)`
    /// visible at `height`. The critical edge case: if `physical_end`
    /// lands inside a wrapping logical line, `end_global` is that line's
    /// index + 1 (inclusive of the partially visible line); at an exact
    /// line boundary it is the next line's index. Preserving this is what
    /// keeps rendering stable across resizes.
    pub fn visible_range(
        &self,
        height: usize,
        index: &mut PhysicalLineIndex,
        reader: &dyn ContentReader,
    ) -> (u64, u64) {
        index.ensure_built(reader);
        let total = index.total_physical_lines();
        let physical_end = total.saturating_sub(self.scroll_offset);
        let physical_start = physical_end.saturating_sub(height);

        if physical_end == 0 {
            return (reader.memory_buffer_offset(), reader.memory_buffer_offset());
        }

        let start_global = if physical_start == 0 {
            index.physical_to_logical(0).0
        } else {
            index.physical_to_logical(physical_start).0
        };

        let (end_line, _end_row) = index.physical_to_logical(physical_end - 1);
        let end_global = end_line + 1;

        (start_global, end_global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryBufferConfig;
    use crate::content_reader::MemoryBufferReader;
    use crate::memory_buffer::MemoryBuffer;
    use termhist_model::{CellAttrs, Color};

    fn setup(lines: usize, width: usize) -> (MemoryBuffer, PhysicalLineIndex) {
        let mut mem = MemoryBuffer::new(MemoryBufferConfig::new(width).with_max_lines(1000));
        for _ in 0..lines {
            for _ in 0..width {
                mem.write('x' as u32, Color::Default, Color::Default, CellAttrs::empty());
            }
            mem.new_line();
            mem.carriage_return();
        }
        let index = PhysicalLineIndex::new(width, false);
        (mem, index)
    }

    #[test]
    fn test_max_scroll_offset_clamped_at_zero() {
        let s = ScrollManager::new(24);
        assert_eq!(s.max_scroll_offset(10), 0);
        assert_eq!(s.max_scroll_offset(100), 76);
    }

    #[test]
    fn test_scroll_up_down_roundtrip() {
        let mut s = ScrollManager::new(10);
        let moved = s.scroll_up(5, 100);
        assert_eq!(moved, 5);
        assert_eq!(s.offset(), 5);
        let moved = s.scroll_down(3);
        assert_eq!(moved, 3);
        assert_eq!(s.offset(), 2);
    }

    #[test]
    fn test_is_at_live_edge() {
        let mut s = ScrollManager::new(10);
        assert!(s.is_at_live_edge());
        s.scroll_up(1, 100);
        assert!(!s.is_at_live_edge());
        s.scroll_to_bottom();
        assert!(s.is_at_live_edge());
    }

    #[test]
    fn test_visible_range_at_live_edge_covers_tail() {
        let (mem, mut index) = setup(30, 80);
        let reader = MemoryBufferReader::new(&mem);
        let s = ScrollManager::new(10);
        let (start, end) = s.visible_range(10, &mut index, &reader);
        assert_eq!(end, reader.global_end());
        assert!(start < end);
    }
}
