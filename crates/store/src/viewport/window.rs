//! Composes the builder, cache, scroll manager and physical-line index
//! into the read-only, scrollable view over a `ContentReader`.

use termhist_model::Cell;

use crate::content_reader::ContentReader;
use crate::physical_line_index::PhysicalLineIndex;
use crate::viewport::builder::PhysicalLineBuilder;
use crate::viewport::cache::ViewportCache;
use crate::viewport::coords::CoordinateMapper;
use crate::viewport::scroll::ScrollManager;

/// A rendered grid: `height` rows of exactly `width` cells each.
pub type Grid = Vec<Vec<Cell>>;

/// Wrapped, scrollable, cached read view over a `ContentReader`.
pub struct ViewportWindow {
    width: usize,
    height: usize,
    builder: PhysicalLineBuilder,
    index: PhysicalLineIndex,
    scroll: ScrollManager,
    cache: ViewportCache,
}

impl ViewportWindow {
    pub fn new(width: usize, height: usize, show_overlay: bool) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            builder: PhysicalLineBuilder::new(width, show_overlay),
            index: PhysicalLineIndex::new(width, show_overlay),
            scroll: ScrollManager::new(height),
            cache: ViewportCache::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cache_stats(&self) -> (u64, u64) {
        (self.cache.hits(), self.cache.misses())
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll.offset()
    }

    pub fn is_at_live_edge(&self) -> bool {
        self.scroll.is_at_live_edge()
    }

    pub fn resize(&mut self, width: usize, height: usize, reader: &dyn ContentReader) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.builder.set_width(self.width);
        self.index.set_width(self.width);
        self.scroll.set_viewport_height(self.height);
        self.index.ensure_built(reader);
        self.cache.invalidate();
    }

    pub fn set_show_overlay(&mut self, show_overlay: bool, reader: &dyn ContentReader) {
        self.builder.set_show_overlay(show_overlay);
        self.index.set_show_overlay(show_overlay);
        self.index.ensure_built(reader);
        self.cache.invalidate();
    }

    pub fn scroll_up(&mut self, n: usize, reader: &dyn ContentReader) -> usize {
        self.index.ensure_built(reader);
        let total = self.index.total_physical_lines();
        let moved = self.scroll.scroll_up(n, total);
        if moved > 0 {
            self.cache.invalidate();
        }
        moved
    }

    pub fn scroll_down(&mut self, n: usize) -> usize {
        let moved = self.scroll.scroll_down(n);
        if moved > 0 {
            self.cache.invalidate();
        }
        moved
    }

    pub fn scroll_to_bottom(&mut self) {
        if !self.scroll.is_at_live_edge() {
            self.scroll.scroll_to_bottom();
            self.cache.invalidate();
        }
    }

    pub fn scroll_to_top(&mut self, reader: &dyn ContentReader) {
        self.index.ensure_built(reader);
        let total = self.index.total_physical_lines();
        self.scroll.scroll_to_top(total);
        self.cache.invalidate();
    }

    /// `offset <= 0` means live edge.
    pub fn set_scroll_offset(&mut self, offset: i64, reader: &dyn ContentReader) {
        self.index.ensure_built(reader);
        let total = self.index.total_physical_lines();
        let offset = offset.max(0) as usize;
        self.scroll.scroll_to_offset(offset, total);
        self.cache.invalidate();
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
        self.index.invalidate();
    }

    pub fn handle_eviction(&mut self, new_base: u64, evicted_count: usize) {
        self.index.handle_eviction(new_base, evicted_count);
        self.cache.invalidate();
    }

    pub fn handle_append(&mut self, reader: &dyn ContentReader, new_end: u64) {
        self.index.handle_append(reader, new_end);
        if self.scroll.is_at_live_edge() {
            self.cache.invalidate();
        }
    }

    pub fn get_visible_grid(&mut self, reader: &dyn ContentReader) -> Grid {
        let (start_global, end_global) = self.scroll.visible_range(self.height, &mut self.index, reader);
        let content_version = reader.content_version();

        let physical = if let Some(cached) = self.cache.get(start_global, end_global, self.width, content_version) {
            cached.to_vec()
        } else {
            let mut built = Vec::new();
            for g in start_global..end_global {
                let line = reader.get_line(g);
                if let Some(rows) = self.builder.build_line(line.as_ref(), g) {
                    built.extend(rows);
                }
            }
            self.cache.set(built.clone(), start_global, end_global, self.width, content_version);
            built
        };

        physical_lines_to_grid(&physical, self.width, self.height)
    }

    pub fn viewport_to_content(&mut self, row: usize, col: usize, reader: &dyn ContentReader) -> Option<(u64, usize)> {
        CoordinateMapper::viewport_to_content(row, col, self.height, &self.scroll, &mut self.index, &self.builder, reader)
    }

    pub fn content_to_viewport(&mut self, global_idx: u64, char_offset: usize, reader: &dyn ContentReader) -> Option<(usize, usize)> {
        CoordinateMapper::content_to_viewport(global_idx, char_offset, self.height, &self.scroll, &mut self.index, &self.builder, reader)
    }
}

/// Bottom-aligns physical lines into a `height x width` grid, padding
/// empty rows above the start with default blanks.
fn physical_lines_to_grid(physical: &[crate::viewport::builder::PhysicalLine], width: usize, height: usize) -> Grid {
    let total = physical.len();
    let physical_start = total.saturating_sub(height);

    let mut grid = vec![vec![Cell::default(); width]; height];
    for y in 0..height {
        let phys_idx = physical_start + y;
        if let Some(p) = physical.get(phys_idx) {
            let n = p.cells.len().min(width);
            grid[y][..n].clone_from_slice(&p.cells[..n]);
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryBufferConfig;
    use crate::content_reader::MemoryBufferReader;
    use crate::memory_buffer::MemoryBuffer;
    use termhist_model::{CellAttrs, Color};

    fn filled_buffer(lines: usize, width: usize) -> MemoryBuffer {
        let mut mem = MemoryBuffer::new(MemoryBufferConfig::new(width).with_max_lines(10_000));
        for i in 0..lines {
            for ch in format!("line{i:04}").chars() {
                mem.write(ch as u32, Color::Default, Color::Default, CellAttrs::empty());
            }
            mem.new_line();
            mem.carriage_return();
        }
        mem
    }

    #[test]
    fn test_grid_bottom_aligns_when_fewer_lines_than_height() {
        let mem = filled_buffer(3, 80);
        let reader = MemoryBufferReader::new(&mem);
        let mut window = ViewportWindow::new(80, 10, false);
        let grid = window.get_visible_grid(&reader);
        assert_eq!(grid.len(), 10);
        // Top rows should be blank, bottom rows should carry content.
        assert!(grid[0].iter().all(|c| c.is_blank()));
        assert!(!grid[9].iter().all(|c| c.is_blank()));
    }

    #[test]
    fn test_scroll_invalidates_cache() {
        let mem = filled_buffer(50, 80);
        let reader = MemoryBufferReader::new(&mem);
        let mut window = ViewportWindow::new(80, 10, false);
        let _ = window.get_visible_grid(&reader);
        window.scroll_up(5, &reader);
        let (_, misses) = window.cache_stats();
        let _ = window.get_visible_grid(&reader);
        let (_, misses2) = window.cache_stats();
        assert!(misses2 > misses);
    }

    #[test]
    fn test_cache_hits_on_repeated_grid_without_mutation() {
        let mem = filled_buffer(50, 80);
        let reader = MemoryBufferReader::new(&mem);
        let mut window = ViewportWindow::new(80, 10, false);
        let _ = window.get_visible_grid(&reader);
        let _ = window.get_visible_grid(&reader);
        let (hits, _) = window.cache_stats();
        assert!(hits >= 1);
    }

    #[test]
    fn test_resize_keeps_bottom_stable_at_live_edge() {
        let mem = filled_buffer(50, 80);
        let reader = MemoryBufferReader::new(&mem);
        let mut window = ViewportWindow::new(80, 10, false);
        let grid_before = window.get_visible_grid(&reader);
        window.resize(80, 15, &reader);
        let grid_after = window.get_visible_grid(&reader);
        // The last row should still reflect the most recent line content.
        assert_eq!(grid_before[9], grid_after[14]);
    }
}
