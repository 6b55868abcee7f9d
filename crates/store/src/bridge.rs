//! Integration surface exposed to the VT parser: owns `MemoryBuffer`,
//! `AdaptivePersistence`, and a `ViewportWindow`, and wires writes through
//! to both the ring buffer and the durability pipeline.

use std::sync::{Arc, Mutex};

use termhist_model::{Cell, CellAttrs, Color, LogicalLine};

use crate::config::HistoryConfig;
use crate::content_reader::MemoryBufferReader;
use crate::error::Result;
use crate::memory_buffer::MemoryBuffer;
use crate::page_store::PageStore;
use crate::persistence::{AdaptivePersistence, LineSource};
use crate::viewport::{Grid, ViewportWindow};
use crate::wal::{ViewportState, WriteAheadLog};

struct BufferLineSource(Arc<Mutex<MemoryBuffer>>);

impl LineSource for BufferLineSource {
    fn read_for_flush(&self, global_idx: u64) -> Option<(LogicalLine, u64)> {
        self.0.lock().unwrap().get_line(global_idx).map(|line| (line, now_millis()))
    }
}

fn now_millis() -> u64 {
    // The bridge is the one place a monotonic wall-clock timestamp is
    // actually needed (WAL records and page timestamps); callers that pass
    // explicit timestamps (tests, replay) bypass this.
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Optional text search highlight applied at render time only; never
/// mutates stored cells.
#[derive(Debug, Clone, Default)]
pub struct SearchHighlight {
    pub term: String,
    pub current_line: Option<u64>,
    pub selection_color: Option<Color>,
    pub accent_color: Option<Color>,
}

/// The thin object the parser drives: write ops, line feed, resize,
/// scroll-region/erase delegation, live-edge queries, search highlighting.
pub struct HistoryBridge {
    memory: Arc<Mutex<MemoryBuffer>>,
    persistence: AdaptivePersistence,
    source: Arc<BufferLineSource>,
    viewport: ViewportWindow,
    live_edge_base: u64,
    cursor_y: usize,
    scroll_region_full_screen: bool,
    pending_history_lines: u64,
    history_loaded: bool,
    preload_margin: usize,
    search_highlight: Option<SearchHighlight>,
}

impl HistoryBridge {
    pub fn open(config: HistoryConfig, width: usize, height: usize) -> Result<Self> {
        let memory = Arc::new(Mutex::new(MemoryBuffer::new(config.memory)));
        let store = PageStore::open(config.page_store)?;
        let pending_history_lines = store.line_count();
        let wal = WriteAheadLog::open(config.wal, store)?;
        let persistence = AdaptivePersistence::new(config.persistence, wal);
        let source = Arc::new(BufferLineSource(Arc::clone(&memory)));

        // The idle monitor is the only auto-flush path for Debounced and
        // BestEffort pending lines; without it they'd sit unflushed until
        // `close()`, so every bridge starts one.
        persistence.start_idle_monitor(Arc::clone(&source) as Arc<dyn LineSource>);

        Ok(Self {
            memory,
            persistence,
            source,
            viewport: ViewportWindow::new(width, height, false),
            live_edge_base: 0,
            cursor_y: 0,
            scroll_region_full_screen: true,
            pending_history_lines,
            history_loaded: false,
            preload_margin: config.preload_margin,
            search_highlight: None,
        })
    }

    /// Forces an immediate drain of whatever is batched in Debounced or
    /// BestEffort mode, without waiting for the idle monitor.
    pub fn flush(&mut self) -> Result<()> {
        self.persistence.flush(self.source.as_ref())
    }

    /// Publishes the current scroll/cursor position as a METADATA record so
    /// a crash before `close()` can still restore it on reopen.
    fn publish_viewport_metadata(&mut self) {
        let cursor_x = self.memory.lock().unwrap().cursor_col() as u32;
        self.persistence.notify_metadata_change(ViewportState {
            scroll_offset: self.viewport.scroll_offset() as u64,
            live_edge_base: self.live_edge_base,
            cursor_x,
            cursor_y: self.cursor_y as u32,
            timestamp: now_millis(),
        });
    }

    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    pub fn write(&mut self, rune: u32, fg: Color, bg: Color, attr: CellAttrs) {
        let line = {
            let mut mem = self.memory.lock().unwrap();
            mem.write(rune, fg, bg, attr);
            mem.cursor_line()
        };
        self.notify_write(line);
    }

    /// Returns `false` if the wide write was rejected at the edge.
    pub fn write_wide(&mut self, rune: u32, fg: Color, bg: Color, attr: CellAttrs, is_wide: bool) -> bool {
        let (ok, line) = {
            let mut mem = self.memory.lock().unwrap();
            let ok = mem.write_wide(rune, fg, bg, attr, is_wide);
            (ok, mem.cursor_line())
        };
        if ok {
            self.notify_write(line);
        }
        ok
    }

    fn notify_write(&mut self, global_line: u64) {
        let _ = self.persistence.notify_write(global_line, self.source.as_ref());
        self.viewport.invalidate();
    }

    // -------------------------------------------------------------------
    // Line feed / scroll region
    // -------------------------------------------------------------------

    pub fn set_scroll_region_full_screen(&mut self, full: bool) {
        self.scroll_region_full_screen = full;
    }

    pub fn line_feed(&mut self, at_bottom_margin: bool) {
        if self.scroll_region_full_screen && at_bottom_margin {
            self.live_edge_base += 1;
        }
        let next = {
            let mut mem = self.memory.lock().unwrap();
            mem.new_line();
            mem.cursor_line()
        };
        self.viewport.invalidate();
        if self.scroll_region_full_screen {
            self.notify_write(next);
        }
        self.publish_viewport_metadata();
    }

    // -------------------------------------------------------------------
    // Resize
    // -------------------------------------------------------------------

    pub fn resize(&mut self, width: usize, height: usize) {
        if !self.history_loaded && self.pending_history_lines > 0 {
            self.load_history(height);
            self.history_loaded = true;
        } else if self.history_loaded {
            self.adjust_live_edge_for_resize(width, height);
        }

        {
            let mem = self.memory.lock().unwrap();
            let reader = MemoryBufferReader::new(&mem);
            self.viewport.resize(width, height, &reader);
        }
        self.publish_viewport_metadata();
    }

    fn load_history(&mut self, height: usize) {
        let margin = self.preload_margin;
        let want = height as u64 + margin as u64;
        let total = self.pending_history_lines;
        let start = total.saturating_sub(want);

        if let Ok(lines) = self.persistence.read_line_range(start, total) {
            let mut mem = self.memory.lock().unwrap();
            mem.restore_lines(start, lines);
        }

        self.live_edge_base = total;
        self.cursor_y = height.saturating_sub(1);

        if let Some(state) = self.persistence.recovered_metadata() {
            self.restore_from_metadata(&state);
        }
    }

    /// Restores viewport scroll/cursor from recovered WAL metadata, only
    /// if `live_edge_base` still falls inside the current memory window.
    pub fn restore_from_metadata(&mut self, state: &ViewportState) {
        let (offset, end) = {
            let mem = self.memory.lock().unwrap();
            (mem.global_offset(), mem.global_end())
        };
        if state.live_edge_base >= offset && state.live_edge_base <= end {
            self.live_edge_base = state.live_edge_base;
            self.cursor_y = state.cursor_y as usize;
        }
    }

    fn adjust_live_edge_for_resize(&mut self, _width: usize, height: usize) {
        let global_end = { self.memory.lock().unwrap().global_end() };
        let cursor_global = self.live_edge_base + self.cursor_y as u64;

        if height <= self.cursor_y {
            // Shrinking: pull the base forward so the cursor stays on
            // screen at the new bottom row.
            self.live_edge_base = cursor_global.saturating_sub(height as u64 - 1);
            self.cursor_y = height - 1;
        } else {
            // Growing: move the base back up to expose older content,
            // without exceeding global_end - height.
            let max_base = global_end.saturating_sub(height as u64);
            self.live_edge_base = self.live_edge_base.min(max_base);
            self.cursor_y = (cursor_global.saturating_sub(self.live_edge_base)) as usize;
        }
    }

    // -------------------------------------------------------------------
    // Erase delegation
    // -------------------------------------------------------------------

    pub fn erase_to_end_of_line(&mut self, g: u64, col: usize, fg: Color, bg: Color) {
        self.memory.lock().unwrap().erase_to_end_of_line(g, col, fg, bg);
        self.notify_write(g);
    }

    pub fn erase_from_start_of_line(&mut self, g: u64, col: usize, fg: Color, bg: Color) {
        self.memory.lock().unwrap().erase_from_start_of_line(g, col, fg, bg);
        self.notify_write(g);
    }

    pub fn erase_line(&mut self, g: u64, fg: Color, bg: Color) {
        self.memory.lock().unwrap().erase_line(g, fg, bg);
        self.notify_write(g);
    }

    pub fn set_cell(&mut self, g: u64, col: usize, cell: Cell) {
        self.memory.lock().unwrap().set_cell(g, col, cell);
        self.notify_write(g);
    }

    // -------------------------------------------------------------------
    // Live-edge queries
    // -------------------------------------------------------------------

    pub fn at_live_edge(&self) -> bool {
        self.viewport.is_at_live_edge()
    }

    pub fn scroll_offset(&self) -> usize {
        self.viewport.scroll_offset()
    }

    pub fn set_scroll_offset(&mut self, offset: i64) {
        {
            let mem = self.memory.lock().unwrap();
            let reader = MemoryBufferReader::new(&mem);
            self.viewport.set_scroll_offset(offset, &reader);
        }
        self.publish_viewport_metadata();
    }

    pub fn scroll_up(&mut self, n: usize) -> usize {
        let moved = {
            let mem = self.memory.lock().unwrap();
            let reader = MemoryBufferReader::new(&mem);
            self.viewport.scroll_up(n, &reader)
        };
        if moved > 0 {
            self.publish_viewport_metadata();
        }
        moved
    }

    pub fn scroll_down(&mut self, n: usize) -> usize {
        let moved = self.viewport.scroll_down(n);
        if moved > 0 {
            self.publish_viewport_metadata();
        }
        moved
    }

    pub fn get_visible_grid(&mut self) -> Grid {
        let mem = self.memory.lock().unwrap();
        let reader = MemoryBufferReader::new(&mem);
        self.viewport.get_visible_grid(&reader)
    }

    // -------------------------------------------------------------------
    // Search highlighting
    // -------------------------------------------------------------------

    pub fn set_search_highlight(
        &mut self,
        term: impl Into<String>,
        current_line: Option<u64>,
        selection_color: Option<Color>,
        accent_color: Option<Color>,
    ) {
        self.search_highlight = Some(SearchHighlight { term: term.into(), current_line, selection_color, accent_color });
    }

    pub fn clear_search_highlight(&mut self) {
        self.search_highlight = None;
    }

    pub fn search_highlight(&self) -> Option<&SearchHighlight> {
        self.search_highlight.as_ref()
    }

    pub fn close(&mut self) -> Result<()> {
        self.persistence.close(self.source.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_bridge(dir: &std::path::Path) -> HistoryBridge {
        let config = HistoryConfig::for_terminal(dir, "t1", 80);
        HistoryBridge::open(config, 80, 24).unwrap()
    }

    #[test]
    fn test_write_advances_and_flushes_write_through() {
        let dir = tempdir().unwrap();
        let mut bridge = open_bridge(dir.path());
        bridge.write('h' as u32, Color::Default, Color::Default, CellAttrs::empty());
        assert!(bridge.at_live_edge());
    }

    #[test]
    fn test_line_feed_advances_live_edge_on_full_screen() {
        let dir = tempdir().unwrap();
        let mut bridge = open_bridge(dir.path());
        bridge.set_scroll_region_full_screen(true);
        let base_before = bridge.live_edge_base;
        bridge.line_feed(true);
        assert_eq!(bridge.live_edge_base, base_before + 1);
    }

    #[test]
    fn test_line_feed_does_not_advance_in_custom_region() {
        let dir = tempdir().unwrap();
        let mut bridge = open_bridge(dir.path());
        bridge.set_scroll_region_full_screen(false);
        let base_before = bridge.live_edge_base;
        bridge.line_feed(true);
        assert_eq!(bridge.live_edge_base, base_before);
    }

    #[test]
    fn test_search_highlight_round_trip() {
        let dir = tempdir().unwrap();
        let mut bridge = open_bridge(dir.path());
        bridge.set_search_highlight("needle", Some(3), None, None);
        assert_eq!(bridge.search_highlight().unwrap().term, "needle");
        bridge.clear_search_highlight();
        assert!(bridge.search_highlight().is_none());
    }

    #[test]
    fn test_close_is_safe_to_call() {
        let dir = tempdir().unwrap();
        let mut bridge = open_bridge(dir.path());
        bridge.write('x' as u32, Color::Default, Color::Default, CellAttrs::empty());
        bridge.close().unwrap();
    }

    #[test]
    fn test_explicit_flush_is_safe_to_call() {
        let dir = tempdir().unwrap();
        let mut bridge = open_bridge(dir.path());
        bridge.write('x' as u32, Color::Default, Color::Default, CellAttrs::empty());
        bridge.flush().unwrap();
    }

    #[test]
    fn test_close_then_reopen_recovers_viewport_metadata() {
        let dir = tempdir().unwrap();
        let expected_live_edge_base = {
            let mut bridge = open_bridge(dir.path());
            bridge.write('h' as u32, Color::Default, Color::Default, CellAttrs::empty());
            bridge.line_feed(true);
            let base = bridge.live_edge_base;
            bridge.close().unwrap();
            base
        };

        let config = HistoryConfig::for_terminal(dir.path(), "t1", 80);
        let bridge = HistoryBridge::open(config, 80, 24).unwrap();
        let recovered = bridge.persistence.recovered_metadata();
        assert_eq!(recovered.unwrap().live_edge_base, expected_live_edge_base);
    }
}
