//! Ring-buffered in-memory store of logical lines.
//!
//! `MemoryBuffer` is the hot tier: a fixed-capacity ring of [`LogicalLine`]s
//! addressed by a monotonically increasing global index. It never fails —
//! invalid arguments are ignored rather than propagated, matching the
//! data-model layer's infallible contract. Persistence is someone else's
//! problem (see `persistence` and `wal`).

use std::collections::{BTreeSet, VecDeque};

use termhist_model::{Cell, CellAttrs, Color, LogicalLine};

use crate::config::MemoryBufferConfig;

/// Maximum width a fixed-width line may request.
const MAX_FIXED_WIDTH: u32 = 10_000;

/// Ring-buffered sequence of logical lines with global indexing, dirty
/// tracking, and prefix-only eviction.
pub struct MemoryBuffer {
    lines: VecDeque<LogicalLine>,
    global_offset: u64,
    cursor_line: u64,
    cursor_col: usize,
    dirty: BTreeSet<u64>,
    term_width: usize,
    content_version: u64,
    max_lines: usize,
    eviction_batch: usize,
}

impl MemoryBuffer {
    pub fn new(config: MemoryBufferConfig) -> Self {
        Self {
            lines: VecDeque::with_capacity(config.max_lines.min(1024)),
            global_offset: 0,
            cursor_line: 0,
            cursor_col: 0,
            dirty: BTreeSet::new(),
            term_width: config.term_width.max(1),
            content_version: 0,
            max_lines: config.max_lines.max(1),
            eviction_batch: config.eviction_batch.max(1),
        }
    }

    // -------------------------------------------------------------------
    // Cursor
    // -------------------------------------------------------------------

    pub fn cursor_line(&self) -> u64 {
        self.cursor_line
    }

    pub fn cursor_col(&self) -> usize {
        self.cursor_col
    }

    pub fn set_cursor(&mut self, line: u64, col: usize) {
        self.cursor_line = line;
        self.cursor_col = col;
    }

    pub fn content_version(&self) -> u64 {
        self.content_version
    }

    pub fn global_offset(&self) -> u64 {
        self.global_offset
    }

    pub fn global_end(&self) -> u64 {
        self.global_offset + self.lines.len() as u64
    }

    pub fn term_width(&self) -> usize {
        self.term_width
    }

    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    /// Places a cell at `(cursor_line, cursor_col)`, growing the line with
    /// default cells as needed, and advances the cursor by one column.
    pub fn write(&mut self, rune: u32, fg: Color, bg: Color, attr: CellAttrs) {
        self.write_wide(rune, fg, bg, attr, false);
    }

    /// Wide-aware write. Returns `false` without mutating if a wide glyph
    /// would spill past `term_width`.
    pub fn write_wide(&mut self, rune: u32, fg: Color, bg: Color, attr: CellAttrs, is_wide: bool) -> bool {
        if is_wide && self.cursor_col + 1 >= self.term_width {
            return false;
        }

        let line_idx = self.cursor_line;
        let col = self.cursor_col;
        self.ensure_line(line_idx);

        let offset = (line_idx - self.global_offset) as usize;
        let line = &mut self.lines[offset];
        let mut attrs = attr;
        if is_wide {
            attrs |= CellAttrs::WIDE;
        }
        pad_to(line, col + if is_wide { 2 } else { 1 });
        line.cells[col] = Cell::new(rune, fg, bg, attrs);
        if is_wide {
            line.cells[col + 1] = Cell::new(0, fg, bg, attrs);
        }

        self.cursor_col += if is_wide { 2 } else { 1 };
        self.mark_dirty(line_idx);
        self.bump_version();
        true
    }

    /// Advances `cursor_line` by one, creating the new line empty.
    /// `cursor_col` is left unchanged — callers wanting CRLF semantics call
    /// `carriage_return()` too.
    pub fn new_line(&mut self) {
        self.cursor_line += 1;
        self.ensure_line(self.cursor_line);
    }

    pub fn carriage_return(&mut self) {
        self.cursor_col = 0;
    }

    // -------------------------------------------------------------------
    // Line access
    // -------------------------------------------------------------------

    /// Ensures line `g` exists, gap-filling with empty lines. May evict.
    pub fn ensure_line(&mut self, g: u64) {
        if g < self.global_offset {
            return;
        }
        while self.global_end() <= g {
            self.push_line(LogicalLine::empty());
        }
    }

    /// Returns a copy of the line at global index `g`, or `None` if absent
    /// (evicted or never written).
    pub fn get_line(&self, g: u64) -> Option<LogicalLine> {
        if g < self.global_offset || g >= self.global_end() {
            return None;
        }
        Some(self.lines[(g - self.global_offset) as usize].clone())
    }

    /// Returns lines in `[start, end)`, clipped to what's actually held.
    pub fn get_line_range(&self, start: u64, end: u64) -> Vec<LogicalLine> {
        let start = start.max(self.global_offset);
        let end = end.min(self.global_end());
        if start >= end {
            return Vec::new();
        }
        (start..end)
            .map(|g| self.lines[(g - self.global_offset) as usize].clone())
            .collect()
    }

    /// Marks line `g` fixed-width. Widths outside `1..=10_000` are ignored.
    pub fn set_line_fixed(&mut self, g: u64, width: u32) {
        if width == 0 || width > MAX_FIXED_WIDTH {
            return;
        }
        if let Some(line) = self.line_mut(g) {
            line.fixed_width = width;
            self.mark_dirty(g);
            self.bump_version();
        }
    }

    pub fn set_cell(&mut self, g: u64, col: usize, cell: Cell) {
        if let Some(line) = self.line_mut(g) {
            pad_to(line, col + 1);
            line.cells[col] = cell;
            self.mark_dirty(g);
            self.bump_version();
        }
    }

    pub fn insert_line(&mut self, g: u64) {
        if g < self.global_offset || g > self.global_end() {
            return;
        }
        let offset = (g - self.global_offset) as usize;
        self.lines.insert(offset, LogicalLine::empty());
        self.renumber_dirty_from(g);
        self.bump_version();
        self.evict_if_needed();
    }

    pub fn delete_line(&mut self, g: u64) {
        if g < self.global_offset || g >= self.global_end() {
            return;
        }
        let offset = (g - self.global_offset) as usize;
        self.lines.remove(offset);
        self.dirty.remove(&g);
        self.bump_version();
    }

    // -------------------------------------------------------------------
    // Erase ops
    // -------------------------------------------------------------------

    /// Erases from `col` to the end of the line. Nothing is rendered past
    /// the erased region, so this truncates rather than blanking in place —
    /// a line wrapped onto several physical rows can collapse back onto
    /// fewer once its tail is erased.
    pub fn erase_to_end_of_line(&mut self, g: u64, col: usize, _fg: Color, _bg: Color) {
        if let Some(line) = self.line_mut(g) {
            if col < line.cells.len() {
                line.cells.truncate(col);
            }
            self.mark_dirty(g);
            self.bump_version();
        }
    }

    pub fn erase_from_start_of_line(&mut self, g: u64, col: usize, fg: Color, bg: Color) {
        if let Some(line) = self.line_mut(g) {
            let blank = Cell::new(' ' as u32, fg, bg, CellAttrs::empty());
            let end = (col + 1).min(line.cells.len());
            for c in &mut line.cells[..end] {
                *c = blank;
            }
            self.mark_dirty(g);
            self.bump_version();
        }
    }

    pub fn erase_line(&mut self, g: u64, _fg: Color, _bg: Color) {
        if let Some(line) = self.line_mut(g) {
            line.cells.clear();
            self.mark_dirty(g);
            self.bump_version();
        }
    }

    // -------------------------------------------------------------------
    // Dirty tracking
    // -------------------------------------------------------------------

    pub fn mark_dirty(&mut self, g: u64) {
        self.dirty.insert(g);
    }

    pub fn clear_dirty(&mut self, g: u64) {
        self.dirty.remove(&g);
    }

    pub fn clear_all_dirty(&mut self) {
        self.dirty.clear();
    }

    pub fn is_dirty(&self, g: u64) -> bool {
        self.dirty.contains(&g)
    }

    /// Returns a sorted snapshot of dirty global indices.
    pub fn get_dirty_lines(&self) -> Vec<u64> {
        self.dirty.iter().copied().collect()
    }

    // -------------------------------------------------------------------
    // Initialization from PageStore
    // -------------------------------------------------------------------

    /// Installs history without producing dirty records. Used only during
    /// startup to pre-load persisted lines.
    pub fn restore_lines(&mut self, start_g: u64, lines: Vec<LogicalLine>) {
        self.lines.clear();
        self.dirty.clear();
        self.global_offset = start_g;
        self.lines.extend(lines);
        self.bump_version();
    }

    pub fn set_global_offset(&mut self, g: u64) {
        self.global_offset = g;
    }

    // -------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------

    fn line_mut(&mut self, g: u64) -> Option<&mut LogicalLine> {
        if g < self.global_offset || g >= self.global_end() {
            return None;
        }
        Some(&mut self.lines[(g - self.global_offset) as usize])
    }

    fn push_line(&mut self, line: LogicalLine) {
        self.lines.push_back(line);
        self.evict_if_needed();
    }

    fn evict_if_needed(&mut self) {
        if self.lines.len() <= self.max_lines {
            return;
        }
        let overflow = self.lines.len() - self.max_lines;
        // Evict in batches of eviction_batch, but never less than what's
        // needed to get back under max_lines.
        let to_evict = overflow.max(self.eviction_batch.min(overflow)).max(overflow);
        let to_evict = to_evict.min(self.lines.len());
        for _ in 0..to_evict {
            self.lines.pop_front();
        }
        let new_offset = self.global_offset + to_evict as u64;
        self.dirty = self.dirty.split_off(&new_offset);
        self.global_offset = new_offset;
    }

    /// `insert_line` pushes every line at or after `g` one position back;
    /// shift their dirty entries to match.
    fn renumber_dirty_from(&mut self, g: u64) {
        let shifted = self.dirty.split_off(&g);
        self.dirty.extend(shifted.into_iter().map(|idx| idx + 1));
    }

    fn bump_version(&mut self) {
        self.content_version = self.content_version.wrapping_add(1);
    }
}

fn pad_to(line: &mut LogicalLine, len: usize) {
    if line.cells.len() < len {
        line.cells.resize(len, Cell::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(max_lines: usize, width: usize) -> MemoryBuffer {
        MemoryBuffer::new(MemoryBufferConfig::new(width).with_max_lines(max_lines))
    }

    #[test]
    fn test_write_advances_cursor() {
        let mut b = buf(10, 80);
        b.write('h' as u32, Color::Default, Color::Default, CellAttrs::empty());
        b.write('i' as u32, Color::Default, Color::Default, CellAttrs::empty());
        assert_eq!(b.cursor_col(), 2);
        let line = b.get_line(0).unwrap();
        assert_eq!(line.cells[0].codepoint, 'h' as u32);
        assert_eq!(line.cells[1].codepoint, 'i' as u32);
        assert!(b.is_dirty(0));
    }

    #[test]
    fn test_write_wide_rejects_at_edge() {
        let mut b = buf(10, 4);
        b.set_cursor(0, 3);
        let ok = b.write_wide('\u{4E2D}' as u32, Color::Default, Color::Default, CellAttrs::empty(), true);
        assert!(!ok);
        assert_eq!(b.cursor_col(), 3);
    }

    #[test]
    fn test_write_wide_sets_trailer() {
        let mut b = buf(10, 80);
        b.write_wide('\u{4E2D}' as u32, Color::Default, Color::Default, CellAttrs::empty(), true);
        let line = b.get_line(0).unwrap();
        assert!(line.cells[0].attrs.contains(CellAttrs::WIDE));
        assert!(line.cells[1].is_wide_trailer());
        assert_eq!(b.cursor_col(), 2);
    }

    #[test]
    fn test_new_line_and_carriage_return() {
        let mut b = buf(10, 80);
        b.write('a' as u32, Color::Default, Color::Default, CellAttrs::empty());
        b.new_line();
        b.carriage_return();
        assert_eq!(b.cursor_line(), 1);
        assert_eq!(b.cursor_col(), 0);
    }

    #[test]
    fn test_get_line_absent_outside_range() {
        let b = buf(10, 80);
        assert!(b.get_line(5).is_none());
    }

    #[test]
    fn test_ring_eviction_preserves_indices() {
        let mut b = buf(4, 80);
        for _ in 0..10 {
            b.new_line();
        }
        assert!(b.global_offset() > 0);
        assert!(b.get_line(0).is_none());
        let last = b.global_end() - 1;
        assert!(b.get_line(last).is_some());
    }

    #[test]
    fn test_insert_line_shifts_dirty_indices_at_and_after_insertion_point() {
        let mut b = buf(10, 80);
        for _ in 0..3 {
            b.new_line();
        }
        b.mark_dirty(0);
        b.mark_dirty(2);
        b.insert_line(1);
        assert!(b.is_dirty(0));
        assert!(!b.is_dirty(2));
        assert!(b.is_dirty(3));
    }

    #[test]
    fn test_eviction_clears_dirty_for_evicted_prefix() {
        let mut b = buf(3, 80);
        b.mark_dirty(0);
        for _ in 0..5 {
            b.new_line();
        }
        assert!(!b.is_dirty(0));
    }

    #[test]
    fn test_set_line_fixed_rejects_bad_widths() {
        let mut b = buf(10, 80);
        b.ensure_line(0);
        b.set_line_fixed(0, 0);
        assert_eq!(b.get_line(0).unwrap().fixed_width, 0);
        b.set_line_fixed(0, 20_000);
        assert_eq!(b.get_line(0).unwrap().fixed_width, 0);
        b.set_line_fixed(0, 120);
        assert_eq!(b.get_line(0).unwrap().fixed_width, 120);
    }

    #[test]
    fn test_erase_to_end_of_line_truncates() {
        let mut b = buf(10, 80);
        for ch in "hello".chars() {
            b.write(ch as u32, Color::Default, Color::Default, CellAttrs::empty());
        }
        b.erase_to_end_of_line(0, 2, Color::Default, Color::Default);
        let line = b.get_line(0).unwrap();
        assert_eq!(line.cells.len(), 2);
        assert_eq!(line.cells[0].codepoint, 'h' as u32);
        assert_eq!(line.cells[1].codepoint, 'e' as u32);
    }

    #[test]
    fn test_erase_line_clears_cells() {
        let mut b = buf(10, 80);
        b.write('x' as u32, Color::Default, Color::Default, CellAttrs::empty());
        b.erase_line(0, Color::Default, Color::Default);
        assert!(b.get_line(0).unwrap().is_empty());
    }

    #[test]
    fn test_content_version_bumps_on_mutation() {
        let mut b = buf(10, 80);
        let v0 = b.content_version();
        b.write('a' as u32, Color::Default, Color::Default, CellAttrs::empty());
        assert!(b.content_version() > v0);
    }

    #[test]
    fn test_restore_lines_does_not_mark_dirty() {
        let mut b = buf(10, 80);
        b.restore_lines(100, vec![LogicalLine::empty(), LogicalLine::empty()]);
        assert_eq!(b.global_offset(), 100);
        assert_eq!(b.global_end(), 102);
        assert!(b.get_dirty_lines().is_empty());
    }

    #[test]
    fn test_get_line_range_clips_to_held_window() {
        let mut b = buf(10, 80);
        for _ in 0..5 {
            b.new_line();
        }
        let range = b.get_line_range(0, 100);
        assert_eq!(range.len() as u64, b.global_end() - b.global_offset());
    }
}
