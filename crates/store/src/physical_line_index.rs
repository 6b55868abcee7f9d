//! Per-logical-line physical-row count cache with prefix sums.
//!
//! Lets the viewport answer "how many physical rows does this logical
//! range occupy" and "which logical line holds physical row N" in
//! `O(log n)` instead of re-wrapping every line on every scroll.

use termhist_model::LogicalLine;

use crate::content_reader::ContentReader;

/// Physical row count for one logical line at a given width/overlay mode.
/// Pure arithmetic — no I/O, no locking.
pub fn phys_count(line: Option<&LogicalLine>, width: usize, show_overlay: bool) -> usize {
    let line = match line {
        None => return 1,
        Some(l) => l,
    };

    if show_overlay {
        if line.overlay.is_some() {
            return 1;
        }
        if line.cells.is_empty() {
            return 1;
        }
        if line.fixed_width > 0 {
            return 1;
        }
        div_ceil(line.cells.len(), width.max(1))
    } else {
        if line.synthetic {
            return 0;
        }
        if line.cells.is_empty() {
            return 1;
        }
        if line.fixed_width > 0 {
            return 1;
        }
        div_ceil(line.cells.len(), width.max(1))
    }
}

fn div_ceil(n: usize, d: usize) -> usize {
    (n + d - 1) / d
}

/// Prefix-sum index over the currently in-memory lines' physical row
/// counts, rebuilt lazily whenever the reader's `content_version` moves.
pub struct PhysicalLineIndex {
    per_line: Vec<usize>,
    prefix_sum: Vec<usize>,
    cached_total: usize,
    base_offset: u64,
    width: usize,
    show_overlay: bool,
    content_version_built_at: Option<u64>,
    prefix_dirty: bool,
}

impl PhysicalLineIndex {
    pub fn new(width: usize, show_overlay: bool) -> Self {
        Self {
            per_line: Vec::new(),
            prefix_sum: vec![0],
            cached_total: 0,
            base_offset: 0,
            width: width.max(1),
            show_overlay,
            content_version_built_at: None,
            prefix_dirty: true,
        }
    }

    pub fn set_width(&mut self, width: usize) {
        self.width = width.max(1);
        self.invalidate();
    }

    pub fn set_show_overlay(&mut self, show_overlay: bool) {
        if self.show_overlay != show_overlay {
            self.show_overlay = show_overlay;
            self.invalidate();
        }
    }

    pub fn is_fresh(&self, reader: &dyn ContentReader) -> bool {
        self.content_version_built_at == Some(reader.content_version())
    }

    /// Rebuilds the whole index from the reader's current in-memory lines.
    pub fn build(&mut self, reader: &dyn ContentReader) {
        let base_offset = reader.memory_buffer_offset();
        let end = reader.global_end();
        let count = (end - base_offset) as usize;

        self.per_line = Vec::with_capacity(count);
        for g in base_offset..end {
            let line = reader.get_line(g);
            self.per_line.push(phys_count(line.as_ref(), self.width, self.show_overlay));
        }

        self.base_offset = base_offset;
        self.cached_total = self.per_line.iter().sum();
        self.content_version_built_at = Some(reader.content_version());
        self.rebuild_prefix_sum();
    }

    pub fn ensure_built(&mut self, reader: &dyn ContentReader) {
        if !self.is_fresh(reader) {
            self.build(reader);
        } else if self.prefix_dirty {
            self.rebuild_prefix_sum();
        }
    }

    pub fn total_physical_lines(&self) -> usize {
        self.cached_total
    }

    /// Subtracts evicted counts from the total and shifts `per_line` left.
    /// If `evicted_count >= count`, forces a rebuild next use.
    pub fn handle_eviction(&mut self, new_base: u64, evicted_count: usize) {
        if evicted_count >= self.per_line.len() {
            self.invalidate();
            return;
        }
        let evicted_physical: usize = self.per_line.drain(..evicted_count).sum();
        self.cached_total = self.cached_total.saturating_sub(evicted_physical);
        self.base_offset = new_base;
        self.prefix_dirty = true;
    }

    /// Computes physical counts for new lines up to `new_end` and appends.
    pub fn handle_append(&mut self, reader: &dyn ContentReader, new_end: u64) {
        let current_end = self.base_offset + self.per_line.len() as u64;
        if new_end <= current_end {
            return;
        }
        for g in current_end..new_end {
            let line = reader.get_line(g);
            let count = phys_count(line.as_ref(), self.width, self.show_overlay);
            self.per_line.push(count);
            self.cached_total += count;
        }
        self.prefix_dirty = true;
    }

    fn rebuild_prefix_sum(&mut self) {
        self.prefix_sum = Vec::with_capacity(self.per_line.len() + 1);
        self.prefix_sum.push(0);
        let mut running = 0usize;
        for &count in &self.per_line {
            running += count;
            self.prefix_sum.push(running);
        }
        self.prefix_dirty = false;
    }

    /// Binary search for the largest `i` with `prefix_sum[i] <= phys_idx`;
    /// returns `(global_index, row_within_line)`.
    pub fn physical_to_logical(&mut self, phys_idx: usize) -> (u64, usize) {
        if self.prefix_dirty {
            self.rebuild_prefix_sum();
        }
        let i = self.prefix_sum.partition_point(|&p| p <= phys_idx).saturating_sub(1);
        let i = i.min(self.per_line.len().saturating_sub(1));
        let row = phys_idx.saturating_sub(*self.prefix_sum.get(i).unwrap_or(&0));
        (self.base_offset + i as u64, row)
    }

    pub fn invalidate(&mut self) {
        self.content_version_built_at = None;
        self.prefix_dirty = true;
    }
}
