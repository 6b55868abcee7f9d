//! Read abstraction unifying `MemoryBuffer` with `PageStore` fallback.
//!
//! Everything in the viewport stack talks to a `ContentReader` rather than
//! to `MemoryBuffer` directly, so it does not need to know whether a given
//! line still lives in the ring or has to come from disk.

use termhist_model::LogicalLine;

use crate::memory_buffer::MemoryBuffer;
use crate::page_store::PageStore;

/// Interface consumed by `PhysicalLineIndex` and the viewport stack.
pub trait ContentReader {
    /// Effective oldest readable index: `0` if a `PageStore` is attached
    /// (so scrolling can reach the oldest persisted line), else the
    /// memory ring's floor.
    fn global_offset(&self) -> u64;
    fn global_end(&self) -> u64;
    /// The memory ring's true floor, regardless of any attached PageStore.
    fn memory_buffer_offset(&self) -> u64;
    fn total_lines(&self) -> u64 {
        self.global_end() - self.global_offset()
    }
    fn get_line(&self, g: u64) -> Option<LogicalLine>;
    fn get_line_range(&self, start: u64, end: u64) -> Vec<LogicalLine>;
    fn content_version(&self) -> u64;
}

/// Default `ContentReader`: reads from `MemoryBuffer`, falling back to an
/// optional `PageStore` for indices below the ring's floor.
pub struct MemoryBufferReader<'a> {
    memory: &'a MemoryBuffer,
    page_store: Option<&'a PageStore>,
}

impl<'a> MemoryBufferReader<'a> {
    pub fn new(memory: &'a MemoryBuffer) -> Self {
        Self { memory, page_store: None }
    }

    pub fn with_page_store(memory: &'a MemoryBuffer, page_store: &'a PageStore) -> Self {
        Self { memory, page_store: Some(page_store) }
    }
}

impl<'a> ContentReader for MemoryBufferReader<'a> {
    fn global_offset(&self) -> u64 {
        if self.page_store.is_some() {
            0
        } else {
            self.memory.global_offset()
        }
    }

    fn global_end(&self) -> u64 {
        self.memory.global_end()
    }

    fn memory_buffer_offset(&self) -> u64 {
        self.memory.global_offset()
    }

    fn get_line(&self, g: u64) -> Option<LogicalLine> {
        if g < self.memory.global_offset() {
            return self.page_store.and_then(|ps| ps.read_line(g).ok());
        }
        self.memory.get_line(g)
    }

    fn get_line_range(&self, start: u64, end: u64) -> Vec<LogicalLine> {
        let mem_floor = self.memory.global_offset();
        let mut out = Vec::new();

        if start < mem_floor {
            if let Some(ps) = self.page_store {
                let disk_end = end.min(mem_floor);
                if let Ok(mut lines) = ps.read_line_range(start, disk_end) {
                    out.append(&mut lines);
                }
            }
        }

        if end > mem_floor {
            let mem_start = start.max(mem_floor);
            out.extend(self.memory.get_line_range(mem_start, end));
        }

        out
    }

    fn content_version(&self) -> u64 {
        self.memory.content_version()
    }
}
