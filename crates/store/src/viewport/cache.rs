//! Caches the last built window of physical lines.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::viewport::builder::PhysicalLine;

struct CacheEntry {
    physical_lines: Vec<PhysicalLine>,
    start_global: u64,
    end_global: u64,
    width: usize,
    content_version: u64,
}

/// Caches the last `(physical_lines, start_global, end_global, width,
/// content_version)` built by a viewport. Hit/miss counters are atomic so
/// they can be read without the owning lock.
pub struct ViewportCache {
    entry: Option<CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ViewportCache {
    pub fn new() -> Self {
        Self { entry: None, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    pub fn get(&self, start: u64, end: u64, width: usize, content_version: u64) -> Option<&[PhysicalLine]> {
        match &self.entry {
            Some(e) if e.start_global == start && e.end_global == end && e.width == width && e.content_version == content_version => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(&e.physical_lines)
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&mut self, physical_lines: Vec<PhysicalLine>, start: u64, end: u64, width: usize, content_version: u64) {
        self.entry = Some(CacheEntry { physical_lines, start_global: start, end_global: end, width, content_version });
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for ViewportCache {
    fn default() -> Self {
        Self::new()
    }
}
