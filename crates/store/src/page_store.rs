//! Append-only paged on-disk storage for logical lines.
//!
//! Pages target 64 KiB; each carries a 64-byte header, a per-line index,
//! and packed line data. A page transitions `Live -> Warm` once a
//! successor page is started; `Frozen` (archived) pages are out of scope
//! for now (the archive directory in the layout is reserved).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use termhist_model::{Cell, CellAttrs, Color, LogicalLine};
use tracing::trace;

use crate::config::PageStoreConfig;
use crate::error::{Error, Result};

const PAGE_MAGIC: &[u8; 8] = b"TXPAGE01";
const PAGE_VERSION: u32 = 1;
const HEADER_SIZE: usize = 64;
const LINE_INDEX_ENTRY_SIZE: usize = 16;
const CELL_ENCODED_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLifecycle {
    Live = 0,
    Warm = 1,
    Frozen = 2,
}

impl PageLifecycle {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PageLifecycle::Warm,
            2 => PageLifecycle::Frozen,
            _ => PageLifecycle::Live,
        }
    }
}

struct LineIndexEntry {
    offset: u32,
    timestamp: u64,
    line_flags: u8,
}

/// One page file's decoded header plus its line index, kept resident so
/// appends and lookups avoid re-reading the header from disk each time.
struct PageHandle {
    page_id: u64,
    lifecycle: PageLifecycle,
    first_global_idx: u64,
    first_timestamp: u64,
    last_timestamp: u64,
    line_index: Vec<LineIndexEntry>,
    body: Vec<u8>,
}

impl PageHandle {
    fn new(page_id: u64, first_global_idx: u64) -> Self {
        Self {
            page_id,
            lifecycle: PageLifecycle::Live,
            first_global_idx,
            first_timestamp: 0,
            last_timestamp: 0,
            line_index: Vec::new(),
            body: Vec::new(),
        }
    }

    fn line_count(&self) -> usize {
        self.line_index.len()
    }

    fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.line_index.len() * LINE_INDEX_ENTRY_SIZE + self.body.len()
    }

    fn path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(format!("{:020}.page", self.page_id))
    }

    fn write_to(&self, base_dir: &Path) -> Result<()> {
        fs::create_dir_all(base_dir)?;
        let mut out = Vec::with_capacity(self.encoded_size());

        out.extend_from_slice(PAGE_MAGIC);
        out.extend_from_slice(&PAGE_VERSION.to_le_bytes());
        out.extend_from_slice(&self.page_id.to_le_bytes());
        out.push(self.lifecycle as u8);
        out.push(0); // flags (compressed/encrypted), reserved
        out.extend_from_slice(&(self.line_index.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.first_global_idx.to_le_bytes());
        out.extend_from_slice(&self.first_timestamp.to_le_bytes());
        out.extend_from_slice(&self.last_timestamp.to_le_bytes());
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.resize(HEADER_SIZE, 0);

        for entry in &self.line_index {
            out.extend_from_slice(&entry.offset.to_le_bytes());
            out.extend_from_slice(&entry.timestamp.to_le_bytes());
            out.push(entry.line_flags);
            out.extend_from_slice(&[0u8; 3]);
        }

        out.extend_from_slice(&self.body);

        let path = self.path(base_dir);
        let mut f = File::create(&path)?;
        f.write_all(&out)?;
        Ok(())
    }

    fn read_from(base_dir: &Path, page_id: u64) -> Result<Self> {
        let path = base_dir.join(format!("{:020}.page", page_id));
        let mut f = File::open(&path)?;
        let mut raw = Vec::new();
        f.read_to_end(&mut raw)?;
        Self::decode(&raw)
    }

    fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(Error::corrupt_header("page shorter than header"));
        }
        if &raw[0..8] != PAGE_MAGIC {
            return Err(Error::corrupt_header("bad page magic"));
        }
        let version = u32::from_le_bytes(raw[8..12].try_into().unwrap());
        if version != PAGE_VERSION && version != 0 {
            return Err(Error::corrupt_header(format!("unsupported page version {version}")));
        }
        let page_id = u64::from_le_bytes(raw[12..20].try_into().unwrap());
        let lifecycle = PageLifecycle::from_u8(raw[20]);
        let line_count = u32::from_le_bytes(raw[22..26].try_into().unwrap()) as usize;
        let first_global_idx = u64::from_le_bytes(raw[26..34].try_into().unwrap());
        let first_timestamp = u64::from_le_bytes(raw[34..42].try_into().unwrap());
        let last_timestamp = u64::from_le_bytes(raw[42..50].try_into().unwrap());
        let uncompressed_size = u32::from_le_bytes(raw[50..54].try_into().unwrap()) as usize;

        let index_start = HEADER_SIZE;
        let index_end = index_start + line_count * LINE_INDEX_ENTRY_SIZE;
        if raw.len() < index_end + uncompressed_size {
            return Err(Error::bad_offset("page body shorter than declared size"));
        }

        let mut line_index = Vec::with_capacity(line_count);
        for i in 0..line_count {
            let base = index_start + i * LINE_INDEX_ENTRY_SIZE;
            let offset = u32::from_le_bytes(raw[base..base + 4].try_into().unwrap());
            let timestamp = u64::from_le_bytes(raw[base + 4..base + 12].try_into().unwrap());
            let line_flags = raw[base + 12];
            line_index.push(LineIndexEntry { offset, timestamp, line_flags });
        }

        let body = raw[index_end..index_end + uncompressed_size].to_vec();

        Ok(Self {
            page_id,
            lifecycle,
            first_global_idx,
            first_timestamp,
            last_timestamp,
            line_index,
            body,
        })
    }

    fn read_line(&self, slot: usize) -> Result<LogicalLine> {
        let entry = self.line_index.get(slot).ok_or(Error::NotFound)?;
        let start = entry.offset as usize;
        decode_line(&self.body[start..])
    }
}

/// Append-only, paged on-disk store of logical lines.
pub struct PageStore {
    base_dir: PathBuf,
    target_page_size: usize,
    live: Option<PageHandle>,
    next_page_id: u64,
    /// global_idx -> (page_id, slot). Lines in `live` are included.
    directory: HashMap<u64, (u64, usize)>,
    /// For `find_line_at`: page_id -> (first_global_idx, last_timestamp).
    page_summaries: Vec<(u64, u64, u64)>,
    line_count: u64,
}

impl PageStore {
    pub fn create(config: PageStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.base_dir)?;
        Ok(Self {
            base_dir: config.base_dir,
            target_page_size: config.target_page_size,
            live: None,
            next_page_id: 0,
            directory: HashMap::new(),
            page_summaries: Vec::new(),
            line_count: 0,
        })
    }

    /// Opens an existing store, rebuilding the directory from page files
    /// found on disk (sorted by page id).
    pub fn open(config: PageStoreConfig) -> Result<Self> {
        let mut store = Self::create(config)?;
        let mut page_ids: Vec<u64> = Vec::new();
        if store.base_dir.exists() {
            for entry in fs::read_dir(&store.base_dir)? {
                let entry = entry?;
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(stem) = name.strip_suffix(".page") {
                        if let Ok(id) = stem.parse::<u64>() {
                            page_ids.push(id);
                        }
                    }
                }
            }
        }
        page_ids.sort_unstable();

        for page_id in page_ids {
            let page = PageHandle::read_from(&store.base_dir, page_id)?;
            for (slot, entry) in page.line_index.iter().enumerate() {
                let g = page.first_global_idx + slot as u64;
                store.directory.insert(g, (page_id, slot));
                let _ = entry;
            }
            store.page_summaries.push((page_id, page.first_global_idx, page.last_timestamp));
            store.line_count = store.line_count.max(page.first_global_idx + page.line_count() as u64);
            store.next_page_id = store.next_page_id.max(page_id + 1);
        }
        Ok(store)
    }

    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    /// Appends a line, returning its assigned global index.
    pub fn append_line(&mut self, line: &LogicalLine, timestamp: u64, line_flags: u8) -> Result<u64> {
        let encoded = encode_line(line);
        let global_idx = self.line_count;

        let needs_new_page = match &self.live {
            None => true,
            Some(page) => {
                !page.line_index.is_empty()
                    && page.encoded_size() + LINE_INDEX_ENTRY_SIZE + encoded.len() > self.target_page_size
            }
        };

        if needs_new_page {
            self.roll_page()?;
            self.live = Some(PageHandle::new(self.next_page_id, global_idx));
            self.next_page_id += 1;
        }

        let page = self.live.as_mut().expect("live page just ensured");
        let slot = page.line_index.len();
        let offset = page.body.len() as u32;
        page.body.extend_from_slice(&encoded);
        page.line_index.push(LineIndexEntry { offset, timestamp, line_flags });
        if page.line_count() == 1 {
            page.first_timestamp = timestamp;
        }
        page.last_timestamp = timestamp;

        self.directory.insert(global_idx, (page.page_id, slot));
        self.line_count += 1;

        let page_id = page.page_id;
        page.write_to(&self.base_dir)?;
        if let Some(summary) = self.page_summaries.iter_mut().find(|(id, _, _)| *id == page_id) {
            summary.2 = timestamp;
        } else {
            self.page_summaries.push((page_id, global_idx, timestamp));
        }

        Ok(global_idx)
    }

    /// Applies an update to an already-persisted line (checkpoint-time
    /// last-write-wins resolution).
    pub fn update_line(&mut self, global_idx: u64, line: &LogicalLine, timestamp: u64, line_flags: u8) -> Result<()> {
        let (page_id, _slot) = match self.directory.get(&global_idx) {
            Some(v) => *v,
            None => {
                let assigned = self.append_line(line, timestamp, line_flags)?;
                debug_assert_eq!(assigned, global_idx);
                return Ok(());
            }
        };

        if self.live.as_ref().map(|p| p.page_id) == Some(page_id) {
            let page = self.live.as_mut().unwrap();
            let slot = self.directory[&global_idx].1;
            let encoded = encode_line(line);
            let offset = page.body.len() as u32;
            page.body.extend_from_slice(&encoded);
            page.line_index[slot] = LineIndexEntry { offset, timestamp, line_flags };
            page.last_timestamp = timestamp;
            page.write_to(&self.base_dir)?;
            return Ok(());
        }

        // Updating a warm page: rewrite it with the new line appended at a
        // fresh offset (pages are append-only internally too).
        let mut page = PageHandle::read_from(&self.base_dir, page_id)?;
        let slot = self.directory[&global_idx].1;
        let encoded = encode_line(line);
        let offset = page.body.len() as u32;
        page.body.extend_from_slice(&encoded);
        page.line_index[slot] = LineIndexEntry { offset, timestamp, line_flags };
        page.last_timestamp = page.last_timestamp.max(timestamp);
        page.write_to(&self.base_dir)?;
        Ok(())
    }

    pub fn read_line(&self, global_idx: u64) -> Result<LogicalLine> {
        let (page_id, slot) = *self.directory.get(&global_idx).ok_or(Error::NotFound)?;
        if let Some(live) = &self.live {
            if live.page_id == page_id {
                return live.read_line(slot);
            }
        }
        let page = PageHandle::read_from(&self.base_dir, page_id)?;
        page.read_line(slot)
    }

    pub fn read_line_range(&self, start: u64, end: u64) -> Result<Vec<LogicalLine>> {
        let mut out = Vec::new();
        for g in start..end.min(self.line_count) {
            out.push(self.read_line(g)?);
        }
        Ok(out)
    }

    pub fn get_timestamp(&self, global_idx: u64) -> Result<u64> {
        let (page_id, slot) = *self.directory.get(&global_idx).ok_or(Error::NotFound)?;
        if let Some(live) = &self.live {
            if live.page_id == page_id {
                return Ok(live.line_index[slot].timestamp);
            }
        }
        let page = PageHandle::read_from(&self.base_dir, page_id)?;
        Ok(page.line_index[slot].timestamp)
    }

    /// Binary search across pages by `last_timestamp`, then within-page by
    /// per-line timestamp. Inclusive-of-ceiling: returns the first line
    /// whose timestamp is `>= timestamp`.
    pub fn find_line_at(&self, timestamp: u64) -> Result<u64> {
        if self.page_summaries.is_empty() {
            return Err(Error::NotFound);
        }
        let page_pos = self
            .page_summaries
            .partition_point(|(_, _, last_ts)| *last_ts < timestamp);
        let page_pos = page_pos.min(self.page_summaries.len() - 1);
        let (page_id, first_global_idx, _) = self.page_summaries[page_pos];

        let page = if self.live.as_ref().map(|p| p.page_id) == Some(page_id) {
            None
        } else {
            Some(PageHandle::read_from(&self.base_dir, page_id)?)
        };
        let index_ref: &[LineIndexEntry] = match (&page, &self.live) {
            (Some(p), _) => &p.line_index,
            (None, Some(live)) => &live.line_index,
            (None, None) => return Err(Error::NotFound),
        };

        let within = index_ref.partition_point(|e| e.timestamp < timestamp);
        let within = within.min(index_ref.len().saturating_sub(1));
        Ok(first_global_idx + within as u64)
    }

    fn roll_page(&mut self) -> Result<()> {
        if let Some(mut page) = self.live.take() {
            if !page.line_index.is_empty() {
                page.lifecycle = PageLifecycle::Warm;
                page.write_to(&self.base_dir)?;
                trace!(page_id = page.page_id, lines = page.line_count(), "page rolled to warm");
            }
        }
        Ok(())
    }
}

// =============================================================================
// Line / cell encoding (v2, per the page format)
// =============================================================================

const FLAG_HAS_OVERLAY: u8 = 0b01;
const FLAG_SYNTHETIC: u8 = 0b10;

pub(crate) fn encode_line(line: &LogicalLine) -> Vec<u8> {
    let mut out = Vec::new();
    let mut flags = 0u8;
    if line.overlay.is_some() {
        flags |= FLAG_HAS_OVERLAY;
    }
    if line.synthetic {
        flags |= FLAG_SYNTHETIC;
    }
    out.push(flags);
    out.extend_from_slice(&(line.cells.len() as u32).to_le_bytes());
    out.extend_from_slice(&line.fixed_width.to_le_bytes());
    for cell in &line.cells {
        encode_cell(&mut out, cell);
    }
    if let Some(overlay) = &line.overlay {
        out.extend_from_slice(&line.overlay_width.to_le_bytes());
        out.extend_from_slice(&(overlay.len() as u32).to_le_bytes());
        for cell in overlay {
            encode_cell(&mut out, cell);
        }
    }
    out
}

pub(crate) fn decode_line(data: &[u8]) -> Result<LogicalLine> {
    if data.len() < 9 {
        return Err(Error::bad_offset("line header truncated"));
    }
    let flags = data[0];
    let cell_count = u32::from_le_bytes(data[1..5].try_into().unwrap()) as usize;
    let fixed_width = u32::from_le_bytes(data[5..9].try_into().unwrap());

    let mut pos = 9;
    let mut cells = Vec::with_capacity(cell_count);
    for _ in 0..cell_count {
        let (cell, len) = decode_cell(&data[pos..])?;
        cells.push(cell);
        pos += len;
    }

    let mut line = LogicalLine::from_cells(cells).with_fixed_width(fixed_width);
    line.fixed_width = fixed_width;
    line.synthetic = flags & FLAG_SYNTHETIC != 0;

    if flags & FLAG_HAS_OVERLAY != 0 {
        if data.len() < pos + 8 {
            return Err(Error::bad_offset("overlay header truncated"));
        }
        let overlay_width = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap());
        let overlay_count = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as usize;
        pos += 8;
        let mut overlay = Vec::with_capacity(overlay_count);
        for _ in 0..overlay_count {
            let (cell, len) = decode_cell(&data[pos..])?;
            overlay.push(cell);
            pos += len;
        }
        line = line.with_overlay(overlay, overlay_width);
    }

    Ok(line)
}

fn encode_cell(out: &mut Vec<u8>, cell: &Cell) {
    out.extend_from_slice(&(cell.codepoint as i32).to_le_bytes());
    encode_color(out, &cell.fg);
    encode_color(out, &cell.bg);
    out.extend_from_slice(&cell.attrs.bits_u16().to_le_bytes());
}

fn decode_cell(data: &[u8]) -> Result<(Cell, usize)> {
    if data.len() < CELL_ENCODED_SIZE {
        return Err(Error::bad_offset("cell truncated"));
    }
    let codepoint = i32::from_le_bytes(data[0..4].try_into().unwrap()) as u32;
    let (fg, fg_len) = decode_color(&data[4..9]);
    let (bg, bg_len) = decode_color(&data[9..14]);
    let _ = (fg_len, bg_len);
    let attrs_bits = u16::from_le_bytes(data[14..16].try_into().unwrap());
    let attrs = CellAttrs::from_bits_u16(attrs_bits);
    Ok((Cell::new(codepoint, fg, bg, attrs), CELL_ENCODED_SIZE))
}

/// `mode:u8` then a 4-byte encoded value, matching the 16-byte cell budget:
/// mode 0 = Default (value ignored), 1 = Standard(idx), 2 = Palette256(idx),
/// 3 = TrueColor(r,g,b).
fn encode_color(out: &mut Vec<u8>, color: &Color) {
    match *color {
        Color::Default => {
            out.push(0);
            out.extend_from_slice(&[0u8; 4]);
        }
        Color::Standard(idx) => {
            out.push(1);
            out.extend_from_slice(&[idx, 0, 0, 0]);
        }
        Color::Palette256(idx) => {
            out.push(2);
            out.extend_from_slice(&[idx, 0, 0, 0]);
        }
        Color::TrueColor { r, g, b } => {
            out.push(3);
            out.extend_from_slice(&[r, g, b, 0]);
        }
    }
}

fn decode_color(data: &[u8]) -> (Color, usize) {
    let mode = data[0];
    let color = match mode {
        1 => Color::Standard(data[1]),
        2 => Color::Palette256(data[1]),
        3 => Color::TrueColor { r: data[1], g: data[2], b: data[3] },
        _ => Color::Default,
    };
    (color, 5)
}

// bitflags's generated type only exposes bits() as the underlying integer
// type (u8 here); these small helpers keep the 16-byte cell encoding's
// u16 attribute field centralized in one place.
trait AttrsCodec {
    fn bits_u16(&self) -> u16;
    fn from_bits_u16(bits: u16) -> Self;
}

impl AttrsCodec for CellAttrs {
    fn bits_u16(&self) -> u16 {
        self.bits() as u16
    }

    fn from_bits_u16(bits: u16) -> Self {
        CellAttrs::from_bits_truncate(bits as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn line(text: &str) -> LogicalLine {
        LogicalLine::from_cells(
            text.chars()
                .map(|c| Cell::new(c as u32, Color::Default, Color::Default, CellAttrs::empty()))
                .collect(),
        )
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = line("hello");
        let encoded = encode_line(&original);
        let decoded = decode_line(&encoded).unwrap();
        assert_eq!(decoded.cells.len(), 5);
        assert_eq!(decoded.cells[0].codepoint, 'h' as u32);
    }

    #[test]
    fn test_encode_decode_with_overlay() {
        let original = line("x").with_overlay(vec![Cell::new('+' as u32, Color::Default, Color::Default, CellAttrs::empty())], 40);
        let encoded = encode_line(&original);
        let decoded = decode_line(&encoded).unwrap();
        assert_eq!(decoded.overlay.unwrap().len(), 1);
        assert_eq!(decoded.overlay_width, 40);
    }

    #[test]
    fn test_append_and_read_line() {
        let dir = tempdir().unwrap();
        let mut store = PageStore::create(PageStoreConfig::new(dir.path())).unwrap();
        let idx = store.append_line(&line("hi"), 1000, 0).unwrap();
        assert_eq!(idx, 0);
        let read = store.read_line(0).unwrap();
        assert_eq!(read.cells.len(), 2);
    }

    #[test]
    fn test_read_not_found() {
        let dir = tempdir().unwrap();
        let store = PageStore::create(PageStoreConfig::new(dir.path())).unwrap();
        assert!(matches!(store.read_line(0), Err(Error::NotFound)));
    }

    #[test]
    fn test_page_rollover_on_size() {
        let dir = tempdir().unwrap();
        let mut store = PageStore::create(
            PageStoreConfig::new(dir.path()).with_target_page_size(200),
        )
        .unwrap();
        for i in 0..20 {
            store.append_line(&line(&"x".repeat(20)), i, 0).unwrap();
        }
        // Multiple page files should exist once the target size is exceeded.
        let pages = fs::read_dir(dir.path()).unwrap().count();
        assert!(pages > 1);
    }

    #[test]
    fn test_reopen_rebuilds_directory() {
        let dir = tempdir().unwrap();
        {
            let mut store = PageStore::create(PageStoreConfig::new(dir.path())).unwrap();
            store.append_line(&line("abc"), 1, 0).unwrap();
            store.append_line(&line("def"), 2, 0).unwrap();
        }
        let reopened = PageStore::open(PageStoreConfig::new(dir.path())).unwrap();
        assert_eq!(reopened.line_count(), 2);
        assert_eq!(reopened.read_line(1).unwrap().cells.len(), 3);
    }

    #[test]
    fn test_find_line_at_timestamp() {
        let dir = tempdir().unwrap();
        let mut store = PageStore::create(PageStoreConfig::new(dir.path())).unwrap();
        store.append_line(&line("a"), 100, 0).unwrap();
        store.append_line(&line("b"), 200, 0).unwrap();
        store.append_line(&line("c"), 300, 0).unwrap();
        let found = store.find_line_at(150).unwrap();
        assert_eq!(found, 1);
    }

    #[test]
    fn test_update_line_last_write_wins() {
        let dir = tempdir().unwrap();
        let mut store = PageStore::create(PageStoreConfig::new(dir.path())).unwrap();
        store.append_line(&line("old"), 1, 0).unwrap();
        store.update_line(0, &line("new-value"), 2, 0).unwrap();
        let read = store.read_line(0).unwrap();
        assert_eq!(read.cells.len(), "new-value".len());
    }

    #[test]
    fn test_corrupt_header_rejected() {
        let bad = vec![0u8; HEADER_SIZE];
        assert!(matches!(PageHandle::decode(&bad), Err(Error::Corruption(_))));
    }
}
