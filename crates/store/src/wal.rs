//! Write-ahead log fronting a [`PageStore`].
//!
//! Records are length-delimited and CRC32-protected. On open, the log is
//! replayed from the start; a record with a bad CRC stops replay there,
//! treating everything after it as a torn tail.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::{Duration, Instant};

use termhist_model::LogicalLine;
use tracing::{info, warn};

use crate::config::WalConfig;
use crate::error::{Error, Result};
use crate::page_store::PageStore;

const WAL_MAGIC: &[u8; 8] = b"TXWAL_01";
const WAL_VERSION: u32 = 1;
const HEADER_SIZE: usize = 32;

const KIND_APPEND: u8 = 0;
const KIND_METADATA: u8 = 1;
const KIND_CHECKPOINT_MARK: u8 = 2;

/// A scroll-position/cursor snapshot, durable across checkpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub scroll_offset: u64,
    pub live_edge_base: u64,
    pub cursor_x: u32,
    pub cursor_y: u32,
    pub timestamp: u64,
}

impl ViewportState {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(28);
        out.extend_from_slice(&self.scroll_offset.to_le_bytes());
        out.extend_from_slice(&self.live_edge_base.to_le_bytes());
        out.extend_from_slice(&self.cursor_x.to_le_bytes());
        out.extend_from_slice(&self.cursor_y.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 28 {
            return Err(Error::bad_offset("metadata record truncated"));
        }
        Ok(Self {
            scroll_offset: u64::from_le_bytes(data[0..8].try_into().unwrap()),
            live_edge_base: u64::from_le_bytes(data[8..16].try_into().unwrap()),
            cursor_x: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            cursor_y: u32::from_le_bytes(data[20..24].try_into().unwrap()),
            timestamp: u64::from_le_bytes(data[24..28].try_into().unwrap()),
        })
    }
}

struct PendingEntry {
    timestamp: u64,
    line: LogicalLine,
}

/// Durable commit log in front of [`PageStore`].
pub struct WriteAheadLog {
    file: File,
    store: PageStore,
    pending: BTreeMap<u64, PendingEntry>,
    recovered_metadata: Option<ViewportState>,
    latest_metadata: Option<ViewportState>,
    last_written_metadata: Option<ViewportState>,
    checkpoint_size_threshold: u64,
    checkpoint_interval: Duration,
    last_checkpoint_at: Instant,
    bytes_since_checkpoint: u64,
}

impl WriteAheadLog {
    pub fn open(config: WalConfig, mut store: PageStore) -> Result<Self> {
        let existed = config.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&config.path)?;

        if !existed {
            write_header(&mut file)?;
        } else {
            check_header(&mut file)?;
        }

        let (pending, recovered_metadata, bytes_since_checkpoint) = replay(&mut file, &mut store)?;

        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            file,
            store,
            pending,
            recovered_metadata,
            latest_metadata: None,
            last_written_metadata: None,
            checkpoint_size_threshold: config.checkpoint_size_threshold,
            checkpoint_interval: config.checkpoint_interval,
            last_checkpoint_at: Instant::now(),
            bytes_since_checkpoint,
        })
    }

    pub fn recovered_metadata(&self) -> Option<&ViewportState> {
        self.recovered_metadata.as_ref()
    }

    pub fn append(&mut self, global_idx: u64, line: LogicalLine, timestamp: u64) -> Result<()> {
        let payload = encode_append(global_idx, timestamp, &line);
        self.write_record(KIND_APPEND, &payload)?;
        self.pending.insert(global_idx, PendingEntry { timestamp, line });
        self.maybe_auto_checkpoint()
    }

    pub fn write_metadata(&mut self, state: ViewportState) -> Result<()> {
        let payload = state.encode();
        self.write_record(KIND_METADATA, &payload)?;
        self.last_written_metadata = Some(state.clone());
        self.latest_metadata = Some(state);
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn read_line(&self, global_idx: u64) -> Result<LogicalLine> {
        if let Some(entry) = self.pending.get(&global_idx) {
            return Ok(entry.line.clone());
        }
        self.store.read_line(global_idx)
    }

    /// Reads a range, preferring pending (in-memory, not yet checkpointed)
    /// entries over what is already on disk.
    pub fn read_line_range(&self, start: u64, end: u64) -> Result<Vec<LogicalLine>> {
        (start..end).map(|g| self.read_line(g)).collect()
    }

    /// Lines committed to PageStore, independent of anything still pending.
    pub fn committed_line_count(&self) -> u64 {
        self.store.line_count()
    }

    /// Committed count plus pending (unique indices).
    pub fn line_count(&self) -> u64 {
        let committed = self.store.line_count();
        let max_pending = self.pending.keys().next_back().map(|g| g + 1).unwrap_or(0);
        committed.max(max_pending)
    }

    /// Drains pending APPENDs into PageStore, truncates the WAL, and
    /// re-writes a fresh METADATA record if one has been published.
    pub fn checkpoint(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for (global_idx, entry) in &pending {
            self.store.update_line(*global_idx, &entry.line, entry.timestamp, 0)?;
        }

        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        write_header(&mut self.file)?;
        self.file.seek(SeekFrom::End(0))?;
        self.bytes_since_checkpoint = 0;
        self.last_checkpoint_at = Instant::now();

        info!(lines = pending.len(), "wal checkpointed to page store");

        if let Some(state) = self.latest_metadata.clone() {
            self.write_metadata(state)?;
        }

        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.checkpoint()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn write_record(&mut self, kind: u8, payload: &[u8]) -> Result<()> {
        let mut record = Vec::with_capacity(9 + payload.len() + 4);
        record.push(kind);
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(payload);
        let crc = crc32fast::hash(&record);
        record.extend_from_slice(&crc.to_le_bytes());

        self.file.write_all(&record)?;
        self.bytes_since_checkpoint += record.len() as u64;
        Ok(())
    }

    fn maybe_auto_checkpoint(&mut self) -> Result<()> {
        let size_triggered =
            self.checkpoint_size_threshold > 0 && self.bytes_since_checkpoint >= self.checkpoint_size_threshold;
        let interval_triggered = !self.checkpoint_interval.is_zero()
            && self.last_checkpoint_at.elapsed() >= self.checkpoint_interval;

        if size_triggered || interval_triggered {
            self.checkpoint()?;
        }
        Ok(())
    }
}

fn write_header(file: &mut File) -> Result<()> {
    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.extend_from_slice(WAL_MAGIC);
    header.extend_from_slice(&WAL_VERSION.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes()); // flags, reserved
    header.resize(HEADER_SIZE, 0);
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header)?;
    Ok(())
}

fn check_header(file: &mut File) -> Result<()> {
    let mut header = [0u8; HEADER_SIZE];
    file.seek(SeekFrom::Start(0))?;
    let n = file.read(&mut header)?;
    if n < 12 || &header[0..8] != WAL_MAGIC {
        return Err(Error::corrupt_header("bad wal magic"));
    }
    Ok(())
}

/// Replays the WAL from just past its header, applying valid records to an
/// in-memory pending map and the given PageStore. Stops at the first
/// record with a bad CRC (treated as a torn tail).
fn replay(
    file: &mut File,
    _store: &mut PageStore,
) -> Result<(BTreeMap<u64, PendingEntry>, Option<ViewportState>, u64)> {
    file.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;

    let mut pending = BTreeMap::new();
    let mut recovered_metadata = None;
    let mut pos = 0usize;
    let mut consumed = 0u64;

    while pos + 5 <= raw.len() {
        let kind = raw[pos];
        let payload_len = u32::from_le_bytes(raw[pos + 1..pos + 5].try_into().unwrap()) as usize;
        let record_end = pos + 5 + payload_len + 4;
        if record_end > raw.len() {
            warn!(at = pos, "wal record extends past end of file, treating as torn tail");
            break;
        }

        let payload = &raw[pos + 5..pos + 5 + payload_len];
        let crc_bytes = &raw[pos + 5 + payload_len..record_end];
        let expected_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        let actual_crc = crc32fast::hash(&raw[pos..pos + 5 + payload_len]);

        if actual_crc != expected_crc {
            warn!(at = pos, "wal record crc mismatch, stopping replay (torn tail)");
            break;
        }

        match kind {
            KIND_APPEND => {
                if let Ok((global_idx, timestamp, line)) = decode_append(payload) {
                    pending.insert(global_idx, PendingEntry { timestamp, line });
                }
            }
            KIND_METADATA => {
                if let Ok(state) = ViewportState::decode(payload) {
                    recovered_metadata = Some(state);
                }
            }
            KIND_CHECKPOINT_MARK => {
                // Marks a successful flush; nothing older survives it.
                pending.clear();
            }
            _ => {}
        }

        pos = record_end;
        consumed = pos as u64;
    }

    Ok((pending, recovered_metadata, consumed))
}

fn encode_append(global_idx: u64, timestamp: u64, line: &LogicalLine) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&global_idx.to_le_bytes());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(&crate::page_store::encode_line(line));
    out
}

fn decode_append(data: &[u8]) -> Result<(u64, u64, LogicalLine)> {
    if data.len() < 16 {
        return Err(Error::bad_offset("append record truncated"));
    }
    let global_idx = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let timestamp = u64::from_le_bytes(data[8..16].try_into().unwrap());
    let line = crate::page_store::decode_line(&data[16..])?;
    Ok((global_idx, timestamp, line))
}
