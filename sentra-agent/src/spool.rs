// sentra-agent/src/spool.rs
// Disk-backed spill buffer: numbered segment files of length-prefixed JSON
// batches. Bounded in total size; when full, new spills are rejected so
// the oldest data wins. Drain replays oldest-first and unlinks segments as
// they empty out.

use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::event::Event;
use sentra_core::log_warn;

const SEGMENT_EXT: &str = "spool";

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("spool is full")]
    Full,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub batches_sent: usize,
    pub events_sent: usize,
}

struct SpoolInner {
    dir: PathBuf,
    max_segment_bytes: u64,
    max_total_bytes: u64,
    next_seq: u64,
}

/// Append-only spill buffer. One mutex covers spill and drain, so the two
/// never interleave.
pub struct DiskSpool {
    inner: Mutex<SpoolInner>,
}

impl DiskSpool {
    pub fn new(
        dir: impl Into<PathBuf>,
        max_segment_bytes: u64,
        max_total_bytes: u64,
    ) -> Result<DiskSpool, SpoolError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        // resume numbering after any segments left by a previous run
        let next_seq = segments(&dir)?
            .last()
            .map(|(seq, _)| seq + 1)
            .unwrap_or(0);

        Ok(DiskSpool {
            inner: Mutex::new(SpoolInner {
                dir,
                max_segment_bytes,
                max_total_bytes,
                next_seq,
            }),
        })
    }

    /// Append one batch. `Err(Full)` when the total size bound would be
    /// exceeded - the caller counts the drop.
    pub fn spill(&self, batch: &[Event]) -> Result<(), SpoolError> {
        let payload = serde_json::to_vec(batch)?;
        let entry_len = payload.len() as u64 + 4;

        let mut inner = self.inner.lock();
        if total_bytes(&inner.dir)? + entry_len > inner.max_total_bytes {
            return Err(SpoolError::Full);
        }

        // append to the newest segment while it has room, else roll over
        let reusable = match segments(&inner.dir)?.last() {
            Some((_, path)) if fs::metadata(path)?.len() + entry_len <= inner.max_segment_bytes => {
                Some(path.clone())
            }
            _ => None,
        };
        let path = match reusable {
            Some(path) => path,
            None => {
                let path = inner
                    .dir
                    .join(format!("{:08}.{}", inner.next_seq, SEGMENT_EXT));
                inner.next_seq += 1;
                path
            }
        };

        let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&(payload.len() as u32).to_be_bytes())?;
        writer.write_all(&payload)?;
        writer.flush()?;
        Ok(())
    }

    /// Replay spooled batches oldest-first through `send`. Stops at the
    /// first failure, rewriting the current segment with its unsent
    /// remainder. Fully sent segments are unlinked.
    pub fn drain<F>(&self, mut send: F) -> DrainStats
    where
        F: FnMut(&[Event]) -> Result<(), String>,
    {
        let inner = self.inner.lock();
        let mut stats = DrainStats::default();

        let segment_list = match segments(&inner.dir) {
            Ok(list) => list,
            Err(e) => {
                log_warn!("spool scan failed: {}", e);
                return stats;
            }
        };

        for (_, path) in segment_list {
            let batches = match read_segment(&path) {
                Ok(batches) => batches,
                Err(e) => {
                    // unreadable segment: drop it rather than wedge the drain
                    log_warn!("dropping corrupt spool segment {}: {}", path.display(), e);
                    let _ = fs::remove_file(&path);
                    continue;
                }
            };

            let mut unsent = Vec::new();
            let mut failed = false;
            for batch in batches {
                if failed {
                    unsent.push(batch);
                    continue;
                }
                match send(&batch) {
                    Ok(()) => {
                        stats.batches_sent += 1;
                        stats.events_sent += batch.len();
                    }
                    Err(e) => {
                        log_warn!("spool drain send failed: {}", e);
                        failed = true;
                        unsent.push(batch);
                    }
                }
            }

            if unsent.is_empty() {
                let _ = fs::remove_file(&path);
            } else {
                if let Err(e) = rewrite_segment(&path, &unsent) {
                    log_warn!("failed to rewrite spool segment {}: {}", path.display(), e);
                }
                break; // store still down; stop replaying
            }
        }
        stats
    }

    /// Events currently buffered on disk.
    pub fn pending_events(&self) -> usize {
        let inner = self.inner.lock();
        let Ok(segment_list) = segments(&inner.dir) else {
            return 0;
        };
        segment_list
            .iter()
            .filter_map(|(_, path)| read_segment(path).ok())
            .flatten()
            .map(|batch| batch.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_events() == 0
    }
}

fn segments(dir: &Path) -> std::io::Result<Vec<(u64, PathBuf)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
            continue;
        }
        if let Some(seq) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            out.push((seq, path));
        }
    }
    out.sort();
    Ok(out)
}

fn read_segment(path: &Path) -> Result<Vec<Vec<Event>>, SpoolError> {
    let mut file = File::open(path)?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;

    let mut batches = Vec::new();
    let mut cursor = 0usize;
    while cursor + 4 <= raw.len() {
        let len = u32::from_be_bytes(raw[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        if cursor + len > raw.len() {
            return Err(SpoolError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated spool entry",
            )));
        }
        let batch: Vec<Event> = serde_json::from_slice(&raw[cursor..cursor + len])?;
        cursor += len;
        batches.push(batch);
    }
    Ok(batches)
}

fn rewrite_segment(path: &Path, batches: &[Vec<Event>]) -> Result<(), SpoolError> {
    let tmp = path.with_extension("spool.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        for batch in batches {
            let payload = serde_json::to_vec(batch)?;
            writer.write_all(&(payload.len() as u32).to_be_bytes())?;
            writer.write_all(&payload)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn total_bytes(dir: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for (_, path) in segments(dir)? {
        total += fs::metadata(&path)?.len();
    }
    Ok(total)
}
