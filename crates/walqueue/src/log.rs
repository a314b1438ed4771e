//! Append-only, index-addressable on-disk record store with front-truncation.
//!
//! The log is a directory of segment files. Each segment is named by the
//! index of its first record (zero-padded decimal, `.seg` suffix) and holds
//! up to a configured number of records. Records are framed as
//! `len: u32 LE | crc32(payload): u32 LE | payload`.
//!
//! # Durability
//!
//! Every [`Log::write`] syncs the segment file before returning, so a crash
//! at any later point recovers `head` exactly to the last acknowledged
//! write. Segment creation and deletion, and replacement of the truncation
//! mark, sync the directory itself.
//!
//! # Recovery
//!
//! [`Log::open`] scans all segments in index order, verifying every record
//! checksum and rebuilding record offsets. A torn or checksum-failing record
//! at the tail of the last segment is dropped (the tail of a crashed write);
//! a bad record anywhere else means the log is unusable.
//!
//! # Truncation
//!
//! `truncate_front(upto)` uses the half-open convention: records with
//! `idx < upto` are dropped, `upto` itself survives. The new base is
//! persisted in a small mark file before any segment is deleted, so `base`
//! never moves backwards across restarts even when a partially-covered
//! segment still holds older records on disk.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

use crate::error::LogError;

/// A monotonically increasing index addressing records in the log.
pub type Idx = u64;

const SEGMENT_SUFFIX: &str = "seg";
const MARK_FILE: &str = "truncate.mark";
const FRAME_HEADER: usize = 8;

/// Base watermark persisted across restarts.
#[derive(Debug, Serialize, Deserialize)]
struct TruncMark {
    base: Idx,
}

#[derive(Debug)]
struct Segment {
    /// Index of the first record in this file.
    first: Idx,
    path: PathBuf,
    /// Byte offset of each record's frame header.
    offsets: Vec<u64>,
    /// Total bytes of valid frames.
    len: u64,
}

impl Segment {
    /// One past the last record in this file.
    fn end(&self) -> Idx {
        self.first + self.offsets.len() as u64
    }
}

/// An append-only record log rooted at a single directory.
///
/// The directory is owned exclusively by one log instance; there is no
/// cross-process locking.
#[derive(Debug)]
pub struct Log {
    dir: PathBuf,
    segments: Vec<Segment>,
    /// Append handle for the last segment, present whenever that segment
    /// can still take records.
    active: Option<File>,
    base: Idx,
    head: Idx,
    segment_entries: usize,
}

impl Log {
    /// Opens (or creates) the log in `dir`, recovering `base` and `head`
    /// from the directory contents.
    pub async fn open(dir: impl Into<PathBuf>, segment_entries: usize) -> Result<Self, LogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let mark = read_mark(&dir).await?;
        let mut names = list_segments(&dir).await?;
        names.sort_unstable_by_key(|(first, _)| *first);

        let mut segments = Vec::with_capacity(names.len());
        let mut next_expected: Option<Idx> = None;
        let last = names.len().saturating_sub(1);
        for (i, (first, path)) in names.into_iter().enumerate() {
            if let Some(expected) = next_expected {
                if first != expected {
                    return Err(LogError::Damaged {
                        path,
                        reason: format!("segment gap: expected first index {expected}, found {first}"),
                    });
                }
            }
            let segment = scan_segment(first, path, i == last).await?;
            next_expected = Some(segment.end());
            segments.push(segment);
        }

        let head = next_expected.unwrap_or_else(|| mark.unwrap_or(0));
        let base = mark
            .unwrap_or(0)
            .max(segments.first().map_or(head, |s| s.first))
            .min(head);

        // Reopen the last segment for appends if it still has room.
        let active = match segments.last() {
            Some(seg) if seg.offsets.len() < segment_entries => {
                Some(OpenOptions::new().append(true).open(&seg.path).await?)
            }
            _ => None,
        };

        Ok(Self {
            dir,
            segments,
            active,
            base,
            head,
            segment_entries: segment_entries.max(1),
        })
    }

    /// Lowest still-resident index.
    pub fn base(&self) -> Idx {
        self.base
    }

    /// Next index to be assigned.
    pub fn head(&self) -> Idx {
        self.head
    }

    /// Appends a record. `idx` must equal [`Log::head`]; the write is
    /// durable when this returns.
    pub async fn write(&mut self, idx: Idx, payload: &[u8]) -> Result<(), LogError> {
        if idx != self.head {
            return Err(LogError::OutOfOrderWrite { idx, head: self.head });
        }
        if payload.len() > u32::MAX as usize {
            return Err(LogError::RecordTooLarge { len: payload.len() });
        }

        if self.needs_rotation() {
            self.rotate().await?;
        }

        let mut frame = Vec::with_capacity(FRAME_HEADER + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        frame.extend_from_slice(payload);

        let file = self.active.as_mut().expect("rotation leaves an active segment");
        file.write_all(&frame).await?;
        file.sync_data().await?;

        let segment = self.segments.last_mut().expect("rotation leaves a segment");
        segment.offsets.push(segment.len);
        segment.len += frame.len() as u64;
        self.head += 1;
        Ok(())
    }

    /// Reads the record at `idx`.
    pub async fn read(&self, idx: Idx) -> Result<Vec<u8>, LogError> {
        if idx < self.base || idx >= self.head {
            return Err(LogError::NotFound { idx });
        }
        let pos = self
            .segments
            .partition_point(|s| s.first <= idx)
            .checked_sub(1)
            .ok_or(LogError::NotFound { idx })?;
        let segment = &self.segments[pos];
        let offset = segment.offsets[(idx - segment.first) as usize];

        let mut file = File::open(&segment.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut header = [0u8; FRAME_HEADER];
        file.read_exact(&mut header).await?;
        let len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
        let crc = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let mut payload = vec![0u8; len];
        file.read_exact(&mut payload).await?;

        if crc32fast::hash(&payload) != crc {
            return Err(LogError::Corrupt {
                idx,
                path: segment.path.clone(),
            });
        }
        Ok(payload)
    }

    /// Drops all records with `idx < upto` (half-open). The base watermark
    /// is persisted before segments are deleted; records inside a
    /// partially-covered segment stay on disk but become unreadable.
    pub async fn truncate_front(&mut self, upto: Idx) -> Result<(), LogError> {
        let upto = upto.min(self.head);
        if upto <= self.base {
            return Ok(());
        }

        write_mark(&self.dir, upto).await?;
        self.base = upto;

        let mut deleted = false;
        while let Some(segment) = self.segments.first() {
            if segment.end() > upto {
                break;
            }
            if self.segments.len() == 1 {
                // Dropping the active segment; appends will start a fresh one.
                self.active = None;
            }
            let segment = self.segments.remove(0);
            fs::remove_file(&segment.path).await?;
            deleted = true;
        }
        if deleted {
            sync_dir(&self.dir)?;
        }
        Ok(())
    }

    /// Flushes the active segment and releases the append handle. The log
    /// can no longer be written after this.
    pub async fn close(&mut self) -> Result<(), LogError> {
        if let Some(file) = self.active.take() {
            file.sync_all().await?;
        }
        Ok(())
    }

    fn needs_rotation(&self) -> bool {
        match (&self.active, self.segments.last()) {
            (Some(_), Some(segment)) => segment.offsets.len() >= self.segment_entries,
            _ => true,
        }
    }

    async fn rotate(&mut self) -> Result<(), LogError> {
        if let Some(file) = self.active.take() {
            file.sync_all().await?;
        }
        let path = self.dir.join(segment_name(self.head));
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .await?;
        sync_dir(&self.dir)?;
        self.segments.push(Segment {
            first: self.head,
            path,
            offsets: Vec::new(),
            len: 0,
        });
        self.active = Some(file);
        Ok(())
    }
}

fn segment_name(first: Idx) -> String {
    format!("{first:020}.{SEGMENT_SUFFIX}")
}

async fn list_segments(dir: &Path) -> Result<Vec<(Idx, PathBuf)>, LogError> {
    let mut names = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_SUFFIX) {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        match stem.parse::<Idx>() {
            Ok(first) => names.push((first, path)),
            Err(_) => {
                return Err(LogError::Damaged {
                    path,
                    reason: "segment file name is not an index".into(),
                })
            }
        }
    }
    Ok(names)
}

/// Scans a segment, verifying every frame. For the last segment a bad tail
/// is truncated away; for sealed segments any bad frame is fatal.
async fn scan_segment(first: Idx, path: PathBuf, is_last: bool) -> Result<Segment, LogError> {
    let data = fs::read(&path).await?;
    let mut offsets = Vec::new();
    let mut pos = 0usize;
    let mut damage: Option<&str> = None;

    while pos < data.len() {
        if pos + FRAME_HEADER > data.len() {
            damage = Some("torn frame header");
            break;
        }
        let len = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
        let crc = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().unwrap());
        let Some(end) = pos.checked_add(FRAME_HEADER + len).filter(|e| *e <= data.len()) else {
            damage = Some("torn frame payload");
            break;
        };
        if crc32fast::hash(&data[pos + FRAME_HEADER..end]) != crc {
            damage = Some("checksum mismatch");
            break;
        }
        offsets.push(pos as u64);
        pos = end;
    }

    if let Some(reason) = damage {
        if !is_last {
            return Err(LogError::Damaged {
                path,
                reason: format!("{reason} in sealed segment"),
            });
        }
        warn!(
            path = %path.display(),
            dropped_bytes = data.len() - pos,
            reason,
            "dropping damaged log tail"
        );
        let file = OpenOptions::new().write(true).open(&path).await?;
        file.set_len(pos as u64).await?;
        file.sync_all().await?;
    }

    Ok(Segment {
        first,
        path,
        offsets,
        len: pos as u64,
    })
}

async fn read_mark(dir: &Path) -> Result<Option<Idx>, LogError> {
    let path = dir.join(MARK_FILE);
    match fs::read(&path).await {
        Ok(bytes) => {
            let mark: TruncMark = bincode::deserialize(&bytes).map_err(|e| LogError::Damaged {
                path,
                reason: format!("unreadable truncation mark: {e}"),
            })?;
            Ok(Some(mark.base))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replaces the truncation mark atomically: write a temp file, fsync it,
/// rename over the old mark, fsync the directory.
async fn write_mark(dir: &Path, base: Idx) -> Result<(), LogError> {
    let bytes = bincode::serialize(&TruncMark { base }).map_err(|e| LogError::Damaged {
        path: dir.join(MARK_FILE),
        reason: format!("cannot encode truncation mark: {e}"),
    })?;
    let tmp = dir.join(format!("{MARK_FILE}.tmp"));
    let mut file = File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, dir.join(MARK_FILE)).await?;
    sync_dir(dir)?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
