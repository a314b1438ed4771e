//! Error types and failure classification for queue operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::log::Idx;

/// Errors produced by the on-disk log.
#[derive(Debug, Error)]
pub enum LogError {
    /// The requested index is below the base or at/after the head.
    #[error("no record at index {idx}")]
    NotFound { idx: Idx },

    /// Writes are append-only; the given index is not the current head.
    #[error("write at index {idx} rejected, log head is {head}")]
    OutOfOrderWrite { idx: Idx, head: Idx },

    /// A record failed its checksum on read.
    #[error("record {idx} in {path} failed checksum verification")]
    Corrupt { idx: Idx, path: PathBuf },

    /// The directory contents are not a usable log (gaps between segments,
    /// a damaged sealed segment, an unreadable truncation mark).
    #[error("log directory is damaged: {reason} ({path})")]
    Damaged { path: PathBuf, reason: String },

    /// Payload does not fit the record frame.
    #[error("record of {len} bytes exceeds the frame limit")]
    RecordTooLarge { len: usize },

    /// Underlying filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors produced while encoding or decoding entry payloads.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("encode: {0}")]
    Encode(String),
    #[error("decode: {0}")]
    Decode(String),
}

/// Errors surfaced by sinks when forwarding items downstream.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// Transport-layer error (network, gRPC, HTTP).
    #[error("transport error: {0}")]
    Transport(String),
    /// The downstream receiver rejected the payload.
    #[error("rejected by receiver: {0}")]
    Rejected(String),
    /// Forwarding timed out.
    #[error("forwarding timed out")]
    Timeout,
    /// The sink has been closed and accepts no further items.
    #[error("sink is closed")]
    Closed,
}

/// Top-level error type for queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("log: {0}")]
    Log(#[from] LogError),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    #[error("sink: {0}")]
    Sink(#[from] SinkError),
}

/// How the queue reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Log the failure and keep running.
    Recoverable,
    /// Terminate the affected background loop.
    Fatal,
}

/// Classifies queue failures into [`Severity`] levels.
///
/// The queue consults the policy on every read, sink and truncation failure.
/// Implementations must not block; classification runs inside the forwarder
/// and truncator loops.
pub trait FailurePolicy: Send + Sync {
    /// A record could not be read or decoded at the forwarder's position.
    fn on_read(&self, _err: &QueueError) -> Severity {
        Severity::Recoverable
    }

    /// The sink rejected an item or a flush.
    fn on_sink(&self, _err: &SinkError) -> Severity {
        Severity::Recoverable
    }

    /// The log failed to drop acknowledged entries. Left unchecked this
    /// grows the directory without bound, so the default is fatal.
    fn on_truncate(&self, _err: &LogError) -> Severity {
        Severity::Fatal
    }
}

/// Default classification: read and sink failures are survivable,
/// truncation failures are not.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl FailurePolicy for DefaultPolicy {}

/// Treats every failure as fatal. Useful when operators prefer a crash
/// over silently skipping records.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictPolicy;

impl FailurePolicy for StrictPolicy {
    fn on_read(&self, _err: &QueueError) -> Severity {
        Severity::Fatal
    }

    fn on_sink(&self, _err: &SinkError) -> Severity {
        Severity::Fatal
    }
}
