//! Error types for the eventcask container.
//!
//! This module defines the unified error enum used throughout the crate. All
//! fallible operations return `Result<T, Error>`. Well-formed end-of-stream
//! is deliberately NOT an error: read APIs return
//! [`ReadOutcome::Eof`](crate::ReadOutcome) for the normal
//! terminal condition, so every `Err` from a read really is a failure.

use crate::types::{AccessMode, Codec};

/// Unified error type for all container operations.
///
/// The framing/integrity variants (`FileHeader`, `UnexpectedEof`,
/// `EventHeaderNotFound`, `EventHeaderTrailerMismatch`, `EventCrc`, `Bank`)
/// classify exactly what went wrong with the byte stream; corruption and
/// truncation are never conflated. None of them is retried automatically --
/// the caller decides whether to abort or re-open.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes at the start of the file do not carry the file-open magic.
    #[error("invalid file header: {0}")]
    FileHeader(String),

    /// The stream ended without a valid file trailer: truncation, distinct
    /// from both corruption and well-formed end-of-stream.
    #[error("unexpected end of stream: {0}")]
    UnexpectedEof(String),

    /// The bytes at the expected event position are neither a valid event
    /// header nor a file trailer.
    #[error("no event header at expected position: tags {open_tag:#010x}/{close_tag:#010x}")]
    EventHeaderNotFound {
        /// Open tag as read from the stream.
        open_tag: u32,
        /// Close tag as read from the stream.
        close_tag: u32,
    },

    /// Tag or payload-size inconsistency between an event's header and
    /// trailer.
    #[error("event header/trailer mismatch: {0}")]
    EventHeaderTrailerMismatch(String),

    /// The payload checksum does not match the trailer's CRC32.
    #[error("payload CRC32 mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    EventCrc {
        /// CRC32 recorded in the event trailer.
        stored: u32,
        /// CRC32 computed over the payload bytes just read.
        computed: u32,
    },

    /// The payload did not decompose exactly into banks.
    #[error("bank scan failed: {0}")]
    Bank(String),

    /// A bank name failed write-side validation.
    #[error("invalid bank name: {0}")]
    BankName(String),

    /// The requested codec is outside the capability set of this build.
    #[error("codec {codec} is not supported by this build")]
    UnsupportedCodec {
        /// The codec that was requested.
        codec: Codec,
    },

    /// The operation is only valid in the other access mode.
    #[error("operation requires {required} mode")]
    WrongAccessMode {
        /// The mode the operation needs.
        required: AccessMode,
    },

    /// Growing the event buffer failed; the in-progress operation cannot
    /// make progress without buffer space.
    #[error("failed to grow event buffer to {requested} bytes")]
    BufferAlloc {
        /// Capacity the buffer tried to reach.
        requested: u64,
    },

    /// The container entered the sticky faulted state on an earlier framing
    /// error; it must be closed and re-opened.
    #[error("container is faulted; close and re-open it")]
    Faulted,
}
