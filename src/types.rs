//! Foundational public types for the eventcask container.

use std::fmt;

/// Default capacity of the event buffer in bytes (1 MiB).
///
/// The buffer grows by doubling whenever an event outgrows it, so this is a
/// starting point, not a limit.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Whether a container is opened for writing or for reading.
///
/// The mode is fixed for the container's whole lifetime; a single instance
/// is never both. Switching modes means closing and opening a new container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Sequential, integrity-checked read-back of an existing file.
    Read,
    /// Append-only write of a new file.
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => f.write_str("read"),
            AccessMode::Write => f.write_str("write"),
        }
    }
}

/// Compression transform layered on the raw byte transport.
///
/// Whether a codec is actually usable is a property of the
/// [`Capabilities`](crate::Capabilities) set, not of this enum:
/// selecting an unsupported codec fails fast when opening for read, and
/// falls back to uncompressed with a warning when opening for write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Plain file, no transform.
    None,
    Gzip,
    Bzip2,
    Xz,
    Lzo,
}

impl Codec {
    /// Filename suffix appended to the output path when writing with this
    /// codec.
    pub fn suffix(self) -> &'static str {
        match self {
            Codec::None => "",
            Codec::Gzip => ".gz",
            Codec::Bzip2 => ".bz2",
            Codec::Xz => ".xz",
            Codec::Lzo => ".lzo",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::None => f.write_str("none"),
            Codec::Gzip => f.write_str("gzip"),
            Codec::Bzip2 => f.write_str("bzip2"),
            Codec::Xz => f.write_str("xz"),
            Codec::Lzo => f.write_str("lzo"),
        }
    }
}
