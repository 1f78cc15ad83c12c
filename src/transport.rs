//! Byte-stream transport: plain or compression-filtered file streams.
//!
//! This is the container engine's external-collaborator boundary. The engine
//! sees two tagged handles -- [`EventSink`] for writing, [`EventSource`] for
//! reading -- selected once at open time, so there is no runtime confusion
//! about which direction a handle supports.
//!
//! Codec support is a runtime [`Capabilities`] value rather than a
//! compile-time conditional in the engine. The support asymmetry is part of
//! the contract: an unsupported codec fails fast when opening for read
//! (decompressing wrong is data loss), but falls back to writing
//! uncompressed with a warning when opening for write (losing compression is
//! an inconvenience, not corruption).

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::error::Error;
use crate::types::Codec;

/// The set of codecs this transport can actually encode and decode.
///
/// `Codec::None` is always available. The default set reflects the crates
/// compiled into this build: gzip, bzip2, and xz. There is no maintained
/// Rust lzo stream codec, so lzo stays outside the default set; enabling it
/// by hand still fails at open time because no encoder exists to back it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub gzip: bool,
    pub bzip2: bool,
    pub xz: bool,
    pub lzo: bool,
}

impl Capabilities {
    /// The capability set of this build.
    pub fn compiled() -> Self {
        Capabilities {
            gzip: true,
            bzip2: true,
            xz: true,
            lzo: false,
        }
    }

    /// Whether `codec` is inside this capability set.
    pub fn supports(&self, codec: Codec) -> bool {
        match codec {
            Codec::None => true,
            Codec::Gzip => self.gzip,
            Codec::Bzip2 => self.bzip2,
            Codec::Xz => self.xz,
            Codec::Lzo => self.lzo,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::compiled()
    }
}

/// xz preset used for write streams; 6 is the xz(1) default.
const XZ_PRESET: u32 = 6;

enum SinkKind {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Bzip2(BzEncoder<BufWriter<File>>),
    Xz(XzEncoder<BufWriter<File>>),
}

// Manual impl: the bzip2/xz2 encoder types do not implement `Debug`.
impl std::fmt::Debug for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Plain(_) => f.write_str("Plain"),
            SinkKind::Gzip(_) => f.write_str("Gzip"),
            SinkKind::Bzip2(_) => f.write_str("Bzip2"),
            SinkKind::Xz(_) => f.write_str("Xz"),
        }
    }
}

/// Write half of the transport: one output file, optionally behind a
/// compression encoder.
#[derive(Debug)]
pub(crate) struct EventSink {
    inner: SinkKind,
}

impl EventSink {
    /// Create the output file for `path`, layering the requested codec.
    ///
    /// If the codec is outside the capability set, falls back to writing
    /// uncompressed with a `tracing::warn!` and no filename suffix.
    /// Otherwise the codec's suffix is appended to the path. Returns the
    /// sink together with the actual path written.
    pub fn create(
        path: &Path,
        codec: Codec,
        capabilities: Capabilities,
    ) -> Result<(EventSink, PathBuf), Error> {
        let codec = if capabilities.supports(codec) {
            codec
        } else {
            tracing::warn!(%codec, "codec not supported by this build, writing uncompressed");
            Codec::None
        };

        let path = suffixed(path, codec);
        let file = BufWriter::new(File::create(&path)?);
        let inner = match codec {
            Codec::None => SinkKind::Plain(file),
            Codec::Gzip => SinkKind::Gzip(GzEncoder::new(file, flate2::Compression::default())),
            Codec::Bzip2 => SinkKind::Bzip2(BzEncoder::new(file, bzip2::Compression::default())),
            Codec::Xz => SinkKind::Xz(XzEncoder::new(file, XZ_PRESET)),
            // Reachable only with a hand-built capability set claiming lzo.
            Codec::Lzo => return Err(Error::UnsupportedCodec { codec }),
        };
        Ok((EventSink { inner }, path))
    }

    /// Write the whole buffer, blocking until done.
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match &mut self.inner {
            SinkKind::Plain(w) => w.write_all(buf),
            SinkKind::Gzip(w) => w.write_all(buf),
            SinkKind::Bzip2(w) => w.write_all(buf),
            SinkKind::Xz(w) => w.write_all(buf),
        }
    }

    /// Finalize the stream: finish any compression frame, flush, and fsync
    /// the file.
    pub fn finish(self) -> io::Result<()> {
        let writer = match self.inner {
            SinkKind::Plain(w) => w,
            SinkKind::Gzip(enc) => enc.finish()?,
            SinkKind::Bzip2(enc) => enc.finish()?,
            SinkKind::Xz(enc) => enc.finish()?,
        };
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

enum SourceKind {
    Plain(BufReader<File>),
    Gzip(GzDecoder<BufReader<File>>),
    Bzip2(BzDecoder<BufReader<File>>),
    Xz(XzDecoder<BufReader<File>>),
}

// Manual impl: the bzip2/xz2 decoder types do not implement `Debug`.
impl std::fmt::Debug for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Plain(_) => f.write_str("Plain"),
            SourceKind::Gzip(_) => f.write_str("Gzip"),
            SourceKind::Bzip2(_) => f.write_str("Bzip2"),
            SourceKind::Xz(_) => f.write_str("Xz"),
        }
    }
}

/// Read half of the transport: one input file, optionally behind a
/// decompressor.
#[derive(Debug)]
pub(crate) struct EventSource {
    inner: SourceKind,
}

impl EventSource {
    /// Open `path` for reading through the requested codec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCodec`] -- failing fast, never silently
    /// reading compressed bytes as plain -- if the codec is outside the
    /// capability set.
    pub fn open(
        path: &Path,
        codec: Codec,
        capabilities: Capabilities,
    ) -> Result<EventSource, Error> {
        if !capabilities.supports(codec) {
            return Err(Error::UnsupportedCodec { codec });
        }
        let file = BufReader::new(File::open(path)?);
        let inner = match codec {
            Codec::None => SourceKind::Plain(file),
            Codec::Gzip => SourceKind::Gzip(GzDecoder::new(file)),
            Codec::Bzip2 => SourceKind::Bzip2(BzDecoder::new(file)),
            Codec::Xz => SourceKind::Xz(XzDecoder::new(file)),
            Codec::Lzo => return Err(Error::UnsupportedCodec { codec }),
        };
        Ok(EventSource { inner })
    }

    /// Fill the whole buffer, blocking until done.
    ///
    /// End of stream surfaces as `io::ErrorKind::UnexpectedEof`, which
    /// callers map to the truncation classification -- distinguishable from
    /// any hard I/O error by its kind.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        match &mut self.inner {
            SourceKind::Plain(r) => r.read_exact(buf),
            SourceKind::Gzip(r) => r.read_exact(buf),
            SourceKind::Bzip2(r) => r.read_exact(buf),
            SourceKind::Xz(r) => r.read_exact(buf),
        }
    }
}

/// Append the codec's filename suffix to the path, if any.
fn suffixed(path: &Path, codec: Codec) -> PathBuf {
    let suffix = codec.suffix();
    if suffix.is_empty() {
        return path.to_path_buf();
    }
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
