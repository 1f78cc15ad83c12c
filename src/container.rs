//! The container engine: file-level open/close protocol, per-event
//! write/read protocol, sequential skip, and error classification.
//!
//! One engine instance owns exactly one transport handle and one event
//! buffer. The access mode is fixed at open time; write-path and read-path
//! code never interleave within an instance. Everything is synchronous,
//! blocking I/O -- there is no internal concurrency and no timeout, so a
//! read blocks until the transport delivers or reports EOF/error.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::bank::{Bank, BankIndex};
use crate::buffer::EventBuffer;
use crate::dump::{self, DumpMode};
use crate::error::Error;
use crate::frame::{
    self, EVENT_HEADER_SIZE, EVENT_TRAILER_SIZE, FILE_HEADER_SIZE, FILE_TRAILER_SIZE,
    RawEventHeader, UUID_LEN,
};
use crate::transport::{Capabilities, EventSink, EventSource};
use crate::types::{AccessMode, Codec, DEFAULT_BUFFER_CAPACITY};

/// Result of a successful `read_event` or `skip_events` call.
///
/// Well-formed end-of-stream is a normal outcome, not an error; this enum
/// keeps it distinct from every failure in the `Error` taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// An event was read, validated, and indexed; its banks are queryable
    /// until the next read/skip/clear call.
    Event,
    /// The file trailer was found and validated. The container is now in
    /// its terminal end-of-stream state; further reads return `Eof` again.
    Eof,
}

/// Tunable knobs for opening a container.
#[derive(Debug, Clone, Copy)]
pub struct ContainerOptions {
    /// Initial event buffer capacity in bytes. The buffer doubles as needed,
    /// so this only controls how soon growth kicks in.
    pub buffer_capacity: usize,
    /// Codec capability set the transport may use.
    pub capabilities: Capabilities,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        ContainerOptions {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            capabilities: Capabilities::compiled(),
        }
    }
}

/// Read-side result of classifying the bytes at the next event position.
enum FrameKind {
    Event(RawEventHeader),
    EndOfStream,
}

#[derive(Debug)]
enum Transport {
    Sink(EventSink),
    Source(EventSource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    /// Terminal for read mode: the file trailer has been consumed.
    Eof,
    /// Sticky: entered on any unrecovered framing error. Every further
    /// read/write attempt is rejected until the container is re-opened.
    Faulted,
}

/// A self-describing binary container of framed, CRC32-checked events.
///
/// Opened either for append-only write or for sequential read; the mode is
/// fixed for the container's lifetime. Not safe for concurrent use -- the
/// event buffer and cursors are mutated in place, which `&mut self`
/// receivers enforce. Independent containers on separate threads share
/// nothing.
#[derive(Debug)]
pub struct Container {
    transport: Transport,
    state: State,
    buffer: EventBuffer,
    banks: BankIndex,
    /// Actual path bound at open time (includes any codec suffix).
    file_name: PathBuf,
    uuid_text: String,
    uuid_field: [u8; UUID_LEN],
    features: u64,
    start_time: u64,
    /// Write mode: number the next event will carry, starting at 1.
    /// Read mode: number of the last event loaded.
    event_number: u64,
    user_flags: u64,
}

impl Container {
    /// Open a container with default options.
    ///
    /// See [`open_with_options`](Container::open_with_options).
    pub fn open(
        path: impl AsRef<Path>,
        mode: AccessMode,
        codec: Codec,
    ) -> Result<Container, Error> {
        Container::open_with_options(path, mode, codec, ContainerOptions::default())
    }

    /// Open a container for reading or writing through the given codec.
    ///
    /// Write mode creates the output file (appending the codec's filename
    /// suffix), generates a fresh v4 UUID, and emits the file header. Read
    /// mode opens the input file and validates the file header.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be created/opened.
    /// - [`Error::UnsupportedCodec`] for a codec outside the capability set
    ///   in read mode (write mode falls back to uncompressed with a
    ///   warning).
    /// - [`Error::FileHeader`] if an input file's magic tags are wrong.
    /// - [`Error::UnexpectedEof`] if the input ends inside the file header.
    pub fn open_with_options(
        path: impl AsRef<Path>,
        mode: AccessMode,
        codec: Codec,
        options: ContainerOptions,
    ) -> Result<Container, Error> {
        let path = path.as_ref();
        let buffer = EventBuffer::new(options.buffer_capacity);

        match mode {
            AccessMode::Write => {
                let (mut sink, file_name) = EventSink::create(path, codec, options.capabilities)?;

                let uuid_text = Uuid::new_v4().to_string();
                let mut uuid_field = [0u8; UUID_LEN];
                uuid_field.copy_from_slice(uuid_text.as_bytes());

                let start_time = unix_now();
                sink.write_all(&frame::encode_file_header(start_time, 0, &uuid_field))?;
                tracing::debug!(file = %file_name.display(), %codec, "container opened for write");

                Ok(Container {
                    transport: Transport::Sink(sink),
                    state: State::Open,
                    buffer,
                    banks: BankIndex::default(),
                    file_name,
                    uuid_text,
                    uuid_field,
                    features: 0,
                    start_time,
                    event_number: 1,
                    user_flags: 0,
                })
            }
            AccessMode::Read => {
                let mut source = EventSource::open(path, codec, options.capabilities)?;

                let mut raw = [0u8; FILE_HEADER_SIZE];
                source
                    .read_exact(&mut raw)
                    .map_err(|e| classify_read_error(e, "stream ended inside the file header"))?;
                let header = frame::decode_file_header(&raw)?;

                let uuid_text = String::from_utf8_lossy(&header.uuid).into_owned();
                tracing::debug!(file = %path.display(), uuid = %uuid_text, "container opened for read");

                Ok(Container {
                    transport: Transport::Source(source),
                    state: State::Open,
                    buffer,
                    banks: BankIndex::default(),
                    file_name: path.to_path_buf(),
                    uuid_text,
                    uuid_field: header.uuid,
                    features: header.features,
                    start_time: header.start_time,
                    event_number: 1,
                    user_flags: 0,
                })
            }
        }
    }

    /// Close the container.
    ///
    /// In write mode this stamps the stop time into the file trailer,
    /// writes it, finishes any compression stream, and fsyncs. In read mode
    /// it just releases the transport. Either way the container is consumed;
    /// re-opening constructs a new one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the trailer write or stream finalization
    /// fails; the file must then be considered truncated.
    pub fn close(self) -> Result<(), Error> {
        match self.transport {
            Transport::Sink(mut sink) => {
                let trailer =
                    frame::encode_file_trailer(unix_now(), self.features, &self.uuid_field);
                sink.write_all(&trailer)?;
                sink.finish()?;
                tracing::debug!(file = %self.file_name.display(), "container closed");
                Ok(())
            }
            Transport::Source(_) => Ok(()),
        }
    }

    // ---- Write path ------------------------------------------------------

    /// Set the opaque user flags stamped into subsequently written event
    /// headers. Write mode only.
    pub fn set_event_user_flags(&mut self, user_flags: u64) -> Result<(), Error> {
        self.ensure_write()?;
        self.user_flags = user_flags;
        Ok(())
    }

    /// Append one bank (header + payload) to the staged event.
    ///
    /// # Errors
    ///
    /// - [`Error::BankName`] for an empty, overlong, non-ASCII, or
    ///   NUL-containing name.
    /// - [`Error::Bank`] if the payload exceeds the u32 size field.
    /// - [`Error::BufferAlloc`] if the buffer cannot grow.
    pub fn add_bank(&mut self, name: &str, flags: u16, data: &[u8]) -> Result<(), Error> {
        self.ensure_write()?;
        let name_field = frame::encode_bank_name(name)?;
        let size = u32::try_from(data.len()).map_err(|_| {
            Error::Bank(format!(
                "bank {name:?} payload of {} bytes exceeds the u32 size field",
                data.len()
            ))
        })?;
        self.buffer
            .append(&frame::encode_bank_header(&name_field, flags, size))?;
        self.buffer.append(data)?;
        Ok(())
    }

    /// Append pre-framed bytes verbatim to the staged payload.
    ///
    /// The caller is responsible for `data` being a well-formed bank
    /// sequence; the read side will reject a payload that does not
    /// decompose exactly into banks.
    pub fn add_raw_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.ensure_write()?;
        self.buffer.append(data)
    }

    /// Discard the staged banks without writing anything. The event counter
    /// is not advanced.
    pub fn clear_event(&mut self) {
        self.buffer.reset();
        self.banks.clear();
    }

    /// Finalize and write the staged event: fill in the header (current
    /// event number and user flags, payload size), compute the payload
    /// CRC32, append the trailer, and write the contiguous frame to the
    /// transport. On success the buffer is reset and the event counter
    /// advances.
    ///
    /// An event with zero banks is legal and round-trips as an empty
    /// payload.
    pub fn write_event(&mut self) -> Result<(), Error> {
        self.ensure_write()?;

        let payload_size = self.buffer.payload_len() as u64;
        let crc = crc32fast::hash(self.buffer.payload());

        let header = frame::encode_event_header(self.event_number, self.user_flags, payload_size);
        self.buffer.header_mut().copy_from_slice(&header);
        let trailer = frame::encode_event_trailer(crc, payload_size);
        self.buffer.trailer_mut().copy_from_slice(&trailer);

        let Transport::Sink(sink) = &mut self.transport else {
            return Err(Error::WrongAccessMode {
                required: AccessMode::Write,
            });
        };
        sink.write_all(self.buffer.frame())?;

        self.event_number += 1;
        self.clear_event();
        Ok(())
    }

    // ---- Read path -------------------------------------------------------

    /// Read, validate, and index the next event.
    ///
    /// A file trailer at the event position is the normal end of stream:
    /// the trailer is validated and `Ok(ReadOutcome::Eof)` is returned. Any
    /// framing or integrity failure discards the partially read state,
    /// moves the container to the sticky faulted state, and returns the
    /// classifying error.
    ///
    /// # Errors
    ///
    /// - [`Error::UnexpectedEof`] -- stream ended mid-record or without a
    ///   valid trailer.
    /// - [`Error::EventHeaderNotFound`] -- bytes are neither an event
    ///   header nor a file trailer.
    /// - [`Error::EventHeaderTrailerMismatch`], [`Error::EventCrc`],
    ///   [`Error::Bank`] -- per-event integrity failures.
    /// - [`Error::Faulted`] -- the container already faulted earlier.
    /// - [`Error::WrongAccessMode`] -- the container is a writer.
    pub fn read_event(&mut self) -> Result<ReadOutcome, Error> {
        match self.state {
            State::Faulted => return Err(Error::Faulted),
            State::Eof => return Ok(ReadOutcome::Eof),
            State::Open => {}
        }
        self.ensure_read()?;

        self.banks.clear();
        self.buffer.reset();

        let header = match self.read_frame_header()? {
            FrameKind::Event(h) => h,
            FrameKind::EndOfStream => return Ok(ReadOutcome::Eof),
        };
        self.load_event_body(&header, true)?;

        self.event_number = header.event_number;
        self.user_flags = header.user_flags;
        Ok(ReadOutcome::Event)
    }

    /// Skip `n` events without CRC verification or bank indexing, then read
    /// the following event in full.
    ///
    /// Skipped events still get their framing checked (header tags, trailer
    /// tags, size cross-check); any failure aborts immediately with the
    /// corresponding fault, exactly as `read_event` would.
    pub fn skip_events(&mut self, n: usize) -> Result<ReadOutcome, Error> {
        match self.state {
            State::Faulted => return Err(Error::Faulted),
            State::Eof => return Ok(ReadOutcome::Eof),
            State::Open => {}
        }
        self.ensure_read()?;

        for _ in 0..n {
            self.banks.clear();
            self.buffer.reset();

            let header = match self.read_frame_header()? {
                FrameKind::Event(h) => h,
                FrameKind::EndOfStream => return Ok(ReadOutcome::Eof),
            };
            self.load_event_body(&header, false)?;
        }
        self.read_event()
    }

    /// Read the next 32 bytes and classify them: a valid event header, the
    /// start of the file trailer (end of stream), or corruption.
    fn read_frame_header(&mut self) -> Result<FrameKind, Error> {
        let Transport::Source(source) = &mut self.transport else {
            return Err(Error::WrongAccessMode {
                required: AccessMode::Read,
            });
        };

        if let Err(e) = source.read_exact(self.buffer.region_mut(0, EVENT_HEADER_SIZE)) {
            let err = classify_read_error(e, "stream ended before the next event header");
            return Err(self.fault(err));
        }
        let head: [u8; EVENT_HEADER_SIZE] = self
            .buffer
            .bytes(0..EVENT_HEADER_SIZE)
            .try_into()
            .expect("exactly EVENT_HEADER_SIZE bytes");
        let raw = frame::decode_event_header(&head);

        if raw.tags_valid() {
            return Ok(FrameKind::Event(raw));
        }

        if raw.looks_like_file_trailer() {
            // Pull in the rest of the trailer and reinterpret the whole
            // record.
            let Transport::Source(source) = &mut self.transport else {
                unreachable!("transport direction cannot change after open");
            };
            let rest = FILE_TRAILER_SIZE - EVENT_HEADER_SIZE;
            if let Err(e) = source.read_exact(self.buffer.region_mut(EVENT_HEADER_SIZE, rest)) {
                let err = classify_read_error(e, "stream ended inside the file trailer");
                return Err(self.fault(err));
            }
            let trailer_bytes: [u8; FILE_TRAILER_SIZE] = self
                .buffer
                .bytes(0..FILE_TRAILER_SIZE)
                .try_into()
                .expect("exactly FILE_TRAILER_SIZE bytes");
            return match frame::decode_file_trailer(&trailer_bytes) {
                Ok(_) => {
                    tracing::debug!(file = %self.file_name.display(), "end of stream: file trailer found");
                    self.state = State::Eof;
                    Ok(FrameKind::EndOfStream)
                }
                Err(e) => Err(self.fault(e)),
            };
        }

        let err = Error::EventHeaderNotFound {
            open_tag: raw.open_tag,
            close_tag: raw.close_tag,
        };
        Err(self.fault(err))
    }

    /// Read the payload and trailer for a classified event header, validate
    /// framing, and (when `verify` is set) check the CRC and build the bank
    /// index. The skip path passes `verify = false`.
    fn load_event_body(&mut self, header: &RawEventHeader, verify: bool) -> Result<(), Error> {
        let payload_len = usize::try_from(header.payload_size).map_err(|_| Error::BufferAlloc {
            requested: header.payload_size,
        })?;
        self.buffer.ensure_payload_capacity(payload_len)?;

        let Transport::Source(source) = &mut self.transport else {
            unreachable!("transport direction cannot change after open");
        };
        let body_len = payload_len + EVENT_TRAILER_SIZE;
        if let Err(e) = source.read_exact(self.buffer.region_mut(EVENT_HEADER_SIZE, body_len)) {
            let err = classify_read_error(e, "stream ended inside an event body");
            return Err(self.fault(err));
        }
        self.buffer.set_payload_len(payload_len);

        let trailer_start = EVENT_HEADER_SIZE + payload_len;
        let trailer_bytes: [u8; EVENT_TRAILER_SIZE] = self
            .buffer
            .bytes(trailer_start..trailer_start + EVENT_TRAILER_SIZE)
            .try_into()
            .expect("exactly EVENT_TRAILER_SIZE bytes");
        let trailer = frame::decode_event_trailer(&trailer_bytes);

        if !frame::event_frame_consistent(header, &trailer) {
            let err = Error::EventHeaderTrailerMismatch(format!(
                "header size {}, trailer size {}, trailer tags {:#010x}/{:#010x}",
                header.payload_size, trailer.payload_size, trailer.open_tag, trailer.close_tag
            ));
            return Err(self.fault(err));
        }

        if verify {
            let computed = crc32fast::hash(self.buffer.payload());
            if computed != trailer.crc32 {
                let err = Error::EventCrc {
                    stored: trailer.crc32,
                    computed,
                };
                return Err(self.fault(err));
            }
            match BankIndex::scan(self.buffer.payload(), EVENT_HEADER_SIZE) {
                Ok(index) => self.banks = index,
                Err(e) => return Err(self.fault(e)),
            }
        }
        Ok(())
    }

    // ---- Queries ---------------------------------------------------------

    /// Look up a bank of the currently loaded event by name.
    ///
    /// Returns `None` when the name is absent or no event is loaded; the
    /// caller decides whether that is significant. The returned view
    /// borrows the event buffer and is invalidated by the next
    /// read/skip/clear call.
    pub fn get_bank(&self, name: &str) -> Option<Bank<'_>> {
        let (name, slot) = self.banks.get(name)?;
        Some(Bank {
            name,
            flags: slot.flags,
            data: self.buffer.bytes(slot.data.clone()),
        })
    }

    /// Enumerate the banks of the currently loaded event, in an unspecified
    /// order that is stable until the next read/skip/clear call.
    pub fn banks(&self) -> impl Iterator<Item = Bank<'_>> {
        self.banks.iter().map(|(name, slot)| Bank {
            name,
            flags: slot.flags,
            data: self.buffer.bytes(slot.data.clone()),
        })
    }

    /// Number of banks in the currently loaded event.
    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    /// The raw, undecoded payload of the current event (concatenated bank
    /// headers and bank bytes).
    pub fn raw_payload(&self) -> &[u8] {
        self.buffer.payload()
    }

    /// Write mode: the number the next `write_event` will stamp. Read mode:
    /// the number of the last event loaded.
    pub fn event_number(&self) -> u64 {
        self.event_number
    }

    /// The opaque user flags of the current event (last value set in write
    /// mode, header value of the last event read in read mode).
    pub fn event_user_flags(&self) -> u64 {
        self.user_flags
    }

    /// Payload size in bytes of the current event.
    pub fn event_size(&self) -> u64 {
        self.buffer.payload_len() as u64
    }

    /// The file UUID: generated at open in write mode, read from the file
    /// header in read mode.
    pub fn uuid(&self) -> &str {
        &self.uuid_text
    }

    /// Unix timestamp (seconds) from the file header.
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// The actual path bound at open time, including any codec suffix
    /// appended in write mode.
    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    /// Render every bank of the loaded event through
    /// [`dump::bank_dump`](crate::dump::bank_dump).
    pub fn dump_banks(&self, mode: DumpMode) -> String {
        let mut out = String::new();
        for bank in self.banks() {
            out.push_str(&dump::bank_dump(&bank, mode));
        }
        out
    }

    // ---- Helpers ---------------------------------------------------------

    fn ensure_write(&self) -> Result<(), Error> {
        match self.transport {
            Transport::Sink(_) => Ok(()),
            Transport::Source(_) => Err(Error::WrongAccessMode {
                required: AccessMode::Write,
            }),
        }
    }

    fn ensure_read(&self) -> Result<(), Error> {
        match self.transport {
            Transport::Source(_) => Ok(()),
            Transport::Sink(_) => Err(Error::WrongAccessMode {
                required: AccessMode::Read,
            }),
        }
    }

    /// Enter the sticky faulted state and hand the error back for
    /// propagation.
    fn fault(&mut self, err: Error) -> Error {
        self.state = State::Faulted;
        tracing::warn!(file = %self.file_name.display(), error = %err, "container faulted");
        err
    }
}

/// Wall-clock seconds since the Unix epoch; 0 if the clock is before the
/// epoch.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Map a transport read failure into the error taxonomy: end-of-stream
/// becomes the truncation classification, anything else stays an I/O error.
fn classify_read_error(err: std::io::Error, context: &str) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEof(context.to_string())
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        dir.path().join(name)
    }

    #[test]
    fn writer_rejects_read_operations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut container = Container::open(
            temp_path(&dir, "w.cask"),
            AccessMode::Write,
            Codec::None,
        )
        .expect("open for write");

        let err = container.read_event().expect_err("writer cannot read");
        assert!(matches!(
            err,
            Error::WrongAccessMode {
                required: AccessMode::Read
            }
        ));
        let err = container.skip_events(1).expect_err("writer cannot skip");
        assert!(matches!(err, Error::WrongAccessMode { .. }));
    }

    #[test]
    fn reader_rejects_write_operations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = temp_path(&dir, "r.cask");
        Container::open(&path, AccessMode::Write, Codec::None)
            .expect("open for write")
            .close()
            .expect("close writer");

        let mut container =
            Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");

        assert!(matches!(
            container.add_bank("X", 0, b"d"),
            Err(Error::WrongAccessMode {
                required: AccessMode::Write
            })
        ));
        assert!(matches!(
            container.add_raw_data(b"d"),
            Err(Error::WrongAccessMode { .. })
        ));
        assert!(matches!(
            container.set_event_user_flags(1),
            Err(Error::WrongAccessMode { .. })
        ));
        assert!(matches!(
            container.write_event(),
            Err(Error::WrongAccessMode { .. })
        ));
    }

    #[test]
    fn uuid_is_36_ascii_chars_and_survives_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = temp_path(&dir, "u.cask");
        let writer =
            Container::open(&path, AccessMode::Write, Codec::None).expect("open for write");
        let written_uuid = writer.uuid().to_string();
        assert_eq!(written_uuid.len(), 36);
        assert!(written_uuid.is_ascii());
        writer.close().expect("close writer");

        let reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
        assert_eq!(reader.uuid(), written_uuid);
        assert!(reader.start_time() > 0);
    }

    #[test]
    fn open_read_on_garbage_is_file_header_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = temp_path(&dir, "garbage.cask");
        std::fs::write(&path, vec![0x55u8; 200]).expect("write fixture");

        let err = Container::open(&path, AccessMode::Read, Codec::None)
            .expect_err("garbage header must fail");
        assert!(matches!(err, Error::FileHeader(_)));
    }

    #[test]
    fn open_read_on_too_short_file_is_unexpected_eof() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = temp_path(&dir, "tiny.cask");
        std::fs::write(&path, b"short").expect("write fixture");

        let err = Container::open(&path, AccessMode::Read, Codec::None)
            .expect_err("truncated header must fail");
        assert!(matches!(err, Error::UnexpectedEof(_)));
    }

    #[test]
    fn clear_event_discards_staged_banks_without_advancing_counter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut container = Container::open(
            temp_path(&dir, "c.cask"),
            AccessMode::Write,
            Codec::None,
        )
        .expect("open for write");

        container.add_bank("TMP", 0, &[1, 2, 3]).expect("add bank");
        assert!(container.event_size() > 0);
        assert_eq!(container.event_number(), 1);

        container.clear_event();
        assert_eq!(container.event_size(), 0);
        assert_eq!(container.event_number(), 1);
    }

    #[test]
    fn write_mode_appends_codec_suffix_to_file_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = temp_path(&dir, "suffixed.cask");
        let container =
            Container::open(&path, AccessMode::Write, Codec::Gzip).expect("open for write");
        assert_eq!(
            container.file_name(),
            temp_path(&dir, "suffixed.cask.gz").as_path()
        );
        container.close().expect("close writer");
    }
}
