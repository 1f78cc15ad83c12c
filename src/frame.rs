//! Binary framing codec for the eventcask container format.
//!
//! This module defines the fixed, little-endian on-disk layouts of the five
//! structural records (file header/trailer, event header/trailer, bank
//! header) and the magic-tag validation rules. It is pure data
//! transformation -- no file I/O, no buffer management.
//!
//! Every structural record is bracketed by a 32-bit open tag and close tag.
//! Validation checks `(open_tag & close_tag) == MAGIC` rather than comparing
//! the tags independently. This is deliberately preserved from the original
//! format definition: two tags that each carry extra bits whose AND still
//! equals the magic pass the check. Wire compatibility depends on this exact
//! semantics, so it must not be strengthened here.

use crate::error::Error;

/// Magic tag bracketing the file header.
pub(crate) const FILE_OPEN_MAGIC: u32 = 0xCBDF_CBDF;

/// Magic tag bracketing the file trailer.
pub(crate) const FILE_CLOSE_MAGIC: u32 = 0xFDBC_FDBC;

/// Magic tag bracketing each event header.
pub(crate) const EVENT_OPEN_MAGIC: u32 = 0xCBED_CBED;

/// Magic tag bracketing each event trailer.
pub(crate) const EVENT_CLOSE_MAGIC: u32 = 0xDEBC_DEBC;

/// Size of the file header on disk: tag(4) + start_time(8) + features(8) +
/// uuid(36) + tag(4).
pub(crate) const FILE_HEADER_SIZE: usize = 60;

/// Size of the file trailer on disk. Same shape as the header.
pub(crate) const FILE_TRAILER_SIZE: usize = 60;

/// Size of an event header on disk: tag(4) + event_number(8) + user_flags(8)
/// + payload_size(8) + tag(4).
pub(crate) const EVENT_HEADER_SIZE: usize = 32;

/// Size of an event trailer on disk: tag(4) + crc32(4) + payload_size(8) +
/// tag(4).
pub(crate) const EVENT_TRAILER_SIZE: usize = 20;

/// Size of a bank header on disk: name(12) + user_flags(2) + pad(2) +
/// size(4). The two padding bytes keep the size field 4-byte aligned; they
/// are written as zero and ignored on read.
pub(crate) const BANK_HEADER_SIZE: usize = 20;

/// Length of the UUID field: the 36-character ASCII string form of a UUID.
pub(crate) const UUID_LEN: usize = 36;

/// Width of the fixed bank name field, including the NUL terminator.
pub(crate) const BANK_NAME_LEN: usize = 12;

/// Maximum number of significant characters in a bank name.
pub(crate) const MAX_BANK_NAME: usize = BANK_NAME_LEN - 1;

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().expect("4 bytes for u32"))
}

fn u64_at(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().expect("8 bytes for u64"))
}

/// Decoded once-per-file preamble.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FileHeader {
    /// Unix time (seconds) the file was opened for write.
    pub start_time: u64,
    /// Reserved feature bitset, currently always zero.
    pub features: u64,
    /// 36-byte ASCII string form of the file UUID.
    pub uuid: [u8; UUID_LEN],
}

/// Decoded once-per-file postamble.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FileTrailer {
    /// Unix time (seconds) the file was closed.
    pub stop_time: u64,
    /// Reserved feature bitset, currently always zero.
    pub features: u64,
    /// File UUID, identical to the header's.
    pub uuid: [u8; UUID_LEN],
}

/// Event header exactly as read off the stream, tags included.
///
/// The tags are kept raw because the engine needs them twice: once for the
/// AND validation and once to recognize a file trailer sitting where the
/// next event header was expected (the legitimate end-of-stream condition).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawEventHeader {
    pub open_tag: u32,
    /// 1-based, monotonically increasing within the file.
    pub event_number: u64,
    /// Opaque caller-defined flags.
    pub user_flags: u64,
    /// Payload size in bytes (concatenated banks, headers included).
    pub payload_size: u64,
    pub close_tag: u32,
}

impl RawEventHeader {
    /// AND-of-tags check against the event-open magic.
    pub fn tags_valid(&self) -> bool {
        ((self.open_tag & self.close_tag) ^ EVENT_OPEN_MAGIC) == 0
    }

    /// True if these bytes are plausibly the start of a file trailer, i.e.
    /// the stream has ended and the engine should reinterpret them.
    pub fn looks_like_file_trailer(&self) -> bool {
        self.open_tag == FILE_CLOSE_MAGIC
    }
}

/// Event trailer exactly as read off the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawEventTrailer {
    pub open_tag: u32,
    /// CRC32 over exactly the payload bytes.
    pub crc32: u32,
    /// Payload size, redundant with the header for cross-checking.
    pub payload_size: u64,
    pub close_tag: u32,
}

impl RawEventTrailer {
    pub fn tags_valid(&self) -> bool {
        ((self.open_tag & self.close_tag) ^ EVENT_CLOSE_MAGIC) == 0
    }
}

/// Bank header exactly as read from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawBankHeader {
    /// NUL-terminated name field; up to [`MAX_BANK_NAME`] significant bytes.
    pub name: [u8; BANK_NAME_LEN],
    pub user_flags: u16,
    /// Size of the bank payload that follows this header.
    pub size: u32,
}

/// Encode the file header into its fixed 60-byte on-disk form.
pub(crate) fn encode_file_header(
    start_time: u64,
    features: u64,
    uuid: &[u8; UUID_LEN],
) -> [u8; FILE_HEADER_SIZE] {
    let mut buf = [0u8; FILE_HEADER_SIZE];
    buf[0..4].copy_from_slice(&FILE_OPEN_MAGIC.to_le_bytes());
    buf[4..12].copy_from_slice(&start_time.to_le_bytes());
    buf[12..20].copy_from_slice(&features.to_le_bytes());
    buf[20..56].copy_from_slice(uuid);
    buf[56..60].copy_from_slice(&FILE_OPEN_MAGIC.to_le_bytes());
    buf
}

/// Decode and validate the file header.
///
/// # Errors
///
/// Returns [`Error::FileHeader`] if the AND of the open and close tags does
/// not equal the file-open magic.
pub(crate) fn decode_file_header(buf: &[u8; FILE_HEADER_SIZE]) -> Result<FileHeader, Error> {
    let open_tag = u32_at(buf, 0);
    let close_tag = u32_at(buf, 56);
    if (open_tag & close_tag) != FILE_OPEN_MAGIC {
        return Err(Error::FileHeader(format!(
            "bad magic tags {open_tag:#010x}/{close_tag:#010x}"
        )));
    }
    let mut uuid = [0u8; UUID_LEN];
    uuid.copy_from_slice(&buf[20..56]);
    Ok(FileHeader {
        start_time: u64_at(buf, 4),
        features: u64_at(buf, 12),
        uuid,
    })
}

/// Encode the file trailer into its fixed 60-byte on-disk form.
pub(crate) fn encode_file_trailer(
    stop_time: u64,
    features: u64,
    uuid: &[u8; UUID_LEN],
) -> [u8; FILE_TRAILER_SIZE] {
    let mut buf = [0u8; FILE_TRAILER_SIZE];
    buf[0..4].copy_from_slice(&FILE_CLOSE_MAGIC.to_le_bytes());
    buf[4..12].copy_from_slice(&stop_time.to_le_bytes());
    buf[12..20].copy_from_slice(&features.to_le_bytes());
    buf[20..56].copy_from_slice(uuid);
    buf[56..60].copy_from_slice(&FILE_CLOSE_MAGIC.to_le_bytes());
    buf
}

/// Decode and validate the file trailer.
///
/// A valid trailer is the normal end-of-stream signal. Anything else at the
/// trailer position means the stream ended without one.
///
/// # Errors
///
/// Returns [`Error::UnexpectedEof`] if the AND of the tags does not equal
/// the file-close magic. This classifies as truncation, not hard corruption.
pub(crate) fn decode_file_trailer(buf: &[u8; FILE_TRAILER_SIZE]) -> Result<FileTrailer, Error> {
    let open_tag = u32_at(buf, 0);
    let close_tag = u32_at(buf, 56);
    if (open_tag & close_tag) != FILE_CLOSE_MAGIC {
        return Err(Error::UnexpectedEof(
            "stream ended without a valid file trailer".to_string(),
        ));
    }
    let mut uuid = [0u8; UUID_LEN];
    uuid.copy_from_slice(&buf[20..56]);
    Ok(FileTrailer {
        stop_time: u64_at(buf, 4),
        features: u64_at(buf, 12),
        uuid,
    })
}

/// Encode an event header into its fixed 32-byte on-disk form.
pub(crate) fn encode_event_header(
    event_number: u64,
    user_flags: u64,
    payload_size: u64,
) -> [u8; EVENT_HEADER_SIZE] {
    let mut buf = [0u8; EVENT_HEADER_SIZE];
    buf[0..4].copy_from_slice(&EVENT_OPEN_MAGIC.to_le_bytes());
    buf[4..12].copy_from_slice(&event_number.to_le_bytes());
    buf[12..20].copy_from_slice(&user_flags.to_le_bytes());
    buf[20..28].copy_from_slice(&payload_size.to_le_bytes());
    buf[28..32].copy_from_slice(&EVENT_OPEN_MAGIC.to_le_bytes());
    buf
}

/// Decode an event header without validating it.
///
/// Validation is split out because the engine must inspect the raw tags to
/// distinguish a corrupt header from a file trailer at the same position.
pub(crate) fn decode_event_header(buf: &[u8; EVENT_HEADER_SIZE]) -> RawEventHeader {
    RawEventHeader {
        open_tag: u32_at(buf, 0),
        event_number: u64_at(buf, 4),
        user_flags: u64_at(buf, 12),
        payload_size: u64_at(buf, 20),
        close_tag: u32_at(buf, 28),
    }
}

/// Encode an event trailer into its fixed 20-byte on-disk form.
pub(crate) fn encode_event_trailer(crc32: u32, payload_size: u64) -> [u8; EVENT_TRAILER_SIZE] {
    let mut buf = [0u8; EVENT_TRAILER_SIZE];
    buf[0..4].copy_from_slice(&EVENT_CLOSE_MAGIC.to_le_bytes());
    buf[4..8].copy_from_slice(&crc32.to_le_bytes());
    buf[8..16].copy_from_slice(&payload_size.to_le_bytes());
    buf[16..20].copy_from_slice(&EVENT_CLOSE_MAGIC.to_le_bytes());
    buf
}

/// Decode an event trailer without validating it.
pub(crate) fn decode_event_trailer(buf: &[u8; EVENT_TRAILER_SIZE]) -> RawEventTrailer {
    RawEventTrailer {
        open_tag: u32_at(buf, 0),
        crc32: u32_at(buf, 4),
        payload_size: u64_at(buf, 8),
        close_tag: u32_at(buf, 16),
    }
}

/// Cross-check an event's header against its trailer.
///
/// The trailer tags go through the same AND check as the header, and the two
/// payload sizes are compared by XOR. Either inconsistency is the
/// header/trailer mismatch condition.
pub(crate) fn event_frame_consistent(header: &RawEventHeader, trailer: &RawEventTrailer) -> bool {
    trailer.tags_valid() && (header.payload_size ^ trailer.payload_size) == 0
}

/// Validate a bank name and pack it into the fixed 12-byte name field.
///
/// # Errors
///
/// Returns [`Error::BankName`] if the name is empty, longer than
/// [`MAX_BANK_NAME`] characters, not ASCII, or contains a NUL byte.
pub(crate) fn encode_bank_name(name: &str) -> Result<[u8; BANK_NAME_LEN], Error> {
    if name.is_empty() {
        return Err(Error::BankName("name is empty".to_string()));
    }
    if name.len() > MAX_BANK_NAME {
        return Err(Error::BankName(format!(
            "name {name:?} exceeds {MAX_BANK_NAME} characters"
        )));
    }
    if !name.is_ascii() {
        return Err(Error::BankName(format!("name {name:?} is not ASCII")));
    }
    if name.bytes().any(|b| b == 0) {
        return Err(Error::BankName(format!("name {name:?} contains NUL")));
    }
    let mut field = [0u8; BANK_NAME_LEN];
    field[..name.len()].copy_from_slice(name.as_bytes());
    Ok(field)
}

/// Encode a bank header into its fixed 20-byte on-disk form.
pub(crate) fn encode_bank_header(
    name: &[u8; BANK_NAME_LEN],
    user_flags: u16,
    size: u32,
) -> [u8; BANK_HEADER_SIZE] {
    let mut buf = [0u8; BANK_HEADER_SIZE];
    buf[0..12].copy_from_slice(name);
    buf[12..14].copy_from_slice(&user_flags.to_le_bytes());
    // buf[14..16] stays zero: alignment padding.
    buf[16..20].copy_from_slice(&size.to_le_bytes());
    buf
}

/// Decode a bank header.
pub(crate) fn decode_bank_header(buf: &[u8; BANK_HEADER_SIZE]) -> RawBankHeader {
    let mut name = [0u8; BANK_NAME_LEN];
    name.copy_from_slice(&buf[0..12]);
    RawBankHeader {
        name,
        user_flags: u16::from_le_bytes([buf[12], buf[13]]),
        size: u32_at(buf, 16),
    }
}
