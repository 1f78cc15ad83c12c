//! Bank index: the per-event map from bank name to payload location.
//!
//! Built by a linear scan of a payload that has already passed trailer and
//! CRC validation. The index stores offsets into the event buffer, not
//! pointers, so buffer growth can never invalidate it; the public [`Bank`]
//! view borrows the buffer and is therefore tied to the currently loaded
//! event by lifetime.

use std::collections::HashMap;
use std::ops::Range;

use crate::error::Error;
use crate::frame::{self, BANK_HEADER_SIZE, BANK_NAME_LEN};

/// A named, flagged sub-record of the currently loaded event.
///
/// `data` is a non-owning view into the container's event buffer. It is
/// valid only until the next `read_event`, `skip_events`, or `clear_event`
/// call -- the borrow checker enforces exactly that, since all of those take
/// `&mut self` on the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bank<'a> {
    /// Bank name, up to 11 ASCII characters.
    pub name: &'a str,
    /// Opaque caller-defined flags from the bank header.
    pub flags: u16,
    /// The bank's payload bytes.
    pub data: &'a [u8],
}

impl Bank<'_> {
    /// Size of the bank payload in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Location of one bank inside the event buffer.
#[derive(Debug, Clone)]
pub(crate) struct BankSlot {
    pub flags: u16,
    /// Absolute byte range of the bank payload within the event buffer.
    pub data: Range<usize>,
}

/// Map from bank name to location, rebuilt on every event read.
#[derive(Debug, Default)]
pub(crate) struct BankIndex {
    entries: HashMap<String, BankSlot>,
}

impl BankIndex {
    /// Scan a validated payload into an index.
    ///
    /// `base` is the payload's absolute start offset within the event
    /// buffer; stored ranges are absolute so the container can slice the
    /// buffer directly. A name that repeats within one event overwrites the
    /// earlier entry (map semantics, last occurrence wins).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bank`] if the payload does not decompose exactly:
    /// a truncated bank header, a bank running past the declared payload
    /// end, or a name field that is not valid UTF-8. On error no index is
    /// produced at all -- a partially built one is never exposed.
    pub fn scan(payload: &[u8], base: usize) -> Result<BankIndex, Error> {
        let mut entries = HashMap::new();
        let mut cursor = 0usize;

        while cursor < payload.len() {
            let remaining = payload.len() - cursor;
            if remaining < BANK_HEADER_SIZE {
                return Err(Error::Bank(format!(
                    "{remaining} trailing bytes at offset {cursor}, too short for a bank header"
                )));
            }
            let header_bytes: [u8; BANK_HEADER_SIZE] = payload[cursor..cursor + BANK_HEADER_SIZE]
                .try_into()
                .expect("exactly BANK_HEADER_SIZE bytes");
            let header = frame::decode_bank_header(&header_bytes);
            let size = header.size as usize;

            let data_start = cursor + BANK_HEADER_SIZE;
            let data_end = data_start.checked_add(size).ok_or_else(|| {
                Error::Bank(format!("bank size {size} overflows at offset {cursor}"))
            })?;
            if data_end > payload.len() {
                return Err(Error::Bank(format!(
                    "bank at offset {cursor} declares {size} bytes but only {} remain",
                    payload.len() - data_start
                )));
            }

            let name = parse_name(&header.name).ok_or_else(|| {
                Error::Bank(format!("bank name at offset {cursor} is not valid UTF-8"))
            })?;
            entries.insert(
                name.to_string(),
                BankSlot {
                    flags: header.user_flags,
                    data: base + data_start..base + data_end,
                },
            );
            cursor = data_end;
        }

        // The loop exits only when the cursor lands exactly on the declared
        // payload end, so consumption is exact by construction.
        Ok(BankIndex { entries })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Point lookup. Absence is not an error at this layer.
    pub fn get(&self, name: &str) -> Option<(&str, &BankSlot)> {
        self.entries
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Enumerate entries in an unspecified order, stable for one loaded
    /// event.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BankSlot)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Extract the significant characters from the fixed-width name field: up
/// to the first NUL, or the whole field if none. Returns `None` on invalid
/// UTF-8.
fn parse_name(field: &[u8; BANK_NAME_LEN]) -> Option<&str> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).ok()
}
