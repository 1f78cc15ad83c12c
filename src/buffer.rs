//! The growable event buffer.
//!
//! One contiguous byte region holds the current event's complete on-disk
//! image: header, payload (concatenated banks), and trailer. The same buffer
//! alternates between write-staging and read-staging depending on the
//! container's access mode, never both at once.
//!
//! All access is through offsets into the owned `Vec<u8>`, so growth (which
//! may relocate the underlying storage) can never leave anything dangling:
//! `Vec::resize` preserves the existing bytes and every region start is
//! recomputed from the constants on each call.

use std::ops::Range;

use crate::error::Error;
use crate::frame::{EVENT_HEADER_SIZE, EVENT_TRAILER_SIZE, FILE_TRAILER_SIZE};

/// Growable byte region for exactly one event.
///
/// Capacity only ever grows (by doubling); the payload cursor is the only
/// thing `reset` rewinds. Bytes beyond the cursor keep their old values
/// until overwritten, which is harmless because nothing past the cursor is
/// part of the current frame.
#[derive(Debug)]
pub(crate) struct EventBuffer {
    /// Backing storage. `buf.len()` is the capacity; the vector is always
    /// fully materialized so offset-based slicing never goes out of bounds.
    buf: Vec<u8>,
    /// Number of payload bytes currently staged after the header region.
    payload_len: usize,
}

impl EventBuffer {
    /// Create a buffer with the given initial capacity.
    ///
    /// The capacity is clamped up so the largest fixed-size record (the file
    /// trailer, which is staged here during end-of-stream detection) always
    /// fits without growth.
    pub fn new(capacity: usize) -> Self {
        let floor = FILE_TRAILER_SIZE.max(EVENT_HEADER_SIZE + EVENT_TRAILER_SIZE);
        EventBuffer {
            buf: vec![0; capacity.max(floor)],
            payload_len: 0,
        }
    }

    /// Rewind the payload cursor. Capacity and existing bytes are untouched.
    pub fn reset(&mut self) {
        self.payload_len = 0;
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Set the payload length directly (read path, after the payload bytes
    /// have been staged by a transport read).
    ///
    /// The caller must have called [`ensure_payload_capacity`] first.
    ///
    /// [`ensure_payload_capacity`]: EventBuffer::ensure_payload_capacity
    pub fn set_payload_len(&mut self, len: usize) {
        debug_assert!(EVENT_HEADER_SIZE + len + EVENT_TRAILER_SIZE <= self.buf.len());
        self.payload_len = len;
    }

    /// Grow the buffer (capacity doubling) until `header + payload_bytes +
    /// trailer` fits.
    ///
    /// Growth preserves previously staged bytes. Offsets held by callers
    /// stay valid because they are plain indices, recomputed against the
    /// reallocated storage on every access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferAlloc`] if the allocator cannot provide the
    /// requested capacity. The in-progress operation cannot continue.
    pub fn ensure_payload_capacity(&mut self, payload_bytes: usize) -> Result<(), Error> {
        let required = EVENT_HEADER_SIZE
            .checked_add(payload_bytes)
            .and_then(|n| n.checked_add(EVENT_TRAILER_SIZE))
            .ok_or(Error::BufferAlloc {
                requested: u64::MAX,
            })?;
        if required <= self.buf.len() {
            return Ok(());
        }
        let mut target = self.buf.len();
        while target < required {
            target = target.saturating_mul(2);
        }
        let additional = target - self.buf.len();
        self.buf
            .try_reserve_exact(additional)
            .map_err(|_| Error::BufferAlloc {
                requested: target as u64,
            })?;
        self.buf.resize(target, 0);
        Ok(())
    }

    /// Copy `data` to the payload cursor, growing first if needed, and
    /// advance the cursor.
    pub fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        let new_len = self
            .payload_len
            .checked_add(data.len())
            .ok_or(Error::BufferAlloc {
                requested: u64::MAX,
            })?;
        self.ensure_payload_capacity(new_len)?;
        let start = EVENT_HEADER_SIZE + self.payload_len;
        self.buf[start..start + data.len()].copy_from_slice(data);
        self.payload_len = new_len;
        Ok(())
    }

    /// Mutable view of an arbitrary region, for staging transport reads and
    /// encoded records. The caller is responsible for having ensured
    /// capacity.
    pub fn region_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.buf[offset..offset + len]
    }

    /// Read-only view of an arbitrary region (bank data views index through
    /// this).
    pub fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    /// Mutable view of the event header region.
    pub fn header_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..EVENT_HEADER_SIZE]
    }

    /// Read-only view of the staged payload.
    pub fn payload(&self) -> &[u8] {
        &self.buf[EVENT_HEADER_SIZE..EVENT_HEADER_SIZE + self.payload_len]
    }

    /// Mutable view of the trailer region, directly after the payload.
    pub fn trailer_mut(&mut self) -> &mut [u8] {
        let start = EVENT_HEADER_SIZE + self.payload_len;
        &mut self.buf[start..start + EVENT_TRAILER_SIZE]
    }

    /// The complete contiguous frame: header + payload + trailer.
    pub fn frame(&self) -> &[u8] {
        &self.buf[..EVENT_HEADER_SIZE + self.payload_len + EVENT_TRAILER_SIZE]
    }
}
