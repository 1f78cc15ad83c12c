//! # eventcask
//!
//! A self-describing binary container format for framed event records.
//!
//! An eventcask file is a flat sequence of records: a file header, zero or
//! more events, and a file trailer. Each event carries a CRC32-checked
//! payload of named, typed sub-records called banks. Every structural record
//! is bracketed by magic tags, so a reader can resynchronize its trust in
//! the stream at each frame boundary and classify exactly how a damaged
//! file is damaged (truncation, corruption, checksum failure, or malformed
//! banks).
//!
//! The whole crate is synchronous and single-threaded by design. A
//! [`Container`] is either a writer or a reader for its entire lifetime:
//!
//! ```no_run
//! use eventcask::{AccessMode, Codec, Container, ReadOutcome};
//!
//! # fn main() -> Result<(), eventcask::Error> {
//! let mut writer = Container::open("run42.cask", AccessMode::Write, Codec::Gzip)?;
//! writer.add_bank("HITS", 0, &[0u8; 64])?;
//! writer.write_event()?;
//! writer.close()?;
//!
//! let mut reader = Container::open("run42.cask.gz", AccessMode::Read, Codec::Gzip)?;
//! while let ReadOutcome::Event = reader.read_event()? {
//!     if let Some(hits) = reader.get_bank("HITS") {
//!         println!("event {}: {} bytes of hits", reader.event_number(), hits.size());
//!     }
//! }
//! reader.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Compressed files are transparent: the codec is layered under the framing,
//! so the record structure is identical whether or not a compression
//! transform is in place.

mod bank;
mod buffer;
mod container;
mod dump;
mod error;
mod frame;
mod transport;
mod types;

pub use bank::Bank;
pub use container::{Container, ContainerOptions, ReadOutcome};
pub use dump::{bank_dump, DumpMode};
pub use error::Error;
pub use transport::Capabilities;
pub use types::{AccessMode, Codec, DEFAULT_BUFFER_CAPACITY};
