//! Human-readable bank rendering for debugging and file inspection.
//!
//! Output is plain text, one bank per call, bracketed by start/end banners
//! so dumps of multi-bank events stay readable when concatenated.

use std::fmt::Write;

use crate::bank::Bank;

/// How bank payload bytes are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    /// 32-bit little-endian words in hex, eight words per line. A trailing
    /// partial word is rendered byte by byte.
    Hex,
    /// Individual bytes in hex, thirty-two per line.
    Ascii,
}

/// Render one bank as text: a banner with name, flags, and size, the payload
/// in the requested mode, and a closing banner.
pub fn bank_dump(bank: &Bank<'_>, mode: DumpMode) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "---- bank {:<11} flags {:#06x} size {} ----",
        bank.name,
        bank.flags,
        bank.size()
    );
    match mode {
        DumpMode::Hex => dump_hex(&mut out, bank.data),
        DumpMode::Ascii => dump_bytes(&mut out, bank.data),
    }
    let _ = writeln!(out, "---- end {} ----", bank.name);
    out
}

fn dump_hex(out: &mut String, data: &[u8]) {
    let mut chunks = data.chunks_exact(4);
    for (i, word) in chunks.by_ref().enumerate() {
        let value = u32::from_le_bytes(word.try_into().expect("4 bytes per word"));
        let _ = write!(out, "{value:08x} ");
        if i % 8 == 7 {
            out.push('\n');
        }
    }
    let tail = chunks.remainder();
    for byte in tail {
        let _ = write!(out, "{byte:02x} ");
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
}

fn dump_bytes(out: &mut String, data: &[u8]) {
    for (i, byte) in data.iter().enumerate() {
        let _ = write!(out, "{byte:02x} ");
        if i % 32 == 31 {
            out.push('\n');
        }
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
}
