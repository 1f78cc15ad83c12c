//! End-to-end container tests: write a real file, read it back, and check
//! the integrity machinery against deliberately damaged copies.

use std::path::{Path, PathBuf};

use eventcask::{
    AccessMode, Capabilities, Codec, Container, ContainerOptions, Error, ReadOutcome,
};

const FILE_HEADER_LEN: usize = 60;
const EVENT_HEADER_LEN: usize = 32;
const EVENT_TRAILER_LEN: usize = 20;
const BANK_HEADER_LEN: usize = 20;
const FILE_TRAILER_LEN: usize = 60;

const FILE_OPEN_MAGIC: u32 = 0xCBDF_CBDF;
const EVENT_OPEN_MAGIC: u32 = 0xCBED_CBED;
const EVENT_CLOSE_MAGIC: u32 = 0xDEBC_DEBC;
const FILE_CLOSE_MAGIC: u32 = 0xFDBC_FDBC;

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("4 bytes"))
}

/// Write a file with one HITS bank of 64 bytes per event.
fn write_hits_file(path: &Path, events: usize) -> PathBuf {
    let mut writer =
        Container::open(path, AccessMode::Write, Codec::None).expect("open for write");
    for i in 0..events {
        let payload = vec![i as u8; 64];
        writer.add_bank("HITS", 7, &payload).expect("add bank");
        writer.write_event().expect("write event");
    }
    let actual = writer.file_name().to_path_buf();
    writer.close().expect("close writer");
    actual
}

#[test]
fn round_trip_many_events() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_hits_file(&dir.path().join("run.cask"), 10);

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    let mut seen = 0u64;
    loop {
        match reader.read_event().expect("read event") {
            ReadOutcome::Event => {
                seen += 1;
                assert_eq!(reader.event_number(), seen);
                let hits = reader.get_bank("HITS").expect("HITS bank present");
                assert_eq!(hits.flags, 7);
                assert_eq!(hits.size(), 64);
                assert!(hits.data.iter().all(|&b| b == (seen - 1) as u8));
                assert_eq!(reader.bank_count(), 1);
            }
            ReadOutcome::Eof => break,
        }
    }
    assert_eq!(seen, 10);

    // Eof is idempotent, not an error.
    assert_eq!(reader.read_event().expect("repeat read"), ReadOutcome::Eof);
    assert_eq!(reader.read_event().expect("repeat read"), ReadOutcome::Eof);
    reader.close().expect("close reader");
}

#[test]
fn on_disk_layout_matches_worked_example() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_hits_file(&dir.path().join("layout.cask"), 1);
    let bytes = std::fs::read(&path).expect("read file back");

    // One 64-byte bank: payload is bank header + data.
    let payload_len = BANK_HEADER_LEN + 64;
    assert_eq!(
        bytes.len(),
        FILE_HEADER_LEN + EVENT_HEADER_LEN + payload_len + EVENT_TRAILER_LEN + FILE_TRAILER_LEN
    );

    assert_eq!(u32_at(&bytes, 0), FILE_OPEN_MAGIC);
    assert_eq!(u32_at(&bytes, 56), FILE_OPEN_MAGIC);

    let event = FILE_HEADER_LEN;
    assert_eq!(u32_at(&bytes, event), EVENT_OPEN_MAGIC);
    assert_eq!(u32_at(&bytes, event + 28), EVENT_OPEN_MAGIC);
    // Event number 1, payload size, both as little-endian u64.
    assert_eq!(u32_at(&bytes, event + 4), 1);
    assert_eq!(u32_at(&bytes, event + 20), payload_len as u32);

    // Bank header starts the payload: name field then flags.
    let bank = event + EVENT_HEADER_LEN;
    assert_eq!(&bytes[bank..bank + 5], b"HITS\0");
    assert_eq!(u32_at(&bytes, bank + 16), 64);

    let trailer = bank + payload_len;
    assert_eq!(u32_at(&bytes, trailer), EVENT_CLOSE_MAGIC);
    assert_eq!(u32_at(&bytes, trailer + 16), EVENT_CLOSE_MAGIC);

    let file_trailer = trailer + EVENT_TRAILER_LEN;
    assert_eq!(u32_at(&bytes, file_trailer), FILE_CLOSE_MAGIC);
    assert_eq!(u32_at(&bytes, file_trailer + 56), FILE_CLOSE_MAGIC);
}

#[test]
fn flipped_payload_byte_is_crc_error_and_faults_the_container() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_hits_file(&dir.path().join("crc.cask"), 2);

    let mut bytes = std::fs::read(&path).expect("read file");
    // First data byte of the first event's bank payload.
    bytes[FILE_HEADER_LEN + EVENT_HEADER_LEN + BANK_HEADER_LEN] ^= 0xFF;
    std::fs::write(&path, &bytes).expect("write damaged copy");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    let err = reader.read_event().expect_err("damaged payload must fail");
    assert!(matches!(err, Error::EventCrc { .. }), "got {err}");

    // The fault is sticky until re-open.
    let err = reader.read_event().expect_err("container stays faulted");
    assert!(matches!(err, Error::Faulted));
    let err = reader.skip_events(1).expect_err("skip is rejected too");
    assert!(matches!(err, Error::Faulted));
}

#[test]
fn truncated_file_is_unexpected_eof() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_hits_file(&dir.path().join("trunc.cask"), 1);

    let bytes = std::fs::read(&path).expect("read file");
    // Cut inside the event body.
    std::fs::write(&path, &bytes[..FILE_HEADER_LEN + EVENT_HEADER_LEN + 10])
        .expect("write truncated copy");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    let err = reader.read_event().expect_err("truncation must fail");
    assert!(matches!(err, Error::UnexpectedEof(_)), "got {err}");
    assert!(matches!(reader.read_event(), Err(Error::Faulted)));
}

#[test]
fn missing_file_trailer_is_unexpected_eof_not_eof() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_hits_file(&dir.path().join("notrailer.cask"), 1);

    let bytes = std::fs::read(&path).expect("read file");
    std::fs::write(&path, &bytes[..bytes.len() - FILE_TRAILER_LEN])
        .expect("write copy without trailer");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    assert_eq!(reader.read_event().expect("event 1"), ReadOutcome::Event);
    let err = reader.read_event().expect_err("missing trailer is truncation");
    assert!(matches!(err, Error::UnexpectedEof(_)), "got {err}");
}

#[test]
fn corrupt_event_header_tag_is_event_header_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_hits_file(&dir.path().join("badhdr.cask"), 1);

    let mut bytes = std::fs::read(&path).expect("read file");
    bytes[FILE_HEADER_LEN] ^= 0x0F;
    std::fs::write(&path, &bytes).expect("write damaged copy");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    let err = reader.read_event().expect_err("bad header tag must fail");
    assert!(matches!(err, Error::EventHeaderNotFound { .. }), "got {err}");
}

#[test]
fn header_trailer_size_disagreement_is_mismatch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_hits_file(&dir.path().join("mismatch.cask"), 1);

    let mut bytes = std::fs::read(&path).expect("read file");
    // Size field of the event trailer, offset 8 within the trailer.
    let trailer = FILE_HEADER_LEN + EVENT_HEADER_LEN + BANK_HEADER_LEN + 64;
    bytes[trailer + 8] ^= 0x01;
    std::fs::write(&path, &bytes).expect("write damaged copy");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    let err = reader.read_event().expect_err("size disagreement must fail");
    assert!(
        matches!(err, Error::EventHeaderTrailerMismatch(_)),
        "got {err}"
    );
}

#[test]
fn malformed_bank_sequence_is_bank_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("badbank.cask");

    // CRC and framing are valid; only the bank decomposition is broken. A
    // raw bank header declaring 100 bytes is followed by just 4.
    let mut writer =
        Container::open(&path, AccessMode::Write, Codec::None).expect("open for write");
    let mut raw = Vec::new();
    raw.extend_from_slice(b"LIAR\0\0\0\0\0\0\0\0");
    raw.extend_from_slice(&0u16.to_le_bytes());
    raw.extend_from_slice(&[0u8; 2]);
    raw.extend_from_slice(&100u32.to_le_bytes());
    raw.extend_from_slice(&[1, 2, 3, 4]);
    writer.add_raw_data(&raw).expect("raw data accepted as-is");
    writer.write_event().expect("write event");
    writer.close().expect("close writer");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    let err = reader.read_event().expect_err("bank overrun must fail");
    assert!(matches!(err, Error::Bank(_)), "got {err}");
}

#[test]
fn buffer_grows_across_events_and_preserves_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("grow.cask");

    let options = ContainerOptions {
        buffer_capacity: 64,
        ..ContainerOptions::default()
    };
    let mut writer =
        Container::open_with_options(&path, AccessMode::Write, Codec::None, options)
            .expect("open for write");

    writer.add_bank("SMALL", 0, &[0x11; 8]).expect("small bank");
    writer.write_event().expect("write small event");

    // Far beyond the initial capacity, forcing several doublings.
    let big: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
    writer.add_bank("BIG", 0, &big).expect("big bank");
    writer.write_event().expect("write big event");
    writer.close().expect("close writer");

    // Read back through an equally small starting buffer.
    let mut reader = Container::open_with_options(&path, AccessMode::Read, Codec::None, options)
        .expect("open for read");

    assert_eq!(reader.read_event().expect("event 1"), ReadOutcome::Event);
    assert_eq!(reader.get_bank("SMALL").expect("SMALL present").size(), 8);

    assert_eq!(reader.read_event().expect("event 2"), ReadOutcome::Event);
    let bank = reader.get_bank("BIG").expect("BIG present");
    assert_eq!(bank.data, big.as_slice());

    assert_eq!(reader.read_event().expect("eof"), ReadOutcome::Eof);
}

#[test]
fn skip_events_lands_on_the_following_event() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_hits_file(&dir.path().join("skip.cask"), 5);

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    assert_eq!(reader.skip_events(2).expect("skip 2"), ReadOutcome::Event);
    assert_eq!(reader.event_number(), 3);
    // Skipped events leave no banks behind; the landed one is fully indexed.
    assert!(reader.get_bank("HITS").is_some());

    assert_eq!(reader.read_event().expect("event 4"), ReadOutcome::Event);
    assert_eq!(reader.event_number(), 4);

    // Skipping past the end is a clean Eof.
    assert_eq!(reader.skip_events(10).expect("skip past end"), ReadOutcome::Eof);
    assert_eq!(reader.read_event().expect("still eof"), ReadOutcome::Eof);
}

#[test]
fn empty_event_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("empty.cask");

    let mut writer =
        Container::open(&path, AccessMode::Write, Codec::None).expect("open for write");
    writer.write_event().expect("zero-bank event is legal");
    writer.close().expect("close writer");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    assert_eq!(reader.read_event().expect("event"), ReadOutcome::Event);
    assert_eq!(reader.bank_count(), 0);
    assert_eq!(reader.event_size(), 0);
    assert!(reader.raw_payload().is_empty());
    assert_eq!(reader.read_event().expect("eof"), ReadOutcome::Eof);
}

#[test]
fn user_flags_round_trip_per_event() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("flags.cask");

    let mut writer =
        Container::open(&path, AccessMode::Write, Codec::None).expect("open for write");
    writer.set_event_user_flags(0xAB).expect("set flags");
    writer.add_bank("A", 0, b"x").expect("add bank");
    writer.write_event().expect("write event 1");
    writer.set_event_user_flags(0xCD).expect("set flags");
    writer.add_bank("A", 0, b"y").expect("add bank");
    writer.write_event().expect("write event 2");
    writer.close().expect("close writer");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    reader.read_event().expect("event 1");
    assert_eq!(reader.event_user_flags(), 0xAB);
    reader.read_event().expect("event 2");
    assert_eq!(reader.event_user_flags(), 0xCD);
}

#[test]
fn multiple_banks_enumerate_and_look_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("multi.cask");

    let mut writer =
        Container::open(&path, AccessMode::Write, Codec::None).expect("open for write");
    writer.add_bank("HITS", 1, &[0xAA; 16]).expect("add HITS");
    writer.add_bank("TRACKS", 2, &[0xBB; 24]).expect("add TRACKS");
    writer.add_bank("CALIB", 3, &[]).expect("add empty CALIB");
    writer.write_event().expect("write event");
    writer.close().expect("close writer");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    reader.read_event().expect("event");
    assert_eq!(reader.bank_count(), 3);

    let mut names: Vec<String> = reader.banks().map(|b| b.name.to_string()).collect();
    names.sort();
    assert_eq!(names, ["CALIB", "HITS", "TRACKS"]);

    let tracks = reader.get_bank("TRACKS").expect("TRACKS present");
    assert_eq!(tracks.flags, 2);
    assert_eq!(tracks.data, &[0xBB; 24]);
    assert_eq!(reader.get_bank("CALIB").expect("CALIB present").size(), 0);
    assert!(reader.get_bank("NOSUCH").is_none());

    // Raw payload is exactly the concatenated banks.
    assert_eq!(reader.event_size(), (3 * BANK_HEADER_LEN + 16 + 24) as u64);
}

#[test]
fn gzip_round_trip_appends_suffix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let requested = dir.path().join("zipped.cask");

    let mut writer =
        Container::open(&requested, AccessMode::Write, Codec::Gzip).expect("open for write");
    let actual = writer.file_name().to_path_buf();
    assert_eq!(actual, dir.path().join("zipped.cask.gz"));
    writer.add_bank("HITS", 0, &[0x5A; 128]).expect("add bank");
    writer.write_event().expect("write event");
    writer.close().expect("close writer");

    let raw = std::fs::read(&actual).expect("read compressed file");
    assert_eq!(&raw[..2], &[0x1F, 0x8B], "gzip magic on disk");

    let mut reader =
        Container::open(&actual, AccessMode::Read, Codec::Gzip).expect("open for read");
    assert_eq!(reader.read_event().expect("event"), ReadOutcome::Event);
    assert_eq!(reader.get_bank("HITS").expect("HITS present").size(), 128);
    assert_eq!(reader.read_event().expect("eof"), ReadOutcome::Eof);
}

#[test]
fn unsupported_codec_write_falls_back_read_fails_fast() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("lzo.cask");

    // Write side: falls back to uncompressed, no suffix.
    let mut writer =
        Container::open(&path, AccessMode::Write, Codec::Lzo).expect("fallback write succeeds");
    assert_eq!(writer.file_name(), path.as_path());
    writer.add_bank("A", 0, b"data").expect("add bank");
    writer.write_event().expect("write event");
    writer.close().expect("close writer");

    // Read side: fails fast on the unsupported codec.
    let err = Container::open(&path, AccessMode::Read, Codec::Lzo)
        .expect_err("read-side must reject lzo");
    assert!(matches!(err, Error::UnsupportedCodec { codec: Codec::Lzo }));

    // The fallback file is a plain container.
    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open as plain");
    assert_eq!(reader.read_event().expect("event"), ReadOutcome::Event);
}

#[test]
fn capabilities_restrict_codec_selection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nogzip.cask");

    let options = ContainerOptions {
        capabilities: Capabilities {
            gzip: false,
            bzip2: false,
            xz: false,
            lzo: false,
        },
        ..ContainerOptions::default()
    };

    // Write side falls back to plain even for a normally supported codec.
    let writer = Container::open_with_options(&path, AccessMode::Write, Codec::Gzip, options)
        .expect("fallback write succeeds");
    assert_eq!(writer.file_name(), path.as_path());
    writer.close().expect("close writer");

    let err = Container::open_with_options(&path, AccessMode::Read, Codec::Gzip, options)
        .expect_err("read-side must reject gzip without the capability");
    assert!(matches!(err, Error::UnsupportedCodec { codec: Codec::Gzip }));
}

#[test]
fn clear_event_drops_staged_banks_from_the_stream() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("clear.cask");

    let mut writer =
        Container::open(&path, AccessMode::Write, Codec::None).expect("open for write");
    writer.add_bank("DROPPED", 0, &[9; 32]).expect("add bank");
    writer.clear_event();
    writer.add_bank("KEPT", 0, &[1; 4]).expect("add bank");
    writer.write_event().expect("write event");
    writer.close().expect("close writer");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    reader.read_event().expect("event");
    assert!(reader.get_bank("DROPPED").is_none());
    assert!(reader.get_bank("KEPT").is_some());
    // The counter did not advance for the cleared event.
    assert_eq!(reader.event_number(), 1);
}

#[test]
fn dump_banks_renders_every_bank() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dump.cask");

    let mut writer =
        Container::open(&path, AccessMode::Write, Codec::None).expect("open for write");
    writer
        .add_bank("WORDS", 0, &0xDEAD_BEEFu32.to_le_bytes())
        .expect("add bank");
    writer.write_event().expect("write event");
    writer.close().expect("close writer");

    let mut reader = Container::open(&path, AccessMode::Read, Codec::None).expect("open for read");
    reader.read_event().expect("event");
    let text = reader.dump_banks(eventcask::DumpMode::Hex);
    assert!(text.contains("WORDS"), "bank name in: {text}");
    assert!(text.contains("deadbeef"), "payload word in: {text}");
}

#[test]
fn bank_name_validation_happens_at_add_time() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut writer = Container::open(
        dir.path().join("names.cask"),
        AccessMode::Write,
        Codec::None,
    )
    .expect("open for write");

    assert!(matches!(
        writer.add_bank("", 0, b""),
        Err(Error::BankName(_))
    ));
    assert!(matches!(
        writer.add_bank("TWELVECHARSX", 0, b""),
        Err(Error::BankName(_))
    ));
    assert!(matches!(
        writer.add_bank("caf\u{e9}", 0, b""),
        Err(Error::BankName(_))
    ));
    // Rejected banks leave nothing staged.
    assert_eq!(writer.event_size(), 0);
    writer.add_bank("ABCDEFGHIJK", 0, b"ok").expect("11 chars is legal");
}
