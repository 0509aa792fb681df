// Integration tests for the external sorter
// These tests sort real files through the full locate/split/run/merge pipeline

use bytes::{Bytes, BytesMut};
use flatjoin::record::{ByKey, FnCodec, RawCodec};
use flatjoin::{Error, ExternalSorter, Options, Phase, Progress, SortDefinition};
use std::cmp::Ordering;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_input(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, data).unwrap();
    path
}

fn lines(data: &[u8]) -> Vec<&[u8]> {
    data.split(|&b| b == b'\n').filter(|l| !l.is_empty()).collect()
}

/// Sorting with many tiny chunks gives the same result as an in-memory sort
#[test]
fn test_sort_matches_in_memory_sort() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();

    let mut records: Vec<String> = (0..2000).map(|i| format!("key{:05}", (i * 7919) % 2000)).collect();
    let input = write_input(&dir, "input.txt", records.join("\n").as_bytes());
    records.sort();

    let def = SortDefinition::new("keys", input, dir.path().join("out.txt"), "\n", RawCodec, ByKey)
        .options(Options::new().chunk_size(1000).temp_dir(dir.path()));
    let output = def.output.clone();
    let stats = ExternalSorter::new(def).unwrap().run().unwrap();

    assert!(stats.runs > 10, "expected many runs, got {}", stats.runs);
    assert_eq!(stats.records_written, 2000);
    assert_eq!(stats.records_read, 2000);

    let sorted = fs::read(output).unwrap();
    let expected: Vec<&[u8]> = records.iter().map(|r| r.as_bytes()).collect();
    assert_eq!(lines(&sorted), expected);
}

/// Run files live in the configured temp dir and are gone after the sort
#[test]
fn test_run_files_removed_after_sort() {
    let dir = TempDir::new().unwrap();
    let runs_dir = TempDir::new().unwrap();
    let input = write_input(&dir, "input.txt", b"c\nb\na\nf\ne\nd\n");

    let def = SortDefinition::new("letters", input, dir.path().join("out.txt"), "\n", RawCodec, ByKey)
        .options(Options::new().chunk_size(4).temp_dir(runs_dir.path()));
    let stats = ExternalSorter::new(def).unwrap().run().unwrap();

    assert!(stats.runs >= 3);
    assert_eq!(fs::read_dir(runs_dir.path()).unwrap().count(), 0);
}

/// Multi-byte delimiters are found even when split across chunk boundaries
#[test]
fn test_multi_byte_delimiter_across_chunks() {
    let dir = TempDir::new().unwrap();
    let data = b"zeta\n\n--\ngamma\n\n--\nalpha\n\n--\nbeta";
    let input = write_input(&dir, "input.txt", data);

    for chunk_size in 1..data.len() + 1 {
        let def = SortDefinition::new("blocks", input.clone(), dir.path().join("out.txt"), "\n\n--\n", RawCodec, ByKey)
            .options(Options::new().chunk_size(chunk_size));
        let mut out = Vec::new();
        ExternalSorter::new(def).unwrap().sort_to_writer(&mut out).unwrap();
        assert_eq!(
            out,
            b"alpha\n\n--\nbeta\n\n--\ngamma\n\n--\nzeta\n\n--\n",
            "chunk_size {}",
            chunk_size
        );
    }
}

/// Header and footer text outside the anchors never reaches the output
#[test]
fn test_header_and_footer_skipped() {
    let dir = TempDir::new().unwrap();
    let dashes = "-".repeat(20);
    let data = format!("CRC: 0x1234\nLIST\n====\n\nzz\t\t2001\naa\t\t1999\n{}\nfooter text\n", dashes);
    let input = write_input(&dir, "input.list", data.as_bytes());

    let def = SortDefinition::new("list", input, dir.path().join("out.txt"), "\n", RawCodec, ByKey)
        .start_anchor("LIST\n====\n\n")
        .end_anchor(format!("\n{}", dashes))
        .options(Options::new().chunk_size(8).scan_window_size(3));
    let mut out = Vec::new();
    let stats = ExternalSorter::new(def).unwrap().sort_to_writer(&mut out).unwrap();

    assert_eq!(out, b"aa\t\t1999\nzz\t\t2001\n");
    assert_eq!(stats.payload_bytes, "zz\t\t2001\naa\t\t1999".len() as u64);
}

/// A missing end anchor fails the dataset and writes nothing
#[test]
fn test_missing_end_anchor_is_fatal() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "input.txt", b"START\nb\na\n");
    let output = dir.path().join("out.txt");

    let def = SortDefinition::new("broken", input, output.clone(), "\n", RawCodec, ByKey)
        .start_anchor("START\n")
        .end_anchor("\n-----");
    let err = ExternalSorter::new(def).unwrap().run().unwrap_err();

    assert!(matches!(err, Error::BoundaryNotFound { .. }));
    assert!(err.is_fatal());
    assert!(!output.exists());
}

/// A missing input file surfaces as an I/O error
#[test]
fn test_missing_input_is_io_error() {
    let dir = TempDir::new().unwrap();
    let def = SortDefinition::new("nothing", dir.path().join("absent.txt"), dir.path().join("out.txt"), "\n", RawCodec, ByKey);

    let err = ExternalSorter::new(def).unwrap().run().unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

/// Records the codec rejects are dropped and counted, the rest still sort
#[test]
fn test_malformed_records_dropped() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "numbers.txt", b"30\nforty\n10\n\n20\nx\n");

    let codec = FnCodec::new(
        |raw: Bytes| std::str::from_utf8(&raw).ok()?.parse::<u32>().ok(),
        |n: &u32, out: &mut BytesMut| out.extend_from_slice(n.to_string().as_bytes()),
    );
    let def = SortDefinition::new("numbers", input, dir.path().join("out.txt"), "\n", codec, |a: &u32, b: &u32| {
        a.cmp(b)
    });
    let mut out = Vec::new();
    let stats = ExternalSorter::new(def).unwrap().sort_to_writer(&mut out).unwrap();

    assert_eq!(out, b"10\n20\n30\n");
    assert_eq!(stats.records_written, 3);
    assert_eq!(stats.records_dropped, 3);
}

/// A custom comparator defines the output order
#[test]
fn test_custom_comparator() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "input.txt", b"b\nc\na\n");

    let reverse = |a: &Bytes, b: &Bytes| -> Ordering { b.cmp(a) };
    let def = SortDefinition::new("reverse", input, dir.path().join("out.txt"), "\n", RawCodec, reverse)
        .options(Options::new().chunk_size(2));
    let mut out = Vec::new();
    ExternalSorter::new(def).unwrap().sort_to_writer(&mut out).unwrap();

    assert_eq!(out, b"c\nb\na\n");
}

/// Progress reflects a finished sort
#[test]
fn test_progress_reporting() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "input.txt", b"3\n1\n2\n");

    let progress = Progress::new();
    let def = SortDefinition::new("digits", input, dir.path().join("out.txt"), "\n", RawCodec, ByKey)
        .options(Options::new().chunk_size(2));
    ExternalSorter::new(def).unwrap().run_with_progress(&progress).unwrap();

    let state = progress.get("digits").unwrap();
    assert_eq!(state.phase, Phase::Done);
    assert_eq!(state.bytes_total, 6);
    assert_eq!(state.bytes_done, 6);
    assert!(state.runs >= 2);
    assert_eq!(progress.summary(), "digits: 100%");
}

/// The output replaces an existing file only once the sort succeeds
#[test]
fn test_existing_output_replaced() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "input.txt", b"b\na\n");
    let output = write_input(&dir, "out.txt", b"stale contents\n");

    let def = SortDefinition::new("replace", input.clone(), output.clone(), "\n", RawCodec, ByKey);
    ExternalSorter::new(def).unwrap().run().unwrap();
    assert_eq!(fs::read(&output).unwrap(), b"a\nb\n");

    // A failing sort leaves the previous output alone
    let def = SortDefinition::new("replace", input, output.clone(), "\n", RawCodec, ByKey).start_anchor("NOPE");
    assert!(ExternalSorter::new(def).unwrap().run().is_err());
    assert_eq!(fs::read(&output).unwrap(), b"a\nb\n");
}
