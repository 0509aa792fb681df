// Property tests for splitting, anchor location, codecs and the external sort

use bytes::{Bytes, BytesMut};
use flatjoin::imdb::codec::TabbedRecord;
use flatjoin::imdb::TabbedCodec;
use flatjoin::record::{locate, ByKey, RawCodec, RecordCodec, RecordSplitter};
use flatjoin::{ExternalSorter, Options, SortDefinition};
use proptest::prelude::*;
use std::io::Cursor;
use tempfile::TempDir;

const BLOCK: &[u8] = b"\n\n--\n";

fn record_lists() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,8}", 0..40)
}

fn join(records: &[String], delimiter: &[u8], trailing: bool) -> Vec<u8> {
    let mut data = Vec::new();
    for (i, record) in records.iter().enumerate() {
        data.extend_from_slice(record.as_bytes());
        if trailing || i + 1 < records.len() {
            data.extend_from_slice(delimiter);
        }
    }
    data
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn splitter_matches_naive_split(
        records in record_lists(),
        chunk_size in 1usize..24,
        trailing in any::<bool>(),
    ) {
        let data = join(&records, BLOCK, trailing);
        let splitter = RecordSplitter::new(Cursor::new(data), BLOCK, chunk_size).unwrap();

        let split: Vec<Bytes> = splitter.collect::<Result<_, _>>().unwrap();
        let expected: Vec<&[u8]> = records.iter().map(|r| r.as_bytes()).collect();
        prop_assert_eq!(split, expected);
    }

    #[test]
    fn anchors_found_across_windows(
        header in "[A-Z ]{0,40}",
        payload in "[a-z\n]{1,60}",
        footer in "[a-z ]{0,20}",
        window in 1usize..32,
    ) {
        let mut data = Vec::new();
        data.extend_from_slice(header.as_bytes());
        data.extend_from_slice(b"\nSTART\n");
        data.extend_from_slice(payload.as_bytes());
        data.extend_from_slice(b"\n----");
        data.extend_from_slice(footer.as_bytes());

        let boundary = locate(
            &mut Cursor::new(&data),
            Some(b"\nSTART\n".as_slice()),
            Some(b"\n----".as_slice()),
            window,
        )
        .unwrap();
        prop_assert_eq!(boundary.start, (header.len() + 7) as u64);
        prop_assert_eq!(&data[boundary.start as usize..boundary.end as usize], payload.as_bytes());
    }

    #[test]
    fn external_sort_orders_without_loss(
        records in record_lists(),
        chunk_size in 1usize..64,
    ) {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.txt");
        std::fs::write(&input, join(&records, b"\n", true)).unwrap();

        let def = SortDefinition::new("prop", input, dir.path().join("out.txt"), "\n", RawCodec, ByKey)
            .options(Options::new().chunk_size(chunk_size).temp_dir(dir.path()));
        let mut out = Vec::new();
        let stats = ExternalSorter::new(def).unwrap().sort_to_writer(&mut out).unwrap();

        let mut expected = records.clone();
        expected.sort();
        prop_assert_eq!(out, join(&expected, b"\n", true));
        prop_assert_eq!(stats.records_written, records.len() as u64);
        prop_assert_eq!(stats.records_dropped, 0);
        // Only the input is left behind
        prop_assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn tabbed_codec_round_trip(
        key in "[A-Za-z0-9\"][A-Za-z0-9 ()\"{}#.]{0,30}[A-Za-z0-9)}\"]",
        value in "[a-z0-9?-]{1,12}",
    ) {
        let item = TabbedRecord { key: Bytes::from(key), value: Bytes::from(value) };
        let mut encoded = BytesMut::new();
        TabbedCodec.encode(&item, &mut encoded);

        prop_assert_eq!(TabbedCodec.decode(encoded.freeze()), Some(item));
    }
}
