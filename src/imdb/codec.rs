//! Byte codecs for the IMDb list dumps.
//!
//! Each codec only cuts a record into its key and an opaque remainder at
//! fixed byte positions; the textual grammar inside the remainder is left to
//! `imdb::title`. Keys are the full title exactly as it appears in the dump,
//! with trailing whitespace removed, so every dataset sorts and joins on the
//! same ordinal byte string.

use crate::record::{Keyed, RecordCodec};
use bytes::{Bytes, BytesMut};
use memchr::{memchr, memmem, memrchr};

const TAB: u8 = b'\t';
const NEWLINE: u8 = b'\n';

/// Width of the statistics columns in front of a ratings title.
pub const RATING_PREFIX_LEN: usize = 32;

/// Marker in front of a plot title.
pub const PLOT_PREFIX: &[u8] = b"MV: ";

fn trim_end(bytes: Bytes) -> Bytes {
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(0, |i| i + 1);
    bytes.slice(..end)
}

fn trim(bytes: Bytes) -> Bytes {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    trim_end(bytes.slice(start..))
}

/// A `key <tabs> value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabbedRecord {
    /// Text before the first tab.
    pub key: Bytes,
    /// Text after the last tab.
    pub value: Bytes,
}

impl Keyed for TabbedRecord {
    fn key(&self) -> &[u8] {
        &self.key
    }
}

/// Codec for tab-separated lines: movies, genres and media ids.
///
/// Re-encodes as `key\t\t\tvalue`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabbedCodec;

impl RecordCodec for TabbedCodec {
    type Item = TabbedRecord;

    fn decode(&self, raw: Bytes) -> Option<TabbedRecord> {
        let raw = trim(raw);
        let first = memchr(TAB, &raw)?;
        let last = memrchr(TAB, &raw)?;

        let key = trim_end(raw.slice(..first));
        if key.is_empty() {
            return None;
        }
        Some(TabbedRecord { key, value: trim(raw.slice(last + 1..)) })
    }

    fn encode(&self, item: &TabbedRecord, out: &mut BytesMut) {
        out.extend_from_slice(&item.key);
        out.extend_from_slice(b"\t\t\t");
        out.extend_from_slice(&item.value);
    }
}

/// A title followed by its alternate-title lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AkaRecord {
    /// The title line.
    pub key: Bytes,
    /// Each following non-empty line, untrimmed.
    pub titles: Vec<Bytes>,
}

impl Keyed for AkaRecord {
    fn key(&self) -> &[u8] {
        &self.key
    }
}

/// Codec for blank-line separated alternate-title blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AkaCodec;

impl RecordCodec for AkaCodec {
    type Item = AkaRecord;

    fn decode(&self, raw: Bytes) -> Option<AkaRecord> {
        let mut lines = raw
            .split(|&b| b == NEWLINE)
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(|line| raw.slice_ref(line));

        let key = trim(lines.next()?);
        Some(AkaRecord { key, titles: lines.collect() })
    }

    fn encode(&self, item: &AkaRecord, out: &mut BytesMut) {
        out.extend_from_slice(&item.key);
        for title in &item.titles {
            out.extend_from_slice(&[NEWLINE]);
            out.extend_from_slice(title);
        }
    }
}

/// A ratings line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingRecord {
    /// The fixed-width statistics columns: new flag, distribution, votes
    /// and rank.
    pub data: Bytes,
    /// The title after the statistics.
    pub key: Bytes,
}

impl Keyed for RatingRecord {
    fn key(&self) -> &[u8] {
        &self.key
    }
}

/// Codec for fixed-width ratings lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatingCodec;

impl RecordCodec for RatingCodec {
    type Item = RatingRecord;

    fn decode(&self, raw: Bytes) -> Option<RatingRecord> {
        if raw.len() <= RATING_PREFIX_LEN {
            return None;
        }
        let key = trim(raw.slice(RATING_PREFIX_LEN..));
        if key.is_empty() {
            return None;
        }
        Some(RatingRecord { data: raw.slice(..RATING_PREFIX_LEN), key })
    }

    fn encode(&self, item: &RatingRecord, out: &mut BytesMut) {
        out.extend_from_slice(&item.data);
        out.extend_from_slice(&item.key);
    }
}

/// A plot summary block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotRecord {
    /// The title after `MV: `.
    pub key: Bytes,
    /// Everything after the blank line following the title.
    pub body: Bytes,
}

impl Keyed for PlotRecord {
    fn key(&self) -> &[u8] {
        &self.key
    }
}

/// Codec for plot summary blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlotCodec;

impl RecordCodec for PlotCodec {
    type Item = PlotRecord;

    fn decode(&self, raw: Bytes) -> Option<PlotRecord> {
        // The first block of a dump still carries the separator line
        let start = if raw.starts_with(PLOT_PREFIX) {
            0
        } else {
            memmem::find(&raw, b"\nMV: ")? + 1
        };
        let raw = raw.slice(start + PLOT_PREFIX.len()..);

        let (key, body) = match memchr(NEWLINE, &raw) {
            Some(eol) => {
                let body_start = (eol + 2).min(raw.len());
                (raw.slice(..eol), raw.slice(body_start..))
            }
            None => (raw.clone(), Bytes::new()),
        };
        let key = trim(key);
        if key.is_empty() {
            return None;
        }
        Some(PlotRecord { key, body })
    }

    fn encode(&self, item: &PlotRecord, out: &mut BytesMut) {
        out.extend_from_slice(PLOT_PREFIX);
        out.extend_from_slice(&item.key);
        out.extend_from_slice(b"\n\n");
        out.extend_from_slice(&item.body);
    }
}
