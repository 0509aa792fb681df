//! Raw record handling.
//!
//! A record is an opaque byte sequence cut out of a flat file on a
//! dataset-specific delimiter. This module holds the seams the rest of the
//! pipeline is generic over:
//!
//! - **RecordCodec**: turns raw bytes into a typed item and back
//! - **Comparator**: orders typed items within a dataset
//! - **Keyed**: exposes the bytewise join/sort key of an item
//!
//! and the streaming pieces that produce records:
//!
//! - **Boundary Locator** (`boundary`): finds the payload between anchors
//! - **Record Splitter** (`splitter`): chunked split of the payload
//! - **Delimited Reader** (`reader`): one record at a time from runs and
//!   sorted streams

pub mod boundary;
pub mod reader;
pub mod splitter;

pub use boundary::{locate, Boundary};
pub use reader::DelimitedReader;
pub use splitter::RecordSplitter;

use bytes::{Bytes, BytesMut};
use std::cmp::Ordering;

/// Converts between raw record bytes and a typed item.
///
/// Framing is not the codec's concern: `decode` never sees the delimiter and
/// `encode` must not write it.
pub trait RecordCodec {
    /// The typed form of a record.
    type Item;

    /// Decodes a record. Returns `None` for malformed input, which the
    /// pipeline drops and logs.
    fn decode(&self, raw: Bytes) -> Option<Self::Item>;

    /// Appends the encoded form of `item` to `out`.
    fn encode(&self, item: &Self::Item, out: &mut BytesMut);
}

/// Total order over the items of one dataset.
pub trait Comparator<T> {
    /// Compares two items.
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

impl<T, F> Comparator<T> for F
where
    F: Fn(&T, &T) -> Ordering,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

/// An item with a bytewise key.
pub trait Keyed {
    /// The key bytes; compared ordinally, never locale-aware.
    fn key(&self) -> &[u8];
}

/// Ordinal comparator over [`Keyed`] items.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByKey;

impl<T: Keyed> Comparator<T> for ByKey {
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.key().cmp(b.key())
    }
}

/// A codec built from a pair of closures.
pub struct FnCodec<D, E> {
    decode: D,
    encode: E,
}

impl<D, E> FnCodec<D, E> {
    /// Creates a codec from a decode and an encode function.
    pub fn new(decode: D, encode: E) -> Self {
        Self { decode, encode }
    }
}

impl<T, D, E> RecordCodec for FnCodec<D, E>
where
    D: Fn(Bytes) -> Option<T>,
    E: Fn(&T, &mut BytesMut),
{
    type Item = T;

    fn decode(&self, raw: Bytes) -> Option<T> {
        (self.decode)(raw)
    }

    fn encode(&self, item: &T, out: &mut BytesMut) {
        (self.encode)(item, out)
    }
}

/// Codec whose items are the raw record bytes themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl RecordCodec for RawCodec {
    type Item = Bytes;

    fn decode(&self, raw: Bytes) -> Option<Bytes> {
        if raw.is_empty() {
            None
        } else {
            Some(raw)
        }
    }

    fn encode(&self, item: &Bytes, out: &mut BytesMut) {
        out.extend_from_slice(item);
    }
}

impl Keyed for Bytes {
    fn key(&self) -> &[u8] {
        self
    }
}
