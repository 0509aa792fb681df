//! Sorted stream cursor.
//!
//! A forward-only, peekable cursor over one sorted output. It holds exactly
//! one decoded record (or nothing, at end of stream) and never rewinds.
//! Callers must drive it with non-decreasing targets; in debug builds the
//! cursor also asserts that the stream itself never goes backwards.

use crate::error::Result;
use crate::record::{DelimitedReader, Keyed, RecordCodec};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Forward-only cursor over a sorted stream of records.
pub struct SortedStreamCursor<R, C: RecordCodec> {
    reader: DelimitedReader<R>,
    codec: C,
    current: Option<C::Item>,
    skipped: u64,
    #[cfg(debug_assertions)]
    last_key: Option<Vec<u8>>,
}

impl<C> SortedStreamCursor<BufReader<File>, C>
where
    C: RecordCodec,
    C::Item: Keyed,
{
    /// Opens a sorted file produced by the external sorter.
    pub fn open(
        path: impl AsRef<Path>,
        delimiter: &[u8],
        codec: C,
        read_buffer_size: usize,
    ) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file), delimiter, codec, read_buffer_size)
    }
}

impl<R, C> SortedStreamCursor<R, C>
where
    R: Read,
    C: RecordCodec,
    C::Item: Keyed,
{
    /// Wraps a sorted stream and loads its first record.
    pub fn new(inner: R, delimiter: &[u8], codec: C, read_buffer_size: usize) -> Result<Self> {
        let mut cursor = Self {
            reader: DelimitedReader::new(inner, delimiter, read_buffer_size)?,
            codec,
            current: None,
            skipped: 0,
            #[cfg(debug_assertions)]
            last_key: None,
        };
        cursor.load_next()?;
        Ok(cursor)
    }

    /// Replaces the current record with the next decodable one.
    fn load_next(&mut self) -> Result<()> {
        self.current = None;
        while let Some(raw) = self.reader.read_record()? {
            if raw.is_empty() {
                continue;
            }
            let Some(item) = self.codec.decode(raw) else {
                self.skipped += 1;
                continue;
            };

            #[cfg(debug_assertions)]
            {
                if let Some(last) = &self.last_key {
                    debug_assert!(
                        last.as_slice() <= item.key(),
                        "sorted stream went backwards: {:?} after {:?}",
                        String::from_utf8_lossy(item.key()),
                        String::from_utf8_lossy(last)
                    );
                }
                self.last_key = Some(item.key().to_vec());
            }

            self.current = Some(item);
            break;
        }
        Ok(())
    }

    /// The current record, without consuming it.
    pub fn peek(&self) -> Option<&C::Item> {
        self.current.as_ref()
    }

    /// Key of the current record.
    pub fn peek_key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|item| item.key())
    }

    /// True once every record has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }

    /// Records skipped because they failed to decode.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Consumes and returns the current record.
    pub fn advance(&mut self) -> Result<Option<C::Item>> {
        let Some(item) = self.current.take() else {
            return Ok(None);
        };
        self.load_next()?;
        Ok(Some(item))
    }

    /// Discards records while `predicate` holds for their key and returns
    /// them. Stops at end of stream or at the first key that fails.
    pub fn advance_while<P>(&mut self, predicate: P) -> Result<Vec<C::Item>>
    where
        P: FnMut(&[u8]) -> bool,
    {
        self.drain_while(predicate)
    }

    /// Consumes and returns records while `predicate` holds for their key.
    pub fn collect_while<P>(&mut self, predicate: P) -> Result<Vec<C::Item>>
    where
        P: FnMut(&[u8]) -> bool,
    {
        self.drain_while(predicate)
    }

    fn drain_while<P>(&mut self, mut predicate: P) -> Result<Vec<C::Item>>
    where
        P: FnMut(&[u8]) -> bool,
    {
        let mut taken = Vec::new();
        while let Some(item) = &self.current {
            if !predicate(item.key()) {
                break;
            }
            if let Some(item) = self.advance()? {
                taken.push(item);
            }
        }
        Ok(taken)
    }
}

impl<R, C> Iterator for SortedStreamCursor<R, C>
where
    R: Read,
    C: RecordCodec,
    C::Item: Keyed,
{
    type Item = Result<C::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}
