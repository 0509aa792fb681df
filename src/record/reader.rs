//! Read-until-delimiter reader.
//!
//! Used wherever records are pulled one at a time from a delimited stream:
//! the heads of run files during the k-way merge, and sorted outputs during
//! the join. The read buffer starts small and doubles each time the
//! delimiter is not found in what has been read so far. Bytes read past the
//! delimiter stay buffered for the next record, so the reader never seeks.

use crate::error::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;
use std::io::{ErrorKind, Read};

/// Upper bound for a single read request.
const MAX_READ_SIZE: usize = 4 * 1024 * 1024;

/// Reads delimiter-terminated records from a byte stream.
pub struct DelimitedReader<R> {
    inner: R,
    finder: memmem::Finder<'static>,
    delimiter_len: usize,
    buffer: BytesMut,
    /// Prefix of `buffer` already searched without a match
    scanned: usize,
    initial_read_size: usize,
    read_size: usize,
    eof: bool,
}

impl<R: Read> DelimitedReader<R> {
    /// Creates a reader that splits `inner` on `delimiter`.
    pub fn new(inner: R, delimiter: &[u8], initial_read_size: usize) -> Result<Self> {
        if delimiter.is_empty() {
            return Err(Error::invalid_configuration("delimiter must not be empty"));
        }
        let initial_read_size = initial_read_size.max(1);

        Ok(Self {
            inner,
            finder: memmem::Finder::new(delimiter).into_owned(),
            delimiter_len: delimiter.len(),
            buffer: BytesMut::with_capacity(initial_read_size),
            scanned: 0,
            initial_read_size,
            read_size: initial_read_size,
            eof: false,
        })
    }

    /// Reads the next record, without its delimiter.
    ///
    /// Returns `None` at end of stream. Bytes after the last delimiter are
    /// returned as a final record.
    pub fn read_record(&mut self) -> Result<Option<Bytes>> {
        loop {
            // Resume just before the unsearched tail so a delimiter split
            // across two reads is still matched
            let from = self.scanned.saturating_sub(self.delimiter_len - 1);
            if let Some(pos) = self.finder.find(&self.buffer[from..]) {
                let record = self.buffer.split_to(from + pos).freeze();
                self.buffer.advance(self.delimiter_len);
                self.scanned = 0;
                self.read_size = self.initial_read_size;
                return Ok(Some(record));
            }
            self.scanned = self.buffer.len();

            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                self.scanned = 0;
                return Ok(Some(self.buffer.split().freeze()));
            }

            self.fill()?;
        }
    }

    /// Reads up to `read_size` more bytes into the buffer, then grows
    /// `read_size` for the next attempt.
    fn fill(&mut self) -> Result<()> {
        let start = self.buffer.len();
        self.buffer.resize(start + self.read_size, 0);

        let n = loop {
            match self.inner.read(&mut self.buffer[start..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buffer.truncate(start);
                    return Err(Error::Io(e));
                }
            }
        };

        self.buffer.truncate(start + n);
        if n == 0 {
            self.eof = true;
        } else {
            self.read_size = (self.read_size * 2).min(MAX_READ_SIZE);
        }
        Ok(())
    }

    /// Returns a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R: Read> Iterator for DelimitedReader<R> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(data: &[u8], delimiter: &[u8], read_size: usize) -> Vec<Bytes> {
        DelimitedReader::new(Cursor::new(data.to_vec()), delimiter, read_size)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_single_byte_delimiter() {
        let records = read_all(b"a\nbb\nccc\n", b"\n", 128);
        assert_eq!(records, vec!["a", "bb", "ccc"]);
    }

    #[test]
    fn test_record_longer_than_buffer() {
        let long = vec![b'x'; 1000];
        let mut data = long.clone();
        data.extend_from_slice(b"\n\nshort\n\n");

        let records = read_all(&data, b"\n\n", 4);
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][..], &long[..]);
        assert_eq!(&records[1][..], b"short");
    }

    #[test]
    fn test_multi_byte_delimiter_across_reads() {
        // With a 1-byte initial read every delimiter is split across reads
        let records = read_all(b"one<>two<>three<>", b"<>", 1);
        assert_eq!(records, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_partial_delimiter_is_data() {
        let records = read_all(b"a<b<>c<", b"<>", 2);
        assert_eq!(records, vec!["a<b", "c<"]);
    }

    #[test]
    fn test_unterminated_tail() {
        let records = read_all(b"first\nsecond", b"\n", 3);
        assert_eq!(records, vec!["first", "second"]);
    }

    #[test]
    fn test_empty_records_preserved() {
        let records = read_all(b"\n\nx\n", b"\n", 128);
        assert_eq!(records, vec!["", "", "x"]);
    }

    #[test]
    fn test_empty_stream() {
        assert!(read_all(b"", b"\n", 16).is_empty());
    }

    #[test]
    fn test_empty_delimiter_rejected() {
        assert!(DelimitedReader::new(Cursor::new(Vec::new()), b"", 16).is_err());
    }
}
