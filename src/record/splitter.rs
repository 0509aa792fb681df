//! Chunked record splitter.
//!
//! Streams the payload in fixed-size chunks and cuts it into records on the
//! dataset delimiter. Bytes after the last delimiter of a chunk form the
//! remainder; the next chunk is appended to it before scanning resumes, so a
//! record or delimiter spanning a chunk boundary is never split or missed.
//! When the source is exhausted a non-empty remainder becomes the last record.
//!
//! Records are `Bytes` views into the chunk buffer; no per-record copy is
//! made.

use crate::error::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

/// Splits a byte stream into delimiter-separated records, one chunk at a time.
pub struct RecordSplitter<R> {
    inner: R,
    finder: memmem::Finder<'static>,
    delimiter_len: usize,
    chunk_size: usize,
    /// Unresolved bytes: the remainder plus the newest chunk
    buffer: BytesMut,
    /// Bytes handed out so far, delimiters included
    consumed: u64,
    /// Records of the current batch not yet returned by `next()`
    pending: VecDeque<Bytes>,
    finished: bool,
}

impl<R: Read> RecordSplitter<R> {
    /// Creates a splitter. Bound `inner` to the payload with `Read::take`.
    pub fn new(inner: R, delimiter: &[u8], chunk_size: usize) -> Result<Self> {
        if delimiter.is_empty() {
            return Err(Error::invalid_configuration("delimiter must not be empty"));
        }
        if chunk_size == 0 {
            return Err(Error::invalid_configuration("chunk_size must be > 0"));
        }

        Ok(Self {
            inner,
            finder: memmem::Finder::new(delimiter).into_owned(),
            delimiter_len: delimiter.len(),
            chunk_size,
            buffer: BytesMut::new(),
            consumed: 0,
            pending: VecDeque::new(),
            finished: false,
        })
    }

    /// Reads one chunk and returns every record it completes.
    ///
    /// A batch can be empty when a chunk holds no delimiter. Returns `None`
    /// once the source is exhausted and the remainder has been emitted.
    pub fn next_batch(&mut self) -> Result<Option<Vec<Bytes>>> {
        if self.finished {
            return Ok(None);
        }

        // The remainder was fully scanned last time; only its last
        // delimiter_len - 1 bytes can start a match with the new chunk
        let resume = self.buffer.len().saturating_sub(self.delimiter_len - 1);
        let read = self.read_chunk()?;

        let mut batch = Vec::new();
        let mut from = resume;
        while let Some(pos) = self.finder.find(&self.buffer[from..]) {
            let record = self.buffer.split_to(from + pos).freeze();
            self.buffer.advance(self.delimiter_len);
            self.consumed += (record.len() + self.delimiter_len) as u64;
            batch.push(record);
            from = 0;
        }

        if read < self.chunk_size {
            self.finished = true;
            if !self.buffer.is_empty() {
                let last = self.buffer.split().freeze();
                self.consumed += last.len() as u64;
                batch.push(last);
            }
            if batch.is_empty() {
                return Ok(None);
            }
        }

        log::trace!(
            "Split chunk of {} bytes into {} records ({} bytes carried over)",
            read,
            batch.len(),
            self.buffer.len()
        );
        Ok(Some(batch))
    }

    /// Appends up to `chunk_size` bytes to the buffer; returns how many were
    /// read. Fewer than `chunk_size` means the source is exhausted.
    fn read_chunk(&mut self) -> Result<usize> {
        let start = self.buffer.len();
        self.buffer.resize(start + self.chunk_size, 0);

        let mut filled = 0;
        while filled < self.chunk_size {
            match self.inner.read(&mut self.buffer[start + filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buffer.truncate(start + filled);
                    return Err(Error::Io(e));
                }
            }
        }

        self.buffer.truncate(start + filled);
        Ok(filled)
    }

    /// Payload bytes turned into records so far.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }
}

impl<R: Read> Iterator for RecordSplitter<R> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            match self.next_batch() {
                Ok(Some(batch)) => self.pending.extend(batch),
                Ok(None) => return None,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn split(data: &[u8], delimiter: &[u8], chunk_size: usize) -> Vec<Bytes> {
        RecordSplitter::new(Cursor::new(data.to_vec()), delimiter, chunk_size)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split(b"a\nb\nc\n", b"\n", 1024), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_final_record_without_delimiter() {
        assert_eq!(split(b"a\nb\nlast", b"\n", 1024), vec!["a", "b", "last"]);
    }

    #[test]
    fn test_chunk_smaller_than_record() {
        let data = b"alpha--beta--gamma--delta";
        for chunk_size in 1..data.len() + 2 {
            assert_eq!(
                split(data, b"--", chunk_size),
                vec!["alpha", "beta", "gamma", "delta"],
                "chunk_size {}",
                chunk_size
            );
        }
    }

    #[test]
    fn test_delimiter_straddles_chunk_boundary() {
        // chunk 1 = "ab<", chunk 2 = "=>cd": the delimiter is split 1/2
        assert_eq!(split(b"ab<=>cd", b"<=>", 3), vec!["ab", "cd"]);
        // chunk 1 = "ab<=", chunk 2 = ">cd": split 2/1
        assert_eq!(split(b"ab<=>cd", b"<=>", 4), vec!["ab", "cd"]);
    }

    #[test]
    fn test_partial_delimiter_at_edge_is_data() {
        assert_eq!(split(b"x<=y<=>z<=", b"<=>", 2), vec!["x<=y", "z<="]);
    }

    #[test]
    fn test_empty_input() {
        assert!(split(b"", b"\n", 16).is_empty());
    }

    #[test]
    fn test_batches_follow_chunks() {
        let data = b"aa\nbb\ncc\ndd\n";
        let mut splitter = RecordSplitter::new(Cursor::new(data.to_vec()), b"\n", 6).unwrap();

        assert_eq!(splitter.next_batch().unwrap().unwrap(), vec!["aa", "bb"]);
        assert_eq!(splitter.next_batch().unwrap().unwrap(), vec!["cc", "dd"]);
        assert!(splitter.next_batch().unwrap().is_none());
        assert_eq!(splitter.bytes_consumed(), data.len() as u64);
    }

    #[test]
    fn test_bounded_by_take() {
        let data = b"skip|keep1\nkeep2\n|skip";
        let mut cursor = Cursor::new(data.to_vec());
        cursor.set_position(5);
        let splitter = RecordSplitter::new(Read::take(cursor, 12), b"\n", 4).unwrap();
        let records: Vec<Bytes> = splitter.collect::<Result<_>>().unwrap();
        assert_eq!(records, vec!["keep1", "keep2"]);
    }
}
