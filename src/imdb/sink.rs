//! Persistence boundary.
//!
//! The join hands composite records to a `RecordSink` in batches. The sink
//! decides what storage receives them; this crate ships a JSON lines sink and
//! an in-memory sink (`Vec<T>`).

use crate::error::{Error, Result};
use serde::Serialize;
use std::io::Write;

/// Receives committed batches of records.
pub trait RecordSink<T> {
    /// Stores one batch. An error aborts the import.
    fn commit(&mut self, batch: Vec<T>) -> Result<()>;
}

impl<T, S: RecordSink<T> + ?Sized> RecordSink<T> for &mut S {
    fn commit(&mut self, batch: Vec<T>) -> Result<()> {
        (**self).commit(batch)
    }
}

impl<T> RecordSink<T> for Vec<T> {
    fn commit(&mut self, batch: Vec<T>) -> Result<()> {
        self.extend(batch);
        Ok(())
    }
}

/// Buffers records and commits them to a sink in fixed-size batches.
pub struct BatchWriter<T, S: RecordSink<T>> {
    sink: S,
    pending: Vec<T>,
    batch_size: usize,
    committed: u64,
}

impl<T, S: RecordSink<T>> BatchWriter<T, S> {
    /// Creates a writer that commits every `batch_size` records.
    pub fn new(sink: S, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::invalid_configuration("batch size must be > 0"));
        }
        Ok(Self { sink, pending: Vec::with_capacity(batch_size), batch_size, committed: 0 })
    }

    /// Buffers a record, committing once the batch is full.
    pub fn push(&mut self, record: T) -> Result<()> {
        self.pending.push(record);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Commits the buffered records, if any.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let len = batch.len() as u64;
        self.sink.commit(batch)?;
        self.committed += len;
        log::debug!("Committed batch of {} records ({} total)", len, self.committed);
        Ok(())
    }

    /// Records committed so far.
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Records buffered but not yet committed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Commits the remaining records and returns the total committed.
    pub fn finish(mut self) -> Result<u64> {
        self.flush()?;
        Ok(self.committed)
    }
}

impl<T, S: RecordSink<T>> Drop for BatchWriter<T, S> {
    fn drop(&mut self) {
        // Only finish() commits
        if !self.pending.is_empty() {
            log::warn!("Discarding {} uncommitted records", self.pending.len());
        }
    }
}

/// Writes each record as one JSON document per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    /// Creates a sink writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Documents written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<T: Serialize, W: Write> RecordSink<T> for JsonLinesSink<W> {
    fn commit(&mut self, batch: Vec<T>) -> Result<()> {
        for record in &batch {
            serde_json::to_writer(&mut self.writer, record)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        self.written += batch.len() as u64;
        Ok(())
    }
}
