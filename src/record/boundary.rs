//! Boundary locator.
//!
//! Dumps carry free-form headers and footers around the data. The payload is
//! defined as the bytes strictly between an optional start anchor and an
//! optional end anchor. Anchors are found by a bounded-memory scan: the
//! source is read in fixed windows and only `anchor.len() - 1` trailing bytes
//! are carried from one window to the next, so an anchor split across two
//! windows is still found.

use crate::error::{AnchorKind, Error, Result};
use memchr::memmem;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// Byte range of the payload within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    /// Offset of the first payload byte.
    pub start: u64,
    /// Offset one past the last payload byte.
    pub end: u64,
}

impl Boundary {
    /// Payload length in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Locates the payload between `start_anchor` and `end_anchor`.
///
/// A missing start anchor means offset 0, a missing end anchor means end of
/// stream. The end anchor is searched for only after the start of the payload.
/// Leaves the reader at an unspecified position.
///
/// # Errors
///
/// - `BoundaryNotFound` if a configured anchor never occurs
/// - `InvalidConfiguration` if an anchor is empty, or if anchors are
///   configured but enclose no payload
pub fn locate<R: Read + Seek>(
    reader: &mut R,
    start_anchor: Option<&[u8]>,
    end_anchor: Option<&[u8]>,
    window: usize,
) -> Result<Boundary> {
    if window == 0 {
        return Err(Error::invalid_configuration("scan window must be > 0"));
    }

    let start = match start_anchor {
        Some(anchor) => {
            let pos = find_anchor(reader, anchor, 0, window, AnchorKind::Start)?;
            pos + anchor.len() as u64
        }
        None => 0,
    };

    let end = match end_anchor {
        Some(anchor) => find_anchor(reader, anchor, start, window, AnchorKind::End)?,
        None => reader.seek(SeekFrom::End(0))?,
    };

    let anchored = start_anchor.is_some() || end_anchor.is_some();
    if anchored && start >= end {
        return Err(Error::invalid_configuration(format!(
            "anchors enclose no payload (start {} >= end {})",
            start, end
        )));
    }

    log::debug!("Located payload [{}, {}) ({} bytes)", start, end, end.saturating_sub(start));
    Ok(Boundary { start, end })
}

/// Returns the offset of the first occurrence of `anchor` at or after `from`.
fn find_anchor<R: Read + Seek>(
    reader: &mut R,
    anchor: &[u8],
    from: u64,
    window: usize,
    kind: AnchorKind,
) -> Result<u64> {
    if anchor.is_empty() {
        return Err(Error::invalid_configuration(format!("{} anchor must not be empty", kind)));
    }

    reader.seek(SeekFrom::Start(from))?;

    let finder = memmem::Finder::new(anchor);
    let overlap = anchor.len() - 1;
    let mut buffer: Vec<u8> = Vec::with_capacity(window + overlap);
    let mut chunk = vec![0u8; window];
    // Offset of buffer[0] within the source
    let mut base = from;

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        };
        buffer.extend_from_slice(&chunk[..n]);

        if let Some(pos) = finder.find(&buffer) {
            return Ok(base + pos as u64);
        }

        let keep = overlap.min(buffer.len());
        let consumed = buffer.len() - keep;
        buffer.drain(..consumed);
        base += consumed as u64;
    }

    Err(Error::BoundaryNotFound {
        anchor: kind,
        preview: String::from_utf8_lossy(anchor).into_owned(),
        searched_from: from,
    })
}
