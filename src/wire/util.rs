/*!
 * @file wire/util.rs
 * @brief Shared helpers for reading/writing wire-protocol primitives
 */

use crate::error::{MockError, Result};
use std::io::Read;
use std::sync::atomic::{AtomicI32, Ordering};

static REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// Hands out the next server-assigned, monotonically increasing request id.
pub fn next_request_id() -> i32 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Wraps a synchronous reader (typically a `std::io::Cursor` over an
/// already-buffered message body) and counts the bytes pulled through it, so
/// callers know how much of a body a `bson::Document` decode consumed.
pub struct CountReader<R> {
    inner: R,
    bytes_read: usize,
}

impl<R: Read> CountReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }
}

impl<R: Read> Read for CountReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n;
        Ok(n)
    }
}

/// Reads a NUL-terminated UTF-8 string from `cursor`, advancing it past the terminator.
pub fn read_cstring(cursor: &mut std::io::Cursor<&[u8]>) -> Result<String> {
    let buf = cursor.get_ref();
    let start = cursor.position() as usize;
    let nul = buf[start..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| MockError::Decode("unterminated cstring".to_string()))?;
    let s = std::str::from_utf8(&buf[start..start + nul])
        .map_err(|e| MockError::Decode(format!("invalid utf8 in cstring: {e}")))?
        .to_string();
    cursor.set_position((start + nul + 1) as u64);
    Ok(s)
}

/// Decodes one BSON document starting at the cursor's current position and
/// advances the cursor past it.
pub fn read_document(cursor: &mut std::io::Cursor<&[u8]>) -> Result<bson::Document> {
    let start = cursor.position();
    let remaining = &cursor.get_ref()[start as usize..];
    let mut counted = CountReader::new(remaining);
    let doc = bson::Document::from_reader(&mut counted)?;
    cursor.set_position(start + counted.bytes_read() as u64);
    Ok(doc)
}
