/*!
 * @file wire/frame.rs
 * @brief Length-prefixed message framing over an async byte stream
 */

use crate::error::{MockError, Result};
use crate::wire::header::{Header, HEADER_LENGTH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A fully-read wire message: header plus the raw bytes that followed it.
pub struct RawMessage {
    pub header: Header,
    pub body: Vec<u8>,
}

/// Reads one complete, length-prefixed message from `stream`. Returns `Ok(None)`
/// on a clean EOF before any bytes were read (the common "peer disconnected"
/// case); any other truncation is a decode error.
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Option<RawMessage>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let length = i32::from_le_bytes(len_buf);
    if length < HEADER_LENGTH {
        return Err(MockError::Decode(format!(
            "message length {length} is shorter than the header"
        )));
    }

    let mut rest = vec![0u8; (length - 4) as usize];
    stream.read_exact(&mut rest).await?;

    let mut full = Vec::with_capacity(length as usize);
    full.extend_from_slice(&len_buf);
    full.extend_from_slice(&rest);

    let mut cursor = std::io::Cursor::new(&full[..]);
    let header = Header::read_from(&mut cursor).await?;
    let body = full[HEADER_LENGTH as usize..].to_vec();

    Ok(Some(RawMessage { header, body }))
}

/// Writes a complete message (header + body) to `stream`.
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    header: &Header,
    body: &[u8],
) -> Result<()> {
    header.write_to(stream).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    Ok(())
}
