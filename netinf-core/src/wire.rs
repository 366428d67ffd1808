//! Peer message framing: a little-endian `u32` body length, then the bincode body.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::Message;

pub const HEADER_LEN: usize = 4;
/// Largest body accepted in either direction.
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame body of {0} bytes exceeds the {MAX_BODY_LEN} byte limit")]
    Oversized(usize),
    #[error("bincode: {0}")]
    Codec(#[from] bincode::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

fn checked_len(len: usize) -> Result<usize, FrameError> {
    if len > MAX_BODY_LEN {
        Err(FrameError::Oversized(len))
    } else {
        Ok(len)
    }
}

pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameError> {
    let len = checked_len(bincode::serialized_size(msg)? as usize)?;
    let mut out = Vec::with_capacity(HEADER_LEN + len);
    out.extend_from_slice(&(len as u32).to_le_bytes());
    bincode::serialize_into(&mut out, msg)?;
    Ok(out)
}

/// Split one message off the front of `buf`, returning it with the bytes consumed.
/// `Ok(None)` until the whole frame is buffered.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Message, usize)>, FrameError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let len = checked_len(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize)?;
    let end = HEADER_LEN + len;
    match buf.get(HEADER_LEN..end) {
        Some(body) => Ok(Some((bincode::deserialize(body)?, end))),
        None => Ok(None),
    }
}

pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(msg)?).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message. `Ok(None)` when the stream closes between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Message>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    if let Err(e) = reader.read_exact(&mut header).await {
        return match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Ok(None),
            _ => Err(e.into()),
        };
    }
    let mut body = vec![0u8; checked_len(u32::from_le_bytes(header) as usize)?];
    reader.read_exact(&mut body).await?;
    Ok(Some(bincode::deserialize(&body)?))
}
