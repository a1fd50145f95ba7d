//! Length-prefixed framing over a byte stream.

use std::io;

use catbattle_shared::{ClientMessage, ServerMessage, MAX_FRAME_SIZE};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_SIZE} byte limit")]
    TooLarge(usize),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Read one frame. Returns `None` when the peer closed the stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn send_server_message<W>(writer: &mut W, msg: &ServerMessage) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &msg.serialize()?).await
}

/// Client side helpers, used by tests and tooling that talk to the server.
pub async fn send_client_message<W>(writer: &mut W, msg: &ClientMessage) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &msg.serialize()?).await
}

pub async fn recv_server_message<R>(reader: &mut R) -> Result<Option<ServerMessage>, FrameError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some(frame) => Ok(Some(ServerMessage::deserialize(&frame)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frames_keep_boundaries() {
        let (mut a, mut b) = duplex(1024);
        write_frame(&mut a, b"first").await.unwrap();
        write_frame(&mut a, b"").await.unwrap();
        write_frame(&mut a, b"third").await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap().as_deref(), Some(&b"first"[..]));
        assert_eq!(read_frame(&mut b).await.unwrap().as_deref(), Some(&b""[..]));
        assert_eq!(read_frame(&mut b).await.unwrap().as_deref(), Some(&b"third"[..]));
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_header_is_rejected() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes()).await.unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge(len) if len == MAX_FRAME_SIZE + 1));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_an_error() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&10u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        assert!(matches!(read_frame(&mut b).await, Err(FrameError::Io(_))));
    }
}
