//! Length-prefixed framing over reliable streams
//!
//! Format: `[4 bytes little-endian length][bincode payload]`.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::constants::net::MAX_MESSAGE_SIZE;
use crate::net::protocol::{decode, encode, ClientMessage, DecodeError, EncodeError, ServerMessage};

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

fn closed_on_eof(e: io::Error) -> FramingError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FramingError::ConnectionClosed
    } else {
        FramingError::Io(e)
    }
}

pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(closed_on_eof)?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }
    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(closed_on_eof)?;
    Ok(buf)
}

pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    data: &[u8],
) -> Result<(), FramingError> {
    let framed = frame(data)?;
    stream.write_all(&framed).await?;
    stream.flush().await?;
    Ok(())
}

/// Prefix `data` with its length so a broadcast can reuse one buffer for
/// every observer
pub fn frame(data: &[u8]) -> Result<Vec<u8>, FramingError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(data.len(), MAX_MESSAGE_SIZE));
    }
    let mut out = Vec::with_capacity(4 + data.len());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    Ok(out)
}

/// Encode and frame a server message
pub fn frame_server_message(message: &ServerMessage) -> Result<Vec<u8>, FramingError> {
    frame(&encode(message)?)
}

pub async fn read_client_message<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<ClientMessage, FramingError> {
    let data = read_message(stream).await?;
    Ok(decode(&data)?)
}

pub async fn write_server_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    message: &ServerMessage,
) -> Result<(), FramingError> {
    write_message(stream, &encode(message)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_write_message() {
        let (mut client, mut server) = duplex(1024);
        write_message(&mut client, b"hello").await.unwrap();
        assert_eq!(read_message(&mut server).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_empty_message() {
        let (mut client, mut server) = duplex(64);
        write_message(&mut client, &[]).await.unwrap();
        assert!(read_message(&mut server).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut client, mut server) = duplex(64);
        let len = (MAX_MESSAGE_SIZE as u32 + 1).to_le_bytes();
        client.write_all(&len).await.unwrap();
        assert!(matches!(
            read_message(&mut server).await,
            Err(FramingError::MessageTooLarge(_, MAX_MESSAGE_SIZE))
        ));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_closed() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&10u32.to_le_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);
        assert!(matches!(
            read_message(&mut server).await,
            Err(FramingError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_client_message_over_stream() {
        let (mut client, mut server) = duplex(1024);
        let msg = ClientMessage::Move { x: 10.5, y: -2.0 };
        write_message(&mut client, &encode(&msg).unwrap()).await.unwrap();
        write_message(&mut client, &encode(&ClientMessage::Split).unwrap())
            .await
            .unwrap();

        assert_eq!(read_client_message(&mut server).await.unwrap(), msg);
        assert_eq!(read_client_message(&mut server).await.unwrap(), ClientMessage::Split);
    }

    #[tokio::test]
    async fn test_server_message_frame_matches_stream() {
        let msg = ServerMessage::Pong {
            client_time: 1,
            server_time: 2,
        };
        let framed = frame_server_message(&msg).unwrap();
        let (mut client, mut server) = duplex(1024);
        write_server_message(&mut client, &msg).await.unwrap();
        let mut raw = vec![0u8; framed.len()];
        server.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw, framed);
    }

    #[tokio::test]
    async fn test_read_split_across_reads() {
        let frame = frame(&encode(&ClientMessage::Eject).unwrap()).unwrap();
        let (head, tail) = frame.split_at(3);
        let mut mock = tokio_test::io::Builder::new().read(head).read(tail).build();
        assert_eq!(read_client_message(&mut mock).await.unwrap(), ClientMessage::Eject);
    }

    #[test]
    fn test_frame_too_large() {
        let data = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(frame(&data), Err(FramingError::MessageTooLarge(..))));
    }
}
