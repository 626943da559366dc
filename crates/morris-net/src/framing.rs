//! Length-prefixed frames over a byte stream.
//!
//! ```text
//! +-------------------+--------------------+
//! | length (4 bytes)  |   payload          |
//! | u32 little-endian |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! The length counts payload bytes only. Frames above the configured maximum
//! are refused in both directions; a reader that sees one cannot resync and
//! should drop the connection.

use std::io::ErrorKind;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Default cap on a single payload. Game messages are a few dozen bytes; the
/// largest is a player-pool broadcast.
pub const DEFAULT_MAX_PAYLOAD: u32 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload accepted or sent, in bytes.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: u64, max: u32 },

    /// The peer closed the stream, either between frames or inside one.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn eof_as_closed(e: std::io::Error) -> FrameError {
    if e.kind() == ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read one frame and return its payload.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(eof_as_closed)?;

    let len = u32::from_le_bytes(len_buf);
    if len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: u64::from(len),
            max: config.max_payload_size,
        });
    }

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;
    }
    Ok(payload)
}

/// Write `payload` as one frame and flush.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= config.max_payload_size)
        .ok_or(FrameError::PayloadTooLarge {
            size: payload.len() as u64,
            max: config.max_payload_size,
        })?;

    writer.write_all(&len.to_le_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frames_arrive_in_order_and_unmerged() {
        let (mut client, mut server) = duplex(4096);
        let config = FrameConfig::default();

        for msg in [&b"ping"[..], b"place 0 0", b""] {
            write_frame(&mut client, msg, &config).await.unwrap();
        }
        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"ping");
        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"place 0 0");
        assert!(read_frame(&mut server, &config).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_frame_split_across_small_buffer() {
        let (mut client, mut server) = duplex(5);
        let config = FrameConfig::default();
        let payload = vec![7u8; 300];

        let expected = payload.clone();
        let writer_config = config.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut client, &payload, &writer_config).await.unwrap();
        });

        let received = read_frame(&mut server, &config).await.unwrap();
        writer.await.unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_rejected() {
        let (mut client, mut server) = duplex(64);
        let config = FrameConfig {
            max_payload_size: 32,
        };

        client.write_all(&33u32.to_le_bytes()).await.unwrap();
        let result = read_frame(&mut server, &config).await;
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 33, max: 32 })
        ));
    }

    #[tokio::test]
    async fn test_oversized_write_rejected_before_sending() {
        let (mut client, mut server) = duplex(4096);
        let config = FrameConfig {
            max_payload_size: 8,
        };

        let result = write_frame(&mut client, &[1u8; 9], &config).await;
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));

        // Nothing reached the wire.
        drop(client);
        let result = read_frame(&mut server, &config).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_close_inside_payload_is_connection_closed() {
        let (mut client, mut server) = duplex(64);
        let config = FrameConfig::default();

        client.write_all(&10u32.to_le_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let result = read_frame(&mut server, &config).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_length_prefix_is_little_endian() {
        let (mut client, mut server) = duplex(64);
        let config = FrameConfig::default();

        write_frame(&mut client, b"mill", &config).await.unwrap();
        let mut raw = [0u8; 8];
        server.read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw[..4], &[4, 0, 0, 0]);
        assert_eq!(&raw[4..], b"mill");
    }
}
