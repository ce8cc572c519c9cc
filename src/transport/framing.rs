use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, RpcError};

/// Largest payload a single frame may carry.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Cap on the receive buffer; exceeding it fails the session.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;
const READ_CHUNK: usize = 8 * 1024;

/// Incremental decoder for `[4-byte big-endian length][payload]` frames.
///
/// Buffers reads until a whole frame is available and yields one payload
/// per call to [`next`](FrameReader::next), regardless of how the bytes
/// were split across reads. End-of-stream on a frame boundary yields
/// `Ok(None)`; end-of-stream mid-frame is an error.
pub struct FrameReader<R> {
    reader: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Returns the next payload, or `None` once the peer has closed the
    /// stream cleanly.
    pub async fn next(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            // Bound on total buffered bytes, checked before any parsing
            // so it holds even when the front of the buffer is a
            // complete frame (a burst read of pipelined frames).
            if self.buf.len() > MAX_BUFFER_SIZE {
                return Err(RpcError::BufferOverflow {
                    size: self.buf.len(),
                    max: MAX_BUFFER_SIZE,
                });
            }

            if self.buf.len() >= HEADER_LEN {
                let mut header = [0u8; HEADER_LEN];
                header.copy_from_slice(&self.buf[..HEADER_LEN]);
                let len = u32::from_be_bytes(header) as usize;

                if len > MAX_MESSAGE_SIZE {
                    return Err(RpcError::InvalidLength {
                        len,
                        max: MAX_MESSAGE_SIZE,
                    });
                }

                if self.buf.len() >= HEADER_LEN + len {
                    self.buf.advance(HEADER_LEN);
                    let payload = self.buf.split_to(len).to_vec();
                    return Ok(Some(payload));
                }
            }

            self.buf.reserve(READ_CHUNK);
            let read = self.reader.read_buf(&mut self.buf).await?;
            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(RpcError::IncompleteMessage {
                    buffered: self.buf.len(),
                });
            }
        }
    }
}

/// Frames `payload` and emits it as a single write.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(RpcError::InvalidLength {
            len: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
