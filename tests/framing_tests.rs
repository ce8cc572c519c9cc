use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use mux_rpc::{write_frame, FrameReader, RpcError, MAX_MESSAGE_SIZE};

/// Reader that hands out one predetermined chunk per read call, so frame
/// splits land at exact byte offsets.
struct ChunkedReader {
    chunks: VecDeque<Vec<u8>>,
}

impl ChunkedReader {
    fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
        }
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(chunk) = self.chunks.pop_front() {
            buf.put_slice(&chunk);
        }
        Poll::Ready(Ok(()))
    }
}

fn framed(payload: &[u8]) -> Vec<u8> {
    let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

#[tokio::test]
async fn roundtrip_through_write_frame() {
    let payload = b"Hello, World!";
    let mut buffer = Vec::new();
    write_frame(&mut buffer, payload).await.unwrap();

    let mut reader = FrameReader::new(&buffer[..]);
    assert_eq!(reader.next().await.unwrap(), Some(payload.to_vec()));
    assert_eq!(reader.next().await.unwrap(), None);
}

#[tokio::test]
async fn multiple_frames_in_sequence() {
    let messages: Vec<&[u8]> = vec![b"first", b"second message", b"third"];
    let mut buffer = Vec::new();
    for message in &messages {
        write_frame(&mut buffer, message).await.unwrap();
    }

    let mut reader = FrameReader::new(&buffer[..]);
    for expected in &messages {
        assert_eq!(reader.next().await.unwrap(), Some(expected.to_vec()));
    }
    assert_eq!(reader.next().await.unwrap(), None);
}

#[tokio::test]
async fn two_frames_in_a_single_read() {
    let mut bytes = framed(b"one");
    bytes.extend(framed(b"two"));

    let mut reader = FrameReader::new(ChunkedReader::new([bytes]));
    assert_eq!(reader.next().await.unwrap(), Some(b"one".to_vec()));
    assert_eq!(reader.next().await.unwrap(), Some(b"two".to_vec()));
    assert_eq!(reader.next().await.unwrap(), None);
}

#[tokio::test]
async fn header_split_at_every_offset() {
    for split in 1..4 {
        let bytes = framed(b"split header");
        let (head, tail) = bytes.split_at(split);
        let mut reader = FrameReader::new(ChunkedReader::new([head.to_vec(), tail.to_vec()]));
        assert_eq!(
            reader.next().await.unwrap(),
            Some(b"split header".to_vec()),
            "split at offset {split}"
        );
    }
}

#[tokio::test]
async fn payload_split_across_reads() {
    let bytes = framed(b"chunked payload bytes");
    let chunks: Vec<Vec<u8>> = bytes.chunks(3).map(<[u8]>::to_vec).collect();
    let mut reader = FrameReader::new(ChunkedReader::new(chunks));
    assert_eq!(
        reader.next().await.unwrap(),
        Some(b"chunked payload bytes".to_vec())
    );
    assert_eq!(reader.next().await.unwrap(), None);
}

#[tokio::test]
async fn empty_payload_frame() {
    let mut reader = FrameReader::new(ChunkedReader::new([framed(b"")]));
    assert_eq!(reader.next().await.unwrap(), Some(Vec::new()));
}

#[tokio::test]
async fn oversize_length_is_rejected() {
    let header = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes().to_vec();
    let mut reader = FrameReader::new(ChunkedReader::new([header]));
    assert!(matches!(
        reader.next().await,
        Err(RpcError::InvalidLength { .. })
    ));
}

#[tokio::test]
async fn eof_mid_frame_is_an_error() {
    let bytes = framed(b"truncated");
    let partial = bytes[..bytes.len() - 2].to_vec();
    let mut reader = FrameReader::new(ChunkedReader::new([partial]));
    assert!(matches!(
        reader.next().await,
        Err(RpcError::IncompleteMessage { .. })
    ));
}

#[tokio::test]
async fn eof_on_frame_boundary_is_clean() {
    let mut reader = FrameReader::new(ChunkedReader::new(Vec::<Vec<u8>>::new()));
    assert_eq!(reader.next().await.unwrap(), None);
}

#[tokio::test]
async fn write_frame_rejects_oversize_payload() {
    let payload = vec![0u8; MAX_MESSAGE_SIZE + 1];
    let mut buffer = Vec::new();
    assert!(matches!(
        write_frame(&mut buffer, &payload).await,
        Err(RpcError::InvalidLength { .. })
    ));
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn max_size_payload_roundtrips() {
    let payload = vec![7u8; MAX_MESSAGE_SIZE];
    let mut buffer = Vec::new();
    write_frame(&mut buffer, &payload).await.unwrap();

    let mut reader = FrameReader::new(&buffer[..]);
    assert_eq!(reader.next().await.unwrap(), Some(payload));
}
