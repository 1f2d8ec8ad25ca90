//! Stream reassembly of length-prefixed frames, and the bridge from a byte
//! stream to [`Connection`] channels.

use bytes::{Buf, Bytes, BytesMut};
use tickwire_proto::{FRAME_PREFIX_SIZE, ProtocolError, decode_frame, encode_frame};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

use crate::{
    error::TransportError,
    transport::{CHANNEL_CAPACITY, CloseHandle, Connection},
};

const READ_CHUNK: usize = 16 * 1024;

/// Accumulates stream chunks and yields complete frame bodies.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
}

impl FrameReader {
    /// Empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete frame body, or `None` if more bytes are needed.
    ///
    /// # Errors
    ///
    /// - `FrameTooLarge` if the peer announces an oversized frame; the
    ///   stream cannot be resynchronized after this
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let len = match decode_frame(&self.buf) {
            Ok((body, _)) => body.len(),
            Err(ProtocolError::FrameTruncated { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        self.buf.advance(FRAME_PREFIX_SIZE);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// Bytes buffered but not yet returned.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Wrap a byte stream pair as a [`Connection`].
///
/// Spawns one task that reads frames into the receiver and writes frames
/// from the sender. The task ends when either side closes or the peer sends
/// an oversized frame; the connection's close handle aborts it.
pub fn stream_connection<R, W>(reader: R, writer: W, peer: impl Into<String>) -> Connection
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let peer = peer.into();

    let task_peer = peer.clone();
    let task = tokio::spawn(async move {
        tokio::select! {
            result = read_frames(reader, inbound_tx) => {
                if let Err(e) = result {
                    tracing::debug!(peer = %task_peer, error = %e, "read side closed");
                }
            },
            result = write_frames(writer, outbound_rx) => {
                if let Err(e) = result {
                    tracing::debug!(peer = %task_peer, error = %e, "write side closed");
                }
            },
        }
    });

    Connection {
        sender: outbound_tx,
        receiver: inbound_rx,
        peer,
        closer: CloseHandle::new(task.abort_handle()),
    }
}

async fn read_frames<R: AsyncRead + Unpin>(
    mut reader: R,
    frames: mpsc::Sender<Bytes>,
) -> Result<(), TransportError> {
    let mut framer = FrameReader::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await.map_err(|e| TransportError::Stream(e.to_string()))?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        framer.extend(&chunk[..n]);

        while let Some(frame) =
            framer.next_frame().map_err(|e| TransportError::Stream(e.to_string()))?
        {
            frames.send(frame).await.map_err(|_| TransportError::Closed)?;
        }
    }
}

async fn write_frames<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut frames: mpsc::Receiver<Bytes>,
) -> Result<(), TransportError> {
    while let Some(body) = frames.recv().await {
        let frame = encode_frame(&body).map_err(|e| TransportError::Stream(e.to_string()))?;
        writer.write_all(&frame).await.map_err(|e| TransportError::Stream(e.to_string()))?;
        writer.flush().await.map_err(|e| TransportError::Stream(e.to_string()))?;
    }
    writer.shutdown().await.map_err(|e| TransportError::Stream(e.to_string()))?;
    Err(TransportError::Closed)
}


#[cfg(test)]
mod stream_tests {
    use bytes::Bytes;

    use super::stream_connection;

    #[tokio::test]
    async fn frames_cross_a_duplex_stream() {
        let (left, right) = tokio::io::duplex(64);
        let (left_read, left_write) = tokio::io::split(left);
        let (right_read, right_write) = tokio::io::split(right);

        let a = stream_connection(left_read, left_write, "right");
        let mut b = stream_connection(right_read, right_write, "left");

        // Larger than the duplex buffer, so it arrives in pieces
        let big = Bytes::from(vec![7u8; 1000]);
        a.sender.send(Bytes::from_static(b"hello")).await.unwrap();
        a.sender.send(big.clone()).await.unwrap();

        assert_eq!(b.receiver.recv().await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(b.receiver.recv().await.unwrap(), big);
    }

    #[tokio::test]
    async fn closing_one_side_ends_the_other() {
        let (left, right) = tokio::io::duplex(64);
        let (left_read, left_write) = tokio::io::split(left);
        let (right_read, right_write) = tokio::io::split(right);

        let a = stream_connection(left_read, left_write, "right");
        let mut b = stream_connection(right_read, right_write, "left");

        drop(a);
        assert!(b.receiver.recv().await.is_none());
    }
}
