//! Tickwire Protocol
//!
//! Wire types shared by client and server. Every message is a JSON object
//! carried in one transport frame:
//!
//! ```text
//! [length: u32 BE][JSON Request | JSON Response]
//! ```
//!
//! The outer [`Request`]/[`Response`] is always readable: it carries the
//! correlation `id`, the method name and the claimed client identity so the
//! server can route and look up the session before touching the body. The
//! [`Body`] is either plain JSON (handshake, ping), a [`SealedBody`]
//! produced by the channel codec, or a generic rejection.
//!
//! # Invariants
//!
//! - Every request id is unique per connection; responses echo it
//! - A sealed body repeats the id and method inside the authenticated
//!   payload ([`CallRequest`], [`CallResponse`]), so an attacker cannot
//!   graft a valid body onto a different request
//! - Byte fields are hex strings on the wire

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod errors;
mod message;
pub mod payloads;

pub use envelope::{SealedBody, SecureEnvelope, SignedMessage, signed_bytes, timestamped_bytes};
pub use errors::{ProtocolError, Result, fixed_bytes};
pub use message::{Body, CallRequest, CallResponse, Method, Request, Response};

/// ALPN identifier negotiated by the QUIC transport.
pub const ALPN_PROTOCOL: &[u8] = b"tickwire";

/// Length of the frame prefix in bytes.
pub const FRAME_PREFIX_SIZE: usize = 4;

/// Largest frame body accepted from a peer (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default discovery topic announced by servers.
pub const DEFAULT_TOPIC: &str = "global-discovery-v1";

/// Prefix `body` with its big-endian `u32` length.
///
/// # Errors
///
/// - `FrameTooLarge` if `body` exceeds [`MAX_FRAME_SIZE`]
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: body.len(), max: MAX_FRAME_SIZE });
    }

    let mut frame = Vec::with_capacity(FRAME_PREFIX_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Parse a frame length prefix.
///
/// # Errors
///
/// - `FrameTooLarge` if the announced length exceeds [`MAX_FRAME_SIZE`]
pub fn decode_frame_len(prefix: [u8; FRAME_PREFIX_SIZE]) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
    }
    Ok(len)
}

/// Split one complete frame off the front of `buf`.
///
/// Returns the frame body and the remaining bytes.
///
/// # Errors
///
/// - `FrameTruncated` if `buf` is shorter than the prefix or the announced
///   body
/// - `FrameTooLarge` if the announced length exceeds [`MAX_FRAME_SIZE`]
pub fn decode_frame(buf: &[u8]) -> Result<(&[u8], &[u8])> {
    let Some((prefix, rest)) = buf.split_first_chunk::<FRAME_PREFIX_SIZE>() else {
        return Err(ProtocolError::FrameTruncated { expected: FRAME_PREFIX_SIZE, actual: buf.len() });
    };

    let len = decode_frame_len(*prefix)?;
    if rest.len() < len {
        return Err(ProtocolError::FrameTruncated { expected: len, actual: rest.len() });
    }

    Ok(rest.split_at(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_prefix_roundtrip() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 5]);
        let len = decode_frame_len([frame[0], frame[1], frame[2], frame[3]]).unwrap();
        assert_eq!(&frame[4..4 + len], b"hello");
    }

    #[test]
    fn decode_frame_splits_remainder() {
        let mut buf = encode_frame(b"one").unwrap();
        buf.extend_from_slice(&encode_frame(b"two").unwrap());

        let (first, rest) = decode_frame(&buf).unwrap();
        assert_eq!(first, b"one");
        let (second, rest) = decode_frame(rest).unwrap();
        assert_eq!(second, b"two");
        assert!(rest.is_empty());
    }

    #[test]
    fn truncated_frame_rejected() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(
            decode_frame(&frame[..6]),
            Err(ProtocolError::FrameTruncated { expected: 5, actual: 2 })
        );
        assert_eq!(
            decode_frame(&frame[..2]),
            Err(ProtocolError::FrameTruncated { expected: 4, actual: 2 })
        );
    }

    #[test]
    fn oversized_prefix_rejected() {
        let prefix = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        assert!(matches!(decode_frame_len(prefix), Err(ProtocolError::FrameTooLarge { .. })));
    }
}
