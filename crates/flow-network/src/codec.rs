//! Frame codec.
//!
//! Wire format, all integers big-endian:
//!
//! ```text
//! +----------+----------+----------+----------+
//! |  Magic   |   Type   |  Length  | Checksum |
//! | 4 bytes  | 1 byte   | 4 bytes  | 4 bytes  |
//! +----------+----------+----------+----------+
//! |                 Payload                   |
//! |              (Length bytes)               |
//! +-------------------------------------------+
//! ```
//!
//! - Magic: network identifier
//! - Type: message type id
//! - Length: payload length in bytes
//! - Checksum: first 4 bytes of Blake2b-256 over the payload
//!
//! Decoding is incremental: with fewer bytes than a full frame the
//! decoder returns `None` and waits for more input.

use crate::{Message, NetworkError};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use bytes::{Buf, BufMut, BytesMut};
use flow_types::NetworkId;
use tokio_util::codec::{Decoder, Encoder};

/// Frame header size: magic (4) + type (1) + length (4) + checksum (4).
const HEADER_SIZE: usize = 13;

/// Maximum payload size accepted from a peer.
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Message codec for the P2P protocol.
pub struct MessageCodec {
    magic: [u8; 4],
    max_size: usize,
}

impl MessageCodec {
    /// Create a codec for the given network.
    pub fn new(network_id: NetworkId) -> Self {
        MessageCodec {
            magic: Self::magic_of(network_id),
            max_size: MAX_MESSAGE_SIZE,
        }
    }

    fn magic_of(network_id: NetworkId) -> [u8; 4] {
        match network_id {
            NetworkId::Mainnet => *b"FLW0",
            NetworkId::Testnet => *b"FLW1",
            NetworkId::Devnet => *b"FLW2",
        }
    }

    fn checksum(payload: &[u8]) -> [u8; 4] {
        let digest = Blake2b::<U32>::digest(payload);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&digest[0..4]);
        checksum
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, NetworkError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        if src[0..4] != self.magic {
            return Err(NetworkError::InvalidMessage(format!(
                "Bad magic: {:02x?}",
                &src[0..4]
            )));
        }
        let type_id = src[4];
        let length = u32::from_be_bytes([src[5], src[6], src[7], src[8]]) as usize;
        let checksum = [src[9], src[10], src[11], src[12]];

        if length > self.max_size {
            return Err(NetworkError::MessageTooLarge {
                size: length,
                max: self.max_size,
            });
        }

        let total = HEADER_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(length);

        if Self::checksum(&payload) != checksum {
            return Err(NetworkError::ChecksumMismatch);
        }

        Message::decode_payload(type_id, &payload).map(Some)
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = NetworkError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), NetworkError> {
        let payload = message.encode_payload();
        if payload.len() > self.max_size {
            return Err(NetworkError::MessageTooLarge {
                size: payload.len(),
                max: self.max_size,
            });
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_slice(&self.magic);
        dst.put_u8(message.type_id());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&Self::checksum(&payload));
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_types::Hash;

    fn codec() -> MessageCodec {
        MessageCodec::new(NetworkId::Devnet)
    }

    #[test]
    fn test_roundtrip() {
        let mut c = codec();
        let message = Message::Hello {
            node_id: Hash::hash(b"node"),
        };

        let mut buf = BytesMut::new();
        c.encode(message.clone(), &mut buf).unwrap();
        let decoded = c.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, message);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut c = codec();
        let mut buf = BytesMut::new();
        c.encode(Message::Pong { nonce: 5 }, &mut buf).unwrap();

        // Feed one byte at a time; only the last byte completes a frame.
        let full = buf.split().freeze();
        let mut partial = BytesMut::new();
        for (i, byte) in full.iter().enumerate() {
            partial.put_u8(*byte);
            let result = c.decode(&mut partial).unwrap();
            if i + 1 < full.len() {
                assert!(result.is_none());
            } else {
                assert_eq!(result, Some(Message::Pong { nonce: 5 }));
            }
        }
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut c = codec();
        let mut buf = BytesMut::new();
        c.encode(Message::Pong { nonce: 1 }, &mut buf).unwrap();
        c.encode(Message::Pong { nonce: 2 }, &mut buf).unwrap();

        assert_eq!(c.decode(&mut buf).unwrap(), Some(Message::Pong { nonce: 1 }));
        assert_eq!(c.decode(&mut buf).unwrap(), Some(Message::Pong { nonce: 2 }));
        assert_eq!(c.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let mut c = codec();
        let mut buf = BytesMut::new();
        c.encode(Message::Pong { nonce: 1 }, &mut buf).unwrap();
        buf[0] ^= 0xff;
        assert!(matches!(
            c.decode(&mut buf),
            Err(NetworkError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_corrupt_payload_rejected() {
        let mut c = codec();
        let mut buf = BytesMut::new();
        c.encode(
            Message::Hello {
                node_id: Hash::hash(b"node"),
            },
            &mut buf,
        )
        .unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xff;
        assert_eq!(c.decode(&mut buf), Err(NetworkError::ChecksumMismatch));
    }
}
