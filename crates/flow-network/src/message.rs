//! P2P protocol messages.

use crate::{NetworkError, NetworkResult};
use flow_types::{Block, BlockHeader, Decode, Encode, Hash, Reader};

/// A wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Handshake opener; each side sends one.
    Hello {
        /// Sender's node id.
        node_id: Hash,
    },
    /// Handshake acknowledgement.
    HelloAck {
        /// Sender's node id.
        node_id: Hash,
    },
    /// Periodic liveness probe.
    Ping {
        /// Random nonce echoed by the pong.
        nonce: i32,
        /// Sender's clock, milliseconds.
        timestamp_ms: i64,
    },
    /// Liveness reply.
    Pong {
        /// Echoed ping nonce.
        nonce: i32,
    },
    /// Full blocks pushed to a peer.
    SendBlocks(Vec<Block>),
    /// Request for blocks after the locators.
    GetBlocks {
        /// Per-chain locators.
        locators: Vec<Hash>,
    },
    /// Headers pushed to a peer.
    SendHeaders(Vec<BlockHeader>),
    /// Request for headers after the locators.
    GetHeaders {
        /// Per-chain locators.
        locators: Vec<Hash>,
    },
}

impl Message {
    /// Wire type id of this message.
    pub fn type_id(&self) -> u8 {
        match self {
            Message::Hello { .. } => 0,
            Message::HelloAck { .. } => 1,
            Message::Ping { .. } => 2,
            Message::Pong { .. } => 3,
            Message::SendBlocks(_) => 4,
            Message::GetBlocks { .. } => 5,
            Message::SendHeaders(_) => 6,
            Message::GetHeaders { .. } => 7,
        }
    }

    /// Encode the payload (everything after the type byte).
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Message::Hello { node_id } | Message::HelloAck { node_id } => {
                node_id.encode(&mut buf);
            }
            Message::Ping {
                nonce,
                timestamp_ms,
            } => {
                (*nonce as u32).encode(&mut buf);
                (*timestamp_ms as u64).encode(&mut buf);
            }
            Message::Pong { nonce } => {
                (*nonce as u32).encode(&mut buf);
            }
            Message::SendBlocks(blocks) => blocks.encode(&mut buf),
            Message::GetBlocks { locators } | Message::GetHeaders { locators } => {
                locators.encode(&mut buf);
            }
            Message::SendHeaders(headers) => headers.encode(&mut buf),
        }
        buf
    }

    /// Decode a payload for the given type id.
    pub fn decode_payload(type_id: u8, payload: &[u8]) -> NetworkResult<Self> {
        let mut reader = Reader::new(payload);
        let message = match type_id {
            0 => Message::Hello {
                node_id: Hash::decode(&mut reader).map_err(bad)?,
            },
            1 => Message::HelloAck {
                node_id: Hash::decode(&mut reader).map_err(bad)?,
            },
            2 => Message::Ping {
                nonce: reader.get_u32().map_err(bad)? as i32,
                timestamp_ms: reader.get_i64().map_err(bad)?,
            },
            3 => Message::Pong {
                nonce: reader.get_u32().map_err(bad)? as i32,
            },
            4 => Message::SendBlocks(Vec::<Block>::decode(&mut reader).map_err(bad)?),
            5 => Message::GetBlocks {
                locators: Vec::<Hash>::decode(&mut reader).map_err(bad)?,
            },
            6 => Message::SendHeaders(Vec::<BlockHeader>::decode(&mut reader).map_err(bad)?),
            7 => Message::GetHeaders {
                locators: Vec::<Hash>::decode(&mut reader).map_err(bad)?,
            },
            other => {
                return Err(NetworkError::InvalidMessage(format!(
                    "Unknown message type: {other}"
                )))
            }
        };
        if !reader.is_empty() {
            return Err(NetworkError::InvalidMessage(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }
        Ok(message)
    }
}

fn bad(e: flow_types::CodecError) -> NetworkError {
    NetworkError::InvalidMessage(e.to_string())
}
