//! # flow-network
//!
//! P2P wire protocol for the blockflow node.
//!
//! This crate provides:
//! - The message set (`Hello`/`HelloAck`, `Ping`/`Pong`, block and
//!   header exchange)
//! - Length-prefixed framing with checksums, decoded incrementally
//! - Ping/pong liveness tracking
//! - Filtering of messages for chains this broker does not service
//!
//! The transport itself (sockets, connect/accept, backoff) is wired by
//! the node; this crate only defines what travels and how it frames.

mod codec;
mod error;
mod message;
mod peer;

pub use codec::{MessageCodec, MAX_MESSAGE_SIZE};
pub use error::{NetworkError, NetworkResult};
pub use message::Message;
pub use peer::{serviced_message, PingTracker};
