//! Per-connection protocol state.

use crate::{Message, NetworkError, NetworkResult};
use flow_types::{BrokerInfo, ChainIndex};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Ping/pong liveness tracking for one connection.
///
/// One ping is outstanding at a time. A pong must echo the outstanding
/// nonce; an unmatched nonce or a pong that never arrives within the
/// ping frequency closes the connection.
pub struct PingTracker {
    frequency: Duration,
    outstanding: Option<(i32, Instant)>,
    last_pong: Instant,
}

impl PingTracker {
    /// Create a tracker with the configured ping frequency.
    pub fn new(frequency: Duration) -> Self {
        PingTracker {
            frequency,
            outstanding: None,
            last_pong: Instant::now(),
        }
    }

    /// Produce the next ping when one is due; `None` while a ping is
    /// outstanding or the interval has not elapsed.
    pub fn next_ping(&mut self, now: Instant, timestamp_ms: i64) -> Option<Message> {
        if self.outstanding.is_some() {
            return None;
        }
        if now.duration_since(self.last_pong) < self.frequency {
            return None;
        }
        let nonce: i32 = rand::thread_rng().gen();
        self.outstanding = Some((nonce, now));
        debug!(nonce, "Sending ping");
        Some(Message::Ping {
            nonce,
            timestamp_ms,
        })
    }

    /// Register a received pong.
    pub fn on_pong(&mut self, nonce: i32, now: Instant) -> NetworkResult<()> {
        match self.outstanding.take() {
            Some((expected, _)) if expected == nonce => {
                self.last_pong = now;
                Ok(())
            }
            _ => {
                warn!(nonce, "Unmatched pong");
                Err(NetworkError::UnmatchedPong(nonce))
            }
        }
    }

    /// Whether the outstanding ping has gone unanswered too long.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.outstanding {
            Some((_, sent_at)) => now.duration_since(sent_at) > self.frequency,
            None => false,
        }
    }
}

/// Whether every chain index a message carries is serviced by this
/// broker. Unserviced messages are logged and dropped by the caller.
pub fn serviced_message(message: &Message, broker: &BrokerInfo, groups: u32) -> bool {
    let serviced = |index: ChainIndex| index.relates_to(broker);
    match message {
        Message::SendBlocks(blocks) => blocks
            .iter()
            .all(|block| serviced(block.chain_index(groups))),
        Message::SendHeaders(headers) => headers
            .iter()
            .all(|header| serviced(header.chain_index(groups))),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_types::{Block, BlockDeps, BlockHeader, Hash, U256};

    fn tracker() -> PingTracker {
        PingTracker::new(Duration::from_secs(10))
    }

    #[test]
    fn test_ping_pong_cycle() {
        let mut t = tracker();
        let start = Instant::now();

        // Due immediately after the frequency elapses.
        let later = start + Duration::from_secs(11);
        let ping = t.next_ping(later, 0).unwrap();
        let Message::Ping { nonce, .. } = ping else {
            unreachable!();
        };

        // No second ping while one is outstanding.
        assert!(t.next_ping(later, 0).is_none());

        t.on_pong(nonce, later + Duration::from_millis(50)).unwrap();
        assert!(!t.is_expired(later + Duration::from_secs(1)));
    }

    #[test]
    fn test_unmatched_pong_is_fatal() {
        let mut t = tracker();
        let later = Instant::now() + Duration::from_secs(11);
        let Some(Message::Ping { nonce, .. }) = t.next_ping(later, 0) else {
            unreachable!();
        };
        assert!(matches!(
            t.on_pong(nonce.wrapping_add(1), later),
            Err(NetworkError::UnmatchedPong(_))
        ));
    }

    #[test]
    fn test_missing_pong_expires() {
        let mut t = tracker();
        let sent_at = Instant::now() + Duration::from_secs(11);
        t.next_ping(sent_at, 0).unwrap();
        assert!(!t.is_expired(sent_at + Duration::from_secs(5)));
        assert!(t.is_expired(sent_at + Duration::from_secs(11)));
    }

    #[test]
    fn test_serviced_message_filter() {
        // Broker 0 of 2 services groups {0}; find a header landing on a
        // chain it does not service.
        let broker = BrokerInfo::new(0, 2);
        let groups = 2;
        let mut nonce = 0u64;
        let header = loop {
            let header = BlockHeader {
                parent_hash: Hash::ZERO,
                block_deps: BlockDeps::new(vec![]),
                txs_hash: Hash::ZERO,
                timestamp_ms: 0,
                target: U256::max_value(),
                nonce,
            };
            let index = header.chain_index(groups);
            if index.from.value() == 1 && index.to.value() == 1 {
                break header;
            }
            nonce += 1;
        };

        let unserviced = Message::SendHeaders(vec![header.clone()]);
        assert!(!serviced_message(&unserviced, &broker, groups));

        let unserviced_block = Message::SendBlocks(vec![Block {
            header,
            transactions: vec![],
        }]);
        assert!(!serviced_message(&unserviced_block, &broker, groups));

        assert!(serviced_message(&Message::Pong { nonce: 1 }, &broker, groups));
    }
}
