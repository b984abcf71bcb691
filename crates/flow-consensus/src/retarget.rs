//! Per-chain difficulty retargeting.

use crate::ConsensusParams;
use flow_types::U256;
use num_bigint::BigUint;
use tracing::debug;

/// Header data feeding the retarget.
#[derive(Debug, Clone)]
pub struct RetargetHeader {
    /// Block timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Target the block was mined against.
    pub target: U256,
}

/// The target the next block of a chain must declare.
///
/// `headers` is the chain's most recent window, oldest first. Shorter
/// histories keep the latest (or genesis) target; a full window scales
/// the parent target by the ratio of actual to expected span, clamped to
/// `[1/clamp, clamp]` and capped at the easiest permitted target.
/// Integer arithmetic only, so every node lands on the same value.
pub fn next_target(params: &ConsensusParams, headers: &[RetargetHeader]) -> U256 {
    let Some(parent) = headers.last() else {
        return params.max_mining_target.clone();
    };
    if headers.len() < params.retarget_window {
        return parent.target.clone();
    }

    let window = &headers[headers.len() - params.retarget_window..];
    let first = &window[0];
    let last = &window[window.len() - 1];

    let expected_span = params.block_target_spacing_ms * (params.retarget_window as u64 - 1);
    let actual_span = last.timestamp_ms.saturating_sub(first.timestamp_ms);

    // Clamp the span before scaling so one wild timestamp cannot swing
    // the target by more than the clamp factor.
    let min_span = expected_span / params.retarget_clamp;
    let max_span = expected_span * params.retarget_clamp;
    let span = actual_span.clamp(min_span.max(1), max_span);

    let scaled: BigUint =
        parent.target.as_biguint() * BigUint::from(span) / BigUint::from(expected_span);
    let next = U256::from_biguint_clamped(scaled);

    let capped = if next > params.max_mining_target {
        params.max_mining_target.clone()
    } else {
        next
    };

    debug!(
        actual_span,
        expected_span,
        parent = %parent.target,
        next = %capped,
        "Retarget"
    );
    capped
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_types::NetworkId;

    fn params() -> ConsensusParams {
        let mut p = ConsensusParams::new(2, NetworkId::Devnet);
        p.max_mining_target = U256::max_value();
        p
    }

    fn window(spacing_ms: u64, target: U256, len: usize) -> Vec<RetargetHeader> {
        (0..len)
            .map(|i| RetargetHeader {
                timestamp_ms: i as u64 * spacing_ms,
                target: target.clone(),
            })
            .collect()
    }

    #[test]
    fn test_empty_history_uses_max_target() {
        let p = params();
        assert_eq!(next_target(&p, &[]), p.max_mining_target);
    }

    #[test]
    fn test_short_history_keeps_parent_target() {
        let p = params();
        let target = U256::from_u64(1 << 40);
        let headers = window(p.block_target_spacing_ms, target.clone(), 3);
        assert_eq!(next_target(&p, &headers), target);
    }

    #[test]
    fn test_on_pace_keeps_target() {
        let p = params();
        let target = U256::from_u64(1 << 40);
        let headers = window(p.block_target_spacing_ms, target.clone(), p.retarget_window);
        assert_eq!(next_target(&p, &headers), target);
    }

    #[test]
    fn test_fast_blocks_tighten_target() {
        let p = params();
        let target = U256::from_u64(1 << 40);
        // Blocks twice as fast as the goal: target should halve.
        let headers = window(
            p.block_target_spacing_ms / 2,
            target.clone(),
            p.retarget_window,
        );
        let next = next_target(&p, &headers);
        assert!(next < target);
        assert_eq!(next, U256::from_u64(1 << 39));
    }

    #[test]
    fn test_slow_blocks_loosen_target() {
        let p = params();
        let target = U256::from_u64(1 << 40);
        let headers = window(
            p.block_target_spacing_ms * 2,
            target.clone(),
            p.retarget_window,
        );
        let next = next_target(&p, &headers);
        assert_eq!(next, U256::from_u64(1 << 41));
    }

    #[test]
    fn test_adjustment_is_clamped() {
        let p = params();
        let target = U256::from_u64(1 << 40);
        // Instant blocks: without the clamp this would collapse to zero.
        let headers = window(0, target.clone(), p.retarget_window);
        let next = next_target(&p, &headers);
        assert_eq!(next, U256::from_u64((1 << 40) / p.retarget_clamp));
    }

    #[test]
    fn test_result_capped_at_max_mining_target() {
        let mut p = params();
        p.max_mining_target = U256::from_u64(1 << 40);
        // Very slow blocks on an already-easy target.
        let headers = window(
            p.block_target_spacing_ms * 16,
            p.max_mining_target.clone(),
            p.retarget_window,
        );
        assert_eq!(next_target(&p, &headers), p.max_mining_target);
    }
}
