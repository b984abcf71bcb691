//! Header validation.

use crate::error::invalid;
use crate::{ConsensusParams, FlowHeaderView, InvalidHeaderStatus, ValidationError};
use flow_types::{BlockHeader, BrokerInfo, ChainIndex};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Result alias for header checks.
type HeaderResult = Result<(), ValidationError<InvalidHeaderStatus>>;

/// The header validation pipeline.
pub struct HeaderValidator {
    params: Arc<ConsensusParams>,
    broker: BrokerInfo,
}

impl HeaderValidator {
    /// Build a validator for this broker.
    pub fn new(params: Arc<ConsensusParams>, broker: BrokerInfo) -> Self {
        HeaderValidator { params, broker }
    }

    /// Run the full pipeline, in order: timestamp, work amount, work
    /// target, parent presence, deps presence.
    #[instrument(skip(self, header, view), fields(hash = %header.hash()))]
    pub fn validate<V: FlowHeaderView>(
        &self,
        header: &BlockHeader,
        view: &V,
        now_ms: u64,
        is_syncing: bool,
    ) -> HeaderResult {
        self.validate_group(header)?;
        self.validate_timestamp(header, now_ms, is_syncing)?;
        self.validate_work_amount(header)?;
        self.validate_work_target(header, view)?;
        self.validate_parent(header, view)?;
        self.validate_deps(header, view)?;
        debug!("Header valid");
        Ok(())
    }

    /// The broker must service the header's chain.
    pub fn validate_group(&self, header: &BlockHeader) -> HeaderResult {
        let chain_index = header.chain_index(self.params.groups);
        if !chain_index.relates_to(&self.broker) {
            return invalid(InvalidHeaderStatus::InvalidGroup);
        }
        Ok(())
    }

    /// At most one hour ahead of local time; at most one hour behind it
    /// unless the node is syncing history.
    pub fn validate_timestamp(
        &self,
        header: &BlockHeader,
        now_ms: u64,
        is_syncing: bool,
    ) -> HeaderResult {
        let skew = self.params.timestamp_skew_ms;
        if header.timestamp_ms > now_ms + skew {
            return invalid(InvalidHeaderStatus::InvalidTimeStamp);
        }
        if !is_syncing && header.timestamp_ms + skew < now_ms {
            return invalid(InvalidHeaderStatus::InvalidTimeStamp);
        }
        Ok(())
    }

    /// `hash <= target` as 256-bit big-endian integers.
    pub fn validate_work_amount(&self, header: &BlockHeader) -> HeaderResult {
        if !header.satisfies_work() {
            return invalid(InvalidHeaderStatus::InvalidWorkAmount);
        }
        Ok(())
    }

    /// The declared target must equal the retarget recomputation.
    pub fn validate_work_target<V: FlowHeaderView>(
        &self,
        header: &BlockHeader,
        view: &V,
    ) -> HeaderResult {
        let expected = view.expected_target(header)?;
        if header.target != expected {
            return invalid(InvalidHeaderStatus::InvalidWorkTarget);
        }
        Ok(())
    }

    /// The parent must be accepted and live on the header's own chain.
    pub fn validate_parent<V: FlowHeaderView>(
        &self,
        header: &BlockHeader,
        view: &V,
    ) -> HeaderResult {
        if !view.contains_hash(&header.parent_hash)? {
            return invalid(InvalidHeaderStatus::MissingParent);
        }
        let own = header.chain_index(self.params.groups);
        let parent_chain = ChainIndex::from_hash(&header.parent_hash, self.params.groups);
        if parent_chain != own {
            return invalid(InvalidHeaderStatus::MissingParent);
        }
        Ok(())
    }

    /// Every dep must already be accepted in the flow.
    pub fn validate_deps<V: FlowHeaderView>(
        &self,
        header: &BlockHeader,
        view: &V,
    ) -> HeaderResult {
        if header.block_deps.len() != flow_types::BlockDeps::expected_len(self.params.groups) {
            return invalid(InvalidHeaderStatus::MissingDeps);
        }
        for dep in header.block_deps.hashes() {
            if !view.contains_hash(dep)? {
                return invalid(InvalidHeaderStatus::MissingDeps);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_storage::StorageResult;
    use flow_types::{BlockDeps, Hash, NetworkId, U256};
    use std::collections::HashSet;

    struct MapView {
        known: HashSet<Hash>,
        target: U256,
    }

    impl FlowHeaderView for MapView {
        fn contains_hash(&self, hash: &Hash) -> StorageResult<bool> {
            Ok(self.known.contains(hash))
        }

        fn expected_target(&self, _header: &BlockHeader) -> StorageResult<U256> {
            Ok(self.target.clone())
        }
    }

    const NOW: u64 = 1_700_000_000_000;
    const HOUR: u64 = 60 * 60 * 1000;

    fn validator() -> HeaderValidator {
        HeaderValidator::new(
            Arc::new(ConsensusParams::new(1, NetworkId::Devnet)),
            BrokerInfo::solo(),
        )
    }

    /// Single-group header with a known parent; deps list is empty for
    /// G = 1.
    fn header(parent: Hash, timestamp_ms: u64) -> BlockHeader {
        BlockHeader {
            parent_hash: parent,
            block_deps: BlockDeps::new(vec![]),
            txs_hash: Hash::ZERO,
            timestamp_ms,
            target: U256::max_value(),
            nonce: 0,
        }
    }

    fn view_with(hashes: &[Hash]) -> MapView {
        MapView {
            known: hashes.iter().copied().collect(),
            target: U256::max_value(),
        }
    }

    #[test]
    fn test_valid_header_passes() {
        let parent = Hash::hash(b"parent");
        let h = header(parent, NOW);
        let view = view_with(&[parent]);
        assert!(validator().validate(&h, &view, NOW, false).is_ok());
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let parent = Hash::hash(b"parent");
        let h = header(parent, NOW + HOUR + 1);
        let view = view_with(&[parent]);
        let err = validator().validate(&h, &view, NOW, false).unwrap_err();
        assert_eq!(
            err.invalid_status(),
            Some(&InvalidHeaderStatus::InvalidTimeStamp)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected_unless_syncing() {
        let parent = Hash::hash(b"parent");
        let h = header(parent, NOW - HOUR - 1);
        let view = view_with(&[parent]);
        let v = validator();

        let err = v.validate(&h, &view, NOW, false).unwrap_err();
        assert_eq!(
            err.invalid_status(),
            Some(&InvalidHeaderStatus::InvalidTimeStamp)
        );
        // Syncing accepts historical timestamps.
        assert!(v.validate(&h, &view, NOW, true).is_ok());
    }

    #[test]
    fn test_insufficient_work_rejected() {
        let parent = Hash::hash(b"parent");
        let mut h = header(parent, NOW);
        h.target = U256::zero();
        let mut view = view_with(&[parent]);
        view.target = U256::zero();
        let err = validator().validate(&h, &view, NOW, false).unwrap_err();
        assert_eq!(
            err.invalid_status(),
            Some(&InvalidHeaderStatus::InvalidWorkAmount)
        );
    }

    #[test]
    fn test_wrong_target_rejected() {
        let parent = Hash::hash(b"parent");
        let h = header(parent, NOW);
        let mut view = view_with(&[parent]);
        view.target = U256::from_u64(12345);
        let err = validator().validate(&h, &view, NOW, false).unwrap_err();
        assert_eq!(
            err.invalid_status(),
            Some(&InvalidHeaderStatus::InvalidWorkTarget)
        );
    }

    #[test]
    fn test_missing_parent_rejected() {
        let h = header(Hash::hash(b"unknown"), NOW);
        let view = view_with(&[]);
        let err = validator().validate(&h, &view, NOW, false).unwrap_err();
        assert_eq!(
            err.invalid_status(),
            Some(&InvalidHeaderStatus::MissingParent)
        );
    }

    #[test]
    fn test_wrong_dep_count_rejected() {
        let parent = Hash::hash(b"parent");
        let mut h = header(parent, NOW);
        h.block_deps = BlockDeps::new(vec![Hash::hash(b"extra")]);
        let view = view_with(&[parent, Hash::hash(b"extra")]);
        let err = validator().validate(&h, &view, NOW, false).unwrap_err();
        assert_eq!(
            err.invalid_status(),
            Some(&InvalidHeaderStatus::MissingDeps)
        );
    }
}
