//! Anchor block data and beacon-chain slot facts
//!
//! In-memory providers backing the consensus-side traits. A production
//! deployment replaces these with L1 execution- and consensus-client
//! queries; the consensus core never notices, it only sees pre-staged data.

use async_trait::async_trait;
use dashmap::DashMap;
use preconf_consensus::reorg::{AnchorFetchError, AnchorSource};
use preconf_consensus::BeaconFactSource;
use protocol_types::{AnchorInfo, Hash};

/// Anchor hashes by L1 block number, updated by whatever watches L1
#[derive(Default)]
pub struct InMemoryAnchors {
    hashes: DashMap<u64, Hash>,
    /// Block numbers whose fetch is currently failing (outage simulation
    /// and pre-fork gaps)
    unavailable: DashMap<u64, ()>,
}

impl InMemoryAnchors {
    pub fn set(&self, block_number: u64, hash: Hash) {
        self.hashes.insert(block_number, hash);
        self.unavailable.remove(&block_number);
    }

    pub fn mark_unavailable(&self, block_number: u64) {
        self.unavailable.insert(block_number, ());
    }
}

#[async_trait]
impl AnchorSource for InMemoryAnchors {
    async fn anchor_info(&self, block_number: u64) -> Result<AnchorInfo, AnchorFetchError> {
        if self.unavailable.contains_key(&block_number) {
            return Err(AnchorFetchError::Unavailable(block_number));
        }
        self.hashes
            .get(&block_number)
            .map(|hash| AnchorInfo {
                block_number,
                block_hash: *hash,
            })
            .ok_or(AnchorFetchError::Unavailable(block_number))
    }
}

/// Beacon-chain slot emptiness by slot timestamp. Slots default to
/// non-empty: an unknown slot must never soften a penalty.
#[derive(Default)]
pub struct InMemoryBeacon {
    empty_slots: DashMap<u64, ()>,
}

impl InMemoryBeacon {
    pub fn mark_empty(&self, slot_timestamp: u64) {
        self.empty_slots.insert(slot_timestamp, ());
    }
}

impl BeaconFactSource for InMemoryBeacon {
    fn is_slot_empty(&self, slot_timestamp: u64) -> bool {
        self.empty_slots.contains_key(&slot_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn anchors_resolve_and_fail_over() {
        let anchors = InMemoryAnchors::default();
        anchors.set(500, [1; 32]);

        let info = anchors.anchor_info(500).await.unwrap();
        assert_eq!(info.block_hash, [1; 32]);

        anchors.mark_unavailable(500);
        assert!(anchors.anchor_info(500).await.is_err());
        assert!(anchors.anchor_info(999).await.is_err());
    }

    #[test]
    fn unknown_slots_read_as_non_empty() {
        let beacon = InMemoryBeacon::default();
        assert!(!beacon.is_slot_empty(1_000));
        beacon.mark_empty(1_000);
        assert!(beacon.is_slot_empty(1_000));
    }
}
