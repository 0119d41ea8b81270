//! Block headers, the tentative chain head, and durable block records

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::commitment::{Preconfirmation, RawTransaction};
use crate::primitives::{hash_of, Address, Hash};

/// Header of a derived L2 block
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub coinbase: Address,
    pub anchor_block_number: u64,
    /// Hash of the L1 anchor block imported by this block
    pub anchor_hash: Hash,
    pub parent_hash: Hash,
    pub state_root: Hash,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash {
        hash_of(self)
    }
}

/// The locally derived tentative head. Exactly one exists per tracker;
/// mutated in place by successful application, rolled back only by
/// reorg reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ParentState {
    pub header: BlockHeader,
    /// Hash of the last accepted preconfirmation; the next commitment must
    /// name this as its parent
    pub preconfirmation_hash: Hash,
    pub proposal_id: u64,
}

impl ParentState {
    /// The pre-protocol head: block zero with an empty custody chain
    pub fn genesis(timestamp: u64, gas_limit: u64) -> Self {
        Self {
            header: BlockHeader {
                number: 0,
                timestamp,
                gas_limit,
                coinbase: Address::ZERO,
                anchor_block_number: 0,
                anchor_hash: [0u8; 32],
                parent_hash: [0u8; 32],
                state_root: [0u8; 32],
            },
            preconfirmation_hash: [0u8; 32],
            proposal_id: 0,
        }
    }
}

/// Identity of an L1 anchor block, pre-staged before block application
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AnchorInfo {
    pub block_number: u64,
    pub block_hash: Hash,
}

/// Everything the execution engine needs to derive one block. Built from an
/// accepted commitment plus its raw transaction list and pre-staged anchor
/// data; consumed immediately, never retained.
#[derive(Debug, Clone)]
pub struct BlockManifest {
    pub preconfirmation: Preconfirmation,
    pub transactions: Vec<RawTransaction>,
    pub anchor: AnchorInfo,
}

impl BlockManifest {
    pub fn new(
        preconfirmation: Preconfirmation,
        transactions: Vec<RawTransaction>,
        anchor: AnchorInfo,
    ) -> Self {
        Self {
            preconfirmation,
            transactions,
            anchor,
        }
    }
}

/// Durable per-block record compared by the equivocation classifier.
/// Built identically from the local preconfed history and from L1-settled
/// data so the two sides are field-for-field comparable.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockRecord {
    pub block_number: u64,
    pub raw_tx_list_hash: Hash,
    pub anchor_block_number: u64,
    pub submission_window_end: u64,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub coinbase: Address,
    pub prover_auth: Address,
    pub proposal_id: u64,
    pub eop: bool,
    /// True when the record stands for an EOP-only commitment: it carries no
    /// block content and is exempt from content comparison.
    pub eop_only: bool,
}

impl BlockRecord {
    pub fn from_preconfirmation(preconf: &Preconfirmation) -> Self {
        Self {
            block_number: preconf.block_number,
            raw_tx_list_hash: preconf.raw_tx_list_hash,
            anchor_block_number: preconf.anchor_block_number,
            submission_window_end: preconf.submission_window_end,
            timestamp: preconf.timestamp,
            gas_limit: preconf.gas_limit,
            coinbase: preconf.coinbase,
            prover_auth: preconf.prover_auth,
            proposal_id: preconf.proposal_id,
            eop: preconf.eop,
            eop_only: preconf.is_eop_only(),
        }
    }

    /// Field-wise block-content comparison used by mismatch classification.
    /// Window and EOP markers are judged separately, so they are excluded.
    pub fn same_content(&self, other: &BlockRecord) -> bool {
        self.raw_tx_list_hash == other.raw_tx_list_hash
            && self.anchor_block_number == other.anchor_block_number
            && self.timestamp == other.timestamp
            && self.gas_limit == other.gas_limit
            && self.coinbase == other.coinbase
            && self.prover_auth == other.prover_auth
            && self.proposal_id == other.proposal_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_empty_custody_chain() {
        let genesis = ParentState::genesis(1_700_000_000, 30_000_000);
        assert_eq!(genesis.header.number, 0);
        assert_eq!(genesis.preconfirmation_hash, [0u8; 32]);
    }

    #[test]
    fn header_hash_changes_with_content() {
        let genesis = ParentState::genesis(1_700_000_000, 30_000_000);
        let mut other = genesis.header.clone();
        other.number = 1;
        assert_ne!(genesis.header.hash(), other.hash());
    }
}
