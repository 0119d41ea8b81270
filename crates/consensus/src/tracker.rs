//! Chain state tracker: the tentative head and its applied history
//!
//! Exactly one `ParentState` exists per tracker. Only the commitment
//! verifier and the reorg reconciler mutate it, both through the chain
//! driver's single application queue; the lock here protects concurrent
//! readers (RPC, gossip), not concurrent writers.

use std::collections::{BTreeMap, HashMap};

use borsh::{BorshDeserialize, BorshSerialize};
use parking_lot::Mutex;
use protocol_types::{BlockRecord, Hash, ParentState, RawTxList, SignedCommitment};

/// One applied entry of the tentative chain.
///
/// The raw transaction list is retained so the block can be re-executed by
/// the reorg reconciler; the signed commitment and registration root are
/// retained so fault evidence can be packaged later.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct AppliedBlock {
    pub record: BlockRecord,
    pub commitment: SignedCommitment,
    pub tx_list: RawTxList,
    pub registration_root: Hash,
    /// Head state after this block was applied
    pub post_state: ParentState,
}

/// An accepted EOP-only commitment, attached to the head block it closed
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
struct EopMarker {
    entry: AppliedBlock,
    /// Head block number at the time the handover signal was accepted
    head_block_number: u64,
}

struct TrackerInner {
    genesis: ParentState,
    head: ParentState,
    /// Content blocks by block number
    blocks: BTreeMap<u64, AppliedBlock>,
    /// EOP-only markers by submission window end
    eop_markers: HashMap<u64, EopMarker>,
    /// Set when a reorg could not be reconciled; application is suspended
    /// and the head is untrusted until resolved
    suspended: bool,
}

/// Serializable image of the tracker, used by the persistence layer
#[derive(Debug, BorshSerialize, BorshDeserialize)]
pub struct TrackerSnapshot {
    pub genesis: ParentState,
    pub head: ParentState,
    pub blocks: Vec<AppliedBlock>,
    pub eop_markers: Vec<(u64, AppliedBlock, u64)>,
    pub suspended: bool,
}

pub struct ChainStateTracker {
    inner: Mutex<TrackerInner>,
}

impl ChainStateTracker {
    pub fn new(genesis: ParentState) -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                head: genesis.clone(),
                genesis,
                blocks: BTreeMap::new(),
                eop_markers: HashMap::new(),
                suspended: false,
            }),
        }
    }

    pub fn head(&self) -> ParentState {
        self.inner.lock().head.clone()
    }

    pub fn head_block_number(&self) -> u64 {
        self.inner.lock().head.header.number
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.lock().suspended
    }

    /// Mark the chain segment unreconciled. Further application on top of
    /// it is rejected until resolved; downstream consumers see the head as
    /// untrusted.
    pub fn suspend(&self) {
        self.inner.lock().suspended = true;
    }

    /// Commit a freshly derived block as the new head
    pub fn apply_block(&self, entry: AppliedBlock) {
        let mut inner = self.inner.lock();
        debug_assert_eq!(entry.post_state.header.number, inner.head.header.number + 1);
        inner.head = entry.post_state.clone();
        inner.blocks.insert(entry.record.block_number, entry);
    }

    /// Record an accepted EOP-only commitment. The custody chain advances to
    /// the handover commitment's hash; the header side of the head is
    /// untouched since no block content was derived.
    pub fn record_eop(&self, record: BlockRecord, commitment: SignedCommitment, registration_root: Hash) -> ParentState {
        let mut inner = self.inner.lock();
        inner.head.preconfirmation_hash = commitment.preconfirmation().hash();
        let head_block_number = inner.head.header.number;
        let post_state = inner.head.clone();
        inner.eop_markers.insert(
            record.submission_window_end,
            EopMarker {
                entry: AppliedBlock {
                    record,
                    commitment,
                    tx_list: RawTxList::default(),
                    registration_root,
                    post_state: post_state.clone(),
                },
                head_block_number,
            },
        );
        post_state
    }

    /// The preconfed record at `block_number`, with the EOP flag merged in
    /// when an EOP-only marker closed the window on that block
    pub fn preconfed(&self, block_number: u64) -> Option<BlockRecord> {
        let inner = self.inner.lock();
        let block = inner.blocks.get(&block_number)?;
        let mut record = block.record.clone();
        if let Some(marker) = inner.eop_markers.get(&record.submission_window_end) {
            if marker.head_block_number == block_number {
                record.eop = true;
            }
        }
        Some(record)
    }

    pub fn applied_block(&self, block_number: u64) -> Option<AppliedBlock> {
        self.inner.lock().blocks.get(&block_number).cloned()
    }

    /// The commitment carrying the EOP signal for `block_number`: the
    /// block's own commitment when it signaled inline, otherwise the
    /// EOP-only marker that closed its window
    pub fn eop_commitment(&self, block_number: u64) -> Option<SignedCommitment> {
        let inner = self.inner.lock();
        let block = inner.blocks.get(&block_number)?;
        if block.record.eop {
            return Some(block.commitment.clone());
        }
        inner
            .eop_markers
            .get(&block.record.submission_window_end)
            .filter(|marker| marker.head_block_number == block_number)
            .map(|marker| marker.entry.commitment.clone())
    }

    /// Head state before `block_number` was applied
    pub fn parent_state_before(&self, block_number: u64) -> ParentState {
        let inner = self.inner.lock();
        match block_number.checked_sub(1).and_then(|n| inner.blocks.get(&n)) {
            Some(block) => block.post_state.clone(),
            None => inner.genesis.clone(),
        }
    }

    /// Block numbers whose anchor is among the invalidated set, ascending
    pub fn blocks_with_anchors(&self, invalidated: &[u64]) -> Vec<u64> {
        let inner = self.inner.lock();
        inner
            .blocks
            .values()
            .filter(|block| invalidated.contains(&block.record.anchor_block_number))
            .map(|block| block.record.block_number)
            .collect()
    }

    /// The applied segment from `block_number` through the head, ascending
    pub fn blocks_from(&self, block_number: u64) -> Vec<AppliedBlock> {
        let inner = self.inner.lock();
        inner
            .blocks
            .range(block_number..)
            .map(|(_, block)| block.clone())
            .collect()
    }

    /// Replace a replayed segment and move the head to its tip. The custody
    /// chain is untouched: replay changes derived headers, never the
    /// commitments that produced them.
    pub fn commit_replayed(&self, segment: Vec<AppliedBlock>) {
        let mut inner = self.inner.lock();
        let Some(last) = segment.last() else { return };
        inner.head.header = last.post_state.header.clone();
        inner.head.proposal_id = last.post_state.proposal_id;
        for entry in segment {
            inner.blocks.insert(entry.record.block_number, entry);
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let inner = self.inner.lock();
        TrackerSnapshot {
            genesis: inner.genesis.clone(),
            head: inner.head.clone(),
            blocks: inner.blocks.values().cloned().collect(),
            eop_markers: inner
                .eop_markers
                .iter()
                .map(|(window, marker)| (*window, marker.entry.clone(), marker.head_block_number))
                .collect(),
            suspended: inner.suspended,
        }
    }

    pub fn restore(snapshot: TrackerSnapshot) -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                genesis: snapshot.genesis,
                head: snapshot.head,
                blocks: snapshot
                    .blocks
                    .into_iter()
                    .map(|block| (block.record.block_number, block))
                    .collect(),
                eop_markers: snapshot
                    .eop_markers
                    .into_iter()
                    .map(|(window, entry, head_block_number)| {
                        (window, EopMarker { entry, head_block_number })
                    })
                    .collect(),
                suspended: snapshot.suspended,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol_types::{Address, BlockHeader, CommitmentPayload, Preconfirmation, ZERO_HASH};

    fn preconf(block_number: u64, window_end: u64, parent_hash: Hash) -> Preconfirmation {
        Preconfirmation {
            eop: false,
            block_number,
            timestamp: 1_000 + block_number,
            gas_limit: 30_000_000,
            coinbase: Address([1; 32]),
            anchor_block_number: 50,
            raw_tx_list_hash: [7u8; 32],
            parent_preconfirmation_hash: parent_hash,
            submission_window_end: window_end,
            prover_auth: Address([2; 32]),
            proposal_id: 1,
        }
    }

    fn signed(preconf: Preconfirmation) -> SignedCommitment {
        let (_, key) = Address::generate();
        SignedCommitment::sign(
            CommitmentPayload {
                preconfirmation: preconf,
                slasher_address: Address([9; 32]),
            },
            &key,
        )
    }

    fn applied(tracker: &ChainStateTracker, preconf: Preconfirmation) -> AppliedBlock {
        let parent = tracker.head();
        let post_state = ParentState {
            header: BlockHeader {
                number: preconf.block_number,
                timestamp: preconf.timestamp,
                gas_limit: preconf.gas_limit,
                coinbase: preconf.coinbase,
                anchor_block_number: preconf.anchor_block_number,
                anchor_hash: [3u8; 32],
                parent_hash: parent.header.hash(),
                state_root: [4u8; 32],
            },
            preconfirmation_hash: preconf.hash(),
            proposal_id: preconf.proposal_id,
        };
        AppliedBlock {
            record: BlockRecord::from_preconfirmation(&preconf),
            commitment: signed(preconf),
            tx_list: RawTxList::default(),
            registration_root: [8u8; 32],
            post_state,
        }
    }

    #[test]
    fn apply_advances_head_and_history() {
        let tracker = ChainStateTracker::new(ParentState::genesis(1_000, 30_000_000));
        let genesis_hash = tracker.head().preconfirmation_hash;

        let p1 = preconf(1, 1_012, genesis_hash);
        let hash1 = p1.hash();
        tracker.apply_block(applied(&tracker, p1));

        assert_eq!(tracker.head_block_number(), 1);
        assert_eq!(tracker.head().preconfirmation_hash, hash1);
        assert!(tracker.preconfed(1).is_some());
    }

    #[test]
    fn eop_marker_advances_custody_chain_only() {
        let tracker = ChainStateTracker::new(ParentState::genesis(1_000, 30_000_000));
        let genesis_hash = tracker.head().preconfirmation_hash;

        let p1 = preconf(1, 1_012, genesis_hash);
        tracker.apply_block(applied(&tracker, p1.clone()));
        let header_before = tracker.head().header;

        let mut eop = preconf(1, 1_012, p1.hash());
        eop.eop = true;
        eop.raw_tx_list_hash = ZERO_HASH;
        let eop_hash = eop.hash();
        tracker.record_eop(
            BlockRecord::from_preconfirmation(&eop),
            signed(eop),
            [8u8; 32],
        );

        let head = tracker.head();
        assert_eq!(head.preconfirmation_hash, eop_hash);
        assert_eq!(head.header, header_before);
        // The marker closes the window on block 1
        assert!(tracker.preconfed(1).unwrap().eop);
        assert!(tracker.eop_commitment(1).is_some());
    }

    #[test]
    fn snapshot_roundtrip_preserves_state() {
        let tracker = ChainStateTracker::new(ParentState::genesis(1_000, 30_000_000));
        let genesis_hash = tracker.head().preconfirmation_hash;
        tracker.apply_block(applied(&tracker, preconf(1, 1_012, genesis_hash)));
        tracker.suspend();

        let restored = ChainStateTracker::restore(tracker.snapshot());
        assert_eq!(restored.head(), tracker.head());
        assert!(restored.is_suspended());
        assert_eq!(restored.preconfed(1), tracker.preconfed(1));
    }
}
