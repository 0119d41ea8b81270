//! Commitment verification state machine
//!
//! One `(RawTxList, SignedCommitment)` pair at a time, in arrival order.
//! Every rejection leaves the tracker untouched and is an ordinary event
//! under network reordering and duplication, not a security signal; real
//! equivocation is only established later against L1-settled data.

use std::sync::Arc;

use protocol_types::{
    Address, AnchorInfo, BlockManifest, BlockRecord, LookaheadSlot, ParentState, RawTxList,
    SignedCommitment,
};
use thiserror::Error;

use crate::engine::{EngineError, ExecutionEngine};
use crate::lookahead::LookaheadProvider;
use crate::tracker::{AppliedBlock, ChainStateTracker};

/// Why a commitment is not applicable to the current head
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InapplicableCommitment {
    #[error("commitment directed at a foreign slasher {0}")]
    MisdirectedSlasher(Address),

    #[error("chain suspended pending reorg reconciliation")]
    ChainSuspended,

    #[error("no preconfer is scheduled for the current window")]
    NoActivePreconfer,

    #[error("signature does not verify against the scheduled committer {0}")]
    WrongSigner(Address),

    #[error("commitment window {got} does not match the active window {expected}")]
    WindowMismatch { got: u64, expected: u64 },

    #[error("parent preconfirmation hash does not match the local head")]
    ParentMismatch,

    #[error("raw transaction list does not hash to the committed value")]
    TxListMismatch,

    #[error("timestamp drift {drift}s exceeds the {max}s bound")]
    DriftExceeded { drift: u64, max: u64 },

    #[error("coinbase does not match the scheduled committer")]
    CoinbaseMismatch,

    #[error("anchor data unavailable for L1 block {0}")]
    AnchorUnavailable(u64),

    #[error("derivation constraints rejected the block: {0}")]
    Derivation(#[from] EngineError),
}

/// Observable state of the verifier
#[derive(Debug, Clone)]
pub enum VerifierState {
    /// Idle, waiting for a commitment from the named slot (None until the
    /// first election resolves)
    AwaitingCommitment(Option<LookaheadSlot>),
    /// A manifest is being derived and executed
    Applying,
    /// The tracker is suspended; nothing can be applied
    Faulted,
}

/// What an accepted commitment did
#[derive(Debug, Clone)]
pub enum Accepted {
    /// A content-bearing block was derived and committed as the new head
    Block { head: ParentState, rotated: bool },
    /// A bare handover signal; rotation advanced, the header did not
    EopOnly,
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// The protocol's canonical preconf-slasher address; commitments naming
    /// any other slasher are misdirected
    pub slasher_address: Address,
    /// Acceptance bound on `|timestamp - now|`, inclusive
    pub max_timestamp_drift: u64,
}

pub struct CommitmentVerifier<L: LookaheadProvider, E: ExecutionEngine> {
    config: VerifierConfig,
    lookahead: Arc<L>,
    engine: Arc<E>,
    current_slot: Option<LookaheadSlot>,
    applying: bool,
}

impl<L: LookaheadProvider, E: ExecutionEngine> CommitmentVerifier<L, E> {
    pub fn new(config: VerifierConfig, lookahead: Arc<L>, engine: Arc<E>) -> Self {
        Self {
            config,
            lookahead,
            engine,
            current_slot: None,
            applying: false,
        }
    }

    pub fn current_slot(&self) -> Option<&LookaheadSlot> {
        self.current_slot.as_ref()
    }

    pub fn state(&self, tracker: &ChainStateTracker) -> VerifierState {
        if tracker.is_suspended() {
            VerifierState::Faulted
        } else if self.applying {
            VerifierState::Applying
        } else {
            VerifierState::AwaitingCommitment(self.current_slot.clone())
        }
    }

    /// Validate one commitment against the schedule and the local head, and
    /// apply the derived block. Runs as one atomic unit against the tracker;
    /// the caller serializes invocations.
    pub fn verify_and_apply(
        &mut self,
        tracker: &ChainStateTracker,
        commitment: &SignedCommitment,
        tx_list: &RawTxList,
        anchor: Option<AnchorInfo>,
        now: u64,
    ) -> Result<Accepted, InapplicableCommitment> {
        let preconf = commitment.preconfirmation().clone();

        // Misdirected commitment: signed toward a slasher we do not honor
        if commitment.payload.slasher_address != self.config.slasher_address {
            return Err(InapplicableCommitment::MisdirectedSlasher(
                commitment.payload.slasher_address,
            ));
        }

        if tracker.is_suspended() {
            return Err(InapplicableCommitment::ChainSuspended);
        }

        // Lazy rotation: the window timeout advances the slot when no
        // explicit EOP handover arrived first
        self.refresh_slot(now)?;
        let slot = self
            .current_slot
            .clone()
            .ok_or(InapplicableCommitment::NoActivePreconfer)?;

        if !commitment.verify(&slot.committer) {
            return Err(InapplicableCommitment::WrongSigner(slot.committer));
        }

        if preconf.submission_window_end != slot.submission_window_end {
            return Err(InapplicableCommitment::WindowMismatch {
                got: preconf.submission_window_end,
                expected: slot.submission_window_end,
            });
        }

        // Append-only custody chain. A mismatch means a missed message, a
        // fork, or a duplicate delivery; all of them are "not applicable
        // now", none of them slashable by itself.
        let head = tracker.head();
        if preconf.parent_preconfirmation_hash != head.preconfirmation_hash {
            return Err(InapplicableCommitment::ParentMismatch);
        }

        if preconf.is_eop_only() {
            // Bare handover: no block content to check or derive
            let record = BlockRecord::from_preconfirmation(&preconf);
            tracker.record_eop(record, commitment.clone(), slot.registration_root);
            self.rotate(&slot);
            return Ok(Accepted::EopOnly);
        }

        if tx_list.hash() != preconf.raw_tx_list_hash {
            return Err(InapplicableCommitment::TxListMismatch);
        }

        let drift = now.abs_diff(preconf.timestamp);
        if drift > self.config.max_timestamp_drift {
            return Err(InapplicableCommitment::DriftExceeded {
                drift,
                max: self.config.max_timestamp_drift,
            });
        }

        if preconf.coinbase != slot.committer {
            return Err(InapplicableCommitment::CoinbaseMismatch);
        }

        let anchor =
            anchor.ok_or(InapplicableCommitment::AnchorUnavailable(preconf.anchor_block_number))?;

        // Remaining derivation rules and execution belong to the engine
        self.applying = true;
        let manifest = BlockManifest::new(preconf.clone(), tx_list.0.clone(), anchor);
        let result = self.engine.process_manifest(&manifest, &head);
        self.applying = false;
        let new_head = result?;

        tracker.apply_block(AppliedBlock {
            record: BlockRecord::from_preconfirmation(&preconf),
            commitment: commitment.clone(),
            tx_list: tx_list.clone(),
            registration_root: slot.registration_root,
            post_state: new_head.clone(),
        });

        // Explicit handover takes priority over the window timeout
        let rotated = preconf.eop;
        if rotated {
            self.rotate(&slot);
        }

        Ok(Accepted::Block {
            head: new_head,
            rotated,
        })
    }

    fn refresh_slot(&mut self, now: u64) -> Result<(), InapplicableCommitment> {
        let expired = match &self.current_slot {
            None => true,
            Some(slot) => now > slot.submission_window_end,
        };
        if expired {
            self.current_slot = self.lookahead.current_preconfer(now);
        }
        if self.current_slot.is_none() {
            return Err(InapplicableCommitment::NoActivePreconfer);
        }
        Ok(())
    }

    fn rotate(&mut self, from: &LookaheadSlot) {
        self.current_slot = self.lookahead.next_preconfer(from);
        if let Some(next) = &self.current_slot {
            tracing::debug!(
                "Preconfer handover: {} takes the window ending at {}",
                next.committer,
                next.submission_window_end
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookahead::{FallbackPolicy, Lookahead, SlotTiming};
    use ed25519_dalek::SigningKey;
    use protocol_types::{hash_of, CommitmentPayload, Preconfirmation, RawTransaction, ZERO_HASH};

    const SLASHER: Address = Address([0xEE; 32]);
    const DRIFT: u64 = 12;

    /// Deterministic test engine: derives a child header without real
    /// execution, enough to exercise the state machine
    struct TestEngine;

    impl ExecutionEngine for TestEngine {
        fn process_manifest(
            &self,
            manifest: &BlockManifest,
            parent: &ParentState,
        ) -> Result<ParentState, EngineError> {
            let preconf = &manifest.preconfirmation;
            Ok(ParentState {
                header: protocol_types::BlockHeader {
                    number: parent.header.number + 1,
                    timestamp: preconf.timestamp,
                    gas_limit: preconf.gas_limit,
                    coinbase: preconf.coinbase,
                    anchor_block_number: manifest.anchor.block_number,
                    anchor_hash: manifest.anchor.block_hash,
                    parent_hash: parent.header.hash(),
                    state_root: hash_of(&(parent.header.state_root, preconf.raw_tx_list_hash)),
                },
                preconfirmation_hash: preconf.hash(),
                proposal_id: preconf.proposal_id,
            })
        }
    }

    struct Fixture {
        tracker: ChainStateTracker,
        verifier: CommitmentVerifier<Lookahead, TestEngine>,
        lookahead: Arc<Lookahead>,
        keys: Vec<(Address, SigningKey)>,
        now: u64,
    }

    fn fixture(num_operators: usize) -> Fixture {
        let timing = SlotTiming {
            genesis_timestamp: 1_000,
            slot_duration: 100,
            slots_per_epoch: 32,
        };
        let keys: Vec<_> = (0..num_operators).map(|_| Address::generate()).collect();
        let lookahead = Arc::new(Lookahead::new(
            timing,
            FallbackPolicy::WhitelistRotation,
            Vec::new(),
        ));
        lookahead.update(
            keys.iter()
                .enumerate()
                .map(|(i, (address, _))| LookaheadSlot {
                    committer: *address,
                    submission_window_end: 1_100 + 100 * i as u64,
                    registration_root: [i as u8 + 1; 32],
                    validator_leaf_index: i as u64,
                })
                .collect(),
        );
        let verifier = CommitmentVerifier::new(
            VerifierConfig {
                slasher_address: SLASHER,
                max_timestamp_drift: DRIFT,
            },
            lookahead.clone(),
            Arc::new(TestEngine),
        );
        Fixture {
            tracker: ChainStateTracker::new(ParentState::genesis(1_000, 30_000_000)),
            verifier,
            lookahead,
            keys,
            now: 1_050,
        }
    }

    fn tx_list() -> RawTxList {
        RawTxList(vec![RawTransaction(vec![1, 2, 3])])
    }

    fn commitment_for(
        fixture: &Fixture,
        operator: usize,
        tx_list: &RawTxList,
        eop: bool,
        window_end: u64,
    ) -> SignedCommitment {
        let (address, key) = &fixture.keys[operator];
        let head = fixture.tracker.head();
        let preconf = Preconfirmation {
            eop,
            block_number: head.header.number + 1,
            timestamp: fixture.now,
            gas_limit: 30_000_000,
            coinbase: *address,
            anchor_block_number: 500,
            raw_tx_list_hash: tx_list.hash(),
            parent_preconfirmation_hash: head.preconfirmation_hash,
            submission_window_end: window_end,
            prover_auth: Address([5; 32]),
            proposal_id: 1,
        };
        SignedCommitment::sign(
            CommitmentPayload {
                preconfirmation: preconf,
                slasher_address: SLASHER,
            },
            key,
        )
    }

    fn anchor() -> Option<AnchorInfo> {
        Some(AnchorInfo {
            block_number: 500,
            block_hash: [0xAB; 32],
        })
    }

    fn apply(
        fixture: &mut Fixture,
        commitment: &SignedCommitment,
        txs: &RawTxList,
    ) -> Result<Accepted, InapplicableCommitment> {
        let now = fixture.now;
        fixture
            .verifier
            .verify_and_apply(&fixture.tracker, commitment, txs, anchor(), now)
    }

    #[test]
    fn accepts_valid_commitment_and_advances_head() {
        let mut fixture = fixture(2);
        let txs = tx_list();
        let commitment = commitment_for(&fixture, 0, &txs, false, 1_100);

        let accepted = apply(&mut fixture, &commitment, &txs).unwrap();
        match accepted {
            Accepted::Block { head, rotated } => {
                assert_eq!(head.header.number, 1);
                assert!(!rotated);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            fixture.tracker.head().preconfirmation_hash,
            commitment.preconfirmation().hash()
        );
    }

    #[test]
    fn chain_stays_monotonic_across_sequence() {
        let mut fixture = fixture(1);
        let txs = tx_list();
        let mut previous_hash = fixture.tracker.head().preconfirmation_hash;

        for _ in 0..3 {
            let commitment = commitment_for(&fixture, 0, &txs, false, 1_100);
            assert_eq!(
                commitment.preconfirmation().parent_preconfirmation_hash,
                previous_hash
            );
            apply(&mut fixture, &commitment, &txs).unwrap();
            previous_hash = commitment.preconfirmation().hash();
            assert_eq!(fixture.tracker.head().preconfirmation_hash, previous_hash);
        }
        assert_eq!(fixture.tracker.head_block_number(), 3);
    }

    #[test]
    fn rejects_misdirected_slasher() {
        let mut fixture = fixture(1);
        let txs = tx_list();
        let mut commitment = commitment_for(&fixture, 0, &txs, false, 1_100);
        commitment.payload.slasher_address = Address([0x01; 32]);
        // Re-sign so only the slasher address is at fault
        let (_, key) = &fixture.keys[0];
        let commitment = SignedCommitment::sign(commitment.payload, key);

        assert!(matches!(
            apply(&mut fixture, &commitment, &txs),
            Err(InapplicableCommitment::MisdirectedSlasher(_))
        ));
    }

    #[test]
    fn rejects_wrong_signer() {
        let mut fixture = fixture(2);
        let txs = tx_list();
        // Operator 1 signs while operator 0 holds the window
        let commitment = commitment_for(&fixture, 1, &txs, false, 1_100);

        assert!(matches!(
            apply(&mut fixture, &commitment, &txs),
            Err(InapplicableCommitment::WrongSigner(_))
        ));
    }

    #[test]
    fn rejects_stale_window() {
        let mut fixture = fixture(2);
        let txs = tx_list();
        let commitment = commitment_for(&fixture, 0, &txs, false, 1_100);

        // The window timed out; rotation refreshes before the checks run
        fixture.now = 1_150;
        let result = apply(&mut fixture, &commitment, &txs);
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_delivery_is_parent_mismatch_not_an_error_of_another_kind() {
        let mut fixture = fixture(1);
        let txs = tx_list();
        let commitment = commitment_for(&fixture, 0, &txs, false, 1_100);

        apply(&mut fixture, &commitment, &txs).unwrap();
        let head_after_first = fixture.tracker.head();

        let second = apply(&mut fixture, &commitment, &txs);
        assert!(matches!(
            second,
            Err(InapplicableCommitment::ParentMismatch)
        ));
        assert_eq!(fixture.tracker.head(), head_after_first);
    }

    #[test]
    fn rejects_tx_list_hash_mismatch() {
        let mut fixture = fixture(1);
        let txs = tx_list();
        let commitment = commitment_for(&fixture, 0, &txs, false, 1_100);
        let other_txs = RawTxList(vec![RawTransaction(vec![9, 9])]);

        assert!(matches!(
            apply(&mut fixture, &commitment, &other_txs),
            Err(InapplicableCommitment::TxListMismatch)
        ));
    }

    #[test]
    fn drift_boundary_is_inclusive() {
        let mut fixture = fixture(1);
        let txs = tx_list();

        // Exactly at the bound: accepted
        let commitment = commitment_for(&fixture, 0, &txs, false, 1_100);
        fixture.now = commitment.preconfirmation().timestamp + DRIFT;
        apply(&mut fixture, &commitment, &txs).unwrap();

        // One past the bound: rejected
        let commitment = commitment_for(&fixture, 0, &txs, false, 1_100);
        fixture.now = commitment.preconfirmation().timestamp + DRIFT + 1;
        assert!(matches!(
            apply(&mut fixture, &commitment, &txs),
            Err(InapplicableCommitment::DriftExceeded { .. })
        ));
    }

    #[test]
    fn eop_rotates_exactly_once_and_old_signer_is_rejected() {
        let mut fixture = fixture(2);
        let txs = tx_list();

        let commitment = commitment_for(&fixture, 0, &txs, true, 1_100);
        let accepted = apply(&mut fixture, &commitment, &txs).unwrap();
        assert!(matches!(accepted, Accepted::Block { rotated: true, .. }));
        assert_eq!(
            fixture.verifier.current_slot().unwrap().committer,
            fixture.keys[1].0
        );

        // The superseded signer keeps trying within the old window
        let late = commitment_for(&fixture, 0, &txs, false, 1_100);
        assert!(matches!(
            apply(&mut fixture, &late, &txs),
            Err(InapplicableCommitment::WrongSigner(_))
        ));
    }

    #[test]
    fn eop_only_skips_content_checks_and_rotates() {
        let mut fixture = fixture(2);
        let head_before = fixture.tracker.head();

        let (address, key) = &fixture.keys[0];
        let preconf = Preconfirmation {
            eop: true,
            block_number: head_before.header.number,
            timestamp: 0, // would fail the drift check if it ran
            gas_limit: 0,
            coinbase: *address,
            anchor_block_number: 0,
            raw_tx_list_hash: ZERO_HASH,
            parent_preconfirmation_hash: head_before.preconfirmation_hash,
            submission_window_end: 1_100,
            prover_auth: Address::ZERO,
            proposal_id: 0,
        };
        let eop_hash = preconf.hash();
        let commitment = SignedCommitment::sign(
            CommitmentPayload {
                preconfirmation: preconf,
                slasher_address: SLASHER,
            },
            key,
        );

        let accepted = fixture
            .verifier
            .verify_and_apply(
                &fixture.tracker,
                &commitment,
                &RawTxList::default(),
                None,
                fixture.now,
            )
            .unwrap();
        assert!(matches!(accepted, Accepted::EopOnly));

        let head = fixture.tracker.head();
        assert_eq!(head.header, head_before.header);
        assert_eq!(head.preconfirmation_hash, eop_hash);
        assert_eq!(
            fixture.verifier.current_slot().unwrap().committer,
            fixture.keys[1].0
        );
    }

    #[test]
    fn suspended_tracker_rejects_everything() {
        let mut fixture = fixture(1);
        let txs = tx_list();
        fixture.tracker.suspend();

        let commitment = commitment_for(&fixture, 0, &txs, false, 1_100);
        assert!(matches!(
            apply(&mut fixture, &commitment, &txs),
            Err(InapplicableCommitment::ChainSuspended)
        ));
        assert!(matches!(
            fixture.verifier.state(&fixture.tracker),
            VerifierState::Faulted
        ));
    }

    #[test]
    fn rejects_coinbase_not_matching_committer() {
        let mut fixture = fixture(1);
        let txs = tx_list();
        let (_, key) = &fixture.keys[0];
        let head = fixture.tracker.head();
        let preconf = Preconfirmation {
            eop: false,
            block_number: 1,
            timestamp: fixture.now,
            gas_limit: 30_000_000,
            coinbase: Address([0x77; 32]),
            anchor_block_number: 500,
            raw_tx_list_hash: txs.hash(),
            parent_preconfirmation_hash: head.preconfirmation_hash,
            submission_window_end: 1_100,
            prover_auth: Address([5; 32]),
            proposal_id: 1,
        };
        let commitment = SignedCommitment::sign(
            CommitmentPayload {
                preconfirmation: preconf,
                slasher_address: SLASHER,
            },
            key,
        );

        assert!(matches!(
            apply(&mut fixture, &commitment, &txs),
            Err(InapplicableCommitment::CoinbaseMismatch)
        ));
    }
}
