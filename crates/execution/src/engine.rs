//! Deterministic block derivation engine
//!
//! Stands in for EVM-equivalent execution: it validates the derivation
//! rules, filters the raw transaction list, synthesizes the anchor
//! transaction, and folds everything into a deterministic state root. A
//! production node swaps this for an engine backed by a real execution
//! client; the verifier cannot tell the difference.

use preconf_consensus::{EngineError, ExecutionEngine};
use protocol_types::{
    hash_of, Address, BlockHeader, BlockManifest, Hash, ParentState, RawTransaction,
};

use crate::DEFAULT_MAX_GAS_LIMIT_DELTA;

/// Derivation constraints. Provisional by design: the rule set belongs to
/// the execution layer and may move as derivation is reworked.
#[derive(Debug, Clone)]
pub struct DerivationRules {
    /// Max distance a block's gas limit may move from its parent's
    pub max_gas_limit_delta: u64,
    /// Whether a block may reuse its parent's timestamp
    pub allow_equal_timestamp: bool,
}

impl Default for DerivationRules {
    fn default() -> Self {
        Self {
            max_gas_limit_delta: DEFAULT_MAX_GAS_LIMIT_DELTA,
            allow_equal_timestamp: true,
        }
    }
}

impl DerivationRules {
    fn check_timestamp(&self, got: u64, parent: u64) -> Result<(), EngineError> {
        let ok = if self.allow_equal_timestamp {
            got >= parent
        } else {
            got > parent
        };
        if ok {
            Ok(())
        } else {
            Err(EngineError::TimestampRegression { got, parent })
        }
    }

    fn check_gas_limit(&self, got: u64, parent: u64) -> Result<(), EngineError> {
        // The genesis gas limit seeds the chain; afterwards moves are bounded
        if parent != 0 && got.abs_diff(parent) > self.max_gas_limit_delta {
            return Err(EngineError::GasLimitOutOfBounds {
                got,
                parent,
                max_delta: self.max_gas_limit_delta,
            });
        }
        Ok(())
    }
}

pub struct DeterministicEngine {
    rules: DerivationRules,
}

impl DeterministicEngine {
    pub fn new(rules: DerivationRules) -> Self {
        Self { rules }
    }

    /// The anchor transaction imports the L1 anchor block's identity into
    /// the L2 state; it is always the first transaction of the block.
    fn synthesize_anchor_tx(anchor_number: u64, anchor_hash: &Hash) -> RawTransaction {
        let mut bytes = Vec::with_capacity(8 + 8 + 32);
        bytes.extend_from_slice(b"anchor:\0");
        bytes.extend_from_slice(&anchor_number.to_le_bytes());
        bytes.extend_from_slice(anchor_hash);
        RawTransaction(bytes)
    }

    /// Execution-time filtering: the raw list may carry duplicates and
    /// empty entries; they are dropped, not rejected
    fn filter_transactions(transactions: &[RawTransaction]) -> Vec<&RawTransaction> {
        let mut seen = std::collections::HashSet::new();
        transactions
            .iter()
            .filter(|tx| !tx.0.is_empty() && seen.insert(hash_of(*tx)))
            .collect()
    }
}

impl Default for DeterministicEngine {
    fn default() -> Self {
        Self::new(DerivationRules::default())
    }
}

impl ExecutionEngine for DeterministicEngine {
    fn process_manifest(
        &self,
        manifest: &BlockManifest,
        parent: &ParentState,
    ) -> Result<ParentState, EngineError> {
        let preconf = &manifest.preconfirmation;

        self.rules
            .check_timestamp(preconf.timestamp, parent.header.timestamp)?;
        self.rules
            .check_gas_limit(preconf.gas_limit, parent.header.gas_limit)?;
        if preconf.coinbase == Address::ZERO {
            return Err(EngineError::CoinbaseMismatch);
        }
        if preconf.prover_auth == Address::ZERO {
            return Err(EngineError::MalformedProverAuth);
        }

        let anchor_tx =
            Self::synthesize_anchor_tx(manifest.anchor.block_number, &manifest.anchor.block_hash);
        let executed = Self::filter_transactions(&manifest.transactions);

        // Deterministic state transition: fold the anchor tx and the
        // filtered list into the parent's state root
        let mut hasher = blake3::Hasher::new();
        hasher.update(&parent.header.state_root);
        hasher.update(&anchor_tx.0);
        for tx in &executed {
            hasher.update(&tx.0);
        }
        hasher.update(&preconf.coinbase.0);
        hasher.update(&preconf.gas_limit.to_le_bytes());
        let state_root = *hasher.finalize().as_bytes();

        let header = BlockHeader {
            number: parent.header.number + 1,
            timestamp: preconf.timestamp,
            gas_limit: preconf.gas_limit,
            coinbase: preconf.coinbase,
            anchor_block_number: manifest.anchor.block_number,
            anchor_hash: manifest.anchor.block_hash,
            parent_hash: parent.header.hash(),
            state_root,
        };

        tracing::trace!(
            "Derived block {}: {} of {} txs executed",
            header.number,
            executed.len(),
            manifest.transactions.len()
        );

        Ok(ParentState {
            header,
            preconfirmation_hash: preconf.hash(),
            proposal_id: preconf.proposal_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol_types::{AnchorInfo, Preconfirmation, RawTxList};

    fn manifest(parent: &ParentState, mutate: impl FnOnce(&mut Preconfirmation)) -> BlockManifest {
        let tx_list = RawTxList(vec![RawTransaction(vec![1]), RawTransaction(vec![2])]);
        let mut preconf = Preconfirmation {
            eop: false,
            block_number: parent.header.number + 1,
            timestamp: parent.header.timestamp + 2,
            gas_limit: parent.header.gas_limit,
            coinbase: Address([1; 32]),
            anchor_block_number: 500,
            raw_tx_list_hash: tx_list.hash(),
            parent_preconfirmation_hash: parent.preconfirmation_hash,
            submission_window_end: parent.header.timestamp + 12,
            prover_auth: Address([2; 32]),
            proposal_id: 1,
        };
        mutate(&mut preconf);
        BlockManifest::new(
            preconf,
            tx_list.0,
            AnchorInfo {
                block_number: 500,
                block_hash: [0xAB; 32],
            },
        )
    }

    fn genesis() -> ParentState {
        ParentState::genesis(1_000, 30_000_000)
    }

    #[test]
    fn derives_a_child_block() {
        let engine = DeterministicEngine::default();
        let parent = genesis();

        let head = engine.process_manifest(&manifest(&parent, |_| {}), &parent).unwrap();
        assert_eq!(head.header.number, 1);
        assert_eq!(head.header.parent_hash, parent.header.hash());
        assert_eq!(head.header.anchor_hash, [0xAB; 32]);
        assert_ne!(head.header.state_root, parent.header.state_root);
    }

    #[test]
    fn execution_is_deterministic() {
        let engine = DeterministicEngine::default();
        let parent = genesis();
        let manifest = manifest(&parent, |_| {});

        let first = engine.process_manifest(&manifest, &parent).unwrap();
        let second = engine.process_manifest(&manifest, &parent).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_timestamp_regression() {
        let engine = DeterministicEngine::default();
        let parent = genesis();

        let result = engine.process_manifest(
            &manifest(&parent, |p| p.timestamp = parent.header.timestamp - 1),
            &parent,
        );
        assert!(matches!(result, Err(EngineError::TimestampRegression { .. })));
    }

    #[test]
    fn rejects_gas_limit_jump() {
        let engine = DeterministicEngine::default();
        let parent = genesis();

        let result = engine.process_manifest(
            &manifest(&parent, |p| {
                p.gas_limit = parent.header.gas_limit + DEFAULT_MAX_GAS_LIMIT_DELTA + 1
            }),
            &parent,
        );
        assert!(matches!(result, Err(EngineError::GasLimitOutOfBounds { .. })));
    }

    #[test]
    fn rejects_malformed_prover_auth() {
        let engine = DeterministicEngine::default();
        let parent = genesis();

        let result = engine.process_manifest(
            &manifest(&parent, |p| p.prover_auth = Address::ZERO),
            &parent,
        );
        assert!(matches!(result, Err(EngineError::MalformedProverAuth)));
    }

    #[test]
    fn duplicate_transactions_do_not_change_the_root() {
        let engine = DeterministicEngine::default();
        let parent = genesis();

        let clean = manifest(&parent, |_| {});
        let mut with_duplicates = clean.clone();
        with_duplicates
            .transactions
            .push(with_duplicates.transactions[0].clone());
        with_duplicates.transactions.push(RawTransaction(Vec::new()));

        let a = engine.process_manifest(&clean, &parent).unwrap();
        let b = engine.process_manifest(&with_duplicates, &parent).unwrap();
        assert_eq!(a.header.state_root, b.header.state_root);
    }

    #[test]
    fn corrected_anchor_changes_the_root() {
        let engine = DeterministicEngine::default();
        let parent = genesis();

        let original = manifest(&parent, |_| {});
        let mut corrected = original.clone();
        corrected.anchor.block_hash = [0xCD; 32];

        let a = engine.process_manifest(&original, &parent).unwrap();
        let b = engine.process_manifest(&corrected, &parent).unwrap();
        assert_ne!(a.header.state_root, b.header.state_root);
        // Same commitment, so the custody chain is identical
        assert_eq!(a.preconfirmation_hash, b.preconfirmation_hash);
    }
}
