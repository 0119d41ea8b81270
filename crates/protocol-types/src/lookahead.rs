//! Lookahead schedule entries

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Hash};

/// One entry of the lookahead schedule: the operator elected to preconf for
/// the slot ending at `submission_window_end`. Immutable once committed for
/// an epoch unless the operator is slashed and replaced.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct LookaheadSlot {
    /// The operator authorized to sign commitments for this slot
    pub committer: Address,
    /// End of the slot's submission window (unix seconds)
    pub submission_window_end: u64,
    /// Registry root the operator's collateral is booked under
    pub registration_root: Hash,
    /// Leaf index of the operator's validator key in the registry
    pub validator_leaf_index: u64,
}
