//! Fault classification verdicts and slashing evidence

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::block::BlockRecord;
use crate::commitment::SignedCommitment;
use crate::primitives::Hash;

/// Whether a fault is a missed opportunity or a deliberate omission.
/// Liveness faults are penalized strictly less than safety faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum FaultResponsibility {
    /// The L1 slot was empty; the operator never had the chance
    Liveness,
    /// The L1 slot was filled without the promised block
    Safety,
}

/// The four equivocation fault categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum FaultKind {
    /// Settled block content differs from what was preconfed
    BlockCommitmentMismatch,
    /// The preconfed block never reached L1 in its window
    MissedSubmission(FaultResponsibility),
    /// A block was submitted after the window's EOP signal
    InvalidEop,
    /// The window ended without a handover signal
    MissingEop(FaultResponsibility),
}

impl FaultKind {
    /// Liveness faults carry the reduced penalty; everything else is full
    pub fn is_liveness(&self) -> bool {
        matches!(
            self,
            FaultKind::MissedSubmission(FaultResponsibility::Liveness)
                | FaultKind::MissingEop(FaultResponsibility::Liveness)
        )
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::BlockCommitmentMismatch => write!(f, "block commitment mismatch"),
            FaultKind::MissedSubmission(FaultResponsibility::Liveness) => {
                write!(f, "missed submission (liveness)")
            }
            FaultKind::MissedSubmission(FaultResponsibility::Safety) => {
                write!(f, "missed submission (safety)")
            }
            FaultKind::InvalidEop => write!(f, "invalid EOP"),
            FaultKind::MissingEop(FaultResponsibility::Liveness) => {
                write!(f, "missing EOP (liveness)")
            }
            FaultKind::MissingEop(FaultResponsibility::Safety) => {
                write!(f, "missing EOP (safety)")
            }
        }
    }
}

/// Classifier output for one block-number comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    NoFault,
    /// A fault at `block_number`; attribution may have walked back from the
    /// block number the comparison started at
    Fault { block_number: u64, kind: FaultKind },
}

/// Immutable evidence package forwarded across the bridge for slashing
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct FaultEvidence {
    /// Registry root the offending operator's collateral is booked under
    pub registration_root: Hash,
    /// The offending operator's own signed commitment
    pub commitment: SignedCommitment,
    pub kind: FaultKind,
    /// The L1-settled record the commitment is judged against
    pub submitted: BlockRecord,
}
