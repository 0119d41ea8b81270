//! Execution collaborator seam
//!
//! Block execution is pluggable: the verifier and the reorg reconciler only
//! ever see this trait. The in-repo deterministic engine lives in the
//! execution crate; a real deployment substitutes an EVM-backed one.

use protocol_types::{BlockManifest, ParentState};
use thiserror::Error;

/// Derivation-constraint or execution failure for a single block.
///
/// The constraint set is provisional and owned by the engine, not the
/// verifier: timestamp progression, gas-limit delta bounds, coinbase match,
/// and prover-authorization well-formedness all live behind this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("timestamp {got} regresses from parent timestamp {parent}")]
    TimestampRegression { got: u64, parent: u64 },

    #[error("gas limit {got} outside delta bound {max_delta} from parent {parent}")]
    GasLimitOutOfBounds {
        got: u64,
        parent: u64,
        max_delta: u64,
    },

    #[error("block coinbase does not match the committed coinbase")]
    CoinbaseMismatch,

    #[error("prover authorization is malformed")]
    MalformedProverAuth,

    #[error("block execution failed: {0}")]
    Execution(String),
}

/// Validates derivation constraints, synthesizes the anchor transaction,
/// executes the block, and returns the updated head.
///
/// Implementations must be pure compute: the manifest already carries the
/// pre-staged anchor data, and callers invoke this while holding the
/// tracker's exclusive access.
pub trait ExecutionEngine: Send + Sync {
    fn process_manifest(
        &self,
        manifest: &BlockManifest,
        parent: &ParentState,
    ) -> Result<ParentState, EngineError>;
}
