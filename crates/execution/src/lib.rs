//! L2 Execution - deterministic block derivation and state persistence
//!
//! This crate provides the in-repo implementation of the execution seam:
//! - Derivation-rule validation and deterministic block execution
//! - Sled-backed persistence of the tentative chain across restarts

pub mod engine;
pub mod persistence;

pub use engine::{DerivationRules, DeterministicEngine};
pub use persistence::{PersistentStore, TrackerPersistence};

/// Default bound on how far a block's gas limit may move from its parent's
pub const DEFAULT_MAX_GAS_LIMIT_DELTA: u64 = 1_000_000;
