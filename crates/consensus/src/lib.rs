//! Preconfirmation consensus core
//!
//! Architecture:
//! - The lookahead schedule says who may sign commitments for each window
//! - The chain state tracker holds the tentative head and applied history
//! - The commitment verifier applies signed commitments to the tracker
//! - The reorg reconciler replays blocks whose L1 anchors were invalidated
//! - The equivocation classifier judges preconfed against L1-settled records
//! - The fair-exchange overseer blacklists withholding operators
//! - The chain driver serializes all of the above into one application queue

pub mod classifier;
pub mod driver;
pub mod engine;
pub mod gossip;
pub mod lookahead;
pub mod overseer;
pub mod reorg;
pub mod tracker;
pub mod verifier;

pub use classifier::{classify, BeaconFactSource, EvidenceLog, FaultMonitor, RecordSource, SettledRecords};
pub use driver::{unix_now, ChainDriver, CommitmentSender, ReorgSender};
pub use engine::{EngineError, ExecutionEngine};
pub use gossip::{GossipClient, GossipServer};
pub use lookahead::{FallbackPolicy, Lookahead, LookaheadProvider, SlotTiming, WhitelistEntry};
pub use overseer::{Overseer, OverseerConfig};
pub use reorg::{AnchorSource, ReconcileOutcome, ReorgReconciler, RetryPolicy};
pub use tracker::{AppliedBlock, ChainStateTracker, TrackerSnapshot};
pub use verifier::{Accepted, CommitmentVerifier, InapplicableCommitment, VerifierConfig, VerifierState};
