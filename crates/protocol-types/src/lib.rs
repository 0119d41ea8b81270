//! Shared protocol types for the preconfirmation core
//!
//! Everything that crosses a crate boundary lives here:
//! - Primitives: operator addresses, hashes, signatures
//! - Preconfirmation commitments and raw transaction lists
//! - Chain head state, block headers, and durable block records
//! - Fault kinds and slashing evidence
//! - Wire messages for commitment gossip and reorg notifications

pub mod block;
pub mod commitment;
pub mod fault;
pub mod lookahead;
pub mod message;
pub mod primitives;

pub use block::{AnchorInfo, BlockHeader, BlockManifest, BlockRecord, ParentState};
pub use commitment::{CommitmentPayload, Preconfirmation, RawTransaction, RawTxList, SignedCommitment};
pub use fault::{FaultEvidence, FaultKind, FaultResponsibility, Verdict};
pub use lookahead::LookaheadSlot;
pub use message::{GossipMessage, ReorgNotification};
pub use primitives::{hash_of, Address, Hash, Signature, ZERO_HASH};
