//! Signed preconfirmation commitments and raw transaction lists

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::primitives::{hash_of, Address, Hash, Signature, ZERO_HASH};

/// A single preconfirmation: the promise that a block with exactly this
/// content will be submitted to L1 within the named window.
///
/// Instances form an append-only chain of custody: each
/// `parent_preconfirmation_hash` must equal the hash of the immediately
/// preceding accepted instance.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Preconfirmation {
    /// End-of-preconfirmation marker: no further preconfs follow in this window
    pub eop: bool,
    /// L2 block number this commitment derives
    pub block_number: u64,
    /// Block timestamp (unix seconds)
    pub timestamp: u64,
    /// Block gas limit
    pub gas_limit: u64,
    /// Block coinbase, must match the committer of the active lookahead slot
    pub coinbase: Address,
    /// L1 block whose state is imported into this block
    pub anchor_block_number: u64,
    /// Hash of the raw transaction list, `ZERO_HASH` for EOP-only commitments
    pub raw_tx_list_hash: Hash,
    /// Hash of the previous accepted preconfirmation
    pub parent_preconfirmation_hash: Hash,
    /// End of the submission window this commitment belongs to
    pub submission_window_end: u64,
    /// Prover authorization for the derived block
    pub prover_auth: Address,
    /// Proposal this block belongs to on L1
    pub proposal_id: u64,
}

impl Preconfirmation {
    /// Hash of this preconfirmation, the chain-of-custody link
    pub fn hash(&self) -> Hash {
        hash_of(self)
    }

    /// An EOP-only commitment carries no block content, only the handover
    /// signal; it is exempt from all block-content checks.
    pub fn is_eop_only(&self) -> bool {
        self.eop && self.raw_tx_list_hash == ZERO_HASH
    }
}

/// The signed payload: the preconfirmation plus the slasher the committer
/// consents to be judged by.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct CommitmentPayload {
    pub preconfirmation: Preconfirmation,
    /// Canonical preconf-slasher address the commitment is directed at
    pub slasher_address: Address,
}

impl CommitmentPayload {
    pub fn hash(&self) -> Hash {
        hash_of(self)
    }
}

/// Authenticated envelope around a commitment payload
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SignedCommitment {
    pub payload: CommitmentPayload,
    /// Signature over `payload.hash()`
    pub signature: Signature,
}

impl SignedCommitment {
    /// Sign a payload with the committer's key
    pub fn sign(payload: CommitmentPayload, key: &SigningKey) -> Self {
        let signature = Signature::sign(key, &payload.hash());
        Self { payload, signature }
    }

    /// Verify the envelope against the expected committer
    pub fn verify(&self, committer: &Address) -> bool {
        self.signature.verify(committer, &self.payload.hash())
    }

    pub fn preconfirmation(&self) -> &Preconfirmation {
        &self.payload.preconfirmation
    }
}

/// A raw transaction, opaque bytes prior to execution-time filtering
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct RawTransaction(pub Vec<u8>);

/// Ordered, unfiltered transaction list; possibly invalid or duplicate
/// entries are dropped at execution time, not here. Authenticated only via
/// its hash matching `raw_tx_list_hash`.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct RawTxList(pub Vec<RawTransaction>);

impl RawTxList {
    pub fn hash(&self) -> Hash {
        hash_of(self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
