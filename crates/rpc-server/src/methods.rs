//! RPC Methods - JSON-RPC method handlers

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use preconf_consensus::{
    CommitmentSender, ChainStateTracker, EvidenceLog, Lookahead, LookaheadProvider,
};
use protocol_types::{FaultEvidence, LookaheadSlot, RawTxList, SignedCommitment};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RPC context shared across handlers
pub struct RpcContext {
    pub tracker: Arc<ChainStateTracker>,
    pub lookahead: Arc<Lookahead>,
    pub evidence_log: Arc<EvidenceLog>,
    pub commitment_sender: CommitmentSender,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("method not found")]
    MethodNotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

// ============ Request/Response Types ============

#[derive(Debug, Serialize, Deserialize)]
pub struct HeadResponse {
    #[serde(rename = "blockNumber")]
    pub block_number: u64,
    pub timestamp: u64,
    #[serde(rename = "preconfirmationHash")]
    pub preconfirmation_hash: String,
    #[serde(rename = "stateRoot")]
    pub state_root: String,
    #[serde(rename = "proposalId")]
    pub proposal_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeadStatusResponse {
    #[serde(rename = "blockNumber")]
    pub block_number: u64,
    /// `trusted` normally; `stale` while an unreconciled reorg suspends the
    /// chain and the head must not be consumed downstream
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LookaheadResponse {
    pub current: Option<LookaheadSlot>,
    pub next: Option<LookaheadSlot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitCommitmentRequest {
    /// Base64-encoded borsh `SignedCommitment`
    pub commitment: String,
    /// Base64-encoded borsh `RawTxList`
    #[serde(rename = "txList")]
    pub tx_list: String,
}

// ============ RPC Handlers ============

/// Handle getHealth RPC method
pub fn handle_get_health(_ctx: &RpcContext) -> Result<String, RpcError> {
    Ok("ok".to_string())
}

/// Handle getHead RPC method
pub fn handle_get_head(ctx: &RpcContext) -> Result<HeadResponse, RpcError> {
    let head = ctx.tracker.head();
    Ok(HeadResponse {
        block_number: head.header.number,
        timestamp: head.header.timestamp,
        preconfirmation_hash: hex::encode(head.preconfirmation_hash),
        state_root: hex::encode(head.header.state_root),
        proposal_id: head.proposal_id,
    })
}

/// Handle getHeadStatus RPC method
pub fn handle_get_head_status(ctx: &RpcContext) -> Result<HeadStatusResponse, RpcError> {
    let status = if ctx.tracker.is_suspended() {
        "stale"
    } else {
        "trusted"
    };
    Ok(HeadStatusResponse {
        block_number: ctx.tracker.head_block_number(),
        status: status.to_string(),
    })
}

/// Handle getLookahead RPC method
pub fn handle_get_lookahead(ctx: &RpcContext, now: u64) -> Result<LookaheadResponse, RpcError> {
    let current = ctx.lookahead.current_preconfer(now);
    let next = current
        .as_ref()
        .and_then(|slot| ctx.lookahead.next_preconfer(slot));
    Ok(LookaheadResponse { current, next })
}

/// Handle getFaultEvidence RPC method
pub fn handle_get_fault_evidence(ctx: &RpcContext) -> Result<Vec<FaultEvidence>, RpcError> {
    Ok(ctx.evidence_log.all())
}

/// Handle submitCommitment RPC method
pub fn handle_submit_commitment(
    ctx: &RpcContext,
    params: SubmitCommitmentRequest,
) -> Result<String, RpcError> {
    let commitment_bytes = BASE64
        .decode(&params.commitment)
        .map_err(|_| RpcError::InvalidParams("Invalid base64 commitment".to_string()))?;
    let commitment: SignedCommitment = borsh::from_slice(&commitment_bytes)
        .map_err(|_| RpcError::InvalidParams("Invalid commitment encoding".to_string()))?;

    let tx_list_bytes = BASE64
        .decode(&params.tx_list)
        .map_err(|_| RpcError::InvalidParams("Invalid base64 transaction list".to_string()))?;
    let tx_list: RawTxList = borsh::from_slice(&tx_list_bytes)
        .map_err(|_| RpcError::InvalidParams("Invalid transaction list encoding".to_string()))?;

    let preconfirmation_hash = commitment.preconfirmation().hash();
    if !ctx.commitment_sender.try_send(commitment, tx_list) {
        return Err(RpcError::Internal("Application queue is full".to_string()));
    }

    Ok(hex::encode(preconfirmation_hash))
}
