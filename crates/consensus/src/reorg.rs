//! Reorg reconciliation
//!
//! When L1 invalidates anchor blocks, every tentative block that imported
//! one of them (and every descendant, by the custody-chain invariant) is
//! re-executed against the corrected anchor data. Anchor hashes are fetched
//! before the tracker is touched, so reconciliation never blocks on the
//! network while holding exclusive access.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use protocol_types::{AnchorInfo, BlockManifest, ParentState, ReorgNotification};
use thiserror::Error;

use crate::engine::ExecutionEngine;
use crate::tracker::{AppliedBlock, ChainStateTracker};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnchorFetchError {
    #[error("anchor data for L1 block {0} is unavailable")]
    Unavailable(u64),
}

/// Corrected anchor data source, typically backed by an L1 client
#[async_trait]
pub trait AnchorSource: Send + Sync {
    async fn anchor_info(&self, block_number: u64) -> Result<AnchorInfo, AnchorFetchError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No applied block imported an invalidated anchor
    Clean,
    /// The segment `[from, to]` was re-executed against corrected anchors
    Replayed {
        from: u64,
        to: u64,
        new_head: ParentState,
    },
}

#[derive(Debug, Error)]
pub enum ReorgError {
    #[error("anchor refetch exhausted for L1 block {0}; chain suspended")]
    AnchorRefetchExhausted(u64),

    #[error("replay of block {block_number} failed: {reason}")]
    ReplayFailed { block_number: u64, reason: String },
}

pub struct ReorgReconciler<E: ExecutionEngine, A: AnchorSource> {
    engine: Arc<E>,
    anchors: Arc<A>,
    retry: RetryPolicy,
}

impl<E: ExecutionEngine, A: AnchorSource> ReorgReconciler<E, A> {
    pub fn new(engine: Arc<E>, anchors: Arc<A>, retry: RetryPolicy) -> Self {
        Self {
            engine,
            anchors,
            retry,
        }
    }

    /// Replay every block affected by the notification. On anchor refetch
    /// exhaustion the tracker is suspended and forward progress stops until
    /// resolved; the process itself keeps running.
    pub async fn reconcile(
        &self,
        tracker: &ChainStateTracker,
        notification: &ReorgNotification,
    ) -> Result<ReconcileOutcome, ReorgError> {
        let affected = tracker.blocks_with_anchors(&notification.invalidated_anchors);
        let Some(&first) = affected.first() else {
            return Ok(ReconcileOutcome::Clean);
        };

        // Everything from the first affected block to the head replays
        let segment = tracker.blocks_from(first);
        tracing::warn!(
            "Reorg invalidated {} anchor(s); replaying {} block(s) from {}",
            notification.invalidated_anchors.len(),
            segment.len(),
            first
        );

        // Pre-stage corrected anchor data for the whole segment before
        // taking exclusive access
        let mut anchors: HashMap<u64, AnchorInfo> = HashMap::new();
        for block in &segment {
            let anchor_number = block.record.anchor_block_number;
            if anchors.contains_key(&anchor_number) {
                continue;
            }
            match self.fetch_with_retry(anchor_number).await {
                Ok(info) => {
                    anchors.insert(anchor_number, info);
                }
                Err(e) => {
                    tracker.suspend();
                    tracing::error!(
                        "Anchor refetch exhausted for L1 block {}; suspending the chain",
                        anchor_number
                    );
                    return Err(e);
                }
            }
        }

        let mut parent = tracker.parent_state_before(first);
        let mut replayed = Vec::with_capacity(segment.len());
        for block in segment {
            let anchor = anchors[&block.record.anchor_block_number];
            let manifest = BlockManifest::new(
                block.commitment.preconfirmation().clone(),
                block.tx_list.0.clone(),
                anchor,
            );
            let new_state = self
                .engine
                .process_manifest(&manifest, &parent)
                .map_err(|e| {
                    tracker.suspend();
                    ReorgError::ReplayFailed {
                        block_number: block.record.block_number,
                        reason: e.to_string(),
                    }
                })?;
            parent = new_state.clone();
            replayed.push(AppliedBlock {
                post_state: new_state,
                ..block
            });
        }

        let to = parent.header.number;
        tracker.commit_replayed(replayed);
        let new_head = tracker.head();
        tracing::info!(
            "Reorg reconciled: blocks {}..={} replayed, head state root updated",
            first,
            to
        );
        Ok(ReconcileOutcome::Replayed {
            from: first,
            to,
            new_head,
        })
    }

    async fn fetch_with_retry(&self, anchor_number: u64) -> Result<AnchorInfo, ReorgError> {
        let mut backoff = self.retry.initial_backoff;
        for attempt in 1..=self.retry.max_attempts {
            match self.anchors.anchor_info(anchor_number).await {
                Ok(info) => return Ok(info),
                Err(e) => {
                    tracing::warn!(
                        "Anchor fetch for L1 block {} failed (attempt {}/{}): {}",
                        anchor_number,
                        attempt,
                        self.retry.max_attempts,
                        e
                    );
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.retry.max_backoff);
                    }
                }
            }
        }
        Err(ReorgError::AnchorRefetchExhausted(anchor_number))
    }
}
