//! Chain driver: the single application queue
//!
//! Commitments may arrive concurrently from the network; they are funneled
//! into one queue here and applied in arrival order. Reorg notifications
//! travel on their own channel and preempt queued application: once one is
//! received, commitments wait until reconciliation finishes against the
//! corrected head.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use protocol_types::{ParentState, RawTxList, ReorgNotification, SignedCommitment};
use tokio::sync::{broadcast, mpsc};

use crate::engine::ExecutionEngine;
use crate::lookahead::LookaheadProvider;
use crate::reorg::{AnchorSource, ReconcileOutcome, ReorgReconciler};
use crate::tracker::ChainStateTracker;
use crate::verifier::{Accepted, CommitmentVerifier};

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Handle for feeding commitments into the application queue
#[derive(Clone)]
pub struct CommitmentSender {
    sender: mpsc::Sender<(SignedCommitment, RawTxList)>,
}

impl CommitmentSender {
    pub async fn send(&self, commitment: SignedCommitment, tx_list: RawTxList) -> bool {
        self.sender.send((commitment, tx_list)).await.is_ok()
    }

    pub fn try_send(&self, commitment: SignedCommitment, tx_list: RawTxList) -> bool {
        self.sender.try_send((commitment, tx_list)).is_ok()
    }
}

/// Handle for injecting reorg notifications
#[derive(Clone)]
pub struct ReorgSender {
    sender: mpsc::Sender<ReorgNotification>,
}

impl ReorgSender {
    pub async fn send(&self, notification: ReorgNotification) -> bool {
        self.sender.send(notification).await.is_ok()
    }
}

pub struct ChainDriver<L, E, A>
where
    L: LookaheadProvider,
    E: ExecutionEngine,
    A: AnchorSource,
{
    tracker: Arc<ChainStateTracker>,
    verifier: CommitmentVerifier<L, E>,
    reconciler: ReorgReconciler<E, A>,
    anchors: Arc<A>,
    commitment_rx: mpsc::Receiver<(SignedCommitment, RawTxList)>,
    commitment_tx: mpsc::Sender<(SignedCommitment, RawTxList)>,
    reorg_rx: mpsc::Receiver<ReorgNotification>,
    reorg_tx: mpsc::Sender<ReorgNotification>,
    head_tx: broadcast::Sender<ParentState>,
}

impl<L, E, A> ChainDriver<L, E, A>
where
    L: LookaheadProvider,
    E: ExecutionEngine,
    A: AnchorSource,
{
    pub fn new(
        tracker: Arc<ChainStateTracker>,
        verifier: CommitmentVerifier<L, E>,
        reconciler: ReorgReconciler<E, A>,
        anchors: Arc<A>,
    ) -> Self {
        let (commitment_tx, commitment_rx) = mpsc::channel(1024);
        let (reorg_tx, reorg_rx) = mpsc::channel(16);
        let (head_tx, _) = broadcast::channel(64);
        Self {
            tracker,
            verifier,
            reconciler,
            anchors,
            commitment_rx,
            commitment_tx,
            reorg_rx,
            reorg_tx,
            head_tx,
        }
    }

    pub fn commitment_sender(&self) -> CommitmentSender {
        CommitmentSender {
            sender: self.commitment_tx.clone(),
        }
    }

    pub fn reorg_sender(&self) -> ReorgSender {
        ReorgSender {
            sender: self.reorg_tx.clone(),
        }
    }

    /// Subscribe to head updates
    pub fn subscribe_head(&self) -> broadcast::Receiver<ParentState> {
        self.head_tx.subscribe()
    }

    pub fn tracker(&self) -> Arc<ChainStateTracker> {
        self.tracker.clone()
    }

    /// Run the application loop. Each branch runs to completion before the
    /// next event is taken; the biased select gives reorg notifications
    /// priority over queued commitments.
    pub async fn run(mut self) {
        tracing::info!(
            "Chain driver running at head {}",
            self.tracker.head_block_number()
        );
        loop {
            tokio::select! {
                biased;

                notification = self.reorg_rx.recv() => {
                    match notification {
                        Some(notification) => self.handle_reorg(notification).await,
                        None => break,
                    }
                }

                pair = self.commitment_rx.recv() => {
                    match pair {
                        Some((commitment, tx_list)) => {
                            self.handle_commitment(commitment, tx_list).await
                        }
                        None => break,
                    }
                }
            }
        }
        tracing::info!("Chain driver stopped");
    }

    async fn handle_commitment(&mut self, commitment: SignedCommitment, tx_list: RawTxList) {
        let preconf = commitment.preconfirmation();

        // Anchor data is staged before the tracker is touched; EOP-only
        // commitments derive nothing and need none
        let anchor = if preconf.is_eop_only() {
            None
        } else {
            match self.anchors.anchor_info(preconf.anchor_block_number).await {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::debug!("Anchor staging failed: {}", e);
                    None
                }
            }
        };

        let now = unix_now();
        match self
            .verifier
            .verify_and_apply(&self.tracker, &commitment, &tx_list, anchor, now)
        {
            Ok(Accepted::Block { head, rotated }) => {
                tracing::info!(
                    "Applied block {} ({} txs{})",
                    head.header.number,
                    tx_list.len(),
                    if rotated { ", handover" } else { "" }
                );
                let _ = self.head_tx.send(head);
            }
            Ok(Accepted::EopOnly) => {
                tracing::info!("Handover signal accepted, rotation advanced");
                let _ = self.head_tx.send(self.tracker.head());
            }
            // Expected under reordering and duplication; not a security event
            Err(reason) => {
                tracing::debug!(
                    "Commitment for block {} not applicable: {}",
                    preconf.block_number,
                    reason
                );
            }
        }
    }

    async fn handle_reorg(&mut self, notification: ReorgNotification) {
        match self.reconciler.reconcile(&self.tracker, &notification).await {
            Ok(ReconcileOutcome::Clean) => {
                tracing::debug!("Reorg notification did not affect the tentative chain");
            }
            Ok(ReconcileOutcome::Replayed { from, to, new_head }) => {
                tracing::warn!("Reorg replayed blocks {}..={}", from, to);
                let _ = self.head_tx.send(new_head);
            }
            Err(e) => {
                tracing::error!("Reorg reconciliation failed, head is untrusted: {}", e);
            }
        }
    }
}
