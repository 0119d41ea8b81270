//! Equivocation classifier
//!
//! Judges a preconfed block record against the record that later settled on
//! L1 for the same block number. Pure over its inputs: given the same
//! histories and beacon facts it always returns the same verdict.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use protocol_types::{BlockRecord, FaultEvidence, FaultKind, FaultResponsibility, Verdict};
use tokio::sync::mpsc;

use crate::tracker::ChainStateTracker;

/// Read access to a per-block-number record history
pub trait RecordSource {
    fn record(&self, block_number: u64) -> Option<BlockRecord>;
}

impl RecordSource for ChainStateTracker {
    fn record(&self, block_number: u64) -> Option<BlockRecord> {
        self.preconfed(block_number)
    }
}

/// The L1-settled side of the comparison, with a watermark for incremental
/// scanning
pub trait SettledRecords: RecordSource + Send + Sync {
    /// Highest block number with a settled record, if any
    fn latest_settled(&self) -> Option<u64>;
}

/// Beacon-chain slot-emptiness facts. L1-only; never consulted on the
/// L2-side fast path, only during Liveness/Safety sub-classification.
pub trait BeaconFactSource: Send + Sync {
    fn is_slot_empty(&self, slot_timestamp: u64) -> bool;
}

fn responsibility(beacon: &dyn BeaconFactSource, window_end: u64) -> FaultResponsibility {
    if beacon.is_slot_empty(window_end) {
        FaultResponsibility::Liveness
    } else {
        FaultResponsibility::Safety
    }
}

fn same_parent_fields(preconfed: &BlockRecord, submitted: &BlockRecord) -> bool {
    preconfed.raw_tx_list_hash == submitted.raw_tx_list_hash
        && preconfed.anchor_block_number == submitted.anchor_block_number
        && preconfed.submission_window_end == submitted.submission_window_end
}

/// Classify the divergence (if any) between the preconfed and the submitted
/// record at `block_number`.
///
/// First match wins. Divergence is traced back to its origin before any
/// verdict is issued, so an innocent downstream preconfer is never blamed
/// for an upstream operator's equivocation.
pub fn classify(
    preconfed: &dyn RecordSource,
    submitted: &dyn RecordSource,
    beacon: &dyn BeaconFactSource,
    block_number: u64,
) -> Verdict {
    let mut n = block_number;
    loop {
        let Some(pre) = preconfed.record(n) else {
            return Verdict::NoFault;
        };
        let Some(sub) = submitted.record(n) else {
            return Verdict::NoFault;
        };

        if n > 0 {
            // Attribution guard: if the parents already disagree, the
            // divergence started upstream; walk back to its origin.
            if let (Some(pre_parent), Some(sub_parent)) =
                (preconfed.record(n - 1), submitted.record(n - 1))
            {
                if !same_parent_fields(&pre_parent, &sub_parent) {
                    n -= 1;
                    continue;
                }
            }
            // An earlier-window block settled at this height: something was
            // inserted after a handover, which is the parent's story.
            if sub.submission_window_end < pre.submission_window_end {
                n -= 1;
                continue;
            }
        }

        // Missed submission: settlement landed in a later window, so the
        // original preconfer never got their block in
        if sub.submission_window_end > pre.submission_window_end {
            return Verdict::Fault {
                block_number: n,
                kind: FaultKind::MissedSubmission(responsibility(
                    beacon,
                    pre.submission_window_end,
                )),
            };
        }

        let next_submitted = submitted.record(n + 1);

        // Missing EOP: the window closed underneath a preconfer who never
        // signaled handover
        if let Some(next) = &next_submitted {
            if next.submission_window_end > pre.submission_window_end && !pre.eop {
                return Verdict::Fault {
                    block_number: n,
                    kind: FaultKind::MissingEop(responsibility(
                        beacon,
                        pre.submission_window_end,
                    )),
                };
            }
        }

        // Invalid EOP: a same-window successor after the handover signal is
        // an unauthorized post-handover submission; fully slashable
        if pre.eop {
            if let Some(next) = &next_submitted {
                if next.submission_window_end == pre.submission_window_end {
                    return Verdict::Fault {
                        block_number: n,
                        kind: FaultKind::InvalidEop,
                    };
                }
            }
        }

        // Block commitment mismatch. EOP-only placeholders carry no content
        // and are exempt by definition.
        if !pre.eop_only && !sub.eop_only && !pre.same_content(&sub) {
            return Verdict::Fault {
                block_number: n,
                kind: FaultKind::BlockCommitmentMismatch,
            };
        }

        return Verdict::NoFault;
    }
}

/// Append-only in-memory log of emitted evidence, surfaced over RPC
#[derive(Default)]
pub struct EvidenceLog {
    entries: RwLock<Vec<FaultEvidence>>,
}

impl EvidenceLog {
    pub fn push(&self, evidence: FaultEvidence) {
        self.entries.write().push(evidence);
    }

    pub fn all(&self) -> Vec<FaultEvidence> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Walks settled records as they land, classifies each block number once,
/// and hands confirmed faults to the slashing relay.
pub struct FaultMonitor<S: SettledRecords, B: BeaconFactSource> {
    tracker: Arc<ChainStateTracker>,
    settled: Arc<S>,
    beacon: Arc<B>,
    evidence_log: Arc<EvidenceLog>,
    relay_tx: mpsc::Sender<FaultEvidence>,
    next_unchecked: u64,
    reported: HashSet<u64>,
    poll_interval: Duration,
}

impl<S: SettledRecords, B: BeaconFactSource> FaultMonitor<S, B> {
    pub fn new(
        tracker: Arc<ChainStateTracker>,
        settled: Arc<S>,
        beacon: Arc<B>,
        evidence_log: Arc<EvidenceLog>,
        relay_tx: mpsc::Sender<FaultEvidence>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            tracker,
            settled,
            beacon,
            evidence_log,
            relay_tx,
            next_unchecked: 1,
            reported: HashSet::new(),
            poll_interval,
        }
    }

    /// Classify every newly settled block number. Returns the evidence
    /// emitted by this pass.
    pub fn scan(&mut self) -> Vec<FaultEvidence> {
        let Some(latest) = self.settled.latest_settled() else {
            return Vec::new();
        };

        let mut emitted = Vec::new();
        while self.next_unchecked <= latest {
            let n = self.next_unchecked;
            self.next_unchecked += 1;

            let verdict = classify(
                self.tracker.as_ref(),
                self.settled.as_ref(),
                self.beacon.as_ref(),
                n,
            );
            let Verdict::Fault { block_number, kind } = verdict else {
                continue;
            };
            if !self.reported.insert(block_number) {
                continue;
            }
            match self.build_evidence(block_number, kind) {
                Some(evidence) => {
                    tracing::warn!(
                        "Fault at block {}: {} (registration root {})",
                        block_number,
                        kind,
                        hex::encode(&evidence.registration_root[..8])
                    );
                    self.evidence_log.push(evidence.clone());
                    emitted.push(evidence);
                }
                None => {
                    tracing::error!(
                        "Fault at block {} classified as {} but local history is incomplete",
                        block_number,
                        kind
                    );
                }
            }
        }

        for evidence in &emitted {
            if let Err(e) = self.relay_tx.try_send(evidence.clone()) {
                tracing::error!("Failed to queue evidence for relay: {}", e);
            }
        }
        emitted
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            self.scan();
        }
    }

    fn build_evidence(&self, block_number: u64, kind: FaultKind) -> Option<FaultEvidence> {
        let block = self.tracker.applied_block(block_number)?;
        // For an invalid EOP the offending artifacts are the handover
        // commitment and the unauthorized successor on L1
        let (commitment, submitted) = match kind {
            FaultKind::InvalidEop => (
                self.tracker
                    .eop_commitment(block_number)
                    .unwrap_or(block.commitment),
                self.settled.record(block_number + 1)?,
            ),
            _ => (block.commitment, self.settled.record(block_number)?),
        };
        Some(FaultEvidence {
            registration_root: block.registration_root,
            commitment,
            kind,
            submitted,
        })
    }
}
