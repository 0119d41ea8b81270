//! Slashing relay: carries fault evidence across the L2-to-L1 bridge
//!
//! Evidence is never dropped on transient failure; a genuine fault that
//! went unpunished because a relay hiccuped would break the protocol's
//! economics. Delivery retries with capped backoff until the L1 side
//! acknowledges.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use protocol_types::{Address, FaultEvidence};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::enforcement::{EnforcementContract, EnforcementError};

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("bridge delivery failed: {0}")]
    Delivery(String),

    #[error("enforcement rejected the message: {0}")]
    Rejected(#[from] EnforcementError),
}

/// The bridge transport. Implementations carry the sender identity with the
/// message; the receiving side decides whether to honor it.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    async fn slash_commitment(
        &self,
        origin: Address,
        evidence: &FaultEvidence,
    ) -> Result<(), BridgeError>;
}

/// Bridge wired directly to an in-process enforcement contract. Used in
/// tests and single-process deployments; a production node substitutes a
/// real message-bridge client.
pub struct InProcessBridge {
    contract: Arc<EnforcementContract>,
}

impl InProcessBridge {
    pub fn new(contract: Arc<EnforcementContract>) -> Self {
        Self { contract }
    }
}

#[async_trait]
impl BridgeClient for InProcessBridge {
    async fn slash_commitment(
        &self,
        origin: Address,
        evidence: &FaultEvidence,
    ) -> Result<(), BridgeError> {
        self.contract.execute(origin, evidence)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Identity presented as the bridge message origin
    pub sender: Address,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Give up after this many attempts; `None` retries forever
    pub max_attempts: Option<u32>,
}

pub struct SlashingRelay<B: BridgeClient> {
    bridge: Arc<B>,
    config: RelayConfig,
}

impl<B: BridgeClient> SlashingRelay<B> {
    pub fn new(bridge: Arc<B>, config: RelayConfig) -> Self {
        Self { bridge, config }
    }

    /// Deliver one evidence package, retrying until acknowledged
    pub async fn submit(&self, evidence: &FaultEvidence) -> Result<(), BridgeError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self
                .bridge
                .slash_commitment(self.config.sender, evidence)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        "Evidence for {} acknowledged by L1 (attempt {})",
                        evidence.kind,
                        attempt
                    );
                    return Ok(());
                }
                // A rejection is an acknowledgment: the L1 side saw the
                // message and refused it, retrying cannot change that
                Err(BridgeError::Rejected(e)) => {
                    tracing::error!("Enforcement rejected evidence for {}: {}", evidence.kind, e);
                    return Err(BridgeError::Rejected(e));
                }
                Err(BridgeError::Delivery(reason)) => {
                    tracing::warn!(
                        "Relay delivery failed (attempt {}): {}",
                        attempt,
                        reason
                    );
                    if let Some(max) = self.config.max_attempts {
                        if attempt >= max {
                            return Err(BridgeError::Delivery(reason));
                        }
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
            }
        }
    }

    /// Drain the evidence queue, delivering each package in order
    pub async fn run(self, mut rx: mpsc::Receiver<FaultEvidence>) {
        while let Some(evidence) = rx.recv().await {
            if let Err(e) = self.submit(&evidence).await {
                tracing::error!("Evidence could not be delivered: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::{CollateralLedger, PenaltyConfig};
    use parking_lot::Mutex;
    use protocol_types::{
        BlockRecord, CommitmentPayload, FaultKind, Preconfirmation, SignedCommitment,
    };

    fn evidence(kind: FaultKind) -> FaultEvidence {
        let (_, key) = Address::generate();
        let preconf = Preconfirmation {
            eop: false,
            block_number: 1,
            timestamp: 1_000,
            gas_limit: 30_000_000,
            coinbase: Address([1; 32]),
            anchor_block_number: 500,
            raw_tx_list_hash: [7; 32],
            parent_preconfirmation_hash: [0; 32],
            submission_window_end: 1_012,
            prover_auth: Address([2; 32]),
            proposal_id: 1,
        };
        FaultEvidence {
            registration_root: [5; 32],
            commitment: SignedCommitment::sign(
                CommitmentPayload {
                    preconfirmation: preconf.clone(),
                    slasher_address: Address([9; 32]),
                },
                &key,
            ),
            kind,
            submitted: BlockRecord::from_preconfirmation(&preconf),
        }
    }

    /// Bridge that fails a configurable number of deliveries before
    /// forwarding to the contract
    struct FlakyBridge {
        inner: InProcessBridge,
        failures_left: Mutex<u32>,
        attempts: Mutex<u32>,
    }

    #[async_trait]
    impl BridgeClient for FlakyBridge {
        async fn slash_commitment(
            &self,
            origin: Address,
            evidence: &FaultEvidence,
        ) -> Result<(), BridgeError> {
            *self.attempts.lock() += 1;
            {
                let mut failures = self.failures_left.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(BridgeError::Delivery("connection reset".into()));
                }
            }
            self.inner.slash_commitment(origin, evidence).await
        }
    }

    fn contract_with_collateral(sender: Address) -> (Arc<EnforcementContract>, Arc<CollateralLedger>) {
        let ledger = Arc::new(CollateralLedger::default());
        ledger.deposit([5; 32], 1_000);
        let contract = Arc::new(EnforcementContract::new(
            sender,
            PenaltyConfig::default(),
            ledger.clone(),
        ));
        (contract, ledger)
    }

    #[tokio::test]
    async fn retries_until_acknowledged() {
        let sender = Address([0xAA; 32]);
        let (contract, ledger) = contract_with_collateral(sender);
        let bridge = Arc::new(FlakyBridge {
            inner: InProcessBridge::new(contract),
            failures_left: Mutex::new(3),
            attempts: Mutex::new(0),
        });

        let relay = SlashingRelay::new(
            bridge.clone(),
            RelayConfig {
                sender,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                max_attempts: None,
            },
        );

        relay
            .submit(&evidence(FaultKind::BlockCommitmentMismatch))
            .await
            .unwrap();
        assert_eq!(*bridge.attempts.lock(), 4);
        assert!(ledger.balance(&[5; 32]) < 1_000);
    }

    #[tokio::test]
    async fn foreign_origin_is_rejected_without_deduction() {
        let sender = Address([0xAA; 32]);
        let (contract, ledger) = contract_with_collateral(sender);
        let bridge = Arc::new(InProcessBridge::new(contract));

        let relay = SlashingRelay::new(
            bridge,
            RelayConfig {
                sender: Address([0xBB; 32]), // not the authorized origin
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                max_attempts: Some(3),
            },
        );

        let result = relay.submit(&evidence(FaultKind::InvalidEop)).await;
        assert!(matches!(result, Err(BridgeError::Rejected(_))));
        assert_eq!(ledger.balance(&[5; 32]), 1_000);
    }
}
