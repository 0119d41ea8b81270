//! Registry-side enforcement
//!
//! The receiving end of the slashing bridge. A classifier verdict is never
//! self-authenticating: the contract first verifies the message's bridge
//! origin, then deducts operator collateral according to the fault kind.

use dashmap::DashMap;
use protocol_types::{Address, FaultEvidence, Hash};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnforcementError {
    #[error("bridge origin {0} is not the authorized slasher sender")]
    UnauthorizedOrigin(Address),

    #[error("no collateral registered under the named registration root")]
    UnknownRegistration,
}

/// Penalty magnitudes in collateral units. Policy values; the protocol only
/// requires liveness to be strictly smaller than the full penalty.
#[derive(Debug, Clone)]
pub struct PenaltyConfig {
    pub liveness_penalty: u64,
    pub full_penalty: u64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            liveness_penalty: 100,
            full_penalty: 500,
        }
    }
}

impl PenaltyConfig {
    pub fn new(liveness_penalty: u64, full_penalty: u64) -> anyhow::Result<Self> {
        if liveness_penalty >= full_penalty {
            anyhow::bail!("liveness penalty must be strictly smaller than the full penalty");
        }
        Ok(Self {
            liveness_penalty,
            full_penalty,
        })
    }
}

/// Operator collateral, keyed by registration root
#[derive(Default)]
pub struct CollateralLedger {
    balances: DashMap<Hash, u64>,
}

impl CollateralLedger {
    pub fn deposit(&self, registration_root: Hash, amount: u64) {
        *self.balances.entry(registration_root).or_insert(0) += amount;
    }

    pub fn balance(&self, registration_root: &Hash) -> u64 {
        self.balances
            .get(registration_root)
            .map(|b| *b)
            .unwrap_or(0)
    }

    pub fn is_registered(&self, registration_root: &Hash) -> bool {
        self.balances.contains_key(registration_root)
    }

    /// Deduct up to `amount`; returns what was actually taken
    fn deduct(&self, registration_root: &Hash, amount: u64) -> u64 {
        match self.balances.get_mut(registration_root) {
            Some(mut balance) => {
                let taken = amount.min(*balance);
                *balance -= taken;
                taken
            }
            None => 0,
        }
    }
}

/// The registry-side slashing contract
pub struct EnforcementContract {
    /// The only bridge origin this contract honors
    authorized_sender: Address,
    penalties: PenaltyConfig,
    ledger: std::sync::Arc<CollateralLedger>,
}

impl EnforcementContract {
    pub fn new(
        authorized_sender: Address,
        penalties: PenaltyConfig,
        ledger: std::sync::Arc<CollateralLedger>,
    ) -> Self {
        Self {
            authorized_sender,
            penalties,
            ledger,
        }
    }

    /// Verify the origin and deduct collateral. Returns the amount taken.
    pub fn execute(&self, origin: Address, evidence: &FaultEvidence) -> Result<u64, EnforcementError> {
        if origin != self.authorized_sender {
            return Err(EnforcementError::UnauthorizedOrigin(origin));
        }
        if !self.ledger.is_registered(&evidence.registration_root) {
            return Err(EnforcementError::UnknownRegistration);
        }

        let penalty = if evidence.kind.is_liveness() {
            self.penalties.liveness_penalty
        } else {
            self.penalties.full_penalty
        };
        let taken = self.ledger.deduct(&evidence.registration_root, penalty);
        tracing::info!(
            "Slashed {} collateral units under root {} for {}",
            taken,
            hex::encode(&evidence.registration_root[..8]),
            evidence.kind
        );
        Ok(taken)
    }
}
