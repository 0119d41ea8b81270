//! L1 Bridge - slashing relay and L1 fact providers
//!
//! Handles the trust boundary between the L2 node and the L1 registry:
//! - Relaying fault evidence across the bridge until acknowledged
//! - Registry-side origin verification and collateral deduction
//! - Anchor block data and beacon-chain slot facts
//! - The table of L1-settled block records the classifier reads

pub mod anchor;
pub mod enforcement;
pub mod relay;
pub mod settlement;

pub use anchor::{InMemoryAnchors, InMemoryBeacon};
pub use enforcement::{CollateralLedger, EnforcementContract, EnforcementError, PenaltyConfig};
pub use relay::{BridgeClient, BridgeError, InProcessBridge, RelayConfig, SlashingRelay};
pub use settlement::SettledStore;
