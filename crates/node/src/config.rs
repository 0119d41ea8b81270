//! Node Configuration

use protocol_types::Address;
use serde::{Deserialize, Serialize};

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// HTTP RPC bind address
    pub rpc_addr: String,
    /// Gossip bind address (publisher mode)
    pub gossip_addr: String,
    /// Publisher address to connect to (follower mode)
    pub publisher_addr: String,
    /// The canonical preconf-slasher address commitments must name
    pub slasher_address: Address,
    /// Acceptance bound on commitment timestamp drift, seconds
    pub max_timestamp_drift: u64,
    /// L2 genesis timestamp (unix seconds)
    pub genesis_timestamp: u64,
    /// Genesis gas limit
    pub genesis_gas_limit: u64,
    /// Submission window length, seconds
    pub slot_duration: u64,
    pub slots_per_epoch: u64,
    /// Fallback whitelist operators, in rotation order
    pub whitelist: Vec<Address>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_addr: "127.0.0.1:8547".to_string(),
            gossip_addr: "0.0.0.0:9200".to_string(),
            publisher_addr: "127.0.0.1:9200".to_string(),
            slasher_address: Address([0xEE; 32]),
            max_timestamp_drift: 12,
            genesis_timestamp: 0,
            genesis_gas_limit: 30_000_000,
            slot_duration: 12,
            slots_per_epoch: 32,
            whitelist: Vec::new(),
        }
    }
}
