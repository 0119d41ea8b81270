//! Wire messages for commitment gossip and reorg notifications

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::commitment::{RawTxList, SignedCommitment};

/// Messages exchanged on the commitment gossip network.
/// Delivery is at-least-once and unordered; duplicates and stale messages
/// are rejected downstream by the parent-hash check, not here.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum GossipMessage {
    /// A signed commitment together with the raw transaction list it names
    Commitment {
        commitment: SignedCommitment,
        tx_list: RawTxList,
    },

    /// Keep-alive carrying the publisher's current head block number
    Heartbeat { block_number: u64 },

    /// Peer acknowledging its verified head back to the publisher
    HeadStatus { block_number: u64 },
}

impl GossipMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("GossipMessage serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Notification that a set of L1 anchor blocks was invalidated by a reorg.
/// Consumed by the reorg reconciler through the same serialized application
/// discipline as ordinary commitments.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ReorgNotification {
    /// Anchor block numbers whose hashes are no longer canonical
    pub invalidated_anchors: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gossip_message_roundtrip() {
        let msg = GossipMessage::Heartbeat { block_number: 42 };
        let decoded = GossipMessage::from_bytes(&msg.to_bytes()).unwrap();
        match decoded {
            GossipMessage::Heartbeat { block_number } => assert_eq!(block_number, 42),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
