//! Persistence layer for the tentative chain
//!
//! Uses sled to persist the tracker's head and applied history across
//! restarts, so a node resumes from its tentative head instead of
//! re-deriving the epoch from gossip.

use std::path::Path;

use preconf_consensus::{ChainStateTracker, TrackerSnapshot};
use serde::{Deserialize, Serialize};
use sled::Db;

/// Metadata about the persisted chain state
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChainMetadata {
    /// Head block number at the last save
    pub head_block_number: u64,
    /// Number of applied blocks stored
    pub block_count: u64,
    /// Last save timestamp
    pub last_save_ts: i64,
}

/// Persistent storage for the tracker state
pub struct PersistentStore {
    db: Db,
    /// Tracker snapshot tree
    chain: sled::Tree,
    /// Metadata tree
    metadata: sled::Tree,
}

impl PersistentStore {
    /// Open or create a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = sled::open(&path)?;
        let chain = db.open_tree("chain")?;
        let metadata = db.open_tree("metadata")?;

        tracing::info!("Opened persistent store at {:?}", path.as_ref());

        Ok(Self { db, chain, metadata })
    }

    fn save_snapshot(&self, snapshot: &TrackerSnapshot) -> anyhow::Result<()> {
        let bytes = borsh::to_vec(snapshot)?;
        self.chain.insert("tracker", bytes)?;

        let metadata = ChainMetadata {
            head_block_number: snapshot.head.header.number,
            block_count: snapshot.blocks.len() as u64,
            last_save_ts: chrono::Utc::now().timestamp(),
        };
        let bytes = serde_json::to_vec(&metadata)?;
        self.metadata.insert("chain", bytes)?;
        Ok(())
    }

    fn load_snapshot(&self) -> anyhow::Result<Option<TrackerSnapshot>> {
        match self.chain.get("tracker")? {
            Some(bytes) => Ok(Some(borsh::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load chain metadata
    pub fn load_metadata(&self) -> anyhow::Result<Option<ChainMetadata>> {
        match self.metadata.get("chain")? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> anyhow::Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Clear all data (for testing)
    pub fn clear(&self) -> anyhow::Result<()> {
        self.chain.clear()?;
        self.metadata.clear()?;
        Ok(())
    }
}

/// Extension trait wiring the tracker to persistent storage
pub trait TrackerPersistence {
    /// Save the full tracker state to disk; returns the block count saved
    fn save_to_disk(&self, store: &PersistentStore) -> anyhow::Result<usize>;

    /// Load a tracker from disk if one was saved
    fn load_from_disk(store: &PersistentStore) -> anyhow::Result<Option<ChainStateTracker>>;
}

impl TrackerPersistence for ChainStateTracker {
    fn save_to_disk(&self, store: &PersistentStore) -> anyhow::Result<usize> {
        let snapshot = self.snapshot();
        let count = snapshot.blocks.len();
        store.save_snapshot(&snapshot)?;
        store.flush()?;
        tracing::info!("Saved {} applied blocks to disk", count);
        Ok(count)
    }

    fn load_from_disk(store: &PersistentStore) -> anyhow::Result<Option<ChainStateTracker>> {
        let Some(snapshot) = store.load_snapshot()? else {
            return Ok(None);
        };
        let count = snapshot.blocks.len();
        let tracker = ChainStateTracker::restore(snapshot);
        tracing::info!(
            "Loaded {} applied blocks from disk, head at {}",
            count,
            tracker.head_block_number()
        );
        Ok(Some(tracker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preconf_consensus::AppliedBlock;
    use protocol_types::{
        Address, BlockHeader, BlockRecord, CommitmentPayload, ParentState, Preconfirmation,
        RawTxList, SignedCommitment,
    };
    use tempfile::tempdir;

    fn tracker_with_one_block() -> ChainStateTracker {
        let tracker = ChainStateTracker::new(ParentState::genesis(1_000, 30_000_000));
        let head = tracker.head();
        let preconf = Preconfirmation {
            eop: false,
            block_number: 1,
            timestamp: 1_002,
            gas_limit: 30_000_000,
            coinbase: Address([1; 32]),
            anchor_block_number: 500,
            raw_tx_list_hash: [7; 32],
            parent_preconfirmation_hash: head.preconfirmation_hash,
            submission_window_end: 1_012,
            prover_auth: Address([2; 32]),
            proposal_id: 1,
        };
        let (_, key) = Address::generate();
        let post_state = ParentState {
            header: BlockHeader {
                number: 1,
                timestamp: 1_002,
                gas_limit: 30_000_000,
                coinbase: Address([1; 32]),
                anchor_block_number: 500,
                anchor_hash: [3; 32],
                parent_hash: head.header.hash(),
                state_root: [4; 32],
            },
            preconfirmation_hash: preconf.hash(),
            proposal_id: 1,
        };
        tracker.apply_block(AppliedBlock {
            record: BlockRecord::from_preconfirmation(&preconf),
            commitment: SignedCommitment::sign(
                CommitmentPayload {
                    preconfirmation: preconf,
                    slasher_address: Address([9; 32]),
                },
                &key,
            ),
            tx_list: RawTxList::default(),
            registration_root: [8; 32],
            post_state,
        });
        tracker
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        let tracker = tracker_with_one_block();

        let saved = tracker.save_to_disk(&store).unwrap();
        assert_eq!(saved, 1);

        let loaded = ChainStateTracker::load_from_disk(&store).unwrap().unwrap();
        assert_eq!(loaded.head(), tracker.head());
        assert_eq!(loaded.preconfed(1), tracker.preconfed(1));
    }

    #[test]
    fn empty_store_loads_nothing() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        assert!(ChainStateTracker::load_from_disk(&store).unwrap().is_none());
    }

    #[test]
    fn metadata_tracks_the_save() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        let tracker = tracker_with_one_block();

        tracker.save_to_disk(&store).unwrap();
        let metadata = store.load_metadata().unwrap().unwrap();
        assert_eq!(metadata.head_block_number, 1);
        assert_eq!(metadata.block_count, 1);
    }
}
