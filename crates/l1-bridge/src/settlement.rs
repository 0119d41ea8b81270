//! L1-settled block records
//!
//! The submitted side of the equivocation comparison. Whatever indexes L1
//! (proof settlement, proposal events) inserts records here; the fault
//! monitor reads them through the consensus-side traits.

use dashmap::DashMap;
use parking_lot::Mutex;
use preconf_consensus::{RecordSource, SettledRecords};
use protocol_types::BlockRecord;

#[derive(Default)]
pub struct SettledStore {
    records: DashMap<u64, BlockRecord>,
    latest: Mutex<Option<u64>>,
}

impl SettledStore {
    /// Insert a record that settled on L1. Settlement is final: an existing
    /// record for the same block number is never overwritten.
    pub fn insert(&self, record: BlockRecord) {
        let block_number = record.block_number;
        if self.records.contains_key(&block_number) {
            tracing::debug!("Settled record for block {} already known", block_number);
            return;
        }
        self.records.insert(block_number, record);

        let mut latest = self.latest.lock();
        if latest.map_or(true, |current| block_number > current) {
            *latest = Some(block_number);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for SettledStore {
    fn record(&self, block_number: u64) -> Option<BlockRecord> {
        self.records.get(&block_number).map(|r| r.clone())
    }
}

impl SettledRecords for SettledStore {
    fn latest_settled(&self) -> Option<u64> {
        *self.latest.lock()
    }
}
