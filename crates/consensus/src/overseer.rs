//! Fair-exchange overseer
//!
//! Low-intensity threshold monitor. Tracks how long each operator sits on a
//! closed window without an L1 submission, and how much of the observed
//! mempool its published preconfs exclude. Breaches blacklist the operator
//! in the lookahead for future elections only.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use protocol_types::Address;

use crate::lookahead::Lookahead;

/// Thresholds are deployment policy; `None` disables a check entirely.
#[derive(Debug, Clone, Default)]
pub struct OverseerConfig {
    /// Max tolerated seconds between a window's end and its observed L1
    /// submission
    pub max_submission_lag: Option<u64>,
    /// Max tolerated fraction of observed mempool transactions missing from
    /// published preconfs
    pub max_exclusion_ratio: Option<f64>,
    /// Mempool sample size below which the exclusion ratio is not judged
    pub min_observed_txs: u64,
}

#[derive(Debug, Default)]
struct OperatorWatch {
    /// Window ends awaiting an observed L1 submission
    pending_windows: Vec<u64>,
    observed_txs: u64,
    included_txs: u64,
}

pub struct Overseer {
    config: OverseerConfig,
    lookahead: Arc<Lookahead>,
    watches: Mutex<HashMap<Address, OperatorWatch>>,
}

impl Overseer {
    pub fn new(config: OverseerConfig, lookahead: Arc<Lookahead>) -> Self {
        Self {
            config,
            lookahead,
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// A submission window closed for `operator` without an observed
    /// submission yet
    pub fn note_window_closed(&self, operator: Address, window_end: u64) {
        self.watches
            .lock()
            .entry(operator)
            .or_default()
            .pending_windows
            .push(window_end);
    }

    /// An L1 submission for `operator`'s window was observed
    pub fn note_submission(&self, operator: Address, window_end: u64) {
        if let Some(watch) = self.watches.lock().get_mut(&operator) {
            watch.pending_windows.retain(|&w| w != window_end);
        }
    }

    /// Account observed-mempool transactions against what the operator's
    /// published preconfs actually included
    pub fn note_mempool_coverage(&self, operator: Address, observed: u64, included: u64) {
        let mut watches = self.watches.lock();
        let watch = watches.entry(operator).or_default();
        watch.observed_txs += observed;
        watch.included_txs += included.min(observed);
    }

    /// Evaluate thresholds; blacklist breaching operators. Returns the
    /// operators blacklisted by this pass.
    pub fn tick(&self, now: u64) -> Vec<Address> {
        let mut breached = Vec::new();
        let mut watches = self.watches.lock();

        for (operator, watch) in watches.iter() {
            if self.is_withholding(watch, now) || self.is_excluding(watch) {
                breached.push(*operator);
            }
        }

        for operator in &breached {
            watches.remove(operator);
            self.lookahead.blacklist(*operator);
        }
        breached
    }

    fn is_withholding(&self, watch: &OperatorWatch, now: u64) -> bool {
        let Some(max_lag) = self.config.max_submission_lag else {
            return false;
        };
        watch
            .pending_windows
            .iter()
            .any(|&window_end| now.saturating_sub(window_end) > max_lag)
    }

    fn is_excluding(&self, watch: &OperatorWatch) -> bool {
        let Some(max_ratio) = self.config.max_exclusion_ratio else {
            return false;
        };
        if watch.observed_txs < self.config.min_observed_txs.max(1) {
            return false;
        }
        let excluded = (watch.observed_txs - watch.included_txs) as f64;
        excluded / watch.observed_txs as f64 > max_ratio
    }
}
