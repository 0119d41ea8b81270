//! Lookahead schedule: who is allowed to sign commitments, and when
//!
//! The schedule itself is computed by the registration subsystem and pushed
//! in via `update`; this module only resolves elections. When no opted-in
//! operator covers a slot, a whitelist fallback takes the window.

use std::collections::HashSet;

use parking_lot::RwLock;
use protocol_types::{Address, Hash, LookaheadSlot};

/// Resolves the preconfer elections the verifier and classifier consume
pub trait LookaheadProvider: Send + Sync {
    /// The slot whose submission window covers `now`
    fn current_preconfer(&self, now: u64) -> Option<LookaheadSlot>;

    /// The slot following `after` in rotation order
    fn next_preconfer(&self, after: &LookaheadSlot) -> Option<LookaheadSlot>;
}

/// Slot grid used to synthesize fallback windows
#[derive(Debug, Clone)]
pub struct SlotTiming {
    pub genesis_timestamp: u64,
    /// Submission window length in seconds
    pub slot_duration: u64,
    pub slots_per_epoch: u64,
}

impl SlotTiming {
    /// Index of the slot whose window covers `at`; windows are
    /// half-open `(end - slot_duration, end]`
    pub fn slot_index(&self, at: u64) -> u64 {
        at.saturating_sub(self.genesis_timestamp) / self.slot_duration
    }

    pub fn window_end(&self, slot_index: u64) -> u64 {
        self.genesis_timestamp + (slot_index + 1) * self.slot_duration
    }

    pub fn epoch(&self, slot_index: u64) -> u64 {
        slot_index / self.slots_per_epoch
    }
}

/// How fallback assignment walks the whitelist when no opted-in operator
/// covers a slot
#[derive(Debug, Clone)]
pub enum FallbackPolicy {
    /// One whitelist operator per epoch
    WhitelistRotation,
    /// Rotate every `n` slots within the epoch
    FirstNSlots { n: u64 },
}

/// A fallback operator with the registry root its collateral is booked under
#[derive(Debug, Clone)]
pub struct WhitelistEntry {
    pub address: Address,
    pub registration_root: Hash,
}

struct LookaheadInner {
    /// Committed schedule entries, ordered by window end
    entries: Vec<LookaheadSlot>,
    /// Operators excluded from future elections by the overseer
    blacklist: HashSet<Address>,
}

/// The lookahead schedule table.
///
/// Externally mutable: `update` may replace entries mid-epoch after a slash,
/// so two calls for the same logical position can disagree. The default
/// replacement policy is to retain an invalidated entry and let fallback
/// take over once rotation naturally proceeds.
pub struct Lookahead {
    timing: SlotTiming,
    fallback: FallbackPolicy,
    whitelist: Vec<WhitelistEntry>,
    inner: RwLock<LookaheadInner>,
}

impl Lookahead {
    pub fn new(timing: SlotTiming, fallback: FallbackPolicy, whitelist: Vec<WhitelistEntry>) -> Self {
        Self {
            timing,
            fallback,
            whitelist,
            inner: RwLock::new(LookaheadInner {
                entries: Vec::new(),
                blacklist: HashSet::new(),
            }),
        }
    }

    /// Replace the committed schedule. Entries are kept ordered by window end.
    pub fn update(&self, mut entries: Vec<LookaheadSlot>) {
        entries.sort_by_key(|slot| slot.submission_window_end);
        tracing::debug!("Lookahead updated with {} entries", entries.len());
        self.inner.write().entries = entries;
    }

    /// Exclude an operator from all future elections. Never retroactive:
    /// already-applied blocks are untouched.
    pub fn blacklist(&self, operator: Address) {
        tracing::warn!("Operator {} blacklisted from future elections", operator);
        self.inner.write().blacklist.insert(operator);
    }

    pub fn is_blacklisted(&self, operator: &Address) -> bool {
        self.inner.read().blacklist.contains(operator)
    }

    /// Fallback assignment for the slot covering `at`
    fn fallback_slot(&self, at: u64, window_end: u64) -> Option<LookaheadSlot> {
        if self.whitelist.is_empty() {
            return None;
        }
        let slot_index = self.timing.slot_index(at);
        let pick = match self.fallback {
            FallbackPolicy::WhitelistRotation => self.timing.epoch(slot_index),
            FallbackPolicy::FirstNSlots { n } => slot_index / n.max(1),
        } as usize
            % self.whitelist.len();
        let entry = &self.whitelist[pick];
        Some(LookaheadSlot {
            committer: entry.address,
            submission_window_end: window_end,
            registration_root: entry.registration_root,
            validator_leaf_index: 0,
        })
    }
}

impl LookaheadProvider for Lookahead {
    fn current_preconfer(&self, now: u64) -> Option<LookaheadSlot> {
        let inner = self.inner.read();
        let covering = inner
            .entries
            .iter()
            .find(|slot| slot.submission_window_end >= now);

        match covering {
            Some(slot) if !inner.blacklist.contains(&slot.committer) => Some(slot.clone()),
            // Blacklisted or uncovered slot: fallback takes the window
            Some(slot) => self.fallback_slot(now, slot.submission_window_end),
            None => {
                let window_end = self.timing.window_end(self.timing.slot_index(now));
                self.fallback_slot(now, window_end)
            }
        }
    }

    fn next_preconfer(&self, after: &LookaheadSlot) -> Option<LookaheadSlot> {
        let inner = self.inner.read();
        let next = inner
            .entries
            .iter()
            .find(|slot| slot.submission_window_end > after.submission_window_end);

        match next {
            Some(slot) if !inner.blacklist.contains(&slot.committer) => Some(slot.clone()),
            Some(slot) => {
                self.fallback_slot(after.submission_window_end, slot.submission_window_end)
            }
            None => {
                let window_end = after.submission_window_end + self.timing.slot_duration;
                self.fallback_slot(after.submission_window_end, window_end)
            }
        }
    }
}
