//! Online representative tracking.
//!
//! A rolling set of representatives heard from within the cutoff, plus a
//! cached stake sum. The sum is maintained incrementally as reps appear
//! and age out, and recomputed from ledger weights periodically to guard
//! against drift.

use chr_types::{Account, Amount, PublicKey, Timestamp};
use std::collections::HashMap;

pub struct OnlineReps {
    reps: HashMap<Account, Timestamp>,
    online_stake_total: Amount,
    cutoff_secs: u64,
    online_weight_minimum: Amount,
}

impl OnlineReps {
    pub fn new(cutoff_secs: u64, online_weight_minimum: Amount) -> Self {
        Self {
            reps: HashMap::new(),
            online_stake_total: Amount::ZERO,
            cutoff_secs,
            online_weight_minimum,
        }
    }

    /// Record a valid vote from `rep`. Ages out silent representatives
    /// first, deducting their weight (clamped at zero), then inserts or
    /// refreshes the voter, adding its weight (saturating at max).
    pub fn observe(&mut self, rep: Account, weight_of: &dyn Fn(&Account) -> Amount, now: Timestamp) {
        let cutoff = self.cutoff_secs;
        let expired: Vec<Account> = self
            .reps
            .iter()
            .filter(|(_, last_heard)| last_heard.has_expired(cutoff, now))
            .map(|(account, _)| *account)
            .collect();
        for account in expired {
            self.reps.remove(&account);
            self.online_stake_total = self.online_stake_total.saturating_sub(weight_of(&account));
        }
        if self.reps.insert(rep, now).is_none() {
            self.online_stake_total = self.online_stake_total.saturating_add(weight_of(&rep));
        }
    }

    /// Recompute the cached sum from authoritative weights.
    pub fn recalculate(&mut self, weight_of: &dyn Fn(&Account) -> Amount) {
        self.online_stake_total = self
            .reps
            .keys()
            .fold(Amount::ZERO, |sum, rep| sum.saturating_add(weight_of(rep)));
    }

    /// The online stake estimate, floored at the configured minimum.
    pub fn online_stake(&self) -> Amount {
        self.online_stake_total.max(self.online_weight_minimum)
    }

    /// Representatives currently considered online.
    pub fn list(&self) -> Vec<Account> {
        self.reps.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.reps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reps.is_empty()
    }
}
