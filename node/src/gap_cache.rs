//! Orphan block cache.
//!
//! Blocks parked for a missing dependency are remembered here together
//! with the representatives voting for them. When the voters' combined
//! stake crosses the bootstrap threshold, the node schedules a bootstrap
//! check for the missing block.

use chr_types::{Account, Amount, BlockHash, PublicKey};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Entry cap; the oldest arrival is evicted past it.
const MAX_ENTRIES: usize = 256;
/// Entries older than this are dropped by the periodic purge.
const PURGE_AGE: Duration = Duration::from_secs(10);

struct GapInfo {
    arrival: Instant,
    voters: HashSet<Account>,
    /// Set once the bootstrap threshold fired, so one entry schedules at
    /// most one bootstrap.
    triggered: bool,
}

#[derive(Default)]
pub struct GapCache {
    blocks: Mutex<HashMap<BlockHash, GapInfo>>,
}

impl GapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember an orphan. Re-adding refreshes the arrival timestamp; a
    /// fresh insert past the cap evicts the oldest entry.
    pub fn add(&self, hash: BlockHash) {
        let mut blocks = self.blocks.lock().expect("gap cache lock poisoned");
        let now = Instant::now();
        if let Some(info) = blocks.get_mut(&hash) {
            info.arrival = now;
            return;
        }
        if blocks.len() >= MAX_ENTRIES {
            if let Some(oldest) = blocks
                .iter()
                .min_by_key(|(_, info)| info.arrival)
                .map(|(hash, _)| *hash)
            {
                blocks.remove(&oldest);
            }
        }
        blocks.insert(
            hash,
            GapInfo {
                arrival: now,
                voters: HashSet::new(),
                triggered: false,
            },
        );
    }

    /// Intersect a vote's hashes with the cache, accumulating voter stake.
    /// Returns the hashes whose trailing stake crossed `threshold` with
    /// this vote.
    pub fn vote(
        &self,
        voter: Account,
        hashes: &[BlockHash],
        weight_of: &dyn Fn(&Account) -> Amount,
        threshold: Amount,
    ) -> Vec<BlockHash> {
        let mut crossed = Vec::new();
        let mut blocks = self.blocks.lock().expect("gap cache lock poisoned");
        for hash in hashes {
            let Some(info) = blocks.get_mut(hash) else {
                continue;
            };
            if !info.voters.insert(voter) || info.triggered {
                continue;
            }
            let tally = info
                .voters
                .iter()
                .fold(Amount::ZERO, |sum, voter| sum.saturating_add(weight_of(voter)));
            if tally > threshold {
                info.triggered = true;
                crossed.push(*hash);
            }
        }
        crossed
    }

    /// Forget a block that made it into the ledger.
    pub fn erase(&self, hash: &BlockHash) {
        self.blocks
            .lock()
            .expect("gap cache lock poisoned")
            .remove(hash);
    }

    /// Drop entries past the purge age.
    pub fn purge_old(&self) {
        let cutoff = Instant::now() - PURGE_AGE;
        self.blocks
            .lock()
            .expect("gap cache lock poisoned")
            .retain(|_, info| info.arrival >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().expect("gap cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    fn account(byte: u8) -> Account {
        PublicKey([byte; 32])
    }

    #[test]
    fn add_and_erase() {
        let cache = GapCache::new();
        cache.add(hash(1));
        assert_eq!(cache.len(), 1);
        cache.add(hash(1));
        assert_eq!(cache.len(), 1);
        cache.erase(&hash(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn cap_evicts_an_entry() {
        let cache = GapCache::new();
        for i in 0..=MAX_ENTRIES {
            let mut bytes = [0u8; 32];
            bytes[0] = (i & 0xFF) as u8;
            bytes[1] = (i >> 8) as u8;
            cache.add(BlockHash::new(bytes));
        }
        assert_eq!(cache.len(), MAX_ENTRIES);
    }

    #[test]
    fn vote_crosses_threshold_once() {
        let cache = GapCache::new();
        cache.add(hash(1));
        let weight_of = |_: &Account| Amount::raw(100);

        // First voter: 100, not above 150
        let crossed = cache.vote(account(1), &[hash(1)], &weight_of, Amount::raw(150));
        assert!(crossed.is_empty());
        // Second voter crosses
        let crossed = cache.vote(account(2), &[hash(1)], &weight_of, Amount::raw(150));
        assert_eq!(crossed, vec![hash(1)]);
        // Third voter: already triggered, no re-fire
        let crossed = cache.vote(account(3), &[hash(1)], &weight_of, Amount::raw(150));
        assert!(crossed.is_empty());
    }

    #[test]
    fn duplicate_voter_does_not_double_count() {
        let cache = GapCache::new();
        cache.add(hash(1));
        let weight_of = |_: &Account| Amount::raw(100);
        assert!(cache
            .vote(account(1), &[hash(1)], &weight_of, Amount::raw(150))
            .is_empty());
        assert!(cache
            .vote(account(1), &[hash(1)], &weight_of, Amount::raw(150))
            .is_empty());
    }

    #[test]
    fn votes_for_unknown_hashes_ignored() {
        let cache = GapCache::new();
        let weight_of = |_: &Account| Amount::raw(100);
        assert!(cache
            .vote(account(1), &[hash(9)], &weight_of, Amount::ZERO)
            .is_empty());
    }
}
