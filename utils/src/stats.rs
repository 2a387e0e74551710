//! Node statistics.
//!
//! Counters are addressed by `(type, detail, direction)`. Incrementing is
//! lock-light: the key's atomic is created once and then bumped without
//! taking the write lock again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatType {
    Traffic,
    Error,
    Message,
    Block,
    Ledger,
    Vote,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetailType {
    All,
    Keepalive,
    Publish,
    ConfirmReq,
    ConfirmAck,
    NodeIdHandshake,
    InsufficientWork,
    BadSender,
    VoteValid,
    VoteReplay,
    VoteInvalid,
    Fork,
    Gap,
    Old,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

type Key = (StatType, DetailType, Direction);

/// Thread-safe counter registry.
#[derive(Default)]
pub struct Stats {
    counters: RwLock<HashMap<Key, Arc<AtomicU64>>>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, key: Key) -> Arc<AtomicU64> {
        if let Some(counter) = self.counters.read().expect("stats lock poisoned").get(&key) {
            return counter.clone();
        }
        let mut counters = self.counters.write().expect("stats lock poisoned");
        counters.entry(key).or_default().clone()
    }

    pub fn inc(&self, stat_type: StatType, detail: DetailType, direction: Direction) {
        self.add(stat_type, detail, direction, 1);
    }

    /// Increment an aggregate counter (detail `All`, direction `In`).
    pub fn inc_type(&self, stat_type: StatType) {
        self.inc(stat_type, DetailType::All, Direction::In);
    }

    /// Bump only a detail counter, for errors whose aggregate was already
    /// counted.
    pub fn inc_detail_only(&self, stat_type: StatType, detail: DetailType) {
        self.inc(stat_type, detail, Direction::In);
    }

    pub fn add(&self, stat_type: StatType, detail: DetailType, direction: Direction, value: u64) {
        self.counter((stat_type, detail, direction))
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn count(&self, stat_type: StatType, detail: DetailType, direction: Direction) -> u64 {
        self.counters
            .read()
            .expect("stats lock poisoned")
            .get(&(stat_type, detail, direction))
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Snapshot every counter, for diagnostics endpoints.
    pub fn snapshot(&self) -> Vec<(StatType, DetailType, Direction, u64)> {
        self.counters
            .read()
            .expect("stats lock poisoned")
            .iter()
            .map(|(&(stat_type, detail, direction), counter)| {
                (stat_type, detail, direction, counter.load(Ordering::Relaxed))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_are_keyed() {
        let stats = Stats::new();
        stats.inc(StatType::Message, DetailType::Keepalive, Direction::In);
        stats.inc(StatType::Message, DetailType::Keepalive, Direction::In);
        stats.inc(StatType::Message, DetailType::Keepalive, Direction::Out);
        assert_eq!(
            stats.count(StatType::Message, DetailType::Keepalive, Direction::In),
            2
        );
        assert_eq!(
            stats.count(StatType::Message, DetailType::Keepalive, Direction::Out),
            1
        );
        assert_eq!(
            stats.count(StatType::Error, DetailType::All, Direction::In),
            0
        );
    }

    #[test]
    fn add_accumulates() {
        let stats = Stats::new();
        stats.add(StatType::Traffic, DetailType::All, Direction::In, 120);
        stats.add(StatType::Traffic, DetailType::All, Direction::In, 30);
        assert_eq!(
            stats.count(StatType::Traffic, DetailType::All, Direction::In),
            150
        );
    }

    #[test]
    fn snapshot_lists_all_keys() {
        let stats = Stats::new();
        stats.inc_type(StatType::Error);
        stats.inc_detail_only(StatType::Error, DetailType::InsufficientWork);
        assert_eq!(stats.snapshot().len(), 2);
    }
}
