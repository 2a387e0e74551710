//! The ledger ingress queue.
//!
//! All ledger writes funnel through one consumer thread. `add` is the
//! normal path: work-checked, deduplicated on hash, bounded. `force` is
//! the election-reconciliation path: it bypasses dedup and, before
//! processing, rolls the ledger back off a competing successor.

use crate::node::Node;
use chr_ledger::{Block, ProcessResult};
use chr_types::BlockHash;
use chr_utils::{DetailType, StatType};
use chr_work::validate_work;
use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Queue bound and per-drain batch limit.
const MAX_QUEUE: usize = 16_384;
/// Fork blocks younger than this are suppressed rather than resolved.
const FORK_RESOLUTION_AGE: Duration = Duration::from_secs(15);

struct State {
    blocks: VecDeque<(Block, Instant)>,
    hashes: HashSet<BlockHash>,
    forced: VecDeque<Block>,
    stopped: bool,
    active: bool,
}

pub struct BlockProcessor {
    state: Mutex<State>,
    condition: Condvar,
    work_threshold: u64,
    next_log: Mutex<Instant>,
}

impl BlockProcessor {
    pub fn new(work_threshold: u64) -> Self {
        Self {
            state: Mutex::new(State {
                blocks: VecDeque::new(),
                hashes: HashSet::new(),
                forced: VecDeque::new(),
                stopped: false,
                active: false,
            }),
            condition: Condvar::new(),
            work_threshold,
            next_log: Mutex::new(Instant::now()),
        }
    }

    /// Enqueue a block for processing. Work failures and duplicate hashes
    /// are dropped silently; the queue bound applies backpressure by
    /// refusing the block.
    pub fn add(&self, block: Block, origination: Instant) {
        if !validate_work(&block.root(), block.work(), self.work_threshold) {
            tracing::warn!(block = %block.hash(), "dropping block with invalid work");
            return;
        }
        let hash = block.hash();
        let mut state = self.state.lock().expect("block processor lock poisoned");
        if state.stopped || state.hashes.contains(&hash) {
            return;
        }
        if state.blocks.len() >= MAX_QUEUE {
            tracing::warn!(block = %hash, "block queue full, dropping");
            return;
        }
        state.blocks.push_back((block, origination));
        state.hashes.insert(hash);
        self.condition.notify_all();
    }

    /// Enqueue on the forced path, skipping work checks and dedup.
    pub fn force(&self, block: Block) {
        let mut state = self.state.lock().expect("block processor lock poisoned");
        state.forced.push_back(block);
        self.condition.notify_all();
    }

    /// Whether backpressure should be applied upstream.
    pub fn full(&self) -> bool {
        self.state
            .lock()
            .expect("block processor lock poisoned")
            .blocks
            .len()
            >= MAX_QUEUE
    }

    pub fn queue_len(&self) -> usize {
        let state = self.state.lock().expect("block processor lock poisoned");
        state.blocks.len() + state.forced.len()
    }

    /// Block until the queue is drained and no batch is in flight.
    pub fn flush(&self) {
        let mut state = self.state.lock().expect("block processor lock poisoned");
        while !state.stopped
            && (!state.blocks.is_empty() || !state.forced.is_empty() || state.active)
        {
            state = self
                .condition
                .wait(state)
                .expect("block processor lock poisoned");
        }
    }

    pub fn stop(&self) {
        let mut state = self.state.lock().expect("block processor lock poisoned");
        state.stopped = true;
        self.condition.notify_all();
    }

    /// The consumer loop; runs on a dedicated thread until `stop`.
    pub fn run(&self, node: &Node) {
        let mut state = self.state.lock().expect("block processor lock poisoned");
        while !state.stopped {
            if !state.blocks.is_empty() || !state.forced.is_empty() {
                state.active = true;
                drop(state);
                self.process_many(node);
                state = self.state.lock().expect("block processor lock poisoned");
                state.active = false;
                self.condition.notify_all();
            } else {
                self.condition.notify_all();
                state = self
                    .condition
                    .wait(state)
                    .expect("block processor lock poisoned");
            }
        }
    }

    fn should_log(&self) -> bool {
        let mut next_log = self.next_log.lock().expect("block processor lock poisoned");
        let now = Instant::now();
        if *next_log < now {
            *next_log = now + Duration::from_secs(15);
            true
        } else {
            false
        }
    }

    /// Drain up to one batch under a single write transaction, bounded by
    /// count and wall clock. Observer events fire only after the
    /// transaction closes.
    fn process_many(&self, node: &Node) {
        let mut events = Vec::new();
        {
            let mut txn = node.store.tx_begin_write();
            let deadline = Instant::now() + node.params.transaction_timeout;
            let mut count = 0;
            let mut state = self.state.lock().expect("block processor lock poisoned");
            while (!state.blocks.is_empty() || !state.forced.is_empty())
                && count < MAX_QUEUE
                && Instant::now() < deadline
            {
                if state.blocks.len() > 64 && self.should_log() {
                    tracing::info!(queued = state.blocks.len(), "blocks in processing queue");
                }
                let (block, origination, forced) = match state.forced.pop_front() {
                    Some(block) => (block, Instant::now(), true),
                    None => {
                        let (block, origination) =
                            state.blocks.pop_front().expect("loop guard checked");
                        state.hashes.remove(&block.hash());
                        (block, origination, false)
                    }
                };
                drop(state);

                if forced {
                    self.reconcile_forced(node, txn.as_mut(), &block);
                }
                self.process_one(node, txn.as_mut(), &block, origination, &mut events);

                state = self.state.lock().expect("block processor lock poisoned");
                count += 1;
            }
        }
        for (block, account, amount, is_state_send) in events {
            node.notify_committed(&block, account, amount, is_state_send);
        }
    }

    /// The ledger may hold a different successor for the forced block's
    /// root; roll it back so the forced block can take the slot.
    fn reconcile_forced(
        &self,
        node: &Node,
        txn: &mut dyn chr_store::WriteTransaction,
        block: &Block,
    ) {
        let hash = block.hash();
        let Some(successor) = node.ledger.successor(&*txn, &block.root()) else {
            return;
        };
        if successor.hash() == hash {
            return;
        }
        tracing::info!(losing = %successor.hash(), winning = %hash, "rolling back fork loser");
        match node.ledger.rollback(txn, &successor.hash()) {
            Ok(rolled_back) => {
                for rolled in &rolled_back {
                    node.active.erase(rolled);
                }
            }
            Err(error) => {
                tracing::error!(%error, "fork rollback failed");
            }
        }
    }

    fn process_one(
        &self,
        node: &Node,
        txn: &mut dyn chr_store::WriteTransaction,
        block: &Block,
        origination: Instant,
        events: &mut Vec<(Block, chr_types::Account, chr_types::Amount, bool)>,
    ) {
        let hash = block.hash();
        let result = node.ledger.process(txn, block);
        match result {
            ProcessResult::Progress => {
                tracing::debug!(block = %hash, "block committed");
                if node.block_arrival.recent(&hash) {
                    node.active.start_election(block.clone(), None, Box::new(|_| {}));
                    let account = block.account();
                    let amount = node
                        .ledger
                        .amount(&*txn, &hash)
                        .unwrap_or(chr_types::Amount::ZERO);
                    let is_state_send = node.ledger.is_send(&*txn, block);
                    events.push((block.clone(), account, amount, is_state_send));
                }
                self.drain_unchecked(node, txn, &hash);
            }
            ProcessResult::GapPrevious => {
                tracing::debug!(block = %hash, "gap previous");
                node.stats.inc_detail_only(StatType::Ledger, DetailType::Gap);
                txn.unchecked_put(&block.previous(), block.to_store_bytes());
                node.gap_cache.add(hash);
            }
            ProcessResult::GapSource => {
                tracing::debug!(block = %hash, "gap source");
                node.stats.inc_detail_only(StatType::Ledger, DetailType::Gap);
                let dependency = node.ledger.block_source(&*txn, block);
                txn.unchecked_put(&dependency, block.to_store_bytes());
                node.gap_cache.add(hash);
            }
            ProcessResult::IncorrectDividend => {
                tracing::debug!(block = %hash, dividend = %block.dividend(),
                    "cannot apply before the dividend is claimed");
                txn.unchecked_put(&block.dividend(), block.to_store_bytes());
                node.gap_cache.add(hash);
            }
            ProcessResult::Old => {
                tracing::trace!(block = %hash, "old block");
                node.stats.inc_detail_only(StatType::Ledger, DetailType::Old);
                // A dependent may be satisfiable now.
                self.drain_unchecked(node, txn, &hash);
            }
            ProcessResult::Fork => {
                node.stats.inc_detail_only(StatType::Ledger, DetailType::Fork);
                if origination.elapsed() > FORK_RESOLUTION_AGE {
                    node.process_fork(txn, block);
                }
                tracing::debug!(block = %hash, root = %block.root(), "fork");
            }
            ProcessResult::DividendFork => {
                node.stats.inc_detail_only(StatType::Ledger, DetailType::Fork);
                if origination.elapsed() > FORK_RESOLUTION_AGE {
                    node.process_dividend_fork(txn, block);
                }
                tracing::debug!(block = %hash, root = %block.root(), "dividend fork");
            }
            ProcessResult::BadSignature => {
                tracing::debug!(block = %hash, "bad signature");
            }
            ProcessResult::NegativeSpend => {
                tracing::debug!(block = %hash, "negative spend");
            }
            ProcessResult::Unreceivable => {
                tracing::debug!(block = %hash, "unreceivable");
            }
            ProcessResult::OpenedBurnAccount => {
                tracing::warn!(block = %hash, "rejecting open block for burn account");
            }
            ProcessResult::BalanceMismatch => {
                tracing::debug!(block = %hash, "balance mismatch");
            }
            ProcessResult::RepresentativeMismatch => {
                tracing::debug!(block = %hash, "representative mismatch");
            }
            ProcessResult::BlockPosition => {
                tracing::debug!(block = %hash, previous = %block.previous(),
                    "block cannot follow predecessor");
            }
            ProcessResult::OutstandingPendings => {
                tracing::debug!(dividend = %block.dividend(), "dividend has outstanding pendings");
            }
            ProcessResult::DividendTooSmall => {
                tracing::debug!(block = %hash, "dividend too small to be accepted");
            }
            ProcessResult::InvalidDividendAccount => {
                tracing::debug!(account = %block.account(), "account cannot create a dividend");
            }
        }
    }

    /// Re-add every unchecked block that was parked under `hash`.
    fn drain_unchecked(
        &self,
        node: &Node,
        txn: &mut dyn chr_store::WriteTransaction,
        hash: &BlockHash,
    ) {
        let cached = txn.unchecked_get(hash);
        for bytes in cached {
            txn.unchecked_del(hash, &bytes);
            if let Some(child) = Block::from_store_bytes(&bytes) {
                self.add(child, Instant::now());
            }
        }
        node.gap_cache.erase(hash);
    }
}
