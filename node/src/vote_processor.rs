//! The vote ingress queue.
//!
//! Votes drain on a dedicated thread under one read-only transaction per
//! batch. Outcomes: `Invalid` (signature), `Replay` (does not supersede
//! what we know), `Vote` (accepted somewhere). Accepted votes are
//! persisted as the representative's latest and fanned out to observers;
//! deep replays trigger an assist reply carrying our newest known vote.

use crate::node::Node;
use chr_consensus::{TallyContext, Vote};
use chr_ledger::Block;
use chr_types::{Account, NetworkId, Timestamp};
use chr_utils::{DetailType, StatType};
use std::collections::VecDeque;
use std::net::SocketAddrV6;
use std::sync::{Condvar, Mutex};

/// Queue bound; votes past it are dropped with a warning.
const MAX_VOTES: usize = 65_536;
/// A replay this many sequence numbers behind our stored maximum earns an
/// assist reply. Answering one confirm_ack with one confirm_ack cannot
/// amplify.
const REPLAY_ASSIST_GAP: u64 = 10_000;

/// Outcome of processing one vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteCode {
    /// Signature or shape invalid.
    Invalid,
    /// Did not supersede the best-known vote anywhere.
    Replay,
    /// Accepted by at least one election (or fresher than anything known).
    Vote,
}

struct State {
    votes: VecDeque<(Vote, SocketAddrV6)>,
    stopped: bool,
    active: bool,
}

pub struct VoteProcessor {
    state: Mutex<State>,
    condition: Condvar,
}

impl Default for VoteProcessor {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                votes: VecDeque::new(),
                stopped: false,
                active: false,
            }),
            condition: Condvar::new(),
        }
    }
}

impl VoteProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a vote heard from `endpoint`.
    pub fn vote(&self, vote: Vote, endpoint: SocketAddrV6) {
        let mut state = self.state.lock().expect("vote processor lock poisoned");
        if state.stopped {
            return;
        }
        if state.votes.len() >= MAX_VOTES {
            tracing::warn!("vote queue full, dropping");
            return;
        }
        state.votes.push_back((vote, endpoint));
        self.condition.notify_all();
    }

    /// Block until the queue is empty and no batch is in flight.
    pub fn flush(&self) {
        let mut state = self.state.lock().expect("vote processor lock poisoned");
        while !state.stopped && (state.active || !state.votes.is_empty()) {
            state = self
                .condition
                .wait(state)
                .expect("vote processor lock poisoned");
        }
    }

    pub fn stop(&self) {
        let mut state = self.state.lock().expect("vote processor lock poisoned");
        state.stopped = true;
        self.condition.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .expect("vote processor lock poisoned")
            .votes
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The consumer loop; runs on a dedicated thread until `stop`.
    pub fn run(&self, node: &Node) {
        let mut state = self.state.lock().expect("vote processor lock poisoned");
        while !state.stopped {
            if !state.votes.is_empty() {
                let batch: VecDeque<(Vote, SocketAddrV6)> = std::mem::take(&mut state.votes);
                state.active = true;
                drop(state);
                self.process_batch(node, batch);
                state = self.state.lock().expect("vote processor lock poisoned");
                state.active = false;
                self.condition.notify_all();
            } else {
                state = self
                    .condition
                    .wait(state)
                    .expect("vote processor lock poisoned");
            }
        }
    }

    fn process_batch(&self, node: &Node, batch: VecDeque<(Vote, SocketAddrV6)>) {
        let online_stake = node
            .online_reps
            .lock()
            .expect("online reps lock poisoned")
            .online_stake();
        let quorum_delta = node.delta_of(online_stake);

        let mut persisted: Vec<Vote> = Vec::new();
        let mut forces: Vec<Block> = Vec::new();
        let mut confirmations = Vec::new();
        let mut valid: Vec<(Vote, SocketAddrV6)> = Vec::new();

        {
            let txn = node.store.tx_begin_read();
            for (vote, endpoint) in batch {
                let code = self.vote_blocking(
                    node,
                    txn.as_ref(),
                    &vote,
                    endpoint,
                    online_stake.number(),
                    quorum_delta.number(),
                    &mut forces,
                    &mut confirmations,
                );
                match code {
                    VoteCode::Vote => {
                        node.stats
                            .inc_detail_only(StatType::Vote, DetailType::VoteValid);
                        persisted.push(vote.clone());
                        valid.push((vote, endpoint));
                    }
                    VoteCode::Replay => {
                        node.stats
                            .inc_detail_only(StatType::Vote, DetailType::VoteReplay);
                    }
                    VoteCode::Invalid => {
                        node.stats
                            .inc_detail_only(StatType::Vote, DetailType::VoteInvalid);
                    }
                }
            }
        }

        // Persist new per-representative maxima outside the read view.
        if !persisted.is_empty() {
            let mut txn = node.store.tx_begin_write();
            for vote in persisted {
                let superseded = txn
                    .vote_get(&vote.account)
                    .and_then(|bytes| Vote::from_store_bytes(&bytes))
                    .map(|stored| stored.sequence < vote.sequence)
                    .unwrap_or(true);
                if superseded {
                    txn.vote_put(&vote.account, vote.to_store_bytes());
                }
            }
        }

        for block in forces {
            node.block_processor.force(block);
        }
        for (winner, action) in confirmations {
            node.process_confirmed(&winner);
            if let Some(action) = action {
                action(&winner);
            }
        }
        for (vote, endpoint) in valid {
            let fanout = node
                .peers
                .lock()
                .expect("peer lock poisoned")
                .list_fanout();
            node.network.republish_vote(vote.clone(), fanout);
            node.observers.vote.notify(&(vote, endpoint));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn vote_blocking(
        &self,
        node: &Node,
        txn: &dyn chr_store::Transaction,
        vote: &Vote,
        endpoint: SocketAddrV6,
        online_stake: u128,
        quorum_delta: u128,
        forces: &mut Vec<Block>,
        confirmations: &mut Vec<(Block, Option<chr_consensus::ConfirmAction>)>,
    ) -> VoteCode {
        if !vote.validate() {
            tracing::debug!(account = %vote.account, "invalid vote");
            return VoteCode::Invalid;
        }

        let stored_max = txn
            .vote_get(&vote.account)
            .and_then(|bytes| Vote::from_store_bytes(&bytes));
        let supersedes = stored_max
            .as_ref()
            .map(|stored| vote.sequence > stored.sequence)
            .unwrap_or(true);

        let code = if supersedes {
            let weight_of =
                |account: &Account| node.ledger.weight(txn, account);
            let ctx = TallyContext {
                weight_of: &weight_of,
                online_stake: chr_types::Amount::raw(online_stake),
                quorum_delta: chr_types::Amount::raw(quorum_delta),
                online_weight_minimum: node.params.online_weight_minimum,
                test_network: node.params.network == NetworkId::Test,
                now: Timestamp::now(),
            };
            let outcome = node.active.vote(vote, &ctx);
            forces.extend(outcome.forces);
            confirmations.extend(outcome.confirmations);
            if outcome.processed {
                VoteCode::Vote
            } else {
                VoteCode::Replay
            }
        } else {
            VoteCode::Replay
        };

        if code == VoteCode::Replay {
            // Assist reps that lost their sequence state by replaying our
            // newest known vote back to them.
            if let Some(stored) = stored_max {
                if stored.sequence > vote.sequence.saturating_add(REPLAY_ASSIST_GAP) {
                    node.network.confirm_send(stored, endpoint);
                }
            }
        }
        tracing::debug!(account = %vote.account, sequence = vote.sequence, code = ?code,
            hashes = %vote.hashes_string(), "vote processed");
        code
    }
}
