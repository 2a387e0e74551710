//! Election driver.
//!
//! Wraps the active-elections container with the node's locking and runs
//! the announcement worker. Plans produced under the lock are executed
//! after it is released, so network and processor calls never nest inside
//! the election mutex.

use crate::node::Node;
use chr_consensus::{
    ActiveElections, AnnounceContext, ConfirmAction, ConfirmRequest, TallyContext, Vote,
    VoteOutcome,
};
use chr_ledger::Block;
use chr_types::{Account, Amount, Timestamp};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Targeted confirm_req rounds probe at most this many representatives.
const CONFIRM_REQ_REPS: usize = 10;
/// Delay between targeted confirm_req sends.
const CONFIRM_REQ_STAGGER: Duration = Duration::from_millis(50);
/// Broadcast-to-everyone rounds allowed per announcement pass before the
/// fallback stops being taken for lack of rep weight.
const MAX_MASS_REQUESTS: usize = 20;

struct ActiveState {
    elections: ActiveElections,
    stopped: bool,
}

pub struct ActiveTransactions {
    state: Mutex<ActiveState>,
    condition: Condvar,
}

impl Default for ActiveTransactions {
    fn default() -> Self {
        Self {
            state: Mutex::new(ActiveState {
                elections: ActiveElections::new(),
                stopped: false,
            }),
            condition: Condvar::new(),
        }
    }
}

impl ActiveTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an election; `true` when one already exists for the root.
    pub fn start_election(
        &self,
        primary: Block,
        alternate: Option<Block>,
        on_confirm: ConfirmAction,
    ) -> bool {
        let mut state = self.state.lock().expect("active lock poisoned");
        if state.stopped {
            return true;
        }
        state
            .elections
            .start(primary, alternate, on_confirm, Timestamp::now())
    }

    pub fn publish(&self, block: &Block, online_stake: Amount) -> bool {
        self.state
            .lock()
            .expect("active lock poisoned")
            .elections
            .publish(block, online_stake)
    }

    pub fn vote(&self, vote: &Vote, ctx: &TallyContext<'_>) -> VoteOutcome {
        self.state
            .lock()
            .expect("active lock poisoned")
            .elections
            .vote(vote, ctx)
    }

    pub fn erase(&self, block: &Block) {
        self.state
            .lock()
            .expect("active lock poisoned")
            .elections
            .erase(block);
    }

    pub fn active(&self, block: &Block) -> bool {
        self.state
            .lock()
            .expect("active lock poisoned")
            .elections
            .active(block)
    }

    pub fn list_winners(&self) -> Vec<Block> {
        self.state
            .lock()
            .expect("active lock poisoned")
            .elections
            .winners()
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("active lock poisoned").elections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stop(&self) {
        let mut state = self.state.lock().expect("active lock poisoned");
        state.stopped = true;
        state.elections.clear();
        self.condition.notify_all();
    }

    /// The announcement worker; runs on a dedicated thread until `stop`.
    pub fn run(&self, node: &Node) {
        loop {
            // Store before election lock, always.
            let plan = {
                let txn = node.store.tx_begin_read();
                let weight_of =
                    |account: &Account| node.ledger.weight(txn.as_ref(), account);
                let could_fit = |block: &Block| node.ledger.could_fit(txn.as_ref(), block);
                let ctx = AnnounceContext {
                    could_fit: &could_fit,
                    weight_of: &weight_of,
                };
                let mut state = self.state.lock().expect("active lock poisoned");
                if state.stopped {
                    break;
                }
                state.elections.announce_pass(&ctx)
            };

            if plan.unconfirmed > 0 {
                tracing::info!(count = plan.unconfirmed, "long-unconfirmed elections");
            }
            self.execute_plan(node, plan);

            let state = self.state.lock().expect("active lock poisoned");
            if state.stopped {
                break;
            }
            let (state, _) = self
                .condition
                .wait_timeout(state, node.params.announce_interval)
                .expect("active lock poisoned");
            if state.stopped {
                break;
            }
        }
    }

    fn execute_plan(&self, node: &Node, plan: chr_consensus::AnnouncePlan) {
        // Rebroadcast winners to the fanout set.
        for winner in plan.rebroadcast {
            let fanout = node
                .peers
                .lock()
                .expect("peer lock poisoned")
                .list_fanout();
            node.network.republish_block(winner, fanout);
        }

        // Local representatives vote on the winners, twelve hashes at a time.
        if node.config.enable_voting {
            for chunk in plan.bundle.chunks(12) {
                node.generate_votes(chunk);
            }
        }

        let mut mass_requests = 0usize;
        for request in plan.confirm_requests {
            self.solicit_confirmation(node, request, &mut mass_requests);
        }
    }

    /// Ask representatives that have not voted on this root to do so,
    /// falling back to a full broadcast while rep weight is unknown.
    fn solicit_confirmation(
        &self,
        node: &Node,
        request: ConfirmRequest,
        mass_requests: &mut usize,
    ) {
        let (reps, total_weight) = {
            let peers = node.peers.lock().expect("peer lock poisoned");
            (peers.representatives(usize::MAX), peers.total_weight())
        };
        let targets: Vec<_> = reps
            .into_iter()
            .filter(|rep| !request.already_voted.contains(&rep.probable_rep_account))
            .take(CONFIRM_REQ_REPS)
            .map(|rep| rep.endpoint)
            .collect();

        let fall_back = targets.is_empty()
            || total_weight <= node.params.online_weight_minimum
            || *mass_requests > MAX_MASS_REQUESTS;
        if fall_back {
            let everyone: Vec<_> = node
                .peers
                .lock()
                .expect("peer lock poisoned")
                .list()
                .into_iter()
                .map(|peer| peer.endpoint)
                .collect();
            node.network
                .broadcast_confirm_req(request.block, everyone, Duration::ZERO);
            *mass_requests += 1;
        } else {
            node.network
                .broadcast_confirm_req(request.block, targets, CONFIRM_REQ_STAGGER);
        }
    }
}
