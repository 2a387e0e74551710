//! The active-elections manager.
//!
//! One election per conflicting root, indexed two ways: by root and by any
//! candidate block hash (so a confirm_ack naming a bare hash routes without
//! knowing its root). The manager is a plain container; the node drives the
//! announcement schedule and executes the plans this module emits.

use crate::election::{Election, ElectionStatus, TallyContext};
use crate::vote::{Vote, VoteBlock};
use chr_ledger::Block;
use chr_types::{Account, Amount, BlockHash, PublicKey, Root, Timestamp};
use std::collections::{HashMap, HashSet, VecDeque};

/// Fired once when an election confirms.
pub type ConfirmAction = Box<dyn Fn(&Block) + Send>;

/// How many confirmed-election statuses are kept for diagnostics.
const ELECTION_HISTORY_CAP: usize = 2048;

/// Announcements below which a finished election is still kept visible.
pub const ANNOUNCEMENT_MIN: u32 = 4;
/// Announcement count past which an election is considered long-running and
/// the rebroadcast schedule thins out.
pub const ANNOUNCEMENT_LONG: u32 = 20;

struct ConflictInfo {
    election: Election,
    announcements: u32,
    /// The block broadcast in confirm_req for this root (the incumbent in a
    /// fork).
    confirm_req: Block,
    on_confirm: Option<ConfirmAction>,
}

/// Side effects a vote routing pass asks the caller to perform.
#[derive(Default)]
pub struct VoteOutcome {
    pub replay: bool,
    pub processed: bool,
    /// Winners that changed: force-inject into the block processor so the
    /// ledger reconciles onto them.
    pub forces: Vec<Block>,
    /// Elections confirmed by this vote, with their confirmation actions.
    pub confirmations: Vec<(Block, Option<ConfirmAction>)>,
}

/// Alias kept for callers pattern-matching on `start`.
pub type StartOutcome = bool;

/// A confirm_req the announcement pass wants sent.
pub struct ConfirmRequest {
    pub block: Block,
    /// Representatives whose vote this election already holds; the node
    /// skips them when targeting.
    pub already_voted: HashSet<Account>,
}

/// Work produced by one announcement pass.
#[derive(Default)]
pub struct AnnouncePlan {
    /// Winners to republish to the fanout set.
    pub rebroadcast: Vec<Block>,
    /// Winner hashes for local representatives to self-vote on.
    pub bundle: Vec<BlockHash>,
    pub confirm_requests: Vec<ConfirmRequest>,
    /// Confirmed elections removed from the active set this pass.
    pub confirmed_removed: Vec<ElectionStatus>,
    /// Live elections past the long-running threshold.
    pub unconfirmed: usize,
}

/// Inputs the announcement pass needs from the ledger.
pub struct AnnounceContext<'a> {
    pub could_fit: &'a dyn Fn(&Block) -> bool,
    pub weight_of: &'a dyn Fn(&Account) -> Amount,
}

#[derive(Default)]
pub struct ActiveElections {
    roots: HashMap<Root, ConflictInfo>,
    successors: HashMap<BlockHash, Root>,
    history: VecDeque<ElectionStatus>,
}

impl ActiveElections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an election for `primary.root()` unless one exists. Returns
    /// `true` when an election was already running (the start is rejected).
    pub fn start(
        &mut self,
        primary: Block,
        alternate: Option<Block>,
        on_confirm: ConfirmAction,
        now: Timestamp,
    ) -> StartOutcome {
        let root = primary.root();
        if self.roots.contains_key(&root) {
            return true;
        }
        let mut election = Election::new(primary.clone(), now);
        self.successors.insert(primary.hash(), root);
        if let Some(alternate) = alternate {
            if alternate.root() == root {
                election.blocks.insert(alternate.hash(), alternate.clone());
                self.successors.insert(alternate.hash(), root);
            }
        }
        self.roots.insert(
            root,
            ConflictInfo {
                election,
                announcements: 0,
                confirm_req: primary,
                on_confirm: Some(on_confirm),
            },
        );
        false
    }

    /// Offer an alternate candidate to an existing election. Returns `true`
    /// when the block was dropped (no election, or the candidate cap).
    pub fn publish(&mut self, block: &Block, online_stake: Amount) -> bool {
        let root = block.root();
        let Some(info) = self.roots.get_mut(&root) else {
            return true;
        };
        let dropped = info.election.publish(block, online_stake);
        if !dropped {
            self.successors.insert(block.hash(), root);
        }
        dropped
    }

    /// Route each entry of a vote's bundle to its election: by exact hash
    /// for bare-hash entries, by root for full blocks. Returns the combined
    /// outcome; `replay` is sticky across entries.
    pub fn vote(&mut self, vote: &Vote, ctx: &TallyContext<'_>) -> VoteOutcome {
        let mut outcome = VoteOutcome::default();
        let weight = (ctx.weight_of)(&vote.account);
        for entry in &vote.blocks {
            let root = match entry {
                VoteBlock::Hash(hash) => self.successors.get(hash).copied(),
                VoteBlock::Block(block) => Some(block.root()),
            };
            let Some(root) = root else {
                continue;
            };
            let Some(info) = self.roots.get_mut(&root) else {
                continue;
            };
            let result =
                info.election
                    .vote(vote.account, vote.sequence, entry.hash(), weight, ctx);
            outcome.replay |= result.replay;
            outcome.processed |= result.processed;
            if result.processed && !info.election.confirmed {
                let tally = info.election.confirm_if_quorum(ctx);
                if let Some(force) = tally.force {
                    outcome.forces.push(force);
                }
                if let Some(winner) = tally.confirmed {
                    outcome.confirmations.push((winner, info.on_confirm.take()));
                }
            }
        }
        outcome
    }

    /// Drop the election for `block.root()`, if any. Used by the forced
    /// ingress path after a rollback.
    pub fn erase(&mut self, block: &Block) {
        if let Some(info) = self.roots.remove(&block.root()) {
            for hash in info.election.blocks.keys() {
                self.successors.remove(hash);
            }
            tracing::debug!(root = %block.root(), "election erased");
        }
    }

    /// Whether an election exists for `block.root()`.
    pub fn active(&self, block: &Block) -> bool {
        self.roots.contains_key(&block.root())
    }

    /// Current winners of every live election.
    pub fn winners(&self) -> Vec<Block> {
        self.roots
            .values()
            .map(|info| info.election.status.winner.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Recently confirmed election results, oldest first.
    pub fn history(&self) -> &VecDeque<ElectionStatus> {
        &self.history
    }

    /// Drop every election, e.g. at shutdown.
    pub fn clear(&mut self) {
        self.roots.clear();
        self.successors.clear();
    }

    /// One pass of the announcement schedule. Finished elections that have
    /// been announced at least `ANNOUNCEMENT_MIN - 1` times are retired;
    /// live ones accumulate rebroadcast and confirm_req work. Each
    /// election's announcement counter advances exactly once.
    pub fn announce_pass(&mut self, ctx: &AnnounceContext<'_>) -> AnnouncePlan {
        let mut plan = AnnouncePlan::default();
        let mut inactive: Vec<Root> = Vec::new();

        for (root, info) in self.roots.iter_mut() {
            let election = &mut info.election;
            if (election.confirmed || election.aborted)
                && info.announcements >= ANNOUNCEMENT_MIN - 1
            {
                if election.confirmed {
                    self.history.push_back(election.status.clone());
                    if self.history.len() > ELECTION_HISTORY_CAP {
                        self.history.pop_front();
                    }
                    plan.confirmed_removed.push(election.status.clone());
                }
                inactive.push(*root);
            } else {
                if info.announcements > ANNOUNCEMENT_LONG {
                    plan.unconfirmed += 1;
                    // Long-running elections dump their tally periodically.
                    if info.announcements % 50 == 1 {
                        let tally = election.tally(ctx.weight_of);
                        election.log_votes(&tally);
                    }
                }
                if info.announcements < ANNOUNCEMENT_LONG
                    || info.announcements % ANNOUNCEMENT_LONG == 1
                {
                    if (ctx.could_fit)(&election.status.winner) {
                        plan.rebroadcast.push(election.status.winner.clone());
                        plan.bundle.push(election.status.winner.hash());
                    } else if info.announcements > 3 {
                        // The winner cannot connect to the ledger; give up.
                        election.abort();
                    }
                }
                if info.announcements % 4 == 1 {
                    plan.confirm_requests.push(ConfirmRequest {
                        block: info.confirm_req.clone(),
                        already_voted: election.last_votes.keys().copied().collect(),
                    });
                }
            }
            info.announcements += 1;
        }

        for root in inactive {
            if let Some(info) = self.roots.remove(&root) {
                for hash in info.election.blocks.keys() {
                    self.successors.remove(hash);
                }
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chr_crypto::generate_keypair;
    use chr_ledger::{CommonFields, StateBlock};
    use chr_types::Signature;

    fn block(previous: u8, balance: u128) -> Block {
        Block::State(StateBlock {
            fields: CommonFields {
                account: PublicKey([1u8; 32]),
                previous: BlockHash::new([previous; 32]),
                representative: PublicKey([1u8; 32]),
                balance: Amount::raw(balance),
                dividend: BlockHash::ZERO,
                link: BlockHash::ZERO,
            },
            signature: Signature::ZERO,
            work: 0,
        })
    }

    fn noop() -> ConfirmAction {
        Box::new(|_| {})
    }

    fn now() -> Timestamp {
        Timestamp::new(1_000)
    }

    fn signed_vote(sequence: u64, blocks: Vec<VoteBlock>) -> (Vote, Account) {
        let keys = generate_keypair();
        (
            Vote::new(keys.public, &keys.private, sequence, blocks),
            keys.public,
        )
    }

    #[test]
    fn start_is_idempotent_per_root() {
        let mut active = ActiveElections::new();
        let primary = block(2, 10);
        assert!(!active.start(primary.clone(), None, noop(), now()));
        assert!(active.start(primary.clone(), None, noop(), now()));
        assert_eq!(active.len(), 1);
        assert!(active.active(&primary));
    }

    #[test]
    fn start_with_alternate_indexes_both_hashes() {
        let mut active = ActiveElections::new();
        let primary = block(2, 10);
        let alternate = block(2, 20);
        active.start(primary.clone(), Some(alternate.clone()), noop(), now());

        // A hash-only vote for the alternate routes to the election.
        let (vote, rep) = signed_vote(1, vec![VoteBlock::Hash(alternate.hash())]);
        let weight_of = |_: &Account| Amount::raw(600);
        let ctx = TallyContext {
            weight_of: &weight_of,
            online_stake: Amount::raw(1_000),
            quorum_delta: Amount::raw(1_000),
            online_weight_minimum: Amount::raw(10_000),
            test_network: true,
            now: now(),
        };
        let outcome = active.vote(&vote, &ctx);
        assert!(outcome.processed);
        let _ = rep;
    }

    #[test]
    fn vote_for_unknown_root_is_neither() {
        let mut active = ActiveElections::new();
        let (vote, _) = signed_vote(1, vec![VoteBlock::Hash(BlockHash::new([9u8; 32]))]);
        let weight_of = |_: &Account| Amount::raw(600);
        let ctx = TallyContext {
            weight_of: &weight_of,
            online_stake: Amount::raw(1_000),
            quorum_delta: Amount::raw(100),
            online_weight_minimum: Amount::raw(100),
            test_network: true,
            now: now(),
        };
        let outcome = active.vote(&vote, &ctx);
        assert!(!outcome.processed);
        assert!(!outcome.replay);
    }

    #[test]
    fn repeat_vote_reports_replay() {
        let mut active = ActiveElections::new();
        let primary = block(2, 10);
        active.start(primary.clone(), None, noop(), now());

        let keys = generate_keypair();
        let make = |sequence| {
            Vote::new(
                keys.public,
                &keys.private,
                sequence,
                vec![VoteBlock::Hash(primary.hash())],
            )
        };
        let weight_of = |_: &Account| Amount::raw(600);
        let ctx = TallyContext {
            weight_of: &weight_of,
            online_stake: Amount::raw(1_000),
            quorum_delta: Amount::raw(10_000),
            online_weight_minimum: Amount::raw(100_000),
            test_network: true,
            now: now(),
        };
        assert!(active.vote(&make(5), &ctx).processed);
        let second = active.vote(&make(5), &ctx);
        assert!(second.replay);
        assert!(!second.processed);
    }

    #[test]
    fn quorum_vote_confirms_and_fires_action_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut active = ActiveElections::new();
        let primary = block(2, 10);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        active.start(
            primary.clone(),
            None,
            Box::new(move |_| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
            now(),
        );

        let (vote, _) = signed_vote(1, vec![VoteBlock::Hash(primary.hash())]);
        let weight_of = |_: &Account| Amount::raw(900);
        let ctx = TallyContext {
            weight_of: &weight_of,
            online_stake: Amount::raw(1_000),
            quorum_delta: Amount::raw(500),
            online_weight_minimum: Amount::raw(100),
            test_network: true,
            now: now(),
        };
        let outcome = active.vote(&vote, &ctx);
        assert_eq!(outcome.confirmations.len(), 1);
        let (winner, action) = outcome.confirmations.into_iter().next().unwrap();
        assert_eq!(winner.hash(), primary.hash());
        action.expect("action taken on first confirmation")(&winner);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn erase_removes_both_indexes() {
        let mut active = ActiveElections::new();
        let primary = block(2, 10);
        active.start(primary.clone(), None, noop(), now());
        active.erase(&primary);
        assert!(!active.active(&primary));
        assert!(active.is_empty());

        let (vote, _) = signed_vote(1, vec![VoteBlock::Hash(primary.hash())]);
        let weight_of = |_: &Account| Amount::raw(900);
        let ctx = TallyContext {
            weight_of: &weight_of,
            online_stake: Amount::raw(1_000),
            quorum_delta: Amount::raw(100),
            online_weight_minimum: Amount::raw(100),
            test_network: true,
            now: now(),
        };
        assert!(!active.vote(&vote, &ctx).processed);
    }

    #[test]
    fn confirmed_election_retires_after_minimum_announcements() {
        let mut active = ActiveElections::new();
        let primary = block(2, 10);
        active.start(primary.clone(), None, noop(), now());

        let (vote, _) = signed_vote(1, vec![VoteBlock::Hash(primary.hash())]);
        let weight_of = |_: &Account| Amount::raw(900);
        let ctx = TallyContext {
            weight_of: &weight_of,
            online_stake: Amount::raw(1_000),
            quorum_delta: Amount::raw(100),
            online_weight_minimum: Amount::raw(100),
            test_network: true,
            now: now(),
        };
        active.vote(&vote, &ctx);

        let could_fit = |_: &Block| true;
        let announce_ctx = AnnounceContext {
            could_fit: &could_fit,
            weight_of: &weight_of,
        };
        // Announcements 0..2: still below ANNOUNCEMENT_MIN - 1
        for _ in 0..3 {
            let plan = active.announce_pass(&announce_ctx);
            assert!(plan.confirmed_removed.is_empty());
        }
        // Fourth pass retires it
        let plan = active.announce_pass(&announce_ctx);
        assert_eq!(plan.confirmed_removed.len(), 1);
        assert!(active.is_empty());
        assert_eq!(active.history().len(), 1);
    }

    #[test]
    fn unfitting_winner_aborts_after_three_announcements() {
        let mut active = ActiveElections::new();
        let primary = block(2, 10);
        active.start(primary.clone(), None, noop(), now());

        let could_fit = |_: &Block| false;
        let weight_of = |_: &Account| Amount::ZERO;
        let ctx = AnnounceContext {
            could_fit: &could_fit,
            weight_of: &weight_of,
        };
        // Pass 1..4: announcements 0..3, no abort yet (counter must exceed 3)
        for _ in 0..4 {
            active.announce_pass(&ctx);
            assert_eq!(active.len(), 1);
        }
        // announcements == 4 > 3: aborts now
        active.announce_pass(&ctx);
        // Aborted elections retire once the minimum announcements are met.
        let plan = active.announce_pass(&ctx);
        assert!(plan.confirmed_removed.is_empty());
        assert!(active.is_empty());
    }

    #[test]
    fn announce_pass_emits_rebroadcast_and_requests() {
        let mut active = ActiveElections::new();
        let a = block(2, 10);
        let b = block(3, 10);
        active.start(a.clone(), None, noop(), now());
        active.start(b.clone(), None, noop(), now());

        let could_fit = |_: &Block| true;
        let weight_of = |_: &Account| Amount::ZERO;
        let ctx = AnnounceContext {
            could_fit: &could_fit,
            weight_of: &weight_of,
        };
        let plan = active.announce_pass(&ctx);
        // First pass: both rebroadcast, no confirm_req (0 % 4 != 1)
        assert_eq!(plan.rebroadcast.len(), 2);
        assert_eq!(plan.bundle.len(), 2);
        assert!(plan.confirm_requests.is_empty());

        // Second pass: announcements == 1 → confirm_req round
        let plan = active.announce_pass(&ctx);
        assert_eq!(plan.confirm_requests.len(), 2);
        for request in &plan.confirm_requests {
            assert!(request.already_voted.contains(&Account::NOT_AN_ACCOUNT));
        }
    }

    #[test]
    fn publish_routes_to_election_and_indexes_hash() {
        let mut active = ActiveElections::new();
        let primary = block(2, 10);
        let alternate = block(2, 20);
        active.start(primary.clone(), None, noop(), now());

        assert!(!active.publish(&alternate, Amount::raw(1_000)));
        // Unknown root: dropped
        assert!(active.publish(&block(9, 1), Amount::raw(1_000)));

        // Hash-routing now works for the published candidate
        let (vote, _) = signed_vote(1, vec![VoteBlock::Hash(alternate.hash())]);
        let weight_of = |_: &Account| Amount::raw(600);
        let ctx = TallyContext {
            weight_of: &weight_of,
            online_stake: Amount::raw(1_000),
            quorum_delta: Amount::raw(10_000),
            online_weight_minimum: Amount::raw(100_000),
            test_network: true,
            now: now(),
        };
        assert!(active.vote(&vote, &ctx).processed);
    }
}
