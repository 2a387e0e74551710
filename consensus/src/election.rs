//! Per-root election state.
//!
//! An election tracks the best-known vote from each representative for one
//! contested root, re-tallies on change, and confirms once when the leader
//! clears the runner-up by the quorum delta.

use chr_ledger::Block;
use chr_types::{Account, Amount, BlockHash, PublicKey, Root, Timestamp};
use std::collections::HashMap;

/// The latest accepted vote from one representative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteInfo {
    pub time: Timestamp,
    pub sequence: u64,
    pub hash: BlockHash,
}

/// Result of offering a vote to an election.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ElectionVoteResult {
    /// The offered `(sequence, hash)` did not supersede the stored vote.
    pub replay: bool,
    /// The vote was accepted and stored.
    pub processed: bool,
}

/// Snapshot of a (possibly confirmed) election result.
#[derive(Clone, Debug)]
pub struct ElectionStatus {
    pub winner: Block,
    pub tally: Amount,
}

/// Weight lookup and stake context threaded into tally operations.
pub struct TallyContext<'a> {
    pub weight_of: &'a dyn Fn(&Account) -> Amount,
    pub online_stake: Amount,
    /// Margin the leader must hold over the runner-up.
    pub quorum_delta: Amount,
    pub online_weight_minimum: Amount,
    /// The test network waives the minimum-weight vote filter.
    pub test_network: bool,
    pub now: Timestamp,
}

/// What a re-tally asks the caller to do.
#[derive(Default)]
pub struct TallyOutcome {
    /// The tally crowned a new winner: reconcile the ledger onto it.
    pub force: Option<Block>,
    /// Quorum reached now (monotone; fires at most once per election).
    pub confirmed: Option<Block>,
}

pub struct Election {
    pub root: Root,
    /// Current winner and its tally.
    pub status: ElectionStatus,
    /// Candidate blocks by hash.
    pub blocks: HashMap<BlockHash, Block>,
    /// Best accepted vote per representative.
    pub last_votes: HashMap<Account, VoteInfo>,
    /// Per-hash weights from the most recent tally.
    pub last_tally: HashMap<BlockHash, Amount>,
    pub confirmed: bool,
    pub aborted: bool,
}

impl Election {
    /// Seed an election with `primary` as the incumbent winner.
    pub fn new(primary: Block, now: Timestamp) -> Self {
        let hash = primary.hash();
        let root = primary.root();
        let mut last_votes = HashMap::new();
        last_votes.insert(
            Account::NOT_AN_ACCOUNT,
            VoteInfo {
                time: now,
                sequence: 0,
                hash,
            },
        );
        let mut blocks = HashMap::new();
        blocks.insert(hash, primary.clone());
        Self {
            root,
            status: ElectionStatus {
                winner: primary,
                tally: Amount::ZERO,
            },
            blocks,
            last_votes,
            last_tally: HashMap::new(),
            confirmed: false,
            aborted: false,
        }
    }

    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Offer a vote. Admission is gated on the voter's share of online
    /// stake: below 0.1% the vote is ignored outright (test network
    /// excepted); otherwise a cooldown of 15/5/1 seconds applies by weight
    /// band. A vote supersedes the stored one iff its `(sequence, hash)` is
    /// lexicographically greater and the stored vote has aged past the
    /// cooldown.
    pub fn vote(
        &mut self,
        rep: Account,
        sequence: u64,
        hash: BlockHash,
        weight: Amount,
        ctx: &TallyContext<'_>,
    ) -> ElectionVoteResult {
        let supply = ctx.online_stake.number();
        let mut result = ElectionVoteResult::default();
        if !ctx.test_network && weight.number() <= supply / 1000 {
            return result;
        }
        let cooldown_secs: u64 = if weight.number() < supply / 100 {
            15
        } else if weight.number() < supply / 20 {
            5
        } else {
            1
        };
        match self.last_votes.get(&rep) {
            None => result.processed = true,
            Some(last) => {
                if last.sequence < sequence || (last.sequence == sequence && last.hash < hash) {
                    if last.time.has_expired(cooldown_secs, ctx.now) {
                        result.processed = true;
                    }
                } else {
                    result.replay = true;
                }
            }
        }
        if result.processed {
            self.last_votes.insert(
                rep,
                VoteInfo {
                    time: ctx.now,
                    sequence,
                    hash,
                },
            );
        }
        result
    }

    /// Offer an alternate candidate block. Once ten candidates exist,
    /// newcomers holding under a tenth of online stake in the last tally
    /// are dropped. Returns `true` when dropped.
    pub fn publish(&mut self, block: &Block, online_stake: Amount) -> bool {
        let hash = block.hash();
        if self.blocks.len() >= 10 {
            let held = self
                .last_tally
                .get(&hash)
                .copied()
                .unwrap_or(Amount::ZERO);
            if held.number() < online_stake.number() / 10 {
                return true;
            }
        }
        self.blocks.insert(hash, block.clone());
        false
    }

    /// Group accepted votes by hash and weigh each group. Only candidates
    /// with a known block appear in the result, which is sorted weight
    /// descending (hash ascending on ties, for determinism).
    pub fn tally(&mut self, weight_of: &dyn Fn(&Account) -> Amount) -> Vec<(Amount, Block)> {
        let mut block_weights: HashMap<BlockHash, Amount> = HashMap::new();
        for (account, info) in &self.last_votes {
            let entry = block_weights.entry(info.hash).or_insert(Amount::ZERO);
            *entry = entry.saturating_add(weight_of(account));
        }
        self.last_tally = block_weights.clone();
        let mut result: Vec<(Amount, Block)> = block_weights
            .into_iter()
            .filter_map(|(hash, weight)| {
                self.blocks.get(&hash).map(|block| (weight, block.clone()))
            })
            .collect();
        result.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.hash().cmp(&b.1.hash())));
        result
    }

    /// Whether the leader clears the runner-up by the quorum delta.
    pub fn have_quorum(tally: &[(Amount, Block)], delta: Amount) -> bool {
        let Some((first, _)) = tally.first() else {
            return false;
        };
        let second = tally
            .get(1)
            .map(|(weight, _)| *weight)
            .unwrap_or(Amount::ZERO);
        first.number() > second.number().saturating_add(delta.number())
    }

    /// Re-tally, swap the winner when a better-backed candidate emerges
    /// (asking the caller to reconcile the ledger), and confirm on quorum.
    pub fn confirm_if_quorum(&mut self, ctx: &TallyContext<'_>) -> TallyOutcome {
        let tally = self.tally(ctx.weight_of);
        let mut outcome = TallyOutcome::default();
        let Some((winner_weight, winner_block)) = tally.first().cloned() else {
            return outcome;
        };
        self.status.tally = winner_weight;
        let total: u128 = tally
            .iter()
            .fold(0u128, |sum, (weight, _)| sum.saturating_add(weight.number()));
        if total >= ctx.online_weight_minimum.number()
            && winner_block.hash() != self.status.winner.hash()
        {
            outcome.force = Some(winner_block.clone());
            self.status.winner = winner_block.clone();
        }
        if Self::have_quorum(&tally, ctx.quorum_delta) && !self.confirmed {
            self.confirmed = true;
            tracing::debug!(root = %self.root, winner = %self.status.winner.hash(), tally = %winner_weight, "election confirmed");
            outcome.confirmed = Some(self.status.winner.clone());
        }
        outcome
    }

    /// Dump the tally and per-representative votes for diagnostics.
    pub fn log_votes(&self, tally: &[(Amount, Block)]) {
        tracing::info!(root = %self.root, "vote tally");
        for (weight, block) in tally {
            tracing::info!(block = %block.hash(), %weight, "candidate");
        }
        for (account, info) in &self.last_votes {
            tracing::info!(rep = %account, hash = %info.hash, sequence = info.sequence, "last vote");
        }
    }
}
