//! Delegated-stake consensus: votes, elections, and representative
//! liveness tracking.

pub mod active_elections;
pub mod election;
pub mod online_reps;
pub mod rep_crawler;
pub mod vote;

pub use active_elections::{
    ActiveElections, AnnounceContext, AnnouncePlan, ConfirmAction, ConfirmRequest, VoteOutcome,
    ANNOUNCEMENT_LONG, ANNOUNCEMENT_MIN,
};
pub use election::{
    Election, ElectionStatus, ElectionVoteResult, TallyContext, TallyOutcome, VoteInfo,
};
pub use online_reps::OnlineReps;
pub use rep_crawler::RepCrawler;
pub use vote::{Vote, VoteBlock};
