//! Persisted record types.

use chr_types::{Account, Amount, BlockHash, Timestamp};
use serde::{Deserialize, Serialize};

/// Per-account ledger head state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Hash of the most recent block on the account's chain.
    pub head: BlockHash,
    /// Hash of the account's open block.
    pub open_block: BlockHash,
    /// Representative the account currently delegates to.
    pub representative: Account,
    /// Balance as of `head`.
    pub balance: Amount,
    /// Latest dividend block this account has claimed.
    pub dividend: BlockHash,
    /// When the account was last modified.
    pub modified: Timestamp,
    /// Number of blocks on the chain.
    pub block_count: u64,
}

/// Key of a pending (unreceived) send: destination account plus send hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PendingKey {
    pub account: Account,
    pub hash: BlockHash,
}

impl PendingKey {
    pub fn new(account: Account, hash: BlockHash) -> Self {
        Self { account, hash }
    }
}

/// Value of a pending send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInfo {
    /// Account that sent the funds.
    pub source: Account,
    /// Amount in transit.
    pub amount: Amount,
    /// Dividend epoch the send was made under.
    pub dividend: BlockHash,
}
