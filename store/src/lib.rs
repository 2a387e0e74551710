//! Storage contract consumed by the ledger and node.
//!
//! Buckets: accounts, blocks by hash (with successor links), pending
//! receives, frontiers, unchecked blocks parked under a missing dependency,
//! latest votes by account, and a miscellaneous meta bucket for node
//! identity and schema version.
//!
//! Block and vote values are opaque serialized bytes here; the ledger and
//! consensus layers own those types and their encoding. The on-disk backend
//! is out of scope for this crate; [`MemoryStore`] implements the contract
//! for the node and tests, honouring the same single-writer discipline.

pub mod error;
pub mod memory;
pub mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use types::{AccountInfo, PendingInfo, PendingKey};

use chr_types::{Account, Amount, BlockHash};

/// Meta-bucket key for the node's identity private key.
pub const META_NODE_ID: &str = "node_id";
/// Meta-bucket key for the schema version.
pub const META_VERSION: &str = "version";
/// Meta-bucket key for the hash of the latest dividend block.
pub const META_LATEST_DIVIDEND: &str = "latest_dividend";

/// Read-only view of the store. Multiple readers may exist concurrently.
pub trait Transaction {
    fn block_get(&self, hash: &BlockHash) -> Option<Vec<u8>>;
    fn block_exists(&self, hash: &BlockHash) -> bool;
    /// Hash of the block whose `previous` is `hash`, if committed.
    fn block_successor(&self, hash: &BlockHash) -> Option<BlockHash>;
    fn block_count(&self) -> u64;
    /// An arbitrary committed block hash, selected by index modulo the
    /// block count. The rep crawler probes peers with it.
    fn nth_block_hash(&self, index: u64) -> Option<BlockHash>;

    fn account_get(&self, account: &Account) -> Option<AccountInfo>;
    fn account_count(&self) -> u64;

    fn frontier_get(&self, hash: &BlockHash) -> Option<Account>;

    fn pending_get(&self, key: &PendingKey) -> Option<PendingInfo>;
    /// Whether any pending entry exists for the account.
    fn pending_any(&self, account: &Account) -> bool;
    fn pending_for_account(&self, account: &Account) -> Vec<(PendingKey, PendingInfo)>;

    fn unchecked_get(&self, dependency: &BlockHash) -> Vec<Vec<u8>>;
    fn unchecked_count(&self) -> u64;

    fn vote_get(&self, account: &Account) -> Option<Vec<u8>>;

    fn rep_weight(&self, representative: &Account) -> Amount;

    fn meta_get(&self, key: &str) -> Option<Vec<u8>>;
}

/// Exclusive writable view. At most one exists at a time; the backend
/// enforces the single-writer, multi-reader discipline.
pub trait WriteTransaction: Transaction {
    fn block_put(&mut self, hash: &BlockHash, bytes: Vec<u8>);
    fn block_del(&mut self, hash: &BlockHash);
    fn successor_set(&mut self, hash: &BlockHash, successor: &BlockHash);
    fn successor_clear(&mut self, hash: &BlockHash);

    fn account_put(&mut self, account: &Account, info: AccountInfo);
    fn account_del(&mut self, account: &Account);

    fn frontier_put(&mut self, hash: &BlockHash, account: &Account);
    fn frontier_del(&mut self, hash: &BlockHash);

    fn pending_put(&mut self, key: PendingKey, info: PendingInfo);
    fn pending_del(&mut self, key: &PendingKey);

    fn unchecked_put(&mut self, dependency: &BlockHash, bytes: Vec<u8>);
    fn unchecked_del(&mut self, dependency: &BlockHash, bytes: &[u8]);

    fn vote_put(&mut self, account: &Account, bytes: Vec<u8>);

    fn rep_weight_put(&mut self, representative: &Account, weight: Amount);

    fn meta_put(&mut self, key: &str, bytes: Vec<u8>);
}

/// A storage backend: hands out transactions over its buckets.
pub trait Store: Send + Sync {
    fn tx_begin_read(&self) -> Box<dyn Transaction + '_>;
    fn tx_begin_write(&self) -> Box<dyn WriteTransaction + '_>;
}
