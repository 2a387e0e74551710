//! In-memory storage engine.
//!
//! Backs the node and the test suites. A `RwLock` over the whole table set
//! gives the same single-writer, multi-reader discipline the on-disk
//! backend provides: `tx_begin_write` holds the write half for the life of
//! the transaction.

use crate::types::{AccountInfo, PendingInfo, PendingKey};
use crate::{Store, Transaction, WriteTransaction};
use chr_types::{Account, Amount, BlockHash, PublicKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    blocks: HashMap<BlockHash, Vec<u8>>,
    successors: HashMap<BlockHash, BlockHash>,
    accounts: HashMap<Account, AccountInfo>,
    frontiers: HashMap<BlockHash, Account>,
    pending: BTreeMap<PendingKey, PendingInfo>,
    unchecked: HashMap<BlockHash, Vec<Vec<u8>>>,
    unchecked_count: u64,
    votes: HashMap<Account, Vec<u8>>,
    rep_weights: HashMap<Account, Amount>,
    meta: HashMap<String, Vec<u8>>,
}

/// The in-memory backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn tx_begin_read(&self) -> Box<dyn Transaction + '_> {
        Box::new(ReadTxn {
            guard: self.tables.read().expect("store lock poisoned"),
        })
    }

    fn tx_begin_write(&self) -> Box<dyn WriteTransaction + '_> {
        Box::new(WriteTxn {
            guard: self.tables.write().expect("store lock poisoned"),
        })
    }
}

struct ReadTxn<'a> {
    guard: RwLockReadGuard<'a, Tables>,
}

struct WriteTxn<'a> {
    guard: RwLockWriteGuard<'a, Tables>,
}

fn read_impl(tables: &Tables) -> TablesRef<'_> {
    TablesRef { tables }
}

/// Shared read implementation over a table snapshot.
struct TablesRef<'a> {
    tables: &'a Tables,
}

impl TablesRef<'_> {
    fn block_get(&self, hash: &BlockHash) -> Option<Vec<u8>> {
        self.tables.blocks.get(hash).cloned()
    }

    fn pending_for_account(&self, account: &Account) -> Vec<(PendingKey, PendingInfo)> {
        let lower = PendingKey::new(*account, BlockHash::ZERO);
        let upper = PendingKey::new(*account, BlockHash::new([0xFF; 32]));
        self.tables
            .pending
            .range(lower..=upper)
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }
}

macro_rules! impl_transaction {
    ($txn:ident) => {
        impl Transaction for $txn<'_> {
            fn block_get(&self, hash: &BlockHash) -> Option<Vec<u8>> {
                read_impl(&self.guard).block_get(hash)
            }

            fn block_exists(&self, hash: &BlockHash) -> bool {
                self.guard.blocks.contains_key(hash)
            }

            fn block_successor(&self, hash: &BlockHash) -> Option<BlockHash> {
                self.guard.successors.get(hash).copied()
            }

            fn block_count(&self) -> u64 {
                self.guard.blocks.len() as u64
            }

            fn nth_block_hash(&self, index: u64) -> Option<BlockHash> {
                if self.guard.blocks.is_empty() {
                    return None;
                }
                let skip = (index % self.guard.blocks.len() as u64) as usize;
                self.guard.blocks.keys().nth(skip).copied()
            }

            fn account_get(&self, account: &Account) -> Option<AccountInfo> {
                self.guard.accounts.get(account).cloned()
            }

            fn account_count(&self) -> u64 {
                self.guard.accounts.len() as u64
            }

            fn frontier_get(&self, hash: &BlockHash) -> Option<Account> {
                self.guard.frontiers.get(hash).copied()
            }

            fn pending_get(&self, key: &PendingKey) -> Option<PendingInfo> {
                self.guard.pending.get(key).cloned()
            }

            fn pending_any(&self, account: &Account) -> bool {
                !read_impl(&self.guard).pending_for_account(account).is_empty()
            }

            fn pending_for_account(&self, account: &Account) -> Vec<(PendingKey, PendingInfo)> {
                read_impl(&self.guard).pending_for_account(account)
            }

            fn unchecked_get(&self, dependency: &BlockHash) -> Vec<Vec<u8>> {
                self.guard
                    .unchecked
                    .get(dependency)
                    .cloned()
                    .unwrap_or_default()
            }

            fn unchecked_count(&self) -> u64 {
                self.guard.unchecked_count
            }

            fn vote_get(&self, account: &Account) -> Option<Vec<u8>> {
                self.guard.votes.get(account).cloned()
            }

            fn rep_weight(&self, representative: &Account) -> Amount {
                self.guard
                    .rep_weights
                    .get(representative)
                    .copied()
                    .unwrap_or(Amount::ZERO)
            }

            fn meta_get(&self, key: &str) -> Option<Vec<u8>> {
                self.guard.meta.get(key).cloned()
            }
        }
    };
}

impl_transaction!(ReadTxn);
impl_transaction!(WriteTxn);

impl WriteTransaction for WriteTxn<'_> {
    fn block_put(&mut self, hash: &BlockHash, bytes: Vec<u8>) {
        self.guard.blocks.insert(*hash, bytes);
    }

    fn block_del(&mut self, hash: &BlockHash) {
        self.guard.blocks.remove(hash);
        self.guard.successors.remove(hash);
    }

    fn successor_set(&mut self, hash: &BlockHash, successor: &BlockHash) {
        self.guard.successors.insert(*hash, *successor);
    }

    fn successor_clear(&mut self, hash: &BlockHash) {
        self.guard.successors.remove(hash);
    }

    fn account_put(&mut self, account: &Account, info: AccountInfo) {
        self.guard.accounts.insert(*account, info);
    }

    fn account_del(&mut self, account: &Account) {
        self.guard.accounts.remove(account);
    }

    fn frontier_put(&mut self, hash: &BlockHash, account: &Account) {
        self.guard.frontiers.insert(*hash, *account);
    }

    fn frontier_del(&mut self, hash: &BlockHash) {
        self.guard.frontiers.remove(hash);
    }

    fn pending_put(&mut self, key: PendingKey, info: PendingInfo) {
        self.guard.pending.insert(key, info);
    }

    fn pending_del(&mut self, key: &PendingKey) {
        self.guard.pending.remove(key);
    }

    fn unchecked_put(&mut self, dependency: &BlockHash, bytes: Vec<u8>) {
        let entries = self.guard.unchecked.entry(*dependency).or_default();
        if !entries.iter().any(|existing| *existing == bytes) {
            entries.push(bytes);
            self.guard.unchecked_count += 1;
        }
    }

    fn unchecked_del(&mut self, dependency: &BlockHash, bytes: &[u8]) {
        let mut removed = 0;
        if let Some(entries) = self.guard.unchecked.get_mut(dependency) {
            let before = entries.len();
            entries.retain(|existing| existing != bytes);
            removed = (before - entries.len()) as u64;
            if entries.is_empty() {
                self.guard.unchecked.remove(dependency);
            }
        }
        self.guard.unchecked_count -= removed;
    }

    fn vote_put(&mut self, account: &Account, bytes: Vec<u8>) {
        self.guard.votes.insert(*account, bytes);
    }

    fn rep_weight_put(&mut self, representative: &Account, weight: Amount) {
        if weight.is_zero() {
            self.guard.rep_weights.remove(representative);
        } else {
            self.guard.rep_weights.insert(*representative, weight);
        }
    }

    fn meta_put(&mut self, key: &str, bytes: Vec<u8>) {
        self.guard.meta.insert(key.to_string(), bytes);
    }
}
