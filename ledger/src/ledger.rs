//! Ledger application and queries.
//!
//! `process` applies one block under the caller's writable transaction and
//! reports the outcome; it never panics on untrusted input. Reads go
//! through whichever transaction the caller holds.

use crate::block::{Block, BlockKind};
use chr_store::{
    AccountInfo, PendingInfo, PendingKey, Transaction, WriteTransaction, META_LATEST_DIVIDEND,
};
use chr_types::{Account, Amount, BlockHash, PublicKey, Root, Timestamp};
use thiserror::Error;

/// Outcome of applying a block to the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Block was applied.
    Progress,
    /// The block's previous is not in the ledger.
    GapPrevious,
    /// The receive's source (or claim's dividend) is not in the ledger.
    GapSource,
    /// Block is already in the ledger.
    Old,
    /// Signature does not verify under the block's account.
    BadSignature,
    /// Balance decreased where only an increase is legal.
    NegativeSpend,
    /// No matching pending entry for the receive.
    Unreceivable,
    /// A different block already occupies this root.
    Fork,
    /// Attempt to open the burn account.
    OpenedBurnAccount,
    /// Received amount does not match the pending amount.
    BalanceMismatch,
    /// Claims may not change the account's representative.
    RepresentativeMismatch,
    /// Previous belongs to a different account's chain.
    BlockPosition,
    /// The dividend account still has unreceived pendings.
    OutstandingPendings,
    /// Distributed amount below the protocol minimum.
    DividendTooSmall,
    /// The account must claim the current dividend epoch first.
    IncorrectDividend,
    /// A competing dividend chain head.
    DividendFork,
    /// Only the dividend account may open an epoch.
    InvalidDividendAccount,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("block {0} is not in the ledger")]
    BlockNotFound(BlockHash),
    #[error("block {0} cannot be rolled back: a dependent block consumed its send")]
    Unrollbackable(BlockHash),
}

/// The burn account: funds sent here leave circulation.
pub const BURN_ACCOUNT: Account = Account::ZERO;

/// Ledger rules bound to a genesis configuration.
pub struct Ledger {
    /// Account allowed to open dividend epochs.
    pub dividend_account: Account,
    /// Smallest distributable dividend.
    pub dividend_minimum: Amount,
}

impl Ledger {
    pub fn new(dividend_account: Account, dividend_minimum: Amount) -> Self {
        Self {
            dividend_account,
            dividend_minimum,
        }
    }

    // ── Application ─────────────────────────────────────────────────────

    /// Apply `block` under `txn`. On `Progress` all buckets are updated;
    /// any other outcome leaves the store untouched.
    pub fn process(&self, txn: &mut dyn WriteTransaction, block: &Block) -> ProcessResult {
        let hash = block.hash();
        if txn.block_exists(&hash) {
            return ProcessResult::Old;
        }
        // Nobody holds the burn key, so this must precede signature checking.
        if block.account() == BURN_ACCOUNT {
            return ProcessResult::OpenedBurnAccount;
        }
        if !block.verify_signature() {
            return ProcessResult::BadSignature;
        }
        let result = match block.kind() {
            BlockKind::State => self.process_state(txn, block, &hash),
            BlockKind::Dividend => self.process_dividend(txn, block, &hash),
            BlockKind::Claim => self.process_claim(txn, block, &hash),
            BlockKind::NotABlock => unreachable!("NotABlock carries no body"),
        };
        if result == ProcessResult::Progress {
            tracing::trace!(block = %hash, kind = ?block.kind(), "block applied");
        }
        result
    }

    fn process_state(
        &self,
        txn: &mut dyn WriteTransaction,
        block: &Block,
        hash: &BlockHash,
    ) -> ProcessResult {
        let fields = block.fields();
        if fields.previous.is_zero() {
            // Account open. Must receive from an existing pending send.
            if txn.account_get(&fields.account).is_some() {
                return ProcessResult::Fork;
            }
            if !fields.dividend.is_zero() {
                return ProcessResult::IncorrectDividend;
            }
            if fields.link.is_zero() {
                return ProcessResult::Unreceivable;
            }
            if !txn.block_exists(&fields.link) {
                return ProcessResult::GapSource;
            }
            let key = PendingKey::new(fields.account, fields.link);
            let Some(pending) = txn.pending_get(&key) else {
                return ProcessResult::Unreceivable;
            };
            if pending.amount != fields.balance {
                return ProcessResult::BalanceMismatch;
            }

            txn.pending_del(&key);
            txn.block_put(hash, block.to_store_bytes());
            txn.frontier_put(hash, &fields.account);
            txn.account_put(
                &fields.account,
                AccountInfo {
                    head: *hash,
                    open_block: *hash,
                    representative: fields.representative,
                    balance: fields.balance,
                    // New accounts start at the epoch the send was made under;
                    // older epochs predate the account.
                    dividend: pending.dividend,
                    modified: Timestamp::now(),
                    block_count: 1,
                },
            );
            self.weight_add(txn, &fields.representative, fields.balance);
            return ProcessResult::Progress;
        }

        // Chain block.
        let Some(prev_bytes) = txn.block_get(&fields.previous) else {
            return ProcessResult::GapPrevious;
        };
        let prev = Block::from_store_bytes(&prev_bytes).expect("stored blocks are well-formed");
        if prev.account() != fields.account {
            return ProcessResult::BlockPosition;
        }
        let Some(info) = txn.account_get(&fields.account) else {
            return ProcessResult::GapPrevious;
        };
        if info.head != fields.previous {
            return ProcessResult::Fork;
        }

        let is_send = fields.balance < info.balance;
        if is_send {
            // Sends are blocked until the account is caught up on dividends.
            let latest = self.latest_dividend(&*txn);
            if fields.dividend != info.dividend || info.dividend != latest {
                return ProcessResult::IncorrectDividend;
            }
        } else if fields.dividend != info.dividend {
            return ProcessResult::IncorrectDividend;
        }

        if is_send {
            let amount = info.balance - fields.balance;
            let destination = PublicKey(*fields.link.as_bytes());
            txn.pending_put(
                PendingKey::new(destination, *hash),
                PendingInfo {
                    source: fields.account,
                    amount,
                    dividend: fields.dividend,
                },
            );
        } else if fields.balance > info.balance {
            // Receive: link names the source send.
            if !txn.block_exists(&fields.link) {
                return ProcessResult::GapSource;
            }
            let key = PendingKey::new(fields.account, fields.link);
            let Some(pending) = txn.pending_get(&key) else {
                return ProcessResult::Unreceivable;
            };
            if pending.amount != fields.balance - info.balance {
                return ProcessResult::BalanceMismatch;
            }
            txn.pending_del(&key);
        } else {
            // Representative change; a zero-amount receive is not a thing.
            if !fields.link.is_zero() {
                return ProcessResult::BalanceMismatch;
            }
        }

        self.commit_chain_block(txn, block, hash, &info, info.dividend);
        ProcessResult::Progress
    }

    fn process_dividend(
        &self,
        txn: &mut dyn WriteTransaction,
        block: &Block,
        hash: &BlockHash,
    ) -> ProcessResult {
        let fields = block.fields();
        if fields.account != self.dividend_account {
            return ProcessResult::InvalidDividendAccount;
        }
        if fields.previous.is_zero() {
            return ProcessResult::BlockPosition;
        }
        if !txn.block_exists(&fields.previous) {
            return ProcessResult::GapPrevious;
        }
        let Some(info) = txn.account_get(&fields.account) else {
            return ProcessResult::GapPrevious;
        };
        if info.head != fields.previous {
            return ProcessResult::Fork;
        }
        if fields.dividend != self.latest_dividend(&*txn) {
            return ProcessResult::DividendFork;
        }
        if txn.pending_any(&fields.account) {
            return ProcessResult::OutstandingPendings;
        }
        if fields.balance > info.balance {
            return ProcessResult::NegativeSpend;
        }
        let distributed = info.balance - fields.balance;
        if distributed < self.dividend_minimum {
            return ProcessResult::DividendTooSmall;
        }

        // The issuing account is trivially current on its own epoch.
        self.commit_chain_block(txn, block, hash, &info, *hash);
        txn.meta_put(META_LATEST_DIVIDEND, hash.as_bytes().to_vec());
        tracing::debug!(dividend = %hash, %distributed, "dividend epoch opened");
        ProcessResult::Progress
    }

    fn process_claim(
        &self,
        txn: &mut dyn WriteTransaction,
        block: &Block,
        hash: &BlockHash,
    ) -> ProcessResult {
        let fields = block.fields();
        if fields.previous.is_zero() {
            return ProcessResult::BlockPosition;
        }
        if !txn.block_exists(&fields.previous) {
            return ProcessResult::GapPrevious;
        }
        let Some(info) = txn.account_get(&fields.account) else {
            return ProcessResult::GapPrevious;
        };
        if info.head != fields.previous {
            return ProcessResult::Fork;
        }
        let Some(dividend_bytes) = txn.block_get(&fields.dividend) else {
            return ProcessResult::GapSource;
        };
        let dividend_block =
            Block::from_store_bytes(&dividend_bytes).expect("stored blocks are well-formed");
        if dividend_block.kind() != BlockKind::Dividend {
            return ProcessResult::Unreceivable;
        }
        // Epochs are claimed in order: the claimed epoch must directly
        // follow the account's current one.
        if dividend_block.dividend() != info.dividend {
            return ProcessResult::IncorrectDividend;
        }
        if fields.representative != info.representative {
            return ProcessResult::RepresentativeMismatch;
        }
        if fields.balance < info.balance {
            return ProcessResult::NegativeSpend;
        }
        let claimed = fields.balance - info.balance;
        let distributed = self.amount(&*txn, &fields.dividend).unwrap_or(Amount::ZERO);
        if claimed > distributed {
            return ProcessResult::BalanceMismatch;
        }

        self.commit_chain_block(txn, block, hash, &info, fields.dividend);
        ProcessResult::Progress
    }

    /// Shared tail for non-open blocks: store, relink frontier and
    /// successor, move representative weight, update the account record.
    fn commit_chain_block(
        &self,
        txn: &mut dyn WriteTransaction,
        block: &Block,
        hash: &BlockHash,
        info: &AccountInfo,
        new_dividend: BlockHash,
    ) {
        let fields = block.fields();
        txn.block_put(hash, block.to_store_bytes());
        txn.successor_set(&fields.previous, hash);
        txn.frontier_del(&fields.previous);
        txn.frontier_put(hash, &fields.account);
        self.weight_sub(txn, &info.representative, info.balance);
        self.weight_add(txn, &fields.representative, fields.balance);
        txn.account_put(
            &fields.account,
            AccountInfo {
                head: *hash,
                open_block: info.open_block,
                representative: fields.representative,
                balance: fields.balance,
                dividend: new_dividend,
                modified: Timestamp::now(),
                block_count: info.block_count + 1,
            },
        );
    }

    // ── Rollback ────────────────────────────────────────────────────────

    /// Roll back `hash` and everything above it on its account chain.
    /// Returns the removed blocks, head first. Fails without mutating if a
    /// removed send has already been received elsewhere.
    pub fn rollback(
        &self,
        txn: &mut dyn WriteTransaction,
        hash: &BlockHash,
    ) -> Result<Vec<Block>, LedgerError> {
        let target_bytes = txn
            .block_get(hash)
            .ok_or(LedgerError::BlockNotFound(*hash))?;
        let target = Block::from_store_bytes(&target_bytes).expect("stored blocks are well-formed");
        let account = target.account();
        let info = txn
            .account_get(&account)
            .ok_or(LedgerError::BlockNotFound(*hash))?;

        // Collect head..=target.
        let mut chain = Vec::new();
        let mut cursor = info.head;
        loop {
            let bytes = txn
                .block_get(&cursor)
                .ok_or(LedgerError::BlockNotFound(cursor))?;
            let block = Block::from_store_bytes(&bytes).expect("stored blocks are well-formed");
            let previous = block.previous();
            let is_target = cursor == *hash;
            chain.push(block);
            if is_target {
                break;
            }
            if previous.is_zero() {
                return Err(LedgerError::BlockNotFound(*hash));
            }
            cursor = previous;
        }

        // A send whose pending was consumed cannot be undone here.
        for block in &chain {
            if matches!(block.kind(), BlockKind::State) {
                let block_hash = block.hash();
                if let Some(prev_balance) = self.balance_at(&*txn, &block.previous()) {
                    if block.balance() < prev_balance {
                        let destination = PublicKey(*block.link().as_bytes());
                        if txn
                            .pending_get(&PendingKey::new(destination, block_hash))
                            .is_none()
                        {
                            return Err(LedgerError::Unrollbackable(block_hash));
                        }
                    }
                }
            }
        }

        for block in &chain {
            self.rollback_one(txn, block);
        }
        tracing::debug!(target = %hash, count = chain.len(), "rolled back chain segment");
        Ok(chain)
    }

    fn rollback_one(&self, txn: &mut dyn WriteTransaction, block: &Block) {
        let hash = block.hash();
        let fields = block.fields();
        let account = fields.account;
        let prev_balance = self
            .balance_at(&*txn, &fields.previous)
            .unwrap_or(Amount::ZERO);

        match block.kind() {
            BlockKind::State => {
                if fields.balance < prev_balance {
                    // Undo send: retract the pending entry.
                    let destination = PublicKey(*fields.link.as_bytes());
                    txn.pending_del(&PendingKey::new(destination, hash));
                } else if fields.balance > prev_balance {
                    // Undo receive: restore the pending entry.
                    let source_account = self
                        .block_account(&*txn, &fields.link)
                        .unwrap_or(BURN_ACCOUNT);
                    let source_dividend = self
                        .block_get(&*txn, &fields.link)
                        .map(|b| b.dividend())
                        .unwrap_or(BlockHash::ZERO);
                    txn.pending_put(
                        PendingKey::new(account, fields.link),
                        PendingInfo {
                            source: source_account,
                            amount: fields.balance - prev_balance,
                            dividend: source_dividend,
                        },
                    );
                }
            }
            BlockKind::Dividend => {
                txn.meta_put(META_LATEST_DIVIDEND, fields.dividend.as_bytes().to_vec());
            }
            BlockKind::Claim | BlockKind::NotABlock => {}
        }

        self.weight_sub(txn, &fields.representative, fields.balance);
        txn.frontier_del(&hash);
        txn.block_del(&hash);

        if fields.previous.is_zero() {
            txn.account_del(&account);
        } else {
            let prev =
                self.block_get(&*txn, &fields.previous).expect("previous of committed block exists");
            txn.successor_clear(&fields.previous);
            txn.frontier_put(&fields.previous, &account);
            self.weight_add(txn, &prev.representative(), prev.balance());
            let info = txn.account_get(&account).expect("account exists during rollback");
            txn.account_put(
                &account,
                AccountInfo {
                    head: fields.previous,
                    open_block: info.open_block,
                    representative: prev.representative(),
                    balance: prev.balance(),
                    dividend: prev.dividend_state(),
                    modified: Timestamp::now(),
                    block_count: info.block_count.saturating_sub(1),
                },
            );
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn block_exists(&self, txn: &(impl Transaction + ?Sized), hash: &BlockHash) -> bool {
        txn.block_exists(hash)
    }

    pub fn block_get(&self, txn: &(impl Transaction + ?Sized), hash: &BlockHash) -> Option<Block> {
        txn.block_get(hash)
            .and_then(|bytes| Block::from_store_bytes(&bytes))
    }

    /// The head of `account`'s chain, or zero.
    pub fn latest(&self, txn: &(impl Transaction + ?Sized), account: &Account) -> BlockHash {
        txn.account_get(account)
            .map(|info| info.head)
            .unwrap_or(BlockHash::ZERO)
    }

    pub fn account_balance(&self, txn: &(impl Transaction + ?Sized), account: &Account) -> Amount {
        txn.account_get(account)
            .map(|info| info.balance)
            .unwrap_or(Amount::ZERO)
    }

    /// Sum of unreceived sends addressed to `account`.
    pub fn account_pending(&self, txn: &(impl Transaction + ?Sized), account: &Account) -> Amount {
        txn.pending_for_account(account)
            .into_iter()
            .fold(Amount::ZERO, |sum, (_, info)| sum.saturating_add(info.amount))
    }

    /// Voting weight delegated to `representative`.
    pub fn weight(&self, txn: &(impl Transaction + ?Sized), representative: &Account) -> Amount {
        txn.rep_weight(representative)
    }

    /// The committed block occupying `root`'s position, if any: the open
    /// block when `root` is an account, the successor when it is a hash.
    pub fn successor(&self, txn: &(impl Transaction + ?Sized), root: &Root) -> Option<Block> {
        let successor_hash = if txn.block_exists(root) {
            txn.block_successor(root)
        } else {
            txn.account_get(&PublicKey(*root.as_bytes()))
                .map(|info| info.open_block)
        };
        successor_hash.and_then(|hash| self.block_get(txn, &hash))
    }

    /// The ledger's block conflicting with `block` (same root), if any.
    pub fn forked_block(&self, txn: &(impl Transaction + ?Sized), block: &Block) -> Option<Block> {
        self.successor(txn, &block.root())
    }

    /// Whether the root of `block` exists, i.e. an election over it could
    /// resolve against the ledger.
    pub fn root_exists(&self, txn: &(impl Transaction + ?Sized), block: &Block) -> bool {
        let root = block.root();
        txn.block_exists(&root) || txn.account_get(&PublicKey(*root.as_bytes())).is_some()
    }

    /// Whether every dependency of `block` is already committed, making the
    /// block applicable (or already applied).
    pub fn could_fit(&self, txn: &(impl Transaction + ?Sized), block: &Block) -> bool {
        let fields = block.fields();
        if !fields.previous.is_zero() && !txn.block_exists(&fields.previous) {
            return false;
        }
        match block.kind() {
            BlockKind::Claim => txn.block_exists(&fields.dividend),
            BlockKind::State => {
                // A receive additionally needs its source.
                let is_receive = if fields.previous.is_zero() {
                    !fields.link.is_zero()
                } else {
                    self.balance_at(txn, &fields.previous)
                        .map(|prev| fields.balance > prev)
                        .unwrap_or(false)
                };
                !is_receive || txn.block_exists(&fields.link)
            }
            _ => true,
        }
    }

    /// The missing-dependency key a gapped block parks under.
    pub fn block_source(&self, txn: &(impl Transaction + ?Sized), block: &Block) -> BlockHash {
        match block.kind() {
            BlockKind::Claim => block.dividend(),
            BlockKind::State => {
                let fields = block.fields();
                let is_receive = if fields.previous.is_zero() {
                    true
                } else {
                    self.balance_at(txn, &fields.previous)
                        .map(|prev| fields.balance > prev)
                        .unwrap_or(false)
                };
                if is_receive {
                    fields.link
                } else {
                    BlockHash::ZERO
                }
            }
            _ => BlockHash::ZERO,
        }
    }

    /// The account a committed block belongs to.
    pub fn block_account(
        &self,
        txn: &(impl Transaction + ?Sized),
        hash: &BlockHash,
    ) -> Option<Account> {
        self.block_get(txn, hash).map(|block| block.account())
    }

    /// The absolute value moved by a committed block.
    pub fn amount(&self, txn: &(impl Transaction + ?Sized), hash: &BlockHash) -> Option<Amount> {
        let block = self.block_get(txn, hash)?;
        let previous_balance = if block.previous().is_zero() {
            Amount::ZERO
        } else {
            self.balance_at(txn, &block.previous())?
        };
        let balance = block.balance();
        Some(if balance >= previous_balance {
            balance - previous_balance
        } else {
            previous_balance - balance
        })
    }

    /// Whether a committed state block is a send.
    pub fn is_send(&self, txn: &(impl Transaction + ?Sized), block: &Block) -> bool {
        if block.kind() != BlockKind::State || block.previous().is_zero() {
            return false;
        }
        self.balance_at(txn, &block.previous())
            .map(|prev| block.balance() < prev)
            .unwrap_or(false)
    }

    /// Hash of the newest dividend epoch.
    pub fn latest_dividend(&self, txn: &(impl Transaction + ?Sized)) -> BlockHash {
        txn.meta_get(META_LATEST_DIVIDEND)
            .and_then(|bytes| bytes.try_into().ok().map(BlockHash::new))
            .unwrap_or(BlockHash::ZERO)
    }

    fn balance_at(&self, txn: &(impl Transaction + ?Sized), hash: &BlockHash) -> Option<Amount> {
        self.block_get(txn, hash).map(|block| block.balance())
    }

    fn weight_add(&self, txn: &mut dyn WriteTransaction, representative: &Account, amount: Amount) {
        let current = txn.rep_weight(representative);
        txn.rep_weight_put(representative, current.saturating_add(amount));
    }

    fn weight_sub(&self, txn: &mut dyn WriteTransaction, representative: &Account, amount: Amount) {
        let current = txn.rep_weight(representative);
        txn.rep_weight_put(representative, current.saturating_sub(amount));
    }
}

impl Block {
    /// The dividend value an account record tracks after this block: the
    /// block's own hash for dividend epochs, the declared epoch otherwise.
    fn dividend_state(&self) -> BlockHash {
        match self.kind() {
            BlockKind::Dividend => self.hash(),
            _ => self.dividend(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ClaimBlock, CommonFields, DividendBlock, StateBlock};
    use crate::genesis::Genesis;
    use chr_crypto::{generate_keypair, keypair_from_private};
    use chr_store::{MemoryStore, Store};
    use chr_types::{KeyPair, Signature};

    fn ledger_for(genesis: &Genesis) -> Ledger {
        Ledger::new(genesis.account, Amount::raw(10))
    }

    fn setup() -> (MemoryStore, Ledger, Genesis, KeyPair) {
        let genesis = Genesis::new();
        let store = MemoryStore::new();
        {
            let mut txn = store.tx_begin_write();
            genesis.initialize(txn.as_mut());
        }
        let ledger = ledger_for(&genesis);
        let genesis_keys = keypair_from_private(Genesis::private_key());
        (store, ledger, genesis, genesis_keys)
    }

    fn state_block(
        keys: &KeyPair,
        previous: BlockHash,
        representative: Account,
        balance: Amount,
        dividend: BlockHash,
        link: BlockHash,
    ) -> Block {
        let mut block = Block::State(StateBlock {
            fields: CommonFields {
                account: keys.public,
                previous,
                representative,
                balance,
                dividend,
                link,
            },
            signature: Signature::ZERO,
            work: 0,
        });
        block.sign(&keys.private);
        block
    }

    fn dividend_block(
        keys: &KeyPair,
        previous: BlockHash,
        balance: Amount,
        dividend: BlockHash,
    ) -> Block {
        let mut block = Block::Dividend(DividendBlock {
            fields: CommonFields {
                account: keys.public,
                previous,
                representative: keys.public,
                balance,
                dividend,
                link: BlockHash::ZERO,
            },
            signature: Signature::ZERO,
            work: 0,
        });
        block.sign(&keys.private);
        block
    }

    fn claim_block(
        keys: &KeyPair,
        previous: BlockHash,
        representative: Account,
        balance: Amount,
        dividend: BlockHash,
    ) -> Block {
        let mut block = Block::Claim(ClaimBlock {
            fields: CommonFields {
                account: keys.public,
                previous,
                representative,
                balance,
                dividend,
                link: BlockHash::ZERO,
            },
            signature: Signature::ZERO,
            work: 0,
        });
        block.sign(&keys.private);
        block
    }

    #[test]
    fn genesis_holds_total_supply() {
        let (store, ledger, genesis, _) = setup();
        let txn = store.tx_begin_read();
        assert_eq!(ledger.latest(txn.as_ref(), &genesis.account), genesis.hash());
        assert_eq!(
            ledger.account_balance(txn.as_ref(), &genesis.account),
            Amount::MAX
        );
    }

    #[test]
    fn send_then_reprocess_is_old() {
        let (store, ledger, genesis, keys) = setup();
        let dest = generate_keypair();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(100),
            BlockHash::ZERO,
            dest.public.into(),
        );
        let mut txn = store.tx_begin_write();
        assert_eq!(ledger.process(txn.as_mut(), &send), ProcessResult::Progress);
        assert_eq!(ledger.process(txn.as_mut(), &send), ProcessResult::Old);
    }

    #[test]
    fn send_receive_pair_settles_balances() {
        let (store, ledger, genesis, keys) = setup();
        let receiver = generate_keypair();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(100),
            BlockHash::ZERO,
            receiver.public.into(),
        );
        let open = state_block(
            &receiver,
            BlockHash::ZERO,
            receiver.public,
            Amount::raw(100),
            BlockHash::ZERO,
            send.hash(),
        );
        let mut txn = store.tx_begin_write();
        assert_eq!(ledger.process(txn.as_mut(), &send), ProcessResult::Progress);
        assert_eq!(
            ledger.account_pending(txn.as_ref(), &receiver.public),
            Amount::raw(100)
        );
        assert_eq!(ledger.process(txn.as_mut(), &open), ProcessResult::Progress);
        assert_eq!(
            ledger.account_balance(txn.as_ref(), &receiver.public),
            Amount::raw(100)
        );
        assert_eq!(
            ledger.account_balance(txn.as_ref(), &genesis.account),
            Amount::MAX - Amount::raw(100)
        );
        assert_eq!(
            ledger.account_pending(txn.as_ref(), &receiver.public),
            Amount::ZERO
        );
        // Weight moved to the receiver's representative (itself).
        assert_eq!(
            ledger.weight(txn.as_ref(), &receiver.public),
            Amount::raw(100)
        );
    }

    #[test]
    fn missing_previous_gaps() {
        let (store, ledger, _genesis, keys) = setup();
        let send = state_block(
            &keys,
            BlockHash::new([0xEE; 32]),
            keys.public,
            Amount::raw(1),
            BlockHash::ZERO,
            BlockHash::new([1u8; 32]),
        );
        let mut txn = store.tx_begin_write();
        assert_eq!(
            ledger.process(txn.as_mut(), &send),
            ProcessResult::GapPrevious
        );
    }

    #[test]
    fn second_block_on_same_root_is_fork() {
        let (store, ledger, genesis, keys) = setup();
        let a = generate_keypair();
        let b = generate_keypair();
        let send_a = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(1),
            BlockHash::ZERO,
            a.public.into(),
        );
        let send_b = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(2),
            BlockHash::ZERO,
            b.public.into(),
        );
        let mut txn = store.tx_begin_write();
        assert_eq!(ledger.process(txn.as_mut(), &send_a), ProcessResult::Progress);
        assert_eq!(ledger.process(txn.as_mut(), &send_b), ProcessResult::Fork);
        // The committed block is discoverable from the contested root.
        assert_eq!(
            ledger.forked_block(txn.as_ref(), &send_b).unwrap().hash(),
            send_a.hash()
        );
    }

    #[test]
    fn receive_with_wrong_amount_mismatches() {
        let (store, ledger, genesis, keys) = setup();
        let receiver = generate_keypair();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(100),
            BlockHash::ZERO,
            receiver.public.into(),
        );
        let open = state_block(
            &receiver,
            BlockHash::ZERO,
            receiver.public,
            Amount::raw(99),
            BlockHash::ZERO,
            send.hash(),
        );
        let mut txn = store.tx_begin_write();
        ledger.process(txn.as_mut(), &send);
        assert_eq!(
            ledger.process(txn.as_mut(), &open),
            ProcessResult::BalanceMismatch
        );
    }

    #[test]
    fn open_without_pending_is_unreceivable() {
        let (store, ledger, genesis, keys) = setup();
        let receiver = generate_keypair();
        let other = generate_keypair();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(100),
            BlockHash::ZERO,
            other.public.into(),
        );
        let open = state_block(
            &receiver,
            BlockHash::ZERO,
            receiver.public,
            Amount::raw(100),
            BlockHash::ZERO,
            send.hash(),
        );
        let mut txn = store.tx_begin_write();
        ledger.process(txn.as_mut(), &send);
        assert_eq!(
            ledger.process(txn.as_mut(), &open),
            ProcessResult::Unreceivable
        );
    }

    #[test]
    fn tampered_signature_rejected() {
        let (store, ledger, genesis, keys) = setup();
        let dest = generate_keypair();
        let mut send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(1),
            BlockHash::ZERO,
            dest.public.into(),
        );
        if let Block::State(inner) = &mut send {
            inner.signature = Signature([0x11; 64]);
        }
        let mut txn = store.tx_begin_write();
        assert_eq!(
            ledger.process(txn.as_mut(), &send),
            ProcessResult::BadSignature
        );
    }

    #[test]
    fn burn_account_cannot_open() {
        let (store, ledger, genesis, keys) = setup();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(5),
            BlockHash::ZERO,
            BURN_ACCOUNT.into(),
        );
        let mut txn = store.tx_begin_write();
        assert_eq!(ledger.process(txn.as_mut(), &send), ProcessResult::Progress);

        // An open block claiming to be the burn account fails even with the
        // pending in place; nobody holds its key, so use an unsigned block.
        let mut open = Block::State(StateBlock {
            fields: CommonFields {
                account: BURN_ACCOUNT,
                previous: BlockHash::ZERO,
                representative: BURN_ACCOUNT,
                balance: Amount::raw(5),
                dividend: BlockHash::ZERO,
                link: send.hash(),
            },
            signature: Signature::ZERO,
            work: 0,
        });
        let someone = generate_keypair();
        open.sign(&someone.private);
        assert_eq!(
            ledger.process(txn.as_mut(), &open),
            ProcessResult::OpenedBurnAccount
        );
    }

    #[test]
    fn dividend_then_claim_flow() {
        let (store, ledger, genesis, keys) = setup();
        let holder = generate_keypair();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(500),
            BlockHash::ZERO,
            holder.public.into(),
        );
        let open = state_block(
            &holder,
            BlockHash::ZERO,
            holder.public,
            Amount::raw(500),
            BlockHash::ZERO,
            send.hash(),
        );
        let mut txn = store.tx_begin_write();
        assert_eq!(ledger.process(txn.as_mut(), &send), ProcessResult::Progress);
        assert_eq!(ledger.process(txn.as_mut(), &open), ProcessResult::Progress);

        // Genesis opens a dividend epoch distributing 1000 raw.
        let genesis_balance = ledger.account_balance(txn.as_ref(), &genesis.account);
        let dividend = dividend_block(
            &keys,
            send.hash(),
            genesis_balance - Amount::raw(1000),
            BlockHash::ZERO,
        );
        assert_eq!(
            ledger.process(txn.as_mut(), &dividend),
            ProcessResult::Progress
        );
        assert_eq!(ledger.latest_dividend(txn.as_ref()), dividend.hash());

        // The holder cannot send before claiming the epoch.
        let premature = state_block(
            &holder,
            open.hash(),
            holder.public,
            Amount::raw(400),
            BlockHash::ZERO,
            genesis.account.into(),
        );
        assert_eq!(
            ledger.process(txn.as_mut(), &premature),
            ProcessResult::IncorrectDividend
        );

        // Claiming the epoch unblocks the account.
        let claim = claim_block(
            &holder,
            open.hash(),
            holder.public,
            Amount::raw(600),
            dividend.hash(),
        );
        assert_eq!(ledger.process(txn.as_mut(), &claim), ProcessResult::Progress);
        assert_eq!(
            ledger.account_balance(txn.as_ref(), &holder.public),
            Amount::raw(600)
        );

        let send_after = state_block(
            &holder,
            claim.hash(),
            holder.public,
            Amount::raw(100),
            dividend.hash(),
            genesis.account.into(),
        );
        assert_eq!(
            ledger.process(txn.as_mut(), &send_after),
            ProcessResult::Progress
        );
    }

    #[test]
    fn dividend_below_minimum_rejected() {
        let (store, ledger, genesis, keys) = setup();
        let mut txn = store.tx_begin_write();
        let dividend = dividend_block(
            &keys,
            genesis.hash(),
            Amount::MAX - Amount::raw(1),
            BlockHash::ZERO,
        );
        assert_eq!(
            ledger.process(txn.as_mut(), &dividend),
            ProcessResult::DividendTooSmall
        );
    }

    #[test]
    fn only_dividend_account_may_issue() {
        let (store, ledger, genesis, keys) = setup();
        let other = generate_keypair();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(500),
            BlockHash::ZERO,
            other.public.into(),
        );
        let open = state_block(
            &other,
            BlockHash::ZERO,
            other.public,
            Amount::raw(500),
            BlockHash::ZERO,
            send.hash(),
        );
        let mut txn = store.tx_begin_write();
        ledger.process(txn.as_mut(), &send);
        ledger.process(txn.as_mut(), &open);

        let dividend = dividend_block(&other, open.hash(), Amount::raw(400), BlockHash::ZERO);
        assert_eq!(
            ledger.process(txn.as_mut(), &dividend),
            ProcessResult::InvalidDividendAccount
        );
    }

    #[test]
    fn stale_dividend_chain_is_a_dividend_fork() {
        let (store, ledger, genesis, keys) = setup();
        let mut txn = store.tx_begin_write();
        let first = dividend_block(
            &keys,
            genesis.hash(),
            Amount::MAX - Amount::raw(1000),
            BlockHash::ZERO,
        );
        assert_eq!(ledger.process(txn.as_mut(), &first), ProcessResult::Progress);

        // A second epoch claiming the original predecessor conflicts.
        let stale = dividend_block(
            &keys,
            first.hash(),
            Amount::MAX - Amount::raw(2000),
            BlockHash::ZERO,
        );
        assert_eq!(
            ledger.process(txn.as_mut(), &stale),
            ProcessResult::DividendFork
        );
    }

    #[test]
    fn dividend_blocked_by_outstanding_pendings() {
        let (store, ledger, genesis, keys) = setup();
        let holder = generate_keypair();
        let mut txn = store.tx_begin_write();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(500),
            BlockHash::ZERO,
            holder.public.into(),
        );
        ledger.process(txn.as_mut(), &send);
        let open = state_block(
            &holder,
            BlockHash::ZERO,
            holder.public,
            Amount::raw(500),
            BlockHash::ZERO,
            send.hash(),
        );
        ledger.process(txn.as_mut(), &open);
        // Holder sends back to genesis; genesis leaves it unreceived.
        let send_back = state_block(
            &holder,
            open.hash(),
            holder.public,
            Amount::raw(400),
            BlockHash::ZERO,
            genesis.account.into(),
        );
        assert_eq!(
            ledger.process(txn.as_mut(), &send_back),
            ProcessResult::Progress
        );

        let dividend = dividend_block(
            &keys,
            send.hash(),
            Amount::MAX - Amount::raw(2000),
            BlockHash::ZERO,
        );
        assert_eq!(
            ledger.process(txn.as_mut(), &dividend),
            ProcessResult::OutstandingPendings
        );
    }

    #[test]
    fn rollback_send_restores_state() {
        let (store, ledger, genesis, keys) = setup();
        let dest = generate_keypair();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(100),
            BlockHash::ZERO,
            dest.public.into(),
        );
        let mut txn = store.tx_begin_write();
        ledger.process(txn.as_mut(), &send);

        let rolled = ledger.rollback(txn.as_mut(), &send.hash()).unwrap();
        assert_eq!(rolled.len(), 1);
        assert!(!txn.block_exists(&send.hash()));
        assert_eq!(
            ledger.account_balance(txn.as_ref(), &genesis.account),
            Amount::MAX
        );
        assert_eq!(ledger.latest(txn.as_ref(), &genesis.account), genesis.hash());
        assert_eq!(
            ledger.account_pending(txn.as_ref(), &dest.public),
            Amount::ZERO
        );
        assert_eq!(ledger.weight(txn.as_ref(), &genesis.account), Amount::MAX);
    }

    #[test]
    fn rollback_refuses_consumed_send() {
        let (store, ledger, genesis, keys) = setup();
        let receiver = generate_keypair();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(100),
            BlockHash::ZERO,
            receiver.public.into(),
        );
        let open = state_block(
            &receiver,
            BlockHash::ZERO,
            receiver.public,
            Amount::raw(100),
            BlockHash::ZERO,
            send.hash(),
        );
        let mut txn = store.tx_begin_write();
        ledger.process(txn.as_mut(), &send);
        ledger.process(txn.as_mut(), &open);

        assert!(matches!(
            ledger.rollback(txn.as_mut(), &send.hash()),
            Err(LedgerError::Unrollbackable(_))
        ));
        // Nothing was mutated.
        assert!(txn.block_exists(&send.hash()));
    }

    #[test]
    fn successor_resolves_accounts_and_hashes() {
        let (store, ledger, genesis, keys) = setup();
        let dest = generate_keypair();
        let send = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(1),
            BlockHash::ZERO,
            dest.public.into(),
        );
        let mut txn = store.tx_begin_write();
        ledger.process(txn.as_mut(), &send);

        // Hash root: successor of genesis block is the send.
        assert_eq!(
            ledger
                .successor(txn.as_ref(), &genesis.hash())
                .unwrap()
                .hash(),
            send.hash()
        );
        // Account root: successor is the open block.
        assert_eq!(
            ledger
                .successor(txn.as_ref(), &genesis.account.into())
                .unwrap()
                .hash(),
            genesis.hash()
        );
    }

    #[test]
    fn could_fit_tracks_dependencies() {
        let (store, ledger, genesis, keys) = setup();
        let dest = generate_keypair();
        let send1 = state_block(
            &keys,
            genesis.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(1),
            BlockHash::ZERO,
            dest.public.into(),
        );
        let send2 = state_block(
            &keys,
            send1.hash(),
            genesis.account,
            Amount::MAX - Amount::raw(2),
            BlockHash::ZERO,
            dest.public.into(),
        );
        let txn = store.tx_begin_read();
        assert!(ledger.could_fit(txn.as_ref(), &send1));
        assert!(!ledger.could_fit(txn.as_ref(), &send2));
    }
}
