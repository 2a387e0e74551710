//! Genesis configuration and first-start initialisation.

use crate::block::{Block, CommonFields, StateBlock};
use chr_crypto::keypair_from_private;
use chr_store::{AccountInfo, WriteTransaction, META_VERSION};
use chr_types::{Account, Amount, BlockHash, PrivateKey, Signature, Timestamp};

/// Current store schema version.
pub const STORE_VERSION: u8 = 1;

/// The development genesis private key. The live network replaces this with
/// its published genesis at release branching; every network in this tree
/// derives from the same key so test fixtures can sign as genesis.
const GENESIS_PRIVATE: [u8; 32] = [
    0x9F, 0x0E, 0x44, 0x4C, 0x69, 0xF7, 0x7A, 0x49, 0xBD, 0x0B, 0xE8, 0x9D, 0xB9, 0x2C, 0x38,
    0xFE, 0x71, 0x3E, 0x09, 0x63, 0x16, 0x5C, 0xCA, 0x12, 0xFA, 0xF5, 0x71, 0x2D, 0x76, 0x57,
    0x12, 0x0F,
];

/// The genesis block plus the keys that signed it.
pub struct Genesis {
    pub account: Account,
    pub block: Block,
}

impl Genesis {
    /// Build the genesis open block: the entire supply, self-represented.
    pub fn new() -> Self {
        let keypair = keypair_from_private(PrivateKey(GENESIS_PRIVATE));
        let account = keypair.public;
        let mut block = Block::State(StateBlock {
            fields: CommonFields {
                account,
                previous: BlockHash::ZERO,
                representative: account,
                balance: Amount::MAX,
                dividend: BlockHash::ZERO,
                link: account.into(),
            },
            signature: Signature::ZERO,
            work: 0,
        });
        block.sign(&keypair.private);
        Self { account, block }
    }

    /// The signing key, for wallets and tests that act as genesis.
    pub fn private_key() -> PrivateKey {
        PrivateKey(GENESIS_PRIVATE)
    }

    pub fn hash(&self) -> BlockHash {
        self.block.hash()
    }

    /// Seed an empty store: the genesis block, its account record at full
    /// supply, and the schema version.
    pub fn initialize(&self, txn: &mut dyn WriteTransaction) {
        let hash = self.hash();
        txn.block_put(&hash, self.block.to_store_bytes());
        txn.frontier_put(&hash, &self.account);
        txn.account_put(
            &self.account,
            AccountInfo {
                head: hash,
                open_block: hash,
                representative: self.account,
                balance: Amount::MAX,
                dividend: BlockHash::ZERO,
                modified: Timestamp::now(),
                block_count: 1,
            },
        );
        txn.rep_weight_put(&self.account, Amount::MAX);
        txn.meta_put(META_VERSION, vec![STORE_VERSION]);
    }
}

impl Default for Genesis {
    fn default() -> Self {
        Self::new()
    }
}
