//! Representative votes.

use chr_crypto::{blake2b_256_multi, sign_message, verify_signature};
use chr_ledger::Block;
use chr_types::{Account, BlockHash, PrivateKey, Signature};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One entry of a vote's bundle: a full block or a bare hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteBlock {
    Hash(BlockHash),
    Block(Block),
}

impl VoteBlock {
    pub fn hash(&self) -> BlockHash {
        match self {
            Self::Hash(hash) => *hash,
            Self::Block(block) => block.hash(),
        }
    }
}

/// A representative's signed statement over a bundle of block references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub account: Account,
    /// Monotone per-representative sequence number.
    pub sequence: u64,
    pub signature: Signature,
    pub blocks: Vec<VoteBlock>,
}

impl Vote {
    /// Build and sign a vote over `blocks`.
    pub fn new(
        account: Account,
        private_key: &PrivateKey,
        sequence: u64,
        blocks: Vec<VoteBlock>,
    ) -> Self {
        let mut vote = Self {
            account,
            sequence,
            signature: Signature::ZERO,
            blocks,
        };
        vote.signature = sign_message(&vote.digest(), private_key);
        vote
    }

    /// The canonical signing digest: Blake2b over every referenced hash
    /// followed by the big-endian sequence number.
    pub fn digest(&self) -> [u8; 32] {
        let hashes: Vec<BlockHash> = self.hashes();
        let sequence_bytes = self.sequence.to_be_bytes();
        let mut parts: Vec<&[u8]> = Vec::with_capacity(hashes.len() + 1);
        for hash in &hashes {
            parts.push(hash.as_bytes());
        }
        parts.push(&sequence_bytes);
        blake2b_256_multi(&parts)
    }

    /// A vote is valid iff it references at least one block and the
    /// signature verifies under the stated account.
    pub fn validate(&self) -> bool {
        !self.blocks.is_empty()
            && verify_signature(&self.digest(), &self.signature, &self.account)
    }

    /// The hashes this vote covers.
    pub fn hashes(&self) -> Vec<BlockHash> {
        self.blocks.iter().map(VoteBlock::hash).collect()
    }

    /// Space-separated hash list for diagnostics.
    pub fn hashes_string(&self) -> String {
        let mut out = String::new();
        for hash in self.hashes() {
            let _ = write!(out, "{} ", hash);
        }
        out
    }

    pub fn to_store_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("vote serialization is infallible")
    }

    pub fn from_store_bytes(bytes: &[u8]) -> Option<Self> {
        bincode::deserialize(bytes).ok()
    }
}
