//! Block variants and their canonical encodings.
//!
//! Three variants share one field layout and differ in their hash preamble
//! and ledger semantics:
//!
//! - **state**: the general account mutation, a send, receive, open, or
//!   representative change, decided by balance direction and link contents.
//! - **dividend**: opens a new dividend epoch on the dividend account's
//!   chain; `dividend` links the previous epoch.
//! - **claim**: collects an account's share of a dividend epoch;
//!   `dividend` names the epoch block being claimed.
//!
//! The wire encoding is packed big-endian: six 32/16-byte hashables, a
//! 64-byte signature, an 8-byte work nonce.

use chr_crypto::{blake2b_256_multi, sign_message, verify_signature};
use chr_types::{Account, Amount, BlockHash, Link, PrivateKey, PublicKey, Root, Signature};
use serde::{Deserialize, Serialize};

/// Serialized size of any block body on the wire.
pub const BLOCK_WIRE_SIZE: usize = 32 * 5 + 16 + 64 + 8;

/// Discriminates block variants on the wire and in message headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockKind {
    /// Sentinel carried by votes that reference blocks by hash only.
    NotABlock = 1,
    State = 6,
    Dividend = 7,
    Claim = 8,
}

impl BlockKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::NotABlock),
            6 => Some(Self::State),
            7 => Some(Self::Dividend),
            8 => Some(Self::Claim),
            _ => None,
        }
    }
}

/// The hashable fields every variant carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonFields {
    pub account: Account,
    pub previous: BlockHash,
    pub representative: Account,
    pub balance: Amount,
    /// The dividend epoch this block claims to be current under. For
    /// dividend blocks, the previous epoch in the dividend chain.
    pub dividend: BlockHash,
    pub link: Link,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBlock {
    pub fields: CommonFields,
    pub signature: Signature,
    pub work: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendBlock {
    pub fields: CommonFields,
    pub signature: Signature,
    pub work: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimBlock {
    pub fields: CommonFields,
    pub signature: Signature,
    pub work: u64,
}

/// Visitor over the block variants.
pub trait BlockVisitor {
    fn state_block(&mut self, block: &StateBlock);
    fn dividend_block(&mut self, block: &DividendBlock);
    fn claim_block(&mut self, block: &ClaimBlock);
}

/// A block of any variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    State(StateBlock),
    Dividend(DividendBlock),
    Claim(ClaimBlock),
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::State(_) => BlockKind::State,
            Self::Dividend(_) => BlockKind::Dividend,
            Self::Claim(_) => BlockKind::Claim,
        }
    }

    pub fn fields(&self) -> &CommonFields {
        match self {
            Self::State(b) => &b.fields,
            Self::Dividend(b) => &b.fields,
            Self::Claim(b) => &b.fields,
        }
    }

    /// The domain-separated Blake2b digest of the canonical fields. This is
    /// the message that gets signed.
    pub fn hash(&self) -> BlockHash {
        let fields = self.fields();
        let mut preamble = [0u8; 32];
        preamble[31] = self.kind() as u8;
        BlockHash::new(blake2b_256_multi(&[
            &preamble,
            fields.account.as_bytes(),
            fields.previous.as_bytes(),
            fields.representative.as_bytes(),
            &fields.balance.to_be_bytes(),
            fields.dividend.as_bytes(),
            fields.link.as_bytes(),
        ]))
    }

    /// The election root: previous for chain blocks, the account for opens.
    pub fn root(&self) -> Root {
        let fields = self.fields();
        if fields.previous.is_zero() {
            fields.account.into()
        } else {
            fields.previous
        }
    }

    pub fn account(&self) -> Account {
        self.fields().account
    }

    pub fn previous(&self) -> BlockHash {
        self.fields().previous
    }

    pub fn representative(&self) -> Account {
        self.fields().representative
    }

    pub fn balance(&self) -> Amount {
        self.fields().balance
    }

    /// The block this one draws value from: the claimed epoch for claim
    /// blocks; zero otherwise (a state receive's source is its link, which
    /// only the ledger can interpret).
    pub fn source(&self) -> BlockHash {
        match self {
            Self::Claim(b) => b.fields.dividend,
            _ => BlockHash::ZERO,
        }
    }

    pub fn dividend(&self) -> BlockHash {
        self.fields().dividend
    }

    pub fn link(&self) -> Link {
        self.fields().link
    }

    pub fn signature(&self) -> Signature {
        match self {
            Self::State(b) => b.signature,
            Self::Dividend(b) => b.signature,
            Self::Claim(b) => b.signature,
        }
    }

    pub fn work(&self) -> u64 {
        match self {
            Self::State(b) => b.work,
            Self::Dividend(b) => b.work,
            Self::Claim(b) => b.work,
        }
    }

    pub fn visit(&self, visitor: &mut dyn BlockVisitor) {
        match self {
            Self::State(b) => visitor.state_block(b),
            Self::Dividend(b) => visitor.dividend_block(b),
            Self::Claim(b) => visitor.claim_block(b),
        }
    }

    /// Sign the block in place with the account's private key.
    pub fn sign(&mut self, private_key: &PrivateKey) {
        let hash = self.hash();
        let signature = sign_message(hash.as_bytes(), private_key);
        match self {
            Self::State(b) => b.signature = signature,
            Self::Dividend(b) => b.signature = signature,
            Self::Claim(b) => b.signature = signature,
        }
    }

    /// Verify the signature under the block's own account.
    pub fn verify_signature(&self) -> bool {
        verify_signature(
            self.hash().as_bytes(),
            &self.signature(),
            &self.fields().account,
        )
    }

    /// Append the packed wire encoding to `buffer`.
    pub fn serialize(&self, buffer: &mut Vec<u8>) {
        let fields = self.fields();
        buffer.extend_from_slice(fields.account.as_bytes());
        buffer.extend_from_slice(fields.previous.as_bytes());
        buffer.extend_from_slice(fields.representative.as_bytes());
        buffer.extend_from_slice(&fields.balance.to_be_bytes());
        buffer.extend_from_slice(fields.dividend.as_bytes());
        buffer.extend_from_slice(fields.link.as_bytes());
        buffer.extend_from_slice(self.signature().as_bytes());
        buffer.extend_from_slice(&self.work().to_be_bytes());
    }

    /// Decode a packed block body of the given kind. `None` on short input
    /// or a kind that carries no body.
    pub fn deserialize(kind: BlockKind, bytes: &[u8]) -> Option<Block> {
        if kind == BlockKind::NotABlock || bytes.len() < BLOCK_WIRE_SIZE {
            return None;
        }
        let account = PublicKey(bytes[0..32].try_into().expect("length checked"));
        let previous = BlockHash::new(bytes[32..64].try_into().expect("length checked"));
        let representative = PublicKey(bytes[64..96].try_into().expect("length checked"));
        let balance = Amount::from_be_bytes(bytes[96..112].try_into().expect("length checked"));
        let dividend = BlockHash::new(bytes[112..144].try_into().expect("length checked"));
        let link = BlockHash::new(bytes[144..176].try_into().expect("length checked"));
        let signature = Signature(bytes[176..240].try_into().expect("length checked"));
        let work = u64::from_be_bytes(bytes[240..248].try_into().expect("length checked"));

        let fields = CommonFields {
            account,
            previous,
            representative,
            balance,
            dividend,
            link,
        };
        Some(match kind {
            BlockKind::State => Block::State(StateBlock {
                fields,
                signature,
                work,
            }),
            BlockKind::Dividend => Block::Dividend(DividendBlock {
                fields,
                signature,
                work,
            }),
            BlockKind::Claim => Block::Claim(ClaimBlock {
                fields,
                signature,
                work,
            }),
            BlockKind::NotABlock => unreachable!("rejected above"),
        })
    }

    /// Replace the work nonce.
    pub fn set_work(&mut self, work: u64) {
        match self {
            Self::State(b) => b.work = work,
            Self::Dividend(b) => b.work = work,
            Self::Claim(b) => b.work = work,
        }
    }

    /// Decode from the bincode store encoding.
    pub fn from_store_bytes(bytes: &[u8]) -> Option<Block> {
        bincode::deserialize(bytes).ok()
    }

    /// Encode for the bincode store encoding.
    pub fn to_store_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("block serialization is infallible")
    }
}
