//! The CHR account ledger.
//!
//! Blocks are polymorphic over {state, dividend, claim}. The ledger applies
//! them under a writable store transaction, returning a [`ProcessResult`]
//! for every outcome the ingress pipeline routes on.

pub mod block;
pub mod genesis;
pub mod ledger;

pub use block::{
    Block, BlockKind, BlockVisitor, ClaimBlock, CommonFields, DividendBlock, StateBlock,
    BLOCK_WIRE_SIZE,
};
pub use genesis::Genesis;
pub use ledger::{Ledger, LedgerError, ProcessResult, BURN_ACCOUNT};
