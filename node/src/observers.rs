//! Observer callback lists.
//!
//! Subscribers register closures; the node fires them synchronously from
//! the thread where the event happened, so handlers must stay short and
//! must not re-enter the subsystem that fired them.

use chr_consensus::Vote;
use chr_ledger::Block;
use chr_types::{Account, Amount};
use std::net::SocketAddrV6;
use std::sync::Mutex;

pub struct ObserverList<T: ?Sized> {
    observers: Mutex<Vec<Box<dyn Fn(&T) + Send>>>,
}

impl<T: ?Sized> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> ObserverList<T> {
    pub fn add(&self, observer: impl Fn(&T) + Send + 'static) {
        self.observers
            .lock()
            .expect("observer lock poisoned")
            .push(Box::new(observer));
    }

    pub fn notify(&self, event: &T) {
        for observer in self.observers.lock().expect("observer lock poisoned").iter() {
            observer(event);
        }
    }
}

/// A committed block heard locally: `(block, account, amount, is_state_send)`.
pub type BlockEvent = (Block, Account, Amount, bool);
/// A valid non-replay vote and its sender.
pub type VoteEvent = (Vote, SocketAddrV6);
/// An account whose balance changed at commit time; `true` marks the
/// pending side.
pub type BalanceEvent = (Account, bool);

#[derive(Default)]
pub struct Observers {
    pub blocks: ObserverList<BlockEvent>,
    pub vote: ObserverList<VoteEvent>,
    pub endpoint: ObserverList<SocketAddrV6>,
    pub disconnect: ObserverList<()>,
    pub account_balance: ObserverList<BalanceEvent>,
    pub started: ObserverList<()>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }
}
