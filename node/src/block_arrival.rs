//! Recently arrived block hashes.
//!
//! Seeds the "locally observed" gating: a block we heard arrive on the
//! wire gets an eager election on commit and fires the block observers.

use chr_types::BlockHash;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Entries older than this are eligible for eviction.
const ARRIVAL_TIME_MIN: Duration = Duration::from_secs(300);
/// Eviction never shrinks the set below this size.
const ARRIVAL_SIZE_MIN: usize = 8 * 1024;

struct ArrivalState {
    order: VecDeque<(Instant, BlockHash)>,
    set: HashSet<BlockHash>,
}

pub struct BlockArrival {
    state: Mutex<ArrivalState>,
}

impl Default for BlockArrival {
    fn default() -> Self {
        Self {
            state: Mutex::new(ArrivalState {
                order: VecDeque::new(),
                set: HashSet::new(),
            }),
        }
    }
}

impl BlockArrival {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arrival. Returns `true` when the hash was already present.
    pub fn add(&self, hash: BlockHash) -> bool {
        let mut state = self.state.lock().expect("arrival lock poisoned");
        if !state.set.insert(hash) {
            return true;
        }
        state.order.push_back((Instant::now(), hash));
        false
    }

    /// Whether `hash` arrived recently. Ages out old entries first, but
    /// only while the set stays above its minimum size.
    pub fn recent(&self, hash: &BlockHash) -> bool {
        let mut state = self.state.lock().expect("arrival lock poisoned");
        let now = Instant::now();
        while state.order.len() > ARRIVAL_SIZE_MIN {
            let expired = state
                .order
                .front()
                .map(|(arrival, _)| *arrival + ARRIVAL_TIME_MIN < now)
                .unwrap_or(false);
            if !expired {
                break;
            }
            let (_, old) = state.order.pop_front().expect("front exists");
            state.set.remove(&old);
        }
        state.set.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("arrival lock poisoned").set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
