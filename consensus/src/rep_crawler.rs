//! Representative discovery probes.
//!
//! The rep crawler remembers which block hashes were sent in confirm_req
//! probes. A vote that references a probed hash identifies its sender as a
//! probable representative.

use chr_types::BlockHash;
use std::collections::HashSet;

#[derive(Default)]
pub struct RepCrawler {
    active: HashSet<BlockHash>,
}

impl RepCrawler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, hash: BlockHash) {
        self.active.insert(hash);
    }

    pub fn remove(&mut self, hash: &BlockHash) {
        self.active.remove(hash);
    }

    pub fn exists(&self, hash: &BlockHash) -> bool {
        self.active.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
