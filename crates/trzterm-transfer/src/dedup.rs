//! Bounded record of handshake ids that already started a transfer.
//!
//! A remote shell can echo the same marker more than once (redraws, tmux
//! scrollback); only the first sighting of an id may start a session.

use std::collections::HashMap;

/// Live entries at which the cache is thinned.
pub const DEDUP_CAPACITY: usize = 100;

/// Ranks below this are dropped on eviction; the rest shift down by it.
const EVICTION_SHIFT: usize = 50;

/// Ids shorter than this are too weak to deduplicate.
const MIN_DEDUP_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct UniqueIdCache {
    ranks: HashMap<String, usize>,
    local_is_windows: bool,
}

impl UniqueIdCache {
    pub fn new() -> Self {
        Self::with_local_windows(cfg!(windows))
    }

    /// Cache whose exemption rules assume the given local host flavour.
    pub fn with_local_windows(local_is_windows: bool) -> Self {
        Self {
            ranks: HashMap::new(),
            local_is_windows,
        }
    }

    /// Record `id` and report whether it had been seen before.
    ///
    /// Exempt ids are never recorded and always report `false`.
    pub fn seen(&mut self, id: &str) -> bool {
        if self.is_exempt(id) {
            return false;
        }
        if self.ranks.contains_key(id) {
            return true;
        }
        if self.ranks.len() >= DEDUP_CAPACITY {
            self.evict();
        }
        let rank = self.ranks.len();
        self.ranks.insert(id.to_string(), rank);
        false
    }

    fn is_exempt(&self, id: &str) -> bool {
        if id.len() < MIN_DEDUP_ID_LEN {
            return true;
        }
        !self.local_is_windows && id.len() == 14 && id.ends_with("00")
    }

    fn evict(&mut self) {
        self.ranks.retain(|_, rank| *rank >= EVICTION_SHIFT);
        for rank in self.ranks.values_mut() {
            *rank -= EVICTION_SHIFT;
        }
        tracing::debug!(kept = self.ranks.len(), "Thinned handshake id cache");
    }

    pub fn rank(&self, id: &str) -> Option<usize> {
        self.ranks.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

impl Default for UniqueIdCache {
    fn default() -> Self {
        Self::new()
    }
}
