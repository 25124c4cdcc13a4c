//! Bounded block cache shared across RPC tasks.

use std::sync::Arc;

use alloy_primitives::B256;
use parking_lot::Mutex;
use schnellru::{ByLength, LruMap};

use crate::types::BlockWithHash;

/// Default number of decoded blocks kept in memory.
pub const DEFAULT_BLOCK_CACHE_SIZE: u32 = 1024;

/// Bounded mapping from block hash to decoded block.
///
/// Entries are shared as [`Arc`]s, so eviction never invalidates a block a
/// task is still holding. Safe for concurrent `get`/`insert`.
#[derive(Debug)]
pub struct BlockCache {
    inner: Mutex<LruMap<B256, Arc<BlockWithHash>>>,
}

impl BlockCache {
    /// Creates a cache holding at most `capacity` blocks.
    pub fn new(capacity: u32) -> Self {
        Self { inner: Mutex::new(LruMap::new(ByLength::new(capacity))) }
    }

    /// Returns the cached block, refreshing its recency.
    pub fn get(&self, hash: &B256) -> Option<Arc<BlockWithHash>> {
        self.inner.lock().get(hash).map(|block| block.clone())
    }

    /// Inserts a decoded block, evicting the least recently used entry when
    /// full.
    pub fn insert(&self, hash: B256, block: Arc<BlockWithHash>) {
        self.inner.lock().insert(hash, block);
    }

    /// Number of blocks currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_consensus::Header;

    fn block(number: u64) -> (B256, Arc<BlockWithHash>) {
        let header = Header { number, ..Default::default() };
        let hash = header.hash_slow();
        (hash, Arc::new(BlockWithHash { hash, header }))
    }

    #[test]
    fn insert_then_get() {
        let cache = BlockCache::new(4);
        let (hash, b) = block(1);
        cache.insert(hash, b.clone());
        let cached = cache.get(&hash).unwrap();
        assert!(Arc::ptr_eq(&cached, &b));
        assert!(cache.get(&B256::ZERO).is_none());
    }

    #[test]
    fn evicts_the_least_recently_used_block() {
        let cache = BlockCache::new(2);
        let (hash1, b1) = block(1);
        let (hash2, b2) = block(2);
        let (hash3, b3) = block(3);
        cache.insert(hash1, b1);
        cache.insert(hash2, b2);
        // Touch block 1 so block 2 becomes the eviction candidate.
        assert!(cache.get(&hash1).is_some());
        cache.insert(hash3, b3);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&hash1).is_some());
        assert!(cache.get(&hash2).is_none());
        assert!(cache.get(&hash3).is_some());
    }
}
