//! Block cache
//!
//! A block never changes once its id is known, so blocks fetched by id are
//! kept in a bounded LRU map shared by every clone of the client.

use crate::block::{Block, BlockId};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Clone)]
pub struct BlockCache {
    blocks: Arc<Mutex<LruCache<BlockId, Block>>>,
}

impl core::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let blocks = self.blocks.lock();
        f.debug_struct("BlockCache")
            .field("len", &blocks.len())
            .field("capacity", &blocks.cap())
            .finish()
    }
}

impl BlockCache {
    /// Holds at most `capacity` blocks; zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            blocks: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// A hit also marks the block as recently used.
    pub fn get(&self, block_id: &BlockId) -> Option<Block> {
        self.blocks.lock().get(block_id).cloned()
    }

    pub fn insert(&self, block_id: BlockId, block: Block) {
        self.blocks.lock().put(block_id, block);
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.blocks.lock().cap().get()
    }

    pub fn clear(&self) {
        self.blocks.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(byte: u8) -> Block {
        Block::new(vec![BlockId([byte; 32])], None)
    }

    #[test]
    fn test_hit_and_clear() {
        let cache = BlockCache::new(10);
        let id = BlockId([1; 32]);
        assert!(cache.get(&id).is_none());

        cache.insert(id, block(1));
        assert_eq!(cache.get(&id), Some(block(1)));

        let shared = cache.clone();
        shared.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_least_recently_used_block_is_evicted() {
        let cache = BlockCache::new(2);
        cache.insert(BlockId([0; 32]), block(0));
        cache.insert(BlockId([1; 32]), block(1));
        // touching 0 makes 1 the eviction candidate
        assert!(cache.get(&BlockId([0; 32])).is_some());
        cache.insert(BlockId([2; 32]), block(2));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&BlockId([1; 32])).is_none());
        assert!(cache.get(&BlockId([0; 32])).is_some());
    }

    #[test]
    fn test_zero_capacity_holds_one_block() {
        let cache = BlockCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(BlockId([0; 32]), block(0));
        cache.insert(BlockId([1; 32]), block(1));
        assert_eq!(cache.len(), 1);
    }
}
