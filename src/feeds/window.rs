use crate::models::block::Block;

pub const DEFAULT_CAPACITY: usize = 500;

/// Bounded, deduplicated block history, most recent first.
///
/// Blocks are immutable and heights final: a height already present is
/// never replaced. When full, the oldest block is evicted.
#[derive(Debug, Clone)]
pub struct BlockWindow {
    blocks: Vec<Block>,
    capacity: usize,
}

impl BlockWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: Vec::with_capacity(capacity.max(1) + 1),
            capacity: capacity.max(1),
        }
    }

    /// Insert one block. Returns false for a known height or a block older
    /// than everything a full window keeps.
    pub fn insert(&mut self, block: Block) -> bool {
        // descending order: compare the target against each element
        match self.blocks.binary_search_by(|b| block.height.cmp(&b.height)) {
            Ok(_) => false,
            Err(pos) => {
                if pos >= self.capacity {
                    return false;
                }
                self.blocks.insert(pos, block);
                self.blocks.truncate(self.capacity);
                true
            }
        }
    }

    /// Insert a batch. Returns how many blocks were new.
    pub fn extend(&mut self, blocks: impl IntoIterator<Item = Block>) -> usize {
        let mut added = 0;
        for block in blocks {
            if self.insert(block) {
                added += 1;
            }
        }
        added
    }

    /// Insert a batch, handing back blocks too old for a full window instead
    /// of dropping them. Returns the number of new blocks and the late ones,
    /// most recent first.
    pub fn merge(&mut self, blocks: impl IntoIterator<Item = Block>) -> (usize, Vec<Block>) {
        let mut added = 0;
        let mut late = Vec::new();
        for block in blocks {
            if self.is_past_oldest(block.height) {
                late.push(block);
            } else if self.insert(block) {
                added += 1;
            }
        }
        late.sort_by(|a, b| b.height.cmp(&a.height));
        late.dedup_by_key(|b| b.height);
        (added, late)
    }

    fn is_past_oldest(&self, height: u64) -> bool {
        self.blocks.len() >= self.capacity && self.blocks.last().is_some_and(|b| height < b.height)
    }

    pub fn latest_height(&self) -> Option<u64> {
        self.blocks.first().map(|b| b.height)
    }

    pub fn latest(&self) -> Option<&Block> {
        self.blocks.first()
    }

    /// Blocks with `height >= from`, most recent first.
    pub fn since(&self, from: u64) -> &[Block] {
        let end = self.blocks.partition_point(|b| b.height >= from);
        &self.blocks[..end]
    }

    pub fn get(&self, height: u64) -> Option<&Block> {
        self.blocks
            .binary_search_by(|b| height.cmp(&b.height))
            .ok()
            .map(|i| &self.blocks[i])
    }

    pub fn as_slice(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BlockWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn block(height: u64) -> Block {
        Block::new(height, format!("{height:064x}"), Utc::now())
    }

    #[test]
    fn test_keeps_descending_and_dedups() {
        let mut window = BlockWindow::new(10);
        assert_eq!(window.extend([block(5), block(7), block(6), block(7)]), 3);
        let heights: Vec<u64> = window.as_slice().iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![7, 6, 5]);
        assert_eq!(window.latest_height(), Some(7));
        assert!(!window.insert(block(6)));
    }

    #[test]
    fn test_evicts_oldest() {
        let mut window = BlockWindow::new(3);
        window.extend((1..=5).map(block));
        let heights: Vec<u64> = window.as_slice().iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![5, 4, 3]);
        // older than anything kept
        assert!(!window.insert(block(2)));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_merge_returns_late_blocks() {
        let mut window = BlockWindow::new(3);
        window.extend((10..=12).map(block));
        let (added, late) = window.merge([block(13), block(4), block(11), block(7), block(4)]);
        assert_eq!(added, 1);
        let late: Vec<u64> = late.iter().map(|b| b.height).collect();
        assert_eq!(late, vec![7, 4]);
        // window itself is unchanged apart from 13
        let heights: Vec<u64> = window.as_slice().iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![13, 12, 11]);

        // a window with room takes old blocks in
        let mut roomy = BlockWindow::new(10);
        roomy.extend([block(10)]);
        assert_eq!(roomy.merge([block(4)]), (1, Vec::new()));
    }

    #[test]
    fn test_since_and_get() {
        let mut window = BlockWindow::default();
        window.extend((100..110).map(block));
        let recent: Vec<u64> = window.since(107).iter().map(|b| b.height).collect();
        assert_eq!(recent, vec![109, 108, 107]);
        assert!(window.since(200).is_empty());
        assert_eq!(window.get(103).map(|b| b.height), Some(103));
        assert!(window.get(99).is_none());
    }
}
