// In-memory block chain

use crate::consensus::next_difficulty;
use crate::core::Block;

/// Append-only sequence of blocks starting at genesis; `blocks[i].index == i`
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    /// Create a chain holding only the genesis block
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::genesis()],
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Best (last) block
    pub fn tip(&self) -> &Block {
        // Never empty: the chain is created with genesis and only grows
        &self.blocks[self.blocks.len() - 1]
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Get a block by index
    pub fn get(&self, index: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(index).ok()?)
    }

    /// Difficulty required for the next block
    pub fn next_difficulty(&self) -> u32 {
        next_difficulty(&self.blocks)
    }

    /// Append an already validated successor of the tip
    pub(crate) fn append(&mut self, block: Block) {
        debug_assert_eq!(block.index, self.tip().index + 1);
        debug_assert_eq!(block.previous_hash.as_deref(), Some(self.tip().hash.as_str()));
        self.blocks.push(block);
    }
}
