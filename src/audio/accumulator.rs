//! # Audio Accumulator
//!
//! Ordered store for the raw audio blocks collected while a fragment pull is still
//! inside its boundary. Blocks are kept as received; conversion to samples happens
//! once, in the encoder.

/// Raw audio blocks in arrival order, plus a running byte count.
#[derive(Debug, Default)]
pub struct AudioAccumulator {
    blocks: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl AudioAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: Vec<u8>) {
        self.total_bytes += block.len();
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Vec<u8>] {
        &self.blocks
    }

    /// Number of blocks held.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Drop all blocks, keeping the allocation for the next record.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.total_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_tracks_order_and_bytes() {
        let mut acc = AudioAccumulator::new();
        acc.push(vec![1, 2]);
        acc.push(vec![3, 4, 5, 6]);
        assert_eq!(acc.len(), 2);
        assert_eq!(acc.total_bytes(), 6);
        assert_eq!(acc.blocks()[1], vec![3, 4, 5, 6]);

        acc.clear();
        assert!(acc.is_empty());
        assert_eq!(acc.total_bytes(), 0);
    }
}
