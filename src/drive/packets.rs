//! Next-Index-of-Packets table
//!
//! Maps every packet index to the index of the packet that follows it in a
//! record's chain. The same table doubles as the free list: a slot holding
//! [`EMPTY`] is unallocated.
//!
//! Slots are grouped in blocks of [`BLOCK_SIZE`]. A block is materialized the
//! first time a non-empty value is written into it; slots of missing blocks
//! read as [`EMPTY`].

use std::collections::BTreeMap;

/// Terminates a chain. Packet 0 holds parity, so it is never a successor.
pub const END_OF_PACKETS: i32 = 0;

/// Marks an unallocated packet.
pub const EMPTY: i32 = -1;

/// Slots per materialized block.
pub const BLOCK_SIZE: usize = 1024;

#[derive(Debug)]
pub(crate) struct PacketTable {
    blocks: BTreeMap<usize, Box<[i32]>>,
    /// Every index below this is allocated. Only ever a lower bound.
    lowest_free: usize,
}

impl PacketTable {
    /// Empty table with packet 0 reserved.
    pub fn new() -> Self {
        let mut table = Self {
            blocks: BTreeMap::new(),
            lowest_free: 1,
        };
        table.set(0, END_OF_PACKETS);
        table
    }

    /// Rebuild from a flattened sequence (slot `i` = element `i`).
    pub fn from_sequence(sequence: impl IntoIterator<Item = i32>) -> Self {
        let mut table = Self {
            blocks: BTreeMap::new(),
            lowest_free: 1,
        };
        for (index, next) in sequence.into_iter().enumerate() {
            table.set(index, next);
        }
        table
    }

    pub fn get(&self, index: usize) -> i32 {
        self.blocks
            .get(&(index / BLOCK_SIZE))
            .map_or(EMPTY, |block| block[index % BLOCK_SIZE])
    }

    pub fn set(&mut self, index: usize, next: i32) {
        let (block_no, slot) = (index / BLOCK_SIZE, index % BLOCK_SIZE);
        if let Some(block) = self.blocks.get_mut(&block_no) {
            block[slot] = next;
        } else if next != EMPTY {
            let mut block = vec![EMPTY; BLOCK_SIZE].into_boxed_slice();
            block[slot] = next;
            self.blocks.insert(block_no, block);
        }

        if next == EMPTY {
            if index > 0 && index < self.lowest_free {
                self.lowest_free = index;
            }
        } else if index == self.lowest_free {
            while self.get(self.lowest_free) != EMPTY {
                self.lowest_free += 1;
            }
        }
    }

    /// First empty slot with an index greater than `start`. Allocates nothing.
    pub fn next_empty(&self, start: usize) -> usize {
        let mut current = (start + 1).max(self.lowest_free);
        while self.get(current) != EMPTY {
            current += 1;
        }
        current
    }

    /// Number of addressable slots (materialized blocks up to the highest).
    pub fn capacity(&self) -> usize {
        self.blocks
            .keys()
            .next_back()
            .map_or(0, |last| (last + 1) * BLOCK_SIZE)
    }

    /// Flatten blocks `0..=highest`, filling missing blocks with [`EMPTY`].
    pub fn to_sequence(&self) -> Vec<i32> {
        let mut sequence = Vec::with_capacity(self.capacity());
        for block_no in 0..self.capacity() / BLOCK_SIZE {
            match self.blocks.get(&block_no) {
                Some(block) => sequence.extend_from_slice(block),
                None => sequence.extend(std::iter::repeat(EMPTY).take(BLOCK_SIZE)),
            }
        }
        sequence
    }

    /// Values of every materialized slot.
    pub fn values(&self) -> impl Iterator<Item = i32> + '_ {
        self.blocks.values().flat_map(|block| block.iter().copied())
    }
}
