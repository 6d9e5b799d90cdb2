/// First-fit free list over a linear byte range.
///
/// Tracks free blocks sorted by offset. Allocation takes the first block
/// large enough; freeing merges the block with its free neighbours.
///
/// # Example
///
/// ```ignore
/// let mut list = FreeList::new(1024);
/// let a = list.allocate(256).unwrap(); // 0
/// let b = list.allocate(256).unwrap(); // 256
/// list.free(a, 256);                   // [0..256) free again
/// ```
#[derive(Debug, Clone)]
pub struct FreeList {
    total_size: u64,
    /// Free blocks as `(offset, size)`, sorted by offset, never adjacent
    blocks: Vec<(u64, u64)>,
}

impl FreeList {
    /// Create a list whose whole range is free
    pub fn new(total_size: u64) -> Self {
        let blocks = if total_size > 0 { vec![(0, total_size)] } else { Vec::new() };
        Self { total_size, blocks }
    }

    /// Reserve `size` bytes, returning the offset of the block
    pub fn allocate(&mut self, size: u64) -> Option<u64> {
        if size == 0 {
            return None;
        }
        let index = self.blocks.iter().position(|&(_, block_size)| block_size >= size)?;
        let (offset, block_size) = self.blocks[index];
        if block_size == size {
            self.blocks.remove(index);
        } else {
            self.blocks[index] = (offset + size, block_size - size);
        }
        Some(offset)
    }

    /// Return a block to the list
    ///
    /// Returns false (and changes nothing) if the block lies outside the
    /// range or overlaps free space.
    pub fn free(&mut self, offset: u64, size: u64) -> bool {
        if size == 0 || offset.checked_add(size).map_or(true, |end| end > self.total_size) {
            return false;
        }
        let end = offset + size;
        let index = self.blocks.partition_point(|&(block_offset, _)| block_offset < offset);

        if let Some(&(prev_offset, prev_size)) = index.checked_sub(1).and_then(|i| self.blocks.get(i)) {
            if prev_offset + prev_size > offset {
                return false;
            }
        }
        if let Some(&(next_offset, _)) = self.blocks.get(index) {
            if next_offset < end {
                return false;
            }
        }

        self.blocks.insert(index, (offset, size));

        // Merge with the next block
        if index + 1 < self.blocks.len() && self.blocks[index + 1].0 == end {
            self.blocks[index].1 += self.blocks[index + 1].1;
            self.blocks.remove(index + 1);
        }
        // Merge with the previous block
        if index > 0 {
            let (prev_offset, prev_size) = self.blocks[index - 1];
            if prev_offset + prev_size == offset {
                self.blocks[index - 1].1 += self.blocks[index].1;
                self.blocks.remove(index);
            }
        }
        true
    }

    /// Grow the managed range; shrinking is rejected
    pub fn resize(&mut self, new_size: u64) -> bool {
        if new_size < self.total_size {
            return false;
        }
        let added = new_size - self.total_size;
        let old_size = self.total_size;
        self.total_size = new_size;
        if added > 0 {
            match self.blocks.last_mut() {
                Some((offset, size)) if *offset + *size == old_size => *size += added,
                _ => self.blocks.push((old_size, added)),
            }
        }
        true
    }

    /// Free every block
    pub fn clear(&mut self) {
        *self = Self::new(self.total_size);
    }

    /// Total free bytes
    pub fn free_space(&self) -> u64 {
        self.blocks.iter().map(|&(_, size)| size).sum()
    }

    /// Size of the managed range
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of disjoint free blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "freelist_tests.rs"]
mod tests;
