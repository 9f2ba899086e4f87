//! First-fit allocation of inode slots and data blocks.
//!
//! Every allocation advances a monotonic epoch and stamps the allocated slot
//! with it. A deleted file remembers the epoch of its deletion, so undelete can
//! tell whether any of its slots were handed out again in the meantime.

use tracing::trace;

use crate::bitmap::FreeMap;
use crate::error::{MfsError, Result};

/// Free-space bookkeeping for one image.
#[derive(Debug, Clone)]
pub struct Allocator {
    inodes: FreeMap,
    blocks: FreeMap,
    inode_epochs: Vec<u64>,
    block_epochs: Vec<u64>,
    first_data_block: u32,
    epoch: u64,
}

impl Allocator {
    /// Everything available, epoch zero.
    pub fn new(max_files: usize, data_blocks: usize, first_data_block: u32) -> Self {
        Self {
            inodes: FreeMap::all_free(max_files),
            blocks: FreeMap::all_free(data_blocks),
            inode_epochs: vec![0; max_files],
            block_epochs: vec![0; data_blocks],
            first_data_block,
            epoch: 0,
        }
    }

    pub(crate) fn from_parts(
        inodes: FreeMap,
        blocks: FreeMap,
        inode_epochs: Vec<u64>,
        block_epochs: Vec<u64>,
        first_data_block: u32,
        epoch: u64,
    ) -> Self {
        Self {
            inodes,
            blocks,
            inode_epochs,
            block_epochs,
            first_data_block,
            epoch,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn first_data_block(&self) -> u32 {
        self.first_data_block
    }

    pub fn inode_map(&self) -> &FreeMap {
        &self.inodes
    }

    pub fn block_map(&self) -> &FreeMap {
        &self.blocks
    }

    pub fn inode_epochs(&self) -> &[u64] {
        &self.inode_epochs
    }

    pub fn block_epochs(&self) -> &[u64] {
        &self.block_epochs
    }

    fn slot_of(&self, addr: u32) -> Result<usize> {
        let slot = addr
            .checked_sub(self.first_data_block)
            .map(|s| s as usize)
            .filter(|&s| s < self.blocks.len());
        slot.ok_or_else(|| {
            MfsError::InvalidArgument(format!("block {} is not a data block", addr))
        })
    }

    fn tick(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Take the lowest free inode slot.
    pub fn allocate_inode(&mut self) -> Result<u32> {
        let slot = self.inodes.take_first().ok_or(MfsError::NoFreeInode)?;
        self.inode_epochs[slot] = self.tick();
        trace!(inode = slot, epoch = self.epoch, "Allocated inode");
        Ok(slot as u32)
    }

    /// Take the lowest free data block and return its block address.
    pub fn allocate_block(&mut self) -> Result<u32> {
        let slot = self.blocks.take_first().ok_or(MfsError::NoFreeBlock)?;
        self.block_epochs[slot] = self.tick();
        let addr = slot as u32 + self.first_data_block;
        trace!(block = addr, epoch = self.epoch, "Allocated block");
        Ok(addr)
    }

    /// Return an inode slot to the pool. Its record is left untouched.
    pub fn free_inode(&mut self, idx: u32) -> Result<()> {
        self.inodes.release(idx as usize)?;
        Ok(())
    }

    /// Return a data block to the pool. Its content is left untouched.
    pub fn free_block(&mut self, addr: u32) -> Result<()> {
        let slot = self.slot_of(addr)?;
        self.blocks.release(slot)?;
        Ok(())
    }

    /// Mark a specific inode slot in use again without stamping it.
    pub fn claim_inode(&mut self, idx: u32) -> Result<()> {
        self.inodes.claim(idx as usize)?;
        Ok(())
    }

    /// Mark a specific data block in use again without stamping it.
    pub fn claim_block(&mut self, addr: u32) -> Result<()> {
        let slot = self.slot_of(addr)?;
        self.blocks.claim(slot)?;
        Ok(())
    }

    pub fn is_inode_free(&self, idx: u32) -> bool {
        self.inodes.is_free(idx as usize)
    }

    pub fn is_block_free(&self, addr: u32) -> bool {
        self.slot_of(addr)
            .map(|slot| self.blocks.is_free(slot))
            .unwrap_or(false)
    }

    /// Whether the inode slot was handed out after `epoch`.
    pub fn inode_reused_since(&self, idx: u32, epoch: u64) -> bool {
        self.inode_epochs
            .get(idx as usize)
            .map_or(true, |&stamp| stamp > epoch)
    }

    /// Whether the block was handed out after `epoch`.
    pub fn block_reused_since(&self, addr: u32, epoch: u64) -> bool {
        self.slot_of(addr)
            .map(|slot| self.block_epochs[slot] > epoch)
            .unwrap_or(true)
    }

    pub fn free_blocks(&self) -> usize {
        self.blocks.free_count()
    }

    pub fn free_inodes(&self) -> usize {
        self.inodes.free_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_addresses_are_offset() {
        let mut alloc = Allocator::new(4, 8, 100);
        assert_eq!(alloc.allocate_block().unwrap(), 100);
        assert_eq!(alloc.allocate_block().unwrap(), 101);
        alloc.free_block(100).unwrap();
        assert_eq!(alloc.allocate_block().unwrap(), 100);
    }

    #[test]
    fn test_exhaustion() {
        let mut alloc = Allocator::new(1, 1, 10);
        alloc.allocate_inode().unwrap();
        assert!(matches!(alloc.allocate_inode(), Err(MfsError::NoFreeInode)));
        alloc.allocate_block().unwrap();
        assert!(matches!(alloc.allocate_block(), Err(MfsError::NoFreeBlock)));
    }

    #[test]
    fn test_free_does_not_stamp() {
        let mut alloc = Allocator::new(2, 4, 10);
        let addr = alloc.allocate_block().unwrap();
        let deleted_at = alloc.epoch();
        alloc.free_block(addr).unwrap();
        assert!(!alloc.block_reused_since(addr, deleted_at));

        assert_eq!(alloc.allocate_block().unwrap(), addr);
        assert!(alloc.block_reused_since(addr, deleted_at));
    }

    #[test]
    fn test_non_data_address_rejected() {
        let mut alloc = Allocator::new(2, 4, 10);
        assert!(alloc.free_block(9).is_err());
        assert!(alloc.free_block(14).is_err());
        assert!(!alloc.is_block_free(9));
        assert!(alloc.is_block_free(13));
    }

    #[test]
    fn test_counts() {
        let mut alloc = Allocator::new(3, 5, 0);
        alloc.allocate_inode().unwrap();
        alloc.allocate_block().unwrap();
        alloc.allocate_block().unwrap();
        assert_eq!(alloc.free_inodes(), 2);
        assert_eq!(alloc.free_blocks(), 3);
    }
}
