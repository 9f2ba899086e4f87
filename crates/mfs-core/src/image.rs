//! In-memory image: block store plus the typed tables decoded from it.

use std::path::Path;

use tracing::{debug, instrument};

use crate::alloc::Allocator;
use crate::bitmap::FreeMap;
use crate::block::BlockStore;
use crate::directory::Directory;
use crate::error::{MfsError, Result};
use crate::inode::InodeTable;
use crate::layout::{Geometry, Layout, BLOCK_SIZE};
use crate::superblock::Superblock;

/// One file system image.
///
/// The directory, inode table and allocator are owned here and written back
/// into their block ranges when the image is saved.
pub struct Image {
    pub(crate) layout: Layout,
    pub(crate) store: BlockStore,
    pub(crate) directory: Directory,
    pub(crate) inodes: InodeTable,
    pub(crate) alloc: Allocator,
}

impl Image {
    /// A fresh image: empty directory, every inode and data block free.
    pub fn new(geometry: Geometry) -> Result<Self> {
        let layout = Layout::compute(geometry)?;
        let files = geometry.max_files as usize;
        Ok(Self {
            store: BlockStore::new(geometry.num_blocks),
            directory: Directory::new(files),
            inodes: InodeTable::new(files),
            alloc: Allocator::new(
                files,
                layout.data_blocks() as usize,
                layout.first_data_block(),
            ),
            layout,
        })
    }

    /// Read an image saved by [`Image::save`].
    #[instrument(level = "debug")]
    pub fn load(path: &Path, geometry: Geometry) -> Result<Self> {
        let layout = Layout::compute(geometry)?;
        let mut store = BlockStore::new(geometry.num_blocks);
        store.load(path)?;

        let superblock = Superblock::decode(store.region(layout.superblock))?;
        superblock.validate(&layout)?;
        let checksum = Superblock::compute_checksum(&store.as_bytes()[layout.metadata_range()]);
        if checksum != superblock.checksum {
            return Err(MfsError::InvalidImage(
                "metadata checksum mismatch".to_string(),
            ));
        }

        let files = geometry.max_files as usize;
        let data_blocks = layout.data_blocks() as usize;
        let directory = Directory::decode(store.region(layout.directory), files)?;
        let inodes = InodeTable::decode(store.region(layout.inodes), files)?;
        let alloc = Allocator::from_parts(
            FreeMap::decode(store.region(layout.inode_map), files)?,
            FreeMap::decode(store.region(layout.block_map), data_blocks)?,
            decode_epochs(store.region(layout.inode_epochs), files),
            decode_epochs(store.region(layout.block_epochs), data_blocks),
            layout.first_data_block(),
            superblock.epoch,
        );

        debug!(
            files = directory.active().count(),
            free_blocks = alloc.free_blocks(),
            "Decoded image metadata"
        );
        Ok(Self {
            layout,
            store,
            directory,
            inodes,
            alloc,
        })
    }

    /// Write metadata back into its regions, then the whole block array to `path`.
    #[instrument(skip(self), level = "debug")]
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.sync_metadata()?;
        self.store.save(path)
    }

    fn sync_metadata(&mut self) -> Result<()> {
        let layout = self.layout;
        self.directory
            .encode(self.store.region_mut(layout.directory));
        self.inodes.encode(self.store.region_mut(layout.inodes));
        self.alloc
            .inode_map()
            .encode(self.store.region_mut(layout.inode_map));
        self.alloc
            .block_map()
            .encode(self.store.region_mut(layout.block_map));
        encode_epochs(
            self.alloc.inode_epochs(),
            self.store.region_mut(layout.inode_epochs),
        );
        encode_epochs(
            self.alloc.block_epochs(),
            self.store.region_mut(layout.block_epochs),
        );

        let checksum =
            Superblock::compute_checksum(&self.store.as_bytes()[layout.metadata_range()]);
        Superblock::new(&layout, self.alloc.epoch(), checksum)
            .encode(self.store.region_mut(layout.superblock))
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn allocator(&self) -> &Allocator {
        &self.alloc
    }

    /// Raw content of one block.
    pub fn block(&self, addr: u32) -> Result<&[u8]> {
        self.store.block(addr)
    }

    /// Free space in bytes: free data blocks times the block size.
    pub fn available(&self) -> u64 {
        self.alloc.free_blocks() as u64 * BLOCK_SIZE as u64
    }
}

fn encode_epochs(epochs: &[u64], out: &mut [u8]) {
    for (epoch, chunk) in epochs.iter().zip(out.chunks_exact_mut(8)) {
        chunk.copy_from_slice(&epoch.to_le_bytes());
    }
}

fn decode_epochs(bytes: &[u8], len: usize) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .take(len)
        .map(|chunk| {
            let mut b = [0u8; 8];
            b.copy_from_slice(chunk);
            u64::from_le_bytes(b)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small() -> Geometry {
        Geometry {
            num_blocks: 512,
            max_files: 8,
        }
    }

    #[test]
    fn test_fresh_image_is_empty() {
        let image = Image::new(small()).unwrap();
        assert_eq!(image.directory().active().count(), 0);
        assert_eq!(
            image.available(),
            image.layout().data_blocks() as u64 * BLOCK_SIZE as u64
        );
        assert_eq!(image.allocator().free_inodes(), 8);
    }

    #[test]
    fn test_save_and_load_preserve_allocator_state() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("disk.img");

        let mut image = Image::new(small()).unwrap();
        let inode = image.alloc.allocate_inode().unwrap();
        let block = image.alloc.allocate_block().unwrap();
        image.save(&path).unwrap();

        let loaded = Image::load(&path, small()).unwrap();
        assert!(!loaded.allocator().is_inode_free(inode));
        assert!(!loaded.allocator().is_block_free(block));
        assert_eq!(loaded.allocator().epoch(), image.allocator().epoch());
        assert_eq!(loaded.available(), image.available());
    }

    #[test]
    fn test_load_detects_tampered_metadata() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("disk.img");

        let mut image = Image::new(small()).unwrap();
        image.save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let offset = image.layout().directory.start as usize * BLOCK_SIZE;
        bytes[offset] = b'x';
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            Image::load(&path, small()),
            Err(MfsError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_load_rejects_other_geometry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("disk.img");
        Image::new(small()).unwrap().save(&path).unwrap();

        let other = Geometry {
            num_blocks: 512,
            max_files: 4,
        };
        assert!(matches!(
            Image::load(&path, other),
            Err(MfsError::InvalidImage(_))
        ));
    }
}
