//! Image geometry and region layout.
//!
//! ```text
//! +-------------------+  block 0
//! | Superblock        |  magic, geometry, epoch, metadata checksum
//! +-------------------+
//! | Directory table   |  max_files × DIR_ENTRY_SIZE
//! +-------------------+
//! | Inode table       |  max_files × INODE_SIZE
//! +-------------------+
//! | Free-inode map    |  one byte per inode slot
//! | Inode epochs      |  u64 per inode slot
//! | Free-block map    |  one byte per data block
//! | Block epochs      |  u64 per data block
//! +-------------------+  first_data_block
//! | Data region       |  to the end of the address space
//! +-------------------+
//! ```
//!
//! Every region is sized from the declared capacities and the whole layout is
//! checked for overlap when it is computed.

use crate::error::{MfsError, Result};

pub const BLOCK_SIZE: usize = 1024;
pub const NUM_BLOCKS: u32 = 65536;
pub const MAX_NUM_FILES: u32 = 256;
pub const BLOCKS_PER_FILE: usize = 1024;
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Directory names occupy a 64-byte NUL-terminated field.
pub const NAME_FIELD_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;

/// name(64) + in_use(1) + pad(3) + inode(4) + deleted_epoch(8)
pub const DIR_ENTRY_SIZE: usize = 80;
/// blocks(1024 × 4) + block_length(4) + file_size(4) + flags(4) + creation_time(8)
pub const INODE_SIZE: usize = BLOCKS_PER_FILE * 4 + 20;

const EPOCH_SIZE: usize = 8;

/// Capacities an image is built from. Block size and per-file limits are fixed;
/// only the address space and the number of file slots vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub num_blocks: u32,
    pub max_files: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            num_blocks: NUM_BLOCKS,
            max_files: MAX_NUM_FILES,
        }
    }
}

impl Geometry {
    /// Size of the whole image in bytes.
    pub fn image_bytes(&self) -> usize {
        self.num_blocks as usize * BLOCK_SIZE
    }
}

/// A contiguous run of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u32,
    pub blocks: u32,
}

impl Region {
    fn after(prev: Region, bytes: usize) -> Self {
        Self {
            start: prev.end(),
            blocks: blocks_for(bytes),
        }
    }

    pub fn end(&self) -> u32 {
        self.start + self.blocks
    }

    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.start as usize * BLOCK_SIZE..self.end() as usize * BLOCK_SIZE
    }

    pub fn byte_len(&self) -> usize {
        self.blocks as usize * BLOCK_SIZE
    }

    pub fn contains(&self, block: u32) -> bool {
        block >= self.start && block < self.end()
    }
}

fn blocks_for(bytes: usize) -> u32 {
    bytes.div_ceil(BLOCK_SIZE) as u32
}

/// Block ranges of every on-image structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub geometry: Geometry,
    pub superblock: Region,
    pub directory: Region,
    pub inodes: Region,
    pub inode_map: Region,
    pub inode_epochs: Region,
    pub block_map: Region,
    pub block_epochs: Region,
    pub data: Region,
}

impl Layout {
    /// Lay out an image for `geometry`.
    ///
    /// The free-block map and block epochs depend on the number of data blocks,
    /// which in turn depends on where the data region starts; the smallest data
    /// base whose metadata still fits in front of it is chosen.
    pub fn compute(geometry: Geometry) -> Result<Self> {
        if geometry.max_files == 0 {
            return Err(MfsError::InvalidArgument(
                "image must hold at least one file".to_string(),
            ));
        }
        let max_files = geometry.max_files as usize;

        let superblock = Region {
            start: 0,
            blocks: 1,
        };
        let directory = Region::after(superblock, max_files * DIR_ENTRY_SIZE);
        let inodes = Region::after(directory, max_files * INODE_SIZE);
        let inode_map = Region::after(inodes, max_files);
        let inode_epochs = Region::after(inode_map, max_files * EPOCH_SIZE);

        let fixed_end = inode_epochs.end();
        if fixed_end >= geometry.num_blocks {
            return Err(MfsError::InvalidArgument(format!(
                "{} blocks cannot hold metadata for {} files",
                geometry.num_blocks, geometry.max_files
            )));
        }

        let mut first_data = fixed_end;
        let (block_map, block_epochs) = loop {
            let data_blocks = (geometry.num_blocks - first_data) as usize;
            let block_map = Region::after(inode_epochs, data_blocks);
            let block_epochs = Region::after(block_map, data_blocks * EPOCH_SIZE);
            if block_epochs.end() <= first_data {
                break (block_map, block_epochs);
            }
            first_data += 1;
            if first_data >= geometry.num_blocks {
                return Err(MfsError::InvalidArgument(format!(
                    "{} blocks leave no room for a data region",
                    geometry.num_blocks
                )));
            }
        };

        let layout = Self {
            geometry,
            superblock,
            directory,
            inodes,
            inode_map,
            inode_epochs,
            block_map,
            block_epochs,
            data: Region {
                start: first_data,
                blocks: geometry.num_blocks - first_data,
            },
        };
        layout.verify()?;
        Ok(layout)
    }

    /// Check that regions are in bounds, in order, non-overlapping and large
    /// enough for the records they hold.
    pub fn verify(&self) -> Result<()> {
        let regions = self.regions();
        for pair in regions.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.1.end() > b.1.start {
                return Err(MfsError::InvalidImage(format!(
                    "{} region overlaps {} region",
                    a.0, b.0
                )));
            }
        }
        if self.data.end() != self.geometry.num_blocks {
            return Err(MfsError::InvalidImage(
                "data region does not reach the end of the image".to_string(),
            ));
        }

        let files = self.geometry.max_files as usize;
        let data_blocks = self.data.blocks as usize;
        let required = [
            ("directory", self.directory, files * DIR_ENTRY_SIZE),
            ("inode", self.inodes, files * INODE_SIZE),
            ("free-inode map", self.inode_map, files),
            ("inode epoch", self.inode_epochs, files * EPOCH_SIZE),
            ("free-block map", self.block_map, data_blocks),
            ("block epoch", self.block_epochs, data_blocks * EPOCH_SIZE),
        ];
        for (name, region, bytes) in required {
            if region.byte_len() < bytes {
                return Err(MfsError::InvalidImage(format!(
                    "{} region holds {} bytes, needs {}",
                    name,
                    region.byte_len(),
                    bytes
                )));
            }
        }
        Ok(())
    }

    fn regions(&self) -> [(&'static str, Region); 8] {
        [
            ("superblock", self.superblock),
            ("directory", self.directory),
            ("inode", self.inodes),
            ("free-inode map", self.inode_map),
            ("inode epoch", self.inode_epochs),
            ("free-block map", self.block_map),
            ("block epoch", self.block_epochs),
            ("data", self.data),
        ]
    }

    pub fn first_data_block(&self) -> u32 {
        self.data.start
    }

    pub fn data_blocks(&self) -> u32 {
        self.data.blocks
    }

    /// Blocks in front of the data region whose bytes are covered by the
    /// metadata checksum.
    pub fn metadata_range(&self) -> std::ops::Range<usize> {
        self.directory.start as usize * BLOCK_SIZE..self.data.start as usize * BLOCK_SIZE
    }
}
