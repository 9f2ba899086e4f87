//! Image header stored in block 0.

use serde::{Deserialize, Serialize};

use crate::error::{MfsError, Result};
use crate::layout::{Layout, BLOCK_SIZE};

/// Magic bytes for image identification
const IMAGE_MAGIC: &[u8; 8] = b"MFSIMAGE";
/// Current image format version
const IMAGE_VERSION: u32 = 1;

/// BLAKE3 digest of the metadata region.
pub type Checksum = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    magic: [u8; 8],
    version: u32,
    pub block_size: u32,
    pub num_blocks: u32,
    pub max_files: u32,
    pub first_data_block: u32,
    /// Allocation epoch at the time of the save.
    pub epoch: u64,
    pub checksum: Checksum,
}

impl Superblock {
    pub fn new(layout: &Layout, epoch: u64, checksum: Checksum) -> Self {
        Self {
            magic: *IMAGE_MAGIC,
            version: IMAGE_VERSION,
            block_size: BLOCK_SIZE as u32,
            num_blocks: layout.geometry.num_blocks,
            max_files: layout.geometry.max_files,
            first_data_block: layout.first_data_block(),
            epoch,
            checksum,
        }
    }

    pub fn compute_checksum(metadata: &[u8]) -> Checksum {
        *blake3::hash(metadata).as_bytes()
    }

    pub fn encode(&self, block: &mut [u8]) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| MfsError::InvalidImage(format!("superblock encoding: {}", e)))?;
        block.fill(0);
        block[..bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn decode(block: &[u8]) -> Result<Self> {
        let sb: Superblock = bincode::deserialize(block)
            .map_err(|e| MfsError::InvalidImage(format!("superblock decoding: {}", e)))?;
        if &sb.magic != IMAGE_MAGIC {
            return Err(MfsError::InvalidImage("Bad magic bytes".to_string()));
        }
        if sb.version != IMAGE_VERSION {
            return Err(MfsError::InvalidImage(format!(
                "Unsupported version: {}",
                sb.version
            )));
        }
        Ok(sb)
    }

    /// Check that the header describes the same geometry as `layout`.
    pub fn validate(&self, layout: &Layout) -> Result<()> {
        let expected = (
            BLOCK_SIZE as u32,
            layout.geometry.num_blocks,
            layout.geometry.max_files,
            layout.first_data_block(),
        );
        let found = (
            self.block_size,
            self.num_blocks,
            self.max_files,
            self.first_data_block,
        );
        if expected != found {
            return Err(MfsError::InvalidImage(format!(
                "geometry mismatch: image has (block size, blocks, files, data base) {:?}, expected {:?}",
                found, expected
            )));
        }
        Ok(())
    }
}
