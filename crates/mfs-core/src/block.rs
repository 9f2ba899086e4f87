//! Fixed-length block array backing an image.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{MfsError, Result};
use crate::layout::{Region, BLOCK_SIZE};

/// The only byte-addressable substrate of an image.
pub struct BlockStore {
    bytes: Vec<u8>,
}

impl BlockStore {
    /// Allocate `num_blocks` zeroed blocks.
    pub fn new(num_blocks: u32) -> Self {
        Self {
            bytes: vec![0u8; num_blocks as usize * BLOCK_SIZE],
        }
    }

    pub fn num_blocks(&self) -> u32 {
        (self.bytes.len() / BLOCK_SIZE) as u32
    }

    fn range(&self, addr: u32) -> Result<std::ops::Range<usize>> {
        if addr >= self.num_blocks() {
            return Err(MfsError::InvalidArgument(format!(
                "block {} outside of image ({} blocks)",
                addr,
                self.num_blocks()
            )));
        }
        let start = addr as usize * BLOCK_SIZE;
        Ok(start..start + BLOCK_SIZE)
    }

    pub fn block(&self, addr: u32) -> Result<&[u8]> {
        let range = self.range(addr)?;
        Ok(&self.bytes[range])
    }

    pub fn block_mut(&mut self, addr: u32) -> Result<&mut [u8]> {
        let range = self.range(addr)?;
        Ok(&mut self.bytes[range])
    }

    pub fn region(&self, region: Region) -> &[u8] {
        &self.bytes[region.byte_range()]
    }

    pub fn region_mut(&mut self, region: Region) -> &mut [u8] {
        &mut self.bytes[region.byte_range()]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Replace the whole content with exactly `num_blocks × BLOCK_SIZE` bytes
    /// read from `path`.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let mut file = File::open(path)?;
        file.read_exact(&mut self.bytes)?;
        debug!(path = %path.display(), bytes = self.bytes.len(), "Loaded block store");
        Ok(())
    }

    /// Write the whole block array to `path` as one contiguous stream.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&self.bytes)?;
        writer.flush()?;
        debug!(path = %path.display(), bytes = self.bytes.len(), "Saved block store");
        Ok(())
    }
}
