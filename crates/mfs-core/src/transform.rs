//! Ranged hex reads and the in-place XOR transform.
//!
//! Both operate on the non-zero bytes of a file only: zero bytes are skipped
//! by `read_range` and left untouched by `xor_transform`.

use tracing::{info, instrument};

use crate::error::{MfsError, Result};
use crate::image::Image;
use crate::layout::BLOCK_SIZE;

/// Which label an XOR pass is reported under. Both run the same transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XorDirection {
    Encrypt,
    Decrypt,
}

impl XorDirection {
    pub fn label(&self) -> &'static str {
        match self {
            XorDirection::Encrypt => "Encryption",
            XorDirection::Decrypt => "Decryption",
        }
    }
}

/// Parse a transform key: exactly one byte, used as its byte value.
pub fn parse_key(token: &str) -> Result<u8> {
    match token.as_bytes() {
        [key] => Ok(*key),
        _ => Err(MfsError::InvalidArgument(format!(
            "key must be exactly one byte, got {} bytes",
            token.len()
        ))),
    }
}

impl Image {
    /// Hex codes of the non-zero bytes in `[start, start + length)`, clamped
    /// to the file's block extent. Zero bytes produce no output at all.
    #[instrument(skip(self), level = "debug")]
    pub fn read_range(&self, name: &str, start: usize, length: usize) -> Result<String> {
        let (_, inode_index) = self.resolve(name)?;
        let inode = self.inodes.get(inode_index)?;

        let extent = inode.block_length() * BLOCK_SIZE;
        if start / BLOCK_SIZE >= inode.block_length() {
            return Err(MfsError::InvalidArgument(format!(
                "start byte {} outside of file range ({} blocks)",
                start,
                inode.block_length()
            )));
        }
        let end = start.saturating_add(length).min(extent);

        let mut non_zero: Vec<u8> = Vec::new();
        let mut offset = start;
        while offset < end {
            let addr = inode.blocks[offset / BLOCK_SIZE];
            let within = offset % BLOCK_SIZE;
            let take = (BLOCK_SIZE - within).min(end - offset);
            let block = self.store.block(addr)?;
            non_zero.extend(block[within..within + take].iter().filter(|&&b| b != 0));
            offset += take;
        }
        Ok(hex::encode(non_zero))
    }

    /// XOR every non-zero byte of every block of the file with `key`.
    /// Applying the same key twice restores the original content.
    #[instrument(skip(self))]
    pub fn xor_transform(&mut self, name: &str, key: u8) -> Result<()> {
        let (_, inode_index) = self.resolve(name)?;
        let blocks = self.inodes.get(inode_index)?.blocks.clone();
        for addr in &blocks {
            for byte in self.store.block_mut(*addr)?.iter_mut() {
                if *byte != 0 {
                    *byte ^= key;
                }
            }
        }
        info!(name, blocks = blocks.len(), "Transformed file");
        Ok(())
    }
}
