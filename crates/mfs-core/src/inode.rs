//! Per-file metadata records.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{MfsError, Result};
use crate::layout::{BLOCKS_PER_FILE, BLOCK_SIZE, INODE_SIZE};

/// Sentinel for an unused block slot on the image.
const EMPTY_BLOCK: u32 = u32::MAX;

const FLAG_IN_USE: usize = BLOCKS_PER_FILE * 4 + 8;
const FLAG_HIDDEN: usize = FLAG_IN_USE + 1;
const FLAG_READONLY: usize = FLAG_IN_USE + 2;
const CREATED: usize = FLAG_IN_USE + 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inode {
    /// Block addresses in file order. Its length is the block length.
    pub blocks: Vec<u32>,
    pub in_use: bool,
    pub hidden: bool,
    pub readonly: bool,
    pub file_size: u32,
    pub creation_time: DateTime<Utc>,
}

impl Inode {
    pub fn block_length(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes of the final block that belong to the file.
    pub fn tail_len(&self) -> usize {
        match self.file_size as usize % BLOCK_SIZE {
            0 if self.file_size > 0 => BLOCK_SIZE,
            rem => rem,
        }
    }

    fn encode(&self, out: &mut [u8]) {
        out.fill(0);
        for (slot, chunk) in out[..BLOCKS_PER_FILE * 4].chunks_exact_mut(4).enumerate() {
            let addr = self.blocks.get(slot).copied().unwrap_or(EMPTY_BLOCK);
            chunk.copy_from_slice(&addr.to_le_bytes());
        }
        let lengths = BLOCKS_PER_FILE * 4;
        out[lengths..lengths + 4].copy_from_slice(&(self.blocks.len() as u32).to_le_bytes());
        out[lengths + 4..lengths + 8].copy_from_slice(&self.file_size.to_le_bytes());
        out[FLAG_IN_USE] = self.in_use as u8;
        out[FLAG_HIDDEN] = self.hidden as u8;
        out[FLAG_READONLY] = self.readonly as u8;
        out[CREATED..CREATED + 8].copy_from_slice(&self.creation_time.timestamp().to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let u32_at = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&buf[at..at + 4]);
            u32::from_le_bytes(b)
        };

        let lengths = BLOCKS_PER_FILE * 4;
        let block_length = u32_at(lengths) as usize;
        if block_length > BLOCKS_PER_FILE {
            return Err(MfsError::InvalidImage(format!(
                "inode claims {} blocks",
                block_length
            )));
        }
        let blocks = (0..block_length).map(|slot| u32_at(slot * 4)).collect::<Vec<_>>();
        if blocks.contains(&EMPTY_BLOCK) {
            return Err(MfsError::InvalidImage(
                "inode block list has a hole".to_string(),
            ));
        }

        let mut secs = [0u8; 8];
        secs.copy_from_slice(&buf[CREATED..CREATED + 8]);
        let creation_time = Utc
            .timestamp_opt(i64::from_le_bytes(secs), 0)
            .single()
            .ok_or_else(|| MfsError::InvalidImage("bad inode timestamp".to_string()))?;

        Ok(Self {
            blocks,
            in_use: buf[FLAG_IN_USE] != 0,
            hidden: buf[FLAG_HIDDEN] != 0,
            readonly: buf[FLAG_READONLY] != 0,
            file_size: u32_at(lengths + 4),
            creation_time,
        })
    }
}

/// Fixed table of inode slots.
#[derive(Debug, Clone)]
pub struct InodeTable {
    inodes: Vec<Inode>,
}

impl InodeTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            inodes: vec![Inode::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.inodes.len()
    }

    pub fn get(&self, idx: u32) -> Result<&Inode> {
        self.inodes
            .get(idx as usize)
            .ok_or_else(|| MfsError::InvalidImage(format!("inode {} out of range", idx)))
    }

    pub fn get_mut(&mut self, idx: u32) -> Result<&mut Inode> {
        self.inodes
            .get_mut(idx as usize)
            .ok_or_else(|| MfsError::InvalidImage(format!("inode {} out of range", idx)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Inode)> {
        self.inodes.iter().enumerate().map(|(i, inode)| (i as u32, inode))
    }

    pub fn encode(&self, out: &mut [u8]) {
        for (inode, chunk) in self.inodes.iter().zip(out.chunks_exact_mut(INODE_SIZE)) {
            inode.encode(chunk);
        }
    }

    pub fn decode(bytes: &[u8], capacity: usize) -> Result<Self> {
        if bytes.len() < capacity * INODE_SIZE {
            return Err(MfsError::InvalidImage("inode region too small".to_string()));
        }
        let inodes = bytes
            .chunks_exact(INODE_SIZE)
            .take(capacity)
            .map(Inode::decode)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { inodes })
    }
}
