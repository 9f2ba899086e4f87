//! Flat directory table: fixed slots binding names to inode indices.

use crate::error::{MfsError, Result};
use crate::layout::{DIR_ENTRY_SIZE, MAX_NAME_LEN, NAME_FIELD_LEN};

const NO_INODE: i32 = -1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub in_use: bool,
    pub inode: Option<u32>,
    /// Allocation epoch at the moment the entry was deleted.
    pub deleted_epoch: u64,
}

impl DirEntry {
    fn encode(&self, out: &mut [u8]) {
        out.fill(0);
        let name = self.name.as_bytes();
        let len = name.len().min(MAX_NAME_LEN);
        out[..len].copy_from_slice(&name[..len]);
        out[64] = self.in_use as u8;
        let inode = self.inode.map_or(NO_INODE, |i| i as i32);
        out[68..72].copy_from_slice(&inode.to_le_bytes());
        out[72..80].copy_from_slice(&self.deleted_epoch.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let name_field = &buf[..NAME_FIELD_LEN];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_FIELD_LEN);
        let name = std::str::from_utf8(&name_field[..name_len])
            .map_err(|_| MfsError::InvalidImage("directory name is not UTF-8".to_string()))?
            .to_string();

        let mut inode_bytes = [0u8; 4];
        inode_bytes.copy_from_slice(&buf[68..72]);
        let inode = match i32::from_le_bytes(inode_bytes) {
            NO_INODE => None,
            i if i >= 0 => Some(i as u32),
            i => {
                return Err(MfsError::InvalidImage(format!(
                    "directory entry refers to inode {}",
                    i
                )))
            }
        };

        let mut epoch_bytes = [0u8; 8];
        epoch_bytes.copy_from_slice(&buf[72..80]);

        Ok(Self {
            name,
            in_use: buf[64] != 0,
            inode,
            deleted_epoch: u64::from_le_bytes(epoch_bytes),
        })
    }
}

/// All directory slots of an image, in slot order.
#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Directory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![DirEntry::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, slot: usize) -> Option<&DirEntry> {
        self.entries.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut DirEntry> {
        self.entries.get_mut(slot)
    }

    /// First in-use entry named `name`, in slot order.
    pub fn find_active(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.in_use && e.name == name)
    }

    /// First not-in-use entry still carrying `name` and an inode reference.
    pub fn find_deleted(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| !e.in_use && e.inode.is_some() && e.name == name)
    }

    /// Lowest slot that is not in use.
    pub fn free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|e| !e.in_use)
    }

    /// In-use entries with their slot index.
    pub fn active(&self) -> impl Iterator<Item = (usize, &DirEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.in_use)
    }

    pub fn encode(&self, out: &mut [u8]) {
        for (entry, chunk) in self.entries.iter().zip(out.chunks_exact_mut(DIR_ENTRY_SIZE)) {
            entry.encode(chunk);
        }
    }

    pub fn decode(bytes: &[u8], capacity: usize) -> Result<Self> {
        if bytes.len() < capacity * DIR_ENTRY_SIZE {
            return Err(MfsError::InvalidImage(
                "directory region too small".to_string(),
            ));
        }
        let entries = bytes
            .chunks_exact(DIR_ENTRY_SIZE)
            .take(capacity)
            .map(DirEntry::decode)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }
}
