//! Whole-file operations: insert, retrieve, delete, undelete.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::directory::DirEntry;
use crate::error::{MfsError, Result};
use crate::image::Image;
use crate::inode::Inode;
use crate::layout::{BLOCK_SIZE, MAX_FILE_SIZE, MAX_NAME_LEN};

/// Where an inserted file landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inserted {
    pub name: String,
    pub slot: usize,
    pub inode: u32,
    pub blocks: Vec<u32>,
}

/// Result of an undelete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Undelete {
    Recovered,
    /// An active entry already carries the name; nothing changed.
    AlreadyPresent,
}

/// Metadata of an active file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub slot: usize,
    pub inode_index: u32,
    pub inode: Inode,
}

impl Image {
    /// Directory slot and inode index of the first active entry named `name`.
    pub(crate) fn resolve(&self, name: &str) -> Result<(usize, u32)> {
        let slot = self
            .directory
            .find_active(name)
            .ok_or_else(|| MfsError::not_found(name))?;
        let inode = self
            .directory
            .get(slot)
            .and_then(|e| e.inode)
            .ok_or_else(|| MfsError::InvalidImage(format!("entry {} has no inode", slot)))?;
        Ok((slot, inode))
    }

    /// Copy a host file into the image.
    ///
    /// All-or-nothing: if allocation fails partway, every inode and block
    /// taken by this call is released and the tables are left as they were.
    #[instrument(skip(self, source), fields(source = %source.display()))]
    pub fn insert(&mut self, source: &Path) -> Result<Inserted> {
        let size = fs::metadata(source)?.len();

        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                MfsError::InvalidArgument(format!("{} has no usable file name", source.display()))
            })?
            .to_string();
        if name.len() > MAX_NAME_LEN {
            return Err(MfsError::NameTooLong {
                len: name.len(),
                limit: MAX_NAME_LEN,
            });
        }
        if size > MAX_FILE_SIZE {
            return Err(MfsError::FileTooLarge {
                size,
                limit: MAX_FILE_SIZE,
            });
        }
        let available = self.available();
        if size > available {
            return Err(MfsError::InsufficientSpace {
                needed: size,
                available,
            });
        }
        let slot = self.directory.free_slot().ok_or(MfsError::DirectoryFull)?;
        if self.directory.find_active(&name).is_some() {
            return Err(MfsError::AlreadyExists { name });
        }

        let data = fs::read(source)?;
        if data.len() as u64 > MAX_FILE_SIZE {
            return Err(MfsError::FileTooLarge {
                size: data.len() as u64,
                limit: MAX_FILE_SIZE,
            });
        }

        let inode_index = self.alloc.allocate_inode()?;
        let blocks = match self.copy_in(&data) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(error = %e, "Insert failed, releasing inode");
                self.alloc.free_inode(inode_index)?;
                return Err(e);
            }
        };

        *self.inodes.get_mut(inode_index)? = Inode {
            blocks: blocks.clone(),
            in_use: true,
            hidden: false,
            readonly: false,
            file_size: data.len() as u32,
            creation_time: Utc::now(),
        };
        if let Some(entry) = self.directory.get_mut(slot) {
            *entry = DirEntry {
                name: name.clone(),
                in_use: true,
                inode: Some(inode_index),
                deleted_epoch: 0,
            };
        }

        info!(
            name = %name,
            bytes = data.len(),
            blocks = blocks.len(),
            inode = inode_index,
            "Inserted file"
        );
        Ok(Inserted {
            name,
            slot,
            inode: inode_index,
            blocks,
        })
    }

    /// Write `data` into freshly allocated, zero-filled blocks.
    fn copy_in(&mut self, data: &[u8]) -> Result<Vec<u32>> {
        let mut blocks = Vec::with_capacity(data.len().div_ceil(BLOCK_SIZE));
        for chunk in data.chunks(BLOCK_SIZE) {
            let addr = match self.alloc.allocate_block() {
                Ok(addr) => addr,
                Err(e) => {
                    for &taken in &blocks {
                        self.alloc.free_block(taken)?;
                    }
                    return Err(e);
                }
            };
            let block = self.store.block_mut(addr)?;
            block.fill(0);
            block[..chunk.len()].copy_from_slice(chunk);
            blocks.push(addr);
        }
        Ok(blocks)
    }

    /// Reassemble the bytes of an active file.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let (_, inode_index) = self.resolve(name)?;
        let inode = self.inodes.get(inode_index)?;

        let mut out = Vec::with_capacity(inode.file_size as usize);
        let mut remaining = inode.file_size as usize;
        for &addr in &inode.blocks {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(BLOCK_SIZE);
            out.extend_from_slice(&self.store.block(addr)?[..take]);
            remaining -= take;
        }
        if remaining != 0 {
            return Err(MfsError::InvalidImage(format!(
                "{} is {} bytes but its blocks hold {}",
                name,
                inode.file_size,
                out.len()
            )));
        }
        Ok(out)
    }

    /// Copy a file out of the image to `dest`, or to `name` in the current
    /// directory. Returns the written path and byte count.
    #[instrument(skip(self))]
    pub fn retrieve(&self, name: &str, dest: Option<&Path>) -> Result<(PathBuf, usize)> {
        let data = self.read_file(name)?;
        let dest = dest.map_or_else(|| PathBuf::from(name), Path::to_path_buf);
        fs::write(&dest, &data)?;
        debug!(dest = %dest.display(), bytes = data.len(), "Retrieved file");
        Ok((dest, data.len()))
    }

    /// Mark a file deleted and return its inode and blocks to the free pools.
    /// The block list and block contents stay in place for undelete.
    #[instrument(skip(self))]
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let (slot, inode_index) = self.resolve(name)?;
        let inode = self.inodes.get_mut(inode_index)?;
        if inode.readonly {
            return Err(MfsError::ReadOnlyViolation {
                name: name.to_string(),
            });
        }
        inode.in_use = false;
        let blocks = inode.blocks.clone();

        for addr in blocks {
            self.alloc.free_block(addr)?;
        }
        self.alloc.free_inode(inode_index)?;

        let epoch = self.alloc.epoch();
        if let Some(entry) = self.directory.get_mut(slot) {
            entry.in_use = false;
            entry.deleted_epoch = epoch;
        }
        info!(name, inode = inode_index, epoch, "Deleted file");
        Ok(())
    }

    /// Bring back a deleted file, re-claiming the same inode and blocks.
    ///
    /// Refused with [`MfsError::BlocksReclaimed`] when any of them has been
    /// allocated since the delete, since its content can no longer be trusted.
    #[instrument(skip(self))]
    pub fn undelete(&mut self, name: &str) -> Result<Undelete> {
        if self.directory.find_active(name).is_some() {
            return Ok(Undelete::AlreadyPresent);
        }
        let slot = self
            .directory
            .find_deleted(name)
            .ok_or_else(|| MfsError::not_found(name))?;
        let (inode_index, deleted_epoch) = match self.directory.get(slot) {
            Some(DirEntry {
                inode: Some(inode),
                deleted_epoch,
                ..
            }) => (*inode, *deleted_epoch),
            _ => return Err(MfsError::not_found(name)),
        };

        let reclaimed = || MfsError::BlocksReclaimed {
            name: name.to_string(),
        };
        if !self.alloc.is_inode_free(inode_index)
            || self.alloc.inode_reused_since(inode_index, deleted_epoch)
        {
            return Err(reclaimed());
        }
        let inode = self.inodes.get(inode_index)?;
        let stale = inode.blocks.iter().any(|&addr| {
            !self.alloc.is_block_free(addr) || self.alloc.block_reused_since(addr, deleted_epoch)
        });
        if stale {
            return Err(reclaimed());
        }

        let blocks = inode.blocks.clone();
        for addr in blocks {
            self.alloc.claim_block(addr)?;
        }
        self.alloc.claim_inode(inode_index)?;
        self.inodes.get_mut(inode_index)?.in_use = true;
        if let Some(entry) = self.directory.get_mut(slot) {
            entry.in_use = true;
            entry.deleted_epoch = 0;
        }
        info!(name, inode = inode_index, "Recovered file");
        Ok(Undelete::Recovered)
    }

    /// Metadata of the first active file named `name`.
    pub fn stat(&self, name: &str) -> Result<FileStat> {
        let (slot, inode_index) = self.resolve(name)?;
        Ok(FileStat {
            name: name.to_string(),
            slot,
            inode_index,
            inode: self.inodes.get(inode_index)?.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Geometry;
    use tempfile::TempDir;

    fn small() -> Geometry {
        Geometry {
            num_blocks: 512,
            max_files: 8,
        }
    }

    fn source(temp: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = temp.path().join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_insert_lays_out_blocks_first_fit() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        let base = image.layout().first_data_block();

        let inserted = image
            .insert(&source(&temp, "a.bin", &[7u8; 2500]))
            .unwrap();
        assert_eq!(inserted.name, "a.bin");
        assert_eq!(inserted.slot, 0);
        assert_eq!(inserted.inode, 0);
        assert_eq!(inserted.blocks, vec![base, base + 1, base + 2]);

        let stat = image.stat("a.bin").unwrap();
        assert_eq!(stat.inode.file_size, 2500);
        assert_eq!(stat.inode.block_length(), 3);
    }

    #[test]
    fn test_partial_tail_is_zero_filled() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        let inserted = image.insert(&source(&temp, "t", &[0xFFu8; 10])).unwrap();

        let block = image.block(inserted.blocks[0]).unwrap();
        assert!(block[..10].iter().all(|&b| b == 0xFF));
        assert!(block[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_file_takes_no_blocks() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        let before = image.available();
        let inserted = image.insert(&source(&temp, "empty", b"")).unwrap();
        assert!(inserted.blocks.is_empty());
        assert_eq!(image.available(), before);
        assert_eq!(image.read_file("empty").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        let err = image.insert(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, MfsError::Io(_)));
    }

    #[test]
    fn test_name_too_long() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        let name = "x".repeat(MAX_NAME_LEN + 1);
        let err = image.insert(&source(&temp, &name, b"data")).unwrap_err();
        assert!(matches!(err, MfsError::NameTooLong { .. }));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        let path = source(&temp, "dup", b"one");
        image.insert(&path).unwrap();
        let err = image.insert(&path).unwrap_err();
        assert!(matches!(err, MfsError::AlreadyExists { .. }));
    }

    #[test]
    fn test_directory_full() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(Geometry {
            num_blocks: 512,
            max_files: 2,
        })
        .unwrap();
        image.insert(&source(&temp, "a", b"a")).unwrap();
        image.insert(&source(&temp, "b", b"b")).unwrap();
        let err = image.insert(&source(&temp, "c", b"c")).unwrap_err();
        assert!(matches!(err, MfsError::DirectoryFull));
    }

    #[test]
    fn test_insufficient_space() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        let too_big = image.available() as usize + 1;
        let err = image
            .insert(&source(&temp, "big", &vec![1u8; too_big]))
            .unwrap_err();
        assert!(matches!(err, MfsError::InsufficientSpace { .. }));
    }

    #[test]
    fn test_failed_copy_releases_taken_blocks() {
        let mut image = Image::new(small()).unwrap();
        let free_blocks = image.allocator().free_blocks();

        // Leave exactly two blocks free, then ask for three.
        let taken: Vec<u32> = (0..free_blocks)
            .map(|_| image.alloc.allocate_block().unwrap())
            .collect();
        for &addr in &taken[..2] {
            image.alloc.free_block(addr).unwrap();
        }

        let err = image.copy_in(&[5u8; 3 * BLOCK_SIZE]).unwrap_err();
        assert!(matches!(err, MfsError::NoFreeBlock));
        assert_eq!(image.allocator().free_blocks(), 2);
        assert!(image.allocator().is_block_free(taken[0]));
        assert!(image.allocator().is_block_free(taken[1]));
    }

    #[test]
    fn test_retrieve_to_destination() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        let data: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        image.insert(&source(&temp, "r.bin", &data)).unwrap();

        let dest = temp.path().join("out.bin");
        let (written, bytes) = image.retrieve("r.bin", Some(&dest)).unwrap();
        assert_eq!(written, dest);
        assert_eq!(bytes, 1500);
        assert_eq!(fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn test_retrieve_unknown_file() {
        let image = Image::new(small()).unwrap();
        assert!(matches!(
            image.retrieve("ghost", None),
            Err(MfsError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_keeps_block_list() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        let inserted = image.insert(&source(&temp, "d", &[1u8; 2048])).unwrap();

        image.delete("d").unwrap();
        assert!(matches!(image.stat("d"), Err(MfsError::FileNotFound { .. })));
        assert_eq!(image.inodes().get(inserted.inode).unwrap().blocks, inserted.blocks);
        assert!(inserted
            .blocks
            .iter()
            .all(|&addr| image.allocator().is_block_free(addr)));
        assert!(image.allocator().is_inode_free(inserted.inode));
    }

    #[test]
    fn test_undelete_active_file_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        image.insert(&source(&temp, "u", b"live")).unwrap();
        let free = image.available();
        assert_eq!(image.undelete("u").unwrap(), Undelete::AlreadyPresent);
        assert_eq!(image.available(), free);
    }

    #[test]
    fn test_undelete_unknown_name() {
        let mut image = Image::new(small()).unwrap();
        assert!(matches!(
            image.undelete("never"),
            Err(MfsError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_undelete_after_slot_reuse_is_not_found() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        image.insert(&source(&temp, "keep", b"k")).unwrap();
        image.insert(&source(&temp, "old", &[2u8; 1024])).unwrap();
        image.delete("old").unwrap();

        // Slot 1 is the lowest free slot, so "other" overwrites "old"'s entry.
        image.insert(&source(&temp, "other", &[3u8; 1024])).unwrap();
        assert!(matches!(
            image.undelete("old"),
            Err(MfsError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_undelete_detects_block_reclaimed_by_other_slot() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        image.insert(&source(&temp, "first", &[1u8; 1024])).unwrap();
        image.insert(&source(&temp, "second", &[2u8; 1024])).unwrap();

        // Deleting "second" then "first" leaves slot 0 as the lowest free
        // slot, so the next insert overwrites "first"'s entry and reuses the
        // lowest block, which belonged to "first"; "second" keeps its entry.
        image.delete("second").unwrap();
        image.delete("first").unwrap();
        image.insert(&source(&temp, "third", &[3u8; 2048])).unwrap();

        let err = image.undelete("second").unwrap_err();
        assert!(matches!(err, MfsError::BlocksReclaimed { .. }));
        assert!(matches!(image.stat("second"), Err(MfsError::FileNotFound { .. })));
    }

    #[test]
    fn test_readonly_blocks_delete() {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(small()).unwrap();
        let inserted = image.insert(&source(&temp, "ro", b"locked")).unwrap();
        image.inodes.get_mut(inserted.inode).unwrap().readonly = true;

        let err = image.delete("ro").unwrap_err();
        assert!(matches!(err, MfsError::ReadOnlyViolation { .. }));
        assert_eq!(image.read_file("ro").unwrap(), b"locked");
        assert!(!image.allocator().is_block_free(inserted.blocks[0]));
    }
}
