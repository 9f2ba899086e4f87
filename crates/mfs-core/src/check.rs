//! Consistency check over the image tables (`fsck`).

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::image::Image;
use crate::layout::BLOCK_SIZE;

impl Image {
    /// Walk the directory, inode table and free maps and describe every
    /// inconsistency found. An empty result means the image is consistent.
    pub fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut names = HashSet::new();
        let mut referenced_inodes = HashSet::new();

        for (slot, entry) in self.directory.active() {
            if !names.insert(entry.name.as_str()) {
                problems.push(format!("slot {}: duplicate active name {}", slot, entry.name));
            }
            let Some(idx) = entry.inode else {
                problems.push(format!("slot {}: {} has no inode", slot, entry.name));
                continue;
            };
            referenced_inodes.insert(idx);
            match self.inodes.get(idx) {
                Ok(inode) if !inode.in_use => {
                    problems.push(format!("slot {}: inode {} is not in use", slot, idx))
                }
                Ok(_) => {}
                Err(_) => problems.push(format!("slot {}: inode {} out of range", slot, idx)),
            }
            if self.alloc.is_inode_free(idx) {
                problems.push(format!("slot {}: inode {} is marked free", slot, idx));
            }
        }

        let mut owners: HashMap<u32, u32> = HashMap::new();
        for (idx, inode) in self.inodes.iter().filter(|(_, i)| i.in_use) {
            if !referenced_inodes.contains(&idx) {
                problems.push(format!("inode {}: in use but no directory entry", idx));
            }
            let expected = (inode.file_size as usize).div_ceil(BLOCK_SIZE);
            if inode.block_length() != expected {
                problems.push(format!(
                    "inode {}: {} blocks for {} bytes, expected {}",
                    idx,
                    inode.block_length(),
                    inode.file_size,
                    expected
                ));
            }
            for &addr in &inode.blocks {
                if !self.layout.data.contains(addr) {
                    problems.push(format!("inode {}: block {} outside data region", idx, addr));
                    continue;
                }
                if self.alloc.is_block_free(addr) {
                    problems.push(format!("inode {}: block {} is marked free", idx, addr));
                }
                if let Some(other) = owners.insert(addr, idx) {
                    problems.push(format!(
                        "inode {}: block {} also used by inode {}",
                        idx, addr, other
                    ));
                }
            }
        }

        let used = self.layout.data_blocks() as usize - self.alloc.free_blocks();
        if used != owners.len() {
            problems.push(format!(
                "{} blocks allocated but {} referenced by files",
                used,
                owners.len()
            ));
        }

        if problems.is_empty() {
            info!(files = names.len(), blocks = owners.len(), "Image is consistent");
        } else {
            warn!(count = problems.len(), "Image has inconsistencies");
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use crate::image::Image;
    use crate::layout::Geometry;
    use tempfile::TempDir;

    fn populated() -> (TempDir, Image) {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(Geometry {
            num_blocks: 512,
            max_files: 8,
        })
        .unwrap();
        for (name, len) in [("a", 1500usize), ("b", 1024), ("c", 3)] {
            let path = temp.path().join(name);
            std::fs::write(&path, vec![9u8; len]).unwrap();
            image.insert(&path).unwrap();
        }
        (temp, image)
    }

    #[test]
    fn test_clean_image_has_no_problems() {
        let (_temp, mut image) = populated();
        assert!(image.check().is_empty());
        image.delete("b").unwrap();
        assert!(image.check().is_empty());
        image.undelete("b").unwrap();
        assert!(image.check().is_empty());
    }

    #[test]
    fn test_detects_block_marked_free() {
        let (_temp, mut image) = populated();
        let addr = image.stat("a").unwrap().inode.blocks[0];
        image.alloc.free_block(addr).unwrap();

        let problems = image.check();
        assert!(problems.iter().any(|p| p.contains("is marked free")));
        assert!(problems.iter().any(|p| p.contains("referenced by files")));
    }

    #[test]
    fn test_detects_shared_block() {
        let (_temp, mut image) = populated();
        let shared = image.stat("a").unwrap().inode.blocks[0];
        let idx = image.stat("c").unwrap().inode_index;
        image.inodes.get_mut(idx).unwrap().blocks[0] = shared;

        let problems = image.check();
        assert!(problems.iter().any(|p| p.contains("also used by")));
    }

    #[test]
    fn test_detects_size_mismatch() {
        let (_temp, mut image) = populated();
        let idx = image.stat("b").unwrap().inode_index;
        image.inodes.get_mut(idx).unwrap().file_size = 4000;

        let problems = image.check();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("expected 4"));
    }
}
