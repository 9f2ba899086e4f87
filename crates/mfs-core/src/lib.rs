//! # mfs-core
//!
//! Storage engine for mfs, a flat, single-file, inode-based mock file system.
//!
//! An image is a fixed array of 1024-byte blocks. Metadata and file data
//! share that address space:
//!
//! ```text
//! block 0              superblock (magic, geometry, epoch, BLAKE3 checksum)
//! directory            name -> inode entries, 80 bytes each
//! inodes               block list, size, flags, creation time
//! inode map / epochs   free flags and last-allocation stamps per inode
//! block map / epochs   free flags and last-allocation stamps per data block
//! data                 file content, from the first data block to the end
//! ```
//!
//! Allocation is first-fit over the free maps. Deleting a file releases its
//! inode and blocks but leaves the block list and content in place, so
//! undelete can re-claim the same addresses as long as none of them were
//! handed out again in between.
//!
//! [`MockFs`] owns the single open [`Image`]; the file operations live on
//! [`Image`] itself.

mod alloc;
mod attrib;
mod bitmap;
mod block;
mod check;
mod directory;
mod error;
mod image;
mod inode;
mod layout;
mod lifecycle;
mod ops;
mod superblock;
mod transform;

pub use alloc::Allocator;
pub use attrib::{
    format_time, Attribute, AttributeChange, Flags, ListOptions, ListRow, TIME_FORMAT,
};
pub use bitmap::FreeMap;
pub use directory::{DirEntry, Directory};
pub use error::{MfsError, Result};
pub use image::Image;
pub use inode::{Inode, InodeTable};
pub use layout::{
    Geometry, Layout, Region, BLOCKS_PER_FILE, BLOCK_SIZE, DIR_ENTRY_SIZE, INODE_SIZE,
    MAX_FILE_SIZE, MAX_NAME_LEN, MAX_NUM_FILES, NUM_BLOCKS,
};
pub use lifecycle::{ImageState, MockFs};
pub use ops::{FileStat, Inserted, Undelete};
pub use superblock::{Checksum, Superblock};
pub use transform::{parse_key, XorDirection};
