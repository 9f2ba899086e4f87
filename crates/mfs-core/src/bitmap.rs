//! Free-slot bit vectors for inode slots and data blocks.
//!
//! In memory one bit per slot (set = available); on the image one byte per
//! slot, `1` = available.

use crate::error::{MfsError, Result};

const WORD_BITS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeMap {
    words: Vec<u64>,
    len: usize,
}

impl FreeMap {
    /// A map of `len` slots, all available.
    pub fn all_free(len: usize) -> Self {
        let mut words = vec![u64::MAX; len.div_ceil(WORD_BITS)];
        let tail = len % WORD_BITS;
        if tail != 0 {
            if let Some(last) = words.last_mut() {
                *last = (1u64 << tail) - 1;
            }
        }
        Self { words, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_free(&self, slot: usize) -> bool {
        slot < self.len && self.words[slot / WORD_BITS] & (1 << (slot % WORD_BITS)) != 0
    }

    /// Take the lowest-indexed available slot.
    pub fn take_first(&mut self) -> Option<usize> {
        for (word_idx, word) in self.words.iter_mut().enumerate() {
            if *word != 0 {
                let bit = word.trailing_zeros() as usize;
                *word &= !(1u64 << bit);
                return Some(word_idx * WORD_BITS + bit);
            }
        }
        None
    }

    /// Mark `slot` available. Returns whether it was in use before.
    pub fn release(&mut self, slot: usize) -> Result<bool> {
        self.check(slot)?;
        let was_used = !self.is_free(slot);
        self.words[slot / WORD_BITS] |= 1 << (slot % WORD_BITS);
        Ok(was_used)
    }

    /// Mark `slot` in use. Returns whether it was available before.
    pub fn claim(&mut self, slot: usize) -> Result<bool> {
        self.check(slot)?;
        let was_free = self.is_free(slot);
        self.words[slot / WORD_BITS] &= !(1 << (slot % WORD_BITS));
        Ok(was_free)
    }

    pub fn free_count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn check(&self, slot: usize) -> Result<()> {
        if slot >= self.len {
            return Err(MfsError::InvalidArgument(format!(
                "slot {} outside of bitmap ({} slots)",
                slot, self.len
            )));
        }
        Ok(())
    }

    /// Write one byte per slot into `out`.
    pub fn encode(&self, out: &mut [u8]) {
        for (slot, byte) in out.iter_mut().take(self.len).enumerate() {
            *byte = self.is_free(slot) as u8;
        }
    }

    /// Read `len` one-byte flags from `bytes`.
    pub fn decode(bytes: &[u8], len: usize) -> Result<Self> {
        if bytes.len() < len {
            return Err(MfsError::InvalidImage(format!(
                "bitmap needs {} bytes, region has {}",
                len,
                bytes.len()
            )));
        }
        let mut map = Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        };
        for (slot, &flag) in bytes[..len].iter().enumerate() {
            match flag {
                0 => {}
                1 => map.words[slot / WORD_BITS] |= 1 << (slot % WORD_BITS),
                other => {
                    return Err(MfsError::InvalidImage(format!(
                        "bitmap slot {} holds {:#04x}",
                        slot, other
                    )))
                }
            }
        }
        Ok(map)
    }
}
