//! Interval index loading and point queries.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::coding::{read_uvarint_at, read_svarint_at};
use crate::common::INTERVAL_INDEX_FORMAT_VERSION;
use crate::errors::{GazetteerError, Result};

/// A loaded disk-resident interval index.
pub struct IntervalIndex {
    data: Vec<u8>,
    leaf_bytes: u32,
    bits_per_level: u32,
    levels: u32,
    offsets: Vec<u64>,
}

impl IntervalIndex {
    /// Loads an index file. A format version mismatch is fatal.
    pub fn open(path: &Path) -> Result<Self> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    /// Parses an in-memory index image.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(GazetteerError::invalid_input(
                "interval_index",
                "file shorter than the header",
            ));
        }
        let version = data[0];
        if version != INTERVAL_INDEX_FORMAT_VERSION {
            return Err(GazetteerError::invalid_input(
                "interval_index",
                format!(
                    "format version mismatch: found {version}, expected {INTERVAL_INDEX_FORMAT_VERSION}"
                ),
            ));
        }
        let leaf_bytes = u32::from(data[1]);
        let bits_per_level = u32::from(data[2]);
        let levels = u32::from(data[3]);
        if levels == 0 {
            return Ok(Self {
                data,
                leaf_bytes,
                bits_per_level,
                levels,
                offsets: vec![],
            });
        }
        let offsets_len = (levels as usize + 2) * 8;
        let Some(offset_bytes) = data.get(4..4 + offsets_len) else {
            return Err(GazetteerError::invalid_input(
                "interval_index",
                "file shorter than the level offset table",
            ));
        };
        let offsets: Vec<u64> = offset_bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().expect("chunk size")))
            .collect();
        if offsets.last().copied() != Some(data.len() as u64) {
            return Err(GazetteerError::invalid_input(
                "interval_index",
                "level offset table does not match the file size",
            ));
        }
        Ok(Self {
            data,
            leaf_bytes,
            bits_per_level,
            levels,
            offsets,
        })
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.levels == 0
    }

    /// Calls `f` with every value stored under exactly `key`.
    pub fn for_each_at_key<F: FnMut(u64)>(&self, key: u64, f: &mut F) {
        if self.is_empty() {
            return;
        }
        let mut start = self.offsets[self.levels as usize] as usize;
        let mut end = self.offsets[self.levels as usize + 1] as usize;
        for level in (1..=self.levels).rev() {
            let shift = 8 * self.leaf_bytes + (level - 1) * self.bits_per_level;
            let wanted = (key >> shift) & ((1 << self.bits_per_level) - 1);
            match self.find_child(start, end, wanted) {
                Some((child_offset, child_size)) => {
                    let level_start = self.offsets[level as usize - 1];
                    start = (level_start + child_offset) as usize;
                    end = start + child_size as usize;
                }
                None => return,
            }
        }
        self.scan_leaf(start, end, key, f);
    }

    /// Decodes the node in `data[start..end]` and locates child `wanted`,
    /// returning its offset within the lower level and its size.
    fn find_child(&self, start: usize, end: usize, wanted: u64) -> Option<(u64, u64)> {
        let node = self.data.get(start..end)?;
        let mut pos = 0usize;
        let offset_and_flag = read_uvarint_at(node, &mut pos).ok()?;
        let base_offset = offset_and_flag >> 1;
        if offset_and_flag & 1 == 1 {
            // Bitmap node.
            let mask_len = (1usize << self.bits_per_level) / 8;
            let mask = node.get(pos..pos + mask_len)?;
            pos += mask_len;
            let wanted = wanted as usize;
            if mask[wanted / 8] & (1 << (wanted % 8)) == 0 {
                return None;
            }
            let mut child_offset = base_offset;
            for i in 0..1usize << self.bits_per_level {
                if mask[i / 8] & (1 << (i % 8)) == 0 {
                    continue;
                }
                let size = read_uvarint_at(node, &mut pos).ok()?;
                if i == wanted {
                    return Some((child_offset, size));
                }
                child_offset += size;
            }
            None
        } else {
            // List node.
            let mut child_offset = base_offset;
            while pos < node.len() {
                let index = u64::from(*node.get(pos)?);
                pos += 1;
                let size = read_uvarint_at(node, &mut pos).ok()?;
                if index == wanted {
                    return Some((child_offset, size));
                }
                child_offset += size;
            }
            None
        }
    }

    fn scan_leaf<F: FnMut(u64)>(&self, start: usize, end: usize, key: u64, f: &mut F) {
        let Some(leaf) = self.data.get(start..end) else {
            return;
        };
        let low_mask = (1u64 << (8 * self.leaf_bytes)) - 1;
        let wanted_low = key & low_mask;
        let mut pos = 0usize;
        let mut value = 0i64;
        while pos + self.leaf_bytes as usize <= leaf.len() {
            let mut low = 0u64;
            for i in 0..self.leaf_bytes as usize {
                low |= u64::from(leaf[pos + i]) << (8 * i);
            }
            pos += self.leaf_bytes as usize;
            let Ok(delta) = read_svarint_at(leaf, &mut pos) else {
                return;
            };
            value = value.wrapping_add(delta);
            if low == wanted_low {
                f(value as u64);
            }
        }
    }
}
