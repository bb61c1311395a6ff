//! 12-bit file allocation table.
//!
//! The on-disk table packs two 12-bit entries into three bytes:
//!
//! ```text
//! b0 = low[7:0]
//! b1 = high[3:0] << 4 | low[11:8]
//! b2 = high[11:4]
//! ```
//!
//! The whole table is decoded into memory when an image is opened and
//! written back to every mirrored copy on flush.

use std::io::{Read, Seek, SeekFrom, Write};

use log::{debug, warn};

use crate::error::Fat12Result;
use crate::layout::ImageLayout;

/// Entry value of an unallocated cluster.
pub const FREE: u16 = 0x000;
/// Value written to the last cluster of a chain.
pub const END_OF_CHAIN: u16 = 0xFFF;
/// Value marking an unusable cluster.
pub const BAD_CLUSTER: u16 = 0xFF7;
/// First cluster index that can hold file data; 0 and 1 are reserved.
pub const FIRST_DATA_CLUSTER: u16 = 2;
/// First three bytes of a freshly formatted table: media descriptor 0xF0
/// and two reserved end-of-chain entries.
pub const FORMATTED_HEADER: [u8; 3] = [0xF0, 0xFF, 0xFF];

/// Meaning of a raw 12-bit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Free,
    /// `0x001` and `0xFF0..=0xFF6`.
    Reserved,
    Bad,
    /// `0xFF8..=0xFFF`.
    EndOfChain,
    /// Index of the following cluster.
    Next(u16),
}

impl Link {
    pub fn from_raw(value: u16) -> Self {
        match value & 0x0FFF {
            0x000 => Link::Free,
            0x001 | 0xFF0..=0xFF6 => Link::Reserved,
            0xFF7 => Link::Bad,
            0xFF8..=0xFFF => Link::EndOfChain,
            next => Link::Next(next),
        }
    }
}

/// Decoded allocation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatTable {
    entries: Vec<u16>,
    /// Entries at or past this index have no backing cluster in the volume.
    usable: usize,
    cluster_size: usize,
}

impl FatTable {
    /// Unpack a raw FAT region. `raw.len()` must be a multiple of 3; a
    /// trailing partial group is ignored.
    pub fn decode(raw: &[u8], layout: &ImageLayout) -> Self {
        let mut entries = Vec::with_capacity(raw.len() / 3 * 2);
        for group in raw.chunks_exact(3) {
            let (b0, b1, b2) = (group[0] as u16, group[1] as u16, group[2] as u16);
            entries.push(b0 | ((b1 & 0x0F) << 8));
            entries.push((b1 >> 4) | (b2 << 4));
        }
        let usable = layout.usable_clusters().min(entries.len());
        Self {
            entries,
            usable,
            cluster_size: layout.cluster_size,
        }
    }

    /// Pack entries back into raw bytes, the exact inverse of `decode`.
    pub fn encode(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.entries.len() / 2 * 3);
        for pair in self.entries.chunks_exact(2) {
            let (low, high) = (pair[0], pair[1]);
            raw.push((low & 0xFF) as u8);
            raw.push((((high & 0x0F) << 4) | ((low >> 8) & 0x0F)) as u8);
            raw.push((high >> 4) as u8);
        }
        raw
    }

    /// Read and decode the first FAT copy.
    pub fn read_from<S: Read + Seek>(storage: &mut S, layout: &ImageLayout) -> Fat12Result<Self> {
        let mut raw = vec![0u8; layout.fat_bytes];
        storage.seek(SeekFrom::Start(layout.fat_offset))?;
        storage.read_exact(&mut raw)?;
        Ok(Self::decode(&raw, layout))
    }

    /// Encode and write every mirrored copy.
    pub fn write_to<S: Write + Seek>(&self, storage: &mut S, layout: &ImageLayout) -> Fat12Result<()> {
        let raw = self.encode();
        for copy in 0..layout.fat_copies {
            storage.seek(SeekFrom::Start(layout.fat_copy_offset(copy)))?;
            storage.write_all(&raw)?;
        }
        Ok(())
    }

    /// Total decoded entries, including those past the end of the volume.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that map to real clusters.
    pub fn usable(&self) -> usize {
        self.usable
    }

    /// Raw value of a cluster's entry.
    ///
    /// Panics if `cluster` is outside the table.
    pub fn link(&self, cluster: u16) -> u16 {
        self.entries[cluster as usize]
    }

    /// Overwrite a cluster's entry. Only the low 12 bits of `value` are kept.
    ///
    /// Panics if `cluster` is outside the table.
    pub fn set_link(&mut self, cluster: u16, value: u16) {
        debug_assert!(value <= 0x0FFF, "FAT12 entry {:#x} does not fit 12 bits", value);
        self.entries[cluster as usize] = value & 0x0FFF;
    }

    /// Whether `cluster` is a data cluster this table may hand out or follow.
    pub fn is_data_cluster(&self, cluster: u16) -> bool {
        cluster >= FIRST_DATA_CLUSTER && (cluster as usize) < self.usable
    }

    /// Number of free data clusters.
    pub fn free_count(&self) -> usize {
        self.data_entries().filter(|&(_, v)| v == FREE).count()
    }

    // Entries 2..usable paired with their cluster index.
    fn data_entries(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        let first = (FIRST_DATA_CLUSTER as usize).min(self.usable);
        self.entries[first..self.usable]
            .iter()
            .enumerate()
            .map(move |(offset, &v)| ((first + offset) as u16, v))
    }

    /// Check that at least `n` clusters are free, anywhere in the table.
    ///
    /// Returns the first free cluster as the allocation start hint. For
    /// `n == 0` this always succeeds; the hint is then the first free
    /// cluster, or 0 when the table is full.
    pub fn has_capacity(&self, n: usize) -> Option<u16> {
        let mut first = None;
        let mut seen = 0;
        for (cluster, value) in self.data_entries() {
            if value != FREE {
                continue;
            }
            first.get_or_insert(cluster);
            seen += 1;
            if seen >= n {
                return first;
            }
        }
        if n == 0 {
            return Some(first.unwrap_or(0));
        }
        None
    }

    /// First free data cluster at or after `start`. Never returns the
    /// reserved indices 0 and 1.
    pub fn find_free_from(&self, start: u16) -> Option<u16> {
        let start = start.max(FIRST_DATA_CLUSTER) as usize;
        if start >= self.usable {
            return None;
        }
        self.entries[start..self.usable]
            .iter()
            .position(|&v| v == FREE)
            .map(|offset| (start + offset) as u16)
    }

    /// Free the chain starting at `head` that holds `byte_size` bytes.
    ///
    /// Visits at most `ceil(byte_size / cluster_size)` entries, zeroing each.
    /// Stops after an end-of-chain entry, or early when the next link does
    /// not point at a data cluster. Returns the number of entries zeroed.
    pub fn deallocate_chain(&mut self, head: u16, byte_size: u32) -> usize {
        let max_hops = (byte_size as u64).div_ceil(self.cluster_size as u64) as usize;
        let mut cluster = head;
        let mut freed = 0;

        for _ in 0..max_hops {
            if !self.is_data_cluster(cluster) {
                warn!("chain from {} points outside data region at {}", head, cluster);
                break;
            }
            let next = self.entries[cluster as usize];
            self.entries[cluster as usize] = FREE;
            freed += 1;
            match Link::from_raw(next) {
                Link::Next(n) => cluster = n,
                Link::EndOfChain => break,
                other => {
                    warn!("chain from {} ends in {:?} at {}", head, other, cluster);
                    break;
                }
            }
        }

        debug!("freed {} clusters starting at {}", freed, head);
        freed
    }

    /// Clusters of the chain starting at `head`, following at most
    /// `max_len` entries.
    pub fn chain(&self, head: u16, max_len: usize) -> Vec<u16> {
        let mut out = Vec::new();
        let mut cluster = head;
        while out.len() < max_len && self.is_data_cluster(cluster) {
            out.push(cluster);
            match Link::from_raw(self.entries[cluster as usize]) {
                Link::Next(n) => cluster = n,
                _ => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatted() -> FatTable {
        let layout = ImageLayout::floppy_1440();
        let mut raw = vec![0u8; layout.fat_bytes];
        raw[..3].copy_from_slice(&FORMATTED_HEADER);
        FatTable::decode(&raw, &layout)
    }

    #[test]
    fn test_decode_packing() {
        let layout = ImageLayout::floppy_1440();
        let raw = [0x03, 0x40, 0x00, 0xFF, 0x6F, 0xAB];
        let fat = FatTable::decode(&raw, &layout);
        assert_eq!(fat.link(0), 0x003);
        assert_eq!(fat.link(1), 0x004);
        assert_eq!(fat.link(2), 0xFFF);
        assert_eq!(fat.link(3), 0xAB6);
    }

    #[test]
    fn test_encode_roundtrip_preserves_bytes() {
        let layout = ImageLayout::floppy_1440();
        let raw: Vec<u8> = (0..layout.fat_bytes).map(|i| (i * 7 + i / 3) as u8).collect();
        let fat = FatTable::decode(&raw, &layout);
        assert_eq!(fat.encode(), raw);
    }

    #[test]
    fn test_formatted_header() {
        let fat = formatted();
        assert_eq!(fat.link(0), 0xFF0);
        assert_eq!(fat.link(1), 0xFFF);
        assert_eq!(fat.find_free_from(0), Some(2));
        assert_eq!(fat.free_count(), 2849 - 2);
    }

    #[test]
    fn test_set_link_odd_and_even() {
        let mut fat = formatted();
        fat.set_link(2, 3);
        fat.set_link(3, END_OF_CHAIN);
        let raw = fat.encode();
        // entries 2 and 3 live in bytes 3..6
        assert_eq!(&raw[3..6], &[0x03, 0xF0, 0xFF]);
        assert_eq!(&raw[..3], &FORMATTED_HEADER);
    }

    #[test]
    fn test_link_classification() {
        assert_eq!(Link::from_raw(0), Link::Free);
        assert_eq!(Link::from_raw(1), Link::Reserved);
        assert_eq!(Link::from_raw(0xFF3), Link::Reserved);
        assert_eq!(Link::from_raw(0xFF7), Link::Bad);
        assert_eq!(Link::from_raw(0xFF8), Link::EndOfChain);
        assert_eq!(Link::from_raw(0xFFF), Link::EndOfChain);
        assert_eq!(Link::from_raw(0x123), Link::Next(0x123));
    }

    #[test]
    fn test_has_capacity_counts_scattered_clusters() {
        let mut fat = formatted();
        let usable = fat.usable() as u16;
        // Fill everything except clusters 10, 500 and the last one.
        for c in FIRST_DATA_CLUSTER..usable {
            if c != 10 && c != 500 && c != usable - 1 {
                fat.set_link(c, END_OF_CHAIN);
            }
        }
        assert_eq!(fat.free_count(), 3);
        assert_eq!(fat.has_capacity(1), Some(10));
        assert_eq!(fat.has_capacity(3), Some(10));
        assert_eq!(fat.has_capacity(4), None);
        assert_eq!(fat.has_capacity(0), Some(10));
    }

    #[test]
    fn test_has_capacity_full_table() {
        let mut fat = formatted();
        for c in FIRST_DATA_CLUSTER..fat.usable() as u16 {
            fat.set_link(c, BAD_CLUSTER);
        }
        assert_eq!(fat.has_capacity(1), None);
        assert_eq!(fat.has_capacity(0), Some(0));
    }

    #[test]
    fn test_capacity_ignores_entries_past_volume_end() {
        let fat = formatted();
        assert!(fat.usable() < fat.len());
        assert_eq!(fat.has_capacity(fat.usable() - 2), Some(2));
        assert_eq!(fat.has_capacity(fat.usable() - 1), None);
        assert_eq!(fat.find_free_from(fat.usable() as u16), None);
    }

    #[test]
    fn test_zeroed_header_entries_never_allocated() {
        let layout = ImageLayout::floppy_1440();
        let fat = FatTable::decode(&vec![0u8; layout.fat_bytes], &layout);
        assert_eq!(fat.link(0), FREE);
        assert_eq!(fat.link(1), FREE);
        assert_eq!(fat.find_free_from(0), Some(2));
        assert_eq!(fat.has_capacity(1), Some(2));
        assert_eq!(fat.has_capacity(0), Some(2));
        assert_eq!(fat.free_count(), 2849 - 2);
        assert_eq!(fat.has_capacity(2849 - 1), None);
    }

    #[test]
    fn test_find_free_from() {
        let mut fat = formatted();
        fat.set_link(2, END_OF_CHAIN);
        fat.set_link(4, END_OF_CHAIN);
        assert_eq!(fat.find_free_from(2), Some(3));
        assert_eq!(fat.find_free_from(4), Some(5));
    }

    #[test]
    fn test_deallocate_chain() {
        let mut fat = formatted();
        fat.set_link(2, 5);
        fat.set_link(5, 3);
        fat.set_link(3, END_OF_CHAIN);
        fat.set_link(4, END_OF_CHAIN); // unrelated file

        assert_eq!(fat.deallocate_chain(2, 1500), 3);
        assert_eq!(fat.link(2), FREE);
        assert_eq!(fat.link(3), FREE);
        assert_eq!(fat.link(5), FREE);
        assert_eq!(fat.link(4), END_OF_CHAIN);
    }

    #[test]
    fn test_deallocate_stops_at_terminal_before_count() {
        let mut fat = formatted();
        fat.set_link(2, 3);
        fat.set_link(3, END_OF_CHAIN);
        fat.set_link(4, END_OF_CHAIN);
        // Size claims 3 clusters but the chain has 2.
        assert_eq!(fat.deallocate_chain(2, 1536), 2);
        assert_eq!(fat.link(4), END_OF_CHAIN);
    }

    #[test]
    fn test_deallocate_bounded_on_cycle() {
        let mut fat = formatted();
        fat.set_link(2, 3);
        fat.set_link(3, 4);
        fat.set_link(4, 2);
        fat.set_link(6, END_OF_CHAIN);
        assert_eq!(fat.deallocate_chain(2, 1024), 2);
        assert_eq!(fat.link(2), FREE);
        assert_eq!(fat.link(3), FREE);
        assert_eq!(fat.link(4), 2);
        assert_eq!(fat.link(6), END_OF_CHAIN);
    }

    #[test]
    fn test_deallocate_never_touches_reserved_entries() {
        let mut fat = formatted();
        fat.set_link(2, 0);
        assert_eq!(fat.deallocate_chain(2, 2048), 1);
        assert_eq!(fat.link(0), 0xFF0);
        assert_eq!(fat.deallocate_chain(0, 512), 0);
        assert_eq!(fat.link(0), 0xFF0);
    }

    #[test]
    fn test_chain() {
        let mut fat = formatted();
        fat.set_link(7, 9);
        fat.set_link(9, 8);
        fat.set_link(8, END_OF_CHAIN);
        assert_eq!(fat.chain(7, 10), vec![7, 9, 8]);
        assert_eq!(fat.chain(7, 2), vec![7, 9]);
    }
}
