//! Root directory region.
//!
//! Layout of one 32-byte slot:
//! - Bytes 0-10: Name (8 + 3, space-padded)
//! - Byte 11: Attributes
//! - Bytes 12-21: Reserved
//! - Bytes 22-23: Time (packed)
//! - Bytes 24-25: Date (packed)
//! - Bytes 26-27: Start cluster
//! - Bytes 28-31: Size in bytes
//!
//! The first byte also classifies the slot: `0x00` has never been used (and
//! neither has any slot after it), `0xE5` is a deleted entry that may be
//! reused.

use std::io::{Read, Seek, SeekFrom, Write};

use log::debug;

use crate::error::Fat12Result;
use crate::layout::{ImageLayout, SLOT_SIZE};
use crate::name::ShortName;
use crate::timestamp::FatTimestamp;

/// First byte of a slot that has never held an entry.
pub const NEVER_USED_MARKER: u8 = 0x00;
/// First byte of a deleted entry.
pub const TOMBSTONE_MARKER: u8 = 0xE5;
/// Attribute written for regular files.
pub const ATTR_ARCHIVE: u8 = 0x20;

/// One file record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: ShortName,
    pub attributes: u8,
    pub reserved: [u8; 10],
    pub timestamp: FatTimestamp,
    pub start_cluster: u16,
    pub size: u32,
}

impl DirectoryEntry {
    /// New regular-file entry.
    pub fn new(name: ShortName, size: u32, start_cluster: u16, timestamp: FatTimestamp) -> Self {
        Self {
            name,
            attributes: ATTR_ARCHIVE,
            reserved: [0; 10],
            timestamp,
            start_cluster,
            size,
        }
    }

    fn parse(raw: &[u8; SLOT_SIZE]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[0..11]);
        let mut reserved = [0u8; 10];
        reserved.copy_from_slice(&raw[12..22]);
        Self {
            name: ShortName::from_raw(name),
            attributes: raw[11],
            reserved,
            timestamp: FatTimestamp {
                time: u16::from_le_bytes([raw[22], raw[23]]),
                date: u16::from_le_bytes([raw[24], raw[25]]),
            },
            start_cluster: u16::from_le_bytes([raw[26], raw[27]]),
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    fn to_bytes(&self) -> [u8; SLOT_SIZE] {
        let mut raw = [0u8; SLOT_SIZE];
        raw[0..11].copy_from_slice(self.name.as_bytes());
        raw[11] = self.attributes;
        raw[12..22].copy_from_slice(&self.reserved);
        raw[22..24].copy_from_slice(&self.timestamp.time.to_le_bytes());
        raw[24..26].copy_from_slice(&self.timestamp.date.to_le_bytes());
        raw[26..28].copy_from_slice(&self.start_cluster.to_le_bytes());
        raw[28..32].copy_from_slice(&self.size.to_le_bytes());
        raw
    }
}

/// State of one directory slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectorySlot {
    Active(DirectoryEntry),
    Tombstone,
    NeverUsed,
}

impl DirectorySlot {
    /// Whether a new entry may be stored here.
    pub fn is_reusable(&self) -> bool {
        !matches!(self, DirectorySlot::Active(_))
    }

    fn to_bytes(&self) -> [u8; SLOT_SIZE] {
        match self {
            DirectorySlot::Active(entry) => entry.to_bytes(),
            DirectorySlot::Tombstone => {
                let mut raw = [0u8; SLOT_SIZE];
                raw[0] = TOMBSTONE_MARKER;
                raw
            }
            DirectorySlot::NeverUsed => [0u8; SLOT_SIZE],
        }
    }
}

/// Decoded root directory: a fixed number of slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTable {
    slots: Vec<DirectorySlot>,
}

impl DirectoryTable {
    /// Classify `slot_count` slots of raw directory bytes.
    ///
    /// Everything after the first never-used slot is treated as never used,
    /// whatever its bytes hold.
    pub fn decode(raw: &[u8], slot_count: usize) -> Self {
        let mut slots = Vec::with_capacity(slot_count);
        let mut terminated = false;

        for chunk in raw.chunks_exact(SLOT_SIZE).take(slot_count) {
            if terminated {
                slots.push(DirectorySlot::NeverUsed);
                continue;
            }
            let slot = match chunk[0] {
                NEVER_USED_MARKER => {
                    terminated = true;
                    DirectorySlot::NeverUsed
                }
                TOMBSTONE_MARKER => DirectorySlot::Tombstone,
                _ => {
                    let mut bytes = [0u8; SLOT_SIZE];
                    bytes.copy_from_slice(chunk);
                    DirectorySlot::Active(DirectoryEntry::parse(&bytes))
                }
            };
            slots.push(slot);
        }
        slots.resize(slot_count, DirectorySlot::NeverUsed);

        Self { slots }
    }

    /// Serialize every slot, in order.
    pub fn encode(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.slots.len() * SLOT_SIZE);
        for slot in &self.slots {
            raw.extend_from_slice(&slot.to_bytes());
        }
        raw
    }

    pub fn read_from<S: Read + Seek>(storage: &mut S, layout: &ImageLayout) -> Fat12Result<Self> {
        let mut raw = vec![0u8; layout.dir_bytes()];
        storage.seek(SeekFrom::Start(layout.dir_offset))?;
        storage.read_exact(&mut raw)?;
        Ok(Self::decode(&raw, layout.dir_slots))
    }

    /// Rewrite the whole region. Never stops at a terminal slot.
    pub fn write_to<S: Write + Seek>(&self, storage: &mut S, layout: &ImageLayout) -> Fat12Result<()> {
        storage.seek(SeekFrom::Start(layout.dir_offset))?;
        storage.write_all(&self.encode())?;
        Ok(())
    }

    pub fn slots(&self) -> &[DirectorySlot] {
        &self.slots
    }

    /// Active entries with their slot index, in slot order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &DirectoryEntry)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            DirectorySlot::Active(entry) => Some((i, entry)),
            _ => None,
        })
    }

    /// Entry in slot `index`, if it is active.
    pub fn get(&self, index: usize) -> Option<&DirectoryEntry> {
        match self.slots.get(index)? {
            DirectorySlot::Active(entry) => Some(entry),
            _ => None,
        }
    }

    /// First tombstoned or never-used slot at or after `start_at`.
    pub fn find_reusable_slot(&self, start_at: usize) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .skip(start_at)
            .find(|(_, slot)| slot.is_reusable())
            .map(|(i, _)| i)
    }

    /// Slot index of the active entry named exactly `name`.
    pub fn find_active(&self, name: &ShortName) -> Option<usize> {
        self.entries()
            .find(|(_, entry)| entry.name == *name)
            .map(|(i, _)| i)
    }

    /// Store a regular-file entry stamped with the current time.
    pub fn insert(&mut self, index: usize, name: ShortName, size: u32, start_cluster: u16) {
        self.insert_stamped(index, name, size, start_cluster, FatTimestamp::now());
    }

    /// Store a regular-file entry with an explicit timestamp.
    ///
    /// Panics if `index` is outside the table.
    pub fn insert_stamped(
        &mut self,
        index: usize,
        name: ShortName,
        size: u32,
        start_cluster: u16,
        timestamp: FatTimestamp,
    ) {
        debug!("directory slot {} <- {} ({} bytes, cluster {})", index, name, size, start_cluster);
        self.slots[index] =
            DirectorySlot::Active(DirectoryEntry::new(name, size, start_cluster, timestamp));
    }

    /// Tombstone the entry named `name`, returning its `(start_cluster, size)`.
    pub fn remove(&mut self, name: &ShortName) -> Option<(u16, u32)> {
        let index = self.find_active(name)?;
        let old = std::mem::replace(&mut self.slots[index], DirectorySlot::Tombstone);
        match old {
            DirectorySlot::Active(entry) => {
                debug!("directory slot {} tombstoned ({})", index, entry.name);
                Some((entry.start_cluster, entry.size))
            }
            _ => None,
        }
    }
}
