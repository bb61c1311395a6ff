//! Volume geometry.
//!
//! Every component takes an `ImageLayout` instead of reading global
//! constants, so alternate geometries can be described in a JSON file and
//! passed in at runtime. `ImageLayout::floppy_1440()` is the standard
//! 3.5" high-density floppy.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Fat12Error, Fat12Result};
use crate::fs::FIRST_DATA_CLUSTER;

/// Size of one directory slot in bytes.
pub const SLOT_SIZE: usize = 32;

/// Byte offsets and sizes of every region of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLayout {
    /// Whole volume size in bytes.
    pub total_size: u64,
    /// Offset of the first FAT copy.
    pub fat_offset: u64,
    /// Length of one FAT copy in bytes.
    pub fat_bytes: usize,
    /// Number of mirrored FAT copies, stored back to back.
    pub fat_copies: u8,
    /// Offset of the root directory region.
    pub dir_offset: u64,
    /// Number of 32-byte directory slots.
    pub dir_slots: usize,
    /// Offset that cluster index 0 would map to. Clusters 0 and 1 are
    /// reserved, so payload starts at cluster 2.
    pub data_offset: u64,
    /// Bytes per cluster.
    pub cluster_size: usize,
    /// Bytes per sector, used by raw sector writes.
    #[serde(default = "default_sector_size")]
    pub sector_size: usize,
}

fn default_sector_size() -> usize {
    512
}

impl Default for ImageLayout {
    fn default() -> Self {
        Self::floppy_1440()
    }
}

impl ImageLayout {
    /// 1.44MB floppy: two 0x1200-byte FATs, 224 root slots, 512-byte clusters.
    pub const fn floppy_1440() -> Self {
        Self {
            total_size: 1_474_560,
            fat_offset: 0x0200,
            fat_bytes: 0x1200,
            fat_copies: 2,
            dir_offset: 0x2600,
            dir_slots: 224,
            data_offset: 0x3E00,
            cluster_size: 512,
            sector_size: 512,
        }
    }

    /// Load a layout from a JSON file and validate it.
    pub fn from_json_file(path: &Path) -> Fat12Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let layout: ImageLayout = serde_json::from_str(&text)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Offset of FAT copy `copy` (0-based).
    pub fn fat_copy_offset(&self, copy: u8) -> u64 {
        self.fat_offset + copy as u64 * self.fat_bytes as u64
    }

    /// Length of the directory region in bytes.
    pub fn dir_bytes(&self) -> usize {
        self.dir_slots * SLOT_SIZE
    }

    /// Number of 12-bit entries the FAT region decodes to.
    pub fn fat_entries(&self) -> usize {
        self.fat_bytes / 3 * 2
    }

    /// Number of cluster indices whose payload lies entirely inside the volume.
    ///
    /// This is smaller than `fat_entries()` on a real floppy; entries past it
    /// are never handed out.
    pub fn usable_clusters(&self) -> usize {
        let data_bytes = self.total_size.saturating_sub(self.data_offset);
        let physical = data_bytes.checked_div(self.cluster_size as u64).unwrap_or(0) as usize;
        physical.min(self.fat_entries())
    }

    /// Byte offset of a cluster's payload.
    pub fn cluster_offset(&self, cluster: u16) -> u64 {
        self.data_offset + cluster as u64 * self.cluster_size as u64
    }

    /// Number of clusters needed to hold `size` bytes.
    pub fn clusters_for(&self, size: u64) -> usize {
        size.div_ceil(self.cluster_size as u64) as usize
    }

    /// Check that regions are well-formed and do not overlap.
    pub fn validate(&self) -> Fat12Result<()> {
        let invalid = |msg: String| Err(Fat12Error::InvalidLayout(msg));

        if self.cluster_size == 0 {
            return invalid("cluster size must be non-zero".to_string());
        }
        if self.sector_size == 0 {
            return invalid("sector size must be non-zero".to_string());
        }
        if self.fat_copies == 0 {
            return invalid("at least one FAT copy is required".to_string());
        }
        if self.fat_bytes == 0 || self.fat_bytes % 3 != 0 {
            return invalid(format!(
                "FAT length {:#x} is not a non-zero multiple of 3",
                self.fat_bytes
            ));
        }
        if self.dir_slots == 0 {
            return invalid("directory needs at least one slot".to_string());
        }

        // Offsets may come from a user JSON file; reject ends past u64.
        let region_end = |start: u64, count: u64, unit: u64| {
            count
                .checked_mul(unit)
                .and_then(|bytes| bytes.checked_add(start))
                .ok_or_else(|| {
                    Fat12Error::InvalidLayout(format!(
                        "region at {:#x} with {} x {} bytes overflows",
                        start, count, unit
                    ))
                })
        };
        let fat_end = region_end(self.fat_offset, self.fat_copies as u64, self.fat_bytes as u64)?;
        let dir_end = region_end(self.dir_offset, self.dir_slots as u64, SLOT_SIZE as u64)?;
        let first_data = region_end(
            self.data_offset,
            FIRST_DATA_CLUSTER as u64,
            self.cluster_size as u64,
        )?;
        if self.dir_offset < fat_end {
            return invalid(format!(
                "directory at {:#x} overlaps FAT ending at {:#x}",
                self.dir_offset, fat_end
            ));
        }
        if first_data < dir_end {
            return invalid(format!(
                "first data cluster at {:#x} overlaps directory ending at {:#x}",
                first_data, dir_end
            ));
        }
        if first_data >= self.total_size {
            return invalid(format!(
                "data region at {:#x} lies outside a {} byte volume",
                first_data, self.total_size
            ));
        }
        if self.usable_clusters() > 0x0FF0 {
            return invalid(format!(
                "{} clusters exceed the FAT12 address range",
                self.usable_clusters()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floppy_offsets() {
        let layout = ImageLayout::floppy_1440();
        assert_eq!(layout.fat_copy_offset(0), 0x0200);
        assert_eq!(layout.fat_copy_offset(1), 0x1400);
        assert_eq!(layout.fat_copy_offset(2), layout.dir_offset);
        assert_eq!(layout.dir_offset + layout.dir_bytes() as u64, 0x4200);
        assert_eq!(layout.cluster_offset(2), 0x4200);
        assert_eq!(layout.fat_entries(), 3072);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_usable_clusters_bounded_by_volume() {
        let layout = ImageLayout::floppy_1440();
        // (1474560 - 0x3E00) / 512
        assert_eq!(layout.usable_clusters(), 2849);
        let last = layout.usable_clusters() as u16 - 1;
        assert_eq!(layout.cluster_offset(last) + 512, layout.total_size);
    }

    #[test]
    fn test_clusters_for() {
        let layout = ImageLayout::floppy_1440();
        assert_eq!(layout.clusters_for(0), 0);
        assert_eq!(layout.clusters_for(1), 1);
        assert_eq!(layout.clusters_for(512), 1);
        assert_eq!(layout.clusters_for(513), 2);
        assert_eq!(layout.clusters_for(1024), 2);
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let layout = ImageLayout {
            dir_offset: 0x1000,
            ..ImageLayout::floppy_1440()
        };
        assert!(matches!(
            layout.validate(),
            Err(Fat12Error::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_validate_rejects_fat_length() {
        let layout = ImageLayout {
            fat_bytes: 0x1201,
            ..ImageLayout::floppy_1440()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_offsets() {
        let huge_dir = ImageLayout {
            dir_slots: usize::MAX / 16,
            ..ImageLayout::floppy_1440()
        };
        assert!(matches!(
            huge_dir.validate(),
            Err(Fat12Error::InvalidLayout(_))
        ));

        let huge_data = ImageLayout {
            data_offset: u64::MAX - 100,
            ..ImageLayout::floppy_1440()
        };
        assert!(matches!(
            huge_data.validate(),
            Err(Fat12Error::InvalidLayout(_))
        ));

        let huge_fat = ImageLayout {
            fat_offset: u64::MAX - 0x1000,
            ..ImageLayout::floppy_1440()
        };
        assert!(huge_fat.validate().is_err());
    }

    #[test]
    fn test_layout_json() {
        let json = r#"{
            "totalSize": 1474560,
            "fatOffset": 512,
            "fatBytes": 4608,
            "fatCopies": 2,
            "dirOffset": 9728,
            "dirSlots": 224,
            "dataOffset": 15872,
            "clusterSize": 512
        }"#;
        let layout: ImageLayout = serde_json::from_str(json).unwrap();
        assert_eq!(layout, ImageLayout::floppy_1440());
    }
}
