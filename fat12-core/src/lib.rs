//! FAT12 Floppy Image Core
//!
//! This crate edits raw FAT12 floppy images in place:
//! - Formatting a blank volume
//! - Listing the root directory
//! - Saving, loading and deleting files
//!
//! # Architecture
//!
//! Every command follows the same shape:
//! - `Volume::open` decodes the `FatTable` and `DirectoryTable` into memory
//! - One operation mutates them and streams payload through `ClusterStore`
//! - `Volume::flush` rewrites both tables as whole regions
//!
//! Region offsets come from an `ImageLayout`, so geometries other than the
//! 1.44MB floppy can be described without code changes.

pub mod error;
pub mod fs;
pub mod layout;
pub mod name;
pub mod timestamp;
pub mod volume;

pub use error::{Exhaustion, Fat12Error, Fat12Result};
pub use fs::{ClusterStore, DirectoryEntry, DirectorySlot, DirectoryTable, FatTable, Link};
pub use layout::ImageLayout;
pub use name::ShortName;
pub use timestamp::FatTimestamp;
pub use volume::{format_image, write_sectors, Volume};
