//! On-disk structures of a FAT12 volume.
//!
//! - `FatTable`: decoded 12-bit allocation table
//! - `DirectoryTable`: fixed-slot root directory
//! - `ClusterStore`: raw cluster payload I/O

mod cluster_store;
mod directory;
mod fat_table;

pub use cluster_store::ClusterStore;
pub use directory::{
    DirectoryEntry, DirectorySlot, DirectoryTable, ATTR_ARCHIVE, NEVER_USED_MARKER,
    TOMBSTONE_MARKER,
};
pub use fat_table::{
    FatTable, Link, BAD_CLUSTER, END_OF_CHAIN, FIRST_DATA_CLUSTER, FORMATTED_HEADER, FREE,
};
