//! Whole-cluster reads and writes against the data region.

use std::io::{Read, Seek, SeekFrom, Write};

use log::trace;

use crate::error::Fat12Result;
use crate::layout::ImageLayout;

/// Uncached cluster access over a borrowed image.
pub struct ClusterStore<'a, S> {
    storage: &'a mut S,
    layout: &'a ImageLayout,
}

impl<'a, S> ClusterStore<'a, S> {
    pub fn new(storage: &'a mut S, layout: &'a ImageLayout) -> Self {
        Self { storage, layout }
    }

    pub fn cluster_size(&self) -> usize {
        self.layout.cluster_size
    }
}

impl<S: Read + Seek> ClusterStore<'_, S> {
    /// Read one full cluster.
    pub fn read_cluster(&mut self, index: u16) -> Fat12Result<Vec<u8>> {
        let mut buf = vec![0u8; self.layout.cluster_size];
        self.storage.seek(SeekFrom::Start(self.layout.cluster_offset(index)))?;
        self.storage.read_exact(&mut buf)?;
        trace!("read cluster {}", index);
        Ok(buf)
    }
}

impl<S: Write + Seek> ClusterStore<'_, S> {
    /// Write one full cluster.
    ///
    /// `data` must be exactly one cluster long; callers pad the final chunk.
    pub fn write_cluster(&mut self, index: u16, data: &[u8]) -> Fat12Result<()> {
        debug_assert_eq!(
            data.len(),
            self.layout.cluster_size,
            "cluster writes must cover a whole cluster"
        );
        self.storage.seek(SeekFrom::Start(self.layout.cluster_offset(index)))?;
        self.storage.write_all(data)?;
        trace!("wrote cluster {}", index);
        Ok(())
    }
}
