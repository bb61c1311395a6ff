//! File operations over an open image.
//!
//! A `Volume` decodes the allocation table and root directory once when it
//! is opened. `save` and `delete` mutate those in-memory tables and then
//! rewrite both regions in full; cluster payloads go straight to the image.
//!
//! Only one `Volume` may have an image open at a time. Nothing guards against
//! two processes editing the same file.

use std::io::{self, Read, Seek, SeekFrom, Write};

use log::{debug, info, warn};

use crate::error::{Exhaustion, Fat12Error, Fat12Result};
use crate::fs::{
    ClusterStore, DirectoryEntry, DirectoryTable, FatTable, Link, END_OF_CHAIN, FORMATTED_HEADER,
};
use crate::layout::ImageLayout;
use crate::name::ShortName;
use crate::timestamp::FatTimestamp;

/// An open FAT12 image.
pub struct Volume<S> {
    storage: S,
    layout: ImageLayout,
    fat: FatTable,
    dir: DirectoryTable,
}

impl<S: Read + Seek> Volume<S> {
    /// Open a standard 1.44MB floppy image.
    pub fn open(storage: S) -> Fat12Result<Self> {
        Self::open_with_layout(storage, ImageLayout::floppy_1440())
    }

    /// Open an image with an explicit geometry.
    pub fn open_with_layout(mut storage: S, layout: ImageLayout) -> Fat12Result<Self> {
        layout.validate()?;
        let actual = storage.seek(SeekFrom::End(0))?;
        if actual < layout.total_size {
            return Err(Fat12Error::ImageTooSmall {
                expected: layout.total_size,
                actual,
            });
        }

        let fat = FatTable::read_from(&mut storage, &layout)?;
        let dir = DirectoryTable::read_from(&mut storage, &layout)?;
        debug!(
            "opened image: {} of {} clusters free, {} entries",
            fat.free_count(),
            fat.usable(),
            dir.entries().count()
        );

        Ok(Self {
            storage,
            layout,
            fat,
            dir,
        })
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    pub fn fat(&self) -> &FatTable {
        &self.fat
    }

    pub fn directory(&self) -> &DirectoryTable {
        &self.dir
    }

    /// Give back the underlying storage.
    pub fn into_inner(self) -> S {
        self.storage
    }

    /// Active directory entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.dir.entries().map(|(_, entry)| entry)
    }

    /// Look up an active entry.
    pub fn entry(&self, name: &ShortName) -> Option<&DirectoryEntry> {
        self.dir.find_active(name).and_then(|i| self.dir.get(i))
    }

    /// Free space in bytes.
    pub fn free_bytes(&self) -> u64 {
        self.fat.free_count() as u64 * self.layout.cluster_size as u64
    }

    /// Read a file's contents, exactly `size` bytes.
    pub fn load(&mut self, name: &ShortName) -> Fat12Result<Vec<u8>> {
        let index = self
            .dir
            .find_active(name)
            .ok_or_else(|| Fat12Error::NotFound(name.to_string()))?;
        let (start, size) = match self.dir.get(index) {
            Some(entry) => (entry.start_cluster, entry.size as usize),
            None => return Err(Fat12Error::NotFound(name.to_string())),
        };

        let expected = self.layout.clusters_for(size as u64);
        let corrupt = |cluster| Fat12Error::CorruptChain {
            name: name.to_string(),
            cluster,
        };

        let mut store = ClusterStore::new(&mut self.storage, &self.layout);
        let cluster_size = store.cluster_size();
        // The size field is untrusted until the chain is walked.
        let mut out = Vec::with_capacity(size.min(self.fat.usable() * cluster_size));
        let mut cluster = start;
        for _ in 0..expected {
            if !self.fat.is_data_cluster(cluster) {
                return Err(corrupt(cluster));
            }
            let buf = store.read_cluster(cluster)?;
            let take = (size - out.len()).min(cluster_size);
            out.extend_from_slice(&buf[..take]);

            let link = Link::from_raw(self.fat.link(cluster));
            if out.len() == size {
                if link != Link::EndOfChain {
                    warn!("{}: chain continues past its size at cluster {}", name, cluster);
                }
                break;
            }
            match link {
                Link::Next(next) => cluster = next,
                _ => return Err(corrupt(cluster)),
            }
        }

        debug!("loaded {} ({} bytes)", name, out.len());
        Ok(out)
    }
}

impl<S: Read + Write + Seek> Volume<S> {
    /// Store `data` as a new file stamped with the current time.
    pub fn save(&mut self, name: &ShortName, data: &[u8]) -> Fat12Result<()> {
        self.save_stamped(name, data, FatTimestamp::now())
    }

    /// Store `data` as a new file.
    ///
    /// The whole chain is chosen before anything is written. If there is not
    /// enough room, or no free directory slot, the image is left untouched.
    pub fn save_stamped(
        &mut self,
        name: &ShortName,
        data: &[u8],
        timestamp: FatTimestamp,
    ) -> Fat12Result<()> {
        if self.dir.find_active(name).is_some() {
            return Err(Fat12Error::AlreadyExists(name.to_string()));
        }

        let count = self.layout.clusters_for(data.len() as u64);
        let exhausted = |fat: &FatTable| {
            Fat12Error::Exhausted(Exhaustion::Clusters {
                needed: count,
                free: fat.free_count(),
            })
        };
        let size = u32::try_from(data.len()).map_err(|_| exhausted(&self.fat))?;
        let hint = self
            .fat
            .has_capacity(count)
            .ok_or_else(|| exhausted(&self.fat))?;
        let slot = self
            .dir
            .find_reusable_slot(0)
            .ok_or(Fat12Error::Exhausted(Exhaustion::DirectorySlots))?;

        let mut chain = Vec::with_capacity(count);
        let mut from = hint;
        for _ in 0..count {
            let cluster = self
                .fat
                .find_free_from(from)
                .ok_or_else(|| exhausted(&self.fat))?;
            chain.push(cluster);
            from = cluster + 1;
        }
        debug!("{}: {} bytes -> clusters {:?}, slot {}", name, size, chain, slot);

        let mut store = ClusterStore::new(&mut self.storage, &self.layout);
        let cluster_size = store.cluster_size();
        let mut padded = vec![0u8; cluster_size];
        for (&cluster, chunk) in chain.iter().zip(data.chunks(cluster_size)) {
            if chunk.len() == cluster_size {
                store.write_cluster(cluster, chunk)?;
            } else {
                padded.fill(0);
                padded[..chunk.len()].copy_from_slice(chunk);
                store.write_cluster(cluster, &padded)?;
            }
        }

        for pair in chain.windows(2) {
            self.fat.set_link(pair[0], pair[1]);
        }
        if let Some(&last) = chain.last() {
            self.fat.set_link(last, END_OF_CHAIN);
        }
        let start = chain.first().copied().unwrap_or(0);
        self.dir.insert_stamped(slot, *name, size, start, timestamp);

        self.flush()?;
        info!("saved {} ({} bytes, {} clusters)", name, size, count);
        Ok(())
    }

    /// Remove a file and free its clusters.
    pub fn delete(&mut self, name: &ShortName) -> Fat12Result<()> {
        let (start, size) = self
            .dir
            .remove(name)
            .ok_or_else(|| Fat12Error::NotFound(name.to_string()))?;
        self.fat.deallocate_chain(start, size);
        self.flush()?;
        info!("deleted {}", name);
        Ok(())
    }

    /// Rewrite every FAT copy and the whole directory region.
    pub fn flush(&mut self) -> Fat12Result<()> {
        self.fat.write_to(&mut self.storage, &self.layout)?;
        self.dir.write_to(&mut self.storage, &self.layout)?;
        self.storage.flush()?;
        Ok(())
    }
}

/// Zero-fill a whole volume and write the formatted header to each FAT copy.
pub fn format_image<S: Write + Seek>(storage: &mut S, layout: &ImageLayout) -> Fat12Result<()> {
    layout.validate()?;
    storage.seek(SeekFrom::Start(0))?;
    io::copy(&mut io::repeat(0).take(layout.total_size), storage)?;
    for copy in 0..layout.fat_copies {
        storage.seek(SeekFrom::Start(layout.fat_copy_offset(copy)))?;
        storage.write_all(&FORMATTED_HEADER)?;
    }
    storage.flush()?;
    info!("formatted {} byte volume", layout.total_size);
    Ok(())
}

/// Copy raw bytes into the image starting at `start_sector`, bypassing the
/// filesystem. Used for boot sectors and loaders. Returns the number of
/// sectors touched; the last one may be partially written.
pub fn write_sectors<S: Write + Seek>(
    storage: &mut S,
    layout: &ImageLayout,
    start_sector: u64,
    data: &[u8],
) -> Fat12Result<u64> {
    let sector_size = layout.sector_size as u64;
    let len = data.len() as u64;
    let offset = start_sector
        .checked_mul(sector_size)
        .filter(|&o| o.checked_add(len).is_some_and(|end| end <= layout.total_size))
        .ok_or(Fat12Error::OutsideImage {
            offset: start_sector.saturating_mul(sector_size),
            len,
        })?;

    let mut sectors = 0;
    for (i, chunk) in data.chunks(layout.sector_size).enumerate() {
        storage.seek(SeekFrom::Start(offset + i as u64 * sector_size))?;
        storage.write_all(chunk)?;
        sectors += 1;
    }
    storage.flush()?;
    debug!("wrote {} sectors at sector {}", sectors, start_sector);
    Ok(sectors)
}
