//! Mounted FAT volume: geometry, chain I/O and the directory index

use crate::device::BlockDevice;
use crate::error::{FatError, Result};
use crate::fat::boot_sector::{BOOTSTRAP_SECTOR_SIZE, BiosParameterBlock};
use crate::fat::chain::Chain;
use crate::fat::dir_entry::{
    ATTR_ARCHIVE, ATTR_DIRECTORY, ATTR_READ_ONLY, DELETED_ENTRY, END_OF_DIRECTORY, ShortEntry,
    encode_long_name,
};
use crate::fat::directory::{DirItem, parse_directory_entries};
use crate::fat::fat_table::{ClusterChain, ClusterValue, FatTable};
use crate::fat::geometry::{FatType, VolumeGeometry};
use crate::fat::layout::short_entry;
use crate::fat::names::{fits_short_name, long_name, short_name};
use crate::fat::path::absolute_steps;
use crate::fat::time::FatDateTime;
use crate::fat::{DIR_ENTRY_SIZE, LFN_ATTRIBUTE};

/// Highest numeric tail tried when making a short name unique
const MAX_NUMERIC_TAIL: u32 = 999_999;

/// Location of a short directory record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef {
    /// Directory holding the record
    pub directory: Chain,
    /// Byte position of the record inside that directory
    pub offset: u64,
}

/// Metadata of a file or directory, as read from its directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub short_name: String,
    pub attributes: u8,
    pub first_cluster: u32,
    pub size: u32,
    pub created: Option<FatDateTime>,
    pub modified: Option<FatDateTime>,
    pub accessed: Option<FatDateTime>,
    /// `None` for the root directory, which has no entry
    pub entry: Option<EntryRef>,
}

impl FileStat {
    fn from_item(item: &DirItem, directory: Chain) -> Self {
        Self {
            name: item.name(),
            short_name: item.entry.display_name(),
            attributes: item.entry.attributes,
            first_cluster: item.entry.first_cluster,
            size: item.entry.size,
            created: item.entry.created,
            modified: item.entry.modified,
            accessed: item.entry.accessed,
            entry: Some(EntryRef {
                directory,
                offset: item.offset,
            }),
        }
    }

    fn root(root_cluster: u32) -> Self {
        Self {
            name: "/".to_string(),
            short_name: String::new(),
            attributes: ATTR_DIRECTORY,
            first_cluster: root_cluster,
            size: 0,
            created: None,
            modified: None,
            accessed: None,
            entry: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes & ATTR_READ_ONLY != 0
    }

    pub fn is_archive(&self) -> bool {
        self.attributes & ATTR_ARCHIVE != 0
    }

    /// Mirror an entry update into this cached copy
    pub fn apply(&mut self, update: &EntryUpdate) {
        if let Some(size) = update.size {
            self.size = size;
        }
        match update.archive {
            Some(true) => self.attributes |= ATTR_ARCHIVE,
            Some(false) => self.attributes &= !ATTR_ARCHIVE,
            None => {}
        }
        if let Some(t) = update.modified {
            self.modified = Some(t);
        }
        if let Some(t) = update.accessed {
            // Only the date of the access stamp is stored on disk
            self.accessed = FatDateTime::decode_date(t.encode_date());
        }
        if let Some(cluster) = update.first_cluster {
            self.first_cluster = cluster;
        }
    }
}

/// Partial update of a short directory entry; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryUpdate {
    pub size: Option<u32>,
    pub archive: Option<bool>,
    pub modified: Option<FatDateTime>,
    pub accessed: Option<FatDateTime>,
    pub first_cluster: Option<u32>,
}

/// Result of resolving a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found { stat: FileStat, chain: Chain },
    /// Everything but the last step exists; enough to create it
    Missing {
        parent: Chain,
        parent_stat: FileStat,
        name: String,
    },
}

/// A mounted volume. Geometry is fixed at mount time.
pub struct Volume<D: BlockDevice> {
    device: D,
    bpb: BiosParameterBlock,
    geometry: VolumeGeometry,
    writable: bool,
    sync_on_write: bool,
}

impl<D: BlockDevice> Volume<D> {
    /// Read and validate the boot sector, then derive the geometry.
    ///
    /// The boot sector is first read as 512 bytes; if it declares a larger
    /// sector size it is read again at that size.
    pub fn mount(mut device: D) -> Result<Self> {
        let mut sector = vec![0u8; BOOTSTRAP_SECTOR_SIZE];
        device.read_exact_at(&mut sector, 0)?;
        let mut bpb = BiosParameterBlock::decode(&sector)?;

        if bpb.bytes_per_sector as usize != BOOTSTRAP_SECTOR_SIZE {
            log::debug!(
                "Re-reading boot sector with {}-byte sectors",
                bpb.bytes_per_sector
            );
            sector = vec![0u8; bpb.bytes_per_sector as usize];
            device.read_exact_at(&mut sector, 0)?;
            bpb = BiosParameterBlock::decode(&sector)?;
        }

        let geometry = VolumeGeometry::from_bpb(&bpb)?;
        log::info!(
            "Mounted {} volume: {} bytes/sector, {} sectors/cluster, {} clusters, data at sector {}",
            geometry.fat_type,
            geometry.bytes_per_sector,
            geometry.sectors_per_cluster,
            geometry.count_of_clusters,
            geometry.first_data_sector
        );

        Ok(Self {
            writable: device.is_writable(),
            device,
            bpb,
            geometry,
            sync_on_write: false,
        })
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn boot_record(&self) -> &BiosParameterBlock {
        &self.bpb
    }

    pub fn fat_type(&self) -> FatType {
        self.geometry.fat_type
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Refuse all writes, even if the device accepts them
    pub fn set_read_only(&mut self) {
        self.writable = false;
    }

    pub fn set_sync_on_write(&mut self, sync: bool) {
        self.sync_on_write = sync;
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn root_chain(&self) -> Chain {
        match self.geometry.fat_type {
            FatType::Fat32 => Chain::Clusters(self.geometry.root_cluster),
            FatType::Fat12 | FatType::Fat16 => Chain::Root {
                first_sector: self.geometry.root_dir_sector(),
                sectors: self.geometry.root_dir_sectors,
            },
        }
    }

    pub fn root_stat(&self) -> FileStat {
        FileStat::root(self.geometry.root_cluster)
    }

    fn chain_for_entry(&self, entry: &ShortEntry) -> Chain {
        if entry.is_directory() && entry.first_cluster == 0 {
            // ".." of a first-level directory stores 0 for the root
            self.root_chain()
        } else {
            Chain::from_cluster(entry.first_cluster)
        }
    }

    /// Lazily walk the FAT chain starting at `first`
    pub fn clusters(&mut self, first: u32) -> ClusterChain<'_, D> {
        FatTable::new(&mut self.device, &self.geometry).chain(first)
    }

    pub fn next_cluster(&mut self, cluster: u32) -> Result<ClusterValue> {
        FatTable::new(&mut self.device, &self.geometry).next_cluster(cluster)
    }

    pub fn read_from_position(&mut self, chain: &Chain, position: u64, buf: &mut [u8]) -> Result<usize> {
        chain.read_from_position(&mut self.device, &self.geometry, position, buf)
    }

    pub fn write_to_position(&mut self, chain: &Chain, position: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(FatError::ReadOnlyFilesystem);
        }
        chain.write_to_position(&mut self.device, &self.geometry, position, buf)?;
        self.sync()
    }

    fn sync(&mut self) -> Result<()> {
        if self.sync_on_write {
            self.device.flush()?;
        }
        Ok(())
    }

    /// Raw bytes of a directory up to and including the cluster holding
    /// its end-of-directory marker
    fn read_directory_bytes(&mut self, dir: &Chain) -> Result<Vec<u8>> {
        let blocks: Vec<(u64, usize)> = match *dir {
            Chain::Empty => Vec::new(),
            Chain::Root {
                first_sector,
                sectors,
            } => vec![(
                self.geometry.sector_offset(first_sector as u64),
                (sectors * self.geometry.bytes_per_sector) as usize,
            )],
            Chain::Clusters(first) => {
                let cluster_size = self.geometry.cluster_size() as usize;
                let clusters = self.clusters(first).collect::<Result<Vec<u32>>>()?;
                let mut blocks = Vec::with_capacity(clusters.len());
                for cluster in clusters {
                    let sector = self
                        .geometry
                        .sector_for_cluster(cluster)
                        .ok_or(FatError::CorruptChain {
                            cluster,
                            value: cluster,
                        })?;
                    blocks.push((self.geometry.sector_offset(sector), cluster_size));
                }
                blocks
            }
        };

        let mut data = Vec::new();
        for (position, len) in blocks {
            let start = data.len();
            data.resize(start + len, 0);
            self.device.read_exact_at(&mut data[start..], position)?;
            let reached_end = data[start..]
                .chunks_exact(DIR_ENTRY_SIZE)
                .any(|record| record[0] == END_OF_DIRECTORY);
            if reached_end {
                break;
            }
        }
        Ok(data)
    }

    /// Decode every item of a directory
    pub fn read_dir(&mut self, dir: &Chain) -> Result<Vec<DirItem>> {
        let data = self.read_directory_bytes(dir)?;
        Ok(parse_directory_entries(&data))
    }

    /// List a directory by path, skipping "." / ".." and volume labels
    pub fn list_directory(&mut self, path: &str) -> Result<Vec<FileStat>> {
        let (stat, chain) = match self.entry_for_path(path)? {
            Lookup::Found { stat, chain } => (stat, chain),
            Lookup::Missing { .. } => return Err(FatError::not_found(path)),
        };
        if !stat.is_directory() {
            return Err(FatError::not_a_directory(path));
        }
        let items = self.read_dir(&chain)?;
        Ok(items
            .iter()
            .filter(|item| !item.is_dot_entry() && !item.entry.is_volume_label())
            .map(|item| FileStat::from_item(item, chain))
            .collect())
    }

    pub fn list_root(&mut self) -> Result<Vec<FileStat>> {
        self.list_directory("/")
    }

    /// Resolve a path to its entry and chain
    pub fn entry_for_path(&mut self, path: &str) -> Result<Lookup> {
        let steps = absolute_steps(path)?;
        let mut chain = self.root_chain();
        let mut stat = self.root_stat();

        for (index, step) in steps.iter().enumerate() {
            if !stat.is_directory() {
                return Err(FatError::not_a_directory(format!(
                    "/{}",
                    steps[..index].join("/")
                )));
            }
            let items = self.read_dir(&chain)?;
            let found = items.iter().find(|item| {
                !item.entry.is_volume_label() && !item.is_dot_entry() && item.matches(step)
            });
            match found {
                Some(item) => {
                    log::debug!("Step {:?} matched entry {:?}", step, item.name());
                    stat = FileStat::from_item(item, chain);
                    chain = self.chain_for_entry(&item.entry);
                }
                None if index + 1 == steps.len() => {
                    log::debug!("Final step {:?} of {:?} not found", step, path);
                    return Ok(Lookup::Missing {
                        parent: chain,
                        parent_stat: stat,
                        name: step.clone(),
                    });
                }
                None => return Err(FatError::not_found(path)),
            }
        }

        Ok(Lookup::Found { stat, chain })
    }

    /// Rewrite selected fields of a short entry in place
    pub fn update_entry(&mut self, entry: &EntryRef, update: &EntryUpdate) -> Result<()> {
        if !self.writable {
            return Err(FatError::ReadOnlyFilesystem);
        }
        let mut record = [0u8; DIR_ENTRY_SIZE];
        let n = self.read_from_position(&entry.directory, entry.offset, &mut record)?;
        let first = record[0];
        if n < DIR_ENTRY_SIZE
            || first == END_OF_DIRECTORY
            || first == DELETED_ENTRY
            || record[11] & 0x3F == LFN_ATTRIBUTE
        {
            return Err(FatError::not_found(format!(
                "directory entry at byte {}",
                entry.offset
            )));
        }

        if let Some(size) = update.size {
            short_entry::FILE_SIZE.set(&mut record, size);
        }
        if let Some(archive) = update.archive {
            let mut attributes = short_entry::ATTRIBUTES.get_u8(&record);
            if archive {
                attributes |= ATTR_ARCHIVE;
            } else {
                attributes &= !ATTR_ARCHIVE;
            }
            short_entry::ATTRIBUTES.set(&mut record, attributes as u32);
        }
        if let Some(t) = update.modified {
            short_entry::MODIFIED_TIME.set(&mut record, t.encode_time() as u32);
            short_entry::MODIFIED_DATE.set(&mut record, t.encode_date() as u32);
        }
        if let Some(t) = update.accessed {
            short_entry::ACCESSED_DATE.set(&mut record, t.encode_date() as u32);
        }
        if let Some(cluster) = update.first_cluster {
            short_entry::CLUSTER_HIGH.set(&mut record, cluster >> 16);
            short_entry::CLUSTER_LOW.set(&mut record, cluster & 0xFFFF);
        }

        self.write_to_position(&entry.directory, entry.offset, &record)
    }

    /// Create an empty file named `name` in the directory `parent`.
    ///
    /// The directory is never extended: if it has no run of free slots long
    /// enough for the long-name records plus the short entry, this fails with
    /// `NoFreeSpace`.
    pub fn add_file(
        &mut self,
        parent: &Chain,
        name: &str,
        now: FatDateTime,
    ) -> Result<(FileStat, Chain)> {
        if !self.writable {
            return Err(FatError::ReadOnlyFilesystem);
        }
        let name = long_name(name)?;
        let data = self.read_directory_bytes(parent)?;
        let items = parse_directory_entries(&data);
        if items.iter().any(|item| !item.is_dot_entry() && item.matches(&name)) {
            return Err(FatError::already_exists(name));
        }

        let short = short_name(&name);
        let taken = |raw: &[u8; 11]| items.iter().any(|item| &item.entry.name == raw);
        let short_bytes = if !short.lossy && !short.base().is_empty() && !taken(&short.to_bytes()) {
            short.to_bytes()
        } else {
            (1..=MAX_NUMERIC_TAIL)
                .map(|n| short.with_tail(n))
                .find(|raw| !taken(raw))
                .ok_or(FatError::NoFreeSpace)?
        };

        let entry = ShortEntry {
            name: short_bytes,
            attributes: ATTR_ARCHIVE,
            nt_case: 0,
            first_cluster: 0,
            size: 0,
            created: Some(now),
            modified: Some(now),
            accessed: FatDateTime::decode_date(now.encode_date()),
        };
        let mut records = if fits_short_name(&name) {
            Vec::new()
        } else {
            encode_long_name(&name, entry.checksum())
        };
        records.push(entry.encode());

        let total_slots = data.len() / DIR_ENTRY_SIZE;
        let end_slot = data
            .chunks_exact(DIR_ENTRY_SIZE)
            .position(|record| record[0] == END_OF_DIRECTORY);
        let start = free_run(&data, records.len(), end_slot).ok_or_else(|| {
            log::debug!("No run of {} free slots for {:?}", records.len(), name);
            FatError::NoFreeSpace
        })?;

        let mut bytes: Vec<u8> = records.iter().flatten().copied().collect();
        let after = start + records.len();
        // Entries written over the end-of-directory marker need a new one after them
        let moves_end = end_slot.is_some_and(|end| after > end);
        if moves_end && after < total_slots && data[after * DIR_ENTRY_SIZE] != END_OF_DIRECTORY {
            bytes.extend_from_slice(&[0u8; DIR_ENTRY_SIZE]);
        }
        self.write_to_position(parent, (start * DIR_ENTRY_SIZE) as u64, &bytes)?;

        let short_offset = ((after - 1) * DIR_ENTRY_SIZE) as u64;
        log::debug!(
            "Created {:?} as {:?} at byte {} ({} long-name records)",
            name,
            entry.display_name(),
            short_offset,
            records.len() - 1
        );

        let stat = FileStat {
            name,
            short_name: entry.display_name(),
            attributes: entry.attributes,
            first_cluster: 0,
            size: 0,
            created: entry.created,
            modified: entry.modified,
            accessed: entry.accessed,
            entry: Some(EntryRef {
                directory: *parent,
                offset: short_offset,
            }),
        };
        Ok((stat, Chain::Empty))
    }
}

/// First slot of `count` consecutive free slots. Every slot from the
/// end-of-directory marker on counts as free.
fn free_run(data: &[u8], count: usize, end_slot: Option<usize>) -> Option<usize> {
    let mut run = 0;
    for (slot, record) in data.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
        let past_end = end_slot.is_some_and(|end| slot >= end);
        if past_end || record[0] == DELETED_ENTRY {
            run += 1;
            if run == count {
                return Some(slot + 1 - count);
            }
        } else {
            run = 0;
        }
    }
    None
}
