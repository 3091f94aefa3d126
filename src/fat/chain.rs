//! Byte-level I/O along a cluster chain

use crate::device::BlockDevice;
use crate::error::{FatError, Result};
use crate::fat::fat_table::FatTable;
use crate::fat::geometry::VolumeGeometry;

/// Where the bytes of a file or directory live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    /// No clusters allocated (zero-length file)
    Empty,
    /// Fixed FAT12/FAT16 root directory region, addressed by sector
    Root { first_sector: u32, sectors: u32 },
    /// Ordinary cluster chain
    Clusters(u32),
}

impl Chain {
    pub fn from_cluster(first: u32) -> Self {
        if first == 0 {
            Chain::Empty
        } else {
            Chain::Clusters(first)
        }
    }

    /// Cluster number stored in a directory entry for this chain
    pub fn first_cluster(&self) -> u32 {
        match self {
            Chain::Clusters(c) => *c,
            Chain::Empty | Chain::Root { .. } => 0,
        }
    }

    /// Read up to `buf.len()` bytes starting `position` bytes into the chain.
    /// Returns fewer bytes only when the chain ends first.
    pub fn read_from_position<D: BlockDevice + ?Sized>(
        &self,
        device: &mut D,
        geometry: &VolumeGeometry,
        position: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        match *self {
            Chain::Empty => Ok(0),
            Chain::Root {
                first_sector,
                sectors,
            } => {
                let region = sectors as u64 * geometry.bytes_per_sector as u64;
                if position >= region {
                    return Ok(0);
                }
                let n = (buf.len() as u64).min(region - position) as usize;
                let start = geometry.sector_offset(first_sector as u64) + position;
                device.read_exact_at(&mut buf[..n], start)?;
                Ok(n)
            }
            Chain::Clusters(first) => {
                let cluster_size = geometry.cluster_size() as u64;
                let skip = position / cluster_size;
                let mut intra = position % cluster_size;
                let mut done = 0usize;

                let chain = FatTable::new(&mut *device, geometry).chain(first);
                let mut clusters = Vec::new();
                for (index, cluster) in chain.enumerate() {
                    let cluster = cluster?;
                    if (index as u64) < skip {
                        continue;
                    }
                    clusters.push(cluster);
                    let wanted = (buf.len() - done) as u64;
                    if (clusters.len() as u64) * cluster_size - intra >= wanted {
                        break;
                    }
                }

                for cluster in clusters {
                    if done == buf.len() {
                        break;
                    }
                    let n = ((cluster_size - intra) as usize).min(buf.len() - done);
                    let start = cluster_offset(geometry, cluster)? + intra;
                    device.read_exact_at(&mut buf[done..done + n], start)?;
                    done += n;
                    intra = 0;
                }
                Ok(done)
            }
        }
    }

    /// Write all of `buf` starting `position` bytes into the chain. The chain
    /// must already cover the whole range; clusters are never allocated here.
    pub fn write_to_position<D: BlockDevice + ?Sized>(
        &self,
        device: &mut D,
        geometry: &VolumeGeometry,
        position: u64,
        buf: &[u8],
    ) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let end = position + buf.len() as u64;
        match *self {
            Chain::Empty => Err(FatError::NoFreeSpace),
            Chain::Root {
                first_sector,
                sectors,
            } => {
                let region = sectors as u64 * geometry.bytes_per_sector as u64;
                if end > region {
                    return Err(FatError::NoFreeSpace);
                }
                let start = geometry.sector_offset(first_sector as u64) + position;
                device.write_all_at(buf, start)?;
                Ok(())
            }
            Chain::Clusters(first) => {
                let cluster_size = geometry.cluster_size() as u64;
                let skip = position / cluster_size;
                let last = (end - 1) / cluster_size;

                let mut clusters = Vec::with_capacity((last - skip + 1) as usize);
                let chain = FatTable::new(&mut *device, geometry).chain(first);
                for (index, cluster) in chain.enumerate() {
                    let cluster = cluster?;
                    let index = index as u64;
                    if index < skip {
                        continue;
                    }
                    clusters.push(cluster);
                    if index == last {
                        break;
                    }
                }
                if (clusters.len() as u64) < last - skip + 1 {
                    log::debug!(
                        "Chain at cluster {} too short for write ending at byte {}",
                        first,
                        end
                    );
                    return Err(FatError::NoFreeSpace);
                }

                let mut intra = position % cluster_size;
                let mut done = 0usize;
                for cluster in clusters {
                    let n = ((cluster_size - intra) as usize).min(buf.len() - done);
                    let start = cluster_offset(geometry, cluster)? + intra;
                    device.write_all_at(&buf[done..done + n], start)?;
                    done += n;
                    intra = 0;
                }
                Ok(())
            }
        }
    }
}

fn cluster_offset(geometry: &VolumeGeometry, cluster: u32) -> Result<u64> {
    geometry
        .sector_for_cluster(cluster)
        .map(|sector| geometry.sector_offset(sector))
        .ok_or(FatError::CorruptChain {
            cluster,
            value: cluster,
        })
}
