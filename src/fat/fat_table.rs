//! FAT table access for FAT12, FAT16 and FAT32

use crate::device::BlockDevice;
use crate::error::{FatError, Result};
use crate::fat::geometry::{FatType, VolumeGeometry};

/// FAT32 entries only use the low 28 bits
pub const FAT32_ENTRY_MASK: u32 = 0x0FFF_FFFF;

/// Decoded meaning of a FAT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterValue {
    Free,
    /// Value 1 or the reserved band just below the bad-cluster marker
    Reserved(u32),
    /// Chain continues at this cluster
    Data(u32),
    Bad,
    EndOfChain,
}

fn bad_marker(fat_type: FatType) -> u32 {
    match fat_type {
        FatType::Fat12 => 0xFF7,
        FatType::Fat16 => 0xFFF7,
        FatType::Fat32 => 0x0FFF_FFF7,
    }
}

impl ClusterValue {
    pub fn classify(fat_type: FatType, raw: u32) -> Self {
        let bad = bad_marker(fat_type);
        match raw {
            0 => ClusterValue::Free,
            1 => ClusterValue::Reserved(raw),
            v if v > bad => ClusterValue::EndOfChain,
            v if v == bad => ClusterValue::Bad,
            v if v >= bad - 7 => ClusterValue::Reserved(v),
            v => ClusterValue::Data(v),
        }
    }

    /// Entry value that classifies as `self`
    pub fn raw(self, fat_type: FatType) -> u32 {
        let bad = bad_marker(fat_type);
        match self {
            ClusterValue::Free => 0,
            ClusterValue::Reserved(v) | ClusterValue::Data(v) => v,
            ClusterValue::Bad => bad,
            ClusterValue::EndOfChain => bad | 0xF,
        }
    }
}

/// Position of a cluster's entry in the first FAT copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatEntryLocation {
    /// Absolute sector number within the volume
    pub sector: u64,
    /// Byte offset inside that sector
    pub offset: usize,
}

/// Byte offset of a cluster's entry from the start of the FAT region
pub fn entry_byte_offset(fat_type: FatType, cluster: u32) -> u64 {
    let cluster = cluster as u64;
    match fat_type {
        // Two entries share three bytes
        FatType::Fat12 => cluster + cluster / 2,
        FatType::Fat16 => cluster * 2,
        FatType::Fat32 => cluster * 4,
    }
}

pub fn entry_location(geometry: &VolumeGeometry, cluster: u32) -> FatEntryLocation {
    let byte_offset = entry_byte_offset(geometry.fat_type, cluster);
    let bps = geometry.bytes_per_sector as u64;
    FatEntryLocation {
        sector: geometry.first_fat_sector() as u64 + byte_offset / bps,
        offset: (byte_offset % bps) as usize,
    }
}

/// Number of bytes holding one entry
pub fn entry_width(fat_type: FatType) -> usize {
    match fat_type {
        FatType::Fat12 | FatType::Fat16 => 2,
        FatType::Fat32 => 4,
    }
}

/// Decode the entry for `cluster` from the bytes starting at its entry offset.
///
/// For FAT12 the two bytes at `n + n/2` hold the entry in their low 12 bits
/// when `n` is even, and in their high 12 bits when `n` is odd.
pub fn decode_entry(fat_type: FatType, cluster: u32, bytes: &[u8]) -> u32 {
    match fat_type {
        FatType::Fat12 => {
            let pair = u16::from_le_bytes([bytes[0], bytes[1]]) as u32;
            if cluster & 1 == 0 {
                pair & 0x0FFF
            } else {
                pair >> 4
            }
        }
        FatType::Fat16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
        FatType::Fat32 => {
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & FAT32_ENTRY_MASK
        }
    }
}

/// Sector-at-a-time reader over the first FAT copy.
///
/// The table owns its sector buffer, so concurrent tables never share scratch space.
pub struct FatTable<'a, D: BlockDevice + ?Sized> {
    device: &'a mut D,
    geometry: &'a VolumeGeometry,
    cached: Option<(u64, Vec<u8>)>,
}

impl<'a, D: BlockDevice + ?Sized> FatTable<'a, D> {
    pub fn new(device: &'a mut D, geometry: &'a VolumeGeometry) -> Self {
        Self {
            device,
            geometry,
            cached: None,
        }
    }

    fn sector(&mut self, sector: u64) -> Result<&[u8]> {
        let buf = match self.cached.take() {
            Some((cached, buf)) if cached == sector => buf,
            _ => {
                let mut buf = vec![0u8; self.geometry.bytes_per_sector as usize];
                self.device
                    .read_exact_at(&mut buf, self.geometry.sector_offset(sector))?;
                buf
            }
        };
        Ok(&self.cached.insert((sector, buf)).1)
    }

    /// Raw next-cluster value stored for `cluster`
    pub fn raw_entry(&mut self, cluster: u32) -> Result<u32> {
        let fat_type = self.geometry.fat_type;
        let width = entry_width(fat_type);
        let location = entry_location(self.geometry, cluster);
        let mut bytes = [0u8; 4];

        let sector = self.sector(location.sector)?;
        let available = (sector.len() - location.offset).min(width);
        bytes[..available].copy_from_slice(&sector[location.offset..location.offset + available]);
        if available < width {
            // A FAT12 entry can straddle two sectors
            let next = self.sector(location.sector + 1)?;
            bytes[available..width].copy_from_slice(&next[..width - available]);
        }
        Ok(decode_entry(fat_type, cluster, &bytes))
    }

    pub fn next_cluster(&mut self, cluster: u32) -> Result<ClusterValue> {
        let raw = self.raw_entry(cluster)?;
        Ok(ClusterValue::classify(self.geometry.fat_type, raw))
    }

    /// Lazily walk the chain starting at `first`
    pub fn chain(self, first: u32) -> ClusterChain<'a, D> {
        ClusterChain {
            table: self,
            state: ChainState::Start(first),
            steps: 0,
        }
    }
}

enum ChainState {
    Start(u32),
    After(u32),
    Done,
}

/// Lazy, finite sequence of the clusters in one chain. The FAT is only read
/// when the iterator is advanced past a cluster. Walking again requires a new
/// chain from the first cluster.
pub struct ClusterChain<'a, D: BlockDevice + ?Sized> {
    table: FatTable<'a, D>,
    state: ChainState,
    steps: u32,
}

impl<D: BlockDevice + ?Sized> ClusterChain<'_, D> {
    fn advance(&mut self) -> Result<Option<u32>> {
        let geometry = self.table.geometry;
        match self.state {
            ChainState::Done => Ok(None),
            ChainState::Start(first) => {
                if !geometry.is_data_cluster(first) {
                    return Err(FatError::CorruptChain {
                        cluster: 0,
                        value: first,
                    });
                }
                self.state = ChainState::After(first);
                self.steps = 1;
                Ok(Some(first))
            }
            ChainState::After(current) => match self.table.next_cluster(current)? {
                ClusterValue::EndOfChain => {
                    self.state = ChainState::Done;
                    Ok(None)
                }
                ClusterValue::Data(next)
                    if geometry.is_data_cluster(next) && self.steps < geometry.count_of_clusters =>
                {
                    self.state = ChainState::After(next);
                    self.steps += 1;
                    Ok(Some(next))
                }
                other => {
                    let value = other.raw(geometry.fat_type);
                    log::warn!(
                        "Cluster chain broken at cluster {} (FAT value {:#x})",
                        current,
                        value
                    );
                    Err(FatError::CorruptChain {
                        cluster: current,
                        value,
                    })
                }
            },
        }
    }
}

impl<D: BlockDevice + ?Sized> Iterator for ClusterChain<'_, D> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(cluster)) => Some(Ok(cluster)),
            Ok(None) => None,
            Err(e) => {
                self.state = ChainState::Done;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fat12_pair_decodes_by_parity() {
        // Entries 2 = 0x123 and 3 = 0xABC packed into bytes 3..6
        let span = [0x23, 0xC1, 0xAB];
        assert_eq!(entry_byte_offset(FatType::Fat12, 2), 3);
        assert_eq!(entry_byte_offset(FatType::Fat12, 3), 4);
        assert_eq!(decode_entry(FatType::Fat12, 2, &span[0..2]), 0x123);
        assert_eq!(decode_entry(FatType::Fat12, 3, &span[1..3]), 0xABC);
    }

    #[test]
    fn fat32_masks_reserved_bits() {
        let bytes = 0xF000_0005u32.to_le_bytes();
        assert_eq!(decode_entry(FatType::Fat32, 7, &bytes), 5);
    }

    #[test]
    fn classify_thresholds() {
        assert_eq!(ClusterValue::classify(FatType::Fat12, 0), ClusterValue::Free);
        assert_eq!(ClusterValue::classify(FatType::Fat12, 0xFF7), ClusterValue::Bad);
        assert_eq!(ClusterValue::classify(FatType::Fat12, 0xFF8), ClusterValue::EndOfChain);
        assert_eq!(ClusterValue::classify(FatType::Fat12, 0xFF6), ClusterValue::Reserved(0xFF6));
        assert_eq!(ClusterValue::classify(FatType::Fat12, 0xFEF), ClusterValue::Data(0xFEF));
        assert_eq!(ClusterValue::classify(FatType::Fat16, 0xFFF8), ClusterValue::EndOfChain);
        assert_eq!(ClusterValue::classify(FatType::Fat16, 0xFF8), ClusterValue::Data(0xFF8));
        assert_eq!(ClusterValue::classify(FatType::Fat32, 0x0FFF_FFFF), ClusterValue::EndOfChain);
        assert_eq!(ClusterValue::classify(FatType::Fat32, 1), ClusterValue::Reserved(1));
    }

    #[test]
    fn raw_values_classify_back() {
        for fat_type in [FatType::Fat12, FatType::Fat16, FatType::Fat32] {
            for value in [
                ClusterValue::Free,
                ClusterValue::Bad,
                ClusterValue::EndOfChain,
                ClusterValue::Data(42),
            ] {
                assert_eq!(ClusterValue::classify(fat_type, value.raw(fat_type)), value);
            }
        }
        assert_eq!(ClusterValue::EndOfChain.raw(FatType::Fat12), 0xFFF);
    }
}
