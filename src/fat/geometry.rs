//! Volume geometry derived from the BPB, and FAT type classification

use std::fmt;

use crate::error::{FatError, Result};
use crate::fat::DIR_ENTRY_SIZE;
use crate::fat::boot_sector::BiosParameterBlock;

/// Volumes with fewer clusters than this are FAT12
pub const FAT12_MAX_CLUSTERS: u32 = 4085;
/// Volumes with fewer clusters than this (and not FAT12) are FAT16
pub const FAT16_MAX_CLUSTERS: u32 = 65525;
/// Most data clusters a 28-bit FAT32 entry can address below the reserved values
pub const FAT32_MAX_CLUSTERS: u32 = 0x0FFF_FFF5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    /// The FAT type is determined by the cluster count alone
    pub fn from_cluster_count(count_of_clusters: u32) -> Self {
        if count_of_clusters < FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if count_of_clusters < FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    /// Effective width of a FAT entry in bits
    pub fn entry_bits(self) -> u32 {
        match self {
            FatType::Fat12 => 12,
            FatType::Fat16 => 16,
            FatType::Fat32 => 28,
        }
    }

    /// Bytes a FAT needs to describe `count_of_clusters` data clusters plus
    /// the two reserved entries
    pub fn table_bytes(self, count_of_clusters: u32) -> u64 {
        let stored_bits = match self {
            FatType::Fat32 => 32,
            other => other.entry_bits() as u64,
        };
        ((count_of_clusters as u64 + 2) * stored_bits).div_ceil(8)
    }
}

impl fmt::Display for FatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FatType::Fat12 => "FAT12",
            FatType::Fat16 => "FAT16",
            FatType::Fat32 => "FAT32",
        };
        f.write_str(name)
    }
}

/// Immutable geometry of a mounted volume. All sector numbers are relative
/// to the start of the volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeGeometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub num_fats: u32,
    pub root_entry_count: u32,
    pub fat_size: u32,
    pub total_sectors: u32,
    /// First cluster of the root directory (FAT32 only, zero otherwise)
    pub root_cluster: u32,
    pub root_dir_sectors: u32,
    pub first_data_sector: u32,
    pub count_of_clusters: u32,
    pub fat_type: FatType,
}

impl VolumeGeometry {
    pub fn from_bpb(bpb: &BiosParameterBlock) -> Result<Self> {
        let bytes_per_sector = bpb.bytes_per_sector as u32;
        let sectors_per_cluster = bpb.sectors_per_cluster as u32;
        let reserved_sectors = bpb.reserved_sectors as u32;
        let num_fats = bpb.num_fats as u32;
        let root_entry_count = bpb.root_entry_count as u32;

        let root_dir_sectors =
            (root_entry_count * DIR_ENTRY_SIZE as u32).div_ceil(bytes_per_sector);
        let first_data_sector = num_fats
            .checked_mul(bpb.fat_size)
            .and_then(|fats| fats.checked_add(reserved_sectors))
            .and_then(|s| s.checked_add(root_dir_sectors))
            .ok_or_else(|| FatError::invalid_boot_sector("FAT region overflows"))?;
        if first_data_sector >= bpb.total_sectors {
            return Err(FatError::invalid_boot_sector(format!(
                "data region starts at sector {} but volume has {} sectors",
                first_data_sector, bpb.total_sectors
            )));
        }
        let count_of_clusters = (bpb.total_sectors - first_data_sector) / sectors_per_cluster;
        let fat_type = FatType::from_cluster_count(count_of_clusters);
        if count_of_clusters > FAT32_MAX_CLUSTERS {
            return Err(FatError::invalid_boot_sector(format!(
                "{} clusters exceed the FAT32 limit of {}",
                count_of_clusters, FAT32_MAX_CLUSTERS
            )));
        }

        match fat_type {
            FatType::Fat32 if bpb.root_cluster < 2 || bpb.root_cluster > count_of_clusters + 1 => {
                return Err(FatError::invalid_boot_sector(format!(
                    "FAT32 root cluster {} out of range",
                    bpb.root_cluster
                )));
            }
            FatType::Fat12 | FatType::Fat16 if root_entry_count == 0 => {
                return Err(FatError::invalid_boot_sector(format!(
                    "{} volume without a root directory region",
                    fat_type
                )));
            }
            _ => {}
        }

        let entry_bytes = fat_type.table_bytes(count_of_clusters);
        if (bpb.fat_size as u64) * (bytes_per_sector as u64) < entry_bytes {
            log::warn!(
                "FAT of {} sectors is too small for {} clusters",
                bpb.fat_size,
                count_of_clusters
            );
        }

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            root_entry_count,
            fat_size: bpb.fat_size,
            total_sectors: bpb.total_sectors,
            root_cluster: if fat_type == FatType::Fat32 {
                bpb.root_cluster
            } else {
                0
            },
            root_dir_sectors,
            first_data_sector,
            count_of_clusters,
            fat_type,
        })
    }

    pub fn cluster_size(&self) -> u32 {
        self.bytes_per_sector * self.sectors_per_cluster
    }

    /// Highest valid data cluster number
    pub fn max_cluster(&self) -> u32 {
        self.count_of_clusters + 1
    }

    pub fn is_data_cluster(&self, cluster: u32) -> bool {
        (2..=self.max_cluster()).contains(&cluster)
    }

    /// First sector of a data cluster; `None` outside the data range
    pub fn sector_for_cluster(&self, cluster: u32) -> Option<u64> {
        if !self.is_data_cluster(cluster) {
            return None;
        }
        Some(
            self.first_data_sector as u64
                + (cluster as u64 - 2) * self.sectors_per_cluster as u64,
        )
    }

    pub fn first_fat_sector(&self) -> u32 {
        self.reserved_sectors
    }

    /// First sector of the fixed root directory region (FAT12/16).
    /// It sits just below the data region and has no cluster number.
    pub fn root_dir_sector(&self) -> u32 {
        self.first_data_sector - self.root_dir_sectors
    }

    pub fn sector_offset(&self, sector: u64) -> u64 {
        sector * self.bytes_per_sector as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat::boot_sector::BootLayout;

    fn bpb(total_sectors: u32) -> BiosParameterBlock {
        BiosParameterBlock {
            layout: BootLayout::Fat16,
            oem_name: "TEST".into(),
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            num_fats: 2,
            root_entry_count: 224,
            total_sectors,
            media: 0xF0,
            fat_size: 9,
            hidden_sectors: 0,
            root_cluster: 0,
            volume_id: None,
            volume_label: None,
            fs_type: None,
        }
    }

    #[test]
    fn classification_boundaries_are_exact() {
        assert_eq!(FatType::from_cluster_count(0), FatType::Fat12);
        assert_eq!(FatType::from_cluster_count(4084), FatType::Fat12);
        assert_eq!(FatType::from_cluster_count(4085), FatType::Fat16);
        assert_eq!(FatType::from_cluster_count(65524), FatType::Fat16);
        assert_eq!(FatType::from_cluster_count(65525), FatType::Fat32);
        assert_eq!(FatType::from_cluster_count(u32::MAX), FatType::Fat32);
    }

    #[test]
    fn floppy_geometry() {
        let g = VolumeGeometry::from_bpb(&bpb(2880)).unwrap();
        assert_eq!(g.root_dir_sectors, 14);
        assert_eq!(g.first_data_sector, 1 + 18 + 14);
        assert_eq!(g.count_of_clusters, 2880 - 33);
        assert_eq!(g.fat_type, FatType::Fat12);
        assert_eq!(g.root_dir_sector(), 19);
        assert_eq!(g.sector_for_cluster(2), Some(g.first_data_sector as u64));
        assert_eq!(g.sector_for_cluster(3), Some(g.first_data_sector as u64 + 1));
        assert_eq!(g.sector_for_cluster(1), None);
        assert_eq!(g.sector_for_cluster(g.max_cluster() + 1), None);
    }

    #[test]
    fn root_dir_sectors_round_up() {
        let mut b = bpb(2880);
        b.root_entry_count = 17;
        let g = VolumeGeometry::from_bpb(&b).unwrap();
        assert_eq!(g.root_dir_sectors, 2);
    }

    #[test]
    fn cluster_count_floors() {
        let mut b = bpb(2880 + 3);
        b.sectors_per_cluster = 4;
        let g = VolumeGeometry::from_bpb(&b).unwrap();
        assert_eq!(g.count_of_clusters, (2883 - 33) / 4);
    }

    #[test]
    fn table_bytes_per_type() {
        assert_eq!(FatType::Fat12.table_bytes(2847), 4274);
        assert_eq!(FatType::Fat16.table_bytes(10), 24);
        assert_eq!(FatType::Fat32.table_bytes(u32::MAX), (u32::MAX as u64 + 2) * 4);
    }

    #[test]
    fn cluster_count_is_capped() {
        let mut b = bpb(0xFFFF_FFF0);
        b.layout = BootLayout::Fat32;
        b.root_entry_count = 0;
        b.root_cluster = 2;
        assert!(matches!(
            VolumeGeometry::from_bpb(&b),
            Err(FatError::InvalidBootSector { .. })
        ));

        b.sectors_per_cluster = 32;
        let g = VolumeGeometry::from_bpb(&b).unwrap();
        assert_eq!(g.fat_type, FatType::Fat32);
        assert_eq!(g.count_of_clusters, (0xFFFF_FFF0 - 19) / 32);
        assert_eq!(g.max_cluster(), g.count_of_clusters + 1);
    }

    #[test]
    fn data_region_past_end_is_rejected() {
        assert!(VolumeGeometry::from_bpb(&bpb(20)).is_err());
    }
}
