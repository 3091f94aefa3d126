//! Boot sector / BIOS Parameter Block decoding

use crate::error::{FatError, Result};
use crate::fat::layout::{boot16, boot32, bpb};

/// Size every volume is first read with, before the real sector size is known
pub const BOOTSTRAP_SECTOR_SIZE: usize = 512;

pub const SUPPORTED_SECTOR_SIZES: [u16; 4] = [512, 1024, 2048, 4096];

/// Which extended boot record follows the common BPB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootLayout {
    /// FAT12/FAT16 extended record (FATSz16 non-zero)
    Fat16,
    /// FAT32 extended record (FATSz16 reads as zero)
    Fat32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosParameterBlock {
    pub layout: BootLayout,
    pub oem_name: String,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors: u32,
    pub media: u8,
    /// FATSz16 when non-zero, otherwise FATSz32
    pub fat_size: u32,
    pub hidden_sectors: u32,
    /// Only meaningful for the FAT32 layout, zero otherwise
    pub root_cluster: u32,
    pub volume_id: Option<u32>,
    pub volume_label: Option<String>,
    pub fs_type: Option<String>,
}

impl BiosParameterBlock {
    /// Decode a boot sector. `sector` must hold at least the first 512 bytes.
    pub fn decode(sector: &[u8]) -> Result<Self> {
        if sector.len() < BOOTSTRAP_SECTOR_SIZE {
            return Err(FatError::invalid_boot_sector(format!(
                "boot sector is {} bytes, need {}",
                sector.len(),
                BOOTSTRAP_SECTOR_SIZE
            )));
        }
        let sig = bpb::SIGNATURE_OFFSET;
        if sector[sig..sig + 2] != bpb::SIGNATURE {
            return Err(FatError::InvalidVolumeSignature);
        }

        // FATSz16 is zero exactly when the FAT32 extended record is present
        let layout = if bpb::FAT_SIZE_16.get(sector) == 0 {
            BootLayout::Fat32
        } else {
            BootLayout::Fat16
        };

        let bytes_per_sector = bpb::BYTES_PER_SECTOR.get_u16(sector);
        if bytes_per_sector == 0 {
            // exFAT keeps the signature but zeroes the whole legacy BPB
            return Err(FatError::UnsupportedExFat);
        }

        let total_16 = bpb::TOTAL_SECTORS_16.get(sector);
        let total_sectors = if total_16 != 0 {
            total_16
        } else {
            bpb::TOTAL_SECTORS_32.get(sector)
        };

        let (fat_size, root_cluster, ext_sig, id, label, fs_type) = match layout {
            BootLayout::Fat16 => (
                bpb::FAT_SIZE_16.get(sector),
                0,
                boot16::BOOT_SIGNATURE.get_u8(sector),
                boot16::VOLUME_ID,
                boot16::VOLUME_LABEL,
                boot16::FS_TYPE,
            ),
            BootLayout::Fat32 => (
                boot32::FAT_SIZE_32.get(sector),
                boot32::ROOT_CLUSTER.get(sector),
                boot32::BOOT_SIGNATURE.get_u8(sector),
                boot32::VOLUME_ID,
                boot32::VOLUME_LABEL,
                boot32::FS_TYPE,
            ),
        };

        // 0x29 marks the extended fields as present; 0x28 carries only the id
        let (volume_id, volume_label, fs_type) = match ext_sig {
            0x29 => (
                Some(id.get(sector)),
                Some(text_field(label.bytes(sector))),
                Some(text_field(fs_type.bytes(sector))),
            ),
            0x28 => (Some(id.get(sector)), None, None),
            _ => (None, None, None),
        };

        let bpb = Self {
            layout,
            oem_name: text_field(bpb::OEM_NAME.bytes(sector)),
            bytes_per_sector,
            sectors_per_cluster: bpb::SECTORS_PER_CLUSTER.get_u8(sector),
            reserved_sectors: bpb::RESERVED_SECTORS.get_u16(sector),
            num_fats: bpb::NUM_FATS.get_u8(sector),
            root_entry_count: bpb::ROOT_ENTRY_COUNT.get_u16(sector),
            total_sectors,
            media: bpb::MEDIA.get_u8(sector),
            fat_size,
            hidden_sectors: bpb::HIDDEN_SECTORS.get(sector),
            root_cluster,
            volume_id,
            volume_label,
            fs_type,
        };
        bpb.validate()?;
        Ok(bpb)
    }

    fn validate(&self) -> Result<()> {
        if !SUPPORTED_SECTOR_SIZES.contains(&self.bytes_per_sector) {
            return Err(FatError::invalid_boot_sector(format!(
                "unsupported sector size {}",
                self.bytes_per_sector
            )));
        }
        if self.sectors_per_cluster == 0 || !self.sectors_per_cluster.is_power_of_two() {
            return Err(FatError::invalid_boot_sector(format!(
                "sectors per cluster must be a power of two, got {}",
                self.sectors_per_cluster
            )));
        }
        if self.reserved_sectors == 0 {
            return Err(FatError::invalid_boot_sector("no reserved sectors"));
        }
        if self.num_fats == 0 {
            return Err(FatError::invalid_boot_sector("no FAT copies"));
        }
        if self.fat_size == 0 {
            return Err(FatError::invalid_boot_sector("FAT size is zero"));
        }
        if self.total_sectors == 0 {
            return Err(FatError::invalid_boot_sector("total sector count is zero"));
        }
        Ok(())
    }
}

fn text_field(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fat16_sector() -> Vec<u8> {
        let mut s = vec![0u8; 512];
        bpb::BYTES_PER_SECTOR.set(&mut s, 512);
        bpb::SECTORS_PER_CLUSTER.set(&mut s, 4);
        bpb::RESERVED_SECTORS.set(&mut s, 1);
        bpb::NUM_FATS.set(&mut s, 2);
        bpb::ROOT_ENTRY_COUNT.set(&mut s, 512);
        bpb::TOTAL_SECTORS_32.set(&mut s, 40_000);
        bpb::FAT_SIZE_16.set(&mut s, 40);
        boot16::BOOT_SIGNATURE.set(&mut s, 0x29);
        s[43..54].copy_from_slice(b"MY VOLUME  ");
        s[54..62].copy_from_slice(b"FAT16   ");
        s[510] = 0x55;
        s[511] = 0xAA;
        s
    }

    #[test]
    fn decodes_fat16_layout() {
        let bpb = BiosParameterBlock::decode(&fat16_sector()).unwrap();
        assert_eq!(bpb.layout, BootLayout::Fat16);
        assert_eq!(bpb.total_sectors, 40_000);
        assert_eq!(bpb.fat_size, 40);
        assert_eq!(bpb.volume_label.as_deref(), Some("MY VOLUME"));
        assert_eq!(bpb.fs_type.as_deref(), Some("FAT16"));
    }

    #[test]
    fn zero_fat_size_16_selects_fat32_layout() {
        let mut s = fat16_sector();
        bpb::FAT_SIZE_16.set(&mut s, 0);
        boot32::FAT_SIZE_32.set(&mut s, 600);
        boot32::ROOT_CLUSTER.set(&mut s, 2);
        let bpb = BiosParameterBlock::decode(&s).unwrap();
        assert_eq!(bpb.layout, BootLayout::Fat32);
        assert_eq!(bpb.fat_size, 600);
        assert_eq!(bpb.root_cluster, 2);
    }

    #[test]
    fn missing_signature_is_rejected() {
        let mut s = fat16_sector();
        s[511] = 0;
        assert!(matches!(
            BiosParameterBlock::decode(&s),
            Err(FatError::InvalidVolumeSignature)
        ));
    }

    #[test]
    fn zero_sector_size_is_exfat() {
        let mut s = vec![0u8; 512];
        s[3..11].copy_from_slice(b"EXFAT   ");
        s[510] = 0x55;
        s[511] = 0xAA;
        assert!(matches!(
            BiosParameterBlock::decode(&s),
            Err(FatError::UnsupportedExFat)
        ));
    }

    #[test]
    fn odd_sector_size_is_rejected() {
        let mut s = fat16_sector();
        bpb::BYTES_PER_SECTOR.set(&mut s, 768);
        assert!(matches!(
            BiosParameterBlock::decode(&s),
            Err(FatError::InvalidBootSector { .. })
        ));
    }
}
