//! Static record layouts for the on-disk FAT structures.
//!
//! Every record is described as a table of `Field`s (byte offset and width,
//! little-endian unsigned). Decoders read through these tables instead of
//! sprinkling raw offsets through the code.

/// One little-endian unsigned field inside a binary record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub width: usize,
}

impl Field {
    pub const fn new(offset: usize, width: usize) -> Self {
        Self { offset, width }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.width
    }

    /// Decode the field as an unsigned integer (widths 1, 2 and 4)
    pub fn get(&self, record: &[u8]) -> u32 {
        let bytes = &record[self.offset..self.end()];
        bytes
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32)
    }

    pub fn get_u8(&self, record: &[u8]) -> u8 {
        record[self.offset]
    }

    pub fn get_u16(&self, record: &[u8]) -> u16 {
        u16::from_le_bytes([record[self.offset], record[self.offset + 1]])
    }

    pub fn bytes<'a>(&self, record: &'a [u8]) -> &'a [u8] {
        &record[self.offset..self.end()]
    }

    /// Encode `value` into the field, truncated to its width
    pub fn set(&self, record: &mut [u8], value: u32) {
        let bytes = value.to_le_bytes();
        record[self.offset..self.end()].copy_from_slice(&bytes[..self.width]);
    }
}

/// Boot sector fields shared by every FAT variant (the BPB proper)
pub mod bpb {
    use super::Field;

    pub const JUMP_BOOT: Field = Field::new(0, 3);
    pub const OEM_NAME: Field = Field::new(3, 8);
    pub const BYTES_PER_SECTOR: Field = Field::new(11, 2);
    pub const SECTORS_PER_CLUSTER: Field = Field::new(13, 1);
    pub const RESERVED_SECTORS: Field = Field::new(14, 2);
    pub const NUM_FATS: Field = Field::new(16, 1);
    pub const ROOT_ENTRY_COUNT: Field = Field::new(17, 2);
    pub const TOTAL_SECTORS_16: Field = Field::new(19, 2);
    pub const MEDIA: Field = Field::new(21, 1);
    pub const FAT_SIZE_16: Field = Field::new(22, 2);
    pub const SECTORS_PER_TRACK: Field = Field::new(24, 2);
    pub const NUM_HEADS: Field = Field::new(26, 2);
    pub const HIDDEN_SECTORS: Field = Field::new(28, 4);
    pub const TOTAL_SECTORS_32: Field = Field::new(32, 4);

    pub const SIGNATURE_OFFSET: usize = 510;
    pub const SIGNATURE: [u8; 2] = [0x55, 0xAA];
}

/// Extended boot record used by FAT12 and FAT16
pub mod boot16 {
    use super::Field;

    pub const DRIVE_NUMBER: Field = Field::new(36, 1);
    pub const BOOT_SIGNATURE: Field = Field::new(38, 1);
    pub const VOLUME_ID: Field = Field::new(39, 4);
    pub const VOLUME_LABEL: Field = Field::new(43, 11);
    pub const FS_TYPE: Field = Field::new(54, 8);
}

/// Extended boot record used by FAT32
pub mod boot32 {
    use super::Field;

    pub const FAT_SIZE_32: Field = Field::new(36, 4);
    pub const EXT_FLAGS: Field = Field::new(40, 2);
    pub const FS_VERSION: Field = Field::new(42, 2);
    pub const ROOT_CLUSTER: Field = Field::new(44, 4);
    pub const FS_INFO: Field = Field::new(48, 2);
    pub const BACKUP_BOOT_SECTOR: Field = Field::new(50, 2);
    pub const DRIVE_NUMBER: Field = Field::new(64, 1);
    pub const BOOT_SIGNATURE: Field = Field::new(66, 1);
    pub const VOLUME_ID: Field = Field::new(67, 4);
    pub const VOLUME_LABEL: Field = Field::new(71, 11);
    pub const FS_TYPE: Field = Field::new(82, 8);
}

/// 32-byte short (8.3) directory entry
pub mod short_entry {
    use super::Field;

    pub const NAME: Field = Field::new(0, 11);
    pub const ATTRIBUTES: Field = Field::new(11, 1);
    pub const NT_CASE: Field = Field::new(12, 1);
    pub const CREATED_TENTHS: Field = Field::new(13, 1);
    pub const CREATED_TIME: Field = Field::new(14, 2);
    pub const CREATED_DATE: Field = Field::new(16, 2);
    pub const ACCESSED_DATE: Field = Field::new(18, 2);
    pub const CLUSTER_HIGH: Field = Field::new(20, 2);
    pub const MODIFIED_TIME: Field = Field::new(22, 2);
    pub const MODIFIED_DATE: Field = Field::new(24, 2);
    pub const CLUSTER_LOW: Field = Field::new(26, 2);
    pub const FILE_SIZE: Field = Field::new(28, 4);
}

/// 32-byte VFAT long-name entry
pub mod long_entry {
    use super::Field;

    pub const ORDINAL: Field = Field::new(0, 1);
    pub const NAME1: Field = Field::new(1, 10);
    pub const ATTRIBUTES: Field = Field::new(11, 1);
    pub const KIND: Field = Field::new(12, 1);
    pub const CHECKSUM: Field = Field::new(13, 1);
    pub const NAME2: Field = Field::new(14, 12);
    pub const FIRST_CLUSTER: Field = Field::new(26, 2);
    pub const NAME3: Field = Field::new(28, 4);

    /// Name fields in the order their UTF-16 units are concatenated
    pub const NAME_FIELDS: [Field; 3] = [NAME1, NAME2, NAME3];
}
