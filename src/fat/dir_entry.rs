//! 32-byte directory records: short (8.3) entries and VFAT long-name fragments

use crate::fat::layout::{long_entry, short_entry};
use crate::fat::time::FatDateTime;
use crate::fat::{DIR_ENTRY_SIZE, LFN_ATTRIBUTE};

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;

/// First name byte of a record past the end of the directory
pub const END_OF_DIRECTORY: u8 = 0x00;
/// First name byte of a deleted record
pub const DELETED_ENTRY: u8 = 0xE5;
/// Stored instead of a real leading 0xE5 name byte
pub const ESCAPED_E5: u8 = 0x05;

/// Long-name ordinal flag marking the highest (first stored) fragment
pub const LAST_LONG_ENTRY: u8 = 0x40;
pub const LONG_NAME_CHARS_PER_ENTRY: usize = 13;
pub const MAX_LONG_NAME_ENTRIES: u8 = 20;

const NT_LOWERCASE_BASE: u8 = 0x08;
const NT_LOWERCASE_EXT: u8 = 0x10;

/// Decoded short directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortEntry {
    /// Raw 8+3 name bytes, with a leading 0x05 already turned back into 0xE5
    pub name: [u8; 11],
    pub attributes: u8,
    pub nt_case: u8,
    pub first_cluster: u32,
    pub size: u32,
    pub created: Option<FatDateTime>,
    pub modified: Option<FatDateTime>,
    pub accessed: Option<FatDateTime>,
}

impl ShortEntry {
    pub fn decode(record: &[u8]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(short_entry::NAME.bytes(record));
        if name[0] == ESCAPED_E5 {
            name[0] = DELETED_ENTRY;
        }
        let high = short_entry::CLUSTER_HIGH.get(record);
        let low = short_entry::CLUSTER_LOW.get(record);

        Self {
            name,
            attributes: short_entry::ATTRIBUTES.get_u8(record),
            nt_case: short_entry::NT_CASE.get_u8(record),
            first_cluster: (high << 16) | low,
            size: short_entry::FILE_SIZE.get(record),
            created: FatDateTime::decode(
                short_entry::CREATED_DATE.get_u16(record),
                short_entry::CREATED_TIME.get_u16(record),
                short_entry::CREATED_TENTHS.get_u8(record),
            ),
            modified: FatDateTime::decode(
                short_entry::MODIFIED_DATE.get_u16(record),
                short_entry::MODIFIED_TIME.get_u16(record),
                0,
            ),
            accessed: FatDateTime::decode_date(short_entry::ACCESSED_DATE.get_u16(record)),
        }
    }

    /// Encode into a fresh record. The inverse of `decode`.
    pub fn encode(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut record = [0u8; DIR_ENTRY_SIZE];
        record[..11].copy_from_slice(&self.name);
        if record[0] == DELETED_ENTRY {
            record[0] = ESCAPED_E5;
        }
        short_entry::ATTRIBUTES.set(&mut record, self.attributes as u32);
        short_entry::NT_CASE.set(&mut record, self.nt_case as u32);
        short_entry::CLUSTER_HIGH.set(&mut record, self.first_cluster >> 16);
        short_entry::CLUSTER_LOW.set(&mut record, self.first_cluster & 0xFFFF);
        short_entry::FILE_SIZE.set(&mut record, self.size);
        if let Some(t) = self.created {
            short_entry::CREATED_TENTHS.set(&mut record, t.encode_tenths() as u32);
            short_entry::CREATED_TIME.set(&mut record, t.encode_time() as u32);
            short_entry::CREATED_DATE.set(&mut record, t.encode_date() as u32);
        }
        if let Some(t) = self.modified {
            short_entry::MODIFIED_TIME.set(&mut record, t.encode_time() as u32);
            short_entry::MODIFIED_DATE.set(&mut record, t.encode_date() as u32);
        }
        if let Some(t) = self.accessed {
            short_entry::ACCESSED_DATE.set(&mut record, t.encode_date() as u32);
        }
        record
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    pub fn is_volume_label(&self) -> bool {
        self.attributes & ATTR_VOLUME_ID != 0 && self.attributes & ATTR_DIRECTORY == 0
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes & ATTR_READ_ONLY != 0
    }

    pub fn is_archive(&self) -> bool {
        self.attributes & ATTR_ARCHIVE != 0
    }

    pub fn checksum(&self) -> u8 {
        short_name_checksum(&self.name_field())
    }

    /// Name field exactly as stored on disk (0xE5 escaped back to 0x05)
    pub fn name_field(&self) -> [u8; 11] {
        let mut raw = self.name;
        if raw[0] == DELETED_ENTRY {
            raw[0] = ESCAPED_E5;
        }
        raw
    }

    /// "BASE.EXT" form, honoring the NT lowercase flags
    pub fn display_name(&self) -> String {
        let base = oem_text(&self.name[..8], self.nt_case & NT_LOWERCASE_BASE != 0);
        let ext = oem_text(&self.name[8..], self.nt_case & NT_LOWERCASE_EXT != 0);
        if ext.is_empty() {
            base
        } else {
            format!("{}.{}", base, ext)
        }
    }
}

fn oem_text(raw: &[u8], lowercase: bool) -> String {
    // OEM code pages are not modeled; high bytes are shown as Latin-1
    let text: String = raw.iter().map(|&b| b as char).collect();
    let text = text.trim_end_matches(' ');
    if lowercase {
        text.to_ascii_lowercase()
    } else {
        text.to_string()
    }
}

/// Checksum of an 11-byte short name, stored in every long-name fragment
pub fn short_name_checksum(name: &[u8; 11]) -> u8 {
    let mut sum: u8 = 0;
    for &byte in name {
        sum = (if sum & 1 != 0 { 0x80u8 } else { 0 })
            .wrapping_add(sum >> 1)
            .wrapping_add(byte);
    }
    sum
}

/// One VFAT long-name record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongNameFragment {
    /// 1-based position of this fragment in the name
    pub ordinal: u8,
    /// Set on the fragment holding the end of the name
    pub is_last: bool,
    pub checksum: u8,
    /// Up to 13 UTF-16 units, without terminator or padding
    pub chars: Vec<u16>,
}

impl LongNameFragment {
    pub fn decode(record: &[u8]) -> Self {
        let raw_ordinal = long_entry::ORDINAL.get_u8(record);
        let mut chars = Vec::with_capacity(LONG_NAME_CHARS_PER_ENTRY);
        'fields: for field in long_entry::NAME_FIELDS {
            for unit in field.bytes(record).chunks_exact(2) {
                let c = u16::from_le_bytes([unit[0], unit[1]]);
                if c == 0x0000 || c == 0xFFFF {
                    break 'fields;
                }
                chars.push(c);
            }
        }

        Self {
            ordinal: raw_ordinal & !LAST_LONG_ENTRY,
            is_last: raw_ordinal & LAST_LONG_ENTRY != 0,
            checksum: long_entry::CHECKSUM.get_u8(record),
            chars,
        }
    }
}

/// Build the long-name records for `name`, in storage order (highest ordinal first)
pub fn encode_long_name(name: &str, checksum: u8) -> Vec<[u8; DIR_ENTRY_SIZE]> {
    let utf16: Vec<u16> = name.encode_utf16().collect();
    let count = utf16.len().div_ceil(LONG_NAME_CHARS_PER_ENTRY);
    let mut records = Vec::with_capacity(count);

    for index in (0..count).rev() {
        let mut record = [0u8; DIR_ENTRY_SIZE];
        let mut ordinal = (index + 1) as u8;
        if index == count - 1 {
            ordinal |= LAST_LONG_ENTRY;
        }
        long_entry::ORDINAL.set(&mut record, ordinal as u32);
        long_entry::ATTRIBUTES.set(&mut record, LFN_ATTRIBUTE as u32);
        long_entry::CHECKSUM.set(&mut record, checksum as u32);

        let start = index * LONG_NAME_CHARS_PER_ENTRY;
        let chunk = &utf16[start..(start + LONG_NAME_CHARS_PER_ENTRY).min(utf16.len())];
        // Name, then one 0x0000 terminator if there is room, then 0xFFFF padding
        let units = (0..LONG_NAME_CHARS_PER_ENTRY).map(|i| match i.cmp(&chunk.len()) {
            std::cmp::Ordering::Less => chunk[i],
            std::cmp::Ordering::Equal => 0x0000,
            std::cmp::Ordering::Greater => 0xFFFF,
        });
        let slots = long_entry::NAME_FIELDS
            .iter()
            .flat_map(|f| (f.offset..f.end()).step_by(2));
        for (pos, unit) in slots.zip(units) {
            record[pos..pos + 2].copy_from_slice(&unit.to_le_bytes());
        }
        records.push(record);
    }
    records
}
