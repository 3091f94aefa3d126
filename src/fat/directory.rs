//! Directory stream decoding and long-name reassembly

use crate::fat::dir_entry::{
    DELETED_ENTRY, END_OF_DIRECTORY, LongNameFragment, MAX_LONG_NAME_ENTRIES, ShortEntry,
};
use crate::fat::{DIR_ENTRY_SIZE, LFN_ATTRIBUTE};

/// Mask applied to the attribute byte before testing for a long-name record
const LFN_ATTRIBUTE_MASK: u8 = 0x3F;

/// A short entry together with the long name attached to it, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirItem {
    pub entry: ShortEntry,
    pub long_name: Option<String>,
    /// Byte position of the short record inside the directory
    pub offset: u64,
    /// Byte position of the first record belonging to this item
    /// (the first long-name fragment, or the short record itself)
    pub first_record: u64,
}

impl DirItem {
    /// Name shown to users: the long name when present, else "BASE.EXT"
    pub fn name(&self) -> String {
        match &self.long_name {
            Some(name) => name.clone(),
            None => self.entry.display_name(),
        }
    }

    /// Exact match on the long name, case-insensitive match on the short name
    pub fn matches(&self, name: &str) -> bool {
        if self.long_name.as_deref() == Some(name) {
            return true;
        }
        self.entry.display_name().eq_ignore_ascii_case(name)
    }

    pub fn is_dot_entry(&self) -> bool {
        self.entry.name[0] == b'.'
    }
}

/// Outcome of feeding one 32-byte record to the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// End-of-directory marker; nothing after it is meaningful
    End,
    /// Deleted slot
    Free,
    /// Long-name fragment absorbed into the accumulator
    Fragment,
    Item(DirItem),
}

struct LongNameRun {
    checksum: u8,
    /// Ordinal the next fragment must carry
    expected: u8,
    /// Fragments in storage order (highest ordinal first)
    parts: Vec<Vec<u16>>,
    first_record: u64,
}

impl LongNameRun {
    fn is_complete(&self) -> bool {
        self.expected == 0
    }

    fn text(&self) -> Option<String> {
        let units: Vec<u16> = self.parts.iter().rev().flatten().copied().collect();
        String::from_utf16(&units).ok()
    }
}

/// Incremental decoder over a directory's records. Feed records in order,
/// across sector and cluster boundaries.
#[derive(Default)]
pub struct DirectoryDecoder {
    run: Option<LongNameRun>,
}

impl DirectoryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the record found `offset` bytes into the directory
    pub fn feed(&mut self, record: &[u8], offset: u64) -> Record {
        match record[0] {
            END_OF_DIRECTORY => {
                self.run = None;
                return Record::End;
            }
            DELETED_ENTRY => {
                self.discard(offset, "deleted slot");
                return Record::Free;
            }
            _ => {}
        }

        if record[11] & LFN_ATTRIBUTE_MASK == LFN_ATTRIBUTE {
            self.feed_fragment(LongNameFragment::decode(record), offset);
            return Record::Fragment;
        }

        let entry = ShortEntry::decode(record);
        let (long_name, first_record) = match self.run.take() {
            Some(run) if run.is_complete() => {
                if run.checksum == entry.checksum() {
                    (run.text(), run.first_record)
                } else {
                    log::warn!(
                        "Long name at byte {} ignored: checksum {:#04x} does not match short entry {:?} ({:#04x})",
                        run.first_record,
                        run.checksum,
                        entry.display_name(),
                        entry.checksum()
                    );
                    (None, offset)
                }
            }
            Some(run) => {
                log::warn!(
                    "Incomplete long name at byte {} dropped before short entry {:?}",
                    run.first_record,
                    entry.display_name()
                );
                (None, offset)
            }
            None => (None, offset),
        };

        Record::Item(DirItem {
            entry,
            long_name,
            offset,
            first_record,
        })
    }

    fn feed_fragment(&mut self, fragment: LongNameFragment, offset: u64) {
        if fragment.ordinal == 0 || fragment.ordinal > MAX_LONG_NAME_ENTRIES {
            self.discard(offset, "ordinal out of range");
            return;
        }

        if fragment.is_last {
            self.discard(offset, "new long name started");
            self.run = Some(LongNameRun {
                checksum: fragment.checksum,
                expected: fragment.ordinal - 1,
                parts: vec![fragment.chars],
                first_record: offset,
            });
            return;
        }

        let in_sequence = matches!(
            &self.run,
            Some(run) if !run.is_complete()
                && run.checksum == fragment.checksum
                && run.expected == fragment.ordinal
        );
        if !in_sequence {
            self.discard(offset, "fragment out of sequence");
        } else if let Some(run) = self.run.as_mut() {
            run.expected -= 1;
            run.parts.push(fragment.chars);
        }
    }

    fn discard(&mut self, offset: u64, reason: &str) {
        if let Some(run) = self.run.take() {
            log::warn!(
                "Long name starting at byte {} discarded at byte {}: {}",
                run.first_record,
                offset,
                reason
            );
        }
    }
}

/// Decode every item in a buffer holding the start of a directory, stopping
/// at the end-of-directory marker.
pub fn parse_directory_entries(data: &[u8]) -> Vec<DirItem> {
    let mut decoder = DirectoryDecoder::new();
    let mut items = Vec::new();
    for (index, record) in data.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
        match decoder.feed(record, (index * DIR_ENTRY_SIZE) as u64) {
            Record::End => break,
            Record::Item(item) => items.push(item),
            Record::Free | Record::Fragment => {}
        }
    }
    items
}
