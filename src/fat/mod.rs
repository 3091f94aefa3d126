pub mod boot_sector;
pub mod chain;
pub mod dir_entry;
pub mod directory;
pub mod fat_table;
pub mod geometry;
pub mod layout;
pub mod names;
pub mod path;
pub mod time;
pub mod volume;

pub(crate) const DIR_ENTRY_SIZE: usize = 32;
pub(crate) const LFN_ATTRIBUTE: u8 = 0x0F;

pub use chain::Chain;
pub use dir_entry::ShortEntry;
pub use directory::DirItem;
pub use geometry::{FatType, VolumeGeometry};
pub use time::{FatDateTime, FixedTimeProvider, SystemTimeProvider, TimeProvider};
pub use volume::{EntryRef, EntryUpdate, FileStat, Lookup, Volume};
