//! fat-raw: FAT12/FAT16/FAT32 on raw block devices, with POSIX-style file access

pub mod device;
pub mod error;
pub mod fat;
pub mod fs;

// Re-export main types
pub use device::{BlockDevice, IoDevice};
pub use error::{FatError, Result};
pub use fat::{
    Chain, EntryRef, EntryUpdate, FatDateTime, FatType, FileStat, FixedTimeProvider, Lookup,
    SystemTimeProvider, TimeProvider, Volume, VolumeGeometry,
};
pub use fs::{FileSystem, MountOptions, OpenFlags};
