//! Error types for the fat-raw library

use std::fmt;
use std::io;

/// Result type for fat-raw operations
pub type Result<T> = std::result::Result<T, FatError>;

/// Main error type for fat-raw operations
#[derive(Debug)]
pub enum FatError {
    /// I/O error from the underlying block device
    Io(io::Error),

    /// Boot sector does not end with the 0x55 0xAA signature
    InvalidVolumeSignature,

    /// Volume is formatted as exFAT
    UnsupportedExFat,

    /// Boot sector decoded but describes an impossible geometry
    InvalidBootSector { message: String },

    /// FAT chain hit a free, reserved, bad or out-of-range value
    CorruptChain { cluster: u32, value: u32 },

    /// Write access requested on a read-only mount
    ReadOnlyFilesystem,

    /// Descriptor is not open, or not open in the required mode
    BadDescriptor { fd: usize },

    /// Unknown open flag string
    InvalidFlags { flags: String },

    /// File or directory not found
    NotFound { path: String },

    /// File already exists (exclusive create)
    AlreadyExists { path: String },

    /// A path component is not a directory
    NotADirectory { path: String },

    /// Operation not valid on a directory
    IsDirectory { path: String },

    /// DOS read-only attribute forbids the requested access
    AccessDenied { path: String },

    /// Long name contains a character FAT does not permit
    InvalidCharacter { name: String, character: char },

    /// Long name exceeds 255 UTF-16 code units
    NameTooLong { name: String, length: usize },

    /// Cluster chain or directory has no room and allocation is unsupported
    NoFreeSpace,

    /// File would grow beyond the 4 GiB FAT limit
    FileTooLarge,
}

impl fmt::Display for FatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::InvalidVolumeSignature => write!(f, "Invalid volume signature"),
            Self::UnsupportedExFat => write!(f, "exFAT volumes are not supported"),
            Self::InvalidBootSector { message } => write!(f, "Invalid boot sector: {}", message),
            Self::CorruptChain { cluster, value } => write!(
                f,
                "Corrupt cluster chain: cluster {} points to {:#x}",
                cluster, value
            ),
            Self::ReadOnlyFilesystem => write!(f, "Read-only filesystem"),
            Self::BadDescriptor { fd } => write!(f, "Bad file descriptor: {}", fd),
            Self::InvalidFlags { flags } => write!(f, "Invalid open flags '{}'", flags),
            Self::NotFound { path } => write!(f, "Not found: {}", path),
            Self::AlreadyExists { path } => write!(f, "Already exists: {}", path),
            Self::NotADirectory { path } => write!(f, "Not a directory: {}", path),
            Self::IsDirectory { path } => write!(f, "Is a directory: {}", path),
            Self::AccessDenied { path } => write!(f, "Access denied: {}", path),
            Self::InvalidCharacter { name, character } => {
                write!(f, "Invalid character {:?} in name '{}'", character, name)
            }
            Self::NameTooLong { name, length } => {
                write!(f, "Name too long ({} > 255): '{}'", length, name)
            }
            Self::NoFreeSpace => write!(f, "No free space available"),
            Self::FileTooLarge => write!(f, "File too large"),
        }
    }
}

impl std::error::Error for FatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for FatError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

// Convenience constructors
impl FatError {
    pub fn invalid_boot_sector(message: impl Into<String>) -> Self {
        Self::InvalidBootSector {
            message: message.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    pub fn is_directory(path: impl Into<String>) -> Self {
        Self::IsDirectory { path: path.into() }
    }

    pub fn access_denied(path: impl Into<String>) -> Self {
        Self::AccessDenied { path: path.into() }
    }

    pub fn invalid_flags(flags: impl Into<String>) -> Self {
        Self::InvalidFlags {
            flags: flags.into(),
        }
    }

    pub fn invalid_character(name: impl Into<String>, character: char) -> Self {
        Self::InvalidCharacter {
            name: name.into(),
            character,
        }
    }

    pub fn name_too_long(name: impl Into<String>, length: usize) -> Self {
        Self::NameTooLong {
            name: name.into(),
            length,
        }
    }

    /// Returns true for `NotFound`, handy for callers probing paths
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
