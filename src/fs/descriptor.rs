//! Open-file table

use crate::error::{FatError, Result};
use crate::fat::{Chain, FileStat};
use crate::fs::flags::OpenFlags;

/// Descriptors below this number are never handed out
pub const FIRST_DESCRIPTOR: usize = 3;

/// State of one open file
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub path: String,
    pub flags: OpenFlags,
    /// Entry snapshot taken at open, kept current by this descriptor's writes
    pub stats: FileStat,
    pub chain: Chain,
    /// Cursor used when a read or write has no explicit position
    pub position: u64,
}

/// Slots indexed by descriptor number; `None` is a free slot
#[derive(Debug, Default)]
pub struct OpenFileTable {
    slots: Vec<Option<FileDescriptor>>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `descriptor` in the lowest free slot and return its number
    pub fn insert(&mut self, descriptor: FileDescriptor) -> usize {
        let free = self
            .slots
            .iter()
            .enumerate()
            .skip(FIRST_DESCRIPTOR)
            .find(|(_, slot)| slot.is_none())
            .map(|(fd, _)| fd);
        let fd = match free {
            Some(fd) => fd,
            None => {
                let fd = self.slots.len().max(FIRST_DESCRIPTOR);
                self.slots.resize_with(fd + 1, || None);
                fd
            }
        };
        log::debug!("fd {} -> {:?} ({})", fd, descriptor.path, descriptor.flags);
        self.slots[fd] = Some(descriptor);
        fd
    }

    pub fn get(&self, fd: usize) -> Result<&FileDescriptor> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(FatError::BadDescriptor { fd })
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut FileDescriptor> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(FatError::BadDescriptor { fd })
    }

    pub fn remove(&mut self, fd: usize) -> Result<FileDescriptor> {
        let descriptor = self
            .slots
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(FatError::BadDescriptor { fd })?;
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        log::debug!("fd {} released ({:?})", fd, descriptor.path);
        Ok(descriptor)
    }

    pub fn contains(&self, fd: usize) -> bool {
        self.get(fd).is_ok()
    }

    /// Open descriptor numbers in ascending order
    pub fn descriptors(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(fd, _)| fd)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
