//! POSIX-style file access on a mounted volume

pub mod descriptor;
pub mod flags;

use crate::device::BlockDevice;
use crate::error::{FatError, Result};
use crate::fat::{
    Chain, EntryUpdate, FatType, FileStat, Lookup, SystemTimeProvider, TimeProvider, Volume,
    VolumeGeometry,
};

pub use descriptor::{FIRST_DESCRIPTOR, FileDescriptor, OpenFileTable};
pub use flags::OpenFlags;

/// Mount-time settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MountOptions {
    /// Refuse writes even when the device accepts them
    pub read_only: bool,
    /// Do not update access dates on read
    pub noatime: bool,
    /// Flush the device after every write
    pub sync_on_write: bool,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn noatime(mut self, noatime: bool) -> Self {
        self.noatime = noatime;
        self
    }

    pub fn sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }
}

/// A mounted volume plus its open-file table.
///
/// Every operation borrows the filesystem mutably, so operations on one
/// volume never interleave. Wrap it in a `Mutex` to share it between threads.
pub struct FileSystem<D: BlockDevice> {
    volume: Volume<D>,
    files: OpenFileTable,
    options: MountOptions,
    clock: Box<dyn TimeProvider + Send>,
}

impl<D: BlockDevice> FileSystem<D> {
    pub fn mount(device: D, options: MountOptions) -> Result<Self> {
        let mut volume = Volume::mount(device)?;
        if options.read_only {
            volume.set_read_only();
        }
        volume.set_sync_on_write(options.sync_on_write);
        if !volume.is_writable() {
            log::info!("Volume mounted read-only");
        }
        Ok(Self {
            volume,
            files: OpenFileTable::new(),
            options,
            clock: Box::new(SystemTimeProvider),
        })
    }

    /// Replace the clock used for timestamps
    pub fn set_time_provider(&mut self, clock: impl TimeProvider + Send + 'static) {
        self.clock = Box::new(clock);
    }

    pub fn options(&self) -> MountOptions {
        self.options
    }

    pub fn is_read_only(&self) -> bool {
        !self.volume.is_writable()
    }

    pub fn fat_type(&self) -> FatType {
        self.volume.fat_type()
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        self.volume.geometry()
    }

    pub fn volume(&mut self) -> &mut Volume<D> {
        &mut self.volume
    }

    /// List a directory without opening it
    pub fn read_dir(&mut self, path: &str) -> Result<Vec<FileStat>> {
        self.volume.list_directory(path)
    }

    /// Open `path` with a mode string such as `"r"`, `"r+"`, `"w"` or `"a+"`
    pub fn open(&mut self, path: &str, mode: &str) -> Result<usize> {
        let flags = OpenFlags::parse(mode)?;
        self.open_with(path, flags)
    }

    pub fn open_with(&mut self, path: &str, flags: OpenFlags) -> Result<usize> {
        if flags.requires_write() && self.is_read_only() {
            return Err(FatError::ReadOnlyFilesystem);
        }

        let (stats, chain) = match self.volume.entry_for_path(path)? {
            Lookup::Found { stat, chain } => {
                if flags.create && flags.exclusive {
                    return Err(FatError::already_exists(path));
                }
                if flags.requires_write() && stat.is_directory() {
                    return Err(FatError::is_directory(path));
                }
                if flags.requires_write() && stat.is_read_only() {
                    return Err(FatError::access_denied(path));
                }
                (stat, chain)
            }
            Lookup::Missing { parent, name, .. } => {
                if !flags.create {
                    return Err(FatError::not_found(path));
                }
                let now = self.clock.now();
                self.volume.add_file(&parent, &name, now)?
            }
        };

        let mut descriptor = FileDescriptor {
            path: path.to_string(),
            flags,
            stats,
            chain,
            position: 0,
        };
        if flags.truncate && descriptor.stats.size > 0 {
            self.truncate(&mut descriptor)?;
        }
        Ok(self.files.insert(descriptor))
    }

    /// Set the size to zero. Clusters stay allocated for later writes.
    fn truncate(&mut self, descriptor: &mut FileDescriptor) -> Result<()> {
        let now = self.clock.now();
        let update = EntryUpdate {
            size: Some(0),
            archive: Some(true),
            modified: Some(now),
            accessed: Some(now),
            ..EntryUpdate::default()
        };
        if let Some(entry) = descriptor.stats.entry {
            self.volume.update_entry(&entry, &update)?;
        }
        log::debug!(
            "Truncated {:?} from {} bytes",
            descriptor.path,
            descriptor.stats.size
        );
        descriptor.stats.apply(&update);
        Ok(())
    }

    /// Read into `buf` at `position`, or at the cursor when `None`.
    /// Returns the number of bytes read; 0 at end of file.
    pub fn read(&mut self, fd: usize, buf: &mut [u8], position: Option<u64>) -> Result<usize> {
        let descriptor = self.files.get(fd)?;
        if !descriptor.flags.read {
            return Err(FatError::BadDescriptor { fd });
        }
        if descriptor.stats.is_directory() {
            return Err(FatError::is_directory(descriptor.path.clone()));
        }
        let chain = descriptor.chain;
        let start = position.unwrap_or(descriptor.position);
        let available = (descriptor.stats.size as u64).saturating_sub(start);
        let len = (buf.len() as u64).min(available) as usize;

        let n = if len == 0 {
            0
        } else {
            self.volume.read_from_position(&chain, start, &mut buf[..len])?
        };

        let descriptor = self.files.get_mut(fd)?;
        descriptor.position = start + n as u64;

        if !self.options.noatime && self.volume.is_writable() {
            let now = self.clock.now();
            let today = now.encode_date();
            let stale = descriptor
                .stats
                .accessed
                .is_none_or(|t| t.encode_date() != today);
            if let (true, Some(entry)) = (stale, descriptor.stats.entry) {
                let update = EntryUpdate {
                    accessed: Some(now),
                    ..EntryUpdate::default()
                };
                self.volume.update_entry(&entry, &update)?;
                descriptor.stats.apply(&update);
            }
        }
        Ok(n)
    }

    /// Write `buf` at `position`, or at the cursor when `None`. Descriptors
    /// opened for append always write at the end of the file.
    ///
    /// The entry's size, archive bit and timestamps are updated even when the
    /// data write fails; the data error is reported first.
    pub fn write(&mut self, fd: usize, buf: &[u8], position: Option<u64>) -> Result<usize> {
        let descriptor = self.files.get(fd)?;
        if !descriptor.flags.write {
            return Err(FatError::BadDescriptor { fd });
        }
        let chain = descriptor.chain;
        let size = descriptor.stats.size as u64;
        let start = if descriptor.flags.append {
            size
        } else {
            position.unwrap_or(descriptor.position)
        };
        let end = start
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= u32::MAX as u64)
            .ok_or(FatError::FileTooLarge)?;
        let entry = descriptor.stats.entry;

        let written = self.write_data(&chain, size, start, buf);

        let now = self.clock.now();
        let update = EntryUpdate {
            size: written.is_ok().then_some(size.max(end) as u32),
            archive: Some(true),
            modified: Some(now),
            accessed: Some(now),
            ..EntryUpdate::default()
        };
        let updated = match entry {
            Some(entry) => self.volume.update_entry(&entry, &update),
            None => Ok(()),
        };

        let descriptor = self.files.get_mut(fd)?;
        if written.is_ok() {
            descriptor.position = end;
        }
        if updated.is_ok() {
            descriptor.stats.apply(&update);
        }
        written?;
        updated?;
        Ok(buf.len())
    }

    fn write_data(&mut self, chain: &Chain, size: u64, start: u64, buf: &[u8]) -> Result<()> {
        if start > size {
            log::debug!("Zero-filling {} bytes before offset {}", start - size, start);
            // One cluster at a time; a gap past the chain fails on its first piece
            let piece = self.volume.geometry().cluster_size() as u64;
            let zeros = vec![0u8; piece.min(start - size) as usize];
            let mut at = size;
            while at < start {
                let n = (start - at).min(piece) as usize;
                self.volume.write_to_position(chain, at, &zeros[..n])?;
                at += n as u64;
            }
        }
        if buf.is_empty() {
            return Ok(());
        }
        self.volume.write_to_position(chain, start, buf)
    }

    pub fn close(&mut self, fd: usize) -> Result<()> {
        self.files.remove(fd).map(|_| ())
    }

    /// Metadata cached in the descriptor; the directory is not re-read
    pub fn fstat(&self, fd: usize) -> Result<FileStat> {
        Ok(self.files.get(fd)?.stats.clone())
    }

    pub fn stat(&mut self, path: &str) -> Result<FileStat> {
        self.with_descriptor(path, OpenFlags::READ, |fs, fd| fs.fstat(fd))
    }

    /// Whole contents of a file
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        self.with_descriptor(path, OpenFlags::READ, |fs, fd| {
            let stats = fs.fstat(fd)?;
            if stats.is_directory() {
                return Err(FatError::is_directory(path));
            }
            let size = stats.size as usize;
            let mut data = vec![0u8; size];
            let mut filled = 0;
            while filled < size {
                let n = fs.read(fd, &mut data[filled..], None)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            data.truncate(filled);
            Ok(data)
        })
    }

    /// Replace the contents of a file, creating it if needed
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.write_file_with(path, data, "w")
    }

    /// `write_file` with an explicit mode, e.g. `"a"` to append
    pub fn write_file_with(&mut self, path: &str, data: &[u8], mode: &str) -> Result<()> {
        let flags = OpenFlags::parse(mode)?;
        self.with_descriptor(path, flags, |fs, fd| fs.write(fd, data, None).map(|_| ()))
    }

    /// Open, run `op`, then close whatever `op` returned
    fn with_descriptor<T>(
        &mut self,
        path: &str,
        flags: OpenFlags,
        op: impl FnOnce(&mut Self, usize) -> Result<T>,
    ) -> Result<T> {
        let fd = self.open_with(path, flags)?;
        let result = op(self, fd);
        if let Err(e) = self.close(fd) {
            log::warn!("Closing fd {} for {:?} failed: {}", fd, path, e);
        }
        result
    }

    pub fn is_open(&self, fd: usize) -> bool {
        self.files.contains(fd)
    }

    pub fn open_descriptors(&self) -> Vec<usize> {
        self.files.descriptors()
    }

    /// Flush the device and hand it back. Open descriptors are dropped.
    pub fn unmount(mut self) -> Result<D> {
        if !self.files.is_empty() {
            log::warn!(
                "Unmounting with {} open descriptor(s): {:?}",
                self.files.len(),
                self.files.descriptors()
            );
        }
        if self.volume.is_writable() {
            self.volume.device_mut().flush()?;
        }
        log::info!("Volume unmounted");
        Ok(self.volume.into_device())
    }
}
