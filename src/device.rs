//! Raw block device access

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Byte-addressable volume the filesystem is mounted on.
///
/// A device that reports `is_writable() == false` yields a read-only mount.
pub trait BlockDevice {
    /// Read into `buf` starting at byte `pos`, returning the number of bytes read
    fn read_at(&mut self, buf: &mut [u8], pos: u64) -> io::Result<usize>;

    /// Write `buf` starting at byte `pos`, returning the number of bytes written
    fn write_at(&mut self, buf: &[u8], pos: u64) -> io::Result<usize>;

    fn is_writable(&self) -> bool;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read_exact_at(&mut self, mut buf: &mut [u8], mut pos: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, pos) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("device ended at byte {}", pos),
                    ));
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    pos += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn write_all_at(&mut self, mut buf: &[u8], mut pos: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write_at(buf, pos) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("device refused write at byte {}", pos),
                    ));
                }
                Ok(n) => {
                    buf = &buf[n..];
                    pos += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read_at(&mut self, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        (**self).read_at(buf, pos)
    }

    fn write_at(&mut self, buf: &[u8], pos: u64) -> io::Result<usize> {
        (**self).write_at(buf, pos)
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Block device over any seekable std stream: an image file, a raw device
/// node, or an in-memory `Cursor<Vec<u8>>`.
#[derive(Debug)]
pub struct IoDevice<T> {
    inner: T,
    writable: bool,
}

impl<T: Read + Write + Seek> IoDevice<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            writable: true,
        }
    }

    pub fn read_only(inner: T) -> Self {
        Self {
            inner,
            writable: false,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl IoDevice<File> {
    /// Open an image file or device node
    pub fn open<P: AsRef<Path>>(path: P, writable: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path.as_ref())?;
        log::debug!(
            "Opened device {} ({})",
            path.as_ref().display(),
            if writable { "read-write" } else { "read-only" }
        );
        Ok(Self {
            inner: file,
            writable,
        })
    }
}

impl<T: Read + Write + Seek> BlockDevice for IoDevice<T> {
    fn read_at(&mut self, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        // Always seek first: callers interleave reads and writes at arbitrary offsets
        self.inner.seek(SeekFrom::Start(pos))?;
        self.inner.read(buf)
    }

    fn write_at(&mut self, buf: &[u8], pos: u64) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "device is read-only",
            ));
        }
        self.inner.seek(SeekFrom::Start(pos))?;
        self.inner.write(buf)
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
