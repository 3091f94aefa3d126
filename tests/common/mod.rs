//! Shared image builders and device wrappers for the integration tests

#![allow(dead_code)]

use std::io::{self, Cursor, Read, Write};
use std::ops::Range;

use fat_raw::{BlockDevice, FatDateTime, FileSystem, IoDevice, MountOptions};

pub type MemDevice = IoDevice<Cursor<Vec<u8>>>;

pub const HELLO_CONTENTS: &[u8] = b"Hello, FAT12!\n";
pub const LONG_NAME: &str = "A long file name.txt";
pub const LONG_SIZE: usize = 1300;
pub const README_CONTENTS: &[u8] = b"# Docs\nRead me first.\n";
pub const LOCKED_CONTENTS: &[u8] = b"locked";

/// 2020-05-17 12:30:10, stamped on every hand-built entry
pub const STAMP_DATE: u16 = (40 << 9) | (5 << 5) | 17;
pub const STAMP_TIME: u16 = (12 << 11) | (30 << 5) | 5;

pub fn stamp() -> FatDateTime {
    FatDateTime {
        year: 2020,
        month: 5,
        day: 17,
        hour: 12,
        minute: 30,
        second: 10,
        millis: 0,
    }
}

pub fn fixed_time() -> FatDateTime {
    FatDateTime {
        year: 2024,
        month: 3,
        day: 5,
        hour: 10,
        minute: 20,
        second: 30,
        millis: 0,
    }
}

pub fn long_contents() -> Vec<u8> {
    (0..LONG_SIZE).map(|i| (i % 251) as u8).collect()
}

/// Geometry of a hand-built FAT12 image (1 reserved sector, 2 FATs,
/// 1 sector per cluster)
#[derive(Debug, Clone, Copy)]
pub struct Fat12Layout {
    pub bytes_per_sector: usize,
    pub total_sectors: usize,
    pub fat_sectors: usize,
    pub root_entries: usize,
}

impl Fat12Layout {
    /// 1.44 MB floppy
    pub const FLOPPY: Self = Self {
        bytes_per_sector: 512,
        total_sectors: 2880,
        fat_sectors: 9,
        root_entries: 224,
    };

    /// Same capacity with 1024-byte sectors
    pub const LARGE_SECTOR: Self = Self {
        bytes_per_sector: 1024,
        total_sectors: 1440,
        fat_sectors: 3,
        root_entries: 224,
    };

    pub fn root_sectors(&self) -> usize {
        (self.root_entries * 32).div_ceil(self.bytes_per_sector)
    }

    pub fn root_offset(&self) -> usize {
        (1 + 2 * self.fat_sectors) * self.bytes_per_sector
    }

    pub fn first_data_sector(&self) -> usize {
        1 + 2 * self.fat_sectors + self.root_sectors()
    }

    pub fn cluster_offset(&self, cluster: u32) -> usize {
        (self.first_data_sector() + cluster as usize - 2) * self.bytes_per_sector
    }

    pub fn fat_offset(&self, copy: usize) -> usize {
        (1 + copy * self.fat_sectors) * self.bytes_per_sector
    }
}

/// Clusters used by the hand-built FAT12 image
pub const HELLO_CLUSTER: u32 = 2;
pub const LONG_CHAIN: [u32; 3] = [3, 4, 341];
pub const DOCS_CLUSTER: u32 = 6;
pub const README_CLUSTER: u32 = 7;
pub const LOCKED_CLUSTER: u32 = 8;

/// Root directory slot of HELLO.TXT
pub const HELLO_SLOT: usize = 2;

pub fn short_record(name: &[u8; 11], attributes: u8, cluster: u32, size: u32) -> [u8; 32] {
    let mut r = [0u8; 32];
    r[..11].copy_from_slice(name);
    r[11] = attributes;
    r[14..16].copy_from_slice(&STAMP_TIME.to_le_bytes());
    r[16..18].copy_from_slice(&STAMP_DATE.to_le_bytes());
    r[18..20].copy_from_slice(&STAMP_DATE.to_le_bytes());
    r[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    r[22..24].copy_from_slice(&STAMP_TIME.to_le_bytes());
    r[24..26].copy_from_slice(&STAMP_DATE.to_le_bytes());
    r[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    r[28..32].copy_from_slice(&size.to_le_bytes());
    r
}

/// Long-name records for `name`, in on-disk order, bound to `short`
pub fn lfn_records(name: &str, short: &[u8; 11]) -> Vec<[u8; 32]> {
    const SLOTS: [usize; 13] = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];
    let checksum = short
        .iter()
        .fold(0u8, |sum, &b| sum.rotate_right(1).wrapping_add(b));
    let mut units: Vec<u16> = name.encode_utf16().collect();
    if units.len() % 13 != 0 {
        units.push(0);
        while units.len() % 13 != 0 {
            units.push(0xFFFF);
        }
    }
    let count = units.len() / 13;
    (0..count)
        .rev()
        .map(|i| {
            let mut r = [0u8; 32];
            r[0] = (i + 1) as u8 | if i + 1 == count { 0x40 } else { 0 };
            r[11] = 0x0F;
            r[13] = checksum;
            for (j, unit) in units[i * 13..(i + 1) * 13].iter().enumerate() {
                r[SLOTS[j]..SLOTS[j] + 2].copy_from_slice(&unit.to_le_bytes());
            }
            r
        })
        .collect()
}

pub fn set_fat12(fat: &mut [u8], cluster: u32, value: u16) {
    let offset = (cluster + cluster / 2) as usize;
    if cluster % 2 == 0 {
        fat[offset] = value as u8;
        fat[offset + 1] = (fat[offset + 1] & 0xF0) | ((value >> 8) as u8 & 0x0F);
    } else {
        fat[offset] = (fat[offset] & 0x0F) | ((value as u8 & 0x0F) << 4);
        fat[offset + 1] = (value >> 4) as u8;
    }
}

/// Write a FAT12 entry into both FAT copies of an image
pub fn patch_fat12(image: &mut [u8], layout: Fat12Layout, cluster: u32, value: u16) {
    for copy in 0..2 {
        let start = layout.fat_offset(copy);
        let end = start + layout.fat_sectors * layout.bytes_per_sector;
        set_fat12(&mut image[start..end], cluster, value);
    }
}

fn put_records(image: &mut [u8], offset: usize, records: &[[u8; 32]]) {
    for (i, record) in records.iter().enumerate() {
        image[offset + i * 32..offset + (i + 1) * 32].copy_from_slice(record);
    }
}

/// Hand-assembled FAT12 volume:
///
/// ```text
/// /                     label TESTVOL, one deleted slot
/// /HELLO.TXT            cluster 2, no archive bit
/// /A long file name.txt clusters 3 -> 4 -> 341 (FAT entry 341 straddles a sector)
/// /DOCS/readme.md       cluster 7
/// /LOCKED.TXT           read-only, cluster 8
/// /EMPTY.TXT            no clusters
/// ```
pub fn fat12_image_with(layout: Fat12Layout) -> Vec<u8> {
    let bps = layout.bytes_per_sector;
    let mut image = vec![0u8; layout.total_sectors * bps];

    let boot = &mut image[..bps];
    boot[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
    boot[3..11].copy_from_slice(b"MSWIN4.1");
    boot[11..13].copy_from_slice(&(bps as u16).to_le_bytes());
    boot[13] = 1;
    boot[14..16].copy_from_slice(&1u16.to_le_bytes());
    boot[16] = 2;
    boot[17..19].copy_from_slice(&(layout.root_entries as u16).to_le_bytes());
    boot[19..21].copy_from_slice(&(layout.total_sectors as u16).to_le_bytes());
    boot[21] = 0xF0;
    boot[22..24].copy_from_slice(&(layout.fat_sectors as u16).to_le_bytes());
    boot[24..26].copy_from_slice(&18u16.to_le_bytes());
    boot[26..28].copy_from_slice(&2u16.to_le_bytes());
    boot[38] = 0x29;
    boot[39..43].copy_from_slice(&0x1234_5678u32.to_le_bytes());
    boot[43..54].copy_from_slice(b"TESTVOL    ");
    boot[54..62].copy_from_slice(b"FAT12   ");
    boot[510] = 0x55;
    boot[511] = 0xAA;

    let mut fat = vec![0u8; layout.fat_sectors * bps];
    set_fat12(&mut fat, 0, 0xFF0);
    set_fat12(&mut fat, 1, 0xFFF);
    set_fat12(&mut fat, HELLO_CLUSTER, 0xFFF);
    set_fat12(&mut fat, LONG_CHAIN[0], LONG_CHAIN[1] as u16);
    set_fat12(&mut fat, LONG_CHAIN[1], LONG_CHAIN[2] as u16);
    set_fat12(&mut fat, LONG_CHAIN[2], 0xFFF);
    set_fat12(&mut fat, DOCS_CLUSTER, 0xFFF);
    set_fat12(&mut fat, README_CLUSTER, 0xFFF);
    set_fat12(&mut fat, LOCKED_CLUSTER, 0xFFF);
    for copy in 0..2 {
        let start = layout.fat_offset(copy);
        image[start..start + fat.len()].copy_from_slice(&fat);
    }

    let long_short = *b"ALONGF~1TXT";
    let mut deleted = short_record(b"OLD     TXT", 0x20, 0, 0);
    deleted[0] = 0xE5;
    let mut root = vec![
        short_record(b"TESTVOL    ", 0x08, 0, 0),
        deleted,
        short_record(b"HELLO   TXT", 0x00, HELLO_CLUSTER, HELLO_CONTENTS.len() as u32),
    ];
    root.extend(lfn_records(LONG_NAME, &long_short));
    root.push(short_record(&long_short, 0x20, LONG_CHAIN[0], LONG_SIZE as u32));
    root.push(short_record(b"DOCS       ", 0x10, DOCS_CLUSTER, 0));
    root.push(short_record(
        b"LOCKED  TXT",
        0x21,
        LOCKED_CLUSTER,
        LOCKED_CONTENTS.len() as u32,
    ));
    root.push(short_record(b"EMPTY   TXT", 0x20, 0, 0));
    put_records(&mut image, layout.root_offset(), &root);

    let readme_short = *b"README  MD ";
    let mut docs = vec![
        short_record(b".          ", 0x10, DOCS_CLUSTER, 0),
        short_record(b"..         ", 0x10, 0, 0),
    ];
    docs.extend(lfn_records("readme.md", &readme_short));
    docs.push(short_record(
        &readme_short,
        0x20,
        README_CLUSTER,
        README_CONTENTS.len() as u32,
    ));
    put_records(&mut image, layout.cluster_offset(DOCS_CLUSTER), &docs);

    let mut put_data = |cluster: u32, data: &[u8]| {
        let start = layout.cluster_offset(cluster);
        image[start..start + data.len()].copy_from_slice(data);
    };
    put_data(HELLO_CLUSTER, HELLO_CONTENTS);
    put_data(README_CLUSTER, README_CONTENTS);
    put_data(LOCKED_CLUSTER, LOCKED_CONTENTS);
    let long = long_contents();
    for (i, cluster) in LONG_CHAIN.iter().enumerate() {
        let start = (i * bps).min(long.len());
        let end = ((i + 1) * bps).min(long.len());
        put_data(*cluster, &long[start..end]);
    }

    image
}

pub fn fat12_image() -> Vec<u8> {
    fat12_image_with(Fat12Layout::FLOPPY)
}

pub fn mount_read_only(image: Vec<u8>) -> FileSystem<MemDevice> {
    FileSystem::mount(IoDevice::read_only(Cursor::new(image)), MountOptions::new())
        .expect("mount failed")
}

pub fn mount_writable(image: Vec<u8>, options: MountOptions) -> FileSystem<MemDevice> {
    let mut fs =
        FileSystem::mount(IoDevice::new(Cursor::new(image)), options).expect("mount failed");
    fs.set_time_provider(fat_raw::FixedTimeProvider(fixed_time()));
    fs
}

pub fn unmount_image(fs: FileSystem<MemDevice>) -> Vec<u8> {
    fs.unmount().expect("unmount failed").into_inner().into_inner()
}

/// What to put on a fatfs-formatted image
pub enum Node<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8]),
}

/// Format an in-memory image with fatfs and populate it
pub fn fatfs_image(fat_type: fatfs::FatType, size: usize, nodes: &[Node]) -> Vec<u8> {
    let mut cursor = Cursor::new(vec![0u8; size]);
    fatfs::format_volume(
        &mut cursor,
        fatfs::FormatVolumeOptions::new().fat_type(fat_type),
    )
    .expect("format_volume failed");
    {
        let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new())
            .expect("FileSystem::new failed");
        let root = fs.root_dir();
        for node in nodes {
            match node {
                Node::Dir(path) => {
                    root.create_dir(path).expect("create_dir failed");
                }
                Node::File(path, content) => {
                    let mut f = root.create_file(path).expect("create_file failed");
                    f.truncate().unwrap();
                    f.write_all(content).unwrap();
                }
            }
        }
    }
    cursor.into_inner()
}

/// 32 MB FAT16 image (2 KB clusters)
pub fn fat16_image(nodes: &[Node]) -> Vec<u8> {
    fatfs_image(fatfs::FatType::Fat16, 32 * 1024 * 1024, nodes)
}

/// 40 MB FAT32 image (512-byte clusters)
pub fn fat32_image(nodes: &[Node]) -> Vec<u8> {
    fatfs_image(fatfs::FatType::Fat32, 40 * 1024 * 1024, nodes)
}

/// Read a file back through fatfs
pub fn fatfs_read(image: &mut Vec<u8>, path: &str) -> Vec<u8> {
    let mut cursor = Cursor::new(image);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let mut f = fs.root_dir().open_file(path).unwrap();
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).unwrap();
    buf
}

/// Long names of the entries of a directory, as fatfs sees them
pub fn fatfs_list(image: &mut Vec<u8>, dir: &str) -> Vec<(String, u64)> {
    let mut cursor = Cursor::new(image);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let root = fs.root_dir();
    let dir = if dir.is_empty() {
        root
    } else {
        root.open_dir(dir).unwrap()
    };
    dir.iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_name() != "." && e.file_name() != "..")
        .map(|e| (e.file_name(), e.len()))
        .collect()
}

/// Device wrapper that fails any read or write touching a byte range and
/// counts flushes
pub struct FaultyDevice<D> {
    pub inner: D,
    pub fail_reads: Option<Range<u64>>,
    pub fail_writes: Option<Range<u64>>,
    pub flushes: usize,
}

impl<D> FaultyDevice<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            fail_reads: None,
            fail_writes: None,
            flushes: 0,
        }
    }
}

fn overlaps(range: &Option<Range<u64>>, pos: u64, len: usize) -> bool {
    match range {
        Some(r) => pos < r.end && pos + len as u64 > r.start,
        None => false,
    }
}

impl<D: BlockDevice> BlockDevice for FaultyDevice<D> {
    fn read_at(&mut self, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        if overlaps(&self.fail_reads, pos, buf.len()) {
            return Err(io::Error::other(format!("injected read fault at byte {}", pos)));
        }
        self.inner.read_at(buf, pos)
    }

    fn write_at(&mut self, buf: &[u8], pos: u64) -> io::Result<usize> {
        if overlaps(&self.fail_writes, pos, buf.len()) {
            return Err(io::Error::other(format!("injected write fault at byte {}", pos)));
        }
        self.inner.write_at(buf, pos)
    }

    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        self.inner.flush()
    }
}
