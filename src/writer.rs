//! Volume writer: lays out sectors, then walks the directory tree to emit
//! the MBR, boot sector, FSInfo/backup sectors, FAT copies, and file data.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace, warn};

use crate::error::Result;
use crate::host::{self, HostFile};
use crate::options::Options;
use crate::pack;
use crate::sizing::Layout;
use crate::tree::{DirEntry, DirTree, ATTR_DIRECTORY};

const EOC: u32 = 0x0FFF_FFFF;

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

fn extend_fat(fat: &mut Vec<u32>, upto_index: usize) {
    if fat.len() <= upto_index {
        fat.resize(upto_index + 1, 0);
    }
}

fn write_chain(fat: &mut Vec<u32>, first_cluster: u32, num_clusters: u32) {
    let first = first_cluster as usize;
    let n = num_clusters as usize;
    extend_fat(fat, first + n - 1);
    for i in 0..n {
        fat[first + i] = if i + 1 < n {
            first_cluster + i as u32 + 1
        } else {
            EOC
        };
    }
}

fn lba_to_chs(lba: u64, sectors_per_track: u64, heads: u64) -> (u64, u64, u64) {
    let sector = lba % sectors_per_track + 1;
    let head = (lba / sectors_per_track) % heads;
    let cyl = (lba / sectors_per_track) / heads;
    (sector, head, cyl)
}

fn chs_sector_byte(sector: u64, cyl: u64) -> u8 {
    ((sector & 0x3F) | (((cyl >> 8) & 0x3) << 6)) as u8
}

fn write_mbr(file: &mut File, layout: &Layout, opts: &Options) -> Result<()> {
    let mut mbr = [0u8; 512];
    let lba_first = layout.boot_sector;
    let lba_last = layout.end_of_volume - 1;
    let sectors_per_track = opts.sectors_per_track as u64;
    let heads = opts.num_heads as u64;

    let part_type: u8 = match layout.fat_width {
        12 => 0x01,
        16 => {
            if layout.end_of_volume - layout.boot_sector >= 65536 {
                0x06
            } else {
                0x04
            }
        }
        32 => 0x0C,
        w => unreachable!("unsupported FAT width {w}"),
    };

    let (s0, h0, c0) = lba_to_chs(lba_first, sectors_per_track, heads);
    let (s1, h1, c1) = lba_to_chs(lba_last, sectors_per_track, heads);

    let rec = &mut mbr[0x1BE..0x1BE + 16];
    rec[0] = 0x00;
    rec[1] = h0 as u8;
    rec[2] = chs_sector_byte(s0, c0);
    rec[3] = (c0 & 0xFF) as u8;
    rec[4] = part_type;
    rec[5] = h1 as u8;
    rec[6] = chs_sector_byte(s1, c1);
    rec[7] = (c1 & 0xFF) as u8;
    pack::write_uint(&mut rec[8..12], lba_first);
    pack::write_uint(&mut rec[12..16], lba_last + 1 - lba_first);

    mbr[510] = 0x55;
    mbr[511] = 0xAA;

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&mbr)?;
    Ok(())
}

fn fat_type_label(fat_width: u8) -> &'static [u8] {
    match fat_width {
        12 => b"FAT12   ",
        16 => b"FAT16   ",
        32 => b"FAT32   ",
        _ => unreachable!(),
    }
}

fn synthesize_boot_sector(opts: &Options) -> Vec<u8> {
    let mut buf = vec![0u8; opts.sector_size as usize];
    buf[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    buf[0x5A..0x5C].copy_from_slice(&[0xEB, 0xFE]);
    if opts.sector_size as usize >= 512 {
        buf[0x1FE] = 0x55;
        buf[0x1FF] = 0xAA;
    }
    buf
}

fn load_boot_record(path: &Path, sector_size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; sector_size];
    let mut src = host::open_sequential(path)?;
    let mut filled = 0;
    loop {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == sector_size {
            break;
        }
    }
    Ok(buf)
}

fn build_boot_sector(layout: &Layout, opts: &Options, root_cluster: u32, serial: u32) -> Result<Vec<u8>> {
    let mut buf = match &opts.boot_record {
        Some(path) => load_boot_record(path, opts.sector_size as usize)?,
        None => synthesize_boot_sector(opts),
    };

    pack::write_string(&mut buf[3..11], opts.oem_name.as_bytes());
    pack::write_uint(&mut buf[0x0B..0x0D], opts.sector_size as u64);
    buf[0x0D] = layout.sectors_per_cluster as u8;
    pack::write_uint(&mut buf[0x0E..0x10], layout.reserved_sectors);
    buf[0x10] = opts.num_fats as u8;

    let root_dir_entries = if layout.fat_width == 32 {
        0
    } else {
        (layout.first_data_sector - layout.root_dir_sector) * opts.sector_size as u64 / 32
    };
    pack::write_uint(&mut buf[0x11..0x13], root_dir_entries);

    let total_sectors = layout.end_of_volume - layout.boot_sector;
    let small_count = if total_sectors >= 65535 { 0 } else { total_sectors };
    pack::write_uint(&mut buf[0x13..0x15], small_count);
    buf[0x15] = opts.media_desc;
    pack::write_uint(
        &mut buf[0x16..0x18],
        if layout.fat_width == 32 { 0 } else { layout.fat_sectors },
    );
    pack::write_uint(&mut buf[0x18..0x1A], opts.sectors_per_track as u64);
    pack::write_uint(&mut buf[0x1A..0x1C], opts.num_heads as u64);
    pack::write_uint(&mut buf[0x1C..0x20], layout.boot_sector);
    pack::write_uint(
        &mut buf[0x20..0x24],
        if small_count == 0 { total_sectors } else { 0 },
    );

    let ext = if layout.fat_width == 32 {
        pack::write_uint(&mut buf[0x24..0x28], layout.fat_sectors);
        buf[0x28..0x2B].fill(0);
        pack::write_uint(&mut buf[0x2C..0x30], root_cluster as u64);
        pack::write_uint(&mut buf[0x30..0x32], 1);
        pack::write_uint(&mut buf[0x32..0x34], 6);
        buf[0x34..0x40].fill(0);
        0x40
    } else {
        0x24
    };

    buf[ext] = if opts.partitioned { 0x80 } else { 0x00 };
    buf[ext + 1] = 0;
    buf[ext + 2] = 0x29;
    pack::write_uint(&mut buf[ext + 3..ext + 7], serial as u64);
    pack::write_string(&mut buf[ext + 7..ext + 18], opts.label.as_bytes());
    buf[ext + 18..ext + 26].copy_from_slice(fat_type_label(layout.fat_width));

    Ok(buf)
}

fn build_fsinfo(layout: &Layout, opts: &Options, fat_len: u64) -> Vec<u8> {
    let mut buf = vec![0u8; opts.sector_size as usize];
    buf[0..4].copy_from_slice(b"RRaA");
    buf[484..488].copy_from_slice(b"rrAa");
    let free_clusters = (layout.cluster_count + 2).saturating_sub(fat_len);
    pack::write_uint(&mut buf[488..492], free_clusters);
    pack::write_uint(&mut buf[492..496], fat_len + 2);
    buf[510] = 0x55;
    buf[511] = 0xAA;
    buf
}

fn pack_fat12(entries: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * 3 / 2 + 1);
    let mut i = 0;
    while i + 1 < entries.len() {
        let e0 = entries[i] & 0xFFF;
        let e1 = entries[i + 1] & 0xFFF;
        out.push((e0 & 0xFF) as u8);
        out.push((((e0 >> 8) & 0x0F) | ((e1 & 0x0F) << 4)) as u8);
        out.push((e1 >> 4) as u8);
        i += 2;
    }
    if i < entries.len() {
        let e0 = entries[i] & 0xFFF;
        out.push((e0 & 0xFF) as u8);
        out.push(((e0 >> 8) & 0x0F) as u8);
    }
    out
}

fn pack_fat16(entries: &[u32]) -> Vec<u8> {
    let mut out = vec![0u8; entries.len() * 2];
    for (i, &e) in entries.iter().enumerate() {
        pack::write_uint(&mut out[i * 2..i * 2 + 2], e as u64);
    }
    out
}

fn pack_fat32(entries: &[u32]) -> Vec<u8> {
    let mut out = vec![0u8; entries.len() * 4];
    for (i, &e) in entries.iter().enumerate() {
        pack::write_uint(&mut out[i * 4..i * 4 + 4], (e & 0x0FFF_FFFF) as u64);
    }
    out
}

fn write_dir_or_file(
    entry: &DirEntry,
    is_root: bool,
    layout: &Layout,
    opts: &Options,
    fat: &mut Vec<u32>,
    file: &mut File,
) -> Result<()> {
    let data_offset = layout.first_data_sector * opts.sector_size as u64;

    if entry.attrs & ATTR_DIRECTORY != 0 {
        if entry.first_cluster == 0 {
            if is_root && !entry.dir_bytes.is_empty() {
                let offset = layout.root_dir_sector * opts.sector_size as u64;
                debug_assert!(
                    offset + entry.dir_bytes.len() as u64 <= data_offset,
                    "root directory spills into the data region"
                );
                file.seek(SeekFrom::Start(offset))?;
                file.write_all(&entry.dir_bytes)?;
            }
        } else {
            let num_clusters =
                ceil_div(entry.dir_bytes.len() as u64, layout.cluster_size as u64).max(1) as u32;
            trace!(
                "alloc dir chain first_cluster={} clusters={} bytes={}",
                entry.first_cluster,
                num_clusters,
                entry.dir_bytes.len()
            );
            write_chain(fat, entry.first_cluster, num_clusters);
            let offset = data_offset + (entry.first_cluster as u64 - 2) * layout.cluster_size as u64;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&entry.dir_bytes)?;
        }
        for child in &entry.children {
            write_dir_or_file(child, false, layout, opts, fat, file)?;
        }
    } else if entry.first_cluster != 0 {
        let num_clusters = ceil_div(entry.file_size as u64, layout.cluster_size as u64) as u32;
        trace!(
            "alloc file chain first_cluster={} clusters={} bytes={}",
            entry.first_cluster,
            num_clusters,
            entry.file_size
        );
        write_chain(fat, entry.first_cluster, num_clusters);
        let offset = data_offset + (entry.first_cluster as u64 - 2) * layout.cluster_size as u64;
        file.seek(SeekFrom::Start(offset))?;

        let mut src = host::open_sequential(&entry.host_path)?;
        let mut remaining = entry.file_size as u64;
        let mut buf = [0u8; 4096];
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            let n = src.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
    }
    Ok(())
}

fn resolve_serial(opts: &Options) -> u32 {
    match opts.serial {
        Some(s) => s,
        None => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as u32)
                .unwrap_or(0);
            warn!("no volume serial number given, using time-based value {now:#010x}");
            now
        }
    }
}

/// Writes the full image for `tree` under `layout`/`opts` to `opts.output`.
/// `tree` must already reflect the directory byte streams built for this
/// exact `layout` (the last stable iteration of the sizing solver).
pub fn write_volume(tree: &DirTree, layout: &Layout, opts: &Options) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&opts.output)?;

    let total_bytes = layout.end_of_volume * opts.sector_size as u64;
    file.seek(SeekFrom::Start(total_bytes - 1))?;
    file.write_all(&[0u8])?;

    debug!(
        "sector layout: reserved={} first_fat={} root_dir={} first_data={} end={}",
        layout.reserved_sectors,
        layout.first_fat,
        layout.root_dir_sector,
        layout.first_data_sector,
        layout.end_of_volume
    );

    if opts.partitioned {
        write_mbr(&mut file, layout, opts)?;
    }

    let mut fat: Vec<u32> = vec![EOC, EOC];
    write_dir_or_file(&tree.root, true, layout, opts, &mut fat, &mut file)?;
    let allocated_fat_len = fat.len() as u64;

    let total_entries = (layout.cluster_count + 2) as usize;
    if fat.len() < total_entries {
        fat.resize(total_entries, 0);
    }
    fat[0] = 0x0FFF_FF00 | opts.media_desc as u32;

    let packed = match layout.fat_width {
        12 => pack_fat12(&fat),
        16 => pack_fat16(&fat),
        32 => pack_fat32(&fat),
        w => unreachable!("unsupported FAT width {w}"),
    };
    for i in 0..opts.num_fats as u64 {
        let offset = (layout.first_fat + i * layout.fat_sectors) * opts.sector_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&packed)?;
    }

    let serial = resolve_serial(opts);
    let boot_sector = build_boot_sector(layout, opts, tree.root.first_cluster, serial)?;
    file.seek(SeekFrom::Start(layout.boot_sector * opts.sector_size as u64))?;
    file.write_all(&boot_sector)?;

    if layout.fat_width == 32 {
        let fsinfo = build_fsinfo(layout, opts, allocated_fat_len);
        file.seek(SeekFrom::Start((layout.boot_sector + 1) * opts.sector_size as u64))?;
        file.write_all(&fsinfo)?;

        file.seek(SeekFrom::Start((layout.boot_sector + 6) * opts.sector_size as u64))?;
        file.write_all(&boot_sector)?;
        file.seek(SeekFrom::Start((layout.boot_sector + 7) * opts.sector_size as u64))?;
        file.write_all(&fsinfo)?;
    }

    Ok(())
}
