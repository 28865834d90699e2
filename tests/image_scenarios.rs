//! End-to-end scenarios: build a real image into a temp file and assert on
//! its raw bytes the way a conformant FAT reader would.

use std::fs;
use std::io::Read;

use fatimage::options::{Preset, RawOptions};
use fatimage::{build_image, DirTree, ATTR_ARCHIVE};

fn read_image(path: &std::path::Path) -> Vec<u8> {
    let mut buf = Vec::new();
    fs::File::open(path).unwrap().read_to_end(&mut buf).unwrap();
    buf
}

#[test]
fn empty_1440k_floppy_matches_expected_layout() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("floppy.img");

    let mut raw = RawOptions::default();
    raw.output = Some(output.clone());
    raw.preset = Some(Preset::M1440);
    raw.label = Some("TEST".to_string());
    let opts = raw.finalize(0).unwrap();

    let mut tree = DirTree::new();
    build_image(&mut tree, &opts).unwrap();

    let bytes = read_image(&output);
    assert_eq!(bytes.len(), 1_474_560);
    assert_eq!(bytes[0x1FE], 0x55);
    assert_eq!(bytes[0x1FF], 0xAA);
    assert_eq!(bytes[0x15], 0xF0, "media descriptor byte in boot sector");

    let ext_bpb_fat_type = &bytes[0x36..0x36 + 8];
    assert_eq!(ext_bpb_fat_type, b"FAT12   ");

    let num_fats = bytes[0x10];
    assert_eq!(num_fats, 2);

    // root directory holds exactly one 32-byte label record, no data clusters.
    assert_eq!(&tree.root.dir_bytes[0..11], b"TEST       ");
    assert_eq!(tree.root.dir_bytes[11], 0x08);
    assert_eq!(tree.root.dir_bytes.len(), 32);
}

#[test]
fn single_short_name_file_lands_in_root_and_data_region() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("floppy.img");
    let src = dir.path().join("HELLO.TXT");
    fs::write(&src, b"hi\n\0\0\0\0\0\0\0").unwrap(); // pad to 10 bytes

    let mut raw = RawOptions::default();
    raw.output = Some(output.clone());
    raw.preset = Some(Preset::K360);
    let opts = raw.finalize(1).unwrap();

    let mut tree = DirTree::new();
    tree.add_file(&src, "HELLO.TXT", ATTR_ARCHIVE).unwrap();
    build_image(&mut tree, &opts).unwrap();

    assert_eq!(tree.root.children[0].first_cluster, 2);
    assert_eq!(&tree.root.dir_bytes[0..11], b"HELLO   TXT");
    assert_eq!(tree.root.dir_bytes[11], ATTR_ARCHIVE);
    assert_eq!(
        u32::from_le_bytes(tree.root.dir_bytes[28..32].try_into().unwrap()),
        10
    );

    let bytes = read_image(&output);
    // FAT12: cluster 2 is the first data cluster, and it is the file's only
    // cluster, so FAT[2] must hold the end-of-chain marker (0xFFF | media bits).
    let fat_offset = {
        let reserved = u16::from_le_bytes(bytes[0x0E..0x10].try_into().unwrap()) as usize;
        reserved * 512
    };
    let e0 = bytes[fat_offset + 3] as u16 | ((bytes[fat_offset + 4] as u16 & 0x0F) << 8);
    assert_eq!(e0, 0xFFF);
}

#[test]
fn long_file_name_gets_two_lfn_records_with_matching_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("floppy.img");
    let src = dir.path().join("my long report.txt");
    fs::write(&src, b"x").unwrap();

    let mut raw = RawOptions::default();
    raw.output = Some(output);
    raw.preset = Some(Preset::M1440);
    let opts = raw.finalize(1).unwrap();

    let mut tree = DirTree::new();
    tree.add_file(&src, "my long report.txt", ATTR_ARCHIVE).unwrap();
    build_image(&mut tree, &opts).unwrap();

    let bytes = &tree.root.dir_bytes;
    assert_eq!(bytes.len(), 96);
    assert_eq!(bytes[0] & 0x40, 0x40, "first on-disk LFN record marks last segment");
    assert_eq!(bytes[0] & 0x3F, 2);
    assert_eq!(bytes[32] & 0x3F, 1);
    assert_eq!(&bytes[64..75], b"MYLONG~1TXT");

    let checksum = fatimage::name::short_name_checksum(&bytes[64..75].try_into().unwrap());
    assert_eq!(bytes[13], checksum);
    assert_eq!(bytes[32 + 13], checksum);
}

#[test]
fn partitioned_8mb_fat16_image_has_mbr_and_correct_boot_offset() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("disk.img");

    let mut raw = RawOptions::default();
    raw.output = Some(output.clone());
    raw.partitioned = true;
    raw.volume_size = Some(8 * 1024 * 1024);
    raw.fat_width_forced = Some(16);
    let opts = raw.finalize(0).unwrap();

    let mut tree = DirTree::new();
    build_image(&mut tree, &opts).unwrap();

    let bytes = read_image(&output);
    assert_eq!(bytes[510], 0x55);
    assert_eq!(bytes[511], 0xAA);

    let part = &bytes[0x1BE..0x1BE + 16];
    assert_eq!(part[0], 0x00, "status byte is 0x00 per the source's literal behavior");
    let lba_first = u32::from_le_bytes(part[8..12].try_into().unwrap());
    assert_eq!(lba_first, opts.sectors_per_track);

    let boot_offset = (opts.sectors_per_track as usize) * opts.sector_size as usize;
    assert_eq!(bytes[boot_offset + 0x1FE], 0x55);
    assert_eq!(bytes[boot_offset + 0x1FF], 0xAA);

    let ext_drive_number = bytes[boot_offset + 0x24];
    assert_eq!(ext_drive_number, 0x80);
}
