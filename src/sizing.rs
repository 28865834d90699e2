//! Sizing solver: derives a self-consistent `(FAT width, cluster size)` pair
//! and the resulting sector geometry from the tree's content plus the
//! user's options, re-running the directory layout pass each time a
//! candidate is rejected.

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::options::Options;
use crate::tree::DirTree;

const MAX_FAT12: u64 = 0xFF4;
const MAX_FAT16: u64 = 0xFFF4;
const MAX_FAT32: u64 = 0xFFFF_FF4;

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Sector geometry the volume writer needs, on top of what's already in
/// [`Options`].
#[derive(Debug, Clone)]
pub struct Layout {
    pub fat_width: u8,
    pub cluster_size: u32,
    pub sectors_per_cluster: u32,
    pub cluster_count: u64,
    pub root_entries: u32,
    pub reserved_sectors: u64,
    pub boot_sector: u64,
    pub first_fat: u64,
    pub fat_sectors: u64,
    pub root_dir_sector: u64,
    pub first_data_sector: u64,
    pub end_of_volume: u64,
}

fn forced_is(opts: &Options, width: u8) -> bool {
    opts.fat_width_forced == Some(width)
}

/// Runs the layout pass and the threshold cascade to stability. Rebuilds
/// `tree`'s directory byte streams on every iteration since cluster size
/// and FAT width both influence record placement.
pub fn solve(tree: &mut DirTree, opts: &Options) -> Result<Layout> {
    let mut cluster_size = opts.sector_size.max(opts.cluster_size);
    let mut fat_width = opts.fat_width_forced.unwrap_or(12);

    loop {
        let built = tree.build_directories(&opts.label, cluster_size, fat_width)?;
        let mut cluster_count = built as u64;

        let sectors_per_cluster = cluster_size / opts.sector_size;
        let root_entries = if fat_width != 32 {
            tree.root_entry_count().max(opts.root_dir_size as u32)
        } else {
            0
        };
        let reserved_sectors = (opts.reserved_sectors as u64).max(if fat_width == 32 { 32 } else { 1 });

        cluster_count += ceil_div(opts.free_space, cluster_size as u64);

        let boot_sector = if opts.partitioned {
            (opts.sectors_per_track as u64).max(1)
        } else {
            0
        };
        let first_fat = boot_sector + reserved_sectors;
        let fat_width_bits = fat_width as u64;

        let compute_geometry = |cluster_count: u64| -> (u64, u64, u64, u64) {
            let fat_sectors = ceil_div(
                (cluster_count + 2) * fat_width_bits,
                opts.sector_size as u64 * 8,
            );
            let root_dir_sector = first_fat + fat_sectors * opts.num_fats as u64;
            let first_data_sector = root_dir_sector
                + if fat_width == 32 {
                    0
                } else {
                    ceil_div(root_entries as u64 * 32, opts.sector_size as u64)
                };
            let end_of_volume = first_data_sector + cluster_count * sectors_per_cluster as u64;
            (fat_sectors, root_dir_sector, first_data_sector, end_of_volume)
        };

        let (mut fat_sectors, mut root_dir_sector, mut first_data_sector, mut end_of_volume) =
            compute_geometry(cluster_count);

        if opts.volume_size != 0 {
            let user_sectors = opts.volume_size / opts.sector_size as u64;
            if end_of_volume > user_sectors {
                return Err(Error::LayoutImpossible(format!(
                    "requested volume size fits {user_sectors} sectors, need at least {end_of_volume}"
                )));
            }
            let free_sectors = user_sectors - end_of_volume;
            cluster_count += free_sectors / sectors_per_cluster.max(1) as u64;

            loop {
                let (fs, rds, fds, eov) = compute_geometry(cluster_count);
                if eov > user_sectors && cluster_count > 0 {
                    cluster_count -= 1;
                    continue;
                }
                fat_sectors = fs;
                root_dir_sector = rds;
                first_data_sector = fds;
                end_of_volume = eov;
                break;
            }
        }

        debug!(
            "sizing iteration: fat_width={} cluster_size={} cluster_count={}",
            fat_width, cluster_size, cluster_count
        );

        let old_fat_width = fat_width;
        let old_cluster_size = cluster_size;

        if cluster_count > MAX_FAT32 {
            cluster_size *= 2;
        } else if cluster_count > MAX_FAT16 {
            if forced_is(opts, 12) || forced_is(opts, 16) || opts.sector_size < 512 {
                cluster_size *= 2;
            } else {
                if opts.fat_width_forced.is_none() && fat_width != 32 {
                    warn!("cluster count {cluster_count} exceeds FAT16 range, promoting to FAT32");
                }
                fat_width = 32;
            }
        } else if cluster_count > MAX_FAT12 {
            if forced_is(opts, 32) {
                // already wide enough; this bump does not change (fat_width, cluster_size)
                cluster_count = MAX_FAT16 + 1;
            } else if forced_is(opts, 12) {
                cluster_size *= 2;
            } else {
                if opts.fat_width_forced.is_none() && fat_width != 16 {
                    warn!("cluster count {cluster_count} exceeds FAT12 range, promoting to FAT16");
                }
                fat_width = 16;
            }
        } else if forced_is(opts, 32) {
            cluster_count = MAX_FAT16 + 1;
        } else if forced_is(opts, 16) {
            cluster_count = MAX_FAT12 + 1;
        } else {
            fat_width = 12;
        }

        if fat_width == old_fat_width && cluster_size == old_cluster_size {
            info!(
                "sizing stabilized: fat_width={} cluster_size={} cluster_count={}",
                fat_width, cluster_size, cluster_count
            );
            if opts.root_dir_size_pinned && fat_width != 32 {
                let actual = tree.root_entry_count();
                if actual > opts.root_dir_size as u32 {
                    return Err(Error::LayoutImpossible(format!(
                        "root directory needs {actual} entries, more than the requested {}",
                        opts.root_dir_size
                    )));
                }
            }
            return Ok(Layout {
                fat_width,
                cluster_size,
                sectors_per_cluster,
                cluster_count,
                root_entries,
                reserved_sectors,
                boot_sector,
                first_fat,
                fat_sectors,
                root_dir_sector,
                first_data_sector,
                end_of_volume,
            });
        }

        if cluster_size > old_cluster_size
            && (opts.cluster_size_pinned || old_cluster_size >= 128 * opts.sector_size)
        {
            return Err(Error::LayoutImpossible(
                "volume too large for the requested cluster size".into(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RawOptions;

    fn opts(file_count: usize, f: impl FnOnce(&mut RawOptions)) -> Options {
        let mut raw = RawOptions::default();
        f(&mut raw);
        raw.finalize(file_count).unwrap()
    }

    #[test]
    fn empty_floppy_stays_fat12() {
        let options = opts(0, |r| {
            r.preset = Some(crate::options::Preset::M1440);
            r.label = Some("TEST".to_string());
        });
        let mut tree = DirTree::new();
        let layout = solve(&mut tree, &options).unwrap();
        assert_eq!(layout.fat_width, 12);
        assert_eq!(layout.end_of_volume * options.sector_size as u64, 1_474_560);
    }

    #[test]
    fn promotes_to_fat32_for_large_volumes() {
        let options = opts(0, |r| {
            r.volume_size = Some(64 * 1024 * 1024);
            r.sector_size = Some(512);
            r.cluster_size = Some(512);
        });
        let mut tree = DirTree::new();
        let layout = solve(&mut tree, &options).unwrap();
        assert_eq!(layout.fat_width, 32);
    }

    #[test]
    fn eight_mb_forced_fat16_is_partitioned_correctly() {
        let options = opts(0, |r| {
            r.partitioned = true;
            r.volume_size = Some(8 * 1024 * 1024);
            r.fat_width_forced = Some(16);
        });
        let mut tree = DirTree::new();
        let layout = solve(&mut tree, &options).unwrap();
        assert_eq!(layout.fat_width, 16);
        assert_eq!(layout.boot_sector, options.sectors_per_track as u64);
    }
}
