//! Options contract: everything the external CLI collaborator must decide
//! before the layout and serialization engine can run.
//!
//! [`RawOptions`] mirrors the CLI surface one-to-one, with every field
//! `Option`-wrapped so "the user did not set this" is distinguishable from
//! "the user set this to its default value" — [`Preset`] conflict checking
//! needs that distinction. [`RawOptions::finalize`] resolves presets,
//! applies defaults, validates, and produces the fully-resolved [`Options`]
//! the rest of the crate works with.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Standard floppy geometries, matching the industry's historical media
/// sizes rather than any power-of-two boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    K360,
    K720,
    M1200,
    M1440,
    M2880,
}

struct PresetEffects {
    volume_size: u64,
    cluster_size: u32,
    root_dir_size: u16,
    sectors_per_track: u32,
    num_fats: u32,
    media_desc: u8,
}

impl Preset {
    pub fn from_kib(kib: u32) -> Option<Preset> {
        match kib {
            360 => Some(Preset::K360),
            720 => Some(Preset::K720),
            1200 => Some(Preset::M1200),
            1440 => Some(Preset::M1440),
            2880 => Some(Preset::M2880),
            _ => None,
        }
    }

    fn effects(self) -> PresetEffects {
        let (kib, cluster_size, root_dir_size, sectors_per_track, media_desc) = match self {
            Preset::K360 => (360, 1024, 112, 9, 0xFD),
            Preset::K720 => (720, 1024, 112, 9, 0xF9),
            Preset::M1200 => (1200, 512, 112, 15, 0xF9),
            Preset::M1440 => (1440, 512, 224, 18, 0xF0),
            Preset::M2880 => (2880, 1024, 224, 36, 0xF0),
        };
        PresetEffects {
            volume_size: kib as u64 * 1024,
            cluster_size,
            root_dir_size,
            sectors_per_track,
            num_fats: 2,
            media_desc,
        }
    }
}

/// One field per CLI flag, `None`/`false` meaning "left at its default".
#[derive(Debug, Default)]
pub struct RawOptions {
    pub output: Option<PathBuf>,
    pub verbose: bool,
    pub preset: Option<Preset>,
    pub volume_size: Option<u64>,
    pub free_space: Option<u64>,
    pub cluster_size: Option<u32>,
    pub root_dir_size: Option<u16>,
    pub fat_width_forced: Option<u8>,
    pub partitioned: bool,
    pub label: Option<String>,
    pub boot_record: Option<PathBuf>,
    pub oem_name: Option<String>,
    pub serial: Option<String>,
    pub sectors_per_track: Option<u32>,
    pub num_heads: Option<u32>,
    pub media_desc: Option<String>,
    pub sector_size: Option<u32>,
    pub reserved_sectors: Option<u32>,
    pub num_fats: Option<u32>,
}

/// Fully-resolved, validated options consumed by the sizing solver and
/// volume writer.
#[derive(Debug, Clone)]
pub struct Options {
    pub output: PathBuf,
    pub verbose: bool,
    pub volume_size: u64,
    pub free_space: u64,
    pub cluster_size: u32,
    pub cluster_size_pinned: bool,
    pub root_dir_size: u16,
    pub root_dir_size_pinned: bool,
    pub fat_width_forced: Option<u8>,
    pub partitioned: bool,
    pub label: String,
    pub boot_record: Option<PathBuf>,
    pub oem_name: String,
    pub serial: Option<u32>,
    pub sectors_per_track: u32,
    pub num_heads: u32,
    pub media_desc: u8,
    pub sector_size: u32,
    pub reserved_sectors: u32,
    pub num_fats: u32,
}

fn parse_hex_pair(s: &str) -> Option<u32> {
    let (left, right) = s.split_once('-')?;
    if !(1..=4).contains(&left.len()) || !(1..=4).contains(&right.len()) {
        return None;
    }
    let left = u32::from_str_radix(left, 16).ok()?;
    let right = u32::from_str_radix(right, 16).ok()?;
    Some((left << 16) | right)
}

fn parse_media_desc(s: &str) -> Option<u8> {
    if !(1..=2).contains(&s.len()) {
        return None;
    }
    u8::from_str_radix(s, 16).ok()
}

impl RawOptions {
    /// Resolves presets, fills in defaults, and validates the combination.
    /// `file_count` is the number of host paths the external walker found,
    /// needed for the "no files and no size request" rule.
    pub fn finalize(self, file_count: usize) -> Result<Options> {
        if let Some(preset) = self.preset {
            let conflicting = self.fat_width_forced.is_some()
                || self.sector_size.is_some()
                || self.reserved_sectors.is_some()
                || self.num_fats.is_some()
                || self.volume_size.is_some()
                || self.cluster_size.is_some()
                || self.root_dir_size.is_some()
                || self.sectors_per_track.is_some()
                || self.media_desc.is_some();
            if conflicting {
                return Err(Error::BadOption(
                    "a preset cannot be combined with an option it fixes".into(),
                ));
            }
            let effects = preset.effects();
            return Self::build(
                self,
                effects.volume_size,
                effects.cluster_size,
                false,
                effects.root_dir_size,
                false,
                Some(12),
                512,
                1,
                effects.num_fats,
                effects.sectors_per_track,
                effects.media_desc,
                file_count,
            );
        }

        let sector_size = self.sector_size.unwrap_or(512);
        let media_desc = match &self.media_desc {
            Some(s) => parse_media_desc(s)
                .ok_or_else(|| Error::BadOption(format!("invalid media descriptor '{s}'")))?,
            None if self.partitioned => 0xF8,
            None => 0xF0,
        };
        Self::build(
            self,
            0,
            0,
            false,
            0,
            false,
            None,
            sector_size,
            0,
            2,
            63,
            media_desc,
            file_count,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        self,
        default_volume_size: u64,
        default_cluster_size: u32,
        cluster_size_pinned_default: bool,
        default_root_dir_size: u16,
        root_dir_size_pinned_default: bool,
        default_fat_width: Option<u8>,
        default_sector_size: u32,
        default_reserved_sectors: u32,
        default_num_fats: u32,
        default_sectors_per_track: u32,
        media_desc: u8,
        file_count: usize,
    ) -> Result<Options> {
        let sector_size = self.sector_size.unwrap_or(default_sector_size);
        if sector_size < 128 || sector_size > 32768 || !sector_size.is_power_of_two() {
            return Err(Error::BadOption(format!(
                "sector size {sector_size} must be a power of two in [128, 32768]"
            )));
        }

        let fat_width_forced = self.fat_width_forced.or(default_fat_width);
        if fat_width_forced == Some(32) && sector_size < 512 {
            return Err(Error::BadOption(
                "FAT32 requires a sector size of at least 512 bytes".into(),
            ));
        }
        if let Some(w) = fat_width_forced {
            if w != 12 && w != 16 && w != 32 {
                return Err(Error::BadOption(format!("invalid forced FAT width {w}")));
            }
        }

        let cluster_size_pinned = self.cluster_size.is_some() || cluster_size_pinned_default;
        let cluster_size = self.cluster_size.unwrap_or(default_cluster_size);
        if cluster_size != 0 {
            if cluster_size % sector_size != 0 {
                return Err(Error::BadOption(
                    "cluster size must be a multiple of the sector size".into(),
                ));
            }
            let ratio = cluster_size / sector_size;
            if !ratio.is_power_of_two() || ratio == 0 || ratio > 128 {
                return Err(Error::BadOption(
                    "cluster size must be sector size times a power of two up to 128".into(),
                ));
            }
        }

        let serial = match &self.serial {
            Some(s) if s.is_empty() => None,
            Some(s) => Some(
                parse_hex_pair(s)
                    .ok_or_else(|| Error::BadOption(format!("invalid serial number '{s}'")))?,
            ),
            None => None,
        };

        let root_dir_size_pinned = self.root_dir_size.is_some() || root_dir_size_pinned_default;
        let volume_size = self.volume_size.unwrap_or(default_volume_size);
        let free_space = self.free_space.unwrap_or(0);

        if file_count == 0 && volume_size == 0 && free_space == 0 {
            return Err(Error::BadOption(
                "no files given and neither volume size nor free space requested".into(),
            ));
        }

        Ok(Options {
            output: self.output.unwrap_or_else(|| PathBuf::from("dos-volume.img")),
            verbose: self.verbose,
            volume_size,
            free_space,
            cluster_size,
            cluster_size_pinned,
            root_dir_size: self.root_dir_size.unwrap_or(default_root_dir_size),
            root_dir_size_pinned,
            fat_width_forced,
            partitioned: self.partitioned,
            label: self.label.unwrap_or_else(|| "NO NAME".to_string()),
            boot_record: self.boot_record,
            oem_name: self.oem_name.unwrap_or_else(|| "MSWIN4.1".to_string()),
            serial,
            sectors_per_track: self.sectors_per_track.unwrap_or(default_sectors_per_track),
            num_heads: self.num_heads.unwrap_or(255),
            media_desc,
            sector_size,
            reserved_sectors: self.reserved_sectors.unwrap_or(default_reserved_sectors),
            num_fats: self.num_fats.unwrap_or(default_num_fats),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_no_files_and_no_size() {
        let raw = RawOptions::default();
        let err = raw.finalize(0).unwrap_err();
        assert!(matches!(err, Error::BadOption(_)));
    }

    #[test]
    fn accepts_explicit_volume_size_with_no_files() {
        let mut raw = RawOptions::default();
        raw.volume_size = Some(1440 * 1024);
        let opts = raw.finalize(0).unwrap();
        assert_eq!(opts.volume_size, 1440 * 1024);
        assert_eq!(opts.media_desc, 0xF0);
    }

    #[test]
    fn preset_fills_in_expected_fields() {
        let mut raw = RawOptions::default();
        raw.preset = Some(Preset::M1440);
        let opts = raw.finalize(1).unwrap();
        assert_eq!(opts.volume_size, 1440 * 1024);
        assert_eq!(opts.sector_size, 512);
        assert_eq!(opts.reserved_sectors, 1);
        assert_eq!(opts.num_fats, 2);
        assert_eq!(opts.fat_width_forced, Some(12));
        assert_eq!(opts.media_desc, 0xF0);
    }

    #[test]
    fn preset_conflicts_with_explicit_cluster_size() {
        let mut raw = RawOptions::default();
        raw.preset = Some(Preset::M1440);
        raw.cluster_size = Some(4096);
        let err = raw.finalize(1).unwrap_err();
        assert!(matches!(err, Error::BadOption(_)));
    }

    #[test]
    fn rejects_bad_serial() {
        let mut raw = RawOptions::default();
        raw.volume_size = Some(1440 * 1024);
        raw.serial = Some("not-hex".to_string());
        let err = raw.finalize(0).unwrap_err();
        assert!(matches!(err, Error::BadOption(_)));
    }

    #[test]
    fn rejects_non_power_of_two_cluster_ratio() {
        let mut raw = RawOptions::default();
        raw.volume_size = Some(1440 * 1024);
        raw.sector_size = Some(512);
        raw.cluster_size = Some(512 * 3);
        let err = raw.finalize(0).unwrap_err();
        assert!(matches!(err, Error::BadOption(_)));
    }
}
