//! In-memory directory tree and its two-pass layout into 32-byte directory
//! records.
//!
//! The tree is populated once by the external walker through [`DirTree::add_file`],
//! then [`DirTree::build_directories`] may run several times (once per
//! iteration of the sizing solver) — each call rebuilds every directory's
//! byte stream from scratch and reassigns cluster numbers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{Error, Result};
use crate::host;
use crate::name;
use crate::pack;
use crate::time;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_LABEL: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
/// Marks an on-disk record as an LFN continuation; never a valid value of
/// [`DirEntry::attrs`].
pub const ATTR_LFN: u8 = 0x0F;

const FILE_ATTR_MASK: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_ARCHIVE;

/// One file or directory in the image.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub host_path: PathBuf,
    pub attrs: u8,
    pub first_cluster: u32,
    pub file_size: u32,
    pub created_time: DateTime<Local>,
    pub modified_time: DateTime<Local>,
    pub accessed_time: DateTime<Local>,
    pub children: Vec<DirEntry>,
    pub dir_bytes: Vec<u8>,
    pub dir_entry_offset: usize,
}

impl DirEntry {
    fn new_dir(
        name: String,
        host_path: PathBuf,
        created: DateTime<Local>,
        modified: DateTime<Local>,
        accessed: DateTime<Local>,
    ) -> Self {
        DirEntry {
            name,
            host_path,
            attrs: ATTR_DIRECTORY,
            first_cluster: 0,
            file_size: 0,
            created_time: created,
            modified_time: modified,
            accessed_time: accessed,
            children: Vec::new(),
            dir_bytes: Vec::new(),
            dir_entry_offset: 0,
        }
    }

    /// A directory with no host path, timestamped at the moment it was
    /// synthesized (an intermediate path component the walker never added
    /// directly, or the tree root).
    fn new_synthesized_dir(name: String) -> Self {
        let now = Local::now();
        Self::new_dir(name, PathBuf::new(), now, now, now)
    }

    fn new_file(name: String, host_path: PathBuf, attrs: u8, stat: &host::HostStat) -> Result<Self> {
        if stat.len > u32::MAX as u64 {
            return Err(Error::bad_input(&host_path, "file too large for FAT32"));
        }
        let mut attrs = attrs & FILE_ATTR_MASK;
        if stat.read_only {
            attrs |= ATTR_READ_ONLY;
        }
        Ok(DirEntry {
            name,
            host_path,
            attrs,
            first_cluster: 0,
            file_size: stat.len as u32,
            created_time: stat.created,
            modified_time: stat.modified,
            accessed_time: stat.accessed,
            children: Vec::new(),
            dir_bytes: Vec::new(),
            dir_entry_offset: 0,
        })
    }

    fn find_child_ci(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// The in-memory directory tree, rooted at an unnamed root directory.
pub struct DirTree {
    pub root: DirEntry,
}

impl Default for DirTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirTree {
    pub fn new() -> Self {
        DirTree {
            root: DirEntry::new_synthesized_dir(String::new()),
        }
    }

    /// Number of 32-byte records the root directory held after the most
    /// recent [`Self::build_directories`] call.
    pub fn root_entry_count(&self) -> u32 {
        (self.root.dir_bytes.len() / 32) as u32
    }

    /// Adds one host path to the tree at `in_image_path` (or, if empty, at
    /// the host path's basename). Intermediate path components are created
    /// as directories, merging with any directory already there by the same
    /// case-insensitive name.
    pub fn add_file(
        &mut self,
        host_path: impl AsRef<Path>,
        in_image_path: &str,
        attrs: u8,
    ) -> Result<()> {
        let host_path = host_path.as_ref();
        let image_path = if in_image_path.is_empty() {
            host_path
                .file_name()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::bad_input(host_path, "cannot derive an image name"))?
                .to_string()
        } else {
            in_image_path.to_string()
        };

        let segments: Vec<&str> = image_path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, dirs)) = segments.split_last() else {
            return Err(Error::bad_input(host_path, "empty in-image path"));
        };

        let mut node = &mut self.root;
        for seg in dirs {
            node = match node.find_child_ci(seg) {
                Some(i) if node.children[i].attrs & ATTR_DIRECTORY != 0 => &mut node.children[i],
                Some(_) => {
                    return Err(Error::bad_input(
                        host_path,
                        format!("'{seg}' already exists and is not a directory"),
                    ))
                }
                None => {
                    node.children
                        .push(DirEntry::new_synthesized_dir((*seg).to_string()));
                    let idx = node.children.len() - 1;
                    &mut node.children[idx]
                }
            };
        }

        let stat = host::stat(host_path)?;
        match stat.kind {
            host::HostKind::Directory => match node.find_child_ci(last) {
                Some(i) if node.children[i].attrs & ATTR_DIRECTORY != 0 => Ok(()),
                Some(_) => Err(Error::bad_input(
                    host_path,
                    format!("'{last}' already exists and is not a directory"),
                )),
                None => {
                    node.children.push(DirEntry::new_dir(
                        (*last).to_string(),
                        host_path.to_path_buf(),
                        stat.created,
                        stat.modified,
                        stat.accessed,
                    ));
                    Ok(())
                }
            },
            host::HostKind::File => {
                if node.find_child_ci(last).is_some() {
                    return Err(Error::bad_input(
                        host_path,
                        format!("'{last}' already exists in this directory"),
                    ));
                }
                node.children
                    .push(DirEntry::new_file((*last).to_string(), host_path.to_path_buf(), attrs, &stat)?);
                Ok(())
            }
            host::HostKind::Special => Err(Error::bad_input(host_path, "cannot add special file")),
        }
    }

    /// Rebuilds every directory's byte stream and assigns cluster numbers,
    /// starting data clusters at 2. Returns the number of clusters consumed.
    pub fn build_directories(
        &mut self,
        volume_label: &str,
        cluster_size: u32,
        fat_width: u8,
    ) -> Result<u32> {
        let mut cluster = 2u32;
        layout_dir(&mut self.root, 0, volume_label, cluster_size, fat_width, &mut cluster, true)?;
        Ok(cluster - 2)
    }
}

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

fn emit_lfn_records(long_name: &str, checksum: u8, out: &mut Vec<u8>) -> Result<()> {
    let units: Vec<u16> = long_name.encode_utf16().collect();
    if units.len() > 255 {
        return Err(Error::bad_input(long_name, "name exceeds 255 UTF-16 units"));
    }
    let num_segments = ceil_div(units.len().max(1) as u64, 13) as usize;
    const OFFSETS: [usize; 13] = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

    for seg_index in (1..=num_segments).rev() {
        let start = (seg_index - 1) * 13;
        let mut rec = [0u8; 32];
        let mut seq = seg_index as u8;
        if seg_index == num_segments {
            seq |= 0x40;
        }
        rec[0] = seq;
        rec[11] = ATTR_LFN;
        rec[13] = checksum;
        for (i, &off) in OFFSETS.iter().enumerate() {
            let unit = units.get(start + i).copied().unwrap_or(0x0000);
            rec[off] = (unit & 0xFF) as u8;
            rec[off + 1] = (unit >> 8) as u8;
        }
        out.extend_from_slice(&rec);
    }
    Ok(())
}

/// The recursive layout pass described in the directory tree model: assign
/// this directory's first cluster, emit its records (label/dot/dotdot plus
/// one LFN-prefixed or bare short-name record per child), advance the
/// shared cluster counter, recurse, then patch each child's assigned first
/// cluster back into the record this call already wrote.
fn layout_dir(
    dir: &mut DirEntry,
    parent_first_cluster: u32,
    volume_label: &str,
    cluster_size: u32,
    fat_width: u8,
    cluster: &mut u32,
    is_root: bool,
) -> Result<()> {
    dir.dir_bytes.clear();

    let root_is_empty = volume_label.is_empty() && dir.children.is_empty();
    dir.first_cluster = if is_root && (fat_width != 32 || root_is_empty) {
        0
    } else {
        *cluster
    };

    if is_root {
        if !volume_label.is_empty() {
            let mut rec = [0u8; 32];
            pack::write_string(&mut rec[0..11], volume_label.as_bytes());
            rec[11] = ATTR_LABEL;
            dir.dir_bytes.extend_from_slice(&rec);
        }
    } else {
        let mut dot = [0u8; 32];
        pack::write_string(&mut dot[0..11], b".");
        dot[11] = ATTR_DIRECTORY;
        pack::write_uint(&mut dot[20..22], (dir.first_cluster >> 16) as u64);
        pack::write_uint(&mut dot[26..28], (dir.first_cluster & 0xFFFF) as u64);
        dir.dir_bytes.extend_from_slice(&dot);

        let mut dotdot = [0u8; 32];
        pack::write_string(&mut dotdot[0..11], b"..");
        dotdot[11] = ATTR_DIRECTORY;
        pack::write_uint(&mut dotdot[20..22], (parent_first_cluster >> 16) as u64);
        pack::write_uint(&mut dotdot[26..28], (parent_first_cluster & 0xFFFF) as u64);
        dir.dir_bytes.extend_from_slice(&dotdot);
    }

    let mut taken: HashSet<[u8; 11]> = HashSet::new();
    for child in &dir.children {
        if name::is_short_name(&child.name) {
            taken.insert(name::normalize_short_name(&child.name));
        }
    }

    let DirEntry {
        children, dir_bytes, ..
    } = dir;
    for child in children.iter_mut() {
        let (short_bytes, case_flags) = if name::is_short_name(&child.name) {
            let bytes = name::normalize_short_name(&child.name);
            let (stem_lower, ext_lower) = name::lowercase_flags(&child.name);
            let mut flags = 0u8;
            if stem_lower {
                flags |= 0x08;
            }
            if ext_lower {
                flags |= 0x10;
            }
            (bytes, flags)
        } else {
            let bytes = name::make_short_alias(&child.name, &mut taken)?;
            let checksum = name::short_name_checksum(&bytes);
            emit_lfn_records(&child.name, checksum, dir_bytes)?;
            (bytes, 0u8)
        };

        let offset = dir_bytes.len();
        let mut rec = [0u8; 32];
        rec[0..11].copy_from_slice(&short_bytes);
        rec[11] = child.attrs;
        rec[12] = case_flags;

        let ctime = time::encode(child.created_time);
        let mtime = time::encode(child.modified_time);
        let atime = time::encode(child.accessed_time);
        rec[13] = ctime.centiseconds;
        pack::write_uint(&mut rec[14..16], ctime.time as u64);
        pack::write_uint(&mut rec[16..18], ctime.date as u64);
        pack::write_uint(&mut rec[18..20], atime.date as u64);
        pack::write_uint(&mut rec[22..24], mtime.time as u64);
        pack::write_uint(&mut rec[24..26], mtime.date as u64);

        let size = if child.attrs & ATTR_DIRECTORY != 0 {
            0
        } else {
            child.file_size
        };
        pack::write_uint(&mut rec[28..32], size as u64);

        dir_bytes.extend_from_slice(&rec);
        child.dir_entry_offset = offset;
    }

    if dir.first_cluster != 0 {
        *cluster += ceil_div(dir.dir_bytes.len() as u64, cluster_size as u64) as u32;
    }

    for child in dir.children.iter_mut() {
        if child.attrs & ATTR_DIRECTORY != 0 {
            layout_dir(
                child,
                dir.first_cluster,
                volume_label,
                cluster_size,
                fat_width,
                cluster,
                false,
            )?;
        } else if child.file_size > 0 {
            child.first_cluster = *cluster;
            *cluster += ceil_div(child.file_size as u64, cluster_size as u64) as u32;
        } else {
            child.first_cluster = 0;
        }
    }

    for child in &dir.children {
        let off = child.dir_entry_offset;
        let fc = child.first_cluster;
        pack::write_uint(&mut dir.dir_bytes[off + 20..off + 22], (fc >> 16) as u64);
        pack::write_uint(&mut dir.dir_bytes[off + 26..off + 28], (fc & 0xFFFF) as u64);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn merges_directories_added_twice() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/one.txt"), b"one").unwrap();
        fs::write(dir.path().join("a/two.txt"), b"two").unwrap();

        let mut tree = DirTree::new();
        tree.add_file(dir.path().join("a"), "sub", ATTR_ARCHIVE).unwrap();
        tree.add_file(dir.path().join("a/one.txt"), "sub/one.txt", ATTR_ARCHIVE)
            .unwrap();

        assert_eq!(tree.root.children.len(), 1);
        assert_eq!(tree.root.children[0].children.len(), 1);
    }

    #[test]
    fn rejects_duplicate_file_name() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let mut tree = DirTree::new();
        tree.add_file(dir.path().join("a.txt"), "a.txt", ATTR_ARCHIVE).unwrap();
        let err = tree
            .add_file(dir.path().join("a.txt"), "a.txt", ATTR_ARCHIVE)
            .unwrap_err();
        assert!(matches!(err, Error::BadInput { .. }));
    }

    #[test]
    fn non_root_directory_gets_nonzero_first_cluster() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let mut tree = DirTree::new();
        tree.add_file(dir.path().join("sub"), "sub", ATTR_ARCHIVE).unwrap();
        tree.build_directories("", 512, 16).unwrap();

        assert_ne!(tree.root.children[0].first_cluster, 0);
    }

    #[test]
    fn label_entry_on_empty_root() {
        let mut tree = DirTree::new();
        tree.build_directories("TEST", 512, 12).unwrap();
        assert_eq!(tree.root.dir_bytes.len(), 32);
        assert_eq!(&tree.root.dir_bytes[0..11], b"TEST       ");
        assert_eq!(tree.root.dir_bytes[11], ATTR_LABEL);
    }

    #[test]
    fn long_name_gets_two_lfn_records() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("my long report.txt"), b"x").unwrap();

        let mut tree = DirTree::new();
        tree.add_file(
            dir.path().join("my long report.txt"),
            "my long report.txt",
            ATTR_ARCHIVE,
        )
        .unwrap();
        tree.build_directories("", 512, 16).unwrap();

        // two LFN records (64 bytes) followed by the short-name record (32 bytes)
        assert_eq!(tree.root.dir_bytes.len(), 96);
        assert_eq!(tree.root.dir_bytes[0] & 0x40, 0x40);
        assert_eq!(tree.root.dir_bytes[0] & 0x3F, 2);
        assert_eq!(tree.root.dir_bytes[32] & 0x3F, 1);
        assert_eq!(&tree.root.dir_bytes[64..75], b"MYLONG~1TXT");
    }
}
