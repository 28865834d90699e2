//! Layout and serialization engine for FAT12/FAT16/FAT32 disk images.
//!
//! This crate builds a byte-exact image from an in-memory directory tree:
//! [`options`] resolves the external CLI contract, [`tree`] models the
//! files/directories and lays out their 32-byte records, [`sizing`] picks a
//! self-consistent `(FAT width, cluster size)` pair, and [`writer`] emits
//! the MBR, boot sector, FATs, and data region. [`host`] is the only seam
//! onto the host filesystem; everything else is pure in-memory computation.

pub mod error;
pub mod host;
pub mod name;
pub mod options;
pub mod pack;
pub mod sizing;
pub mod time;
pub mod tree;
pub mod writer;

pub use error::{Error, Result};
pub use options::{Options, Preset, RawOptions};
pub use tree::{DirEntry, DirTree};

/// Directory-entry attribute bits, per the FAT on-disk format.
pub const ATTR_READ_ONLY: u8 = tree::ATTR_READ_ONLY;
pub const ATTR_HIDDEN: u8 = tree::ATTR_HIDDEN;
pub const ATTR_SYSTEM: u8 = tree::ATTR_SYSTEM;
pub const ATTR_LABEL: u8 = tree::ATTR_LABEL;
pub const ATTR_DIRECTORY: u8 = tree::ATTR_DIRECTORY;
pub const ATTR_ARCHIVE: u8 = tree::ATTR_ARCHIVE;

/// Runs the sizing solver and volume writer over an already-populated tree.
/// This is the single entry point the CLI binary drives after the walker
/// has called [`DirTree::add_file`] for every host path.
pub fn build_image(tree: &mut DirTree, opts: &Options) -> Result<()> {
    let layout = sizing::solve(tree, opts)?;
    writer::write_volume(tree, &layout, opts)
}
