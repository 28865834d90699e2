//! Host-filesystem collaborator.
//!
//! The layout and write passes never call `std::fs` directly; they go
//! through this thin trait so a caller could substitute a different
//! source of bytes and metadata. The binary's directory walker is the
//! only other place host paths are touched.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Local};

use crate::error::{Error, Result};

/// What kind of thing a host path turned out to be, decided with one
/// `stat`-equivalent call so `add_file` can apply §4.4's classification
/// without touching `std::fs` a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    File,
    Directory,
    Special,
}

#[derive(Debug, Clone)]
pub struct HostStat {
    pub kind: HostKind,
    pub len: u64,
    pub read_only: bool,
    pub created: DateTime<Local>,
    pub modified: DateTime<Local>,
    pub accessed: DateTime<Local>,
}

fn to_local(t: io::Result<std::time::SystemTime>) -> DateTime<Local> {
    t.map(DateTime::<Local>::from).unwrap_or_else(|_| Local::now())
}

/// Inspects a host path without opening it for content reads.
pub fn stat(path: &Path) -> Result<HostStat> {
    let meta = fs::symlink_metadata(path)?;
    let file_type = meta.file_type();
    let kind = if file_type.is_dir() {
        HostKind::Directory
    } else if file_type.is_file() {
        HostKind::File
    } else {
        HostKind::Special
    };
    Ok(HostStat {
        kind,
        len: meta.len(),
        read_only: meta.permissions().readonly(),
        created: to_local(meta.created()),
        modified: to_local(meta.modified()),
        accessed: to_local(meta.accessed()),
    })
}

/// Sequential byte source for a regular host file, read exactly once
/// during the data-region write (see the resource model's no-reread rule).
pub trait HostFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

pub struct StdHostFile(fs::File);

impl HostFile for StdHostFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use io::Read;
        self.0.read(buf)
    }
}

/// Opens `path` for sequential reading. Errors are wrapped so the caller
/// can attribute them to the offending host path.
pub fn open_sequential(path: &Path) -> Result<StdHostFile> {
    fs::File::open(path)
        .map(StdHostFile)
        .map_err(|e| Error::bad_input(path, e.to_string()))
}
