//! Uniform error channel for the layout and serialization engine.
//!
//! Every fallible operation in this crate returns [`Error`]. The four kinds
//! named by the specification collapse into variants of one enum so that the
//! CLI front-end has a single type to match on and print.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The CLI options contract was violated (conflicting flags, out of
    /// range values, missing required combination).
    #[error("{0}")]
    BadOption(String),

    /// A host path could not be added to the directory tree: a special
    /// file, a duplicate name, a file too large to represent, a name too
    /// long to express as an LFN, or short-name aliasing exhaustion.
    #[error("{path}: {message}")]
    BadInput { path: PathBuf, message: String },

    /// The sizing solver could not find a self-consistent
    /// {FAT width, cluster size, geometry} triple for the given contents
    /// and constraints.
    #[error("{0}")]
    LayoutImpossible(String),

    /// A host or output file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn bad_input(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::BadInput {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
