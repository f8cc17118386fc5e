//! Error types for the crawlers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0} is not a directory")]
  NotADirectory(PathBuf),

  #[error("executable not found: {path}: {source}")]
  ExecutableMissing {
    path:   PathBuf,
    #[source]
    source: which::Error,
  },

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
