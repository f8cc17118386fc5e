//! Error types for `roster-core`.

use thiserror::Error;

/// Type-erased error used at trait seams where implementors bring their own
/// error types (crawlers, resources).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
  #[error(
    "identifier needs at least one of uid, phone, email or nick_name"
  )]
  EmptyIdentifier,

  #[error("malformed {document}: {source}")]
  MalformedDocument {
    document: &'static str,
    #[source]
    source:   toml::de::Error,
  },

  #[error("{document} lists phone number {phone} more than once")]
  DuplicateEntry {
    document: &'static str,
    phone:    String,
  },

  #[error("failed to serialise {document}: {source}")]
  Serialization {
    document: &'static str,
    #[source]
    source:   toml::ser::Error,
  },

  #[error("{0} is not loaded; acquire it first")]
  NotLoaded(&'static str),

  #[error("failed to acquire {name}: {source}")]
  Acquire {
    name:   String,
    #[source]
    source: BoxError,
  },

  #[error("entity not found: {0}")]
  EntityNotFound(String),

  #[error("precondition failed for {0}")]
  PreconditionFailed(String),

  #[error("remote unavailable: {0}")]
  Unavailable(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
