//! Error types for the reconciliation engine.

use roster_core::BoxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("address book {id}: {source}")]
  Collection {
    id:     String,
    #[source]
    source: BoxError,
  },

  #[error("picture storage: {0}")]
  Storage(#[source] BoxError),

  #[error("stored file {0} is missing")]
  MissingFile(String),

  #[error("{0} is not valid UTF-8")]
  NotUtf8(&'static str),

  #[error("crawler failed: {0}")]
  Crawl(#[source] BoxError),

  #[error(transparent)]
  Core(#[from] roster_core::Error),

  #[error(transparent)]
  Vcard(#[from] roster_vcard::Error),

  #[error("task failed: {0}")]
  Join(#[from] tokio::task::JoinError),

  #[error("upload limiter closed")]
  Limiter(#[from] tokio::sync::AcquireError),
}

impl Error {
  pub(crate) fn collection<E>(id: &str) -> impl FnOnce(E) -> Self + '_
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    move |source| Self::Collection {
      id:     id.to_string(),
      source: Box::new(source),
    }
  }

  pub(crate) fn storage<E>(source: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Storage(Box::new(source))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
