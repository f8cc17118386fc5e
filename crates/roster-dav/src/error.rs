//! Error types for the DAV clients.

use reqwest::{Method, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{method} {url} returned {status}")]
  Status {
    method: Method,
    url:    String,
    status: StatusCode,
  },

  #[error("not found: {0}")]
  NotFound(String),

  #[error("xml error: {0}")]
  Xml(String),

  #[error("invalid url: {0}")]
  Url(#[from] url::ParseError),

  #[error("invalid request: {0}")]
  Request(String),

  #[error("vcard error: {0}")]
  Vcard(#[from] roster_vcard::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
