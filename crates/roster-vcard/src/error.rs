//! Error types for the roster-vcard codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("vCard missing BEGIN/END:VCARD envelope")]
  MissingEnvelope,

  #[error("malformed content-line: {0}")]
  MalformedContentLine(String),

  #[error("vCard is not valid UTF-8: {0}")]
  NotUtf8(#[from] std::str::Utf8Error),

  #[error("PHOTO value is not valid base64: {0}")]
  InvalidPhoto(#[from] base64::DecodeError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
