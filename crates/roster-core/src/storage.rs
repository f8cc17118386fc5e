//! The `PictureStorage` trait: a flat file store addressed by relative paths.

use std::future::Future;

use bytes::Bytes;

pub trait PictureStorage: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// List the file paths directly below `prefix`.
  fn list_paths<'a>(
    &'a self,
    prefix: &'a str,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  /// Download a file. Returns `None` if it does not exist.
  fn download<'a>(
    &'a self,
    path: &'a str,
  ) -> impl Future<Output = Result<Option<Bytes>, Self::Error>> + Send + 'a;

  /// Create or overwrite a file.
  fn upload<'a>(
    &'a self,
    data: Bytes,
    path: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
