//! Crawl profile pictures from a local directory.
//!
//! Every image file directly inside the directory is one picture; its file
//! stem is the phone number (`+491512345678.jpg`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use roster_core::{
  BoxError, CanonicalPhone,
  crawl::{CrawlItem, Crawler},
  picture::PictureRecord,
  resource::Resource,
};
use serde::Deserialize;
use tokio::fs::{self, ReadDir};

use crate::{error::Error, mime::image_mime_type};

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryCrawlerConfig {
  pub directory: PathBuf,
}

pub struct DirectoryCrawler {
  directory: PathBuf,
}

impl DirectoryCrawler {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  pub fn from_config(config: &DirectoryCrawlerConfig) -> Self {
    Self::new(&config.directory)
  }

  pub fn directory(&self) -> &Path { &self.directory }
}

/// Read one directory entry into a record, or `None` if it should be skipped.
pub(crate) async fn load_picture(
  path: &Path,
  phone: &str,
  name: Option<&str>,
) -> Result<Option<PictureRecord>, BoxError> {
  if !fs::metadata(path).await?.is_file() {
    return Ok(None);
  }
  if !phone.chars().any(|c| c.is_ascii_digit()) {
    tracing::warn!(path = %path.display(), "file name is not a phone number, skipping");
    return Ok(None);
  }
  let Some(mime_type) = image_mime_type(path) else {
    tracing::warn!(path = %path.display(), "unsupported file extension, skipping");
    return Ok(None);
  };

  let photo = Bytes::from(fs::read(path).await?);
  let record =
    PictureRecord::new(CanonicalPhone::parse(phone), photo, mime_type);
  Ok(Some(match name {
    Some(name) => record.with_name(name),
    None => record,
  }))
}

/// Pull entries from `entries` until one yields a record.
async fn next_picture(
  entries: &mut ReadDir,
) -> Result<Option<PictureRecord>, BoxError> {
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
      continue;
    };
    let stem = stem.to_string();
    if let Some(record) = load_picture(&path, &stem, None).await? {
      return Ok(Some(record));
    }
  }
  Ok(None)
}

#[async_trait]
impl Resource for DirectoryCrawler {
  fn name(&self) -> &str { "directory crawler" }

  async fn acquire(&self) -> Result<(), BoxError> {
    match fs::metadata(&self.directory).await {
      Ok(meta) if meta.is_dir() => Ok(()),
      _ => Err(Error::NotADirectory(self.directory.clone()).into()),
    }
  }

  async fn release(&self) -> Result<(), BoxError> { Ok(()) }
}

impl Crawler for DirectoryCrawler {
  fn crawl(&self) -> BoxStream<'_, CrawlItem> {
    stream::try_unfold(None::<ReadDir>, move |entries| async move {
      let mut entries = match entries {
        Some(entries) => entries,
        None => fs::read_dir(&self.directory).await?,
      };
      Ok::<_, BoxError>(
        next_picture(&mut entries)
          .await?
          .map(|record| (record, Some(entries))),
      )
    })
    .boxed()
  }
}
