//! Crawl the profile pictures of Telegram contacts.
//!
//! The MTProto session itself sits behind [`TelegramSession`]: logging in
//! needs an API id, a session file and, the first time, an interactive login
//! code. The crawler connects on acquire, lists the contacts, and downloads
//! the big profile photo of every contact that has both a phone number and a
//! photo.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
  future,
  stream::{self, BoxStream, StreamExt, TryStreamExt},
};
use roster_core::{
  BoxError, CanonicalPhone,
  crawl::{CrawlItem, Crawler},
  picture::PictureRecord,
  resource::Resource,
};

use crate::mime::image_mime_type;

/// Profile photos are JPEG unless the download says otherwise.
const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// One entry of the account's contact list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramContact {
  pub id:            i64,
  pub first_name:    String,
  /// International number without the leading `+`, as Telegram reports it.
  pub phone_number:  Option<String>,
  /// File id of the big profile photo.
  pub photo_file_id: Option<String>,
}

/// A downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
  pub file_name: String,
  pub data:      Bytes,
}

/// A logged-in MTProto session.
#[async_trait]
pub trait TelegramSession: Send + Sync {
  async fn connect(&self) -> Result<(), BoxError>;

  async fn disconnect(&self) -> Result<(), BoxError>;

  async fn contacts(&self) -> Result<Vec<TelegramContact>, BoxError>;

  /// `None` when the file is no longer available.
  async fn download(&self, file_id: &str) -> Result<Option<Download>, BoxError>;
}

pub struct TelegramCrawler<S> {
  session: S,
}

impl<S: TelegramSession> TelegramCrawler<S> {
  /// Photos downloaded at the same time.
  pub const CONCURRENT_DOWNLOADS: usize = 8;

  pub fn new(session: S) -> Self { Self { session } }

  pub fn session(&self) -> &S { &self.session }

  async fn picture_for(
    &self,
    contact: TelegramContact,
  ) -> Result<Option<PictureRecord>, BoxError> {
    let (Some(phone), Some(file_id)) =
      (&contact.phone_number, &contact.photo_file_id)
    else {
      tracing::debug!(
        contact = contact.id,
        name = contact.first_name,
        "no phone number or no profile photo, skipping"
      );
      return Ok(None);
    };

    let Some(download) = self.session.download(file_id).await? else {
      tracing::warn!(
        contact = contact.id,
        name = contact.first_name,
        "failed to download profile picture"
      );
      return Ok(None);
    };

    let mime_type = image_mime_type(Path::new(&download.file_name))
      .unwrap_or(DEFAULT_MIME_TYPE);
    let phone =
      CanonicalPhone::parse(&format!("+{}", phone.trim_start_matches('+')));
    tracing::debug!(%phone, name = contact.first_name, "found profile picture");
    Ok(Some(
      PictureRecord::new(phone, download.data, mime_type)
        .with_name(contact.first_name),
    ))
  }
}

#[async_trait]
impl<S: TelegramSession> Resource for TelegramCrawler<S> {
  fn name(&self) -> &str { "telegram crawler" }

  async fn acquire(&self) -> Result<(), BoxError> { self.session.connect().await }

  async fn release(&self) -> Result<(), BoxError> {
    self.session.disconnect().await
  }
}

impl<S: TelegramSession> Crawler for TelegramCrawler<S> {
  fn crawl(&self) -> BoxStream<'_, CrawlItem> {
    stream::once(self.session.contacts())
      .map_ok(|contacts| {
        stream::iter(contacts.into_iter().map(Ok::<_, BoxError>))
      })
      .try_flatten()
      .map_ok(|contact| self.picture_for(contact))
      .try_buffer_unordered(Self::CONCURRENT_DOWNLOADS)
      .try_filter_map(|record| future::ready(Ok(record)))
      .boxed()
  }
}
