//! WebDAV file storage (Nextcloud layout).

use bytes::Bytes;
use reqwest::{Method, StatusCode, header};
use roster_core::storage::PictureStorage;
use serde::Deserialize;
use url::Url;

use crate::{
  error::{Error, Result},
  transport::{RetryPolicy, Transport, propfind},
  xml::{PROPFIND_BODY, parse_multistatus},
};

/// Connection settings for the picture storage.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  pub username:    String,
  pub password:    String,
  pub base_url:    String,
  /// Directory below the user's root holding the index documents and the
  /// `photos/` folder. Must already exist.
  pub target_path: String,
}

/// A [`PictureStorage`] on a Nextcloud instance.
///
/// Paths are relative to the user's files root,
/// `<base_url>/remote.php/dav/files/<username>/`.
pub struct WebDavStorage {
  transport: Transport,
  root:      Url,
}

impl WebDavStorage {
  pub const MAX_CONCURRENT_REQUESTS: usize = 32;

  pub fn new(config: &StorageConfig) -> Result<Self> {
    Self::with_retry(config, RetryPolicy::default())
  }

  pub fn with_retry(config: &StorageConfig, retry: RetryPolicy) -> Result<Self> {
    let base = config.base_url.trim_end_matches('/');
    let root = Url::parse(&format!(
      "{base}/remote.php/dav/files/{}/",
      urlencoding::encode(&config.username)
    ))?;
    Ok(Self {
      transport: Transport::new(
        &config.username,
        &config.password,
        Self::MAX_CONCURRENT_REQUESTS,
        retry,
      )?,
      root,
    })
  }

  pub fn root(&self) -> &Url { &self.root }

  fn file_url(&self, path: &str) -> Result<Url> {
    let encoded: Vec<String> = path
      .trim_start_matches('/')
      .split('/')
      .map(|segment| urlencoding::encode(segment).into_owned())
      .collect();
    Ok(self.root.join(&encoded.join("/"))?)
  }

  /// Turn an href from a multistatus body into a path relative to the root.
  fn relative_path(&self, href: &str) -> Option<String> {
    let path = match Url::parse(href) {
      Ok(absolute) => absolute.path().to_string(),
      Err(_) => href.to_string(),
    };
    let rest = path.strip_prefix(self.root.path())?;
    urlencoding::decode(rest).ok().map(|s| s.into_owned())
  }
}

impl PictureStorage for WebDavStorage {
  type Error = Error;

  async fn list_paths<'a>(&'a self, prefix: &'a str) -> Result<Vec<String>> {
    let dir = format!("{}/", prefix.trim_end_matches('/'));
    let url = self.file_url(&dir)?;
    let method = propfind()?;
    let body = self
      .transport
      .send(method.clone(), &url, |req| {
        req
          .header("Depth", "1")
          .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
          .body(PROPFIND_BODY)
      })
      .await?
      .success(&method, &url)?;

    Ok(
      parse_multistatus(&body)?
        .into_iter()
        .filter(|resp| !resp.is_collection)
        .filter_map(|resp| self.relative_path(&resp.href))
        .collect(),
    )
  }

  async fn download<'a>(&'a self, path: &'a str) -> Result<Option<Bytes>> {
    let url = self.file_url(path)?;
    let reply = self.transport.send(Method::GET, &url, |req| req).await?;
    if reply.status == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    reply.success(&Method::GET, &url).map(Some)
  }

  async fn upload<'a>(&'a self, data: Bytes, path: &'a str) -> Result<()> {
    let url = self.file_url(path)?;
    self
      .transport
      .send(Method::PUT, &url, |req| req.body(data))
      .await?
      .success(&Method::PUT, &url)?;
    tracing::debug!(%url, "uploaded file");
    Ok(())
  }
}
