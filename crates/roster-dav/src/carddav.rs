//! CardDAV address-book client.

use bytes::Bytes;
use reqwest::{Method, StatusCode, header};
use roster_core::{
  collection::RemoteCollection,
  entity::{CollectionSnapshot, EntityMeta, EntityRecord, SnapshotMode},
};
use roster_vcard::Card;
use serde::Deserialize;
use url::Url;

use crate::{
  error::{Error, Result},
  transport::{RetryPolicy, Transport, propfind},
  xml::{PROPFIND_BODY, parse_multistatus, uid_from_href},
};

/// Connection settings for one address book.
#[derive(Debug, Clone, Deserialize)]
pub struct CardDavConfig {
  pub username:         String,
  pub password:         String,
  pub address_book_url: String,
}

/// A [`RemoteCollection`] backed by one CardDAV address book.
///
/// Entities live at `<address_book_url>/<uid>.vcf`. At most
/// [`CardDavClient::MAX_CONCURRENT_REQUESTS`] requests are in flight at once.
pub struct CardDavClient {
  transport: Transport,
  base:      Url,
}

impl CardDavClient {
  pub const MAX_CONCURRENT_REQUESTS: usize = 50;

  pub fn new(config: &CardDavConfig) -> Result<Self> {
    Self::with_retry(config, RetryPolicy::default())
  }

  pub fn with_retry(config: &CardDavConfig, retry: RetryPolicy) -> Result<Self> {
    let mut base = Url::parse(&config.address_book_url)?;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }
    Ok(Self {
      transport: Transport::new(
        &config.username,
        &config.password,
        Self::MAX_CONCURRENT_REQUESTS,
        retry,
      )?,
      base,
    })
  }

  pub fn address_book_url(&self) -> &Url { &self.base }

  fn resource_url(&self, uid: &str) -> Result<Url> {
    Ok(self.base.join(&format!("{}.vcf", urlencoding::encode(uid)))?)
  }

  async fn list_metadata(&self) -> Result<CollectionSnapshot> {
    let method = propfind()?;
    let body = self
      .transport
      .send(method.clone(), &self.base, |req| {
        req
          .header("Depth", "1")
          .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
          .body(PROPFIND_BODY)
      })
      .await?
      .success(&method, &self.base)?;

    let mut snapshot = CollectionSnapshot::new();
    for resp in parse_multistatus(&body)? {
      if resp.is_collection {
        continue;
      }
      let Some(uid) = uid_from_href(&resp.href) else {
        continue;
      };
      let meta = EntityMeta {
        last_modified:  resp.last_modified_at(),
        content_length: Some(resp.content_length.unwrap_or(0)),
        etag:           resp.etag,
      };
      snapshot.insert(EntityRecord::with_meta(uid, meta));
    }

    tracing::debug!(
      url = %self.base,
      entities = snapshot.len(),
      "listed address book"
    );
    Ok(snapshot)
  }

  async fn list_full(&self) -> Result<CollectionSnapshot> {
    let mut url = self.base.clone();
    url.set_query(Some("export"));

    let body = self
      .transport
      .send(Method::GET, &url, |req| req)
      .await?
      .success(&Method::GET, &url)?;
    let text = std::str::from_utf8(&body)
      .map_err(|e| Error::Vcard(roster_vcard::Error::NotUtf8(e)))?;

    let mut snapshot = CollectionSnapshot::new();
    for raw in roster_vcard::split_cards(text) {
      let uid = match Card::parse(raw) {
        Ok(card) => card.uid(),
        Err(e) => {
          tracing::warn!(url = %self.base, error = %e, "skipping unparseable vCard");
          continue;
        }
      };
      let Some(uid) = uid else {
        tracing::warn!(url = %self.base, "skipping vCard without UID");
        continue;
      };
      snapshot.insert(EntityRecord::with_content(
        uid,
        Bytes::copy_from_slice(raw.as_bytes()),
      ));
    }

    tracing::debug!(
      url = %self.base,
      entities = snapshot.len(),
      "exported address book"
    );
    Ok(snapshot)
  }
}

impl RemoteCollection for CardDavClient {
  type Error = Error;

  async fn list_entities(&self, mode: SnapshotMode) -> Result<CollectionSnapshot> {
    match mode {
      SnapshotMode::Metadata => self.list_metadata().await,
      SnapshotMode::Full => self.list_full().await,
    }
  }

  async fn fetch_entity<'a>(&'a self, uid: &'a str) -> Result<Bytes> {
    let url = self.resource_url(uid)?;
    let reply = self.transport.send(Method::GET, &url, |req| req).await?;
    if reply.status == StatusCode::NOT_FOUND {
      return Err(Error::NotFound(url.to_string()));
    }
    reply.success(&Method::GET, &url)
  }

  async fn put_entity<'a>(
    &'a self,
    uid: &'a str,
    body: Bytes,
    if_match: Option<&'a str>,
  ) -> Result<()> {
    let url = self.resource_url(uid)?;
    self
      .transport
      .send(Method::PUT, &url, |req| {
        let req = req.header(header::CONTENT_TYPE, "text/vcard").body(body);
        match if_match {
          Some(tag) => req.header(header::IF_MATCH, tag),
          None => req,
        }
      })
      .await?
      .success(&Method::PUT, &url)?;
    tracing::debug!(%url, "uploaded vCard");
    Ok(())
  }

  async fn delete_entity<'a>(&'a self, uid: &'a str) -> Result<()> {
    let url = self.resource_url(uid)?;
    self
      .transport
      .send(Method::DELETE, &url, |req| req)
      .await?
      .success(&Method::DELETE, &url)?;
    tracing::debug!(%url, "deleted vCard");
    Ok(())
  }
}
