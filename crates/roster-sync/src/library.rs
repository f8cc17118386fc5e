//! The picture library: stored profile photos plus the index document that
//! catalogs them.
//!
//! The library follows a simple lifecycle. [`PictureLibrary::load`] reads the
//! index into memory, a batch mutates it while photos are uploaded, and
//! [`PictureLibrary::persist_index`] writes the whole document back once.
//! Nothing is persisted mid-batch, so a failed batch leaves the stored index
//! untouched (photos already uploaded stay behind as orphans).

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use roster_core::{
  BoxError, CanonicalPhone,
  crawl::{CrawlItem, dedup_by_phone},
  identity::AdditionalInfoSet,
  picture::{
    PHOTO_DIR, PictureIndex, PictureRecord, StoredPictureEntry, content_hash,
    storage_path,
  },
  resource::Resource,
  storage::PictureStorage,
};
use tokio::task::JoinSet;

use crate::error::{Error, Result};

/// Counts for one batch update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
  pub uploaded:  usize,
  pub unchanged: usize,
}

impl UpdateReport {
  fn tally(&mut self, uploaded: bool) {
    if uploaded {
      self.uploaded += 1;
    } else {
      self.unchanged += 1;
    }
  }
}

pub struct PictureLibrary<S> {
  storage:     S,
  target_path: String,
  index:       Mutex<Option<PictureIndex>>,
  /// Serializes uploads of the index document.
  index_guard: tokio::sync::Mutex<()>,
}

impl<S: PictureStorage + 'static> PictureLibrary<S> {
  /// `target_path` is the storage directory holding the index documents and
  /// the `photos/` folder.
  pub fn new(storage: S, target_path: impl Into<String>) -> Self {
    Self {
      storage,
      target_path: target_path.into(),
      index: Mutex::new(None),
      index_guard: tokio::sync::Mutex::new(()),
    }
  }

  pub fn storage(&self) -> &S { &self.storage }

  pub fn target_path(&self) -> &str { &self.target_path }

  /// Storage path of `relative` below the target path.
  pub fn path(&self, relative: &str) -> String {
    let base = self.target_path.trim_matches('/');
    let relative = relative.trim_start_matches('/');
    if base.is_empty() {
      relative.to_string()
    } else {
      format!("{base}/{relative}")
    }
  }

  // ─── Documents ─────────────────────────────────────────────────────────────

  async fn read_document(&self, name: &'static str) -> Result<Option<String>> {
    let path = self.path(name);
    let Some(data) =
      self.storage.download(&path).await.map_err(Error::storage)?
    else {
      tracing::info!(path, "document not found, starting empty");
      return Ok(None);
    };
    String::from_utf8(data.to_vec())
      .map(Some)
      .map_err(|_| Error::NotUtf8(name))
  }

  /// Read the index document. A missing document is an empty index; a
  /// malformed one is an error.
  pub async fn load_index(&self) -> Result<PictureIndex> {
    Ok(match self.read_document(PictureIndex::FILE_NAME).await? {
      Some(document) => PictureIndex::from_toml(&document)?,
      None => PictureIndex::new(),
    })
  }

  pub async fn load_additional_info(&self) -> Result<AdditionalInfoSet> {
    Ok(match self.read_document(AdditionalInfoSet::FILE_NAME).await? {
      Some(document) => AdditionalInfoSet::from_toml(&document)?,
      None => AdditionalInfoSet::default(),
    })
  }

  // ─── Lifecycle ─────────────────────────────────────────────────────────────

  pub async fn load(&self) -> Result<()> {
    let index = self.load_index().await?;
    tracing::debug!(entries = index.len(), "loaded picture index");
    *self.lock_index() = Some(index);
    Ok(())
  }

  pub fn unload(&self) { *self.lock_index() = None; }

  pub fn is_loaded(&self) -> bool { self.lock_index().is_some() }

  fn lock_index(&self) -> MutexGuard<'_, Option<PictureIndex>> {
    self.index.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn with_index<T>(&self, f: impl FnOnce(&mut PictureIndex) -> T) -> Result<T> {
    self
      .lock_index()
      .as_mut()
      .map(f)
      .ok_or(Error::Core(roster_core::Error::NotLoaded("picture index")))
  }

  /// A copy of the in-memory index.
  pub fn index(&self) -> Result<PictureIndex> {
    self.with_index(|index| index.clone())
  }

  // ─── Updates ───────────────────────────────────────────────────────────────

  /// Upload one record's photo unless the index already holds the same bytes
  /// for its phone number, then record it in the in-memory index. Returns
  /// whether anything was uploaded.
  async fn store(&self, record: &PictureRecord) -> Result<bool> {
    let hash = content_hash(&record.photo);
    let current = self.with_index(|index| {
      index.get(&record.phone).is_some_and(|entry| entry.hash == hash)
    })?;
    if current {
      tracing::debug!(phone = %record.phone, "profile picture is up to date");
      return Ok(false);
    }

    // Paths derive from the phone number, so a newer photo overwrites the
    // older file in place.
    let path = self.path(&storage_path(&record.phone, &record.mime_type));
    self
      .storage
      .upload(record.photo.clone(), &path)
      .await
      .map_err(Error::storage)?;
    self.with_index(|index| index.update(record))?;
    tracing::debug!(phone = %record.phone, path, "uploaded profile picture");
    Ok(true)
  }

  /// Serialize the in-memory index and upload it.
  pub async fn persist_index(&self) -> Result<()> {
    let _guard = self.index_guard.lock().await;
    let document = self.with_index(|index| index.to_toml())??;
    let path = self.path(PictureIndex::FILE_NAME);
    self
      .storage
      .upload(Bytes::from(document), &path)
      .await
      .map_err(Error::storage)?;
    tracing::info!(path, "uploaded picture index");
    Ok(())
  }

  /// Update a single picture and, if it changed, persist the index right
  /// away.
  pub async fn update_picture(&self, record: &PictureRecord) -> Result<bool> {
    let uploaded = self.store(record).await?;
    if uploaded {
      self.persist_index().await?;
    }
    Ok(uploaded)
  }

  /// Consume `records`, keeping only the first record per phone number, and
  /// store every one of them concurrently. The index document is uploaded
  /// once after all uploads finished; any failure aborts the batch before
  /// that happens.
  pub async fn update_from_stream(
    self: &Arc<Self>,
    records: BoxStream<'_, CrawlItem>,
  ) -> Result<UpdateReport> {
    self.with_index(|_| ())?;

    let mut records = dedup_by_phone(records);
    let mut units = JoinSet::new();
    let mut report = UpdateReport::default();

    loop {
      tokio::select! {
        item = records.next() => match item {
          Some(Ok(record)) => {
            let library = Arc::clone(self);
            units.spawn(async move { library.store(&record).await });
          }
          Some(Err(e)) => return Err(Error::Crawl(e)),
          None => break,
        },
        Some(joined) = units.join_next() => report.tally(joined??),
      }
    }
    while let Some(joined) = units.join_next().await {
      report.tally(joined??);
    }

    self.persist_index().await?;
    tracing::info!(
      uploaded = report.uploaded,
      unchanged = report.unchanged,
      "updated picture library"
    );
    Ok(report)
  }

  // ─── Downloads ─────────────────────────────────────────────────────────────

  pub async fn download_picture(
    &self,
    entry: &StoredPictureEntry,
  ) -> Result<PictureRecord> {
    let path = self.path(&entry.file_path);
    let Some(data) =
      self.storage.download(&path).await.map_err(Error::storage)?
    else {
      return Err(Error::MissingFile(path));
    };
    Ok(PictureRecord::new(
      entry.phone_number.clone(),
      data,
      entry.mime_type.clone(),
    ))
  }

  /// Download the stored picture for `phone`, if the index has one.
  pub async fn download_picture_for(
    &self,
    phone: &CanonicalPhone,
  ) -> Result<Option<PictureRecord>> {
    let entry = self.with_index(|index| index.get(phone).cloned())?;
    match entry {
      Some(entry) => self.download_picture(&entry).await.map(Some),
      None => Ok(None),
    }
  }

  /// Photo files in storage that no index entry points to.
  pub async fn orphaned_photos(&self) -> Result<Vec<String>> {
    let listed = self
      .storage
      .list_paths(&self.path(PHOTO_DIR))
      .await
      .map_err(Error::storage)?;
    let indexed: HashSet<String> = self.with_index(|index| {
      index
        .entries()
        .iter()
        .map(|entry| self.path(&entry.file_path))
        .collect()
    })?;
    Ok(
      listed
        .into_iter()
        .filter(|path| !indexed.contains(path))
        .collect(),
    )
  }
}

#[async_trait]
impl<S: PictureStorage + 'static> Resource for PictureLibrary<S> {
  fn name(&self) -> &str { "picture library" }

  async fn acquire(&self) -> Result<(), BoxError> {
    self.load().await.map_err(Into::into)
  }

  async fn release(&self) -> Result<(), BoxError> {
    self.unload();
    Ok(())
  }
}
