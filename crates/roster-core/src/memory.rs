//! In-memory backends for [`RemoteCollection`] and [`PictureStorage`].
//!
//! Used by the engine's tests and handy for dry runs. Both backends record
//! every write so callers can assert on exactly what was sent.

use std::{
  collections::{BTreeMap, HashSet},
  sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicUsize, Ordering},
  },
};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  collection::RemoteCollection,
  entity::{CollectionSnapshot, EntityMeta, EntityRecord, SnapshotMode},
  picture::content_hash,
  storage::PictureStorage,
};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Collection ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoredEntity {
  body:     Bytes,
  etag:     String,
  modified: DateTime<Utc>,
}

impl StoredEntity {
  fn new(body: Bytes, modified: DateTime<Utc>) -> Self {
    let etag = format!("\"{}\"", &content_hash(&body)[..16]);
    Self {
      body,
      etag,
      modified,
    }
  }
}

/// A [`RemoteCollection`] held entirely in memory.
#[derive(Default)]
pub struct MemoryCollection {
  entities:    Mutex<BTreeMap<String, StoredEntity>>,
  puts:        Mutex<Vec<(String, Bytes)>>,
  failing:     Mutex<HashSet<String>>,
  list_calls:  AtomicUsize,
  fetch_calls: AtomicUsize,
}

impl MemoryCollection {
  pub fn new() -> Self { Self::default() }

  /// Seed an entity modified "now".
  pub fn insert(&self, uid: &str, body: impl Into<Bytes>) {
    self.insert_at(uid, body, Utc::now());
  }

  /// Seed an entity with an explicit modification time.
  pub fn insert_at(
    &self,
    uid: &str,
    body: impl Into<Bytes>,
    modified: DateTime<Utc>,
  ) {
    let entity = StoredEntity::new(body.into(), modified);
    locked(&self.entities).insert(uid.to_string(), entity);
  }

  pub fn body(&self, uid: &str) -> Option<Bytes> {
    locked(&self.entities).get(uid).map(|e| e.body.clone())
  }

  pub fn len(&self) -> usize { locked(&self.entities).len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Every `(uid, body)` written through [`RemoteCollection::put_entity`], in
  /// call order.
  pub fn puts(&self) -> Vec<(String, Bytes)> { locked(&self.puts).clone() }

  pub fn fetch_calls(&self) -> usize { self.fetch_calls.load(Ordering::SeqCst) }

  pub fn list_calls(&self) -> usize { self.list_calls.load(Ordering::SeqCst) }

  /// Forget recorded writes and call counts; stored entities are kept.
  pub fn reset_log(&self) {
    locked(&self.puts).clear();
    self.fetch_calls.store(0, Ordering::SeqCst);
    self.list_calls.store(0, Ordering::SeqCst);
  }

  /// Make every subsequent write to `uid` fail.
  pub fn fail_writes_to(&self, uid: &str) {
    locked(&self.failing).insert(uid.to_string());
  }
}

impl RemoteCollection for MemoryCollection {
  type Error = Error;

  async fn list_entities(&self, mode: SnapshotMode) -> Result<CollectionSnapshot> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);
    let entities = locked(&self.entities);
    Ok(
      entities
        .iter()
        .map(|(uid, e)| {
          let meta = EntityMeta {
            etag:           Some(e.etag.clone()),
            content_length: Some(e.body.len() as u64),
            last_modified:  Some(e.modified),
          };
          EntityRecord {
            uid: uid.clone(),
            content: (mode == SnapshotMode::Full).then(|| e.body.clone()),
            meta,
          }
        })
        .collect(),
    )
  }

  async fn fetch_entity<'a>(&'a self, uid: &'a str) -> Result<Bytes> {
    self.fetch_calls.fetch_add(1, Ordering::SeqCst);
    self
      .body(uid)
      .ok_or_else(|| Error::EntityNotFound(uid.to_string()))
  }

  async fn put_entity<'a>(
    &'a self,
    uid: &'a str,
    body: Bytes,
    if_match: Option<&'a str>,
  ) -> Result<()> {
    if locked(&self.failing).contains(uid) {
      return Err(Error::Unavailable(format!("write to {uid}")));
    }

    let mut entities = locked(&self.entities);
    if let Some(tag) = if_match {
      let current = entities.get(uid).map(|e| e.etag.trim_matches('"'));
      if current != Some(tag.trim_matches('"')) {
        return Err(Error::PreconditionFailed(uid.to_string()));
      }
    }
    entities.insert(uid.to_string(), StoredEntity::new(body.clone(), Utc::now()));
    drop(entities);

    locked(&self.puts).push((uid.to_string(), body));
    Ok(())
  }

  async fn delete_entity<'a>(&'a self, uid: &'a str) -> Result<()> {
    locked(&self.entities)
      .remove(uid)
      .map(|_| ())
      .ok_or_else(|| Error::EntityNotFound(uid.to_string()))
  }
}

// ─── Storage ─────────────────────────────────────────────────────────────────

/// A [`PictureStorage`] held entirely in memory.
#[derive(Default)]
pub struct MemoryStorage {
  files:   Mutex<BTreeMap<String, Bytes>>,
  uploads: Mutex<Vec<String>>,
  failing: Mutex<HashSet<String>>,
}

impl MemoryStorage {
  pub fn new() -> Self { Self::default() }

  /// Seed a file without recording an upload.
  pub fn insert(&self, path: &str, data: impl Into<Bytes>) {
    locked(&self.files).insert(path.to_string(), data.into());
  }

  pub fn file(&self, path: &str) -> Option<Bytes> {
    locked(&self.files).get(path).cloned()
  }

  /// Every uploaded path, in call order.
  pub fn uploads(&self) -> Vec<String> { locked(&self.uploads).clone() }

  pub fn reset_log(&self) { locked(&self.uploads).clear(); }

  /// Make every subsequent upload to `path` fail.
  pub fn fail_uploads_to(&self, path: &str) {
    locked(&self.failing).insert(path.to_string());
  }
}

impl PictureStorage for MemoryStorage {
  type Error = Error;

  async fn list_paths<'a>(&'a self, prefix: &'a str) -> Result<Vec<String>> {
    let dir = format!("{}/", prefix.trim_end_matches('/'));
    Ok(
      locked(&self.files)
        .keys()
        .filter(|path| {
          path
            .strip_prefix(&dir)
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
        })
        .cloned()
        .collect(),
    )
  }

  async fn download<'a>(&'a self, path: &'a str) -> Result<Option<Bytes>> {
    Ok(self.file(path))
  }

  async fn upload<'a>(&'a self, data: Bytes, path: &'a str) -> Result<()> {
    if locked(&self.failing).contains(path) {
      return Err(Error::Unavailable(format!("upload to {path}")));
    }
    locked(&self.files).insert(path.to_string(), data);
    locked(&self.uploads).push(path.to_string());
    Ok(())
  }
}
