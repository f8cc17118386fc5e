//! Entity records and collection snapshots.
//!
//! A snapshot is a point-in-time read of one remote collection. It is built
//! once at the start of a pass and dropped at the end; nothing in Roster
//! caches a snapshot across runs.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

// ─── Snapshot mode ───────────────────────────────────────────────────────────

/// How much of each entity a snapshot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
  /// Only etag / length / modified time; bodies are fetched on demand.
  Metadata,
  /// Full serialized content for every entity.
  Full,
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Lightweight metadata reported by the remote for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMeta {
  pub etag:           Option<String>,
  pub content_length: Option<u64>,
  /// `None` when the remote did not report a (parseable) timestamp. Such an
  /// entity sorts before every dated one.
  pub last_modified:  Option<DateTime<Utc>>,
}

/// One contact entity as seen in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
  pub uid:     String,
  /// Present only in [`SnapshotMode::Full`] snapshots.
  pub content: Option<Bytes>,
  pub meta:    EntityMeta,
}

impl EntityRecord {
  pub fn with_meta(uid: impl Into<String>, meta: EntityMeta) -> Self {
    Self {
      uid: uid.into(),
      content: None,
      meta,
    }
  }

  pub fn with_content(uid: impl Into<String>, content: Bytes) -> Self {
    let meta = EntityMeta {
      content_length: Some(content.len() as u64),
      ..EntityMeta::default()
    };
    Self {
      uid: uid.into(),
      content: Some(content),
      meta,
    }
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Mapping UID → [`EntityRecord`] for one collection at one point in time.
///
/// UIDs are unique by construction; inserting a record for a UID that is
/// already present replaces the earlier one.
#[derive(Debug, Clone, Default)]
pub struct CollectionSnapshot {
  entities: BTreeMap<String, EntityRecord>,
}

impl CollectionSnapshot {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, record: EntityRecord) {
    self.entities.insert(record.uid.clone(), record);
  }

  pub fn get(&self, uid: &str) -> Option<&EntityRecord> {
    self.entities.get(uid)
  }

  pub fn contains(&self, uid: &str) -> bool { self.entities.contains_key(uid) }

  pub fn len(&self) -> usize { self.entities.len() }

  pub fn is_empty(&self) -> bool { self.entities.is_empty() }

  /// Iterate records in UID order.
  pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
    self.entities.values()
  }

  pub fn uids(&self) -> impl Iterator<Item = &str> {
    self.entities.keys().map(String::as_str)
  }
}

impl FromIterator<EntityRecord> for CollectionSnapshot {
  fn from_iter<I: IntoIterator<Item = EntityRecord>>(iter: I) -> Self {
    let mut snapshot = Self::new();
    for record in iter {
      snapshot.insert(record);
    }
    snapshot
  }
}

impl IntoIterator for CollectionSnapshot {
  type IntoIter = std::collections::btree_map::IntoValues<String, EntityRecord>;
  type Item = EntityRecord;

  fn into_iter(self) -> Self::IntoIter { self.entities.into_values() }
}
