//! The `RemoteCollection` trait.
//!
//! Implemented by remote backends (e.g. `roster-dav`'s CardDAV client) and by
//! [`crate::memory::MemoryCollection`]. The reconciliation engine depends on
//! this abstraction, never on a concrete client.

use std::future::Future;

use bytes::Bytes;

use crate::entity::{CollectionSnapshot, SnapshotMode};

/// One directory-like remote endpoint holding entities addressed by UID.
///
/// Implementations bound their own concurrency; callers may issue any number
/// of simultaneous requests. All methods return `Send` futures so collections
/// can be shared across spawned tasks.
pub trait RemoteCollection: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read the whole collection, either as metadata or with full bodies.
  fn list_entities(
    &self,
    mode: SnapshotMode,
  ) -> impl Future<Output = Result<CollectionSnapshot, Self::Error>> + Send + '_;

  /// Download the serialized body of one entity.
  fn fetch_entity<'a>(
    &'a self,
    uid: &'a str,
  ) -> impl Future<Output = Result<Bytes, Self::Error>> + Send + 'a;

  /// Create or overwrite an entity. When `if_match` is given the write only
  /// succeeds if the remote entity still carries that tag.
  fn put_entity<'a>(
    &'a self,
    uid: &'a str,
    body: Bytes,
    if_match: Option<&'a str>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn delete_entity<'a>(
    &'a self,
    uid: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
