//! Picture records and the content-addressed picture index.
//!
//! The index is the source of truth for which photo is stored for which phone
//! number. Photo files live at paths derived from the phone number, so a newer
//! picture for the same number overwrites the older file in place.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CanonicalPhone, Error, Result};

/// Directory (relative to the storage root) holding photo files.
pub const PHOTO_DIR: &str = "photos";

const INDEX_DOCUMENT: &str = "profile_pictures.toml";

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// SHA-256 hex digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}

/// The part of a MIME type after the last `/` (`image/jpeg` → `jpeg`).
pub fn mime_subtype(mime_type: &str) -> &str {
  mime_type.rsplit('/').next().unwrap_or(mime_type)
}

// ─── PictureRecord ───────────────────────────────────────────────────────────

/// One profile-picture candidate as produced by a crawler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureRecord {
  pub phone:     CanonicalPhone,
  pub photo:     Bytes,
  pub mime_type: String,
  /// Display name reported by the crawler, if any. Informational only.
  pub name:      Option<String>,
}

impl PictureRecord {
  pub fn new(
    phone: CanonicalPhone,
    photo: impl Into<Bytes>,
    mime_type: impl Into<String>,
  ) -> Self {
    Self {
      phone,
      photo: photo.into(),
      mime_type: mime_type.into(),
      name: None,
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn mime_subtype(&self) -> &str { mime_subtype(&self.mime_type) }
}

// ─── StoredPictureEntry ──────────────────────────────────────────────────────

/// One persisted index record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPictureEntry {
  pub phone_number: CanonicalPhone,
  pub mime_type:    String,
  /// Relative to the storage root, e.g. `photos/+491512345678.jpeg`.
  pub file_path:    String,
  pub hash:         String,
}

impl StoredPictureEntry {
  pub fn from_record(record: &PictureRecord) -> Self {
    Self {
      phone_number: record.phone.clone(),
      mime_type:    record.mime_type.clone(),
      file_path:    storage_path(&record.phone, &record.mime_type),
      hash:         content_hash(&record.photo),
    }
  }
}

/// Deterministic storage path for a phone number and MIME type.
pub fn storage_path(phone: &CanonicalPhone, mime_type: &str) -> String {
  format!("{PHOTO_DIR}/{phone}.{}", mime_subtype(mime_type))
}

// ─── PictureIndex ────────────────────────────────────────────────────────────

/// Phone-number-keyed catalog of stored pictures. At most one entry per
/// phone number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureIndex {
  #[serde(default)]
  profile_pictures: Vec<StoredPictureEntry>,
}

impl PictureIndex {
  /// File name of the index document below the storage target path.
  pub const FILE_NAME: &'static str = INDEX_DOCUMENT;

  pub fn new() -> Self { Self::default() }

  /// Parse an index document. Duplicate phone numbers are rejected rather
  /// than silently collapsed.
  pub fn from_toml(document: &str) -> Result<Self> {
    let index: Self =
      toml::from_str(document).map_err(|source| Error::MalformedDocument {
        document: INDEX_DOCUMENT,
        source,
      })?;

    let mut seen = std::collections::HashSet::new();
    for entry in &index.profile_pictures {
      if !seen.insert(&entry.phone_number) {
        return Err(Error::DuplicateEntry {
          document: INDEX_DOCUMENT,
          phone:    entry.phone_number.to_string(),
        });
      }
    }
    Ok(index)
  }

  pub fn to_toml(&self) -> Result<String> {
    toml::to_string(self).map_err(|source| Error::Serialization {
      document: INDEX_DOCUMENT,
      source,
    })
  }

  pub fn get(&self, phone: &CanonicalPhone) -> Option<&StoredPictureEntry> {
    self.profile_pictures.iter().find(|e| &e.phone_number == phone)
  }

  pub fn entries(&self) -> &[StoredPictureEntry] { &self.profile_pictures }

  pub fn len(&self) -> usize { self.profile_pictures.len() }

  pub fn is_empty(&self) -> bool { self.profile_pictures.is_empty() }

  /// Insert or replace the entry for `record.phone`.
  ///
  /// Returns the new entry when the index changed, or `None` when the stored
  /// hash already matches the record's content.
  pub fn update(&mut self, record: &PictureRecord) -> Option<StoredPictureEntry> {
    let entry = StoredPictureEntry::from_record(record);

    match self
      .profile_pictures
      .iter_mut()
      .find(|e| e.phone_number == record.phone)
    {
      Some(existing) if existing.hash == entry.hash => None,
      Some(existing) => {
        *existing = entry.clone();
        Some(entry)
      }
      None => {
        self.profile_pictures.push(entry.clone());
        Some(entry)
      }
    }
  }
}
