//! Identity-matched supplementary contact data.
//!
//! The additional-info document lists extra phone numbers and emails for
//! contacts that are identified by UID, phone, email or nickname. The
//! enricher merges them into matching vCards.

use serde::{Deserialize, Serialize};

use crate::{CanonicalPhone, Error, Result};

const ADDITIONAL_INFO_DOCUMENT: &str = "additional_vcard_info.toml";

// ─── Identifier ──────────────────────────────────────────────────────────────

/// A composite contact identifier. At least one field is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIdentifier")]
pub struct Identifier {
  uid:       Option<String>,
  phone:     Option<CanonicalPhone>,
  email:     Option<String>,
  #[serde(rename = "nick_name")]
  nickname:  Option<String>,
}

#[derive(Deserialize)]
struct RawIdentifier {
  uid:       Option<String>,
  phone:     Option<CanonicalPhone>,
  email:     Option<String>,
  nick_name: Option<String>,
}

impl TryFrom<RawIdentifier> for Identifier {
  type Error = Error;

  fn try_from(raw: RawIdentifier) -> Result<Self> {
    Self::new(raw.uid, raw.phone, raw.email, raw.nick_name)
  }
}

impl Identifier {
  /// Returns [`Error::EmptyIdentifier`] if every field is `None`.
  pub fn new(
    uid: Option<String>,
    phone: Option<CanonicalPhone>,
    email: Option<String>,
    nickname: Option<String>,
  ) -> Result<Self> {
    if uid.is_none() && phone.is_none() && email.is_none() && nickname.is_none()
    {
      return Err(Error::EmptyIdentifier);
    }
    Ok(Self {
      uid,
      phone,
      email,
      nickname,
    })
  }

  pub fn uid(&self) -> Option<&str> { self.uid.as_deref() }

  pub fn phone(&self) -> Option<&CanonicalPhone> { self.phone.as_ref() }

  pub fn email(&self) -> Option<&str> { self.email.as_deref() }

  pub fn nickname(&self) -> Option<&str> { self.nickname.as_deref() }
}

// ─── Entries ─────────────────────────────────────────────────────────────────

/// vCard `TYPE` for an added phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhoneType {
  Cell,
  Home,
  Work,
  Other,
}

impl PhoneType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Cell => "CELL",
      Self::Home => "HOME",
      Self::Work => "WORK",
      Self::Other => "OTHER",
    }
  }
}

/// vCard `TYPE` for an added email address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmailType {
  Home,
  Work,
}

impl EmailType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Home => "HOME",
      Self::Work => "WORK",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraPhone {
  pub number:      CanonicalPhone,
  pub number_type: PhoneType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraEmail {
  pub email:      String,
  pub email_type: EmailType,
}

/// Supplementary data for one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalInfoEntry {
  pub identifiers:   Identifier,
  #[serde(default)]
  pub phone_numbers: Vec<ExtraPhone>,
  #[serde(default)]
  pub emails:        Vec<ExtraEmail>,
}

// ─── Collection ──────────────────────────────────────────────────────────────

/// All additional-info entries, as loaded from the storage document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalInfoSet {
  #[serde(default)]
  entries: Vec<AdditionalInfoEntry>,
}

impl AdditionalInfoSet {
  /// File name of the document below the storage target path.
  pub const FILE_NAME: &'static str = ADDITIONAL_INFO_DOCUMENT;

  pub fn new(entries: Vec<AdditionalInfoEntry>) -> Self { Self { entries } }

  pub fn from_toml(document: &str) -> Result<Self> {
    toml::from_str(document).map_err(|source| Error::MalformedDocument {
      document: ADDITIONAL_INFO_DOCUMENT,
      source,
    })
  }

  pub fn entries(&self) -> &[AdditionalInfoEntry] { &self.entries }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Find the entry for `identifier`, trying UID, then phone, then email, then
  /// nickname. Within one field the first matching entry wins.
  pub fn lookup(&self, identifier: &Identifier) -> Option<&AdditionalInfoEntry> {
    let by_uid = identifier.uid().and_then(|uid| {
      self.entries.iter().find(|e| e.identifiers.uid() == Some(uid))
    });
    let by_phone = || {
      identifier.phone().and_then(|phone| {
        self
          .entries
          .iter()
          .find(|e| e.identifiers.phone() == Some(phone))
      })
    };
    let by_email = || {
      identifier.email().and_then(|email| {
        self
          .entries
          .iter()
          .find(|e| e.identifiers.email() == Some(email))
      })
    };
    let by_nickname = || {
      identifier.nickname().and_then(|nick| {
        self
          .entries
          .iter()
          .find(|e| e.identifiers.nickname() == Some(nick))
      })
    };

    by_uid
      .or_else(by_phone)
      .or_else(by_email)
      .or_else(by_nickname)
  }
}
