//! Augment vCards with data kept next to the picture library: extra phone
//! numbers and emails from the additional-info document, and a stored
//! profile picture.
//!
//! Enrichment is additive. Existing properties are never changed or removed;
//! a photo is only attached to cards that have none.

use std::{
  collections::HashSet,
  sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use bytes::Bytes;
use roster_core::{
  BoxError, CanonicalPhone,
  identity::{AdditionalInfoSet, Identifier},
  picture::PictureIndex,
  resource::Resource,
  storage::PictureStorage,
};
use roster_vcard::Card;

use crate::{
  error::{Error, Result},
  library::PictureLibrary,
};

/// Something that can rewrite a vCard body before it is merged.
#[async_trait]
pub trait Enrich: Send + Sync {
  /// Return the enriched body. A body that gains nothing is returned
  /// unchanged, byte for byte.
  async fn enrich(&self, body: Bytes) -> Result<Bytes>;
}

/// What a single enrichment added to a card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Additions {
  pub phones:  Vec<String>,
  pub emails:  Vec<String>,
  pub picture: bool,
}

impl Additions {
  pub fn is_empty(&self) -> bool {
    self.phones.is_empty() && self.emails.is_empty() && !self.picture
  }

  /// The audit text appended to the card's note.
  pub fn summary(&self) -> String {
    let mut lines = vec!["Added by Roster:".to_string()];
    if !self.phones.is_empty() {
      lines.push(format!("Phone numbers: {}", self.phones.join(", ")));
    }
    if !self.emails.is_empty() {
      lines.push(format!("Emails: {}", self.emails.join(", ")));
    }
    if self.picture {
      lines.push("Profile picture".to_string());
    }
    lines.join("\n")
  }
}

struct Lookups {
  index: PictureIndex,
  info:  AdditionalInfoSet,
}

pub struct Enricher<S> {
  library: Arc<PictureLibrary<S>>,
  lookups: RwLock<Option<Arc<Lookups>>>,
}

/// The identifier used to find a card's additional-info entry: the first
/// `CELL` number (else the first number), the last email, the nickname and
/// the UID.
pub fn card_identifier(card: &Card) -> Option<Identifier> {
  let phones = card.phones();
  let phone = phones
    .iter()
    .find(|p| p.types.iter().any(|t| t == "CELL"))
    .or_else(|| phones.first())
    .map(|p| CanonicalPhone::parse(&p.number));
  let email = card.emails().pop().map(|e| e.address);
  Identifier::new(card.uid(), phone, email, card.nickname()).ok()
}

impl<S: PictureStorage + 'static> Enricher<S> {
  pub fn new(library: Arc<PictureLibrary<S>>) -> Self {
    Self {
      library,
      lookups: RwLock::new(None),
    }
  }

  fn lookups(&self) -> Result<Arc<Lookups>> {
    self
      .lookups
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
      .ok_or(Error::Core(roster_core::Error::NotLoaded("enricher")))
  }

  fn set_lookups(&self, lookups: Option<Arc<Lookups>>) {
    *self.lookups.write().unwrap_or_else(PoisonError::into_inner) = lookups;
  }

  /// Enrich `card` in place and report what was added.
  pub async fn enrich_card(&self, card: &mut Card) -> Result<Additions> {
    let lookups = self.lookups()?;
    let mut additions = Additions::default();

    let existing: Vec<CanonicalPhone> = card
      .phones()
      .iter()
      .map(|p| CanonicalPhone::parse(&p.number))
      .collect();
    let mut added: Vec<CanonicalPhone> = Vec::new();

    let entry = card_identifier(card).and_then(|id| lookups.info.lookup(&id));
    if let Some(entry) = entry {
      let mut known: HashSet<CanonicalPhone> = existing.iter().cloned().collect();
      for extra in &entry.phone_numbers {
        if known.insert(extra.number.clone()) {
          card.add_phone(extra.number.as_str(), extra.number_type.as_str());
          added.push(extra.number.clone());
        }
      }

      let mut emails: HashSet<String> =
        card.emails().into_iter().map(|e| e.address).collect();
      for extra in &entry.emails {
        if emails.insert(extra.email.clone()) {
          card.add_email(&extra.email, extra.email_type.as_str());
          additions.emails.push(extra.email.clone());
        }
      }
    }
    additions.phones = added.iter().map(ToString::to_string).collect();

    if !card.has_photo() {
      let stored = existing
        .iter()
        .chain(&added)
        .find_map(|phone| lookups.index.get(phone))
        .cloned();
      if let Some(stored) = stored {
        let picture = self.library.download_picture(&stored).await?;
        card.set_photo(&picture.photo, &picture.mime_type);
        additions.picture = true;
      }
    }

    if !additions.is_empty() {
      let note = match card.note() {
        Some(note) if !note.is_empty() => {
          format!("{note}\n----\n{}", additions.summary())
        }
        _ => additions.summary(),
      };
      card.set_note(&note);
    }
    Ok(additions)
  }
}

#[async_trait]
impl<S: PictureStorage + 'static> Enrich for Enricher<S> {
  async fn enrich(&self, body: Bytes) -> Result<Bytes> {
    let mut card = match Card::from_bytes(&body) {
      Ok(card) => card,
      Err(e) => {
        tracing::warn!(error = %e, "cannot parse vCard, merging it unchanged");
        return Ok(body);
      }
    };

    let additions = self.enrich_card(&mut card).await?;
    if additions.is_empty() {
      return Ok(body);
    }
    let uid = card.uid().unwrap_or_default();
    tracing::info!(
      uid,
      phones = additions.phones.len(),
      emails = additions.emails.len(),
      picture = additions.picture,
      "enriched vCard"
    );
    Ok(Bytes::from(card.serialize()))
  }
}

#[async_trait]
impl<S: PictureStorage + 'static> Resource for Enricher<S> {
  fn name(&self) -> &str { "enricher" }

  async fn acquire(&self) -> Result<(), BoxError> {
    let (index, info) = tokio::try_join!(
      self.library.load_index(),
      self.library.load_additional_info()
    )?;
    tracing::debug!(
      pictures = index.len(),
      entries = info.entries().len(),
      "loaded enrichment data"
    );
    self.set_lookups(Some(Arc::new(Lookups { index, info })));
    Ok(())
  }

  async fn release(&self) -> Result<(), BoxError> {
    self.set_lookups(None);
    Ok(())
  }
}
