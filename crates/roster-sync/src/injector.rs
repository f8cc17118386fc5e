//! Inject crawled profile pictures into existing contacts.
//!
//! Every target address book is exported once up front. Crawler streams are
//! merged and deduplicated by phone number as they are consumed; each
//! accepted picture becomes one task that visits every contact carrying its
//! phone number in every target.

use std::{
  collections::{BTreeMap, HashSet},
  sync::Arc,
};

use bytes::Bytes;
use chrono::Utc;
use futures::{
  future::try_join_all,
  stream::{BoxStream, StreamExt},
};
use roster_core::{
  CanonicalPhone,
  collection::RemoteCollection,
  crawl::{CrawlItem, Crawler, dedup_by_phone, merge_crawlers},
  entity::{CollectionSnapshot, SnapshotMode},
  picture::PictureRecord,
};
use roster_vcard::Card;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::error::{Error, Result};

/// What to do with a contact that already has a picture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InjectionMethod {
  /// Replace only when the stored bytes differ.
  #[default]
  CompareContent,
  /// Always replace.
  AlwaysOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionOutcome {
  Unchanged,
  Updated,
  Added,
}

/// Outcome counts for one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectionSummary {
  pub added:     usize,
  pub updated:   usize,
  pub unchanged: usize,
}

impl InjectionSummary {
  pub fn total(&self) -> usize { self.added + self.updated + self.unchanged }

  fn record(&mut self, outcome: InjectionOutcome) {
    match outcome {
      InjectionOutcome::Added => self.added += 1,
      InjectionOutcome::Updated => self.updated += 1,
      InjectionOutcome::Unchanged => self.unchanged += 1,
    }
  }
}

/// Per-target summaries of one injection run, keyed by target id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionReport {
  targets: BTreeMap<String, InjectionSummary>,
}

impl InjectionReport {
  pub fn get(&self, target: &str) -> Option<&InjectionSummary> {
    self.targets.get(target)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &InjectionSummary)> {
    self.targets.iter().map(|(id, s)| (id.as_str(), s))
  }
}

pub struct Injector<C> {
  targets: BTreeMap<String, Arc<C>>,
  permits: Arc<Semaphore>,
}

// ─── Per-run state ───────────────────────────────────────────────────────────

struct Contact {
  uid:    String,
  card:   Card,
  phones: HashSet<CanonicalPhone>,
}

struct AddressBook<C> {
  id:       String,
  client:   Arc<C>,
  contacts: Vec<Contact>,
}

struct Session<C> {
  books:   Vec<AddressBook<C>>,
  method:  InjectionMethod,
  permits: Arc<Semaphore>,
}

impl<C: RemoteCollection + 'static> Injector<C> {
  /// Upper bound on simultaneous vCard uploads across all targets, which may
  /// share one server.
  pub const MAX_CONCURRENT_UPLOADS: usize = 50;

  pub fn new(targets: BTreeMap<String, Arc<C>>) -> Self {
    Self {
      targets,
      permits: Arc::new(Semaphore::new(Self::MAX_CONCURRENT_UPLOADS)),
    }
  }

  /// Inject pictures from all `crawlers`. Earlier crawlers are listed first,
  /// but the merged stream interleaves them as items become available.
  pub async fn run(
    &self,
    crawlers: &[&dyn Crawler],
    method: InjectionMethod,
  ) -> Result<InjectionReport> {
    tracing::info!(crawlers = crawlers.len(), "crawling profile pictures");
    self
      .inject(merge_crawlers(crawlers.iter().copied()), method)
      .await
  }

  /// Inject every picture of `records`, keeping only the first record per
  /// phone number.
  pub async fn inject(
    &self,
    records: BoxStream<'_, CrawlItem>,
    method: InjectionMethod,
  ) -> Result<InjectionReport> {
    let session = Arc::new(Session {
      books: self.load_address_books().await?,
      method,
      permits: Arc::clone(&self.permits),
    });

    let mut records = dedup_by_phone(records);
    let mut units = JoinSet::new();
    let mut summaries = vec![InjectionSummary::default(); session.books.len()];
    let mut tally = |outcomes: Vec<(usize, InjectionOutcome)>| {
      for (book, outcome) in outcomes {
        summaries[book].record(outcome);
      }
    };

    loop {
      tokio::select! {
        item = records.next() => match item {
          Some(Ok(record)) => {
            units.spawn(inject_record(Arc::clone(&session), record));
          }
          Some(Err(e)) => return Err(Error::Crawl(e)),
          None => break,
        },
        Some(joined) = units.join_next() => tally(joined??),
      }
    }
    while let Some(joined) = units.join_next().await {
      tally(joined??);
    }

    let mut report = InjectionReport::default();
    for (book, summary) in session.books.iter().zip(summaries) {
      tracing::info!(
        address_book = book.id,
        processed = summary.total(),
        added = summary.added,
        updated = summary.updated,
        unchanged = summary.unchanged,
        "injection summary"
      );
      report.targets.insert(book.id.clone(), summary);
    }
    Ok(report)
  }

  async fn load_address_books(&self) -> Result<Vec<AddressBook<C>>> {
    try_join_all(self.targets.iter().map(|(id, client)| async move {
      let snapshot = client
        .list_entities(SnapshotMode::Full)
        .await
        .map_err(Error::collection(id))?;
      let contacts = parse_contacts(id, snapshot);
      tracing::debug!(
        address_book = id,
        contacts = contacts.len(),
        "exported address book"
      );
      Ok::<_, Error>(AddressBook {
        id: id.clone(),
        client: Arc::clone(client),
        contacts,
      })
    }))
    .await
  }
}

fn parse_contacts(target: &str, snapshot: CollectionSnapshot) -> Vec<Contact> {
  snapshot
    .into_iter()
    .filter_map(|record| {
      let content = record.content?;
      match Card::from_bytes(&content) {
        Ok(card) => {
          let phones = card
            .phones()
            .iter()
            .map(|p| CanonicalPhone::parse(&p.number))
            .collect();
          Some(Contact {
            uid: record.uid,
            card,
            phones,
          })
        }
        Err(e) => {
          tracing::warn!(
            address_book = target,
            uid = record.uid,
            error = %e,
            "skipping unparseable vCard"
          );
          None
        }
      }
    })
    .collect()
}

/// Inject one picture into every matching contact of every target. Returns
/// the outcome per contact, tagged with the index of its address book.
async fn inject_record<C: RemoteCollection + 'static>(
  session: Arc<Session<C>>,
  record: PictureRecord,
) -> Result<Vec<(usize, InjectionOutcome)>> {
  let session = &*session;
  let record = &record;

  let mut units = Vec::new();
  for (index, book) in session.books.iter().enumerate() {
    for contact in &book.contacts {
      if !contact.phones.contains(&record.phone) {
        continue;
      }
      units.push(async move {
        inject_contact(session, book, contact, record)
          .await
          .map(|outcome| (index, outcome))
      });
    }
  }
  try_join_all(units).await
}

fn decide(
  card: &Card,
  photo: &Bytes,
  method: InjectionMethod,
) -> InjectionOutcome {
  if !card.has_photo() {
    return InjectionOutcome::Added;
  }
  if method == InjectionMethod::AlwaysOverride {
    return InjectionOutcome::Updated;
  }
  match card.photo() {
    Ok(Some(existing)) if existing.data[..] == photo[..] => {
      InjectionOutcome::Unchanged
    }
    Ok(_) => InjectionOutcome::Updated,
    Err(e) => {
      tracing::debug!(error = %e, "existing photo is not decodable, replacing it");
      InjectionOutcome::Updated
    }
  }
}

async fn inject_contact<C: RemoteCollection>(
  session: &Session<C>,
  book: &AddressBook<C>,
  contact: &Contact,
  record: &PictureRecord,
) -> Result<InjectionOutcome> {
  let name = contact
    .card
    .formatted_name()
    .unwrap_or_else(|| contact.uid.clone());

  let outcome = decide(&contact.card, &record.photo, session.method);
  if outcome == InjectionOutcome::Unchanged {
    tracing::debug!(contact = name, address_book = book.id, "profile picture is up to date");
    return Ok(outcome);
  }

  let mut card = contact.card.clone();
  card.set_photo(&record.photo, &record.mime_type);
  card.set_revision(Utc::now());

  let _permit = session.permits.acquire().await?;
  book
    .client
    .put_entity(&contact.uid, Bytes::from(card.serialize()), None)
    .await
    .map_err(Error::collection(&book.id))?;
  tracing::info!(contact = name, address_book = book.id, ?outcome, "injected profile picture");
  Ok(outcome)
}
