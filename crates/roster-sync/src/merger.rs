//! Merge source address books into target address books.
//!
//! Every source and target is listed once (metadata only). Each source is
//! then merged as its own task, and within a source every UID is its own
//! task. The first failing task fails the whole run and the remaining tasks
//! are cancelled when their [`JoinSet`] is dropped.

use std::{collections::BTreeMap, ops::AddAssign, sync::Arc};

use bytes::Bytes;
use futures::future::try_join_all;
use roster_core::{
  collection::RemoteCollection,
  entity::{CollectionSnapshot, EntityMeta, EntityRecord, SnapshotMode},
};
use tokio::task::JoinSet;

use crate::{
  enricher::Enrich,
  error::{Error, Result},
};

/// How an existing target entity is compared with its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ComparisonMode {
  /// Download both bodies and write only when they differ.
  #[default]
  Content,
  /// Skip when the target was modified at or after the source, without
  /// downloading anything. Otherwise fall back to comparing content.
  EditDate,
}

/// Write counts for one merge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
  pub created: usize,
  pub updated: usize,
  pub skipped: usize,
}

impl MergeReport {
  pub fn writes(&self) -> usize { self.created + self.updated }
}

impl AddAssign for MergeReport {
  fn add_assign(&mut self, other: Self) {
    self.created += other.created;
    self.updated += other.updated;
    self.skipped += other.skipped;
  }
}

pub struct Merger<C> {
  sources:  BTreeMap<String, Arc<C>>,
  targets:  BTreeMap<String, Arc<C>>,
  enricher: Option<Arc<dyn Enrich>>,
}

// ─── Per-run state ───────────────────────────────────────────────────────────

struct Endpoint<C> {
  id:       String,
  client:   Arc<C>,
  snapshot: CollectionSnapshot,
}

struct Pass<C> {
  targets:  Vec<Endpoint<C>>,
  mode:     ComparisonMode,
  enricher: Option<Arc<dyn Enrich>>,
}

struct Source<C> {
  id:     String,
  client: Arc<C>,
}

impl<C: RemoteCollection + 'static> Merger<C> {
  pub fn new(
    sources: BTreeMap<String, Arc<C>>,
    targets: BTreeMap<String, Arc<C>>,
  ) -> Self {
    Self {
      sources,
      targets,
      enricher: None,
    }
  }

  /// Pass every source body through `enricher` before it is compared or
  /// written.
  pub fn with_enricher(mut self, enricher: Arc<dyn Enrich>) -> Self {
    self.enricher = Some(enricher);
    self
  }

  pub async fn run(&self, mode: ComparisonMode) -> Result<MergeReport> {
    tracing::info!(
      sources = self.sources.len(),
      targets = self.targets.len(),
      ?mode,
      "starting merge"
    );

    let (sources, targets) = tokio::try_join!(
      snapshot_all(&self.sources),
      snapshot_all(&self.targets)
    )?;
    let pass = Arc::new(Pass {
      targets,
      mode,
      enricher: self.enricher.clone(),
    });

    let mut units = JoinSet::new();
    for Endpoint {
      id,
      client,
      snapshot,
    } in sources
    {
      let source = Arc::new(Source { id, client });
      units.spawn(merge_source(Arc::clone(&pass), source, snapshot));
    }

    let mut report = MergeReport::default();
    while let Some(joined) = units.join_next().await {
      report += joined??;
    }

    tracing::info!(
      created = report.created,
      updated = report.updated,
      skipped = report.skipped,
      "merge finished"
    );
    Ok(report)
  }
}

async fn snapshot_all<C: RemoteCollection>(
  collections: &BTreeMap<String, Arc<C>>,
) -> Result<Vec<Endpoint<C>>> {
  try_join_all(collections.iter().map(|(id, client)| async move {
    let snapshot = client
      .list_entities(SnapshotMode::Metadata)
      .await
      .map_err(Error::collection(id))?;
    tracing::debug!(id, entities = snapshot.len(), "listed address book");
    Ok::<_, Error>(Endpoint {
      id: id.clone(),
      client: Arc::clone(client),
      snapshot,
    })
  }))
  .await
}

async fn merge_source<C: RemoteCollection + 'static>(
  pass: Arc<Pass<C>>,
  source: Arc<Source<C>>,
  snapshot: CollectionSnapshot,
) -> Result<MergeReport> {
  tracing::info!(source = source.id, entities = snapshot.len(), "merging address book");

  let mut units = JoinSet::new();
  for record in snapshot {
    units.spawn(merge_entity(Arc::clone(&pass), Arc::clone(&source), record));
  }

  let mut report = MergeReport::default();
  while let Some(joined) = units.join_next().await {
    report += joined??;
  }
  Ok(report)
}

/// Whether `target` is recent enough that `source` need not be written. An
/// undated target is never fresh; an undated source is older than any dated
/// target.
fn is_fresh(target: &EntityMeta, source: &EntityMeta) -> bool {
  match (target.last_modified, source.last_modified) {
    (Some(target), Some(source)) => target >= source,
    (Some(_), None) => true,
    (None, _) => false,
  }
}

/// The (enriched) source body, fetched at most once per UID.
async fn source_body<C: RemoteCollection>(
  pass: &Pass<C>,
  source: &Source<C>,
  record: &EntityRecord,
  cache: &mut Option<Bytes>,
) -> Result<Bytes> {
  if let Some(body) = cache {
    return Ok(body.clone());
  }
  let raw = match &record.content {
    Some(content) => content.clone(),
    None => source
      .client
      .fetch_entity(&record.uid)
      .await
      .map_err(Error::collection(&source.id))?,
  };
  let body = match &pass.enricher {
    Some(enricher) => enricher.enrich(raw).await?,
    None => raw,
  };
  *cache = Some(body.clone());
  Ok(body)
}

async fn merge_entity<C: RemoteCollection + 'static>(
  pass: Arc<Pass<C>>,
  source: Arc<Source<C>>,
  record: EntityRecord,
) -> Result<MergeReport> {
  let uid = record.uid.as_str();
  let mut cache = None;
  let mut report = MergeReport::default();

  for target in &pass.targets {
    let body = match target.snapshot.get(uid) {
      None => {
        report.created += 1;
        source_body(&pass, &source, &record, &mut cache).await?
      }
      Some(existing) => {
        if pass.mode == ComparisonMode::EditDate
          && is_fresh(&existing.meta, &record.meta)
        {
          tracing::debug!(
            uid,
            source = source.id,
            address_book = target.id,
            "target is at least as recent, skipping"
          );
          report.skipped += 1;
          continue;
        }

        let (body, current) = tokio::try_join!(
          source_body(&pass, &source, &record, &mut cache),
          async {
            target
              .client
              .fetch_entity(uid)
              .await
              .map_err(Error::collection(&target.id))
          }
        )?;
        if body == current {
          tracing::debug!(
            uid,
            source = source.id,
            address_book = target.id,
            "content is identical, skipping"
          );
          report.skipped += 1;
          continue;
        }
        report.updated += 1;
        body
      }
    };

    target
      .client
      .put_entity(uid, body, None)
      .await
      .map_err(Error::collection(&target.id))?;
    tracing::info!(
      uid,
      source = source.id,
      address_book = target.id,
      "uploaded vCard"
    );
  }
  Ok(report)
}
