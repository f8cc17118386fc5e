//! Subcommand wiring: build the DAV clients and crawlers from configuration
//! and hand them to the sync engines.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context as _, bail};
use roster_core::{
  crawl::Crawler,
  resource::{Resource, ResourceGroup},
};
use roster_crawl::CrawlerConfig;
use roster_dav::{CardDavClient, CardDavConfig, StorageConfig, WebDavStorage};
use roster_sync::{
  ComparisonMode, Enricher, InjectionMethod, Injector, Merger, PictureLibrary,
  Uploader,
};

use crate::settings::{InjectConfig, MergeConfig, UploadConfig};

fn address_books(
  configs: &BTreeMap<String, CardDavConfig>,
) -> anyhow::Result<BTreeMap<String, Arc<CardDavClient>>> {
  configs
    .iter()
    .map(|(id, config)| {
      let client = CardDavClient::new(config)
        .with_context(|| format!("invalid address book `{id}`"))?;
      Ok((id.clone(), Arc::new(client)))
    })
    .collect()
}

fn picture_library(
  config: &StorageConfig,
) -> anyhow::Result<Arc<PictureLibrary<WebDavStorage>>> {
  let storage = WebDavStorage::new(config).context("invalid storage config")?;
  Ok(Arc::new(PictureLibrary::new(storage, config.target_path.as_str())))
}

fn crawlers(configs: &[CrawlerConfig]) -> Vec<Box<dyn Crawler>> {
  if configs.is_empty() {
    tracing::warn!("no crawlers configured");
  }
  configs.iter().map(CrawlerConfig::build).collect()
}

pub async fn merge(config: MergeConfig, mode: ComparisonMode) -> anyhow::Result<()> {
  if config.sources.is_empty() || config.targets.is_empty() {
    bail!("merge needs at least one source and one target address book");
  }
  let merger = Merger::new(
    address_books(&config.sources)?,
    address_books(&config.targets)?,
  );

  let report = match &config.storage {
    None => merger.run(mode).await,
    Some(storage) => {
      let enricher = Arc::new(Enricher::new(picture_library(storage)?));
      let merger = merger.with_enricher(enricher.clone());
      ResourceGroup::new()
        .with(&*enricher)
        .scoped(|| merger.run(mode))
        .await
    }
  }
  .context("merge failed")?;

  tracing::info!(
    created = report.created,
    updated = report.updated,
    skipped = report.skipped,
    "done"
  );
  Ok(())
}

pub async fn inject(
  config: InjectConfig,
  method: InjectionMethod,
) -> anyhow::Result<()> {
  if config.targets.is_empty() {
    bail!("inject needs at least one target address book");
  }
  let injector = Injector::new(address_books(&config.targets)?);
  let owned = crawlers(&config.crawlers);
  let crawlers: Vec<&dyn Crawler> = owned.iter().map(|c| &**c).collect();

  let report = ResourceGroup::new()
    .extend(crawlers.iter().map(|&c| c as &dyn Resource))
    .scoped(|| injector.run(&crawlers, method))
    .await
    .context("inject failed")?;

  let total: usize = report.iter().map(|(_, summary)| summary.total()).sum();
  tracing::info!(contacts = total, "done");
  Ok(())
}

pub async fn upload(config: UploadConfig) -> anyhow::Result<()> {
  let library = picture_library(&config.storage)?;
  let owned = crawlers(&config.crawlers);
  let crawlers: Vec<&dyn Crawler> = owned.iter().map(|c| &**c).collect();

  let report = Uploader::new(library, crawlers)
    .run()
    .await
    .context("upload failed")?;

  tracing::info!(
    uploaded = report.uploaded,
    unchanged = report.unchanged,
    "done"
  );
  Ok(())
}
