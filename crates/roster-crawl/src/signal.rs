//! Crawl Signal Desktop avatars through the `sigtop` exporter.
//!
//! `sigtop export-avatars <dir>` writes one file per contact, named
//! `Display Name (+49 151 2345678).jpg`. The export lives in a temporary
//! directory that is removed once the stream is dropped.

use std::{
  path::{Path, PathBuf},
  sync::OnceLock,
};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use roster_core::{
  BoxError,
  crawl::{CrawlItem, Crawler},
  picture::PictureRecord,
  resource::Resource,
};
use serde::Deserialize;
use tempfile::TempDir;
use tokio::{
  fs::{self, ReadDir},
  process::Command,
};

use crate::{directory::load_picture, error::Error};

const DEFAULT_EXECUTABLE: &str = "sigtop";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalCrawlerConfig {
  /// Path to the `sigtop` binary; looked up on `PATH` when unset.
  pub executable_path: Option<PathBuf>,
}

pub struct SignalCrawler {
  executable: PathBuf,
}

impl SignalCrawler {
  pub fn new(executable: impl Into<PathBuf>) -> Self {
    Self {
      executable: executable.into(),
    }
  }

  pub fn from_config(config: &SignalCrawlerConfig) -> Self {
    Self::new(
      config
        .executable_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE)),
    )
  }

  pub fn executable(&self) -> &Path { &self.executable }

  /// Run the exporter into a fresh temporary directory. `None` means the
  /// exporter failed; the failure is logged and the crawl yields nothing.
  async fn export(&self) -> Result<Option<(TempDir, ReadDir)>, BoxError> {
    let dir = tempfile::tempdir()?;
    let status = Command::new(&self.executable)
      .arg("export-avatars")
      .arg(dir.path())
      .kill_on_drop(true)
      .status()
      .await?;
    if !status.success() {
      tracing::error!(
        executable = %self.executable.display(),
        %status,
        "sigtop export-avatars failed"
      );
      return Ok(None);
    }
    let entries = fs::read_dir(dir.path()).await?;
    Ok(Some((dir, entries)))
  }
}

fn avatar_pattern() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^(.*)\s*\((\+?[\d ]+)\).*").expect("avatar pattern is valid")
  })
}

/// Split an exported file name into display name and phone number.
pub fn parse_avatar_name(file_name: &str) -> Option<(String, String)> {
  let caps = avatar_pattern().captures(file_name)?;
  Some((caps[1].trim().to_string(), caps[2].trim().to_string()))
}

async fn next_avatar(
  entries: &mut ReadDir,
) -> Result<Option<PictureRecord>, BoxError> {
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
      continue;
    };
    let Some((name, phone)) = parse_avatar_name(file_name) else {
      tracing::debug!(file_name, "no phone number in avatar file name, skipping");
      continue;
    };
    if let Some(record) = load_picture(&path, &phone, Some(&name)).await? {
      tracing::debug!(name, phone = %record.phone, "found profile picture");
      return Ok(Some(record));
    }
  }
  Ok(None)
}

#[async_trait]
impl Resource for SignalCrawler {
  fn name(&self) -> &str { "signal crawler" }

  async fn acquire(&self) -> Result<(), BoxError> {
    // Bare names are looked up on `PATH` (with `PATHEXT` on Windows); paths
    // must point at an executable file.
    let resolved = which::which(&self.executable).map_err(|source| {
      Error::ExecutableMissing {
        path: self.executable.clone(),
        source,
      }
    })?;
    tracing::debug!(executable = %resolved.display(), "found sigtop");
    Ok(())
  }

  async fn release(&self) -> Result<(), BoxError> { Ok(()) }
}

enum ExportState {
  Pending,
  Listing { _dir: TempDir, entries: ReadDir },
}

impl Crawler for SignalCrawler {
  fn crawl(&self) -> BoxStream<'_, CrawlItem> {
    stream::try_unfold(ExportState::Pending, move |state| async move {
      let (dir, mut entries) = match state {
        ExportState::Listing { _dir: dir, entries } => (dir, entries),
        ExportState::Pending => match self.export().await? {
          Some(export) => export,
          None => return Ok::<_, BoxError>(None),
        },
      };
      Ok::<_, BoxError>(next_avatar(&mut entries).await?.map(|record| {
        (record, ExportState::Listing { _dir: dir, entries })
      }))
    })
    .boxed()
  }
}
