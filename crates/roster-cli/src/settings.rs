//! Configuration files for the `roster` subcommands.
//!
//! Every command reads one TOML file. Values can be overridden from the
//! environment with a `ROSTER_` prefix and `__` between nested keys, e.g.
//! `ROSTER_TARGETS__HOME__PASSWORD`.

use std::{collections::BTreeMap, path::Path};

use anyhow::Context as _;
use config::{Config, Environment, File, FileFormat};
use roster_crawl::CrawlerConfig;
use roster_dav::{CardDavConfig, StorageConfig};
use serde::{Deserialize, de::DeserializeOwned};

/// `roster merge`: copy every source address book into every target.
///
/// ```toml
/// [sources.phone]
/// username = "alice"
/// password = "secret"
/// address_book_url = "https://dav.example.com/alice/contacts/"
///
/// [targets.family]
/// username = "family"
/// password = "secret"
/// address_book_url = "https://dav.example.com/family/shared/"
///
/// # Optional: enrich merged cards from the picture library.
/// [storage]
/// username = "alice"
/// password = "secret"
/// base_url = "https://cloud.example.com"
/// target_path = "Roster"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
  pub sources: BTreeMap<String, CardDavConfig>,
  pub targets: BTreeMap<String, CardDavConfig>,
  #[serde(default)]
  pub storage: Option<StorageConfig>,
}

/// `roster inject`: write crawled pictures straight into address books.
#[derive(Debug, Clone, Deserialize)]
pub struct InjectConfig {
  pub targets:  BTreeMap<String, CardDavConfig>,
  /// In priority order.
  #[serde(default)]
  pub crawlers: Vec<CrawlerConfig>,
}

/// `roster upload`: feed crawled pictures into the picture library.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
  pub storage:  StorageConfig,
  /// In priority order.
  #[serde(default)]
  pub crawlers: Vec<CrawlerConfig>,
}

fn environment() -> Environment {
  Environment::with_prefix("ROSTER")
    .prefix_separator("_")
    .separator("__")
}

/// Read `path` as TOML, apply `ROSTER_` overrides and deserialise.
pub fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  load_with(path, environment())
}

fn load_with<T: DeserializeOwned>(
  path: &Path,
  env: Environment,
) -> anyhow::Result<T> {
  let settings = Config::builder()
    .add_source(File::from(path).format(FileFormat::Toml))
    .add_source(env)
    .build()
    .with_context(|| format!("failed to read config file {}", path.display()))?;

  settings
    .try_deserialize()
    .with_context(|| format!("invalid config file {}", path.display()))
}
