//! Crawler selection from configuration.

use roster_core::crawl::Crawler;
use serde::Deserialize;

use crate::{
  directory::{DirectoryCrawler, DirectoryCrawlerConfig},
  signal::{SignalCrawler, SignalCrawlerConfig},
};

/// One configured crawler, tagged by `kind`:
///
/// ```toml
/// [[crawlers]]
/// kind = "directory"
/// directory = "/srv/pictures"
///
/// [[crawlers]]
/// kind = "signal"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrawlerConfig {
  Directory(DirectoryCrawlerConfig),
  Signal(SignalCrawlerConfig),
}

impl CrawlerConfig {
  pub fn build(&self) -> Box<dyn Crawler> {
    match self {
      Self::Directory(config) => Box::new(DirectoryCrawler::from_config(config)),
      Self::Signal(config) => Box::new(SignalCrawler::from_config(config)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Deserialize)]
  struct Crawlers {
    crawlers: Vec<CrawlerConfig>,
  }

  #[test]
  fn kinds_deserialize_and_build() {
    let parsed: Crawlers = toml::from_str(
      r#"
        [[crawlers]]
        kind = "directory"
        directory = "/srv/pictures"

        [[crawlers]]
        kind = "signal"

        [[crawlers]]
        kind = "signal"
        executable_path = "/opt/sigtop"
      "#,
    )
    .unwrap();

    assert_eq!(parsed.crawlers.len(), 3);
    match &parsed.crawlers[0] {
      CrawlerConfig::Directory(c) => {
        assert_eq!(c.directory.to_str(), Some("/srv/pictures"))
      }
      other => panic!("unexpected {other:?}"),
    }
    match &parsed.crawlers[2] {
      CrawlerConfig::Signal(c) => {
        assert_eq!(c.executable_path.as_deref().and_then(|p| p.to_str()), Some("/opt/sigtop"))
      }
      other => panic!("unexpected {other:?}"),
    }

    let names: Vec<String> = parsed
      .crawlers
      .iter()
      .map(|c| c.build().name().to_string())
      .collect();
    assert_eq!(names, ["directory crawler", "signal crawler", "signal crawler"]);
  }

  #[test]
  fn unknown_kind_is_rejected() {
    let parsed: Result<Crawlers, _> =
      toml::from_str("[[crawlers]]\nkind = \"telegram\"\n");
    assert!(parsed.is_err());
  }
}
