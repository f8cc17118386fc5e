//! Feed crawler output into the picture library.

use std::sync::Arc;

use roster_core::{
  crawl::{Crawler, merge_crawlers},
  resource::{Resource, ResourceGroup},
  storage::PictureStorage,
};

use crate::{
  error::Result,
  library::{PictureLibrary, UpdateReport},
};

/// One upload pass: acquire the library and every crawler, update the
/// library from the merged crawler streams, then release everything.
pub struct Uploader<'a, S> {
  library:  Arc<PictureLibrary<S>>,
  crawlers: Vec<&'a dyn Crawler>,
}

impl<'a, S: PictureStorage + 'static> Uploader<'a, S> {
  /// Crawlers earlier in `crawlers` are listed (and acquired) first.
  pub fn new(
    library: Arc<PictureLibrary<S>>,
    crawlers: Vec<&'a dyn Crawler>,
  ) -> Self {
    Self { library, crawlers }
  }

  pub async fn run(&self) -> Result<UpdateReport> {
    let group = ResourceGroup::new()
      .with(&*self.library)
      .extend(self.crawlers.iter().map(|&crawler| crawler as &dyn Resource));

    group
      .scoped(|| async {
        let records = merge_crawlers(self.crawlers.iter().copied());
        let report = self.library.update_from_stream(records).await?;

        match self.library.orphaned_photos().await {
          Ok(orphans) if !orphans.is_empty() => tracing::info!(
            count = orphans.len(),
            "stored photos without an index entry"
          ),
          Ok(_) => {}
          Err(e) => tracing::warn!(error = %e, "could not list stored photos"),
        }
        Ok(report)
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, Ordering};

  use async_trait::async_trait;
  use futures::stream::{self, BoxStream, StreamExt};
  use roster_core::{
    BoxError, CanonicalPhone,
    crawl::CrawlItem,
    memory::MemoryStorage,
    picture::{PictureIndex, PictureRecord},
  };

  use super::*;
  use crate::error::Error;

  struct Fixed {
    records:  Vec<PictureRecord>,
    broken:   bool,
    acquired: AtomicBool,
  }

  impl Fixed {
    fn new(records: Vec<PictureRecord>) -> Self {
      Self {
        records,
        broken: false,
        acquired: AtomicBool::new(false),
      }
    }
  }

  #[async_trait]
  impl Resource for Fixed {
    fn name(&self) -> &str { "fixed" }

    async fn acquire(&self) -> Result<(), BoxError> {
      if self.broken {
        return Err("unavailable".into());
      }
      self.acquired.store(true, Ordering::SeqCst);
      Ok(())
    }

    async fn release(&self) -> Result<(), BoxError> {
      self.acquired.store(false, Ordering::SeqCst);
      Ok(())
    }
  }

  impl Crawler for Fixed {
    fn crawl(&self) -> BoxStream<'_, CrawlItem> {
      assert!(self.acquired.load(Ordering::SeqCst), "crawled before acquire");
      stream::iter(self.records.iter().cloned().map(Ok)).boxed()
    }
  }

  fn picture(phone: &str, bytes: &'static str) -> PictureRecord {
    PictureRecord::new(CanonicalPhone::parse(phone), bytes, "image/jpeg")
  }

  #[tokio::test]
  async fn uploads_from_all_crawlers_and_releases() {
    let library = Arc::new(PictureLibrary::new(MemoryStorage::new(), "pics"));
    let first = Fixed::new(vec![picture("+491", "a"), picture("+492", "b")]);
    let second = Fixed::new(vec![picture("+493", "c")]);

    let crawlers: Vec<&dyn Crawler> = vec![&first as &dyn Crawler, &second];
    let report = Uploader::new(Arc::clone(&library), crawlers)
      .run()
      .await
      .unwrap();

    assert_eq!(report.uploaded, 3);
    assert!(!library.is_loaded());
    assert!(!first.acquired.load(Ordering::SeqCst));

    let document = library.storage().file("pics/profile_pictures.toml").unwrap();
    let index =
      PictureIndex::from_toml(std::str::from_utf8(&document).unwrap()).unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(library.storage().file("pics/photos/+493.jpeg").unwrap(), "c");
  }

  #[tokio::test]
  async fn failed_acquire_uploads_nothing() {
    let library = Arc::new(PictureLibrary::new(MemoryStorage::new(), "pics"));
    let good = Fixed::new(vec![picture("+491", "a")]);
    let broken = Fixed {
      broken: true,
      ..Fixed::new(Vec::new())
    };

    let crawlers: Vec<&dyn Crawler> = vec![&good as &dyn Crawler, &broken];
    let err = Uploader::new(Arc::clone(&library), crawlers)
      .run()
      .await
      .unwrap_err();

    assert!(
      matches!(err, Error::Core(roster_core::Error::Acquire { .. })),
      "{err}"
    );
    assert!(library.storage().uploads().is_empty());
    assert!(!good.acquired.load(Ordering::SeqCst));
    assert!(!library.is_loaded());
  }
}
