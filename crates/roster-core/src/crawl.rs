//! The crawler capability and the merged picture stream.

use std::collections::HashSet;

use futures::stream::{self, BoxStream, StreamExt};

use crate::{
  BoxError, CanonicalPhone, picture::PictureRecord, resource::Resource,
};

/// Item type of every crawler stream.
pub type CrawlItem = Result<PictureRecord, BoxError>;

/// A source of profile pictures (a directory, an exported messenger
/// database, a remote API).
///
/// The stream returned by [`Crawler::crawl`] is lazy, finite and not
/// restartable. Crawlers must be acquired before crawling.
pub trait Crawler: Resource {
  fn crawl(&self) -> BoxStream<'_, CrawlItem>;
}

/// Merge the streams of all `crawlers` into one, interleaving items as they
/// become available. No ordering across crawlers is guaranteed.
pub fn merge_crawlers<'a, I>(crawlers: I) -> BoxStream<'a, CrawlItem>
where
  I: IntoIterator<Item = &'a dyn Crawler>,
{
  stream::select_all(crawlers.into_iter().map(|c| c.crawl())).boxed()
}

/// Drop every record whose phone number was already seen earlier in the
/// stream. Errors pass through untouched.
pub fn dedup_by_phone<'a>(
  records: BoxStream<'a, CrawlItem>,
) -> BoxStream<'a, CrawlItem> {
  let mut seen: HashSet<CanonicalPhone> = HashSet::new();
  records
    .filter(move |item| {
      let keep = match item {
        Ok(record) => {
          let fresh = seen.insert(record.phone.clone());
          if !fresh {
            tracing::debug!(
              phone = %record.phone,
              "skipping duplicate profile picture"
            );
          }
          fresh
        }
        Err(_) => true,
      };
      futures::future::ready(keep)
    })
    .boxed()
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;

  use super::*;

  struct Fixed(Vec<(&'static str, &'static str)>);

  #[async_trait]
  impl Resource for Fixed {
    fn name(&self) -> &str { "fixed" }

    async fn acquire(&self) -> Result<(), BoxError> { Ok(()) }

    async fn release(&self) -> Result<(), BoxError> { Ok(()) }
  }

  impl Crawler for Fixed {
    fn crawl(&self) -> BoxStream<'_, CrawlItem> {
      stream::iter(self.0.iter().map(|(phone, bytes)| {
        Ok(PictureRecord::new(CanonicalPhone::parse(phone), *bytes, "image/png"))
      }))
      .boxed()
    }
  }

  #[tokio::test]
  async fn merged_stream_yields_every_record() {
    let a = Fixed(vec![("+491", "a1"), ("+492", "a2")]);
    let b = Fixed(vec![("+493", "b1")]);
    let crawlers: Vec<&dyn Crawler> = vec![&a as &dyn Crawler, &b];

    let mut phones: Vec<String> = merge_crawlers(crawlers)
      .map(|r| r.unwrap().phone.to_string())
      .collect()
      .await;
    phones.sort();
    assert_eq!(phones, ["+491", "+492", "+493"]);
  }

  #[tokio::test]
  async fn first_seen_wins_per_phone() {
    let a = Fixed(vec![("+491", "first"), ("0049 1", "second")]);
    let crawlers: Vec<&dyn Crawler> = vec![&a as &dyn Crawler];

    let records: Vec<PictureRecord> =
      dedup_by_phone(merge_crawlers(crawlers))
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].photo, "first");
  }
}
