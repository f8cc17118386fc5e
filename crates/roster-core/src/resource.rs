//! Scoped acquisition and release of collaborators.
//!
//! Crawlers, the enricher and the picture library hold state that must be
//! set up before use and torn down afterwards. [`ResourceGroup::scoped`]
//! acquires a set of them in order and releases every acquired member in
//! reverse order, also when the body or a later acquisition fails.

use std::future::Future;

use async_trait::async_trait;

use crate::{BoxError, Error};

/// A collaborator with an explicit set-up / tear-down lifecycle.
///
/// Methods take `&self`; implementors keep their lifecycle state behind
/// interior mutability so a resource can be shared while in use.
#[async_trait]
pub trait Resource: Send + Sync {
  /// Short name used in logs and errors.
  fn name(&self) -> &str;

  async fn acquire(&self) -> Result<(), BoxError>;

  async fn release(&self) -> Result<(), BoxError>;
}

/// An ordered set of resources acquired and released together.
#[derive(Default)]
pub struct ResourceGroup<'a> {
  members: Vec<&'a dyn Resource>,
}

impl<'a> ResourceGroup<'a> {
  pub fn new() -> Self { Self::default() }

  pub fn with(mut self, resource: &'a dyn Resource) -> Self {
    self.members.push(resource);
    self
  }

  pub fn extend<I>(mut self, resources: I) -> Self
  where
    I: IntoIterator<Item = &'a dyn Resource>,
  {
    self.members.extend(resources);
    self
  }

  pub fn len(&self) -> usize { self.members.len() }

  pub fn is_empty(&self) -> bool { self.members.is_empty() }

  /// Acquire every member, run `body`, then release every member.
  ///
  /// If an acquisition fails, the members acquired so far are released and
  /// the acquisition error is returned without running `body`. Release
  /// failures are logged; they never mask the body's result.
  pub async fn scoped<F, Fut, T, E>(&self, body: F) -> Result<T, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<Error>,
  {
    let mut acquired = 0;
    for member in &self.members {
      if let Err(source) = member.acquire().await {
        self.release_first(acquired).await;
        return Err(
          Error::Acquire {
            name: member.name().to_string(),
            source,
          }
          .into(),
        );
      }
      tracing::debug!(resource = member.name(), "acquired");
      acquired += 1;
    }

    let result = body().await;
    self.release_first(acquired).await;
    result
  }

  async fn release_first(&self, count: usize) {
    for member in self.members[..count].iter().rev() {
      match member.release().await {
        Ok(()) => tracing::debug!(resource = member.name(), "released"),
        Err(e) => tracing::warn!(
          resource = member.name(),
          error = %e,
          "failed to release resource"
        ),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;

  struct Tracked {
    name:         &'static str,
    fail_acquire: bool,
    log:          Arc<Mutex<Vec<String>>>,
  }

  impl Tracked {
    fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
      Self {
        name,
        fail_acquire: false,
        log: Arc::clone(log),
      }
    }
  }

  #[async_trait]
  impl Resource for Tracked {
    fn name(&self) -> &str { self.name }

    async fn acquire(&self) -> Result<(), BoxError> {
      if self.fail_acquire {
        return Err("nope".into());
      }
      self.log.lock().unwrap().push(format!("+{}", self.name));
      Ok(())
    }

    async fn release(&self) -> Result<(), BoxError> {
      self.log.lock().unwrap().push(format!("-{}", self.name));
      Ok(())
    }
  }

  fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
  }

  #[tokio::test]
  async fn releases_in_reverse_order_after_body() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (a, b) = (Tracked::new("a", &log), Tracked::new("b", &log));
    let group = ResourceGroup::new().with(&a).with(&b);

    let out: Result<u8, Error> = group
      .scoped(|| async {
        log.lock().unwrap().push("body".into());
        Ok(7)
      })
      .await;

    assert_eq!(out.unwrap(), 7);
    assert_eq!(entries(&log), ["+a", "+b", "body", "-b", "-a"]);
  }

  #[tokio::test]
  async fn releases_when_body_fails() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = Tracked::new("a", &log);
    let group = ResourceGroup::new().with(&a);

    let out: Result<(), Error> = group
      .scoped(|| async { Err(Error::EntityNotFound("x".into())) })
      .await;

    assert!(matches!(out, Err(Error::EntityNotFound(_))));
    assert_eq!(entries(&log), ["+a", "-a"]);
  }

  #[tokio::test]
  async fn failed_acquire_releases_earlier_members_only() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = Tracked::new("a", &log);
    let b = Tracked {
      fail_acquire: true,
      ..Tracked::new("b", &log)
    };
    let c = Tracked::new("c", &log);
    let group = ResourceGroup::new().with(&a).with(&b).with(&c);

    let out: Result<(), Error> = group.scoped(|| async { Ok(()) }).await;

    match out {
      Err(Error::Acquire { name, .. }) => assert_eq!(name, "b"),
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(entries(&log), ["+a", "-a"]);
  }
}
