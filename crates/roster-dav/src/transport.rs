//! Shared HTTP plumbing: authentication, a concurrency gate and retries.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tokio::sync::Semaphore;
use url::Url;

use crate::error::{Error, Result};

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Retry policy ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts:    u32,
  pub initial_backoff: Duration,
  pub max_backoff:     Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts:    5,
      initial_backoff: Duration::from_millis(250),
      max_backoff:     Duration::from_secs(4),
    }
  }
}

impl RetryPolicy {
  fn delay(&self, attempt: u32) -> Duration {
    let exponent = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.initial_backoff.saturating_mul(exponent).min(self.max_backoff)
  }
}

fn is_retryable_status(status: StatusCode) -> bool {
  matches!(
    status,
    StatusCode::TOO_MANY_REQUESTS
      | StatusCode::BAD_GATEWAY
      | StatusCode::SERVICE_UNAVAILABLE
      | StatusCode::GATEWAY_TIMEOUT
  )
}

/// Every method the clients issue is idempotent, PROPFIND included.
fn is_idempotent(method: &Method) -> bool {
  matches!(method.as_str(), "GET" | "PUT" | "DELETE" | "PROPFIND" | "HEAD")
}

pub(crate) fn propfind() -> Result<Method> {
  Method::from_bytes(b"PROPFIND").map_err(|e| Error::Request(e.to_string()))
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// A fully read HTTP response.
#[derive(Debug)]
pub(crate) struct Reply {
  pub status: StatusCode,
  pub body:   Bytes,
}

impl Reply {
  /// Turn any non-success status into [`Error::Status`].
  pub fn success(self, method: &Method, url: &Url) -> Result<Bytes> {
    if self.status.is_success() {
      Ok(self.body)
    } else {
      Err(Error::Status {
        method: method.clone(),
        url:    url.to_string(),
        status: self.status,
      })
    }
  }
}

pub(crate) struct Transport {
  client:   Client,
  username: String,
  password: String,
  permits:  Semaphore,
  retry:    RetryPolicy,
}

impl Transport {
  pub fn new(
    username: &str,
    password: &str,
    max_concurrent: usize,
    retry: RetryPolicy,
  ) -> Result<Self> {
    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    Ok(Self {
      client,
      username: username.to_string(),
      password: password.to_string(),
      permits: Semaphore::new(max_concurrent),
      retry,
    })
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let req = self.client.request(method, url);
    if self.username.is_empty() {
      req
    } else {
      req.basic_auth(&self.username, Some(&self.password))
    }
  }

  /// Send one request and read its body while holding a concurrency permit.
  ///
  /// Idempotent methods are retried on connect/timeout errors and on
  /// 429/502/503/504 with exponential backoff.
  pub async fn send(
    &self,
    method: Method,
    url: &Url,
    configure: impl FnOnce(RequestBuilder) -> RequestBuilder,
  ) -> Result<Reply> {
    let _permit = self
      .permits
      .acquire()
      .await
      .map_err(|e| Error::Request(e.to_string()))?;

    let request = configure(self.request(method.clone(), url.clone()));
    let attempts = if is_idempotent(&method) {
      self.retry.max_attempts.max(1)
    } else {
      1
    };

    for attempt in 1..=attempts {
      let Some(cloned) = request.try_clone() else {
        return read(request.send().await?).await;
      };

      match cloned.send().await {
        Ok(response) => {
          let status = response.status();
          if is_retryable_status(status) && attempt < attempts {
            let delay = self.retry.delay(attempt);
            tracing::warn!(
              %method, %url, %status, attempt, ?delay,
              "retrying after status"
            );
            tokio::time::sleep(delay).await;
            continue;
          }
          return read(response).await;
        }
        Err(err) => {
          let retryable = err.is_timeout() || err.is_connect();
          if retryable && attempt < attempts {
            let delay = self.retry.delay(attempt);
            tracing::warn!(
              %method, %url, error = %err, attempt, ?delay,
              "retrying after transport error"
            );
            tokio::time::sleep(delay).await;
            continue;
          }
          return Err(err.into());
        }
      }
    }

    // attempts >= 1, so the loop always returns
    Err(Error::Request(format!("{method} {url}: no attempt made")))
  }
}

async fn read(response: reqwest::Response) -> Result<Reply> {
  let status = response.status();
  let body = response.bytes().await?;
  Ok(Reply { status, body })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backoff_doubles_up_to_cap() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay(1), Duration::from_millis(250));
    assert_eq!(policy.delay(2), Duration::from_millis(500));
    assert_eq!(policy.delay(3), Duration::from_secs(1));
    assert_eq!(policy.delay(10), Duration::from_secs(4));
  }

  #[test]
  fn retry_statuses() {
    assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
    assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
    assert!(!is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(!is_retryable_status(StatusCode::NOT_FOUND));
  }

  #[test]
  fn propfind_is_idempotent() {
    assert!(is_idempotent(&propfind().unwrap()));
    assert!(!is_idempotent(&Method::POST));
  }
}
