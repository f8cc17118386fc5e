//! Client tests against an in-process DAV server.

use std::{
  collections::BTreeMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use axum::{
  Router,
  extract::State,
  http::{HeaderMap, Method, StatusCode, Uri, header},
  response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use bytes::Bytes;
use roster_core::{
  collection::RemoteCollection, entity::SnapshotMode, storage::PictureStorage,
};

use crate::{
  CardDavClient, CardDavConfig, Error, RetryPolicy, StorageConfig,
  WebDavStorage,
};

const USER: &str = "alice";
const PASS: &str = "secret";
const MODIFIED: &str = "Mon, 01 Jan 2024 10:00:00 GMT";

// ─── Fake server ─────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Fake {
  files:      Arc<Mutex<BTreeMap<String, Bytes>>>,
  fail_next:  Arc<AtomicUsize>,
  if_matches: Arc<Mutex<Vec<String>>>,
}

impl Fake {
  fn insert(&self, path: &str, body: &str) {
    self
      .files
      .lock()
      .unwrap()
      .insert(path.to_string(), Bytes::from(body.to_string()));
  }

  fn file(&self, path: &str) -> Option<Bytes> {
    self.files.lock().unwrap().get(path).cloned()
  }
}

fn etag_of(body: &Bytes) -> String { format!("\"len-{}\"", body.len()) }

fn encode_path(path: &str) -> String {
  path
    .split('/')
    .map(|s| urlencoding::encode(s).into_owned())
    .collect::<Vec<_>>()
    .join("/")
}

fn multistatus(dir: &str, files: &[(String, Bytes)]) -> String {
  let mut xml = String::from(
    r#"<?xml version="1.0"?><d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">"#,
  );
  xml.push_str(&format!(
    "<d:response><d:href>{}</d:href><d:propstat><d:prop>\
     <d:resourcetype><d:collection/><card:addressbook/></d:resourcetype>\
     </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>",
    encode_path(dir)
  ));
  for (path, body) in files {
    xml.push_str(&format!(
      "<d:response><d:href>{}</d:href><d:propstat><d:prop>\
       <d:resourcetype/><d:getetag>{}</d:getetag>\
       <d:getcontentlength>{}</d:getcontentlength>\
       <d:getlastmodified>{MODIFIED}</d:getlastmodified>\
       </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>",
      encode_path(path),
      etag_of(body).replace('"', "&quot;"),
      body.len(),
    ));
  }
  xml.push_str("</d:multistatus>");
  xml
}

async fn handle(
  State(fake): State<Fake>,
  method: Method,
  uri: Uri,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  let expected = format!("Basic {}", B64.encode(format!("{USER}:{PASS}")));
  if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
    != Some(expected.as_str())
  {
    return StatusCode::UNAUTHORIZED.into_response();
  }

  if fake
    .fail_next
    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
    .is_ok()
  {
    return StatusCode::SERVICE_UNAVAILABLE.into_response();
  }

  let path = urlencoding::decode(uri.path()).unwrap().into_owned();

  match method.as_str() {
    "PROPFIND" => {
      let files: Vec<(String, Bytes)> = fake
        .files
        .lock()
        .unwrap()
        .iter()
        .filter(|(p, _)| {
          p.strip_prefix(&path)
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
        })
        .map(|(p, b)| (p.clone(), b.clone()))
        .collect();
      (StatusCode::MULTI_STATUS, multistatus(&path, &files)).into_response()
    }
    "GET" if uri.query() == Some("export") => {
      let export: Vec<u8> = fake
        .files
        .lock()
        .unwrap()
        .iter()
        .filter(|(p, _)| p.starts_with(&path))
        .flat_map(|(_, b)| b.to_vec())
        .collect();
      (StatusCode::OK, export).into_response()
    }
    "GET" => match fake.file(&path) {
      Some(body) => (StatusCode::OK, body).into_response(),
      None => StatusCode::NOT_FOUND.into_response(),
    },
    "PUT" => {
      if let Some(tag) = headers.get(header::IF_MATCH) {
        let tag = tag.to_str().unwrap().to_string();
        fake.if_matches.lock().unwrap().push(tag.clone());
        if fake.file(&path).map(|b| etag_of(&b)) != Some(tag) {
          return StatusCode::PRECONDITION_FAILED.into_response();
        }
      }
      fake.files.lock().unwrap().insert(path, body);
      StatusCode::CREATED.into_response()
    }
    "DELETE" => match fake.files.lock().unwrap().remove(&path) {
      Some(_) => StatusCode::NO_CONTENT.into_response(),
      None => StatusCode::NOT_FOUND.into_response(),
    },
    _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
  }
}

async fn serve(fake: Fake) -> String {
  let app = Router::new().fallback(handle).with_state(fake);
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
  format!("http://{addr}")
}

fn quick_retry() -> RetryPolicy {
  RetryPolicy {
    max_attempts:    3,
    initial_backoff: Duration::from_millis(1),
    max_backoff:     Duration::from_millis(2),
  }
}

async fn carddav(fake: &Fake) -> CardDavClient {
  let base = serve(fake.clone()).await;
  CardDavClient::with_retry(
    &CardDavConfig {
      username:         USER.to_string(),
      password:         PASS.to_string(),
      address_book_url: format!("{base}/dav/ab"),
    },
    quick_retry(),
  )
  .unwrap()
}

async fn storage(fake: &Fake) -> WebDavStorage {
  let base = serve(fake.clone()).await;
  WebDavStorage::with_retry(
    &StorageConfig {
      username:    USER.to_string(),
      password:    PASS.to_string(),
      base_url:    format!("{base}/"),
      target_path: "contacts".to_string(),
    },
    quick_retry(),
  )
  .unwrap()
}

fn vcard(uid: &str, fn_: &str) -> String {
  format!("BEGIN:VCARD\r\nVERSION:3.0\r\nUID:{uid}\r\nFN:{fn_}\r\nEND:VCARD\r\n")
}

// ─── CardDAV ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn metadata_listing_skips_collections() {
  let fake = Fake::default();
  fake.insert("/dav/ab/u1.vcf", &vcard("u1", "One"));
  fake.insert("/dav/ab/with space.vcf", &vcard("with space", "Two"));
  fake.insert("/dav/other/u9.vcf", &vcard("u9", "Nine"));
  let client = carddav(&fake).await;

  let snapshot = client.list_entities(SnapshotMode::Metadata).await.unwrap();
  assert_eq!(snapshot.uids().collect::<Vec<_>>(), ["u1", "with space"]);

  let rec = snapshot.get("u1").unwrap();
  assert!(rec.content.is_none());
  assert_eq!(rec.meta.etag.as_deref(), Some("\"len-53\""));
  assert_eq!(rec.meta.content_length, Some(53));
  assert_eq!(
    rec.meta.last_modified.unwrap().to_rfc3339(),
    "2024-01-01T10:00:00+00:00"
  );
}

#[tokio::test]
async fn full_listing_is_keyed_by_vcard_uid() {
  let fake = Fake::default();
  fake.insert("/dav/ab/file-a.vcf", &vcard("uid-a", "A"));
  fake.insert("/dav/ab/file-b.vcf", &vcard("uid-b", "B"));
  fake.insert("/dav/ab/broken.vcf", "BEGIN:VCARD\r\nFN:No uid\r\nEND:VCARD\r\n");
  let client = carddav(&fake).await;

  let snapshot = client.list_entities(SnapshotMode::Full).await.unwrap();
  assert_eq!(snapshot.len(), 2);
  assert_eq!(
    snapshot.get("uid-a").unwrap().content.as_deref(),
    Some(vcard("uid-a", "A").as_bytes())
  );
}

#[tokio::test]
async fn put_fetch_delete() {
  let fake = Fake::default();
  let client = carddav(&fake).await;

  assert!(matches!(
    client.fetch_entity("u1").await,
    Err(Error::NotFound(_))
  ));

  let body = Bytes::from(vcard("u1", "One"));
  client.put_entity("u1", body.clone(), None).await.unwrap();
  assert_eq!(fake.file("/dav/ab/u1.vcf"), Some(body.clone()));
  assert_eq!(client.fetch_entity("u1").await.unwrap(), body);

  client.delete_entity("u1").await.unwrap();
  assert!(fake.file("/dav/ab/u1.vcf").is_none());
  assert!(matches!(
    client.delete_entity("u1").await,
    Err(Error::Status { status, .. }) if status == reqwest::StatusCode::NOT_FOUND
  ));
}

#[tokio::test]
async fn if_match_is_sent() {
  let fake = Fake::default();
  fake.insert("/dav/ab/u1.vcf", &vcard("u1", "One"));
  let client = carddav(&fake).await;

  let stale = client
    .put_entity("u1", Bytes::from("x"), Some("\"stale\""))
    .await;
  assert!(matches!(
    stale,
    Err(Error::Status { status, .. }) if status == reqwest::StatusCode::PRECONDITION_FAILED
  ));

  client
    .put_entity("u1", Bytes::from("x"), Some("\"len-53\""))
    .await
    .unwrap();
  assert_eq!(
    *fake.if_matches.lock().unwrap(),
    ["\"stale\"", "\"len-53\""]
  );
}

#[tokio::test]
async fn transient_failures_are_retried() {
  let fake = Fake::default();
  fake.insert("/dav/ab/u1.vcf", &vcard("u1", "One"));
  let client = carddav(&fake).await;

  fake.fail_next.store(2, Ordering::SeqCst);
  let snapshot = client.list_entities(SnapshotMode::Metadata).await.unwrap();
  assert_eq!(snapshot.len(), 1);

  fake.fail_next.store(10, Ordering::SeqCst);
  assert!(matches!(
    client.fetch_entity("u1").await,
    Err(Error::Status { status, .. }) if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
  ));
  assert_eq!(fake.fail_next.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn wrong_credentials_are_reported() {
  let fake = Fake::default();
  let base = serve(fake.clone()).await;
  let client = CardDavClient::new(&CardDavConfig {
    username:         USER.to_string(),
    password:         "wrong".to_string(),
    address_book_url: format!("{base}/dav/ab/"),
  })
  .unwrap();

  assert!(matches!(
    client.list_entities(SnapshotMode::Metadata).await,
    Err(Error::Status { status, .. }) if status == reqwest::StatusCode::UNAUTHORIZED
  ));
}

// ─── Storage ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn storage_round_trip() {
  let fake = Fake::default();
  let store = storage(&fake).await;
  assert!(store.root().as_str().ends_with("/remote.php/dav/files/alice/"));

  store
    .upload(Bytes::from("png"), "contacts/photos/+49151 1.png")
    .await
    .unwrap();
  assert_eq!(
    fake.file("/remote.php/dav/files/alice/contacts/photos/+49151 1.png"),
    Some(Bytes::from("png"))
  );

  let paths = store.list_paths("contacts/photos").await.unwrap();
  assert_eq!(paths, ["contacts/photos/+49151 1.png"]);

  assert_eq!(
    store.download("contacts/photos/+49151 1.png").await.unwrap(),
    Some(Bytes::from("png"))
  );
  assert_eq!(store.download("contacts/missing.toml").await.unwrap(), None);
}
