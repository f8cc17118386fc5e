//! WebDAV multistatus parsing.
//!
//! A hand-written `quick-xml` event loop over PROPFIND responses. Only the
//! properties the clients act on are extracted; everything else is skipped.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;

use crate::error::{Error, Result};

// ─── Namespaces ─────────────────────────────────────────────────────────────

pub const NS_DAV: &str = "DAV:";
pub const NS_CARDDAV: &str = "urn:ietf:params:xml:ns:carddav";

/// Body of every PROPFIND the clients send.
pub const PROPFIND_BODY: &str = concat!(
  r#"<?xml version="1.0" encoding="utf-8"?>"#,
  r#"<d:propfind xmlns:d="DAV:"><d:prop>"#,
  "<d:resourcetype/><d:getetag/><d:getcontenttype/>",
  "<d:getcontentlength/><d:getlastmodified/>",
  "</d:prop></d:propfind>",
);

// ─── Multistatus response ────────────────────────────────────────────────────

/// One `<d:response>` of a multistatus body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResponse {
  pub href:           String,
  /// Set for `<d:collection/>` and `<card:addressbook/>` resource types.
  pub is_collection:  bool,
  pub etag:           Option<String>,
  pub content_type:   Option<String>,
  pub content_length: Option<u64>,
  pub last_modified:  Option<String>,
}

impl DavResponse {
  /// `getlastmodified` as a timestamp; `None` when absent or unparseable.
  pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
    self
      .last_modified
      .as_deref()
      .and_then(|s| DateTime::parse_from_rfc2822(s.trim()).ok())
      .map(|dt| dt.with_timezone(&Utc))
  }
}

fn local_name(name: &[u8]) -> &[u8] {
  // strip "prefix:" if present
  if let Some(pos) = name.iter().rposition(|&b| b == b':') {
    &name[pos + 1..]
  } else {
    name
  }
}

/// Parse a `207 Multi-Status` body into its responses, in document order.
pub fn parse_multistatus(xml: &[u8]) -> Result<Vec<DavResponse>> {
  let mut reader = quick_xml::Reader::from_reader(xml);
  reader.config_mut().trim_text(true);

  let mut responses = Vec::new();
  let mut current: Option<DavResponse> = None;
  let mut path: Vec<Vec<u8>> = Vec::new();
  let mut buf = Vec::new();

  loop {
    match reader.read_event_into(&mut buf) {
      Ok(Event::Start(ref e)) => {
        let name_buf = e.name();
        let local = local_name(name_buf.as_ref()).to_vec();
        if local == b"response" {
          current = Some(DavResponse::default());
        }
        path.push(local);
      }
      Ok(Event::Empty(ref e)) => {
        let name_buf = e.name();
        let local = local_name(name_buf.as_ref());
        let in_resourcetype =
          path.last().is_some_and(|p| p.as_slice() == b"resourcetype");
        if in_resourcetype
          && matches!(local, b"collection" | b"addressbook")
          && let Some(resp) = current.as_mut()
        {
          resp.is_collection = true;
        }
      }
      Ok(Event::Text(ref e)) => {
        if let (Some(resp), Some(leaf)) = (current.as_mut(), path.last()) {
          let text = e
            .unescape()
            .map_err(|e| Error::Xml(e.to_string()))?
            .trim()
            .to_string();
          match leaf.as_slice() {
            b"href" => resp.href = text,
            b"getetag" => resp.etag = Some(text),
            b"getcontenttype" => resp.content_type = Some(text),
            b"getcontentlength" => resp.content_length = text.parse().ok(),
            b"getlastmodified" => resp.last_modified = Some(text),
            _ => {}
          }
        }
      }
      Ok(Event::End(ref e)) => {
        let name_buf = e.name();
        if local_name(name_buf.as_ref()) == b"response"
          && let Some(resp) = current.take()
        {
          responses.push(resp);
        }
        path.pop();
      }
      Ok(Event::Eof) => break,
      Err(e) => return Err(Error::Xml(e.to_string())),
      _ => {}
    }
    buf.clear();
  }

  Ok(responses)
}

/// The UID encoded in a vCard resource href (`…/<uid>.vcf`), percent-decoded.
pub fn uid_from_href(href: &str) -> Option<String> {
  let name = href.strip_suffix(".vcf")?.rsplit('/').next()?;
  if name.is_empty() {
    return None;
  }
  Some(
    urlencoding::decode(name)
      .map(|s| s.into_owned())
      .unwrap_or_else(|_| name.to_string()),
  )
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  const LISTING: &[u8] = br#"<?xml version="1.0"?>
  <d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
    <d:response>
      <d:href>/dav/addressbooks/personal/</d:href>
      <d:propstat>
        <d:prop>
          <d:resourcetype><d:collection/><card:addressbook/></d:resourcetype>
        </d:prop>
        <d:status>HTTP/1.1 200 OK</d:status>
      </d:propstat>
    </d:response>
    <d:response>
      <d:href>/dav/addressbooks/personal/abc%20def.vcf</d:href>
      <d:propstat>
        <d:prop>
          <d:resourcetype/>
          <d:getetag>"e1"</d:getetag>
          <d:getcontenttype>text/vcard</d:getcontenttype>
          <d:getcontentlength>123</d:getcontentlength>
          <d:getlastmodified>Mon, 01 Jan 2024 10:00:00 GMT</d:getlastmodified>
        </d:prop>
        <d:status>HTTP/1.1 200 OK</d:status>
      </d:propstat>
    </d:response>
    <d:response>
      <d:href>/dav/addressbooks/personal/x.vcf</d:href>
      <d:propstat>
        <d:prop>
          <d:getcontentlength>n/a</d:getcontentlength>
          <d:getlastmodified>yesterday</d:getlastmodified>
        </d:prop>
      </d:propstat>
    </d:response>
  </d:multistatus>"#;

  #[test]
  fn collections_are_flagged() {
    let responses = parse_multistatus(LISTING).unwrap();
    assert_eq!(responses.len(), 3);
    assert!(responses[0].is_collection);
    assert!(!responses[1].is_collection);
  }

  #[test]
  fn resource_properties_are_extracted() {
    let responses = parse_multistatus(LISTING).unwrap();
    let r = &responses[1];
    assert_eq!(r.href, "/dav/addressbooks/personal/abc%20def.vcf");
    assert_eq!(r.etag.as_deref(), Some("\"e1\""));
    assert_eq!(r.content_type.as_deref(), Some("text/vcard"));
    assert_eq!(r.content_length, Some(123));
    assert_eq!(
      r.last_modified_at().unwrap().to_rfc3339(),
      "2024-01-01T10:00:00+00:00"
    );
  }

  #[test]
  fn unparseable_values_become_absent() {
    let responses = parse_multistatus(LISTING).unwrap();
    assert_eq!(responses[2].content_length, None);
    assert_eq!(responses[2].last_modified_at(), None);
  }

  #[test]
  fn uid_is_taken_from_href() {
    assert_eq!(
      uid_from_href("/dav/ab/abc%20def.vcf").as_deref(),
      Some("abc def")
    );
    assert_eq!(uid_from_href("/dav/ab/").as_deref(), None);
    assert_eq!(uid_from_href("/dav/ab/photo.png").as_deref(), None);
  }

  #[test]
  fn malformed_xml_is_an_error() {
    assert!(matches!(
      parse_multistatus(b"<a></b>"),
      Err(Error::Xml(_))
    ));
  }
}
