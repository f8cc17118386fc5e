//! vCard 3.0 / 4.0 codec for Roster.
//!
//! A property-level model: a [`Card`] is the ordered list of its content
//! lines, each kept in wire form. Editing helpers touch only the properties
//! they name, so everything else survives a parse/serialize cycle. Pure
//! synchronous; no HTTP dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use roster_vcard::Card;
//!
//! let vcard = "BEGIN:VCARD\r\nVERSION:4.0\r\nUID:a-1\r\nFN:Alice\r\nEND:VCARD\r\n";
//! let card = Card::parse(vcard).unwrap();
//! println!("uid={:?} phones={}", card.uid(), card.phones().len());
//! ```

pub mod error;
mod parse;
mod serialize;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
pub use error::{Error, Result};

/// Format of `REV` values written by [`Card::set_revision`].
pub const REVISION_FORMAT: &str = "%Y%m%dT%H%M%SZ";

// ─── Public types ────────────────────────────────────────────────────────────

/// One property parameter, e.g. `TYPE=CELL`. Names are upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
  pub name:  String,
  pub value: String,
}

/// One content line. `value` is stored escaped, exactly as on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
  pub group:  Option<String>,
  pub name:   String,
  pub params: Vec<Param>,
  pub value:  String,
}

/// A decoded `PHOTO` property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
  pub data:      Vec<u8>,
  pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phone {
  pub number: String,
  pub types:  Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
  pub address: String,
  pub types:   Vec<String>,
}

/// A single vCard, without its `BEGIN`/`END` envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Card {
  properties: Vec<Property>,
  /// Content lines that could not be parsed. They are written back verbatim,
  /// after the properties, so a rewritten card never loses them.
  unparsed:   Vec<String>,
}

// ─── Property ────────────────────────────────────────────────────────────────

impl Property {
  /// A property with a raw (already escaped) value.
  pub fn new(name: &str, value: impl Into<String>) -> Self {
    Self {
      group:  None,
      name:   name.to_uppercase(),
      params: Vec::new(),
      value:  value.into(),
    }
  }

  /// A text property; `text` is escaped.
  pub fn text(name: &str, text: &str) -> Self {
    Self::new(name, serialize::escape_value(text))
  }

  pub fn with_param(mut self, name: &str, value: &str) -> Self {
    self.params.push(Param {
      name:  name.to_uppercase(),
      value: value.to_string(),
    });
    self
  }

  /// First value of parameter `name`.
  pub fn param(&self, name: &str) -> Option<&str> {
    self
      .params
      .iter()
      .find(|p| p.name.eq_ignore_ascii_case(name))
      .map(|p| p.value.as_str())
  }

  /// All `TYPE` values, upper-cased, handling `TYPE=A,B` and repeated params.
  pub fn types(&self) -> Vec<String> {
    self
      .params
      .iter()
      .filter(|p| p.name.eq_ignore_ascii_case("TYPE"))
      .flat_map(|p| p.value.split(','))
      .map(|t| t.trim().to_uppercase())
      .filter(|t| !t.is_empty())
      .collect()
  }

  /// The decoded text value.
  pub fn text_value(&self) -> String {
    let is_qp = self
      .param("ENCODING")
      .is_some_and(|e| e.eq_ignore_ascii_case("QUOTED-PRINTABLE"));
    if is_qp {
      parse::unescape_value(&parse::decode_quoted_printable(&self.value))
    } else {
      parse::unescape_value(&self.value)
    }
  }
}

// ─── Card ────────────────────────────────────────────────────────────────────

impl Card {
  /// Parse the first card in `input`.
  pub fn parse(input: &str) -> Result<Self> { parse::parse_card(input) }

  pub fn from_bytes(input: &[u8]) -> Result<Self> {
    Self::parse(std::str::from_utf8(input)?)
  }

  /// Serialize as CRLF-terminated lines folded at 75 octets.
  pub fn serialize(&self) -> String { serialize::serialize(self) }

  pub fn properties(&self) -> &[Property] { &self.properties }

  pub fn unparsed(&self) -> &[String] { &self.unparsed }

  /// First property called `name`.
  pub fn get(&self, name: &str) -> Option<&Property> {
    self
      .properties
      .iter()
      .find(|p| p.name.eq_ignore_ascii_case(name))
  }

  pub fn all<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Iterator<Item = &'a Property> + 'a {
    self
      .properties
      .iter()
      .filter(move |p| p.name.eq_ignore_ascii_case(name))
  }

  pub fn push(&mut self, property: Property) { self.properties.push(property); }

  /// Remove every property called `name`; returns how many were removed.
  pub fn remove(&mut self, name: &str) -> usize {
    let before = self.properties.len();
    self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
    before - self.properties.len()
  }

  fn text_of(&self, name: &str) -> Option<String> {
    self
      .get(name)
      .map(Property::text_value)
      .filter(|v| !v.trim().is_empty())
  }

  pub fn version(&self) -> Option<String> { self.text_of("VERSION") }

  pub fn uid(&self) -> Option<String> { self.text_of("UID") }

  pub fn formatted_name(&self) -> Option<String> { self.text_of("FN") }

  pub fn nickname(&self) -> Option<String> { self.text_of("NICKNAME") }

  pub fn note(&self) -> Option<String> { self.text_of("NOTE") }

  /// Replace the first `NOTE` in place, or append one.
  pub fn set_note(&mut self, text: &str) {
    let escaped = serialize::escape_value(text);
    match self
      .properties
      .iter_mut()
      .find(|p| p.name.eq_ignore_ascii_case("NOTE"))
    {
      Some(note) => {
        note.params.retain(|p| !p.name.eq_ignore_ascii_case("ENCODING"));
        note.value = escaped;
      }
      None => self.push(Property::new("NOTE", escaped)),
    }
  }

  pub fn phones(&self) -> Vec<Phone> {
    self
      .all("TEL")
      .map(|p| Phone {
        number: p.text_value(),
        types:  p.types(),
      })
      .filter(|p| !p.number.trim().is_empty())
      .collect()
  }

  pub fn emails(&self) -> Vec<Email> {
    self
      .all("EMAIL")
      .map(|p| Email {
        address: p.text_value().trim().to_string(),
        types:   p.types(),
      })
      .filter(|e| !e.address.is_empty())
      .collect()
  }

  pub fn add_phone(&mut self, number: &str, kind: &str) {
    self.push(Property::text("TEL", number).with_param("TYPE", kind));
  }

  pub fn add_email(&mut self, address: &str, kind: &str) {
    self.push(Property::text("EMAIL", address).with_param("TYPE", kind));
  }

  /// Decode the first `PHOTO`. Inline base64 (`ENCODING=b`) and `data:` URIs
  /// are understood; a photo given as an external URL yields `None`.
  pub fn photo(&self) -> Result<Option<Photo>> {
    let Some(property) = self.get("PHOTO") else {
      return Ok(None);
    };
    let value: String =
      property.value.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(uri) = value.strip_prefix("data:") {
      let Some((header, payload)) = uri.split_once(',') else {
        return Ok(None);
      };
      let Some(mime) = header.strip_suffix(";base64") else {
        return Ok(None);
      };
      return Ok(Some(Photo {
        data:      STANDARD.decode(payload)?,
        mime_type: mime.to_lowercase(),
      }));
    }

    let inline = property.param("ENCODING").is_some_and(|e| {
      e.eq_ignore_ascii_case("b") || e.eq_ignore_ascii_case("BASE64")
    });
    if !inline {
      return Ok(None);
    }

    let mime_type = property
      .types()
      .into_iter()
      .next()
      .map(|t| {
        if t.contains('/') {
          t.to_lowercase()
        } else {
          format!("image/{}", t.to_lowercase())
        }
      })
      .unwrap_or_else(|| "image/jpeg".to_string());

    Ok(Some(Photo {
      data: STANDARD.decode(value)?,
      mime_type,
    }))
  }

  pub fn has_photo(&self) -> bool { self.get("PHOTO").is_some() }

  /// Replace any `PHOTO` with an inline base64 one. `TYPE` is the upper-cased
  /// MIME subtype.
  pub fn set_photo(&mut self, data: &[u8], mime_type: &str) {
    let subtype = mime_type
      .split_once('/')
      .map_or(mime_type, |(_, sub)| sub)
      .to_uppercase();
    self.remove("PHOTO");
    self.push(
      Property::new("PHOTO", STANDARD.encode(data))
        .with_param("ENCODING", "b")
        .with_param("TYPE", &subtype),
    );
  }

  /// Replace any `REV` with `at`.
  pub fn set_revision(&mut self, at: DateTime<Utc>) {
    self.remove("REV");
    self.push(Property::new("REV", at.format(REVISION_FORMAT).to_string()));
  }
}

// ─── Multi-card documents ────────────────────────────────────────────────────

/// Split a multi-card document (e.g. an address-book export) into the raw
/// text of each `BEGIN:VCARD … END:VCARD` block, byte-for-byte.
pub fn split_cards(input: &str) -> Vec<&str> { parse::split_cards(input) }

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  const ALICE: &str = "BEGIN:VCARD\r\n\
    VERSION:3.0\r\n\
    UID:alice-1\r\n\
    FN:Alice Smith\r\n\
    NICKNAME:ali\r\n\
    TEL;TYPE=HOME:030 1234\r\n\
    TEL;TYPE=CELL,VOICE:0151 2345678\r\n\
    EMAIL;TYPE=WORK:alice@work.example\r\n\
    EMAIL:alice@home.example\r\n\
    NOTE:likes tea\\, not coffee\r\n\
    REV:20200101T000000Z\r\n\
    END:VCARD\r\n";

  #[test]
  fn unmodified_card_serializes_to_input() {
    let card = Card::parse(ALICE).unwrap();
    assert_eq!(card.serialize(), ALICE);
  }

  #[test]
  fn text_accessors() {
    let card = Card::parse(ALICE).unwrap();
    assert_eq!(card.version().as_deref(), Some("3.0"));
    assert_eq!(card.uid().as_deref(), Some("alice-1"));
    assert_eq!(card.formatted_name().as_deref(), Some("Alice Smith"));
    assert_eq!(card.nickname().as_deref(), Some("ali"));
    assert_eq!(card.note().as_deref(), Some("likes tea, not coffee"));
  }

  #[test]
  fn lookup_ignores_name_case() {
    let card = Card::parse(ALICE).unwrap();
    let lower = card.get("nickname").unwrap();
    let upper = card.get("NICKNAME").unwrap();
    assert!(std::ptr::eq(lower, upper));
    assert_eq!(lower.value, "ali");
    assert!(card.get("X-MISSING").is_none());
  }

  #[test]
  fn phones_and_emails_keep_types() {
    let card = Card::parse(ALICE).unwrap();
    let phones = card.phones();
    assert_eq!(phones.len(), 2);
    assert_eq!(phones[1].number, "0151 2345678");
    assert_eq!(phones[1].types, ["CELL", "VOICE"]);

    let emails = card.emails();
    assert_eq!(emails[0].types, ["WORK"]);
    assert_eq!(emails[1].address, "alice@home.example");
  }

  #[test]
  fn set_photo_then_read_back() {
    let mut card = Card::parse(ALICE).unwrap();
    assert!(!card.has_photo());

    card.set_photo(b"\x89PNG-bytes", "image/png");
    let line = card.get("PHOTO").unwrap();
    assert_eq!(line.param("ENCODING"), Some("b"));
    assert_eq!(line.param("TYPE"), Some("PNG"));

    let reparsed = Card::parse(&card.serialize()).unwrap();
    let photo = reparsed.photo().unwrap().unwrap();
    assert_eq!(photo.data, b"\x89PNG-bytes");
    assert_eq!(photo.mime_type, "image/png");

    card.set_photo(b"other", "image/jpeg");
    assert_eq!(card.all("PHOTO").count(), 1);
  }

  #[test]
  fn data_uri_photo_is_decoded() {
    let card = Card::parse(
      "BEGIN:VCARD\r\nVERSION:4.0\r\nPHOTO:data:image/jpeg;base64,aGVsbG8=\r\nEND:VCARD\r\n",
    )
    .unwrap();
    let photo = card.photo().unwrap().unwrap();
    assert_eq!(photo.data, b"hello");
    assert_eq!(photo.mime_type, "image/jpeg");
  }

  #[test]
  fn url_photo_is_not_inline() {
    let card = Card::parse(
      "BEGIN:VCARD\r\nPHOTO;VALUE=uri:https://example.com/a.jpg\r\nEND:VCARD\r\n",
    )
    .unwrap();
    assert!(card.has_photo());
    assert!(card.photo().unwrap().is_none());
  }

  #[test]
  fn broken_base64_is_an_error() {
    let card =
      Card::parse("BEGIN:VCARD\r\nPHOTO;ENCODING=b;TYPE=JPEG:@@@\r\nEND:VCARD\r\n")
        .unwrap();
    assert!(matches!(card.photo(), Err(Error::InvalidPhoto(_))));
  }

  #[test]
  fn set_revision_replaces_rev() {
    let mut card = Card::parse(ALICE).unwrap();
    card.set_revision(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap());
    let revs: Vec<_> = card.all("REV").map(|p| p.value.clone()).collect();
    assert_eq!(revs, ["20240506T070809Z"]);
  }

  #[test]
  fn set_note_replaces_in_place_and_escapes() {
    let mut card = Card::parse(ALICE).unwrap();
    card.set_note("one; two\nthree");
    assert_eq!(card.all("NOTE").count(), 1);
    assert_eq!(card.get("NOTE").unwrap().value, "one\\; two\\nthree");
    assert_eq!(card.note().as_deref(), Some("one; two\nthree"));

    let mut bare = Card::default();
    bare.set_note("hi");
    assert_eq!(bare.note().as_deref(), Some("hi"));
  }

  #[test]
  fn added_phone_and_email_are_typed() {
    let mut card = Card::default();
    card.add_phone("+4930123", "WORK");
    card.add_email("a@b.c", "HOME");
    assert_eq!(card.phones()[0].types, ["WORK"]);
    assert_eq!(card.emails()[0].address, "a@b.c");
  }

  #[test]
  fn rewritten_card_keeps_every_line() {
    let input = "BEGIN:VCARD\r\n\
      VERSION:2.1\r\n\
      NOTE;ENCODING=QUOTED-PRINTABLE:line1=\r\n\
      line2\r\n\
      X-BROKEN without separator\r\n\
      TEL;CELL:0151 1\r\n\
      END:VCARD\r\n";
    let mut card = Card::parse(input).unwrap();
    assert_eq!(card.note().as_deref(), Some("line1line2"));
    assert_eq!(card.unparsed(), ["X-BROKEN without separator"]);

    card.set_photo(b"img", "image/png");
    let out = card.serialize();
    assert!(out.contains("NOTE;ENCODING=QUOTED-PRINTABLE:line1line2\r\n"), "{out}");
    assert!(out.contains("\r\nX-BROKEN without separator\r\nEND:VCARD\r\n"), "{out}");

    let again = Card::parse(&out).unwrap();
    assert_eq!(again.note(), card.note());
    assert_eq!(again.phones(), card.phones());
    assert_eq!(again.unparsed(), card.unparsed());
  }

  #[test]
  fn non_utf8_input_is_rejected() {
    assert!(matches!(
      Card::from_bytes(&[0xff, 0xfe]),
      Err(Error::NotUtf8(_))
    ));
  }
}
