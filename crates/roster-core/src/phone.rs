//! Phone-number canonicalization.
//!
//! Every lookup and dedup key in Roster is a [`CanonicalPhone`]: a compact
//! `+<country><number>` string. Numbers that do not look like phone numbers at
//! all are kept verbatim (trimmed) so they still compare equal to themselves.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Country code assumed for numbers written in national format.
pub const DEFAULT_COUNTRY_CODE: &str = "49";

/// A normalized phone number used as a dedup and lookup key.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub struct CanonicalPhone(String);

impl CanonicalPhone {
  /// Canonicalize `raw`, assuming [`DEFAULT_COUNTRY_CODE`] for national
  /// numbers.
  pub fn parse(raw: &str) -> Self {
    Self::parse_with_country(raw, DEFAULT_COUNTRY_CODE)
  }

  /// Canonicalize `raw`, assuming `country_code` (digits only, no `+`) for
  /// numbers with a national trunk prefix.
  pub fn parse_with_country(raw: &str, country_code: &str) -> Self {
    let trimmed = raw.trim();
    // `+49 (0)151 …`: the bracketed trunk prefix is never dialled.
    let body = strip_tel_scheme(trimmed).replace("(0)", "");

    let mut digits = String::with_capacity(body.len());
    let mut international = false;
    for (i, c) in body.char_indices() {
      match c {
        '0'..='9' => digits.push(c),
        '+' if i == 0 => international = true,
        ' ' | '\t' | '-' | '(' | ')' | '.' | '/' => {}
        // Letters, extensions and the like: not a number we understand.
        _ => return Self(trimmed.to_string()),
      }
    }

    if digits.is_empty() {
      return Self(trimmed.to_string());
    }

    let canonical = if international {
      format!("+{}", drop_trunk_prefix(&digits, country_code))
    } else if let Some(rest) = digits.strip_prefix("00") {
      format!("+{}", drop_trunk_prefix(rest, country_code))
    } else if let Some(rest) = digits.strip_prefix('0') {
      format!("+{country_code}{rest}")
    } else {
      format!("+{country_code}{digits}")
    };
    Self(canonical)
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

/// `+49 0151 …` written with the national trunk `0` after the default
/// country code. Other countries are left alone; some keep a leading `0`.
fn drop_trunk_prefix(digits: &str, country_code: &str) -> String {
  match digits
    .strip_prefix(country_code)
    .and_then(|rest| rest.strip_prefix('0'))
  {
    Some(subscriber) => format!("{country_code}{subscriber}"),
    None => digits.to_string(),
  }
}

fn strip_tel_scheme(s: &str) -> &str {
  match s.get(..4) {
    Some(prefix) if prefix.eq_ignore_ascii_case("tel:") => &s[4..],
    _ => s,
  }
}

impl fmt::Display for CanonicalPhone {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<String> for CanonicalPhone {
  fn from(raw: String) -> Self { Self::parse(&raw) }
}

impl From<&str> for CanonicalPhone {
  fn from(raw: &str) -> Self { Self::parse(raw) }
}

impl From<CanonicalPhone> for String {
  fn from(phone: CanonicalPhone) -> Self { phone.0 }
}

impl AsRef<str> for CanonicalPhone {
  fn as_ref(&self) -> &str { &self.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn international_formats_collapse() {
    let expected = "+491512345678";
    for raw in [
      "+49 151 2345678",
      "+49-151-234-5678",
      "0049 (151) 2345678",
      "0151 2345678",
      "0151/2345678",
      "tel:+491512345678",
      "  +491512345678  ",
    ] {
      assert_eq!(CanonicalPhone::parse(raw).as_str(), expected, "{raw}");
    }
  }

  #[test]
  fn bracketed_trunk_prefix_is_dropped() {
    let national = CanonicalPhone::parse("0151 2345678");
    assert_eq!(CanonicalPhone::parse("+49 (0)151 2345678"), national);
    assert_eq!(CanonicalPhone::parse("+49(0)1512345678"), national);
    assert_eq!(CanonicalPhone::parse("0049 (0) 151 2345678"), national);
    assert_eq!(CanonicalPhone::parse("+49 0151 2345678"), national);
  }

  #[test]
  fn trunk_zero_of_other_countries_is_kept() {
    assert_eq!(CanonicalPhone::parse("+39 06 1234567").as_str(), "+39061234567");
  }

  #[test]
  fn custom_country_code() {
    let p = CanonicalPhone::parse_with_country("030 1234567", "43");
    assert_eq!(p.as_str(), "+43301234567");
  }

  #[test]
  fn non_numbers_are_kept_verbatim() {
    assert_eq!(CanonicalPhone::parse(" unknown ").as_str(), "unknown");
    assert_eq!(CanonicalPhone::parse("123 ext 4").as_str(), "123 ext 4");
  }

  #[test]
  fn serde_canonicalizes_on_read() {
    #[derive(Deserialize, Serialize)]
    struct Doc {
      phone: CanonicalPhone,
    }
    let doc: Doc = toml::from_str("phone = \"0151 2345678\"").unwrap();
    assert_eq!(doc.phone.as_str(), "+491512345678");
    let out = toml::to_string(&doc).unwrap();
    assert!(out.contains("\"+491512345678\""), "{out}");
  }
}
