//! vCard serializer.
//!
//! Produces CRLF line endings and folds at 75 octets per RFC 6350 §3.2.

use crate::{Card, Param, Property};

// ─── RFC 6350 line folding ────────────────────────────────────────────────────

/// Emit `s` as one logical line, folding at 75 octets with CRLF + SP continuation.
pub(crate) fn fold_line(s: &str) -> String {
  if s.len() <= 75 {
    return format!("{}\r\n", s);
  }

  let mut result = String::new();
  let total = s.len();
  let mut pos = 0usize;
  let mut first = true;

  while pos < total {
    let limit = if first { 75 } else { 74 };
    let end   = if pos + limit >= total {
      total
    } else {
      // Walk back to the nearest valid UTF-8 char boundary
      let mut e = pos + limit;
      while e > pos && !s.is_char_boundary(e) {
        e -= 1;
      }
      // Guarantee at least one byte per segment
      if e == pos { pos + 1 } else { e }
    };

    if !first {
      result.push(' ');
    }
    result.push_str(&s[pos..end]);
    result.push_str("\r\n");
    pos   = end;
    first = false;
  }

  result
}

// ─── Value escaping ───────────────────────────────────────────────────────────

/// Escape a text value: `\`, `,`, `;`, `\n`.
pub(crate) fn escape_value(s: &str) -> String {
  s.replace('\\', "\\\\")
   .replace(',', "\\,")
   .replace(';', "\\;")
   .replace('\n', "\\n")
}

fn write_param(out: &mut String, param: &Param) {
  out.push(';');
  out.push_str(&param.name);
  out.push('=');
  if param.value.contains([':', ';']) {
    out.push('"');
    out.push_str(&param.value);
    out.push('"');
  } else {
    out.push_str(&param.value);
  }
}

// ─── Content lines ────────────────────────────────────────────────────────────

pub(crate) fn content_line(property: &Property) -> String {
  let mut line = String::new();
  if let Some(group) = &property.group {
    line.push_str(group);
    line.push('.');
  }
  line.push_str(&property.name);
  for param in &property.params {
    write_param(&mut line, param);
  }
  line.push(':');
  line.push_str(&property.value);
  line
}

pub(crate) fn serialize(card: &Card) -> String {
  let mut out = String::from("BEGIN:VCARD\r\n");
  for property in &card.properties {
    out.push_str(&fold_line(&content_line(property)));
  }
  for line in &card.unparsed {
    out.push_str(line);
    out.push_str("\r\n");
  }
  out.push_str("END:VCARD\r\n");
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_line_is_not_folded() {
    assert_eq!(fold_line("FN:Alice"), "FN:Alice\r\n");
  }

  #[test]
  fn long_line_is_folded_at_75_octets() {
    let line = format!("NOTE:{}", "x".repeat(200));
    let folded = fold_line(&line);
    let parts: Vec<&str> = folded.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(parts[0].len(), 75);
    assert!(parts[1..].iter().all(|p| p.starts_with(' ') && p.len() <= 75));
    assert_eq!(
      crate::parse::unfold_lines(&folded).concat(),
      line
    );
  }

  #[test]
  fn folding_respects_char_boundaries() {
    let line = format!("NOTE:{}", "ü".repeat(60));
    for segment in fold_line(&line).split("\r\n") {
      assert!(segment.len() <= 75);
    }
  }

  #[test]
  fn text_escaping() {
    assert_eq!(escape_value("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");
  }

  #[test]
  fn params_with_separators_are_quoted() {
    let p = Property::new("X-FOO", "v")
      .with_param("LABEL", "a:b")
      .with_param("TYPE", "HOME,WORK");
    assert_eq!(content_line(&p), "X-FOO;LABEL=\"a:b\";TYPE=HOME,WORK:v");
  }

  #[test]
  fn envelope_wraps_properties() {
    let mut card = Card::default();
    card.push(Property::new("VERSION", "3.0"));
    card.push(Property::new("FN", "Alice"));
    assert_eq!(
      serialize(&card),
      "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:Alice\r\nEND:VCARD\r\n"
    );
  }
}
