//! vCard 3.0 / 4.0 content-line parser.
//!
//! Pipeline:
//!   raw &str
//!     └─ unfold_lines()        → Vec<String>
//!          └─ parse_content_line() → Property
//!               └─ collect between BEGIN/END → Card
//!
//! Values are kept in their escaped wire form so an unmodified card
//! serializes back to the same logical lines.

use crate::{
  Card, Param, Property,
  error::{Error, Result},
};

// ─── Low-level helpers ──────────────────────────────────────────────────────

/// Join CRLF+SP (or LF+SP / LF+HT) continuation lines (RFC 6350 §3.2).
/// Tolerates bare LF line endings for real-world robustness.
///
/// vCard 2.1 quoted-printable values continue with a trailing `=` soft line
/// break instead; the `=` is dropped and the next line appended.
pub(crate) fn unfold_lines(s: &str) -> Vec<String> {
  let mut lines: Vec<String> = Vec::new();
  let mut soft_break = false;
  for raw in s.split('\n') {
    let line = raw.strip_suffix('\r').unwrap_or(raw);
    let continues = line.starts_with(' ') || line.starts_with('\t');
    if soft_break || continues {
      // A leading continuation with no prior line is discarded.
      if let Some(last) = lines.last_mut() {
        if soft_break {
          last.pop();
          last.push_str(line);
        } else {
          last.push_str(&line[1..]);
        }
      }
    } else {
      lines.push(line.to_string());
    }
    soft_break = lines.last().is_some_and(|l| ends_with_soft_break(l));
  }
  lines.retain(|l| !l.is_empty());
  lines
}

fn ends_with_soft_break(line: &str) -> bool {
  line.ends_with('=')
    && find_unquoted_colon(line).is_some_and(|colon| {
      line[..colon].to_ascii_uppercase().contains("QUOTED-PRINTABLE")
    })
}

/// Find the first `:` that is not inside double-quoted string.
fn find_unquoted_colon(s: &str) -> Option<usize> {
  let mut in_quotes = false;
  for (i, c) in s.char_indices() {
    match c {
      '"' => in_quotes = !in_quotes,
      ':' if !in_quotes => return Some(i),
      _ => {}
    }
  }
  None
}

/// Split on `;` while respecting double-quoted strings.
fn split_semicolons_respecting_quotes(s: &str) -> Vec<&str> {
  let mut result = Vec::new();
  let mut start = 0usize;
  let mut in_quotes = false;
  for (i, c) in s.char_indices() {
    match c {
      '"' => in_quotes = !in_quotes,
      ';' if !in_quotes => {
        result.push(&s[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }
  result.push(&s[start..]);
  result
}

/// Minimal quoted-printable decoder for vCard 3.0 `ENCODING=QUOTED-PRINTABLE`.
pub(crate) fn decode_quoted_printable(s: &str) -> String {
  let bytes = s.as_bytes();
  let mut result: Vec<u8> = Vec::with_capacity(bytes.len());
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'=' && i + 2 < bytes.len() {
      let hi = (bytes[i + 1] as char).to_digit(16);
      let lo = (bytes[i + 2] as char).to_digit(16);
      if let (Some(hi), Some(lo)) = (hi, lo) {
        result.push(((hi << 4) | lo) as u8);
        i += 3;
        continue;
      }
    }
    result.push(bytes[i]);
    i += 1;
  }
  String::from_utf8_lossy(&result).into_owned()
}

pub(crate) fn unescape_value(s: &str) -> String {
  let mut result = String::with_capacity(s.len());
  let mut chars = s.chars().peekable();
  while let Some(c) = chars.next() {
    if c == '\\' {
      match chars.next() {
        Some('n') | Some('N') => result.push('\n'),
        Some('\\') => result.push('\\'),
        Some(',') => result.push(','),
        Some(';') => result.push(';'),
        Some(other) => {
          result.push('\\');
          result.push(other);
        }
        None => result.push('\\'),
      }
    } else {
      result.push(c);
    }
  }
  result
}

// ─── Content-line parser ────────────────────────────────────────────────────

pub(crate) fn parse_content_line(line: &str) -> Result<Property> {
  let colon_pos = find_unquoted_colon(line)
    .ok_or_else(|| Error::MalformedContentLine(line.to_string()))?;

  let name_part = &line[..colon_pos];
  let value = line[colon_pos + 1..].to_string();

  let tokens = split_semicolons_respecting_quotes(name_part);
  let name_raw = tokens[0].trim();
  if name_raw.is_empty() {
    return Err(Error::MalformedContentLine(line.to_string()));
  }

  // Split group prefix (e.g. "item1.TEL" → group "item1", name "TEL")
  let (group, name) = match name_raw.rsplit_once('.') {
    Some((group, name)) => (Some(group.to_string()), name.to_uppercase()),
    None => (None, name_raw.to_uppercase()),
  };

  let mut params = Vec::new();
  for token in &tokens[1..] {
    if let Some(eq_pos) = token.find('=') {
      params.push(Param {
        name:  token[..eq_pos].trim().to_uppercase(),
        value: token[eq_pos + 1..].trim().trim_matches('"').to_string(),
      });
    } else {
      // Bare token, treat as TYPE=value (vCard 2.1/3.0 compat)
      let t = token.trim();
      if !t.is_empty() {
        params.push(Param {
          name:  "TYPE".to_string(),
          value: t.to_uppercase(),
        });
      }
    }
  }

  Ok(Property {
    group,
    name,
    params,
    value,
  })
}

// ─── Card parser ─────────────────────────────────────────────────────────────

/// Parse the first `BEGIN:VCARD … END:VCARD` block of `input`.
///
/// Malformed content lines inside the envelope are kept verbatim in
/// [`Card::unparsed`].
pub(crate) fn parse_card(input: &str) -> Result<Card> {
  let lines = unfold_lines(input);

  let start = lines
    .iter()
    .position(|l| l.eq_ignore_ascii_case("BEGIN:VCARD"))
    .ok_or(Error::MissingEnvelope)?;
  let end = lines[start + 1..]
    .iter()
    .position(|l| l.eq_ignore_ascii_case("END:VCARD"))
    .map(|offset| start + 1 + offset)
    .ok_or(Error::MissingEnvelope)?;

  let mut properties = Vec::new();
  let mut unparsed = Vec::new();
  for line in &lines[start + 1..end] {
    match parse_content_line(line) {
      Ok(property) => properties.push(property),
      Err(_) => unparsed.push(line.clone()),
    }
  }

  Ok(Card {
    properties,
    unparsed,
  })
}

/// Split a multi-card document into the raw text of each card, preserving the
/// original bytes (folding and line endings included).
pub(crate) fn split_cards(input: &str) -> Vec<&str> {
  let mut cards = Vec::new();
  let mut start: Option<usize> = None;
  let mut offset = 0usize;

  for line in input.split_inclusive('\n') {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.eq_ignore_ascii_case("BEGIN:VCARD") {
      start = Some(offset);
    } else if trimmed.eq_ignore_ascii_case("END:VCARD")
      && let Some(s) = start.take()
    {
      cards.push(&input[s..offset + line.len()]);
    }
    offset += line.len();
  }

  cards
}
