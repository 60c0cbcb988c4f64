//! Size optimisation of rendered SVG before it is URL-encoded into API
//! responses.
//!
//! A streaming pass: comments, declarations, doctypes and processing
//! instructions are dropped, whitespace between elements is trimmed,
//! attribute-less groups are unwrapped, geometry is rounded to two decimals
//! and attributes carrying their default value are removed.

use std::{borrow::Cow, io::Cursor};

use quick_xml::{
  Reader, Writer,
  events::{BytesStart, Event},
};

use crate::Result;

const GEOMETRY_ATTRIBUTES: &[&[u8]] = &[
  b"d", b"points", b"x", b"y", b"x1", b"y1", b"x2", b"y2", b"cx", b"cy", b"r", b"dx", b"dy",
  b"width", b"height", b"transform", b"viewBox", b"stroke-width",
];

const DEFAULT_ATTRIBUTES: &[(&[u8], &[u8])] = &[
  (b"opacity", b"1"),
  (b"fill-opacity", b"1"),
  (b"stroke-opacity", b"1"),
  (b"stroke-dasharray", b"none"),
  (b"dy", b"0"),
];

pub fn optimise(svg: &str) -> Result<String> {
  let mut reader = Reader::from_str(svg);
  reader.config_mut().trim_text(true);
  let mut writer = Writer::new(Cursor::new(Vec::new()));

  // One entry per open <g>: whether its tags were written.
  let mut groups: Vec<bool> = Vec::new();

  loop {
    match reader.read_event()? {
      Event::Start(e) => {
        if is_bare_group(&e) {
          groups.push(false);
          continue;
        }
        if e.name().as_ref() == b"g" {
          groups.push(true);
        }
        writer.write_event(Event::Start(optimise_element(&e)?))?;
      }
      Event::End(e) => {
        if e.name().as_ref() == b"g" && !groups.pop().unwrap_or(true) {
          continue;
        }
        writer.write_event(Event::End(e))?;
      }
      Event::Empty(e) => {
        if is_bare_group(&e) {
          continue;
        }
        writer.write_event(Event::Empty(optimise_element(&e)?))?;
      }
      Event::Comment(_) | Event::Decl(_) | Event::DocType(_) | Event::PI(_) => {}
      Event::Eof => break,
      other => writer.write_event(other)?,
    }
  }

  Ok(String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned())
}

fn is_bare_group(e: &BytesStart<'_>) -> bool { e.name().as_ref() == b"g" && e.attributes().next().is_none() }

fn optimise_element(e: &BytesStart<'_>) -> Result<BytesStart<'static>> {
  let mut attributes: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
  for attr in e.attributes() {
    let attr = attr.map_err(quick_xml::Error::from)?;
    let key = attr.key.as_ref().to_vec();
    let value: Cow<'_, [u8]> = attr.value;
    if DEFAULT_ATTRIBUTES.iter().any(|(k, v)| *k == key.as_slice() && *v == value.as_ref()) {
      continue;
    }
    let value = if GEOMETRY_ATTRIBUTES.contains(&key.as_slice()) {
      round_numbers(&String::from_utf8_lossy(&value)).into_bytes()
    } else {
      value.into_owned()
    };
    attributes.push((key, value));
  }

  let mut out = e.to_owned();
  out.clear_attributes();
  for (key, value) in &attributes {
    out.push_attribute((key.as_slice(), value.as_slice()));
  }
  Ok(out)
}

/// Round every number in an attribute value to two decimals, dropping
/// trailing zeros.
pub fn round_numbers(value: &str) -> String {
  let mut out = String::with_capacity(value.len());
  let mut number = String::new();

  let flush = |number: &mut String, out: &mut String| {
    if number.is_empty() {
      return;
    }
    match number.parse::<f64>() {
      Ok(n) => out.push_str(&format_rounded(n)),
      Err(_) => out.push_str(number),
    }
    number.clear();
  };

  for c in value.chars() {
    let continues = c.is_ascii_digit()
      || (c == '.' && !number.contains('.') && !number.contains(['e', 'E']))
      || ((c == 'e' || c == 'E') && !number.is_empty() && !number.contains(['e', 'E']))
      || (c == '-' && number.ends_with(['e', 'E']));
    if continues {
      number.push(c);
      continue;
    }
    flush(&mut number, &mut out);
    if c == '-' {
      number.push(c);
    } else {
      out.push(c);
    }
  }
  flush(&mut number, &mut out);
  out
}

fn format_rounded(n: f64) -> String {
  let s = format!("{n:.2}");
  let s = if s.contains('.') { s.trim_end_matches('0').trim_end_matches('.') } else { s.as_str() };
  match s {
    "-0" | "" => "0".into(),
    s => s.to_owned(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn numbers_are_rounded() {
    assert_eq!(round_numbers("M0.123,10.5L-3.456,7"), "M0.12,10.5L-3.46,7");
    assert_eq!(round_numbers("rotate(-90 12.3456 100)"), "rotate(-90 12.35 100)");
    assert_eq!(round_numbers("1e-7"), "0");
  }

  #[test]
  fn noise_is_removed() {
    let svg = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- generated -->
<svg width="515" height="220">
  <g>
    <g clip-path="url(#clip0)">
      <rect x="10.004" y="3.3333" width="4.5" height="1" fill="red" fill-opacity="1"/>
    </g>
  </g>
  <g/>
  <text x="1"><tspan x="1" dy="0">Cases &amp; deaths</tspan></text>
</svg>"#;
    assert_eq!(
      optimise(svg).unwrap(),
      concat!(
        r#"<svg width="515" height="220">"#,
        r#"<g clip-path="url(#clip0)"><rect x="10" y="3.33" width="4.5" height="1" fill="red"/></g>"#,
        r#"<text x="1"><tspan x="1">Cases &amp; deaths</tspan></text>"#,
        "</svg>",
      )
    );
  }
}
