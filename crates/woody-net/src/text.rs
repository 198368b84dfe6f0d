//! Text extraction
//!
//! Turns a fetched body into displayable text: tags are dropped and a few
//! common HTML entities are decoded. Nothing here parses HTML.

use crate::uri::UriReference;

const ENTITIES: &[(&str, &str)] = &[
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&nbsp;", " "),
];

/// Decode the entities in [`ENTITIES`]; unknown entities are left alone
pub fn decode_html_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, replacement)) => {
                out.push_str(replacement);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Strip tags, then decode entities
pub fn lex(body: &str) -> String {
    let mut text = String::with_capacity(body.len());
    let mut in_tag = false;

    for c in body.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    decode_html_entities(&text)
}

/// Text to display for a fetched body. `view-source:` shows the raw body.
pub fn render(uri: &UriReference, body: &str) -> String {
    match uri {
        UriReference::ViewSource { .. } => body.to_string(),
        _ => lex(body),
    }
}
