//! HTML to plain text conversion
//!
//! The web editor stores reports as HTML. Section parsing works on plain
//! text, so block-level elements become line breaks, inline markup is
//! dropped and character references are decoded.

use once_cell::sync::Lazy;
use quick_xml::escape::resolve_html5_entity;
use regex::{Captures, Regex};
use std::borrow::Cow;

static SCRIPT_OR_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid regex"));

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

static BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(p|div|br|h[1-6]|li|ul|ol|tr|td|th|table|thead|tbody|blockquote|section|article|header|footer|pre|hr)\b[^>]*>",
    )
    .expect("valid regex")
});

static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});")
        .expect("valid regex")
});

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").expect("valid regex"));

/// Convert an HTML fragment to plain text, one line per block element.
///
/// Plain text input passes through unchanged apart from entity decoding
/// and blank-line folding.
pub fn html_to_text(html: &str) -> String {
    let text = html.replace("\r\n", "\n");
    let text = SCRIPT_OR_STYLE.replace_all(&text, "");
    let text = COMMENT.replace_all(&text, "");
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let joined = lines.join("\n");

    BLANK_LINES.replace_all(&joined, "\n\n").trim().to_string()
}

/// Remove every tag without inserting line breaks.
pub fn strip_tags(html: &str) -> String {
    ANY_TAG.replace_all(html, "").trim().to_string()
}

/// Decode named and numeric character references. Unknown names are kept
/// as written.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    ENTITY.replace_all(text, |caps: &Captures<'_>| {
        let body = &caps[1];
        let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32).map(String::from)
        } else if let Some(dec) = body.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32).map(String::from)
        } else {
            resolve_html5_entity(body).map(|s| s.replace('\u{a0}', " "))
        };

        decoded.unwrap_or_else(|| caps[0].to_string())
    })
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}
