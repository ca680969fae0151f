//! Response normalization: free-form model text → `Vec<TocEntry>`.
//!
//! Models are unreliable narrators of their own output shape. Even with a
//! "JSON list only" prompt and JSON mode enabled, answers arrive as:
//!
//! - a bare array: `[{"title": …}, …]`
//! - an object under a conventional key: `{"toc": [...]}`, `{"entries": [...]}`
//! - an object under some other key: `{"chapters": [...]}`
//! - fenced (` ```json … ``` `), prose, or nothing at all
//!
//! Parsing is a fixed, ordered list of shape matchers. Each looks at the
//! decoded JSON and either claims it (`Some(ResponseShape)`) or passes. The
//! first claim wins. Anything no matcher claims degrades to zero entries; a
//! malformed answer never becomes an error for the caller.
//!
//! Element coercion is equally lenient: `level` defaults to 1, `title` to "",
//! `page` to 1. Page numbers arriving as strings ("12", "xiv", "p. 7") are
//! parsed; clamping to the document happens later, in
//! [`crate::pipeline::outline`].

use crate::output::TocEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Keys checked, in order, when the model wraps its list in an object.
pub const TOC_KEYS: [&str; 4] = ["toc", "table_of_contents", "entries", "sections"];

/// Which matcher accepted a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    BareArray,
    NamedKey,
    FallbackList,
}

/// A recognised response shape, borrowing the entry list from the decoded JSON.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseShape<'a> {
    /// `[ {...}, ... ]`
    BareArray(&'a [Value]),
    /// `{ "toc": [ ... ] }` and the other [`TOC_KEYS`].
    NamedKey { key: &'static str, items: &'a [Value] },
    /// `{ "whatever": [ ... ] }`: first list-valued member in document order.
    FallbackList { key: &'a str, items: &'a [Value] },
}

impl<'a> ResponseShape<'a> {
    pub fn items(&self) -> &'a [Value] {
        match *self {
            ResponseShape::BareArray(items)
            | ResponseShape::NamedKey { items, .. }
            | ResponseShape::FallbackList { items, .. } => items,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            ResponseShape::BareArray(_) => ShapeKind::BareArray,
            ResponseShape::NamedKey { .. } => ShapeKind::NamedKey,
            ResponseShape::FallbackList { .. } => ShapeKind::FallbackList,
        }
    }
}

type ShapeMatcher = for<'a> fn(&'a Value) -> Option<ResponseShape<'a>>;

/// Tried in this order; the first `Some` wins.
const SHAPE_MATCHERS: [ShapeMatcher; 3] = [match_bare_array, match_named_key, match_fallback_list];

fn match_bare_array(value: &Value) -> Option<ResponseShape<'_>> {
    value
        .as_array()
        .map(|items| ResponseShape::BareArray(items.as_slice()))
}

fn match_named_key(value: &Value) -> Option<ResponseShape<'_>> {
    let obj = value.as_object()?;
    TOC_KEYS.iter().find_map(|&key| {
        obj.get(key)
            .and_then(Value::as_array)
            .map(|items| ResponseShape::NamedKey {
                key,
                items: items.as_slice(),
            })
    })
}

fn match_fallback_list(value: &Value) -> Option<ResponseShape<'_>> {
    let obj = value.as_object()?;
    obj.iter().find_map(|(key, val)| {
        val.as_array().map(|items| ResponseShape::FallbackList {
            key: key.as_str(),
            items: items.as_slice(),
        })
    })
}

/// Run the matchers over a decoded response.
pub fn match_shape(value: &Value) -> Option<ResponseShape<'_>> {
    SHAPE_MATCHERS.iter().find_map(|matcher| matcher(value))
}

/// Why a response produced no entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Malformed {
    /// Blank body.
    Empty,
    /// Not JSON at all (prose, truncated output, …).
    InvalidJson { detail: String },
    /// Valid JSON that no shape matcher accepts (string, number, object without lists).
    UnrecognizedShape { kind: String },
}

/// A successfully normalized response.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub shape: ShapeKind,
    pub entries: Vec<TocEntry>,
}

/// Parse and normalize one raw response, reporting why it failed if it did.
pub fn parse_response(raw: &str) -> Result<Normalized, Malformed> {
    let cleaned = strip_code_fences(&remove_invisible_chars(raw));
    let text = cleaned.trim();
    if text.is_empty() {
        return Err(Malformed::Empty);
    }

    let value: Value = serde_json::from_str(text).map_err(|e| Malformed::InvalidJson {
        detail: e.to_string(),
    })?;

    let shape = match_shape(&value).ok_or_else(|| Malformed::UnrecognizedShape {
        kind: describe_json(&value),
    })?;

    let items = shape.items();
    let entries: Vec<TocEntry> = items.iter().filter_map(coerce_entry).collect();
    if entries.len() < items.len() {
        debug!(
            "Dropped {} non-object element(s) from {:?} response",
            items.len() - entries.len(),
            shape.kind()
        );
    }

    Ok(Normalized {
        shape: shape.kind(),
        entries,
    })
}

/// Normalize one raw response, degrading every failure to an empty list.
///
/// `page_num` is used only for diagnostics.
pub fn normalize_response(raw: &str, page_num: usize) -> Vec<TocEntry> {
    match parse_response(raw) {
        Ok(normalized) => {
            debug!(
                "Page {}: {:?} response → {} entries",
                page_num,
                normalized.shape,
                normalized.entries.len()
            );
            normalized.entries
        }
        Err(Malformed::Empty) => {
            warn!("Page {}: empty response from vision model", page_num);
            Vec::new()
        }
        Err(Malformed::InvalidJson { detail }) => {
            warn!(
                "Page {}: response is not JSON ({} chars, starts {:?}): {}",
                page_num,
                raw.chars().count(),
                preview(raw),
                detail
            );
            Vec::new()
        }
        Err(Malformed::UnrecognizedShape { kind }) => {
            warn!("Page {}: unexpected JSON structure: {}", page_num, kind);
            Vec::new()
        }
    }
}

// ── Element coercion ─────────────────────────────────────────────────────

fn coerce_entry(item: &Value) -> Option<TocEntry> {
    let obj = item.as_object()?;
    let title = obj.get("title").map(coerce_title).unwrap_or_default();
    let page = obj.get("page").and_then(coerce_int).unwrap_or(1);
    let level = obj.get("level").and_then(coerce_int).unwrap_or(1);
    Some(TocEntry { title, page, level })
}

fn coerce_title(value: &Value) -> String {
    match value {
        Value::String(s) => remove_invisible_chars(s)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return Some(n);
            }
            let bare = s.trim_matches(|c: char| !c.is_alphanumeric());
            parse_roman(bare).or_else(|| {
                RE_DIGITS
                    .find(s)
                    .and_then(|m| m.as_str().parse::<i64>().ok())
            })
        }
        _ => None,
    }
}

/// Parse a roman numeral (either case). Non-canonical forms like "iiii" are accepted.
pub fn parse_roman(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    let digits: Vec<i64> = s
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            'i' => Some(1),
            'v' => Some(5),
            'x' => Some(10),
            'l' => Some(50),
            'c' => Some(100),
            'd' => Some(500),
            'm' => Some(1000),
            _ => None,
        })
        .collect::<Option<_>>()?;

    let mut total = 0;
    for (i, &d) in digits.iter().enumerate() {
        match digits.get(i + 1) {
            Some(&next) if next > d => total -= d,
            _ => total += d,
        }
    }
    (total > 0).then_some(total)
}

// ── Text cleanup ─────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

/// Remove a ```` ```json ```` wrapper the prompt asked the model not to add.
fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

fn describe_json(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "boolean".into(),
        Value::Number(_) => "number".into(),
        Value::String(s) => format!("string ({} chars)", s.chars().count()),
        Value::Array(_) => "array".into(),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).take(8).collect();
            format!("object without list members, keys {keys:?}")
        }
    }
}

fn preview(raw: &str) -> String {
    raw.trim().chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(entries: &[TocEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn three_shapes_yield_identical_entries() {
        let bare = r#"[{"title":"Intro","page":5,"level":1},{"title":"Scope","page":6,"level":2}]"#;
        let keyed = format!(r#"{{"toc":{bare}}}"#);
        let unknown = format!(r#"{{"chapters":{bare}}}"#);

        let a = parse_response(bare).unwrap();
        let b = parse_response(&keyed).unwrap();
        let c = parse_response(&unknown).unwrap();

        assert_eq!(a.shape, ShapeKind::BareArray);
        assert_eq!(b.shape, ShapeKind::NamedKey);
        assert_eq!(c.shape, ShapeKind::FallbackList);
        assert_eq!(a.entries, b.entries);
        assert_eq!(b.entries, c.entries);
        assert_eq!(a.entries[1], TocEntry::new("Scope", 6, 2));
    }

    #[test]
    fn table_of_contents_key_is_recognised() {
        let raw = r#"{"table_of_contents":[{"title":"A","page":1,"level":1}]}"#;
        let entries = normalize_response(raw, 1);
        assert_eq!(entries, vec![TocEntry::new("A", 1, 1)]);
    }

    #[test]
    fn named_key_wins_over_earlier_unknown_list() {
        let raw = r#"{"notes":[{"title":"noise"}],"entries":[{"title":"Real","page":3}]}"#;
        let n = parse_response(raw).unwrap();
        assert_eq!(n.shape, ShapeKind::NamedKey);
        assert_eq!(titles(&n.entries), ["Real"]);
    }

    #[test]
    fn named_key_order_is_fixed() {
        let raw = r#"{"sections":[{"title":"S"}],"toc":[{"title":"T"}]}"#;
        let n = parse_response(raw).unwrap();
        assert_eq!(titles(&n.entries), ["T"]);
    }

    #[test]
    fn fallback_takes_first_list_in_document_order() {
        let raw = r#"{"zeta":[{"title":"first"}],"alpha":[{"title":"second"}]}"#;
        let n = parse_response(raw).unwrap();
        assert_eq!(n.shape, ShapeKind::FallbackList);
        assert_eq!(titles(&n.entries), ["first"]);
    }

    #[test]
    fn non_list_toc_key_falls_through_to_fallback() {
        let raw = r#"{"toc":"see below","items":[{"title":"X","page":2}]}"#;
        let n = parse_response(raw).unwrap();
        assert_eq!(n.shape, ShapeKind::FallbackList);
        assert_eq!(titles(&n.entries), ["X"]);
    }

    #[test]
    fn prose_yields_nothing() {
        let raw = "Sure! Here is the table of contents you asked for: Chapter 1 ... 5";
        assert!(normalize_response(raw, 2).is_empty());
        assert!(matches!(parse_response(raw), Err(Malformed::InvalidJson { .. })));
    }

    #[test]
    fn empty_body_yields_nothing() {
        assert!(normalize_response("", 1).is_empty());
        assert_eq!(parse_response("   \n"), Err(Malformed::Empty));
    }

    #[test]
    fn object_without_lists_is_unrecognised() {
        let raw = r#"{"title":"Contents","page":3}"#;
        assert!(matches!(
            parse_response(raw),
            Err(Malformed::UnrecognizedShape { .. })
        ));
        assert!(normalize_response(raw, 1).is_empty());
    }

    #[test]
    fn scalar_json_is_unrecognised() {
        assert!(normalize_response("42", 1).is_empty());
        assert!(normalize_response(r#""[]""#, 1).is_empty());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let raw = r#"[{"title":"No page"},{"page":9},{}]"#;
        let entries = normalize_response(raw, 1);
        assert_eq!(
            entries,
            vec![
                TocEntry::new("No page", 1, 1),
                TocEntry::new("", 9, 1),
                TocEntry::new("", 1, 1),
            ]
        );
    }

    #[test]
    fn level_passes_through_unmodified() {
        let entries = normalize_response(r#"[{"title":"Deep","page":4,"level":5}]"#, 1);
        assert_eq!(entries[0].level, 5);
    }

    #[test]
    fn out_of_range_pages_are_not_clamped_here() {
        let entries = normalize_response(r#"[{"title":"Far","page":500},{"title":"Neg","page":-3}]"#, 1);
        assert_eq!(entries[0].page, 500);
        assert_eq!(entries[1].page, -3);
    }

    #[test]
    fn non_object_elements_are_skipped() {
        let entries = normalize_response(r#"["stray", {"title":"Kept","page":2}, 7, null]"#, 1);
        assert_eq!(entries, vec![TocEntry::new("Kept", 2, 1)]);
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = "```json\n[{\"title\":\"Fenced\",\"page\":3,\"level\":1}]\n```";
        assert_eq!(normalize_response(raw, 1), vec![TocEntry::new("Fenced", 3, 1)]);
    }

    #[test]
    fn bom_prefixed_json_is_accepted() {
        let raw = "\u{FEFF}[{\"title\":\"Bom\",\"page\":1}]";
        assert_eq!(normalize_response(raw, 1).len(), 1);
    }

    #[test]
    fn string_page_numbers_are_parsed() {
        let raw = r#"[
            {"title":"Plain","page":"12"},
            {"title":"Roman","page":"xiv"},
            {"title":"Decorated","page":"p. 7"},
            {"title":"Bracketed","page":"[ix]"},
            {"title":"Float","page":15.0},
            {"title":"Junk","page":"n/a"},
            {"title":"Null","page":null}
        ]"#;
        let pages: Vec<i64> = normalize_response(raw, 1).iter().map(|e| e.page).collect();
        assert_eq!(pages, [12, 14, 7, 9, 15, 1, 1]);
    }

    #[test]
    fn string_levels_are_parsed() {
        let entries = normalize_response(r#"[{"title":"S","page":2,"level":"2"}]"#, 1);
        assert_eq!(entries[0].level, 2);
    }

    #[test]
    fn titles_are_whitespace_normalised() {
        let entries = normalize_response(
            "[{\"title\":\"  Chapter 1:\\n  The  Beginning \\u200b\",\"page\":1}]",
            1,
        );
        assert_eq!(entries[0].title, "Chapter 1: The Beginning");
    }

    #[test]
    fn numeric_title_is_stringified() {
        let entries = normalize_response(r#"[{"title":1984,"page":3}]"#, 1);
        assert_eq!(entries[0].title, "1984");
    }

    #[test]
    fn roman_numerals() {
        assert_eq!(parse_roman("iv"), Some(4));
        assert_eq!(parse_roman("XII"), Some(12));
        assert_eq!(parse_roman("mcmxcix"), Some(1999));
        assert_eq!(parse_roman(""), None);
        assert_eq!(parse_roman("12"), None);
        assert_eq!(parse_roman("page"), None);
    }

    #[test]
    fn match_shape_reports_keys() {
        let value: Value = serde_json::from_str(r#"{"entries":[{"title":"E"}]}"#).unwrap();
        match match_shape(&value) {
            Some(ResponseShape::NamedKey { key, items }) => {
                assert_eq!(key, "entries");
                assert_eq!(items.len(), 1);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }
}
