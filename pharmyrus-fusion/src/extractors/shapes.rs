//! Payload shape classification
//!
//! Upstream payloads deliver the same field in several encodings:
//! a plain string, a language-tagged list (`[{"@lang": "en", "p": {"$": ".."}}]`),
//! a list of text fragments, or a nested object. `RawShape` names each
//! encoding explicitly so field extraction can match on it instead of
//! probing types ad hoc.

use serde_json::{Map, Value};

/// Keys that carry the language of a tagged entry
const LANG_KEYS: [&str; 3] = ["@lang", "lang", "language"];

/// Keys that carry the text of a wrapped value, in lookup order
const TEXT_KEYS: [&str; 6] = ["$", "#text", "text", "value", "p", "content"];

/// Language preferred when a field is delivered in several languages
pub const PREFERRED_LANG: &str = "en";

/// One language-tagged text entry
#[derive(Debug, Clone, PartialEq)]
pub struct LangText {
    pub lang: Option<String>,
    pub text: String,
}

impl LangText {
    pub fn is_preferred(&self) -> bool {
        self.lang
            .as_deref()
            .is_some_and(|l| l.to_ascii_lowercase().starts_with(PREFERRED_LANG))
    }
}

/// Encoding of one payload field
#[derive(Debug, Clone, PartialEq)]
pub enum RawShape<'a> {
    Missing,
    Scalar(String),
    Tagged(Vec<LangText>),
    Fragments(Vec<String>),
    Nested(&'a Map<String, Value>),
}

impl<'a> RawShape<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Null | Value::Bool(_) => RawShape::Missing,
            Value::String(s) if s.trim().is_empty() => RawShape::Missing,
            Value::String(s) => RawShape::Scalar(s.clone()),
            Value::Number(n) => RawShape::Scalar(n.to_string()),
            Value::Object(map) => {
                if let Some(lang) = lang_of(map) {
                    match text_of(value) {
                        Some(text) => RawShape::Tagged(vec![LangText {
                            lang: Some(lang),
                            text,
                        }]),
                        None => RawShape::Missing,
                    }
                } else if let Some(text) = wrapped_text(map) {
                    RawShape::Scalar(text)
                } else {
                    RawShape::Nested(map)
                }
            }
            Value::Array(items) => {
                let tagged = items
                    .iter()
                    .any(|item| item.as_object().and_then(lang_of).is_some());
                if tagged {
                    let entries: Vec<LangText> = items
                        .iter()
                        .filter_map(|item| {
                            let text = text_of(item)?;
                            let lang = item.as_object().and_then(lang_of);
                            Some(LangText { lang, text })
                        })
                        .collect();
                    if entries.is_empty() {
                        RawShape::Missing
                    } else {
                        RawShape::Tagged(entries)
                    }
                } else {
                    let fragments: Vec<String> = items.iter().filter_map(text_of).collect();
                    if fragments.is_empty() {
                        RawShape::Missing
                    } else {
                        RawShape::Fragments(fragments)
                    }
                }
            }
        }
    }

    /// Single text value, preferring English for tagged shapes
    ///
    /// Fragments are joined with a single space. Nested objects without a
    /// recognised text key resolve to `None`.
    pub fn into_text(self) -> Option<String> {
        match self {
            RawShape::Missing | RawShape::Nested(_) => None,
            RawShape::Scalar(text) => Some(text),
            RawShape::Fragments(fragments) => Some(fragments.join(" ")),
            RawShape::Tagged(entries) => {
                let preferred = entries.iter().position(LangText::is_preferred).unwrap_or(0);
                entries.into_iter().nth(preferred).map(|e| e.text)
            }
        }
    }
}

/// Follow a dotted key path through objects
///
/// When the path crosses an array, the first element that contains the
/// next key is followed.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, key| step(current, key))
}

fn step<'a>(current: &'a Value, key: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .find_map(|map| map.get(key)),
        _ => None,
    }
}

/// Plain text carried by a value
///
/// Strings as-is, objects through their text key, arrays joined with a space.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => wrapped_text(map),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(text_of).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        _ => None,
    }
}

fn wrapped_text(map: &Map<String, Value>) -> Option<String> {
    TEXT_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(text_of)
}

fn lang_of(map: &Map<String, Value>) -> Option<String> {
    LANG_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(|v| v.as_str().map(str::to_string))
}
