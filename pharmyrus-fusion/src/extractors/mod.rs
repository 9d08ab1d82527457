//! Field Extraction
//!
//! Turns one raw upstream payload into a `PatentRecord`.
//!
//! # Extraction chain
//! Each text field is resolved through ordered stages; the first stage
//! yielding a non-empty value after cleanup wins:
//! 1. **Modern** - typed, language-tagged structures (registry exchange documents)
//! 2. **Legacy** - flat string fields (national office, search engine)
//! 3. **FreeText** - free-text blobs, accepted only above a minimum length
//!
//! Stages are data: a field chain is a list of `(Stage, paths)` pairs,
//! so supporting a new upstream layout means appending paths, not code.
//!
//! # Modules
//! - **shapes** - payload shape classification (`RawShape`)
//! - **text** - markup stripping, entity decoding, separator cleanup
//! - **html** - meta-tag lifting for document pages

pub mod html;
pub mod shapes;
pub mod text;

use crate::normalizer;
use crate::types::{Country, ExtractionError, PartialRecord, PatentRecord, RawPayload, RawRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use shapes::{lookup, text_of, RawShape};

/// Free-text fallbacks shorter than this are treated as noise
pub const MIN_FREE_TEXT_CHARS: usize = 40;

/// Wrapper keys that hold the actual document object
const ENVELOPE_KEYS: [&str; 3] = ["exchange-document", "patent", "result"];

/// Where in a payload a stage looks for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Modern,
    Legacy,
    FreeText,
}

type FieldChain = &'static [(Stage, &'static [&'static str])];

const TITLE_CHAIN: FieldChain = &[
    (Stage::Modern, &["bibliographic-data.invention-title", "invention-title"]),
    (Stage::Legacy, &["title", "inventionTitle", "titulo", "invention_title"]),
];

const ABSTRACT_CHAIN: FieldChain = &[
    (Stage::Modern, &["abstract", "bibliographic-data.abstract"]),
    (Stage::Legacy, &["snippet", "resumo", "summary"]),
    (
        Stage::FreeText,
        &["abstract_section", "fullText", "full_text", "description"],
    ),
];

const TITLE_ORIGINAL_PATHS: &[&str] = &["title_original", "titleOriginal", "original_title"];

const APPLICANT_CHAIN: FieldChain = &[
    (
        Stage::Modern,
        &["bibliographic-data.parties.applicants.applicant", "parties.applicants.applicant"],
    ),
    (Stage::Legacy, &["applicants", "applicant", "assignee", "titular"]),
];

const INVENTOR_CHAIN: FieldChain = &[
    (
        Stage::Modern,
        &["bibliographic-data.parties.inventors.inventor", "parties.inventors.inventor"],
    ),
    (Stage::Legacy, &["inventors", "inventor", "inventores"]),
];

const IPC_CHAIN: FieldChain = &[
    (
        Stage::Modern,
        &[
            "bibliographic-data.classifications-ipcr.classification-ipcr",
            "classifications-ipcr.classification-ipcr",
        ],
    ),
    (Stage::Legacy, &["ipc_codes", "ipcCodes", "ipc", "classifications", "classificacao"]),
];

const FILING_DATE_CHAIN: FieldChain = &[
    (Stage::Modern, &["bibliographic-data.application-reference.document-id.date"]),
    (
        Stage::Legacy,
        &["filing_date", "filingDate", "depositDate", "application_date"],
    ),
];

const PUBLICATION_DATE_CHAIN: FieldChain = &[
    (Stage::Modern, &["bibliographic-data.publication-reference.document-id.date"]),
    (
        Stage::Legacy,
        &["publication_date", "publicationDate", "publishDate"],
    ),
];

const PRIORITY_DATE_CHAIN: FieldChain = &[
    (
        Stage::Modern,
        &["bibliographic-data.priority-claims.priority-claim.document-id.date"],
    ),
    (Stage::Legacy, &["priority_date", "priorityDate"]),
];

const FAMILY_ROOT_PATHS: &[&str] = &["family_root", "familyRoot", "wo_number", "international_application"];

/// Identifier fields; `title` is last because the national office stores the number there
const NUMBER_PATHS: &[&str] = &[
    "publication_number",
    "publicationNumber",
    "patent_number",
    "patentNumber",
    "number",
    "doc_number",
    "title",
];

/// `A61K  31/4166  20060101AFI...` -> `A61K 31/4166`
static IPC_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-H]\d{2}[A-Z])\s*(\d{1,4})\s*/\s*(\d{1,6})").expect("ipc pattern is valid")
});

static IPC_SUBCLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-H]\d{2}[A-Z])\b").expect("ipc subclass pattern is valid"));

/// Office prefix and local series (`BR`, `BRPI`), digit body, kind code
static IDENTIFIER_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Z]{2}){0,2}\d{5,}[A-Z]?\d?$").expect("identifier pattern is valid"));

/// Registry party names carry a trailing residence tag (`BAYER PHARMA AG [DE]`)
static RESIDENCE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\[[A-Z]{2}\]\s*$").expect("residence pattern is valid"));

/// Turn a raw upstream hit into a validated record
pub fn extract_record(raw: &RawRecord, default_country: Country) -> Result<PatentRecord, ExtractionError> {
    let partial = extract_fields(raw)?;
    PatentRecord::from_partial(partial, default_country, raw.source.label())
}

/// Pull every recognised field out of a raw payload
///
/// # Errors
/// `Malformed` when a JSON payload is not an object or an HTML page carries
/// no metadata.
pub fn extract_fields(raw: &RawRecord) -> Result<PartialRecord, ExtractionError> {
    match &raw.payload {
        RawPayload::Json(value) => extract_from_value(value),
        RawPayload::Html(page) => {
            let lifted = html::lift_page(page)
                .ok_or_else(|| ExtractionError::Malformed("page carries no metadata".to_string()))?;
            extract_from_value(&lifted)
        }
    }
}

/// Field extraction over an already-decoded JSON document
pub fn extract_from_value(value: &Value) -> Result<PartialRecord, ExtractionError> {
    if !value.is_object() {
        return Err(ExtractionError::Malformed(format!(
            "expected an object, got {}",
            json_kind(value)
        )));
    }
    let doc = unwrap_envelope(value);

    let (title, tagged_original) = extract_title(doc);
    let title_original = tagged_original.or_else(|| first_text(doc, TITLE_ORIGINAL_PATHS));

    Ok(PartialRecord {
        number: extract_number(doc),
        title,
        title_original,
        abstract_text: resolve_text(doc, ABSTRACT_CHAIN),
        applicants: resolve_list(doc, APPLICANT_CHAIN),
        inventors: resolve_list(doc, INVENTOR_CHAIN),
        ipc_codes: resolve_list(doc, IPC_CHAIN)
            .into_iter()
            .filter_map(|code| normalize_ipc(&code))
            .collect(),
        filing_date: resolve_date(doc, FILING_DATE_CHAIN),
        publication_date: resolve_date(doc, PUBLICATION_DATE_CHAIN),
        priority_date: resolve_date(doc, PRIORITY_DATE_CHAIN),
        family_root: extract_family_root(doc),
    })
}

fn unwrap_envelope(value: &Value) -> &Value {
    let mut current = value;
    while let Some(inner) = ENVELOPE_KEYS
        .iter()
        .filter_map(|key| current.get(*key))
        .find(|inner| inner.is_object())
    {
        current = inner;
    }
    current
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Text fields
// ============================================================================

fn resolve_text(doc: &Value, chain: FieldChain) -> Option<String> {
    chain.iter().find_map(|(stage, paths)| {
        paths.iter().find_map(|path| {
            let value = lookup(doc, path)?;
            let text = text::clean_text(&RawShape::classify(value).into_text()?)?;
            match stage {
                Stage::FreeText if text.chars().count() < MIN_FREE_TEXT_CHARS => None,
                _ => Some(text),
            }
        })
    })
}

fn first_text(doc: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| lookup(doc, path).and_then(text_of).and_then(|t| text::clean_text(&t)))
}

/// Title plus the original-language title when a tagged title carries one
///
/// A title that looks like a patent number is rejected; the national
/// office stores the identifier in its `title` field.
fn extract_title(doc: &Value) -> (Option<String>, Option<String>) {
    for (_, paths) in TITLE_CHAIN {
        for path in paths.iter() {
            let Some(value) = lookup(doc, path) else {
                continue;
            };
            let shape = RawShape::classify(value);
            let original = match &shape {
                RawShape::Tagged(entries) => entries
                    .iter()
                    .find(|entry| !entry.is_preferred())
                    .and_then(|entry| text::clean_text(&entry.text)),
                _ => None,
            };
            let Some(title) = shape.into_text().and_then(|t| text::clean_text(&t)) else {
                continue;
            };
            if looks_like_number(&title) {
                continue;
            }
            let original = original.filter(|o| *o != title);
            return (Some(title), original);
        }
    }
    (None, None)
}

// ============================================================================
// Identifiers
// ============================================================================

fn extract_number(doc: &Value) -> Option<String> {
    docdb_number(doc, "bibliographic-data.publication-reference.document-id")
        .or_else(|| attribute_number(doc))
        .or_else(|| {
            NUMBER_PATHS.iter().find_map(|path| {
                lookup(doc, path)
                    .and_then(text_of)
                    .map(|t| t.trim().to_string())
                    .filter(|t| looks_like_number(t))
            })
        })
}

/// Compose `country + doc-number + kind` from a registry document-id list
fn docdb_number(doc: &Value, path: &str) -> Option<String> {
    let ids = lookup(doc, path)?;
    let candidates: Vec<&Value> = match ids {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let chosen = candidates
        .iter()
        .find(|id| id.get("@document-id-type").and_then(Value::as_str) == Some("docdb"))
        .or_else(|| candidates.first())?;

    let doc_number = chosen.get("doc-number").and_then(text_of)?;
    let country = chosen.get("country").and_then(text_of).unwrap_or_default();
    let kind = chosen.get("kind").and_then(text_of).unwrap_or_default();
    let number = if doc_number.starts_with(&country) {
        format!("{}{}", doc_number, kind)
    } else {
        format!("{}{}{}", country, doc_number, kind)
    };
    Some(number).filter(|n| looks_like_number(n))
}

/// Registry exchange documents carry the identifier as attributes
fn attribute_number(doc: &Value) -> Option<String> {
    let doc_number = doc.get("@doc-number").and_then(text_of)?;
    let country = doc.get("@country").and_then(text_of).unwrap_or_default();
    let kind = doc.get("@kind").and_then(text_of).unwrap_or_default();
    Some(format!("{}{}{}", country, doc_number, kind)).filter(|n| looks_like_number(n))
}

fn extract_family_root(doc: &Value) -> Option<String> {
    first_text(doc, FAMILY_ROOT_PATHS)
        .filter(|root| looks_like_number(root))
        .or_else(|| wo_priority_claim(doc))
}

/// International application among the priority claims
fn wo_priority_claim(doc: &Value) -> Option<String> {
    let claims = lookup(doc, "bibliographic-data.priority-claims.priority-claim")?;
    let claims: Vec<&Value> = match claims {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    claims.iter().find_map(|claim| {
        let ids = claim.get("document-id")?;
        let ids: Vec<&Value> = match ids {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        ids.iter().find_map(|id| {
            let number = id.get("doc-number").and_then(text_of)?;
            let country = id.get("country").and_then(text_of);
            let is_wo = country.as_deref() == Some("WO")
                || number.to_ascii_uppercase().starts_with("WO")
                || number.to_ascii_uppercase().starts_with("PCT");
            is_wo.then(|| number.trim().to_string())
        })
    })
}

/// True when `text` is shaped like a patent identifier rather than prose
///
/// Separators are ignored (`BR 11 2017 021636-0`); a lettered word after
/// the first token (`ODM-201 tablets 2020`) rules the text out.
pub fn looks_like_number(text: &str) -> bool {
    let prose = text
        .split_whitespace()
        .skip(1)
        .any(|word| word.chars().filter(|c| c.is_alphabetic()).count() >= 3);
    if prose {
        return false;
    }
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '/' | ':' | '.' | ','))
        .collect::<String>()
        .to_ascii_uppercase();
    IDENTIFIER_SHAPE.is_match(&compact)
}

// ============================================================================
// List fields
// ============================================================================

fn resolve_list(doc: &Value, chain: FieldChain) -> Vec<String> {
    chain
        .iter()
        .flat_map(|(_, paths)| paths.iter())
        .find_map(|path| {
            let values = list_values(lookup(doc, path)?);
            if values.is_empty() {
                None
            } else {
                Some(values)
            }
        })
        .unwrap_or_default()
}

/// Names from a list of objects, a list of strings, or one `;`-separated string
fn list_values(value: &Value) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => {
            // Registry parties come in epodoc and original spellings; keep one format
            let original: Vec<&Value> = items
                .iter()
                .filter(|item| item.get("@data-format").and_then(Value::as_str) == Some("original"))
                .collect();
            if original.is_empty() {
                items.iter().collect()
            } else {
                original
            }
        }
        other => vec![other],
    };

    items
        .into_iter()
        .flat_map(|item| match item {
            Value::String(s) => s
                .split([';', '\n'])
                .map(str::to_string)
                .collect::<Vec<_>>(),
            other => party_name(other).into_iter().collect(),
        })
        .filter_map(|name| text::clean_text(&name))
        .map(|name| RESIDENCE_TAG.replace(&name, "").trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn party_name(value: &Value) -> Option<String> {
    const NAME_KEYS: [&str; 4] = ["applicant-name", "inventor-name", "name", "text"];
    match value {
        Value::Object(map) => NAME_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(party_name)
            .or_else(|| text_of(value)),
        other => text_of(other),
    }
}

/// Canonical classification spelling, `None` for unrecognisable codes
pub fn normalize_ipc(raw: &str) -> Option<String> {
    let compact = raw.trim().to_ascii_uppercase();
    if let Some(caps) = IPC_CODE.captures(&compact) {
        return Some(format!("{} {}/{}", &caps[1], &caps[2], &caps[3]));
    }
    IPC_SUBCLASS.captures(&compact).map(|caps| caps[1].to_string())
}

// ============================================================================
// Dates
// ============================================================================

fn resolve_date(doc: &Value, chain: FieldChain) -> Option<chrono::NaiveDate> {
    chain
        .iter()
        .flat_map(|(_, paths)| paths.iter())
        .find_map(|path| lookup(doc, path).and_then(text_of).and_then(|t| normalizer::parse_record_date(&t)))
}
