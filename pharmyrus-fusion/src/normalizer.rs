//! Patent identifier and date normalisation
//!
//! `normalize` produces the merge key for a record: the same patent spelled
//! differently by two sources ("BR 11 2017 021636", "br112017021636") must
//! normalise to the same key. It is idempotent.

use crate::types::Country;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Trailing check digit used by the national office ("... 021636-0")
static CHECK_DIGIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*\d{6})\s*-\s*\d$").expect("check digit pattern is valid")
});

/// Trailing publication kind code ("A2", "B1", "U")
static KIND_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]{2}\d{5,})[A-Z]\d?$").expect("kind code pattern is valid"));

/// Normalise a patent identifier into its merge key
///
/// Removes whitespace, `-` and `/`, uppercases, and prefixes
/// `default_country` when the identifier does not already start with a
/// supported country code. Empty input stays empty.
pub fn normalize(raw: &str, default_country: Country) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '/')
        .collect::<String>()
        .to_uppercase();

    if cleaned.is_empty() || Country::from_prefix(&cleaned).is_some() {
        cleaned
    } else {
        format!("{}{}", default_country, cleaned)
    }
}

/// Normalise an identifier as found in an upstream payload
///
/// Payload identifiers may carry a check digit or a kind code that the
/// other sources omit; both are dropped before `normalize` so that every
/// spelling of one document shares a key.
pub fn canonical_number(raw: &str, default_country: Country) -> String {
    let trimmed = raw.trim().replace(':', "");
    let without_check = match CHECK_DIGIT.captures(&trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed,
    };
    let normalized = normalize(&without_check, default_country);
    match KIND_CODE.captures(&normalized) {
        Some(caps) => caps[1].to_string(),
        None => normalized,
    }
}

/// Two-letter series the national office uses in place of a country code
const LOCAL_SERIES: [&str; 4] = ["PI", "MU", "PP", "CI"];

/// Office prefix of a raw identifier when it names an unsupported office
///
/// `normalize` would silently prefix the default country onto such an
/// identifier, so extraction checks this first.
pub fn unsupported_prefix(raw: &str) -> Option<String> {
    let head: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();
    let bytes = head.as_bytes();
    if bytes.len() < 3
        || !bytes[0].is_ascii_alphabetic()
        || !bytes[1].is_ascii_alphabetic()
        || !bytes[2].is_ascii_digit()
    {
        return None;
    }
    let prefix = &head[..2];
    if Country::from_prefix(prefix).is_some() || LOCAL_SERIES.contains(&prefix) {
        None
    } else {
        Some(prefix.to_string())
    }
}

/// Convert `YYYYMMDD` to `YYYY-MM-DD`; anything else passes through unchanged
pub fn format_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 8 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &trimmed[..4], &trimmed[4..6], &trimmed[6..])
    } else {
        raw.to_string()
    }
}

/// Parse a payload date into a calendar date
///
/// Accepts `YYYYMMDD`, `YYYY-MM-DD` (optionally followed by a time part)
/// and `DD/MM/YYYY`. Anything else, including impossible calendar dates,
/// yields `None` so that records only ever carry valid dates.
pub fn parse_record_date(raw: &str) -> Option<NaiveDate> {
    let formatted = format_date(raw);
    let text = formatted.trim();
    if text.is_empty() {
        return None;
    }

    let date_part = match text.find('T') {
        Some(idx) if idx == 10 => &text[..idx],
        _ => text,
    };

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d/%m/%Y"))
        .ok()
}
