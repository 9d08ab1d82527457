//! Text cleanup applied to every extracted text field
//!
//! Order matters: markup is stripped before entities are decoded so that
//! an escaped `&lt;b&gt;` survives as literal text instead of being
//! stripped a second time.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("markup pattern is valid"));

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,7});")
        .expect("entity pattern is valid")
});

/// Minimum run of one repeated punctuation character treated as a separator
const SEPARATOR_RUN: usize = 5;

/// Strip markup, decode entities, collapse whitespace, cut separator noise
///
/// Returns `None` when nothing readable remains.
pub fn clean_text(raw: &str) -> Option<String> {
    let stripped = MARKUP.replace_all(raw, " ");
    let decoded = decode_entities(&stripped);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = cut_separator_noise(&collapsed);
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Decode named and numeric character references; unknown names are kept verbatim
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "laquo" => '\u{00AB}',
        "raquo" => '\u{00BB}',
        "middot" => '\u{00B7}',
        "deg" => '\u{00B0}',
        "plusmn" => '\u{00B1}',
        "times" => '\u{00D7}',
        "micro" => '\u{00B5}',
        "copy" => '\u{00A9}',
        "reg" => '\u{00AE}',
        "trade" => '\u{2122}',
        "alpha" => '\u{03B1}',
        "beta" => '\u{03B2}',
        "gamma" => '\u{03B3}',
        "delta" => '\u{03B4}',
        "mu" => '\u{03BC}',
        "ccedil" => '\u{00E7}',
        "atilde" => '\u{00E3}',
        "otilde" => '\u{00F5}',
        "aacute" => '\u{00E1}',
        "eacute" => '\u{00E9}',
        "iacute" => '\u{00ED}',
        "oacute" => '\u{00F3}',
        "uacute" => '\u{00FA}',
        "acirc" => '\u{00E2}',
        "ecirc" => '\u{00EA}',
        "ocirc" => '\u{00F4}',
        _ => return None,
    };
    Some(c)
}

/// Truncate at the first run of repeated punctuation that follows real content
///
/// Runs with nothing readable before them (decorative headers) are dropped
/// and the scan continues after them.
fn cut_separator_noise(text: &str) -> String {
    let mut rest = text;
    loop {
        let Some((start, end)) = find_separator_run(rest) else {
            return rest.to_string();
        };
        if rest[..start].trim().is_empty() {
            rest = &rest[end..];
        } else {
            return rest[..start].trim_end().to_string();
        }
    }
}

/// Byte range of the first run of `SEPARATOR_RUN`+ identical punctuation chars
fn find_separator_run(text: &str) -> Option<(usize, usize)> {
    let mut run_char: Option<char> = None;
    let mut run_start = 0;
    let mut run_len = 0;

    for (idx, c) in text.char_indices() {
        let is_separator = !c.is_alphanumeric() && !c.is_whitespace();
        if is_separator && run_char == Some(c) {
            run_len += 1;
        } else {
            if run_len >= SEPARATOR_RUN {
                return Some((run_start, idx));
            }
            if is_separator {
                run_char = Some(c);
                run_start = idx;
                run_len = 1;
            } else {
                run_char = None;
                run_len = 0;
            }
        }
    }
    if run_len >= SEPARATOR_RUN {
        Some((run_start, text.len()))
    } else {
        None
    }
}
