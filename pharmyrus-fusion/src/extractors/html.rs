//! Lift bibliographic data out of a full-text document page
//!
//! Document pages publish their metadata as Dublin Core / citation meta
//! tags plus classification spans. Lifting turns the page into a flat JSON
//! object using the legacy field names, so the same extraction chain
//! handles JSON and HTML payloads.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static META_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<meta\s+([^>]*?)/?>").expect("meta pattern is valid"));

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)([a-z][a-z0-9_.:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});

static CLASSIFICATION_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)itemprop="Code"[^>]*>\s*([A-H][0-9]{2}[A-Z]\s*[0-9]{1,4}\s*/\s*[0-9]{1,6})\s*<"#)
        .expect("classification pattern is valid")
});

static ABSTRACT_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div[^>]*class="abstract"[^>]*>(.*?)</div>"#)
        .expect("abstract pattern is valid")
});

/// Convert a document page into a JSON object of legacy field names
///
/// Returns `None` when the page carries no recognisable metadata at all.
pub fn lift_page(html: &str) -> Option<Value> {
    let mut fields = Map::new();
    let mut applicants = Vec::new();
    let mut inventors = Vec::new();

    for tag in META_TAG.captures_iter(html) {
        let attrs = parse_attributes(&tag[1]);
        let (Some(name), Some(content)) = (attr(&attrs, "name"), attr(&attrs, "content")) else {
            continue;
        };
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        let scheme = attr(&attrs, "scheme").unwrap_or_default();

        match name {
            "DC.title" => insert_once(&mut fields, "title", content),
            "DC.description" | "description" => insert_once(&mut fields, "abstract", content),
            "citation_patent_number" | "citation_patent_publication_number" => {
                insert_once(&mut fields, "publication_number", content)
            }
            "DC.contributor" if scheme.eq_ignore_ascii_case("inventor") => {
                inventors.push(Value::String(content.to_string()))
            }
            "DC.contributor" if scheme.eq_ignore_ascii_case("assignee") => {
                applicants.push(Value::String(content.to_string()))
            }
            "DC.date" if scheme.eq_ignore_ascii_case("dateSubmitted") => {
                insert_once(&mut fields, "filing_date", content)
            }
            "DC.date" if scheme.eq_ignore_ascii_case("issued") => {
                insert_once(&mut fields, "publication_date", content)
            }
            "citation_publication_date" => insert_once(&mut fields, "publication_date", content),
            _ => {}
        }
    }

    if !applicants.is_empty() {
        fields.insert("applicants".to_string(), Value::Array(applicants));
    }
    if !inventors.is_empty() {
        fields.insert("inventors".to_string(), Value::Array(inventors));
    }

    let codes: Vec<Value> = CLASSIFICATION_CODE
        .captures_iter(html)
        .map(|caps| Value::String(caps[1].to_string()))
        .collect();
    if !codes.is_empty() {
        fields.insert("ipc_codes".to_string(), Value::Array(codes));
    }

    if let Some(section) = ABSTRACT_SECTION.captures(html) {
        insert_once(&mut fields, "abstract_section", &section[1]);
    }

    if fields.is_empty() {
        None
    } else {
        Some(Value::Object(fields))
    }
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), value.to_string())
        })
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn insert_once(fields: &mut Map<String, Value>, key: &str, value: &str) {
    fields
        .entry(key.to_string())
        .or_insert_with(|| Value::String(value.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head>
        <meta name="DC.title" content="Crystalline form of darolutamide &amp; salts">
        <meta name="DC.description" content="The invention relates to a crystalline form.">
        <meta name="citation_patent_number" content="BR:112017027822:A2">
        <meta name="DC.contributor" content="Anna Schmidt" scheme="inventor">
        <meta name="DC.contributor" content="Orion Corporation" scheme="assignee">
        <meta name="DC.date" content="2016-06-15" scheme="dateSubmitted">
        </head><body>
        <span itemprop="Code">A61K31/4166</span>
        <span itemprop="Code">A61P</span>
        </body></html>
    "#;

    #[test]
    fn test_lifts_meta_tags() {
        let lifted = lift_page(PAGE).unwrap();
        assert_eq!(lifted["title"], "Crystalline form of darolutamide &amp; salts");
        assert_eq!(lifted["publication_number"], "BR:112017027822:A2");
        assert_eq!(lifted["inventors"][0], "Anna Schmidt");
        assert_eq!(lifted["applicants"][0], "Orion Corporation");
        assert_eq!(lifted["filing_date"], "2016-06-15");
    }

    #[test]
    fn test_lifts_only_full_classification_codes() {
        let lifted = lift_page(PAGE).unwrap();
        let codes = lifted["ipc_codes"].as_array().unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0], "A61K31/4166");
    }

    #[test]
    fn test_page_without_metadata() {
        assert!(lift_page("<html><body>Not found</body></html>").is_none());
    }
}
