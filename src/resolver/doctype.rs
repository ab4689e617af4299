/// Friendly document-type names
///
/// Document identifiers are long URN strings; display names come from an
/// external code-list lookup when available, otherwise from the UBL or
/// CII identifier structure, otherwise from the identifier tail.
use regex::Regex;
use std::sync::LazyLock;

/// UBL shape: `xsd:NAME-N::DOC##CUSTOMIZATION` renders as `DOC`
static UBL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"xsd:[A-Za-z0-9]+-\d+::([A-Za-z0-9]+)##").expect("static pattern compiles"));

/// CII shape: `standard:NAME:N::` renders as `NAME`
static CII_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"standard:([A-Za-z0-9]+):\d+::").expect("static pattern compiles"));

/// External code-list lookup keyed on the full document-type value
///
/// The Peppol code-list data file lives outside this crate; front-ends
/// plug their copy in through this trait.
pub trait DocTypeLookup: Send + Sync {
    fn display_name(&self, doc_type: &str) -> Option<String>;
}

/// Lookup that knows no code list; structural naming still applies
pub struct NoCodeList;

impl DocTypeLookup for NoCodeList {
    fn display_name(&self, _doc_type: &str) -> Option<String> {
        None
    }
}

/// Compute the display name for a document-type identifier
pub fn friendly_doc_type_name(lookup: &dyn DocTypeLookup, doc_type: &str) -> String {
    if let Some(name) = lookup.display_name(doc_type) {
        return name;
    }
    if let Some(caps) = UBL_PATTERN.captures(doc_type) {
        return caps[1].to_string();
    }
    if let Some(caps) = CII_PATTERN.captures(doc_type) {
        return caps[1].to_string();
    }
    match doc_type.rsplit_once("::") {
        Some((_, tail)) if !tail.is_empty() => tail.to_string(),
        _ => doc_type.to_string(),
    }
}

/// Extract the document-type identifier named by a
/// ServiceMetadataReference href: the percent-decoded path segment after
/// `/services/`
pub(crate) fn doc_type_from_href(href: &str) -> Option<String> {
    let idx = href.find("/services/")?;
    let encoded = &href[idx + "/services/".len()..];
    let encoded = encoded.split(['?', '#']).next().unwrap_or(encoded);
    let decoded = urlencoding::decode(encoded).ok()?;
    let decoded = decoded.trim_end_matches('/');
    if decoded.is_empty() {
        None
    } else {
        Some(decoded.to_string())
    }
}
