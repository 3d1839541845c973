//! DOI extraction and cleaning.
//!
//! A record can carry its DOI in three places: the structured `DOI` field,
//! a `DOI: <value>` line in the free-text `extra` field (books imported from
//! some translators end up like this), or a stored `doi.org` URL when the
//! record was added from a DOI link. Extraction tries them in that order.

use regex::Regex;

use crate::models::Record;

/// Registrant/suffix shape of a modern DOI. The final character class keeps
/// trailing sentence punctuation out of the match.
const DOI_PATTERN: &str = r"10\.\d{4,9}/\S*[^\s.,;]";

/// Strip vendor prefixes and surrounding noise from a DOI-ish string.
///
/// Accepts values like `doi:10.1000/abc`, `https://doi.org/10.1000/abc` or
/// whitespace-padded DOIs and returns the bare `10.<registrant>/<suffix>`
/// token, or `None` when the value does not contain one.
pub fn clean_doi(raw: &str) -> Option<String> {
    let re = Regex::new(DOI_PATTERN).ok()?;
    re.find(raw).map(|found| found.as_str().to_string())
}

/// Derive a normalized DOI from a record. First non-empty source wins:
/// structured field, then extra-notes line, then stored `doi.org` URL.
///
/// Pure: no network, no side effects. `None` is a valid terminal state.
pub fn extract(record: &dyn Record) -> Option<String> {
    if let Some(doi) = record.field("DOI").and_then(normalized) {
        return Some(doi);
    }
    if let Some(doi) = record.extra_field("DOI").and_then(normalized) {
        return Some(doi);
    }
    from_stored_url(record)
}

/// Trim, then clean; a value that does not match the DOI shape is kept
/// verbatim rather than dropped, matching how sloppy registrant strings are
/// handled upstream.
fn normalized(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(clean_doi(trimmed).unwrap_or_else(|| trimmed.to_string()))
}

/// DOI recovery for records added via a `doi.org` link: the URL path,
/// percent-decoded, without its leading slash.
fn from_stored_url(record: &dyn Record) -> Option<String> {
    let stored = record.field("url")?;
    let parsed = url::Url::parse(stored.trim()).ok()?;
    let host = parsed.host_str()?;
    if !host.to_ascii_lowercase().contains("doi.org") {
        return None;
    }

    let decoded = urlencoding::decode(parsed.path()).ok()?;
    let doi = decoded.strip_prefix('/').unwrap_or(&decoded).to_string();
    if doi.trim().is_empty() {
        return None;
    }
    Some(doi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemoryRecord;

    #[test]
    fn test_structured_field_wins() {
        let record = MemoryRecord::new()
            .with_field("DOI", " 10.1037/a0023781 ")
            .with_field("extra", "DOI: 10.9999/from-extra")
            .with_field("url", "https://doi.org/10.9999/from-url");
        assert_eq!(extract(&record), Some("10.1037/a0023781".to_string()));
    }

    #[test]
    fn test_extra_line_used_when_field_missing() {
        let record = MemoryRecord::new()
            .with_field("extra", "Publisher: APA\nDOI: 10.1029/2018JA025877");
        assert_eq!(extract(&record), Some("10.1029/2018JA025877".to_string()));
    }

    #[test]
    fn test_doi_org_url_path_is_decoded() {
        let record =
            MemoryRecord::new().with_field("url", "https://doi.org/10.1000%2Fabc");
        assert_eq!(extract(&record), Some("10.1000/abc".to_string()));

        let plain = MemoryRecord::new().with_field("url", "https://doi.org/10.1000/abc");
        assert_eq!(extract(&plain), Some("10.1000/abc".to_string()));
    }

    #[test]
    fn test_doi_org_host_match_is_case_insensitive() {
        let record =
            MemoryRecord::new().with_field("url", "https://DX.DOI.ORG/10.1080/00224490902775827");
        assert_eq!(
            extract(&record),
            Some("10.1080/00224490902775827".to_string())
        );
    }

    #[test]
    fn test_non_doi_url_is_ignored() {
        let record =
            MemoryRecord::new().with_field("url", "https://example.com/10.1000/abc");
        assert_eq!(extract(&record), None);
    }

    #[test]
    fn test_clean_doi_strips_vendor_prefixes() {
        assert_eq!(
            clean_doi("doi:10.1037/a0023781"),
            Some("10.1037/a0023781".to_string())
        );
        assert_eq!(
            clean_doi("https://doi.org/10.1037/a0023781"),
            Some("10.1037/a0023781".to_string())
        );
        assert_eq!(
            clean_doi("10.1016/S0167-2789(99)00082-5."),
            Some("10.1016/S0167-2789(99)00082-5".to_string())
        );
        assert_eq!(clean_doi("not a doi"), None);
    }

    #[test]
    fn test_empty_record_has_no_identifier() {
        assert_eq!(extract(&MemoryRecord::new()), None);

        let blank = MemoryRecord::new().with_field("DOI", "   ");
        assert_eq!(extract(&blank), None);
    }
}
