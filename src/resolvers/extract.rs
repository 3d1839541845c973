//! Candidate extraction from HTML and JSON response bodies.

use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use super::jsonquery::PathQuery;
use super::spec::JsonMappings;
use crate::models::ResolvedCandidate;

/// Pull a candidate out of a scraped HTML document.
///
/// `index` picks that ordinal among all selector matches; without it the
/// first match is used. The value comes from `attribute` when given, from
/// the element's text otherwise. No match or an empty value yields no
/// candidates.
pub fn from_html(
    document: &Html,
    selector: &Selector,
    attribute: Option<&str>,
    index: Option<usize>,
    request_url: &str,
    access_method: &str,
) -> Vec<ResolvedCandidate> {
    let element = match document.select(selector).nth(index.unwrap_or(0)) {
        Some(element) => element,
        None => return Vec::new(),
    };

    let value = match attribute {
        Some(attribute) => element.value().attr(attribute).map(str::to_string),
        None => Some(element.text().collect::<String>()),
    };
    let value = match value {
        Some(value) if !value.is_empty() => value,
        _ => return Vec::new(),
    };

    vec![ResolvedCandidate {
        url: Some(resolve_reference(&value, request_url)),
        referrer: Some(request_url.to_string()),
        access_method: access_method.to_string(),
        ..Default::default()
    }]
}

/// Resolve a possibly-relative reference against the request URL. An
/// absolute reference passes through unchanged.
fn resolve_reference(value: &str, base: &str) -> String {
    match Url::parse(base).and_then(|base| base.join(value)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => value.to_string(),
    }
}

/// Apply a path query to a JSON body and shape the matches into candidates.
///
/// With mappings, only object nodes contribute, each mapped field populated
/// from the node when the source value is a non-empty string; an object
/// matching neither mapping still produces an (unactionable) candidate.
/// Without mappings, string nodes become direct-URL candidates.
pub fn from_json(
    body: &Value,
    path: &PathQuery,
    mappings: Option<&JsonMappings>,
    request_url: &str,
    access_method: &str,
) -> Vec<ResolvedCandidate> {
    let matches = path.select(body);

    let mut candidates: Vec<ResolvedCandidate> = match mappings {
        Some(mappings) => matches
            .into_iter()
            .filter_map(Value::as_object)
            .map(|object| {
                let mut candidate = ResolvedCandidate::default();
                if let Some(source) = &mappings.url {
                    candidate.url = string_field(object, source);
                }
                if let Some(source) = &mappings.page_url {
                    candidate.page_url = string_field(object, source);
                }
                candidate
            })
            .collect(),
        None => matches
            .into_iter()
            .filter_map(Value::as_str)
            .map(|url| ResolvedCandidate {
                url: Some(url.to_string()),
                ..Default::default()
            })
            .collect(),
    };

    for candidate in &mut candidates {
        candidate.access_method = access_method.to_string();
        candidate.referrer = Some(request_url.to_string());
    }
    candidates
}

fn string_field(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE_URL: &str = "https://sci-hub.ru/10.1037/a0023781";

    fn select(selector: &str) -> Selector {
        Selector::parse(selector).unwrap()
    }

    #[test]
    fn test_html_attribute_extraction() {
        let document = Html::parse_document(
            r#"<html><body><embed id="pdf" src="http://x/doc.pdf"></body></html>"#,
        );
        let candidates = from_html(
            &document,
            &select("#pdf"),
            Some("src"),
            None,
            PAGE_URL,
            "Sci-Hub",
        );

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url.as_deref(), Some("http://x/doc.pdf"));
        assert_eq!(candidates[0].referrer.as_deref(), Some(PAGE_URL));
        assert_eq!(candidates[0].access_method, "Sci-Hub");
    }

    #[test]
    fn test_html_text_extraction() {
        let document = Html::parse_document(
            r#"<html><body><a class="link">http://x/text.pdf</a></body></html>"#,
        );
        let candidates = from_html(&document, &select("a.link"), None, None, PAGE_URL, "r");
        assert_eq!(candidates[0].url.as_deref(), Some("http://x/text.pdf"));
    }

    #[test]
    fn test_html_index_selects_ordinal_match() {
        let document = Html::parse_document(
            r#"<html><body>
                <iframe class="pdf" src="http://x/first.pdf"></iframe>
                <iframe class="pdf" src="http://x/second.pdf"></iframe>
            </body></html>"#,
        );
        let candidates = from_html(
            &document,
            &select("iframe.pdf"),
            Some("src"),
            Some(1),
            PAGE_URL,
            "r",
        );
        assert_eq!(candidates[0].url.as_deref(), Some("http://x/second.pdf"));
    }

    #[test]
    fn test_html_relative_reference_resolved_against_request_url() {
        let document = Html::parse_document(
            r#"<html><body><iframe id="pdf" src="/downloads/doc.pdf"></iframe></body></html>"#,
        );
        let candidates = from_html(&document, &select("#pdf"), Some("src"), None, PAGE_URL, "r");
        assert_eq!(
            candidates[0].url.as_deref(),
            Some("https://sci-hub.ru/downloads/doc.pdf")
        );
    }

    #[test]
    fn test_html_no_match_or_empty_value_yields_nothing() {
        let document =
            Html::parse_document(r#"<html><body><p>Captcha is required</p></body></html>"#);
        assert!(from_html(&document, &select("#pdf"), Some("src"), None, PAGE_URL, "r").is_empty());

        let empty_attr =
            Html::parse_document(r#"<html><body><embed id="pdf" src=""></body></html>"#);
        assert!(from_html(&empty_attr, &select("#pdf"), Some("src"), None, PAGE_URL, "r").is_empty());
    }

    #[test]
    fn test_json_mapping_round_trip() {
        let body = json!([{"link": "http://x/doc.pdf"}]);
        let path = PathQuery::parse("$[*]").unwrap();
        let mappings = JsonMappings {
            url: Some("link".to_string()),
            page_url: None,
        };

        let candidates = from_json(&body, &path, Some(&mappings), PAGE_URL, "API");
        assert_eq!(
            candidates,
            vec![ResolvedCandidate {
                url: Some("http://x/doc.pdf".to_string()),
                access_method: "API".to_string(),
                referrer: Some(PAGE_URL.to_string()),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn test_json_mapping_skips_non_objects_and_absent_sources() {
        let body = json!([{"link": "http://x/doc.pdf"}, "bare string", {"other": 1}]);
        let path = PathQuery::parse("$[*]").unwrap();
        let mappings = JsonMappings {
            url: Some("link".to_string()),
            page_url: Some("landing".to_string()),
        };

        let candidates = from_json(&body, &path, Some(&mappings), PAGE_URL, "API");
        // The bare string is dropped; the mapped-to-nothing object survives
        // as an unactionable candidate.
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].is_actionable());
        assert!(!candidates[1].is_actionable());
    }

    #[test]
    fn test_json_without_mappings_keeps_string_matches() {
        let body = json!({"urls": ["http://x/1.pdf", 42, "http://x/2.pdf"]});
        let path = PathQuery::parse("$.urls[*]").unwrap();

        let candidates = from_json(&body, &path, None, PAGE_URL, "API");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url.as_deref(), Some("http://x/1.pdf"));
        assert_eq!(candidates[1].url.as_deref(), Some("http://x/2.pdf"));
        assert_eq!(candidates[1].referrer.as_deref(), Some(PAGE_URL));
    }
}
