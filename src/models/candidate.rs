//! Candidate model representing a resolved document location.

use serde::{Deserialize, Serialize};

/// Access method label for the built-in DOI redirect unit
pub const METHOD_DOI: &str = "doi";

/// Access method label for the built-in stored-URL unit
pub const METHOD_URL: &str = "url";

/// Access method label for the open-access lookup unit
pub const METHOD_OA: &str = "oa";

/// A resolved, potentially fetchable document location plus provenance.
///
/// Candidates are produced by resolver units and handed to the attach
/// collaborator. A candidate is *actionable* when it carries a non-empty
/// direct `url` or landing `page_url`; anything else is discarded by the
/// chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCandidate {
    /// Direct document URL, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Landing page URL when no direct link is known
    #[serde(
        default,
        rename = "pageURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub page_url: Option<String>,

    /// Strategy that produced this candidate: `doi`, `url`, `oa`, or a
    /// custom resolver's name
    #[serde(default, rename = "accessMethod")]
    pub access_method: String,

    /// Article version reported by the open-access lookup
    #[serde(
        default,
        rename = "articleVersion",
        skip_serializing_if = "Option::is_none"
    )]
    pub article_version: Option<String>,

    /// Referrer to send when fetching the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

impl ResolvedCandidate {
    /// Candidate pointing at a landing page only.
    pub fn page(page_url: impl Into<String>, access_method: impl Into<String>) -> Self {
        Self {
            page_url: Some(page_url.into()),
            access_method: access_method.into(),
            ..Self::default()
        }
    }

    /// Candidate with a direct document URL, sent with itself as referrer.
    pub fn direct(url: impl Into<String>, access_method: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            referrer: Some(url.clone()),
            url: Some(url),
            access_method: access_method.into(),
            ..Self::default()
        }
    }

    /// Whether this candidate is eligible for the attach step.
    pub fn is_actionable(&self) -> bool {
        filled(&self.url) || filled(&self.page_url)
    }

    /// Best URL to fetch: the direct link when present, the landing page
    /// otherwise.
    pub fn target(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.page_url.as_deref().filter(|u| !u.is_empty()))
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actionable_requires_a_url() {
        let empty = ResolvedCandidate {
            access_method: "custom".to_string(),
            ..Default::default()
        };
        assert!(!empty.is_actionable());

        let blank = ResolvedCandidate {
            url: Some(String::new()),
            access_method: "custom".to_string(),
            ..Default::default()
        };
        assert!(!blank.is_actionable());

        assert!(ResolvedCandidate::direct("http://x/doc.pdf", "custom").is_actionable());
        assert!(ResolvedCandidate::page("https://doi.org/10.1/x", "doi").is_actionable());
    }

    #[test]
    fn test_target_prefers_direct_url() {
        let candidate = ResolvedCandidate {
            url: Some("http://x/doc.pdf".to_string()),
            page_url: Some("http://x/landing".to_string()),
            access_method: "oa".to_string(),
            ..Default::default()
        };
        assert_eq!(candidate.target(), Some("http://x/doc.pdf"));

        let landing_only = ResolvedCandidate::page("http://x/landing", "url");
        assert_eq!(landing_only.target(), Some("http://x/landing"));
    }

    #[test]
    fn test_wire_field_names() {
        let candidate = ResolvedCandidate {
            page_url: Some("https://doi.org/10.1000/abc".to_string()),
            access_method: "doi".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["pageURL"], "https://doi.org/10.1000/abc");
        assert_eq!(json["accessMethod"], "doi");
        assert!(json.get("url").is_none());
    }
}
