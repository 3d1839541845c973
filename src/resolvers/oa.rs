//! Open-access location lookup.
//!
//! The production implementation uses the Unpaywall API for finding legal
//! open-access copies of papers. API documentation:
//! <https://unpaywall.org/api/v2>

use async_trait::async_trait;
use serde::Deserialize;

use super::ResolverError;
use crate::utils::HttpClient;

const UNPAYWALL_API_BASE: &str = "https://api.unpaywall.org/v2";

/// One open-access location for a DOI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OaLocation {
    /// Direct PDF URL, when the location hosts one
    pub url: Option<String>,
    /// Landing page URL
    pub page_url: Option<String>,
    /// Article version at this location (e.g. `publishedVersion`)
    pub version: Option<String>,
}

/// Collaborator that maps a DOI to open-access locations.
#[async_trait]
pub trait OpenAccessLookup: Send + Sync {
    async fn lookup(&self, doi: &str) -> Result<Vec<OaLocation>, ResolverError>;
}

/// Unpaywall-backed lookup.
///
/// The API is free but wants an email address (no key needed); set
/// `UNPAYWALL_EMAIL` to identify your installation.
#[derive(Debug, Clone)]
pub struct UnpaywallLookup {
    client: HttpClient,
    base_url: String,
    email: String,
}

impl UnpaywallLookup {
    pub fn new(client: HttpClient) -> Self {
        let email = std::env::var("UNPAYWALL_EMAIL")
            .ok()
            .filter(|email| !email.is_empty())
            .unwrap_or_else(|| "nexus-resolver@example.com".to_string());
        Self {
            client,
            base_url: UNPAYWALL_API_BASE.to_string(),
            email,
        }
    }

    /// Point the lookup at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl OpenAccessLookup for UnpaywallLookup {
    async fn lookup(&self, doi: &str) -> Result<Vec<OaLocation>, ResolverError> {
        let url = format!(
            "{}/{}?email={}",
            self.base_url,
            urlencoding::encode(doi),
            urlencoding::encode(&self.email)
        );

        let response = self.client.get(&url).send().await.map_err(|err| {
            ResolverError::Network(format!("failed to query Unpaywall: {err}"))
        })?;

        // An unknown DOI means no open-access copies, not a failure.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(ResolverError::Api(format!(
                "Unpaywall returned status {}",
                response.status()
            )));
        }

        let body: UnpaywallResponse = response.json().await.map_err(|err| {
            ResolverError::Parse(format!("failed to parse Unpaywall response: {err}"))
        })?;

        Ok(body
            .oa_locations
            .into_iter()
            .map(|location| OaLocation {
                url: location.url_for_pdf,
                page_url: location.url_for_landing_page,
                version: location.version,
            })
            .collect())
    }
}

/// Unpaywall API response (the slice of it we read)
#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    #[serde(default)]
    oa_locations: Vec<UnpaywallLocation>,
}

#[derive(Debug, Deserialize)]
struct UnpaywallLocation {
    url_for_pdf: Option<String>,
    url_for_landing_page: Option<String>,
    version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_maps_oa_locations() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/10\.1000%2Fxyz\?email=.+".to_string()),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"doi": "10.1000/xyz", "oa_locations": [
                    {"url_for_pdf": "http://x/doc.pdf",
                     "url_for_landing_page": "http://x/landing",
                     "version": "publishedVersion"}
                ]}"#,
            )
            .create_async()
            .await;

        let client = HttpClient::new().unwrap();
        let lookup = UnpaywallLookup::new(client).with_base_url(server.url());

        let locations = lookup.lookup("10.1000/xyz").await.unwrap();
        assert_eq!(
            locations,
            vec![OaLocation {
                url: Some("http://x/doc.pdf".to_string()),
                page_url: Some("http://x/landing".to_string()),
                version: Some("publishedVersion".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_doi_yields_no_locations() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/10\.1%2Fmissing\?email=.+".to_string()),
            )
            .with_status(404)
            .create_async()
            .await;

        let client = HttpClient::new().unwrap();
        let lookup = UnpaywallLookup::new(client).with_base_url(server.url());

        assert!(lookup.lookup("10.1/missing").await.unwrap().is_empty());
    }
}
