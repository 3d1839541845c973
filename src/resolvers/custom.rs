//! Execution of validated custom resolvers against the network.

use scraper::Html;
use serde_json::Value;

use super::extract;
use super::spec::{ExtractionMode, ResolverSpec};
use super::ResolverError;
use crate::models::ResolvedCandidate;
use crate::utils::HttpClient;

/// A validated resolver bound to a concrete DOI: the `{doi}` placeholder in
/// the URL template has already been substituted.
#[derive(Debug, Clone)]
pub struct CompiledResolver {
    spec: ResolverSpec,
    url: String,
}

impl CompiledResolver {
    pub(super) fn new(spec: ResolverSpec, url: String) -> Self {
        Self { spec, url }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the resolver endpoint and extract candidates per its mode.
    pub async fn resolve(&self, http: &HttpClient) -> Result<Vec<ResolvedCandidate>, ResolverError> {
        tracing::debug!(resolver = %self.spec.name, url = %self.url, "looking for PDFs");

        let accept = match self.spec.mode {
            ExtractionMode::JsonQuery { .. } => "application/json",
            _ => "text/html",
        };

        let response = http
            .request(self.spec.method.clone(), &self.url)
            .header(reqwest::header::ACCEPT, accept)
            .timeout(self.spec.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolverError::Status(status));
        }

        match &self.spec.mode {
            // Requesting the URL is itself presumed to serve the document;
            // the body is not interpreted.
            ExtractionMode::Direct => Ok(vec![ResolvedCandidate::direct(
                self.url.clone(),
                self.spec.name.clone(),
            )]),
            ExtractionMode::HtmlScrape {
                selector,
                attribute,
                index,
            } => {
                let body = response.text().await.map_err(|err| {
                    ResolverError::Parse(format!("failed to read HTML body: {err}"))
                })?;
                // Parse and extract before any further await: Html is not
                // Send and must not live across a suspension point.
                let document = Html::parse_document(&body);
                Ok(extract::from_html(
                    &document,
                    selector,
                    attribute.as_deref(),
                    *index,
                    &self.url,
                    &self.spec.name,
                ))
            }
            ExtractionMode::JsonQuery { path, mappings } => {
                let body: Value = response.json().await.map_err(|err| {
                    ResolverError::Parse(format!("failed to parse JSON body: {err}"))
                })?;
                Ok(extract::from_json(
                    &body,
                    path,
                    mappings.as_ref(),
                    &self.url,
                    &self.spec.name,
                ))
            }
        }
    }
}
