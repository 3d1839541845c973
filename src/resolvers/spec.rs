//! Parsing and validation of custom resolver specs.
//!
//! Custom resolvers are untrusted declarative configuration: a JSON blob in
//! the preferences store describing where to send a DOI and how to pull a
//! document URL out of the response. Validation resolves the declarative
//! `mode` string into [`ExtractionMode`] exactly once; execution never
//! re-interprets configuration strings.
//!
//! Failure is always per-entry. One malformed spec is skipped with a logged
//! diagnostic and never invalidates its siblings, and an unparseable blob is
//! treated as "no custom resolvers".

use std::collections::HashMap;
use std::time::Duration;

use scraper::Selector;
use serde::Deserialize;
use serde_json::Value;

use super::custom::CompiledResolver;
use super::jsonquery::PathQuery;

/// Name of the implicit hub resolver appended to every chain build.
pub const HUB_RESOLVER_NAME: &str = "Nexus";
const HUB_RESOLVER_URL: &str = "https://hub.libstc.cc/{doi}.pdf";

const DOI_PLACEHOLDER: &str = "{doi}";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// A resolver spec as it arrives from configuration, before any checks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawResolverSpec {
    pub name: Option<String>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub mode: Option<String>,
    pub selector: Option<String>,

    // HTML
    pub attribute: Option<String>,
    pub index: Option<usize>,

    // JSON
    pub mappings: Option<HashMap<String, String>>,

    pub automatic: bool,
    pub timeout: Option<u64>,
}

/// Why a spec was rejected. The first failing check wins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("'name' not provided")]
    MissingName,

    #[error("'method' must be 'GET' or 'POST'")]
    BadMethod,

    #[error("'url' not provided")]
    MissingUrl,

    #[error("'url' must include '{{doi}}'")]
    MissingPlaceholder,

    #[error("'mode' must be 'html', 'json' or 'pdf'")]
    BadMode,

    #[error("'selector' not provided")]
    MissingSelector,

    #[error("'timeout' must be positive")]
    BadTimeout,

    #[error("invalid CSS selector: {0}")]
    BadSelector(String),

    #[error("invalid path query: {0}")]
    BadPathQuery(String),
}

/// Output-field mappings for `json` mode.
///
/// Only the two keys the candidate model understands survive validation;
/// everything else in the user's mapping table is dropped here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonMappings {
    /// Source field holding the direct document URL
    pub url: Option<String>,
    /// Source field holding the landing page URL
    pub page_url: Option<String>,
}

impl JsonMappings {
    fn from_raw(raw: &HashMap<String, String>) -> Self {
        Self {
            url: raw.get("url").cloned(),
            page_url: raw.get("pageURL").cloned(),
        }
    }
}

/// How a custom resolver turns a response into candidates, resolved from the
/// declarative `mode` string at validation time.
#[derive(Debug, Clone)]
pub enum ExtractionMode {
    /// The resolved URL itself serves the document; the body is never read.
    Direct,
    /// Scrape the parsed HTML document with a CSS selector.
    HtmlScrape {
        selector: Selector,
        attribute: Option<String>,
        index: Option<usize>,
    },
    /// Query the parsed JSON body with a path expression.
    JsonQuery {
        path: PathQuery,
        mappings: Option<JsonMappings>,
    },
}

/// A custom resolver that passed every validation check.
#[derive(Debug, Clone)]
pub struct ResolverSpec {
    pub name: String,
    pub method: reqwest::Method,
    pub url_template: String,
    pub mode: ExtractionMode,
    pub automatic: bool,
    pub timeout: Duration,
}

impl ResolverSpec {
    /// Validate one raw spec. Checks run in a fixed order and the first
    /// failure is the reported rejection reason.
    pub fn validate(raw: &RawResolverSpec) -> Result<Self, SpecError> {
        let name = raw
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(SpecError::MissingName)?;

        let method = match raw.method.as_deref().map(str::to_uppercase).as_deref() {
            Some("GET") => reqwest::Method::GET,
            Some("POST") => reqwest::Method::POST,
            _ => return Err(SpecError::BadMethod),
        };

        let url = raw
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(SpecError::MissingUrl)?;
        if !url.contains(DOI_PLACEHOLDER) {
            return Err(SpecError::MissingPlaceholder);
        }

        let mode_tag = raw
            .mode
            .as_deref()
            .map(str::to_lowercase)
            .ok_or(SpecError::BadMode)?;
        if !matches!(mode_tag.as_str(), "html" | "json" | "pdf") {
            return Err(SpecError::BadMode);
        }

        let selector = raw.selector.as_deref().filter(|s| !s.is_empty());
        if selector.is_none() && mode_tag != "pdf" {
            return Err(SpecError::MissingSelector);
        }

        let timeout_ms = raw.timeout.unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(SpecError::BadTimeout);
        }

        let mode = match mode_tag.as_str() {
            "pdf" => ExtractionMode::Direct,
            "html" => {
                let source = selector.ok_or(SpecError::MissingSelector)?;
                let compiled = Selector::parse(source)
                    .map_err(|err| SpecError::BadSelector(err.to_string()))?;
                ExtractionMode::HtmlScrape {
                    selector: compiled,
                    attribute: raw.attribute.clone(),
                    index: raw.index,
                }
            }
            _ => {
                let source = selector.ok_or(SpecError::MissingSelector)?;
                let path = PathQuery::parse(source)
                    .map_err(|err| SpecError::BadPathQuery(err.to_string()))?;
                ExtractionMode::JsonQuery {
                    path,
                    mappings: raw.mappings.as_ref().map(JsonMappings::from_raw),
                }
            }
        };

        Ok(Self {
            name: name.to_string(),
            method,
            url_template: url.to_string(),
            mode,
            automatic: raw.automatic,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Bind this spec to a DOI: a single literal substitution of the
    /// placeholder in the URL template.
    pub fn compile(&self, doi: &str) -> CompiledResolver {
        let url = self.url_template.replacen(DOI_PLACEHOLDER, doi, 1);
        CompiledResolver::new(self.clone(), url)
    }
}

/// Decode the configuration blob holding custom resolver specs.
///
/// Accepts a single JSON object or an array of objects. A blob that does not
/// parse yields an empty list and a diagnostic, never an error.
pub fn parse_resolver_blob(blob: &str) -> Vec<RawResolverSpec> {
    if blob.trim().is_empty() {
        return Vec::new();
    }

    let value: Value = match serde_json::from_str(blob) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "could not parse custom resolver configuration");
            return Vec::new();
        }
    };

    let entries = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => {
            tracing::warn!("custom resolver configuration is neither an object nor an array");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(raw) => Some(raw),
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed custom resolver entry");
                None
            }
        })
        .collect()
}

/// Validate a batch of raw specs and apply automatic-mode gating.
///
/// The implicit hub resolver is appended after the user's entries so it
/// participates under the same rules as user resolvers; automatic runs then
/// drop every spec that has not opted in.
pub fn validate_specs(
    raw_specs: Vec<RawResolverSpec>,
    automatic_run: bool,
    automatic_download: bool,
) -> Vec<ResolverSpec> {
    let mut specs = Vec::new();
    for raw in raw_specs {
        match ResolverSpec::validate(&raw) {
            Ok(spec) => specs.push(spec),
            Err(reason) => {
                tracing::warn!(
                    name = raw.name.as_deref().unwrap_or("<unnamed>"),
                    %reason,
                    "rejecting custom resolver"
                );
            }
        }
    }

    specs.push(hub_resolver(automatic_download));

    if automatic_run {
        specs.retain(|spec| spec.automatic);
    }
    specs
}

fn hub_resolver(automatic: bool) -> ResolverSpec {
    ResolverSpec {
        name: HUB_RESOLVER_NAME.to_string(),
        method: reqwest::Method::GET,
        url_template: HUB_RESOLVER_URL.to_string(),
        mode: ExtractionMode::Direct,
        automatic,
        timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
    }
}
