//! Resolver units and the strategies that produce document candidates.
//!
//! A resolver unit is one strategy capable of producing zero or more
//! candidate locations for a record. The built-in doi-redirect and
//! stored-URL units are immediate; the open-access lookup and declarative
//! custom resolvers go to the network. Units are assembled into an ordered
//! chain by [`crate::chain::build_resolver_chain`] and run strictly one
//! after another per record.

mod custom;
mod extract;
mod jsonquery;
mod oa;
mod spec;

pub use custom::CompiledResolver;
pub use jsonquery::{PathQuery, PathQueryError};
pub use oa::{OaLocation, OpenAccessLookup, UnpaywallLookup};
pub use spec::{
    parse_resolver_blob, validate_specs, ExtractionMode, JsonMappings, RawResolverSpec,
    ResolverSpec, SpecError, HUB_RESOLVER_NAME,
};

use crate::models::{ResolvedCandidate, METHOD_OA};
use crate::utils::HttpClient;

bitflags::bitflags! {
    /// Strategy groups that may participate in a resolver chain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResolverMethods: u32 {
        const DOI = 1 << 0;
        const URL = 1 << 1;
        const OA = 1 << 2;
        const CUSTOM = 1 << 3;
    }
}

impl Default for ResolverMethods {
    fn default() -> Self {
        Self::all()
    }
}

/// Errors raised while a single resolver unit runs.
///
/// Always recovered at the unit boundary: the chain logs the error and
/// advances to the next unit, never abandoning the record.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// Network or transport error
    #[error("network error: {0}")]
    Network(String),

    /// The request hit its per-spec timeout
    #[error("request timed out")]
    Timeout,

    /// Non-success HTTP status
    #[error("unexpected status: {0}")]
    Status(reqwest::StatusCode),

    /// Response body could not be parsed for the spec's mode
    #[error("parse error: {0}")]
    Parse(String),

    /// API-level error from a collaborator service
    #[error("API error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for ResolverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ResolverError::Timeout
        } else {
            ResolverError::Network(err.to_string())
        }
    }
}

/// Shared collaborators handed to deferred units at execution time.
pub struct ResolverContext<'a> {
    pub http: &'a HttpClient,
    pub oa: &'a dyn OpenAccessLookup,
}

/// One strategy in a per-record chain.
#[derive(Debug)]
pub enum ResolverUnit {
    /// Built-in unit whose candidate is known without network I/O
    Immediate(ResolvedCandidate),
    /// Open-access lookup for a DOI
    OpenAccess { doi: String },
    /// A validated custom resolver with `{doi}` already substituted
    Custom(CompiledResolver),
}

impl ResolverUnit {
    /// Strategy label recorded on candidates this unit produces.
    pub fn access_method(&self) -> &str {
        match self {
            ResolverUnit::Immediate(candidate) => &candidate.access_method,
            ResolverUnit::OpenAccess { .. } => METHOD_OA,
            ResolverUnit::Custom(resolver) => resolver.name(),
        }
    }

    /// Run this unit to completion, producing zero or more candidates.
    pub async fn resolve(
        &self,
        cx: &ResolverContext<'_>,
    ) -> Result<Vec<ResolvedCandidate>, ResolverError> {
        match self {
            ResolverUnit::Immediate(candidate) => Ok(vec![candidate.clone()]),
            ResolverUnit::OpenAccess { doi } => {
                let locations = cx.oa.lookup(doi).await?;
                Ok(locations
                    .into_iter()
                    .map(|location| ResolvedCandidate {
                        url: location.url,
                        page_url: location.page_url,
                        article_version: location.version,
                        access_method: METHOD_OA.to_string(),
                        referrer: None,
                    })
                    .collect())
            }
            ResolverUnit::Custom(resolver) => resolver.resolve(cx.http).await,
        }
    }
}
