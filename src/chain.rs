//! Chain construction and batch execution.
//!
//! A chain is the ordered list of resolver units for one record, built fresh
//! from a configuration snapshot. Per record the chain runs strictly
//! sequentially and stops at the first unit that commits an actionable
//! candidate. Across records the batch driver picks one of two policies from
//! the gateway probe: fan out when the local gateway is reachable, strict
//! one-at-a-time order otherwise.

use std::num::NonZeroU32;
use std::sync::Arc;

use futures_util::future::join_all;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;

use crate::config::Config;
use crate::doi;
use crate::gateway::GatewayProbe;
use crate::host::{Attachment, DocumentSink, StatusReporter};
use crate::models::{Record, ResolvedCandidate, METHOD_DOI, METHOD_URL};
use crate::resolvers::{
    parse_resolver_blob, validate_specs, OpenAccessLookup, ResolverContext, ResolverMethods,
    ResolverUnit,
};
use crate::utils::HttpClient;

/// Build the ordered resolver chain for one record snapshot.
///
/// Pure: everything the chain depends on arrives through the arguments.
/// Unit order is fixed: doi redirect, stored URL, open-access lookup, then
/// custom resolvers in declared order with the hub resolver last. Building
/// twice from the same inputs yields a structurally identical chain.
pub fn build_resolver_chain(
    identifier: Option<&str>,
    stored_url: Option<&str>,
    methods: ResolverMethods,
    config: &Config,
    automatic: bool,
) -> Vec<ResolverUnit> {
    let mut units = Vec::new();

    if methods.contains(ResolverMethods::DOI) {
        if let Some(doi) = identifier {
            units.push(ResolverUnit::Immediate(ResolvedCandidate::page(
                format!("https://doi.org/{doi}"),
                METHOD_DOI,
            )));
        }
    }

    if methods.contains(ResolverMethods::URL) {
        if let Some(url) = stored_url.and_then(clean_url) {
            units.push(ResolverUnit::Immediate(ResolvedCandidate::page(
                url, METHOD_URL,
            )));
        }
    }

    if let Some(doi) = identifier {
        if methods.contains(ResolverMethods::OA) {
            units.push(ResolverUnit::OpenAccess {
                doi: doi.to_string(),
            });
        }

        if methods.contains(ResolverMethods::CUSTOM) {
            let raw = config
                .resolvers
                .as_deref()
                .map(parse_resolver_blob)
                .unwrap_or_default();
            for spec in validate_specs(raw, automatic, config.automatic_download) {
                units.push(ResolverUnit::Custom(spec.compile(doi)));
            }
        }
    }

    units
}

/// Normalize a stored URL into something fetchable.
fn clean_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

/// Terminal state of one record in a batch.
#[derive(Debug)]
pub enum RecordOutcome {
    /// A document was attached
    Attached(Attachment),
    /// The record is not a resolvable bibliographic entry
    Skipped,
    /// No identifier could be derived, so no chain was built
    NoIdentifier,
    /// Every unit ran without yielding a usable document
    NoDocument,
}

/// Per-batch summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub attached: usize,
    pub skipped: usize,
    pub missing_identifier: usize,
    pub failed: usize,
}

impl BatchReport {
    fn absorb(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Attached(_) => self.attached += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::NoIdentifier => self.missing_identifier += 1,
            RecordOutcome::NoDocument => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.attached + self.skipped + self.missing_identifier + self.failed
    }
}

/// Drives resolver chains across batches of records.
pub struct ResolverEngine {
    http: HttpClient,
    config: Config,
    oa: Arc<dyn OpenAccessLookup>,
    sink: Arc<dyn DocumentSink>,
    reporter: Arc<dyn StatusReporter>,
}

impl ResolverEngine {
    pub fn new(
        http: HttpClient,
        config: Config,
        oa: Arc<dyn OpenAccessLookup>,
        sink: Arc<dyn DocumentSink>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            http,
            config,
            oa,
            sink,
            reporter,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve one record: run its chain until a unit commits a candidate.
    ///
    /// Unit failures are logged and skipped; the first actionable candidate
    /// commits the record, and a failed attach is not retried against later
    /// units.
    pub async fn resolve_record(
        &self,
        record: &dyn Record,
        methods: ResolverMethods,
        automatic: bool,
    ) -> RecordOutcome {
        if !record.is_regular() || record.is_collection() {
            tracing::debug!(title = %record.title(), "skipping non-item record");
            return RecordOutcome::Skipped;
        }

        let identifier = doi::extract(record);
        let stored_url = record.field("url");
        let units = build_resolver_chain(
            identifier.as_deref(),
            stored_url.as_deref(),
            methods,
            &self.config,
            automatic,
        );

        if units.is_empty() {
            if identifier.is_none() {
                self.reporter.report("DOI is missing", &record.title(), true);
                return RecordOutcome::NoIdentifier;
            }
            self.report_unavailable(record);
            return RecordOutcome::NoDocument;
        }

        self.reporter.report("Fetching PDF", &record.title(), false);

        let cx = ResolverContext {
            http: &self.http,
            oa: self.oa.as_ref(),
        };

        for unit in &units {
            let candidates = match unit.resolve(&cx).await {
                Ok(candidates) => candidates,
                Err(err) => {
                    tracing::warn!(
                        access_method = unit.access_method(),
                        error = %err,
                        "resolver unit failed, advancing"
                    );
                    continue;
                }
            };

            let Some(candidate) = candidates.into_iter().find(ResolvedCandidate::is_actionable)
            else {
                continue;
            };

            tracing::debug!(
                access_method = %candidate.access_method,
                "committing candidate"
            );
            match self.sink.attach(&candidate, record).await {
                Ok(attachment) => return RecordOutcome::Attached(attachment),
                Err(err) => {
                    tracing::warn!(error = %err, "attach failed");
                    self.report_unavailable(record);
                    return RecordOutcome::NoDocument;
                }
            }
        }

        self.report_unavailable(record);
        RecordOutcome::NoDocument
    }

    fn report_unavailable(&self, record: &dyn Record) {
        self.reporter.report(
            "PDF not available",
            &format!("Try again later.\n\"{}\"", record.title()),
            true,
        );
    }

    /// Resolve a batch, selecting the concurrency policy from the gateway
    /// probe. The probe runs once per batch and is never cached across
    /// batches.
    pub async fn update_records(
        &self,
        records: &[Arc<dyn Record>],
        methods: ResolverMethods,
        automatic: bool,
    ) -> BatchReport {
        let probe = GatewayProbe::new(self.http.clone(), &self.config.gateway);
        let parallel = probe.probe().await;
        tracing::debug!(parallel, records = records.len(), "starting batch");
        self.update_records_with_policy(records, methods, automatic, parallel)
            .await
    }

    /// Batch execution with the concurrency policy already chosen (the CLI
    /// exposes an override; tests pin it).
    ///
    /// Parallel fans every record out at once: the local gateway has no
    /// meaningful rate limit. Sequential resolves records one at a time in
    /// array order, each record fully finished (attach included) before the
    /// next starts, paced so scraped third-party hosts see a bounded request
    /// rate.
    pub async fn update_records_with_policy(
        &self,
        records: &[Arc<dyn Record>],
        methods: ResolverMethods,
        automatic: bool,
        parallel: bool,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        if parallel {
            let outcomes = join_all(
                records
                    .iter()
                    .map(|record| self.resolve_record(record, methods, automatic)),
            )
            .await;
            for outcome in &outcomes {
                report.absorb(outcome);
            }
        } else {
            let quota = Quota::per_second(
                NonZeroU32::new(self.config.rate_limit.sequential_requests_per_second)
                    .unwrap_or(nonzero!(1u32)),
            );
            let limiter = RateLimiter::direct(quota);

            for record in records {
                limiter.until_ready().await;
                let outcome = self.resolve_record(record, methods, automatic).await;
                report.absorb(&outcome);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_resolvers() -> Config {
        Config {
            resolvers: Some(
                r##"[
                    {"name": "Sci-Hub", "method": "GET", "url": "https://sci-hub.ru/{doi}",
                     "mode": "html", "selector": "#pdf", "attribute": "src"},
                    {"name": "API", "method": "POST", "url": "https://api.example/{doi}",
                     "mode": "json", "selector": "$.results[*]"}
                ]"##
                .to_string(),
            ),
            ..Config::default()
        }
    }

    fn access_methods(units: &[ResolverUnit]) -> Vec<&str> {
        units.iter().map(ResolverUnit::access_method).collect()
    }

    #[test]
    fn test_chain_order_is_fixed() {
        let config = config_with_resolvers();
        let units = build_resolver_chain(
            Some("10.1037/a0023781"),
            Some("https://example.com/article"),
            ResolverMethods::default(),
            &config,
            false,
        );

        assert_eq!(
            access_methods(&units),
            vec!["doi", "url", "oa", "Sci-Hub", "API", "Nexus"]
        );
    }

    #[test]
    fn test_chain_build_is_idempotent() {
        let config = config_with_resolvers();
        let build = || {
            build_resolver_chain(
                Some("10.1037/a0023781"),
                None,
                ResolverMethods::default(),
                &config,
                false,
            )
        };

        let first = build();
        let second = build();
        assert_eq!(first.len(), second.len());
        assert_eq!(access_methods(&first), access_methods(&second));
    }

    #[test]
    fn test_disabled_method_groups_are_excluded() {
        let config = config_with_resolvers();
        let units = build_resolver_chain(
            Some("10.1037/a0023781"),
            Some("https://example.com/article"),
            ResolverMethods::DOI | ResolverMethods::CUSTOM,
            &config,
            false,
        );

        assert_eq!(
            access_methods(&units),
            vec!["doi", "Sci-Hub", "API", "Nexus"]
        );
    }

    #[test]
    fn test_doi_unit_candidate_shape() {
        let units = build_resolver_chain(
            Some("10.1000/abc"),
            None,
            ResolverMethods::DOI,
            &Config::default(),
            false,
        );

        let ResolverUnit::Immediate(candidate) = &units[0] else {
            panic!("expected an immediate unit");
        };
        assert_eq!(
            candidate.page_url.as_deref(),
            Some("https://doi.org/10.1000/abc")
        );
        assert_eq!(candidate.access_method, "doi");
        assert!(candidate.url.is_none());
    }

    #[test]
    fn test_without_identifier_only_url_unit_remains() {
        let units = build_resolver_chain(
            None,
            Some("https://example.com/article"),
            ResolverMethods::default(),
            &Config::default(),
            false,
        );
        assert_eq!(access_methods(&units), vec!["url"]);

        let none = build_resolver_chain(
            None,
            None,
            ResolverMethods::default(),
            &Config::default(),
            false,
        );
        assert!(none.is_empty());
    }

    #[test]
    fn test_unusable_stored_url_is_dropped() {
        let units = build_resolver_chain(
            None,
            Some("ftp://example.com/article"),
            ResolverMethods::URL,
            &Config::default(),
            false,
        );
        assert!(units.is_empty());

        let garbage = build_resolver_chain(
            None,
            Some("not a url"),
            ResolverMethods::URL,
            &Config::default(),
            false,
        );
        assert!(garbage.is_empty());
    }

    #[test]
    fn test_automatic_build_gates_custom_resolvers() {
        let mut config = config_with_resolvers();
        config.automatic_download = true;

        // Neither user resolver opted in; only the hub resolver survives.
        let units = build_resolver_chain(
            Some("10.1000/abc"),
            None,
            ResolverMethods::CUSTOM,
            &config,
            true,
        );
        assert_eq!(access_methods(&units), vec!["Nexus"]);
    }
}
