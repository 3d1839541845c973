//! # Nexus Resolver
//!
//! Locates a downloadable scholarly PDF for a bibliographic record
//! identified by DOI, trying several independent resolution strategies in a
//! fixed priority order: the DOI redirect, the record's stored URL, an
//! open-access lookup, and user-defined custom resolvers expressed as
//! declarative specs.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: record and candidate data structures
//! - [`doi`]: DOI extraction and cleaning
//! - [`resolvers`]: resolver units, custom resolver specs and their execution
//! - [`chain`]: chain construction and the batch driver
//! - [`gateway`]: local gateway probing and document URL construction
//! - [`host`]: collaborator traits for the hosting application
//! - [`config`]: configuration snapshot
//! - [`utils`]: HTTP client

pub mod chain;
pub mod config;
pub mod doi;
pub mod gateway;
pub mod host;
pub mod models;
pub mod resolvers;
pub mod utils;

// Re-export commonly used types
pub use chain::{build_resolver_chain, BatchReport, RecordOutcome, ResolverEngine};
pub use models::{MemoryRecord, Record, ResolvedCandidate};
pub use resolvers::{ResolverMethods, ResolverUnit};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
