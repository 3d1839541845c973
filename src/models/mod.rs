//! Core data structures for records and resolved candidates.

mod candidate;
mod record;

pub use candidate::{ResolvedCandidate, METHOD_DOI, METHOD_OA, METHOD_URL};
pub use record::{MemoryRecord, Record};
