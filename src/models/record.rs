//! Bibliographic record abstraction consumed by the resolver chain.

use std::collections::HashMap;
use std::sync::Arc;

/// Read-only view of a bibliographic record.
///
/// The hosting library owns record storage; the engine only reads the few
/// fields resolution needs. Values in the free-text `extra` field are
/// `<Key>: <value>` lines, one per line.
pub trait Record: Send + Sync {
    /// A structured field by name (`DOI`, `url`, `title`, `extra`, ...).
    fn field(&self, name: &str) -> Option<String>;

    /// Whether this is a resolvable bibliographic entry.
    fn is_regular(&self) -> bool {
        true
    }

    /// Whether this is a collection rather than an item.
    fn is_collection(&self) -> bool {
        false
    }

    /// A key embedded in the `extra` field, matched as a line of the exact
    /// form `<name>: <value>`. The key is case-sensitive.
    fn extra_field(&self, name: &str) -> Option<String> {
        let extra = self.field("extra")?;
        let pattern = format!(r"(?m)^{}: (.+)$", regex::escape(name));
        let re = regex::Regex::new(&pattern).ok()?;
        re.captures(&extra).map(|captures| captures[1].to_string())
    }

    /// Display title, used in status reports.
    fn title(&self) -> String {
        self.field("title").unwrap_or_default()
    }
}

impl<R: Record + ?Sized> Record for Arc<R> {
    fn field(&self, name: &str) -> Option<String> {
        (**self).field(name)
    }

    fn is_regular(&self) -> bool {
        (**self).is_regular()
    }

    fn is_collection(&self) -> bool {
        (**self).is_collection()
    }

    fn extra_field(&self, name: &str) -> Option<String> {
        (**self).extra_field(name)
    }

    fn title(&self) -> String {
        (**self).title()
    }
}

/// In-memory record used by the CLI and tests.
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    fields: HashMap<String, String>,
    regular: bool,
    collection: bool,
}

impl Default for MemoryRecord {
    fn default() -> Self {
        Self {
            fields: HashMap::new(),
            regular: true,
            collection: false,
        }
    }
}

impl MemoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record carrying only a DOI, as built from a CLI argument.
    pub fn from_doi(doi: impl Into<String>) -> Self {
        let doi = doi.into();
        Self::new()
            .with_field("title", doi.clone())
            .with_field("DOI", doi)
    }

    /// A collection entry, which resolution skips.
    pub fn collection() -> Self {
        Self {
            fields: HashMap::new(),
            regular: false,
            collection: true,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

impl Record for MemoryRecord {
    fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    fn is_regular(&self) -> bool {
        self.regular
    }

    fn is_collection(&self) -> bool {
        self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_field_matches_exact_lines() {
        let record = MemoryRecord::new()
            .with_field("extra", "Citation Key: smith2020\nDOI: 10.1029/2018JA025877\nPMID: 123");
        assert_eq!(
            record.extra_field("DOI"),
            Some("10.1029/2018JA025877".to_string())
        );
        assert_eq!(record.extra_field("PMID"), Some("123".to_string()));
        assert_eq!(record.extra_field("ISBN"), None);
    }

    #[test]
    fn test_extra_field_key_is_case_sensitive() {
        let record = MemoryRecord::new().with_field("extra", "doi: 10.1000/lowercase");
        assert_eq!(record.extra_field("DOI"), None);
    }

    #[test]
    fn test_collection_flags() {
        let collection = MemoryRecord::collection();
        assert!(collection.is_collection());
        assert!(!collection.is_regular());

        let item = MemoryRecord::from_doi("10.1000/abc");
        assert!(item.is_regular());
        assert!(!item.is_collection());
    }
}
