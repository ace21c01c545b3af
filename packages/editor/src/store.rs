//! # Document Store
//!
//! Owns the authoritative source text. [`DocumentStore::set_source`] is the
//! only write path; every engine funnels its changes through it and reads
//! everywhere else are snapshot borrows.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Key for per-document state such as undo history
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which surface produced a source change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOrigin {
    Load,
    SourceView,
    Preview,
    Property,
    History,
}

#[derive(Debug)]
pub struct DocumentStore {
    id: DocumentId,
    source: String,
    /// Increments on every accepted change
    revision: u64,
    last_origin: ChangeOrigin,
}

impl DocumentStore {
    pub fn new(id: DocumentId, source: String) -> Self {
        Self {
            id,
            source,
            revision: 0,
            last_origin: ChangeOrigin::Load,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_origin(&self) -> ChangeOrigin {
        self.last_origin
    }

    /// Replace the source; returns false when the text is unchanged
    pub fn set_source(&mut self, source: String, origin: ChangeOrigin) -> bool {
        if source == self.source {
            return false;
        }
        self.source = source;
        self.revision += 1;
        self.last_origin = origin;
        debug!(document = %self.id, revision = self.revision, ?origin, "source updated");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_source_bumps_revision() {
        let mut store = DocumentStore::new(DocumentId::new("doc"), "a".to_string());
        assert_eq!(store.revision(), 0);
        assert_eq!(store.last_origin(), ChangeOrigin::Load);

        assert!(store.set_source("b".to_string(), ChangeOrigin::Preview));
        assert_eq!(store.revision(), 1);
        assert_eq!(store.source(), "b");
        assert_eq!(store.last_origin(), ChangeOrigin::Preview);
    }

    #[test]
    fn test_identical_source_is_not_a_change() {
        let mut store = DocumentStore::new(DocumentId::new("doc"), "same".to_string());
        assert!(!store.set_source("same".to_string(), ChangeOrigin::SourceView));
        assert_eq!(store.revision(), 0);
        assert_eq!(store.last_origin(), ChangeOrigin::Load);
    }

    #[test]
    fn test_document_id_display() {
        assert_eq!(DocumentId::new("slides/intro").to_string(), "slides/intro");
    }
}
