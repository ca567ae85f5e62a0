//! Input records consumed by the build path.
//!
//! A record is the unit handed over by the ingestion side: a stable
//! external id, the text to embed, and whatever metadata the source
//! carried (issue state, commit author, and so on). Uniqueness of
//! `external_id` within one project is the caller's contract; the
//! builder indexes whatever order it receives.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One unit of project history before embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier, unique within the project.
    pub external_id: String,

    /// Text that gets embedded and stored as document content.
    pub text: String,

    /// Source metadata carried through to search results.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Record {
    pub fn new(external_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach one metadata entry, builder style.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = Record::new("issue-42", "Issue: crash on startup, State: open")
            .with_metadata("kind", "issue")
            .with_metadata("state", "open");

        assert_eq!(record.external_id, "issue-42");
        assert_eq!(record.metadata.get("kind").map(String::as_str), Some("issue"));
        assert_eq!(record.metadata.len(), 2);
    }

    #[test]
    fn test_record_json_round_trip() {
        let record = Record::new("pr-7", "PR: add dark mode").with_metadata("kind", "pull_request");
        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_record_missing_metadata_defaults_empty() {
        let json = r#"{"external_id": "c1", "text": "Commit: fix typo"}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert!(record.metadata.is_empty());
    }
}
