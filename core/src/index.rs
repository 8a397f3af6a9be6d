use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Stable document identifier, derived from the source file name.
pub type DocId = String;

/// Metadata record persisted once per indexed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub language: String,
    /// Whitespace-separated tokens in the raw body, duplicates included.
    pub word_count: u64,
    /// Distinct index terms derived from header and body.
    pub unique_words: u64,
    /// RFC 3339 time of the last (re)index.
    #[serde(default)]
    pub indexed_at: Option<String>,
}

/// Working data for a single document between processing and persistence.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document_id: DocId,
    pub title: String,
    pub author: String,
    pub language: String,
    pub title_words: HashSet<String>,
    pub all_words: HashSet<String>,
    pub word_count: u64,
}

impl DocumentRecord {
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            title: self.title.clone(),
            author: self.author.clone(),
            language: self.language.clone(),
            word_count: self.word_count,
            unique_words: self.all_words.len() as u64,
            indexed_at: Some(now_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: u64,
    pub unique_terms: u64,
    pub indexed_documents: u64,
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
