//! Corpus traversal, per-document indexing and conjunctive search.
//!
//! The indexer keeps no index state of its own: everything lives in the
//! backend it borrows. Writes for one document are metadata first, then body
//! postings, then title postings. A crash in between leaves a document that
//! reads as indexed with partial postings; a forced reindex repairs it.
//!
//! Reindexing only adds postings. Terms that disappeared from a document keep
//! pointing at it until the store is rebuilt from scratch.

use crate::corpus::CorpusProvider;
use crate::error::{Error, Result};
use crate::metadata::parse_header;
use crate::storage::StorageBackend;
use crate::tokenizer::{raw_word_count, tokenize};
use crate::{DocId, DocumentMetadata, DocumentRecord, IndexStats};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexFailure {
    pub document_id: DocId,
    pub reason: String,
}

/// Outcome of a batch run. `found == skipped + indexed + failed.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub found: usize,
    pub skipped: usize,
    pub indexed: usize,
    pub failed: Vec<IndexFailure>,
}

pub struct Indexer<'a> {
    backend: &'a dyn StorageBackend,
    corpus: &'a dyn CorpusProvider,
}

impl<'a> Indexer<'a> {
    pub fn new(backend: &'a dyn StorageBackend, corpus: &'a dyn CorpusProvider) -> Self {
        Self { backend, corpus }
    }

    pub fn process_document(&self, id: &str) -> Result<DocumentRecord> {
        let (header, body) = self.corpus.fetch(id)?;
        let fields = parse_header(&header);
        let title_words = tokenize(&header);
        let all_words = tokenize(&format!("{header} {body}"));
        Ok(DocumentRecord {
            document_id: id.to_string(),
            title: fields.title,
            author: fields.author,
            language: fields.language,
            title_words,
            all_words,
            word_count: raw_word_count(&body),
        })
    }

    pub fn index_document(&self, record: &DocumentRecord) -> Result<()> {
        let id = record.document_id.as_str();
        self.backend.store_document_metadata(id, &record.metadata())?;
        self.backend.add_term_postings(&sorted_terms(&record.all_words), id)?;
        self.backend.add_title_postings(&sorted_terms(&record.title_words), id)?;
        tracing::debug!(
            document_id = id,
            terms = record.all_words.len(),
            title_terms = record.title_words.len(),
            "document indexed"
        );
        Ok(())
    }

    /// Index every corpus document, skipping already-indexed ones unless `force_reindex`.
    ///
    /// Per-document failures are logged and reported, never propagated.
    /// Only listing the corpus or the indexed set can fail the whole run.
    pub fn index_all(&self, force_reindex: bool) -> Result<IndexReport> {
        let all_ids: BTreeSet<DocId> = self.corpus.document_ids()?.into_iter().collect();
        let to_index: Vec<&DocId> = if force_reindex {
            all_ids.iter().collect()
        } else {
            let indexed = self.backend.get_indexed_document_ids()?;
            all_ids.iter().filter(|id| !indexed.contains(*id)).collect()
        };

        let mut report = IndexReport {
            found: all_ids.len(),
            skipped: all_ids.len() - to_index.len(),
            ..Default::default()
        };
        tracing::info!(
            backend = self.backend.name(),
            found = report.found,
            skipped = report.skipped,
            to_index = to_index.len(),
            force_reindex,
            "indexing run started"
        );

        let total = to_index.len();
        for (i, id) in to_index.into_iter().enumerate() {
            match self.process_document(id).and_then(|record| self.index_document(&record)) {
                Ok(()) => {
                    report.indexed += 1;
                    tracing::info!(document_id = %id, progress = i + 1, total, "indexed");
                }
                Err(e) => {
                    tracing::error!(document_id = %id, error = %e, "failed to index document");
                    report.failed.push(IndexFailure { document_id: id.clone(), reason: e.to_string() });
                }
            }
        }

        if let Err(e) = self.backend.flush() {
            tracing::warn!(error = %e, "flush after indexing run failed");
        }
        tracing::info!(
            found = report.found,
            skipped = report.skipped,
            indexed = report.indexed,
            failed = report.failed.len(),
            "indexing run complete"
        );
        Ok(report)
    }

    /// Documents containing every query term.
    pub fn search(&self, query: &str) -> Result<BTreeSet<DocId>> {
        conjunctive(query, |term| self.backend.search_term(term))
    }

    /// Like [`Indexer::search`], restricted to title postings.
    pub fn search_title(&self, query: &str) -> Result<BTreeSet<DocId>> {
        conjunctive(query, |term| self.backend.search_title_term(term))
    }

    pub fn get_document_info(&self, id: &str) -> Result<Option<DocumentMetadata>> {
        self.backend.get_document_metadata(id)
    }

    pub fn get_stats(&self) -> Result<IndexStats> {
        self.backend.get_stats()
    }

    pub fn check_connection(&self) -> bool {
        let ok = self.backend.check_connectivity();
        if ok {
            tracing::info!(backend = self.backend.name(), "backend connection ok");
        } else {
            tracing::error!(backend = self.backend.name(), "backend connection failed");
        }
        ok
    }

    /// Connectivity gate for batch runs: `Error::Connectivity` when the backend is down.
    pub fn ensure_connected(&self) -> Result<()> {
        if self.check_connection() {
            Ok(())
        } else {
            Err(Error::Connectivity(format!("{} backend did not respond", self.backend.name())))
        }
    }
}

fn sorted_terms(terms: &HashSet<String>) -> Vec<&str> {
    let mut v: Vec<&str> = terms.iter().map(String::as_str).collect();
    v.sort_unstable();
    v
}

fn conjunctive<F>(query: &str, postings: F) -> Result<BTreeSet<DocId>>
where
    F: Fn(&str) -> Result<BTreeSet<DocId>>,
{
    let terms = tokenize(query);
    let mut result: Option<BTreeSet<DocId>> = None;
    for term in sorted_terms(&terms) {
        let docs = postings(term)?;
        let next = match result {
            None => docs,
            Some(acc) => acc.intersection(&docs).cloned().collect(),
        };
        if next.is_empty() {
            return Ok(BTreeSet::new());
        }
        result = Some(next);
    }
    Ok(result.unwrap_or_default())
}
