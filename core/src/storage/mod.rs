//! Storage backends: one capability contract, three interchangeable variants.
//!
//! Every variant upholds the same semantics:
//! - one metadata record per document id, overwritten on reindex;
//! - a document is indexed iff its metadata record exists;
//! - posting writes are idempotent;
//! - unknown ids and terms read as empty, never as errors;
//! - `total_documents` tracks the indexed-document set exactly.

pub mod fs;
pub mod kv;
pub mod sql;

use crate::error::Result;
use crate::{DocId, DocumentMetadata, IndexStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

pub use self::fs::FsBackend;
pub use self::kv::KvBackend;
pub use self::sql::SqlBackend;

pub trait StorageBackend: Send + Sync {
    /// Human-readable variant name, used in logs.
    fn name(&self) -> &'static str;

    fn store_document_metadata(&self, id: &str, metadata: &DocumentMetadata) -> Result<()>;
    fn get_document_metadata(&self, id: &str) -> Result<Option<DocumentMetadata>>;
    fn is_document_indexed(&self, id: &str) -> Result<bool>;
    fn get_indexed_document_ids(&self) -> Result<BTreeSet<DocId>>;

    fn add_term_posting(&self, term: &str, id: &str) -> Result<()>;
    fn search_term(&self, term: &str) -> Result<BTreeSet<DocId>>;

    fn add_title_posting(&self, term: &str, id: &str) -> Result<()>;
    fn search_title_term(&self, term: &str) -> Result<BTreeSet<DocId>>;

    /// All postings of one document. Variants may group the writes; the effect equals one call per term.
    fn add_term_postings(&self, terms: &[&str], id: &str) -> Result<()> {
        terms.iter().try_for_each(|term| self.add_term_posting(term, id))
    }

    fn add_title_postings(&self, terms: &[&str], id: &str) -> Result<()> {
        terms.iter().try_for_each(|term| self.add_title_posting(term, id))
    }

    fn get_stats(&self) -> Result<IndexStats>;

    /// Make completed writes durable. Called once at the end of a batch.
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Cheap round trip to the store. Any failure reads as `false`.
    fn check_connectivity(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Embedded key-value store at `path`; `temporary` discards it on drop.
    Kv {
        path: PathBuf,
        #[serde(default)]
        temporary: bool,
    },
    /// Relational store in the database file `database` (`:memory:` for a private in-memory db).
    Relational { database: String },
    /// Per-term posting files sharded by first letter under `root`.
    Filesystem { root: PathBuf },
}

/// Open the configured backend. The returned handle owns its connection and releases it on drop.
pub fn open_backend(config: &BackendConfig) -> Result<Box<dyn StorageBackend>> {
    let backend: Box<dyn StorageBackend> = match config {
        BackendConfig::Kv { path, temporary } => Box::new(KvBackend::open(path, *temporary)?),
        BackendConfig::Relational { database } => Box::new(SqlBackend::open(database)?),
        BackendConfig::Filesystem { root } => Box::new(FsBackend::open(root)?),
    };
    tracing::debug!(backend = backend.name(), "storage backend opened");
    Ok(backend)
}
