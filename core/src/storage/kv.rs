//! Key-value variant on sled.
//!
//! Layout, one tree per relation:
//! - `documents`: `id` -> bincode `DocumentMetadata`
//! - `postings`, `title_postings`: `term \0 id` -> empty, one key per edge
//! - `terms`: `term` -> empty, the set of distinct posting terms
//! - `stats`: counter name -> big-endian `u64`
//!
//! Counters are bumped in the same transaction as the write that changes the
//! underlying set, and only when that write inserted a new key.

use super::StorageBackend;
use crate::error::{Error, Result};
use crate::{DocId, DocumentMetadata, IndexStats};
use sled::transaction::{
    ConflictableTransactionResult, TransactionError, TransactionResult, TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::collections::BTreeSet;
use std::path::Path;

const TOTAL_DOCUMENTS: &str = "total_documents";
const UNIQUE_TERMS: &str = "unique_terms";
const SEPARATOR: u8 = 0;

pub struct KvBackend {
    db: Db,
    documents: Tree,
    postings: Tree,
    title_postings: Tree,
    terms: Tree,
    stats: Tree,
}

impl KvBackend {
    pub fn open<P: AsRef<Path>>(path: P, temporary: bool) -> Result<Self> {
        let db = sled::Config::new().path(path).temporary(temporary).open()?;
        Self::from_db(db)
    }

    /// Throwaway store that is deleted when dropped.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            documents: db.open_tree("documents")?,
            postings: db.open_tree("postings")?,
            title_postings: db.open_tree("title_postings")?,
            terms: db.open_tree("terms")?,
            stats: db.open_tree("stats")?,
            db,
        })
    }

    fn counter(&self, name: &str) -> Result<u64> {
        Ok(self.stats.get(name)?.map(|v| decode_counter(&v)).unwrap_or(0))
    }

    fn scan_postings(tree: &Tree, term: &str) -> Result<BTreeSet<DocId>> {
        let prefix = posting_key(term, "");
        let mut ids = BTreeSet::new();
        for entry in tree.scan_prefix(&prefix) {
            let (key, _) = entry?;
            let id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            ids.insert(id);
        }
        Ok(ids)
    }
}

fn posting_key(term: &str, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(term.len() + 1 + id.len());
    key.extend_from_slice(term.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(id.as_bytes());
    key
}

fn decode_counter(bytes: &[u8]) -> u64 {
    u64::from_be_bytes(bytes.try_into().unwrap_or([0; 8]))
}

fn bump(stats: &TransactionalTree, name: &str) -> ConflictableTransactionResult<(), Error> {
    let current = stats.get(name)?.map(|v| decode_counter(&v)).unwrap_or(0);
    stats.insert(name, (current + 1).to_be_bytes().to_vec())?;
    Ok(())
}

fn tx_error(e: TransactionError<Error>) -> Error {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => Error::Kv(e),
    }
}

fn check_term(term: &str) -> Result<()> {
    if term.is_empty() || term.as_bytes().contains(&SEPARATOR) {
        return Err(Error::InvalidTerm(term.to_string()));
    }
    Ok(())
}

fn check_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidDocumentId(id.to_string()));
    }
    Ok(())
}

impl StorageBackend for KvBackend {
    fn name(&self) -> &'static str { "kv" }

    fn store_document_metadata(&self, id: &str, metadata: &DocumentMetadata) -> Result<()> {
        check_id(id)?;
        let encoded = bincode::serialize(metadata)?;
        let result: TransactionResult<(), Error> =
            (&self.documents, &self.stats).transaction(|(documents, stats)| {
                let previous = documents.insert(id.as_bytes(), encoded.as_slice())?;
                if previous.is_none() {
                    bump(stats, TOTAL_DOCUMENTS)?;
                }
                Ok(())
            });
        result.map_err(tx_error)
    }

    fn get_document_metadata(&self, id: &str) -> Result<Option<DocumentMetadata>> {
        match self.documents.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn is_document_indexed(&self, id: &str) -> Result<bool> {
        Ok(self.documents.contains_key(id.as_bytes())?)
    }

    fn get_indexed_document_ids(&self) -> Result<BTreeSet<DocId>> {
        let mut ids = BTreeSet::new();
        for key in self.documents.iter().keys() {
            ids.insert(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(ids)
    }

    fn add_term_posting(&self, term: &str, id: &str) -> Result<()> {
        check_term(term)?;
        check_id(id)?;
        let key = posting_key(term, id);
        let result: TransactionResult<(), Error> =
            (&self.postings, &self.terms, &self.stats).transaction(|(postings, terms, stats)| {
                postings.insert(key.as_slice(), Vec::new())?;
                if terms.insert(term.as_bytes(), Vec::new())?.is_none() {
                    bump(stats, UNIQUE_TERMS)?;
                }
                Ok(())
            });
        result.map_err(tx_error)
    }

    fn search_term(&self, term: &str) -> Result<BTreeSet<DocId>> {
        Self::scan_postings(&self.postings, term)
    }

    fn add_title_posting(&self, term: &str, id: &str) -> Result<()> {
        check_term(term)?;
        check_id(id)?;
        self.title_postings.insert(posting_key(term, id), Vec::new())?;
        Ok(())
    }

    fn search_title_term(&self, term: &str) -> Result<BTreeSet<DocId>> {
        Self::scan_postings(&self.title_postings, term)
    }

    fn get_stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            total_documents: self.counter(TOTAL_DOCUMENTS)?,
            unique_terms: self.counter(UNIQUE_TERMS)?,
            indexed_documents: self.documents.len() as u64,
        })
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn check_connectivity(&self) -> bool {
        match self.stats.get(TOTAL_DOCUMENTS) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "kv store unreachable");
                false
            }
        }
    }
}
