//! Corpus providers: where raw `(header, body)` document pairs come from.

use crate::error::{Error, Result};
use crate::DocId;
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub trait CorpusProvider: Send + Sync {
    /// Every document id the provider knows about.
    fn document_ids(&self) -> Result<Vec<DocId>>;

    /// Header and body text for `id`, or `Error::NotFound` when either half is missing.
    fn fetch(&self, id: &str) -> Result<(String, String)>;
}

/// Flat directory of `header_<id>.txt` / `body_<id>.txt` pairs.
#[derive(Debug, Clone)]
pub struct DatalakeCorpus {
    pub root: PathBuf,
}

const HEADER_PREFIX: &str = "header_";
const BODY_PREFIX: &str = "body_";
const SUFFIX: &str = ".txt";

impl DatalakeCorpus {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn header_path(&self, id: &str) -> PathBuf { self.root.join(format!("{HEADER_PREFIX}{id}{SUFFIX}")) }
    pub fn body_path(&self, id: &str) -> PathBuf { self.root.join(format!("{BODY_PREFIX}{id}{SUFFIX}")) }

    pub fn contains(&self, id: &str) -> bool {
        self.header_path(id).is_file() && self.body_path(id).is_file()
    }

    /// Write a document pair, replacing any previous copy.
    pub fn store(&self, id: &str, header: &str, body: &str) -> Result<()> {
        if id.is_empty() || id.contains(['/', '\\']) {
            return Err(Error::InvalidDocumentId(id.to_string()));
        }
        create_dir_all(&self.root)?;
        fs::write(self.header_path(id), header)?;
        fs::write(self.body_path(id), body)?;
        Ok(())
    }
}

impl CorpusProvider for DatalakeCorpus {
    fn document_ids(&self) -> Result<Vec<DocId>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() { continue; }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_prefix(HEADER_PREFIX).and_then(|s| s.strip_suffix(SUFFIX)) {
                if !id.is_empty() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn fetch(&self, id: &str) -> Result<(String, String)> {
        let header = read_existing(&self.header_path(id), id)?;
        let body = read_existing(&self.body_path(id), id)?;
        Ok((header.trim().to_string(), body))
    }
}

fn read_existing(path: &Path, id: &str) -> Result<String> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::not_found(id)),
        Err(e) => Err(e.into()),
    }
}

/// In-memory corpus. A `None` entry lists the id without any source data.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    docs: BTreeMap<DocId, Option<(String, String)>>,
}

impl MemoryCorpus {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, id: impl Into<DocId>, header: impl Into<String>, body: impl Into<String>) -> &mut Self {
        self.docs.insert(id.into(), Some((header.into(), body.into())));
        self
    }

    /// List `id` without data, so fetching it fails with `NotFound`.
    pub fn insert_missing(&mut self, id: impl Into<DocId>) -> &mut Self {
        self.docs.insert(id.into(), None);
        self
    }
}

impl CorpusProvider for MemoryCorpus {
    fn document_ids(&self) -> Result<Vec<DocId>> {
        Ok(self.docs.keys().cloned().collect())
    }

    fn fetch(&self, id: &str) -> Result<(String, String)> {
        match self.docs.get(id) {
            Some(Some((header, body))) => Ok((header.clone(), body.clone())),
            _ => Err(Error::not_found(id)),
        }
    }
}
