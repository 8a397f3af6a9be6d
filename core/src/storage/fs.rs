//! Filesystem variant for hosts without a KV or relational store.
//!
//! ```text
//! <root>/documents/<id>.json      metadata, pretty JSON
//! <root>/terms/<L>/<term>.txt     body postings, one document id per line
//! <root>/titles/<L>/<term>.txt    title postings
//! ```
//! `<L>` is the uppercased first letter of the term. Terms longer than
//! `MAX_NAMED_TERM_LEN` are stored as `<prefix>-<sha1>.txt`, and the file's first
//! line is `/<term>` so a name clash can never merge two terms. Ids cannot
//! contain `/`, so that line never reads as a posting.
//!
//! Stats are counted from the files, so they always match what is on disk.

use super::StorageBackend;
use crate::error::{Error, Result};
use crate::{DocId, DocumentMetadata, IndexStats};
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::fs::{self, create_dir_all, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const METADATA_EXT: &str = "json";
const POSTINGS_EXT: &str = "txt";
const MAX_NAMED_TERM_LEN: usize = 64;
const HASHED_PREFIX_LEN: usize = 32;
const TERM_MARKER: char = '/';

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn documents_dir(&self) -> PathBuf { self.root.join("documents") }
    fn terms_dir(&self) -> PathBuf { self.root.join("terms") }
    fn titles_dir(&self) -> PathBuf { self.root.join("titles") }
    fn document(&self, id: &str) -> PathBuf { self.documents_dir().join(format!("{id}.{METADATA_EXT}")) }
}

fn is_hashed(term: &str) -> bool {
    term.len() > MAX_NAMED_TERM_LEN
}

fn shard_file(dir: &Path, term: &str) -> PathBuf {
    let shard: String = term.chars().take(1).flat_map(char::to_uppercase).collect();
    let name = if is_hashed(term) {
        // Terms are ASCII, so byte slicing stays on a char boundary.
        let digest = Sha1::digest(term.as_bytes());
        format!("{}-{:x}.{POSTINGS_EXT}", &term[..HASHED_PREFIX_LEN], digest)
    } else {
        format!("{term}.{POSTINGS_EXT}")
    };
    dir.join(shard).join(name)
}

fn check_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(|c: char| c == '/' || c == '\\' || c == '\n' || c == '\r');
    if bad {
        return Err(Error::InvalidDocumentId(id.to_string()));
    }
    Ok(())
}

fn check_term(term: &str) -> Result<()> {
    if term.is_empty() || !term.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(Error::InvalidTerm(term.to_string()));
    }
    Ok(())
}

pub struct FsBackend {
    paths: IndexPaths,
    // Serializes read-check-append on posting files within this process.
    write_lock: Mutex<()>,
}

impl FsBackend {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let paths = IndexPaths::new(root);
        create_dir_all(paths.documents_dir())?;
        create_dir_all(paths.terms_dir())?;
        create_dir_all(paths.titles_dir())?;
        Ok(Self { paths, write_lock: Mutex::new(()) })
    }

    fn append_posting(&self, dir: &Path, term: &str, id: &str) -> Result<()> {
        check_term(term)?;
        check_id(id)?;
        let file = shard_file(dir, term);
        let _guard = self.write_lock.lock();
        let existing = load_postings(&file)?;
        match &existing {
            Some(p) if !p.holds(term) => return Err(Error::InvalidTerm(term.to_string())),
            Some(p) if p.ids.contains(id) => return Ok(()),
            _ => {}
        }
        if let Some(parent) = file.parent() {
            create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new().create(true).append(true).open(&file)?;
        if existing.is_none() && is_hashed(term) {
            writeln!(f, "{TERM_MARKER}{term}")?;
        }
        writeln!(f, "{id}")?;
        Ok(())
    }

    fn read_postings(&self, dir: &Path, term: &str) -> Result<BTreeSet<DocId>> {
        if check_term(term).is_err() {
            return Ok(BTreeSet::new());
        }
        Ok(load_postings(&shard_file(dir, term))?
            .filter(|p| p.holds(term))
            .map(|p| p.ids)
            .unwrap_or_default())
    }

    fn count_files(dir: &Path, ext: &str) -> u64 {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some(ext))
            .count() as u64
    }
}

struct PostingFile {
    /// Full term, recorded only in hashed files.
    term: Option<String>,
    ids: BTreeSet<DocId>,
}

impl PostingFile {
    fn holds(&self, term: &str) -> bool {
        self.term.as_deref().map_or(true, |t| t == term)
    }
}

fn load_postings(file: &Path) -> Result<Option<PostingFile>> {
    let text = match fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut postings = PostingFile { term: None, ids: BTreeSet::new() };
    for line in text.lines().filter(|l| !l.is_empty()) {
        match line.strip_prefix(TERM_MARKER) {
            Some(term) => postings.term = Some(term.to_string()),
            None => {
                postings.ids.insert(line.to_string());
            }
        }
    }
    Ok(Some(postings))
}

impl StorageBackend for FsBackend {
    fn name(&self) -> &'static str { "filesystem" }

    fn store_document_metadata(&self, id: &str, metadata: &DocumentMetadata) -> Result<()> {
        check_id(id)?;
        let target = self.paths.document(id);
        let staging = target.with_extension(format!("{METADATA_EXT}.tmp"));
        {
            let mut f = File::create(&staging)?;
            let json = serde_json::to_string_pretty(metadata)?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&staging, &target)?;
        Ok(())
    }

    fn get_document_metadata(&self, id: &str) -> Result<Option<DocumentMetadata>> {
        if check_id(id).is_err() {
            return Ok(None);
        }
        match fs::read_to_string(self.paths.document(id)) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn is_document_indexed(&self, id: &str) -> Result<bool> {
        Ok(check_id(id).is_ok() && self.paths.document(id).is_file())
    }

    fn get_indexed_document_ids(&self) -> Result<BTreeSet<DocId>> {
        let mut ids = BTreeSet::new();
        for entry in fs::read_dir(self.paths.documents_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(METADATA_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.insert(stem.to_string());
            }
        }
        Ok(ids)
    }

    fn add_term_posting(&self, term: &str, id: &str) -> Result<()> {
        self.append_posting(&self.paths.terms_dir(), term, id)
    }

    fn search_term(&self, term: &str) -> Result<BTreeSet<DocId>> {
        self.read_postings(&self.paths.terms_dir(), term)
    }

    fn add_title_posting(&self, term: &str, id: &str) -> Result<()> {
        self.append_posting(&self.paths.titles_dir(), term, id)
    }

    fn search_title_term(&self, term: &str) -> Result<BTreeSet<DocId>> {
        self.read_postings(&self.paths.titles_dir(), term)
    }

    fn get_stats(&self) -> Result<IndexStats> {
        let total = Self::count_files(&self.paths.documents_dir(), METADATA_EXT);
        Ok(IndexStats {
            total_documents: total,
            unique_terms: Self::count_files(&self.paths.terms_dir(), POSTINGS_EXT),
            indexed_documents: total,
        })
    }

    fn check_connectivity(&self) -> bool {
        match fs::metadata(self.paths.documents_dir()) {
            Ok(m) if m.is_dir() => true,
            Ok(_) => {
                tracing::warn!(root = %self.paths.root.display(), "index root is not a directory");
                false
            }
            Err(e) => {
                tracing::warn!(root = %self.paths.root.display(), error = %e, "index root unreachable");
                false
            }
        }
    }
}
