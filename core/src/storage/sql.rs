//! Relational variant on SQLite.

use super::StorageBackend;
use crate::error::Result;
use crate::{DocId, DocumentMetadata, IndexStats};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    document_id  TEXT PRIMARY KEY,
    title        TEXT NOT NULL DEFAULT '',
    author       TEXT NOT NULL DEFAULT '',
    language     TEXT NOT NULL DEFAULT '',
    word_count   INTEGER NOT NULL DEFAULT 0,
    unique_words INTEGER NOT NULL DEFAULT 0,
    indexed_at   TEXT
);
CREATE TABLE IF NOT EXISTS term_postings (
    term        TEXT NOT NULL,
    document_id TEXT NOT NULL,
    PRIMARY KEY (term, document_id)
);
CREATE INDEX IF NOT EXISTS idx_term_postings_term ON term_postings(term);
CREATE TABLE IF NOT EXISTS title_term_postings (
    term        TEXT NOT NULL,
    document_id TEXT NOT NULL,
    PRIMARY KEY (term, document_id)
);
CREATE INDEX IF NOT EXISTS idx_title_term_postings_term ON title_term_postings(term);
";

const UPSERT_DOCUMENT: &str = "
INSERT INTO documents (document_id, title, author, language, word_count, unique_words, indexed_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(document_id) DO UPDATE SET
    title = excluded.title,
    author = excluded.author,
    language = excluded.language,
    word_count = excluded.word_count,
    unique_words = excluded.unique_words,
    indexed_at = excluded.indexed_at
";

const INSERT_POSTING: &str =
    "INSERT INTO term_postings (term, document_id) VALUES (?1, ?2) ON CONFLICT(term, document_id) DO NOTHING";
const INSERT_TITLE_POSTING: &str =
    "INSERT INTO title_term_postings (term, document_id) VALUES (?1, ?2) ON CONFLICT(term, document_id) DO NOTHING";

pub struct SqlBackend {
    conn: Mutex<Connection>,
}

impl SqlBackend {
    /// Open (and migrate) the database file; `:memory:` gives a private in-memory database.
    pub fn open(database: &str) -> Result<Self> {
        Self::from_connection(Connection::open(database)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn insert_postings(&self, sql: &str, terms: &[&str], id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(sql)?;
            for term in terms {
                stmt.execute(params![term, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn select_ids(&self, sql: &str, term: &str) -> Result<BTreeSet<DocId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![term], |row| row.get::<_, String>(0))?;
        let mut ids = BTreeSet::new();
        for id in rows {
            ids.insert(id?);
        }
        Ok(ids)
    }
}

impl StorageBackend for SqlBackend {
    fn name(&self) -> &'static str { "relational" }

    fn store_document_metadata(&self, id: &str, metadata: &DocumentMetadata) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            UPSERT_DOCUMENT,
            params![
                id,
                metadata.title,
                metadata.author,
                metadata.language,
                metadata.word_count as i64,
                metadata.unique_words as i64,
                metadata.indexed_at,
            ],
        )?;
        Ok(())
    }

    fn get_document_metadata(&self, id: &str) -> Result<Option<DocumentMetadata>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT title, author, language, word_count, unique_words, indexed_at FROM documents WHERE document_id = ?1",
                params![id],
                |row| {
                    Ok(DocumentMetadata {
                        title: row.get(0)?,
                        author: row.get(1)?,
                        language: row.get(2)?,
                        word_count: row.get::<_, i64>(3)? as u64,
                        unique_words: row.get::<_, i64>(4)? as u64,
                        indexed_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn is_document_indexed(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE document_id = ?1)",
            params![id],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(exists)
    }

    fn get_indexed_document_ids(&self) -> Result<BTreeSet<DocId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT document_id FROM documents")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = BTreeSet::new();
        for id in rows {
            ids.insert(id?);
        }
        Ok(ids)
    }

    fn add_term_posting(&self, term: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(INSERT_POSTING)?.execute(params![term, id])?;
        Ok(())
    }

    fn search_term(&self, term: &str) -> Result<BTreeSet<DocId>> {
        self.select_ids("SELECT document_id FROM term_postings WHERE term = ?1", term)
    }

    fn add_title_posting(&self, term: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(INSERT_TITLE_POSTING)?.execute(params![term, id])?;
        Ok(())
    }

    fn search_title_term(&self, term: &str) -> Result<BTreeSet<DocId>> {
        self.select_ids("SELECT document_id FROM title_term_postings WHERE term = ?1", term)
    }

    fn add_term_postings(&self, terms: &[&str], id: &str) -> Result<()> {
        self.insert_postings(INSERT_POSTING, terms, id)
    }

    fn add_title_postings(&self, terms: &[&str], id: &str) -> Result<()> {
        self.insert_postings(INSERT_TITLE_POSTING, terms, id)
    }

    fn get_stats(&self) -> Result<IndexStats> {
        let conn = self.conn.lock();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let terms: i64 =
            conn.query_row("SELECT COUNT(DISTINCT term) FROM term_postings", [], |row| row.get(0))?;
        Ok(IndexStats {
            total_documents: total as u64,
            unique_terms: terms as u64,
            indexed_documents: total as u64,
        })
    }

    fn check_connectivity(&self) -> bool {
        let conn = self.conn.lock();
        match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "relational store unreachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_one_row_per_document() {
        let db = SqlBackend::in_memory().unwrap();
        let mut meta = DocumentMetadata { title: "First".into(), ..Default::default() };
        db.store_document_metadata("d1", &meta).unwrap();
        meta.title = "Second".into();
        db.store_document_metadata("d1", &meta).unwrap();

        let count: i64 = db
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM documents WHERE document_id = 'd1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(db.get_document_metadata("d1").unwrap().unwrap().title, "Second");
    }

    #[test]
    fn schema_creation_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datamart.sqlite3");
        let path = path.to_str().unwrap();
        SqlBackend::open(path).unwrap().add_term_posting("ship", "a").unwrap();
        let reopened = SqlBackend::open(path).unwrap();
        assert_eq!(reopened.search_term("ship").unwrap().len(), 1);
    }
}
