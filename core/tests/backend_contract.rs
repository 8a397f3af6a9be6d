//! The same assertions, run against every storage variant.

use datamart_core::storage::{open_backend, BackendConfig, FsBackend, KvBackend, SqlBackend, StorageBackend};
use datamart_core::DocumentMetadata;
use std::collections::BTreeSet;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    backends: Vec<Box<dyn StorageBackend>>,
}

fn backends() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let backends: Vec<Box<dyn StorageBackend>> = vec![
        Box::new(KvBackend::temporary().unwrap()),
        Box::new(SqlBackend::in_memory().unwrap()),
        Box::new(FsBackend::open(dir.path().join("fs")).unwrap()),
    ];
    Fixture { _dir: dir, backends }
}

fn set(v: &[&str]) -> BTreeSet<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn sample() -> DocumentMetadata {
    DocumentMetadata {
        title: "T".into(),
        author: "A".into(),
        language: "en".into(),
        word_count: 10,
        unique_words: 5,
        indexed_at: Some("2024-01-01T00:00:00Z".into()),
    }
}

#[test]
fn metadata_round_trip() {
    for b in backends().backends.iter() {
        b.store_document_metadata("d1", &sample()).unwrap();
        let got = b.get_document_metadata("d1").unwrap().expect(b.name());
        assert_eq!(got.title, "T", "{}", b.name());
        assert_eq!(got.author, "A", "{}", b.name());
        assert_eq!(got, sample(), "{}", b.name());
    }
}

#[test]
fn unknown_ids_and_terms_read_as_empty() {
    for b in backends().backends.iter() {
        assert_eq!(b.get_document_metadata("missing").unwrap(), None, "{}", b.name());
        assert!(!b.is_document_indexed("missing").unwrap(), "{}", b.name());
        assert!(b.search_term("nothing").unwrap().is_empty(), "{}", b.name());
        assert!(b.search_title_term("nothing").unwrap().is_empty(), "{}", b.name());
        assert!(b.get_indexed_document_ids().unwrap().is_empty(), "{}", b.name());
    }
}

#[test]
fn postings_are_idempotent() {
    for b in backends().backends.iter() {
        b.add_term_posting("alpha", "doc1").unwrap();
        b.add_term_posting("alpha", "doc1").unwrap();
        assert_eq!(b.search_term("alpha").unwrap(), set(&["doc1"]), "{}", b.name());

        b.add_term_postings(&["alpha", "beta"], "doc2").unwrap();
        b.add_term_postings(&["alpha", "beta"], "doc2").unwrap();
        assert_eq!(b.search_term("alpha").unwrap(), set(&["doc1", "doc2"]), "{}", b.name());
        assert_eq!(b.get_stats().unwrap().unique_terms, 2, "{}", b.name());
    }
}

#[test]
fn very_long_terms_are_stored_like_any_other() {
    let long = "a".repeat(300);
    let sibling = format!("{}b", "a".repeat(299));
    for b in backends().backends.iter() {
        b.add_term_postings(&[long.as_str(), sibling.as_str()], "d1").unwrap();
        b.add_term_posting(&long, "d2").unwrap();
        b.add_term_posting(&long, "d2").unwrap();
        b.add_title_posting(&long, "d1").unwrap();

        assert_eq!(b.search_term(&long).unwrap(), set(&["d1", "d2"]), "{}", b.name());
        assert_eq!(b.search_term(&sibling).unwrap(), set(&["d1"]), "{}", b.name());
        assert_eq!(b.search_title_term(&long).unwrap(), set(&["d1"]), "{}", b.name());
        assert_eq!(b.get_stats().unwrap().unique_terms, 2, "{}", b.name());
    }
}

#[test]
fn title_postings_are_separate() {
    for b in backends().backends.iter() {
        b.add_title_posting("moby", "2701").unwrap();
        b.add_title_postings(&["moby", "dick"], "2701").unwrap();
        assert_eq!(b.search_title_term("moby").unwrap(), set(&["2701"]), "{}", b.name());
        assert!(b.search_term("moby").unwrap().is_empty(), "{}", b.name());
        assert_eq!(b.get_stats().unwrap().unique_terms, 0, "{}", b.name());
    }
}

#[test]
fn membership_follows_metadata() {
    for b in backends().backends.iter() {
        b.add_term_posting("orphan", "p").unwrap();
        assert!(!b.is_document_indexed("p").unwrap(), "{}", b.name());

        b.store_document_metadata("x", &sample()).unwrap();
        b.store_document_metadata("y", &sample()).unwrap();
        assert!(b.is_document_indexed("x").unwrap(), "{}", b.name());
        assert_eq!(b.get_indexed_document_ids().unwrap(), set(&["x", "y"]), "{}", b.name());
    }
}

#[test]
fn reindex_overwrite_does_not_double_count() {
    for b in backends().backends.iter() {
        let mut meta = sample();
        b.store_document_metadata("d1", &meta).unwrap();
        meta.title = "Revised".into();
        meta.word_count = 99;
        b.store_document_metadata("d1", &meta).unwrap();
        b.store_document_metadata("d2", &sample()).unwrap();

        let stats = b.get_stats().unwrap();
        assert_eq!(stats.total_documents, 2, "{}", b.name());
        assert_eq!(stats.indexed_documents, 2, "{}", b.name());
        let got = b.get_document_metadata("d1").unwrap().unwrap();
        assert_eq!((got.title.as_str(), got.word_count), ("Revised", 99), "{}", b.name());
    }
}

#[test]
fn connectivity_check_passes_on_open_store() {
    for b in backends().backends.iter() {
        assert!(b.check_connectivity(), "{}", b.name());
    }
}

#[test]
fn filesystem_backend_reports_dead_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("gone");
    let b = FsBackend::open(&root).unwrap();
    std::fs::remove_dir_all(&root).unwrap();
    assert!(!b.check_connectivity());
}

#[test]
fn open_backend_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let configs = vec![
        BackendConfig::Kv { path: dir.path().join("kv"), temporary: false },
        BackendConfig::Relational { database: dir.path().join("db.sqlite3").to_string_lossy().into_owned() },
        BackendConfig::Filesystem { root: dir.path().join("fs") },
    ];
    let names: Vec<&str> = configs
        .iter()
        .map(|c| open_backend(c).unwrap().name())
        .collect();
    assert_eq!(names, vec!["kv", "relational", "filesystem"]);

    let parsed: BackendConfig = serde_json::from_str(r#"{"backend":"relational","database":":memory:"}"#).unwrap();
    assert!(matches!(parsed, BackendConfig::Relational { .. }));
}
