use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use datamart_core::corpus::MemoryCorpus;
use datamart_core::indexer::Indexer;
use datamart_core::storage::{FsBackend, KvBackend, SqlBackend, StorageBackend};
use tempfile::TempDir;

const KINDS: [&str; 3] = ["kv", "relational", "filesystem"];

const PASSAGE: &str = "Call me Ishmael. Some years ago, never mind how long precisely, having little \
or no money in my purse, and nothing particular to interest me on shore, I thought I would sail \
about a little and see the watery part of the world.";

// The tempdir must outlive the filesystem backend.
fn open(kind: &str) -> (TempDir, Box<dyn StorageBackend>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend: Box<dyn StorageBackend> = match kind {
        "kv" => Box::new(KvBackend::temporary().expect("kv store")),
        "relational" => Box::new(SqlBackend::in_memory().expect("sqlite")),
        _ => Box::new(FsBackend::open(dir.path()).expect("fs store")),
    };
    (dir, backend)
}

fn corpus(n: usize) -> MemoryCorpus {
    let mut corpus = MemoryCorpus::new();
    for i in 0..n {
        let body = if i % 3 == 0 { PASSAGE.to_string() } else { format!("{PASSAGE} whale harpoon") };
        corpus.insert(format!("{i}"), format!("Title: Voyage {i}\nAuthor: Anon"), body);
    }
    corpus
}

fn bench_index_document(c: &mut Criterion) {
    let corpus = corpus(1);
    let mut group = c.benchmark_group("index_document");
    for kind in KINDS {
        let (_dir, backend) = open(kind);
        let indexer = Indexer::new(&*backend, &corpus);
        let record = indexer.process_document("0").expect("record");
        group.bench_with_input(BenchmarkId::from_parameter(kind), &record, |b, record| {
            b.iter(|| indexer.index_document(record))
        });
    }
    group.finish();
}

fn bench_index_all(c: &mut Criterion) {
    let corpus = corpus(50);
    let mut group = c.benchmark_group("index_all");
    group.sample_size(10);
    for kind in KINDS {
        group.bench_function(BenchmarkId::from_parameter(kind), |b| {
            b.iter_batched(
                || open(kind),
                |(_dir, backend)| Indexer::new(&*backend, &corpus).index_all(false),
                BatchSize::PerIteration,
            )
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let corpus = corpus(200);
    let stores: Vec<_> = KINDS.iter().map(|kind| (*kind, open(kind))).collect();
    for (_, (_, backend)) in &stores {
        Indexer::new(&**backend, &corpus).index_all(false).expect("index corpus");
    }

    for (name, query) in [("search_one_term", "whale"), ("search_two_terms", "ishmael harpoon")] {
        let mut group = c.benchmark_group(name);
        for (kind, (_, backend)) in &stores {
            let indexer = Indexer::new(&**backend, &corpus);
            group.bench_with_input(BenchmarkId::from_parameter(kind), query, |b, q| b.iter(|| indexer.search(q)));
        }
        group.finish();
    }
}

criterion_group!(benches, bench_index_document, bench_index_all, bench_search);
criterion_main!(benches);
