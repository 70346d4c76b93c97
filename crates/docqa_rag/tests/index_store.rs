use std::fs;

use docqa_core::domain::{Chunk, UNKNOWN_SOURCE};
use docqa_core::error::codes;
use docqa_rag::chunking::chunk_document;
use docqa_rag::index::persist::{chunks_path, metadata_path};
use docqa_rag::index::{IndexStore, CHUNK_SEPARATOR};
use pretty_assertions::assert_eq;

const DOC: &str = "Pumps rated at 50 L/min. Maximum pressure is 10 bar. Install with 2 bolts. \
Service the seals every 500 hours. Use only approved lubricant.";

fn doc_chunks(source: &str) -> Vec<Chunk> {
    chunk_document(DOC, source, 60, 10)
}

#[test]
fn add_is_append_only() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = IndexStore::open(tmp.path().join("index"));
    let chunks = doc_chunks("pump.md");
    let n = chunks.len();
    assert!(n >= 2);

    assert_eq!(store.add(chunks.clone()).expect("add"), n);
    assert_eq!(store.add(chunks).expect("add again"), n);
    assert_eq!(store.len(), 2 * n);
}

#[test]
fn clear_then_reingest_resets_count() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = IndexStore::open(tmp.path().join("index"));
    store.add(doc_chunks("pump.md")).expect("add");
    store.add(doc_chunks("pump.md")).expect("add");

    store.clear().expect("clear");
    assert!(store.is_empty());
    let n = store.add(doc_chunks("pump.md")).expect("add");
    assert_eq!(store.len(), n);

    let reopened = IndexStore::open(tmp.path().join("index"));
    assert_eq!(reopened.len(), n);
}

#[test]
fn persisted_index_reloads_identically() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("index");
    let store = IndexStore::open(dir.clone());
    store.add(doc_chunks("pump.md")).expect("add");
    store.add(vec![Chunk::new("Valve torque is 40 Nm.", "valve.txt", 0)]).expect("add");

    let reopened = IndexStore::open(dir.clone());
    assert_eq!(reopened.snapshot(), store.snapshot());

    let raw = fs::read_to_string(chunks_path(&dir)).expect("read chunks");
    assert!(raw.ends_with(&format!("Valve torque is 40 Nm.\n{CHUNK_SEPARATOR}\n")));
    assert_eq!(raw.matches(CHUNK_SEPARATOR).count(), store.len());
}

#[test]
fn missing_metadata_defaults_sources_to_unknown() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("index");
    let store = IndexStore::open(dir.clone());
    let n = store.add(doc_chunks("pump.md")).expect("add");
    fs::remove_file(metadata_path(&dir)).expect("remove metadata");

    let reopened = IndexStore::open(dir);
    let snap = reopened.snapshot();
    assert_eq!(snap.len(), n);
    assert!(snap.chunks().iter().all(|c| c.source == UNKNOWN_SOURCE));
}

#[test]
fn hand_written_metadata_without_fingerprints_is_accepted() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("index");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(
        chunks_path(&dir),
        format!("alpha text\n{CHUNK_SEPARATOR}\nbeta text\n{CHUNK_SEPARATOR}\ngamma text\n{CHUNK_SEPARATOR}\n"),
    )
    .expect("write chunks");
    fs::write(
        metadata_path(&dir),
        r#"[{"source":"a.txt"},{"source":"b.txt"},{"source":"a.txt"}]"#,
    )
    .expect("write metadata");

    let store = IndexStore::open(dir);
    assert_eq!(
        store.snapshot().chunks().to_vec(),
        vec![
            Chunk::new("alpha text", "a.txt", 0),
            Chunk::new("beta text", "b.txt", 0),
            Chunk::new("gamma text", "a.txt", 1),
        ]
    );
}

#[test]
fn corrupt_artifacts_load_as_empty() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("index");
    let store = IndexStore::open(dir.clone());
    store.add(doc_chunks("pump.md")).expect("add");

    // Undecodable metadata.
    let good_meta = fs::read(metadata_path(&dir)).expect("read metadata");
    fs::write(metadata_path(&dir), b"{not json").expect("write");
    assert!(IndexStore::open(dir.clone()).is_empty());

    // Misaligned metadata.
    fs::write(metadata_path(&dir), r#"[{"source":"pump.md"}]"#).expect("write");
    assert!(IndexStore::open(dir.clone()).is_empty());

    // Chunk text edited behind the fingerprint's back.
    fs::write(metadata_path(&dir), good_meta).expect("restore");
    assert!(!IndexStore::open(dir.clone()).is_empty());
    let raw = fs::read_to_string(chunks_path(&dir)).expect("read chunks");
    fs::write(chunks_path(&dir), raw.replacen("10 bar", "99 bar", 1)).expect("write");
    assert!(IndexStore::open(dir).is_empty());
}

#[test]
fn load_replaces_memory_with_disk_state() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("index");
    let a = IndexStore::open(dir.clone());
    let b = IndexStore::open(dir);

    let n = a.add(doc_chunks("pump.md")).expect("add");
    assert!(b.is_empty());
    assert_eq!(b.load(), n);
    assert_eq!(b.len(), n);
}

#[test]
fn failed_write_keeps_in_memory_state() {
    let tmp = tempfile::tempdir().expect("tempdir");
    // A regular file where the index directory should be.
    let blocked = tmp.path().join("index");
    fs::write(&blocked, b"not a directory").expect("write");

    let store = IndexStore::empty(blocked);
    let chunks = doc_chunks("pump.md");
    let n = chunks.len();
    let err = store.add(chunks).expect_err("write must fail");
    assert_eq!(err.code, codes::INDEX_WRITE_FAILED);
    assert_eq!(store.len(), n);
}

#[test]
fn invalid_chunks_are_rejected_before_any_change() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = IndexStore::open(tmp.path().join("index"));
    store.add(doc_chunks("pump.md")).expect("add");
    let before = store.len();

    let err = store
        .add(vec![
            Chunk::new("fine", "x.txt", 0),
            Chunk::new(format!("bad {CHUNK_SEPARATOR} text"), "x.txt", 1),
        ])
        .expect_err("separator must be rejected");
    assert_eq!(err.code, codes::INGESTION_FAILED);

    let err = store
        .add(vec![Chunk::new("   ", "x.txt", 0)])
        .expect_err("blank chunk must be rejected");
    assert_eq!(err.code, codes::INGESTION_FAILED);
    assert_eq!(store.len(), before);
}

#[test]
fn replace_source_swaps_one_source_to_the_end() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = IndexStore::open(tmp.path().join("index"));
    store.add(vec![Chunk::new("old a", "a.txt", 0)]).expect("add");
    store.add(vec![Chunk::new("only b", "b.txt", 0)]).expect("add");

    store
        .replace_source("a.txt", vec![Chunk::new("new a 0", "a.txt", 0), Chunk::new("new a 1", "a.txt", 1)])
        .expect("replace");

    let texts: Vec<String> = store
        .snapshot()
        .chunks()
        .iter()
        .map(|c| c.text.clone())
        .collect();
    assert_eq!(texts, vec!["only b", "new a 0", "new a 1"]);
}

#[test]
fn readers_only_ever_see_complete_snapshots() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use docqa_rag::retrieve::{KeywordBackend, RetrievalBackend};

    let state_a: Vec<Chunk> = (0..3)
        .map(|i| Chunk::new(format!("Pressure rating {i} for pump A."), "a.md", i))
        .collect();
    let state_b: Vec<Chunk> = (0..7)
        .map(|i| Chunk::new(format!("Pressure rating {i} for pump B."), "b.md", i))
        .collect();

    let tmp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(IndexStore::open(tmp.path().join("index")));
    store.rebuild(state_a.clone()).expect("seed");
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = Arc::clone(&store);
        let stop = Arc::clone(&stop);
        let (a, b) = (state_a.clone(), state_b.clone());
        thread::spawn(move || {
            for round in 0..60 {
                let next = if round % 2 == 0 { b.clone() } else { a.clone() };
                store.rebuild(next).expect("rebuild");
            }
            stop.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let stop = Arc::clone(&stop);
            let (a, b) = (state_a.clone(), state_b.clone());
            thread::spawn(move || {
                let backend = KeywordBackend::new(Arc::clone(&store));
                let mut observed = 0usize;
                while !stop.load(Ordering::SeqCst) || observed == 0 {
                    let snap = store.snapshot();
                    let chunks = snap.chunks();
                    assert!(chunks == a.as_slice() || chunks == b.as_slice(), "partial snapshot: {chunks:?}");
                    assert_eq!(snap.len(), chunks.len());
                    assert_eq!(snap.sources().len(), 1);

                    let hits = backend.retrieve("pressure rating", 10).expect("retrieve");
                    assert!(hits.len() == a.len() || hits.len() == b.len());
                    let source = &hits[0].chunk.source;
                    assert!(hits.iter().all(|h| &h.chunk.source == source));
                    observed += 1;
                }
                observed
            })
        })
        .collect();

    writer.join().expect("writer");
    for reader in readers {
        assert!(reader.join().expect("reader") > 0);
    }

    let reopened = IndexStore::open(tmp.path().join("index"));
    assert_eq!(reopened.snapshot().chunks(), state_a.as_slice());
}

#[test]
fn failed_metadata_write_leaves_previous_pair_on_disk() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("index");
    let store = IndexStore::open(dir.clone());
    let n = store.add(doc_chunks("pump.md")).expect("add");
    let chunks_before = fs::read_to_string(chunks_path(&dir)).expect("read chunks");

    // A directory squatting on the metadata tmp path makes that write fail.
    fs::create_dir_all(metadata_path(&dir).with_extension("tmp")).expect("mkdir");
    let err = store
        .add(vec![Chunk::new("Valve torque is 40 Nm.", "valve.txt", 0)])
        .expect_err("metadata write must fail");
    assert_eq!(err.code, codes::INDEX_WRITE_FAILED);
    assert_eq!(store.len(), n + 1);

    assert_eq!(fs::read_to_string(chunks_path(&dir)).expect("read chunks"), chunks_before);
    assert!(!chunks_path(&dir).with_extension("tmp").exists());
    assert_eq!(IndexStore::open(dir).len(), n);
}
