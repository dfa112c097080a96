/// Audit Trail Tests
///
/// These tests verify capped retention of entity snapshots. Tests include:
/// - Sequential mutations keep exactly min(N, cap) snapshots
/// - Retrieval is newest first for both the full and sliced readers
/// - Concurrent writers never push a trail past its cap
/// - First-write races create a single container
use scribe_db::audit::{AUDIT_ITEMS_FIELD, AuditTrail};
use scribe_db::query::Predicate;
use scribe_db::storage::{DocumentStore, FindOptions, MemoryStore, SledStore};
use scribe_db::{Document, Value};
use std::sync::Arc;
use tokio::task::JoinSet;

const AUDIT: &str = "cardsAudit";

fn snapshot(id: &str, version: i64) -> Document {
    Document::with_id(id).field("Version", version)
}

fn versions(docs: &[Document]) -> Vec<i64> {
    docs.iter()
        .filter_map(|d| d.get_path("Version").and_then(|v| v.as_i64()))
        .collect()
}

async fn stored_len(store: &dyn DocumentStore, id: &str) -> usize {
    store
        .find_one(AUDIT, &Predicate::eq("_id", id), &FindOptions::new())
        .await
        .unwrap()
        .and_then(|doc| doc.get_path(AUDIT_ITEMS_FIELD))
        .and_then(|items| items.as_array().map(Vec::len))
        .unwrap_or(0)
}

#[tokio::test]
async fn test_sequential_mutations_hold_min_n_cap() {
    for n in [1i64, 3, 5, 6, 12] {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(Arc::clone(&store));
        for v in 1..=n {
            trail.record(AUDIT, &snapshot("X", v), 5).await.unwrap();
        }

        assert_eq!(stored_len(store.as_ref(), "X").await, n.min(5) as usize, "n = {n}");

        let result = trail.retrieve_full::<Document>(AUDIT, "X", 0, 100).await.unwrap();
        let expected: Vec<i64> = (1..=n).rev().take(5).collect();
        assert_eq!(versions(&result.results), expected, "n = {n}");
    }
}

#[tokio::test]
async fn test_storage_keeps_newest_last() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let trail = AuditTrail::new(Arc::clone(&store));
    for v in 1..=4 {
        trail.record(AUDIT, &snapshot("X", v), 3).await.unwrap();
    }
    let doc = store
        .find_one(AUDIT, &Predicate::eq("_id", "X"), &FindOptions::new())
        .await
        .unwrap()
        .unwrap();
    let stored: Vec<i64> = doc
        .get_path(AUDIT_ITEMS_FIELD)
        .and_then(|v| v.as_array().cloned())
        .unwrap()
        .iter()
        .filter_map(|item| match item {
            Value::Object(map) => map.get("Version").and_then(Value::as_i64),
            _ => None,
        })
        .collect();
    assert_eq!(stored, vec![2, 3, 4]);
}

#[tokio::test]
async fn test_sliced_and_full_readers_agree() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let trail = AuditTrail::new(store);
    for v in 1..=20 {
        trail.record(AUDIT, &snapshot("X", v), 0).await.unwrap();
    }

    for (start_at, page_size) in [(0, 5), (5, 5), (15, 10), (18, 4)] {
        let full = trail
            .retrieve_full::<Document>(AUDIT, "X", start_at, page_size)
            .await
            .unwrap();
        let sliced = trail
            .retrieve_sliced::<Document>(AUDIT, "X", start_at, page_size)
            .await
            .unwrap();
        assert_eq!(
            versions(&full.results),
            versions(&sliced.results),
            "window {start_at}+{page_size}"
        );
        assert_eq!(full.total_count, 20);
    }
}

async fn hammer(store: Arc<dyn DocumentStore>, writers: usize, writes: usize, cap: usize) {
    let trail = AuditTrail::new(Arc::clone(&store));
    let mut tasks = JoinSet::new();
    for writer in 0..writers {
        let trail = trail.clone();
        tasks.spawn(async move {
            for i in 0..writes {
                let version = (writer * writes + i) as i64;
                trail.record(AUDIT, &snapshot("shared", version), cap).await.unwrap();
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_writers_respect_cap_in_memory() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    hammer(Arc::clone(&store), 16, 25, 5).await;

    assert_eq!(stored_len(store.as_ref(), "shared").await, 5);
    assert_eq!(store.count(AUDIT, &Predicate::All).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_writers_respect_cap_in_sled() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(SledStore::open(dir.path()).unwrap());
    hammer(Arc::clone(&store), 8, 20, 7).await;

    assert_eq!(stored_len(store.as_ref(), "shared").await, 7);
    assert_eq!(store.count(AUDIT, &Predicate::All).await.unwrap(), 1);
}

#[tokio::test]
async fn test_trails_are_independent_per_entity() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let trail = AuditTrail::new(Arc::clone(&store));
    for v in 1..=3 {
        trail.record(AUDIT, &snapshot("A", v), 2).await.unwrap();
        trail.record(AUDIT, &snapshot("B", v * 10), 2).await.unwrap();
    }
    let a = trail.retrieve_full::<Document>(AUDIT, "A", 0, 10).await.unwrap();
    let b = trail.retrieve_full::<Document>(AUDIT, "B", 0, 10).await.unwrap();
    assert_eq!(versions(&a.results), vec![3, 2]);
    assert_eq!(versions(&b.results), vec![30, 20]);
}
