use std::sync::Arc;
use std::time::Duration;

use authstore::cache::CachePolicy;
use authstore::error::AppError;
use authstore::models::{GeneralDocument, LicenseDocument};
use authstore::remote::MemoryRemote;
use authstore::store::{DocumentStore, Outcome};

fn store_with(
    remote: &Arc<MemoryRemote>,
    policy: CachePolicy,
) -> DocumentStore<GeneralDocument> {
    DocumentStore::new(remote.clone(), policy, 3)
}

#[tokio::test]
async fn test_reads_within_ttl_fetch_once() {
    let remote = Arc::new(MemoryRemote::with_content(r#"{"users": []}"#));
    let store = store_with(&remote, CachePolicy::with_ttl(Duration::from_millis(200)));

    for _ in 0..5 {
        store.document().await.unwrap();
    }
    assert_eq!(remote.fetch_count(), 1);
    assert!(store.cache_status().cached);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(store.cache_status().stale);
    store.document().await.unwrap();
    assert_eq!(remote.fetch_count(), 2);
}

#[tokio::test]
async fn test_write_grace_forces_fresh_reads() {
    let remote = Arc::new(MemoryRemote::new());
    let policy = CachePolicy {
        ttl: Duration::from_secs(60),
        write_grace: Duration::from_millis(300),
        settle_delay: Duration::ZERO,
    };
    let store = store_with(&remote, policy);

    store
        .transact("seed", |doc| {
            doc.owner_id = Some("owner@example.com".into());
            Ok(Outcome::Commit(()))
        })
        .await
        .unwrap();
    // initial read plus the confirming re-fetch
    assert_eq!(remote.fetch_count(), 2);

    store.document().await.unwrap();
    store.document().await.unwrap();
    assert_eq!(remote.fetch_count(), 4);

    tokio::time::sleep(Duration::from_millis(350)).await;
    store.document().await.unwrap();
    let after_grace = remote.fetch_count();
    store.document().await.unwrap();
    assert_eq!(remote.fetch_count(), after_grace);
}

#[tokio::test]
async fn test_write_is_visible_to_next_read() {
    let remote = Arc::new(MemoryRemote::new());
    let store = store_with(&remote, CachePolicy::with_ttl(Duration::from_secs(60)));

    store.document().await.unwrap();
    store
        .transact("set owner", |doc| {
            doc.owner_id = Some("a@b.c".into());
            Ok(Outcome::Commit(()))
        })
        .await
        .unwrap();

    let doc = store.document().await.unwrap();
    assert_eq!(doc.owner_id.as_deref(), Some("a@b.c"));
}

#[tokio::test]
async fn test_missing_document_reads_as_empty() {
    let remote = Arc::new(MemoryRemote::new());
    let store: DocumentStore<LicenseDocument> =
        DocumentStore::new(remote.clone(), CachePolicy::default(), 3);

    let snapshot = store.snapshot().await.unwrap();
    assert!(snapshot.sha.is_none());
    assert!(snapshot.document.licenses.is_empty());
}

#[tokio::test]
async fn test_malformed_document_reads_as_empty() {
    let remote = Arc::new(MemoryRemote::with_content("{ this is not json"));
    let store = store_with(&remote, CachePolicy::default());

    let snapshot = store.snapshot().await.unwrap();
    assert!(snapshot.document.users.is_empty());
    assert!(snapshot.degraded);
    assert_eq!(snapshot.sha, remote.sha());

    let err = store
        .transact("overwrite", |doc| {
            doc.owner_id = Some("a@b.c".into());
            Ok(Outcome::Commit(()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Invariant(_)));
    assert_eq!(remote.write_count(), 0);
    assert_eq!(remote.contents().as_deref(), Some(b"{ this is not json".as_slice()));
}

#[tokio::test]
async fn test_bad_record_dropped_from_reads_and_blocks_writes() {
    let remote = Arc::new(MemoryRemote::with_content(
        r#"{
            "applications": [
                {"id": "app-1", "userId": "a@b.c", "name": "One", "apiKey": "k1"},
                {"id": "app-2", "userId": "a@b.c", "name": "Two", "apiKey": "k2"}
            ],
            "appUsers": [{"id": "u-1", "applicationId": "app-1", "username": 5}]
        }"#,
    ));
    let store = store_with(&remote, CachePolicy::with_ttl(Duration::from_secs(60)));

    let snapshot = store.snapshot().await.unwrap();
    assert!(snapshot.degraded);
    assert_eq!(snapshot.document.applications.len(), 2);
    assert!(snapshot.document.app_users.is_empty());

    let skipped = store
        .transact("read only", |doc| Ok(Outcome::Skip(doc.applications.len())))
        .await
        .unwrap();
    assert_eq!(skipped, 2);

    let err = store
        .transact("add owner", |doc| {
            doc.owner_id = Some("a@b.c".into());
            Ok(Outcome::Commit(()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Invariant(_)));
    assert_eq!(remote.write_count(), 0);
}

#[tokio::test]
async fn test_invalidate_and_refresh() {
    let remote = Arc::new(MemoryRemote::with_content("{}"));
    let store = store_with(&remote, CachePolicy::with_ttl(Duration::from_secs(60)));

    store.document().await.unwrap();
    store.invalidate();
    assert!(!store.cache_status().cached);
    store.document().await.unwrap();
    assert_eq!(remote.fetch_count(), 2);

    remote.overwrite(r#"{"owner_id": "new@owner.io"}"#);
    let cached = store.document().await.unwrap();
    assert!(cached.owner_id.is_none());

    let fresh = store.refresh().await.unwrap();
    assert_eq!(fresh.document.owner_id.as_deref(), Some("new@owner.io"));
    assert_eq!(remote.fetch_count(), 3);
}
