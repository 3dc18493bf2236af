use super::*;
use tempfile::TempDir;

async fn open_store(dir: &TempDir, namespace: &str) -> SqliteCacheStore {
    SqliteCacheStore::open(dir.path().join("query_cache.db"), namespace)
        .await
        .expect("should open cache store")
}

#[tokio::test]
async fn set_then_get_returns_value() {
    let dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&dir, "sql_cache").await;

    store
        .set("abc", "[{\"n\":3}]", Duration::from_secs(60))
        .await
        .expect("should write");
    let value = store.get("abc").await.expect("should read");
    assert_eq!(value.as_deref(), Some("[{\"n\":3}]"));
    assert_eq!(store.get("other").await.expect("should read"), None);
}

#[tokio::test]
async fn overwrite_replaces_value() {
    let dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&dir, "sql_cache").await;

    store.set("k", "old", Duration::from_secs(60)).await.expect("should write");
    store.set("k", "new", Duration::from_secs(60)).await.expect("should write");
    assert_eq!(store.get("k").await.expect("should read").as_deref(), Some("new"));
}

#[tokio::test]
async fn expired_entries_are_invisible() {
    let dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&dir, "sql_cache").await;

    store.set("k", "v", Duration::ZERO).await.expect("should write");
    assert_eq!(store.get("k").await.expect("should read"), None);
    assert_eq!(store.purge_expired().await.expect("should purge"), 1);
}

#[tokio::test]
async fn clear_only_touches_own_namespace() {
    let dir = TempDir::new().expect("should create temp dir");
    let ours = open_store(&dir, "sql_cache").await;
    let theirs = open_store(&dir, "other_cache").await;

    ours.set("a", "1", Duration::from_secs(60)).await.expect("should write");
    ours.set("b", "2", Duration::from_secs(60)).await.expect("should write");
    theirs.set("a", "x", Duration::from_secs(60)).await.expect("should write");

    assert_eq!(ours.clear().await.expect("should clear"), 2);
    assert_eq!(ours.get("a").await.expect("should read"), None);
    assert_eq!(theirs.get("a").await.expect("should read").as_deref(), Some("x"));
}

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = TempDir::new().expect("should create temp dir");
    {
        let store = open_store(&dir, "sql_cache").await;
        store.set("k", "v", Duration::from_secs(60)).await.expect("should write");
    }
    let reopened = open_store(&dir, "sql_cache").await;
    assert_eq!(reopened.get("k").await.expect("should read").as_deref(), Some("v"));
}
