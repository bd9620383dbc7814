//! Registry behavior through the `Backend` trait, against the memory store.

use std::sync::Arc;

use proxywall::registry::{
    Backend, Endpoint, KeyCodec, MemoryBackend, MemoryStore, NamePattern, NetworkScope, ReadFilter,
};

mod common;

fn endpoint(id: &str, address: &str, network: &str) -> Endpoint {
    Endpoint::new(id, address, 80).unwrap().with_network(network)
}

#[tokio::test]
async fn test_register_overwrites_by_id() {
    let store = MemoryStore::new();
    let backend = common::memory_backend(&store, NetworkScope::Any);

    backend.register("api.test", &endpoint("c1", "10.0.0.1", "front"), None).await.unwrap();
    backend
        .register("api.test", &endpoint("c1", "10.0.0.1", "front").with_weight(7), None)
        .await
        .unwrap();

    let record = backend.lookup("api.test").await.unwrap();
    assert_eq!(record.endpoints.len(), 1);
    assert_eq!(record.endpoints[0].weight, 7);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_unregister_is_idempotent() {
    let store = MemoryStore::new();
    let backend = common::memory_backend(&store, NetworkScope::Any);
    backend.register("api.test", &endpoint("c1", "10.0.0.1", "front"), None).await.unwrap();

    backend.unregister("api.test", "c1").await.unwrap();
    backend.unregister("api.test", "c1").await.unwrap();
    backend.unregister("never.test", "c9").await.unwrap();

    assert!(backend.lookup("api.test").await.unwrap().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_lookall_groups_and_sorts() {
    let store = MemoryStore::new();
    let backend = common::memory_backend(&store, NetworkScope::Any);
    backend.register("web.example.com", &endpoint("b", "10.0.0.2", "front"), None).await.unwrap();
    backend.register("web.example.com", &endpoint("a", "10.0.0.1", "front"), None).await.unwrap();
    backend.register("api.example.com", &endpoint("c", "10.0.0.3", "front"), None).await.unwrap();
    backend.register("api.other.org", &endpoint("d", "10.0.0.4", "front"), None).await.unwrap();

    let all = backend.lookall(None).await.unwrap();
    let names: Vec<_> = all.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["api.example.com", "api.other.org", "web.example.com"]);

    let web = &all[2];
    let ids: Vec<_> = web.endpoints.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    let scoped = backend.lookall(Some("example.com")).await.unwrap();
    assert_eq!(scoped.len(), 2);
    assert!(backend.lookall(Some("missing.net")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_network_filter_between_backends() {
    let store = MemoryStore::new();
    let writer = common::memory_backend(&store, NetworkScope::Any);
    let front_only = common::memory_backend(&store, NetworkScope::only(["front"]));
    let nothing = common::memory_backend(&store, NetworkScope::only(Vec::<String>::new()));

    writer.register("api.test", &endpoint("c1", "10.0.0.1", "front"), None).await.unwrap();
    writer.register("api.test", &endpoint("c2", "10.1.0.1", "back"), None).await.unwrap();
    writer
        .register("api.test", &Endpoint::new("c3", "10.2.0.1", 80).unwrap(), None)
        .await
        .unwrap();

    let ids = |record: proxywall::ServiceRecord| {
        record.endpoints.into_iter().map(|e| e.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(front_only.lookup("api.test").await.unwrap()), vec!["c1", "c3"]);
    assert_eq!(ids(nothing.lookup("api.test").await.unwrap()), vec!["c3"]);
    assert_eq!(ids(writer.lookup("api.test").await.unwrap()), vec!["c1", "c2", "c3"]);
}

#[tokio::test]
async fn test_name_patterns() {
    let store = MemoryStore::new();
    let writer = common::memory_backend(&store, NetworkScope::Any);
    let reader = MemoryBackend::with_store(
        store.clone(),
        KeyCodec::default(),
        ReadFilter::new(NetworkScope::Any, vec![NamePattern::parse("*.example.com")]),
    );

    for name in ["example.com", "api.example.com", "api.other.org"] {
        writer.register(name, &endpoint("c1", "10.0.0.1", "front"), None).await.unwrap();
    }

    let names: Vec<_> = reader.lookall(None).await.unwrap().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["api.example.com"]);
}

#[tokio::test]
async fn test_watch_sees_every_change() {
    let store = MemoryStore::new();
    let backend: Arc<dyn Backend> = Arc::new(common::memory_backend(&store, NetworkScope::Any));
    let mut watch = backend.watches(None, true).await.unwrap();

    backend.register("api.test", &endpoint("c1", "10.0.0.1", "front"), None).await.unwrap();
    let snapshot = common::next_snapshot(&mut watch).await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].contains("c1"));

    backend.unregister("api.test", "c1").await.unwrap();
    let snapshot = common::next_snapshot(&mut watch).await.unwrap();
    assert!(snapshot.is_empty());
}

#[tokio::test]
async fn test_watch_ignores_identical_rewrites() {
    let store = MemoryStore::new();
    let backend = common::memory_backend(&store, NetworkScope::Any);
    backend.register("api.test", &endpoint("c1", "10.0.0.1", "front"), None).await.unwrap();

    let mut watch = backend.watches(None, true).await.unwrap();
    backend.register("api.test", &endpoint("c1", "10.0.0.1", "front"), None).await.unwrap();
    backend.register("api.test", &endpoint("c2", "10.0.0.2", "front"), None).await.unwrap();

    // The identical rewrite produced nothing; the first snapshot already has c2.
    let snapshot = common::next_snapshot(&mut watch).await.unwrap();
    assert!(snapshot[0].contains("c2"));
}

#[tokio::test]
async fn test_watch_respects_network_filter() {
    let store = MemoryStore::new();
    let writer = common::memory_backend(&store, NetworkScope::Any);
    let reader = common::memory_backend(&store, NetworkScope::only(["front"]));
    let mut watch = reader.watches(None, true).await.unwrap();

    writer.register("api.test", &endpoint("c2", "10.1.0.1", "back"), None).await.unwrap();
    let snapshot = common::next_snapshot(&mut watch).await.unwrap();
    assert!(snapshot.is_empty());

    writer.register("api.test", &endpoint("c1", "10.0.0.1", "front"), None).await.unwrap();
    let snapshot = common::next_snapshot(&mut watch).await.unwrap();
    assert_eq!(snapshot[0].endpoints.len(), 1);
    assert_eq!(snapshot[0].endpoints[0].id, "c1");
}

#[tokio::test]
async fn test_non_recursive_watch_skips_subdomains() {
    let store = MemoryStore::new();
    let backend = common::memory_backend(&store, NetworkScope::Any);
    let mut watch = backend.watches(Some("example.com"), false).await.unwrap();

    backend.register("api.example.com", &endpoint("c1", "10.0.0.1", "front"), None).await.unwrap();
    backend.register("example.com", &endpoint("c2", "10.0.0.2", "front"), None).await.unwrap();

    let snapshot = common::next_snapshot(&mut watch).await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "example.com");
}

#[tokio::test]
async fn test_watch_ends_with_error_when_store_fails() {
    let store = MemoryStore::new();
    let backend = common::memory_backend(&store, NetworkScope::Any);
    let mut watch = backend.watches(None, true).await.unwrap();

    store.set_available(false);
    let result = common::next_snapshot(&mut watch).await;
    assert!(result.is_err());

    use futures_util::StreamExt;
    assert!(watch.next().await.is_none());
    assert!(backend.watches(None, true).await.is_err());
}

#[tokio::test]
async fn test_lookup_accepts_non_canonical_names() {
    let store = MemoryStore::new();
    let backend = common::memory_backend(&store, NetworkScope::Any);

    backend.register("api.test.", &endpoint("c1", "10.0.0.1", "front"), None).await.unwrap();
    assert_eq!(store.len(), 1);

    for name in ["api.test.", " api.test", "api..test", "api.test"] {
        let record = backend.lookup(name).await.unwrap();
        assert_eq!(record.name, "api.test");
        assert!(record.contains("c1"), "lookup({:?}) missed the endpoint", name);
    }

    backend.unregister(" api..test", "c1").await.unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_reserved_marker_label_is_rejected() {
    let store = MemoryStore::new();
    let backend = common::memory_backend(&store, NetworkScope::Any);

    let err = backend
        .register("@nodes.example.com", &endpoint("c1", "10.0.0.1", "front"), None)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unregister_removes_endpoints_hidden_by_filter() {
    let store = MemoryStore::new();
    let writer = common::memory_backend(&store, NetworkScope::Any);
    let front_only = common::memory_backend(&store, NetworkScope::only(["front"]));

    writer.register("api.test", &endpoint("c2", "10.1.0.1", "back"), None).await.unwrap();
    assert!(front_only.lookup("api.test").await.unwrap().is_empty());

    front_only.unregister("api.test", "c2").await.unwrap();
    assert!(store.is_empty());
    assert!(writer.lookup("api.test").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_last_watch_snapshot_matches_lookall() {
    use futures_util::StreamExt;
    use std::time::Duration;

    let store = MemoryStore::new();
    let backend: Arc<dyn Backend> = Arc::new(common::memory_backend(&store, NetworkScope::Any));
    let mut watch = backend.watches(None, true).await.unwrap();

    for i in 0..10u16 {
        let name = if i % 2 == 0 { "api.test" } else { "web.example.com" };
        let id = format!("c{}", i);
        let ip = format!("10.0.0.{}", i + 1);
        backend.register(name, &endpoint(&id, &ip, "front"), None).await.unwrap();
        if i % 3 == 0 {
            backend.unregister(name, &id).await.unwrap();
        }
    }

    let mut last = None;
    while let Ok(Some(snapshot)) = tokio::time::timeout(Duration::from_millis(200), watch.next()).await {
        last = Some(snapshot.unwrap());
    }

    let expected = backend.lookall(None).await.unwrap();
    assert!(!expected.is_empty());
    assert_eq!(last, Some(expected));
}
