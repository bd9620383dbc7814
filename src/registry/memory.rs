//! In-process registry store.
//!
//! Uses the same key layout, value format and watch semantics as the etcd
//! backend. Several `MemoryBackend`s may share one `MemoryStore`, each with its
//! own read filter, the way several processes share one etcd cluster.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::registry::codec::KeyCodec;
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::filter::ReadFilter;
use crate::registry::model::{canonical_name, validate_id, validate_name, Endpoint, ServiceRecord};
use crate::registry::snapshot::{encode_value, materialize};
use crate::registry::{Backend, SnapshotStream};

/// What a change notification covers.
#[derive(Debug, Clone)]
enum Change {
    Key(String),
    /// Expiry or availability change; every watcher re-reads.
    All,
}

impl Change {
    fn touches(&self, prefix: &str) -> bool {
        match self {
            Change::Key(key) => key.starts_with(prefix),
            Change::All => true,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// Shared key/value state with change notification.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Entry>>,
    available: AtomicBool,
    changes: broadcast::Sender<Change>,
    /// Handle for expiry timers, which must not keep the store alive.
    this: Weak<MemoryStore>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(64);
        Arc::new_cyclic(|this| Self {
            entries: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            changes,
            this: this.clone(),
        })
    }

    /// Simulate the store becoming unreachable (or reachable again).
    ///
    /// While unavailable every operation fails with a store error and open
    /// watches terminate with an error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        self.notify(Change::All);
    }

    /// Number of raw keys, including entries hidden by read filters.
    pub fn len(&self) -> usize {
        let mut entries = self.lock();
        Self::purge_expired(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        // A poisoned map is still structurally valid.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self, op: &'static str) -> RegistryResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RegistryError::store(op, "store unavailable"))
        }
    }

    fn notify(&self, change: Change) {
        let _ = self.changes.send(change);
    }

    /// Purge at `deadline` so idle watchers see the expiry, like an etcd
    /// lease revocation.
    fn schedule_expiry(&self, deadline: Instant) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.this.clone();
        runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(store) = store.upgrade() else {
                return;
            };
            let expired = Self::purge_expired(&mut store.lock());
            if expired {
                tracing::debug!("Expired registry entries purged");
                store.notify(Change::All);
            }
        });
    }

    fn purge_expired(entries: &mut BTreeMap<String, Entry>) -> bool {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at.map(|at| at > now).unwrap_or(true));
        entries.len() != before
    }

    fn put(&self, key: String, value: String, ttl: Option<u64>) -> RegistryResult<()> {
        self.check_available("put")?;
        let mut entries = self.lock();
        let expired = Self::purge_expired(&mut entries);
        let expires_at = ttl.map(|secs| Instant::now() + Duration::from_secs(secs));
        let changed = entries
            .get(&key)
            .map(|previous| previous.value != value)
            .unwrap_or(true);
        entries.insert(key.clone(), Entry { value, expires_at });
        drop(entries);

        if let Some(deadline) = expires_at {
            self.schedule_expiry(deadline);
        }

        if expired {
            self.notify(Change::All);
        }
        if changed {
            self.notify(Change::Key(key));
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> RegistryResult<bool> {
        self.check_available("delete")?;
        let mut entries = self.lock();
        let expired = Self::purge_expired(&mut entries);
        let removed = entries.remove(key).is_some();
        drop(entries);

        if expired {
            self.notify(Change::All);
        }
        if removed {
            self.notify(Change::Key(key.to_string()));
        }
        Ok(removed)
    }

    fn scan(&self, prefix: &str) -> RegistryResult<Vec<(String, String)>> {
        self.check_available("get")?;
        let mut entries = self.lock();
        let expired = Self::purge_expired(&mut entries);
        let found = entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect();
        drop(entries);

        if expired {
            self.notify(Change::All);
        }
        Ok(found)
    }
}

/// Registry backend over a `MemoryStore`.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
    codec: KeyCodec,
    filter: ReadFilter,
}

impl MemoryBackend {
    /// Backend over a fresh, private store.
    pub fn new(codec: KeyCodec, filter: ReadFilter) -> Self {
        Self::with_store(MemoryStore::new(), codec, filter)
    }

    pub fn with_store(store: Arc<MemoryStore>, codec: KeyCodec, filter: ReadFilter) -> Self {
        Self {
            store,
            codec,
            filter,
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    fn snapshot(&self, prefix: &str) -> RegistryResult<Vec<ServiceRecord>> {
        let entries = self.store.scan(prefix)?;
        Ok(materialize(
            &self.codec,
            &self.filter,
            entries.iter().map(|(k, v)| (k.as_str(), v.as_bytes())),
        ))
    }

    fn watch_key(&self, prefix: Option<&str>, recursive: bool) -> String {
        match prefix.filter(|p| !p.trim().is_empty()) {
            Some(name) if recursive => self.codec.encode_dir(name),
            Some(name) => self.codec.encode_nodes_dir(name),
            None => self.codec.root_dir(),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn register(&self, name: &str, endpoint: &Endpoint, ttl: Option<u64>) -> RegistryResult<()> {
        validate_name(name)?;
        endpoint.validate()?;

        let key = self.codec.encode_node(name, &endpoint.id);
        let value = encode_value(endpoint, ttl)?;
        let result = self.store.put(key, value, ttl);
        metrics::record_registry_op("register", result.is_ok());
        result
    }

    async fn unregister(&self, name: &str, id: &str) -> RegistryResult<()> {
        validate_name(name)?;
        validate_id(id)?;

        let key = self.codec.encode_node(name, id);
        let result = self.store.delete(&key);
        metrics::record_registry_op("unregister", result.is_ok());
        if !result? {
            tracing::warn!(key = %key, "Unregister key not found, ignoring");
        }
        Ok(())
    }

    async fn lookup(&self, name: &str) -> RegistryResult<ServiceRecord> {
        validate_name(name)?;

        let name = canonical_name(name);
        let records = self.snapshot(&self.codec.encode_nodes_dir(&name))?;
        Ok(records
            .into_iter()
            .find(|record| record.name == name)
            .unwrap_or_else(|| ServiceRecord::empty(name)))
    }

    async fn lookall(&self, prefix: Option<&str>) -> RegistryResult<Vec<ServiceRecord>> {
        self.snapshot(&self.watch_key(prefix, true))
    }

    async fn watches(&self, prefix: Option<&str>, recursive: bool) -> RegistryResult<SnapshotStream> {
        self.store.check_available("watch")?;
        let key = self.watch_key(prefix, recursive);
        let changes = self.store.changes.subscribe();
        let backend = self.clone();

        let snapshots = stream::unfold(Some(changes), move |changes| {
            let backend = backend.clone();
            let key = key.clone();
            async move {
                let mut changes = changes?;
                loop {
                    match changes.recv().await {
                        Ok(change) if change.touches(&key) => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => {
                            return Some((Err(RegistryError::store("watch", "store closed")), None));
                        }
                    }
                }
                // Coalesce notifications that piled up while we were away.
                while changes.try_recv().is_ok() {}

                match backend.snapshot(&key) {
                    Ok(records) => Some((Ok(records), Some(changes))),
                    Err(e) => Some((Err(e), None)),
                }
            }
        });

        Ok(snapshots.boxed())
    }
}
