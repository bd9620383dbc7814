//! etcd v3 registry backend.
//!
//! # Responsibilities
//! - Map register/unregister onto single-key put/delete
//! - Attach TTL registrations to a lease of that length
//! - Serve lookups with prefix reads
//! - Turn the etcd watch stream into a stream of full listings
//!
//! # Design Decisions
//! - The client is cloned per call; clones share one gRPC channel
//! - A put whose value did not change is not reported as a change
//! - Watch errors end the stream; the caller reconnects

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{
    Client, ConnectOptions, Event, EventType, GetOptions, PutOptions, WatchOptions, WatchStream,
    Watcher,
};
use futures_util::stream::{self, StreamExt};

use crate::observability::metrics;
use crate::registry::codec::KeyCodec;
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::filter::ReadFilter;
use crate::registry::model::{canonical_name, validate_id, validate_name, Endpoint, ServiceRecord};
use crate::registry::snapshot::{encode_value, materialize};
use crate::registry::{Backend, SnapshotStream};

const DEFAULT_ENDPOINT: &str = "127.0.0.1:2379";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry backend over an etcd v3 cluster.
#[derive(Clone)]
pub struct EtcdBackend {
    client: Client,
    codec: KeyCodec,
    filter: ReadFilter,
}

impl EtcdBackend {
    /// Connect to the given cluster members (`host:port`).
    pub async fn connect(hosts: &[String], codec: KeyCodec, filter: ReadFilter) -> RegistryResult<Self> {
        let endpoints: Vec<String> = if hosts.is_empty() {
            vec![DEFAULT_ENDPOINT.to_string()]
        } else {
            hosts.to_vec()
        };

        let options = ConnectOptions::new()
            .with_connect_timeout(CONNECT_TIMEOUT)
            .with_timeout(REQUEST_TIMEOUT)
            .with_keep_alive(Duration::from_secs(30), Duration::from_secs(10));

        let client = Client::connect(&endpoints, Some(options))
            .await
            .map_err(|e| RegistryError::store("connect", e))?;

        tracing::info!(
            endpoints = ?endpoints,
            root = %codec.root_dir(),
            "Connected to etcd"
        );

        Ok(Self {
            client,
            codec,
            filter,
        })
    }

    async fn snapshot(&self, prefix: &str) -> RegistryResult<Vec<ServiceRecord>> {
        let mut client = self.client.clone();
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| RegistryError::store("get", e))?;

        Ok(materialize(
            &self.codec,
            &self.filter,
            response
                .kvs()
                .iter()
                .filter_map(|kv| kv.key_str().ok().map(|key| (key, kv.value()))),
        ))
    }

    fn watch_key(&self, prefix: Option<&str>, recursive: bool) -> String {
        match prefix.filter(|p| !p.trim().is_empty()) {
            Some(name) if recursive => self.codec.encode_dir(name),
            Some(name) => self.codec.encode_nodes_dir(name),
            None => self.codec.root_dir(),
        }
    }

    async fn next_snapshot(
        &self,
        key: &str,
        watcher: Watcher,
        mut events: WatchStream,
    ) -> Option<(RegistryResult<Vec<ServiceRecord>>, Option<(Watcher, WatchStream)>)> {
        loop {
            let response = match events.message().await {
                Ok(Some(response)) => response,
                Ok(None) => {
                    return Some((Err(RegistryError::store("watch", "watch stream closed")), None));
                }
                Err(e) => return Some((Err(RegistryError::store("watch", e)), None)),
            };

            if response.canceled() {
                return Some((Err(RegistryError::store("watch", "watch canceled by server")), None));
            }
            if !response.events().iter().any(is_significant) {
                continue;
            }

            return match self.snapshot(key).await {
                Ok(records) => Some((Ok(records), Some((watcher, events)))),
                Err(e) => Some((Err(e), None)),
            };
        }
    }
}

/// A delete always counts; a put counts when the value is new or changed.
fn is_significant(event: &Event) -> bool {
    match event.event_type() {
        EventType::Delete => true,
        EventType::Put => match (event.kv(), event.prev_kv()) {
            (Some(kv), Some(prev)) => kv.value() != prev.value(),
            _ => true,
        },
    }
}

#[async_trait]
impl Backend for EtcdBackend {
    async fn register(&self, name: &str, endpoint: &Endpoint, ttl: Option<u64>) -> RegistryResult<()> {
        validate_name(name)?;
        endpoint.validate()?;

        let key = self.codec.encode_node(name, &endpoint.id);
        let value = encode_value(endpoint, ttl)?;
        let mut client = self.client.clone();

        let options = match ttl {
            Some(secs) => {
                let lease = client
                    .lease_grant(i64::try_from(secs).unwrap_or(i64::MAX), None)
                    .await
                    .map_err(|e| RegistryError::store("lease_grant", e))?;
                Some(PutOptions::new().with_lease(lease.id()))
            }
            None => None,
        };

        let result = client
            .put(key.as_str(), value, options)
            .await
            .map(|_| ())
            .map_err(|e| RegistryError::store("put", e));
        metrics::record_registry_op("register", result.is_ok());
        result?;

        tracing::debug!(key = %key, ttl = ?ttl, "Registered endpoint");
        Ok(())
    }

    async fn unregister(&self, name: &str, id: &str) -> RegistryResult<()> {
        validate_name(name)?;
        validate_id(id)?;

        let key = self.codec.encode_node(name, id);
        let mut client = self.client.clone();
        let result = client
            .delete(key.as_str(), None)
            .await
            .map_err(|e| RegistryError::store("delete", e));
        metrics::record_registry_op("unregister", result.is_ok());

        if result?.deleted() == 0 {
            tracing::warn!(key = %key, "Unregister key not found, ignoring");
        } else {
            tracing::debug!(key = %key, "Unregistered endpoint");
        }
        Ok(())
    }

    async fn lookup(&self, name: &str) -> RegistryResult<ServiceRecord> {
        validate_name(name)?;

        let name = canonical_name(name);
        let records = self.snapshot(&self.codec.encode_nodes_dir(&name)).await?;
        Ok(records
            .into_iter()
            .find(|record| record.name == name)
            .unwrap_or_else(|| ServiceRecord::empty(name)))
    }

    async fn lookall(&self, prefix: Option<&str>) -> RegistryResult<Vec<ServiceRecord>> {
        self.snapshot(&self.watch_key(prefix, true)).await
    }

    async fn watches(&self, prefix: Option<&str>, recursive: bool) -> RegistryResult<SnapshotStream> {
        let key = self.watch_key(prefix, recursive);
        let mut client = self.client.clone();
        let (watcher, events) = client
            .watch(
                key.as_str(),
                Some(WatchOptions::new().with_prefix().with_prev_key()),
            )
            .await
            .map_err(|e| RegistryError::store("watch", e))?;

        tracing::info!(key = %key, "Watching registry");

        let backend = self.clone();
        let snapshots = stream::unfold(Some((watcher, events)), move |state| {
            let backend = backend.clone();
            let key = key.clone();
            async move {
                let (watcher, events) = state?;
                backend.next_snapshot(&key, watcher, events).await
            }
        });

        Ok(snapshots.boxed())
    }
}
