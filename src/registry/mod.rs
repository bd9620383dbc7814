//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Write side (agent):
//!     register / unregister
//!     → model.rs (validate name, endpoint)
//!     → codec.rs (name + id → store key)
//!     → snapshot.rs (endpoint → sorted JSON value)
//!     → store put / delete (single key, optional TTL)
//!
//! Read side (daemon, client):
//!     lookup / lookall / watches
//!     → store prefix read
//!     → codec.rs (key → name, id; skip non-endpoint keys)
//!     → filter.rs (network scope, name patterns)
//!     → ServiceRecord per name, sorted
//! ```
//!
//! # Design Decisions
//! - One capability trait, one variant per store type
//! - Each endpoint owns a unique key, so no multi-key transactions or client locking
//! - Not-found is an empty result, never an error
//! - Watches emit full listings, not diffs

pub mod backend_url;
pub mod codec;
pub mod error;
pub mod etcd;
pub mod filter;
pub mod memory;
pub mod model;
mod snapshot;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub use backend_url::BackendUrl;
pub use codec::KeyCodec;
pub use error::{RegistryError, RegistryResult, ValidationError};
pub use etcd::EtcdBackend;
pub use filter::{NamePattern, NetworkScope, ReadFilter};
pub use memory::{MemoryBackend, MemoryStore};
pub use model::{Endpoint, Protocol, ServiceRecord};

/// URL schemes `connect` understands.
pub const SUPPORTED_SCHEMES: &[&str] = &["etcd", "memory"];

/// Stream of full listings, one per significant change in the watched range.
///
/// The stream ends after yielding its first error; callers re-create it.
pub type SnapshotStream = BoxStream<'static, RegistryResult<Vec<ServiceRecord>>>;

/// Registry operations against a distributed store.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Write `endpoint` under `name`, expiring after `ttl` seconds if given.
    ///
    /// Overwrites any previous value for the same endpoint id.
    async fn register(&self, name: &str, endpoint: &Endpoint, ttl: Option<u64>) -> RegistryResult<()>;

    /// Remove the endpoint with `id` from `name`. Missing keys are ignored.
    async fn unregister(&self, name: &str, id: &str) -> RegistryResult<()>;

    /// Visible endpoints registered under exactly `name`.
    async fn lookup(&self, name: &str) -> RegistryResult<ServiceRecord>;

    /// Visible records under the whole namespace or under a domain suffix.
    async fn lookall(&self, prefix: Option<&str>) -> RegistryResult<Vec<ServiceRecord>>;

    /// Subscribe to changes under `prefix`.
    ///
    /// The subscription is established before this returns, so no change made
    /// after the call is missed. With `recursive` false and a prefix, only the
    /// prefix name itself is watched, not its subdomains.
    async fn watches(&self, prefix: Option<&str>, recursive: bool) -> RegistryResult<SnapshotStream>;
}

/// Open the backend selected by the URL scheme.
///
/// `default_networks` applies when the URL names no networks itself.
pub async fn connect(url: &BackendUrl, default_networks: NetworkScope) -> RegistryResult<Arc<dyn Backend>> {
    let codec = KeyCodec::new(&url.root);
    let filter = url.read_filter(default_networks);

    match url.scheme.as_str() {
        "etcd" => {
            let backend = EtcdBackend::connect(&url.hosts, codec, filter).await?;
            Ok(Arc::new(backend))
        }
        "memory" => Ok(Arc::new(MemoryBackend::new(codec, filter))),
        other => Err(RegistryError::UnsupportedScheme(other.to_string())),
    }
}
