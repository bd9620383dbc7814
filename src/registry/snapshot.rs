//! Stored value format and listing materialization shared by all backends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::codec::KeyCodec;
use crate::registry::error::RegistryResult;
use crate::registry::filter::ReadFilter;
use crate::registry::model::{Endpoint, ServiceRecord};

/// Value written at an endpoint key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEndpoint {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// Serialize an endpoint with its keys sorted.
pub(crate) fn encode_value(endpoint: &Endpoint, ttl: Option<u64>) -> RegistryResult<String> {
    let stored = StoredEndpoint {
        endpoint: endpoint.clone(),
        ttl,
    };
    // serde_json::Value objects are ordered maps, so this sorts the keys.
    let value = serde_json::to_value(&stored)?;
    Ok(serde_json::to_string(&value)?)
}

/// Group raw key/value pairs into visible records, sorted by name.
///
/// Keys that are not endpoint keys, empty values and undecodable values are skipped.
pub(crate) fn materialize<'a, I>(codec: &KeyCodec, filter: &ReadFilter, entries: I) -> Vec<ServiceRecord>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut grouped: BTreeMap<String, Vec<StoredEndpoint>> = BTreeMap::new();

    for (key, value) in entries {
        if value.is_empty() {
            continue;
        }
        let Some((name, id)) = codec.decode_node(key) else {
            continue;
        };
        if !filter.admits_name(&name) {
            continue;
        }
        let stored: StoredEndpoint = match serde_json::from_slice(value) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Skipping undecodable endpoint value");
                continue;
            }
        };
        if stored.endpoint.id != id {
            tracing::debug!(key = %key, id = %stored.endpoint.id, "Endpoint id differs from key, using key");
        }
        if !filter.admits_endpoint(&stored.endpoint) {
            continue;
        }
        let mut stored = stored;
        stored.endpoint.id = id;
        grouped.entry(name).or_default().push(stored);
    }

    grouped
        .into_iter()
        .map(|(name, stored)| {
            let ttl = stored.iter().filter_map(|s| s.ttl).min();
            let endpoints = stored.into_iter().map(|s| s.endpoint).collect();
            ServiceRecord::new(name, endpoints).with_ttl(ttl)
        })
        .collect()
}
