//! Backend connection URL parsing.
//!
//! ```text
//! etcd://10.0.0.1:2379,10.0.0.2:2379/proxywall?networks=front,back&patterns=*.example.com
//! └┬─┘   └──────────────┬──────────┘ └───┬───┘ └────────────────────┬──────────────────┘
//! scheme          store hosts           root          read filter (networks, name patterns)
//! ```

use url::Url;

use crate::registry::codec::DEFAULT_ROOT;
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::filter::{NamePattern, NetworkScope, ReadFilter};

/// A parsed backend URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUrl {
    /// Lowercased scheme, selects the backend implementation.
    pub scheme: String,
    /// Store endpoints as `host:port`.
    pub hosts: Vec<String>,
    /// Key root, `/proxywall` when the URL has no path.
    pub root: String,
    /// Networks named in the URL, `None` when the parameter is absent.
    pub networks: Option<NetworkScope>,
    pub patterns: Vec<NamePattern>,
}

impl BackendUrl {
    pub fn parse(raw: &str) -> RegistryResult<Self> {
        let raw = raw.trim();
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| RegistryError::InvalidUrl(raw.to_string()))?;
        let scheme = scheme.to_ascii_lowercase();
        if scheme.is_empty() {
            return Err(RegistryError::InvalidUrl(raw.to_string()));
        }

        // Multi-host authorities are not valid URL hosts; split them off first.
        let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);
        let hosts = authority
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from)
            .collect();

        let parsed = Url::parse(&format!("{}://placeholder{}", scheme, tail))
            .map_err(|e| RegistryError::InvalidUrl(format!("{}: {}", raw, e)))?;

        let root = match parsed.path().trim_end_matches('/') {
            "" => DEFAULT_ROOT.to_string(),
            path => path.to_string(),
        };

        let mut network_tokens: Option<Vec<String>> = None;
        let mut patterns = Vec::new();
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "networks" | "network" => network_tokens
                    .get_or_insert_with(Vec::new)
                    .extend(split_list(&value)),
                "patterns" | "pattern" => {
                    patterns.extend(split_list(&value).iter().map(|p| NamePattern::parse(p)))
                }
                other => tracing::warn!(parameter = %other, "Ignoring unknown backend url parameter"),
            }
        }

        Ok(Self {
            scheme,
            hosts,
            root,
            networks: network_tokens.map(NetworkScope::from_tokens),
            patterns,
        })
    }

    /// Read filter for this URL, using `fallback` when no networks were named.
    pub fn read_filter(&self, fallback: NetworkScope) -> ReadFilter {
        ReadFilter::new(
            self.networks.clone().unwrap_or(fallback),
            self.patterns.clone(),
        )
    }
}

/// Split a list separated by commas, semicolons or whitespace.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
