//! Read-time visibility filtering.
//!
//! # Responsibilities
//! - Hide endpoints attached to networks this instance does not serve
//! - Hide records whose names fall outside the configured patterns
//!
//! # Design Decisions
//! - Filtering happens on read only; writes are never rejected for visibility
//! - An endpoint without a network is visible everywhere
//! - Name matching is case-insensitive, like HTTP host matching

use std::collections::BTreeSet;

use crate::registry::model::Endpoint;

/// Which endpoint networks are visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkScope {
    /// Every endpoint is visible regardless of its network.
    Any,
    /// Only endpoints without a network or on one of these networks.
    Only(BTreeSet<String>),
}

impl NetworkScope {
    pub fn only<I, S>(networks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NetworkScope::Only(networks.into_iter().map(Into::into).collect())
    }

    /// Parse network tokens; a `*` token widens the scope to every network.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut networks = BTreeSet::new();
        for token in tokens {
            let token = token.as_ref().trim();
            if token == "*" {
                return NetworkScope::Any;
            }
            if !token.is_empty() {
                networks.insert(token.to_string());
            }
        }
        NetworkScope::Only(networks)
    }

    pub fn admits(&self, endpoint: &Endpoint) -> bool {
        match (self, endpoint.network.as_deref()) {
            (NetworkScope::Any, _) => true,
            (_, None) | (_, Some("")) => true,
            (NetworkScope::Only(networks), Some(network)) => networks.contains(network),
        }
    }
}

/// A record name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    /// Matches every name (`*` or empty).
    Any,
    /// Matches exactly this name.
    Exact(String),
    /// Matches strict subdomains of this suffix (`*.example.com`).
    Suffix(String),
}

impl NamePattern {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_ascii_lowercase();
        if raw.is_empty() || raw == "*" {
            NamePattern::Any
        } else if let Some(suffix) = raw.strip_prefix("*.") {
            NamePattern::Suffix(suffix.trim_matches('.').to_string())
        } else {
            NamePattern::Exact(raw.trim_matches('.').to_string())
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        match self {
            NamePattern::Any => true,
            NamePattern::Exact(expected) => name == *expected,
            NamePattern::Suffix(suffix) => name
                .strip_suffix(suffix.as_str())
                .map(|head| head.len() > 1 && head.ends_with('.'))
                .unwrap_or(false),
        }
    }
}

/// Visibility rules applied to every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadFilter {
    pub networks: NetworkScope,
    /// Empty means every name is visible.
    pub patterns: Vec<NamePattern>,
}

impl ReadFilter {
    pub fn new(networks: NetworkScope, patterns: Vec<NamePattern>) -> Self {
        Self { networks, patterns }
    }

    /// A filter that hides nothing.
    pub fn permissive() -> Self {
        Self::new(NetworkScope::Any, Vec::new())
    }

    pub fn admits_name(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(name))
    }

    pub fn admits_endpoint(&self, endpoint: &Endpoint) -> bool {
        self.networks.admits(endpoint)
    }
}

impl Default for ReadFilter {
    fn default() -> Self {
        Self::new(NetworkScope::Only(BTreeSet::new()), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(network: Option<&str>) -> Endpoint {
        let endpoint = Endpoint::new("c1", "10.0.0.1", 80).unwrap();
        match network {
            Some(n) => endpoint.with_network(n),
            None => endpoint,
        }
    }

    #[test]
    fn test_network_scope() {
        let scope = NetworkScope::only(["a"]);
        assert!(scope.admits(&endpoint(None)));
        assert!(scope.admits(&endpoint(Some("a"))));
        assert!(!scope.admits(&endpoint(Some("b"))));

        assert!(NetworkScope::Any.admits(&endpoint(Some("b"))));
        assert!(!ReadFilter::default().admits_endpoint(&endpoint(Some("a"))));
        assert_eq!(NetworkScope::from_tokens(["a", "*"]), NetworkScope::Any);
        assert_eq!(
            NetworkScope::from_tokens(["a", " ", "b"]),
            NetworkScope::only(["a", "b"])
        );
    }

    #[test]
    fn test_name_patterns() {
        let suffix = NamePattern::parse("*.example.com");
        assert!(suffix.matches("api.example.com"));
        assert!(suffix.matches("a.b.Example.COM"));
        assert!(!suffix.matches("example.com"));
        assert!(!suffix.matches("badexample.com"));

        let exact = NamePattern::parse("api.test");
        assert!(exact.matches("API.test"));
        assert!(!exact.matches("x.api.test"));

        assert_eq!(NamePattern::parse(""), NamePattern::Any);
        assert!(ReadFilter::permissive().admits_name("anything.at.all"));

        let filter = ReadFilter::new(NetworkScope::Any, vec![exact, suffix]);
        assert!(filter.admits_name("api.test"));
        assert!(filter.admits_name("web.example.com"));
        assert!(!filter.admits_name("other.org"));
    }
}
