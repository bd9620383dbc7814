//! Endpoint and service record types.
//!
//! # Responsibilities
//! - Represent a single routable endpoint and its validation rules
//! - Group endpoints into one record per virtual host name
//!
//! # Design Decisions
//! - Endpoint identity is the owning workload id; the store key is derived from it
//! - Weights at or below zero normalize to `DEFAULT_WEIGHT`
//! - Records keep endpoints sorted by address, port, id so rendered output is diff-stable

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::registry::codec::NODES_MARKER;
use crate::registry::error::ValidationError;

/// Weight applied when none (or a non-positive one) is given.
pub const DEFAULT_WEIGHT: u32 = 1;

/// Protocol spoken by an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(ValidationError::InvalidProtocol(s.to_string())),
        }
    }
}

/// A single routable instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Id of the owning workload.
    pub id: String,
    /// Reachable address on `network`.
    pub address: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    /// Logical network the address belongs to.
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default = "default_weight", deserialize_with = "deserialize_weight")]
    pub weight: u32,
}

impl Endpoint {
    /// Create an endpoint with default protocol, no network and default weight.
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Result<Self, ValidationError> {
        let endpoint = Self {
            id: id.into(),
            address: address.into(),
            port,
            protocol: Protocol::default(),
            network: None,
            weight: DEFAULT_WEIGHT,
        };
        endpoint.validate()?;
        Ok(endpoint)
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Set the weight; values at or below zero fall back to `DEFAULT_WEIGHT`.
    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = normalize_weight(weight);
        self
    }

    /// Parse a textual port as found in workload metadata.
    pub fn parse_port(raw: &str) -> Result<u16, ValidationError> {
        match raw.trim().parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(ValidationError::InvalidPort(raw.to_string())),
        }
    }

    /// Check the invariants the key layout and consumers rely on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id(&self.id)?;
        if self.port == 0 {
            return Err(ValidationError::InvalidPort(self.port.to_string()));
        }
        Ok(())
    }

    fn sort_key(&self) -> (&str, u16, &str) {
        (&self.address, self.port, &self.id)
    }
}

/// All endpoints currently registered under one virtual host name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    /// Smallest heartbeat TTL among the endpoints, `None` when all are persistent.
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl ServiceRecord {
    /// Build a record, keeping the last endpoint seen per id and sorting the result.
    pub fn new(name: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        let mut by_id: BTreeMap<String, Endpoint> = BTreeMap::new();
        for endpoint in endpoints {
            by_id.insert(endpoint.id.clone(), endpoint);
        }
        let mut endpoints: Vec<Endpoint> = by_id.into_values().collect();
        endpoints.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        Self {
            name: name.into(),
            ttl: None,
            endpoints,
        }
    }

    /// An empty record, returned for names with nothing registered.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn with_ttl(mut self, ttl: Option<u64>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.endpoints.iter().any(|e| e.id == id)
    }
}

/// Validate a service name for use as a routing and store key.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.split('.').all(|label| label.trim().is_empty()) {
        return Err(ValidationError::EmptyName);
    }
    if name.contains('/') || name.split('.').any(|label| label.trim() == NODES_MARKER) {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// The form a name takes once stored: labels trimmed, empty labels dropped.
///
/// `" api..test. "` and `"api.test"` share one key, so lookups compare
/// against this form.
pub fn canonical_name(name: &str) -> String {
    name.split('.')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Validate an endpoint id for use as the last key segment.
pub fn validate_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::MissingEndpointId);
    }
    if id.contains('/') {
        return Err(ValidationError::InvalidEndpointId(id.to_string()));
    }
    Ok(())
}

/// Map a raw weight onto the stored range.
pub fn normalize_weight(weight: i64) -> u32 {
    if weight <= 0 {
        DEFAULT_WEIGHT
    } else {
        u32::try_from(weight).unwrap_or(u32::MAX)
    }
}

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u64),
        Text(String),
    }

    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(n) => match u16::try_from(n) {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(D::Error::custom(format!("invalid port {}", n))),
        },
        PortRepr::Text(s) => Endpoint::parse_port(&s).map_err(D::Error::custom),
    }
}

fn deserialize_weight<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.map(normalize_weight).unwrap_or(DEFAULT_WEIGHT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("http".parse::<Protocol>().unwrap(), Protocol::Http);
        assert_eq!("HTTPS".parse::<Protocol>().unwrap(), Protocol::Https);
        assert_eq!(
            "ftp".parse::<Protocol>(),
            Err(ValidationError::InvalidProtocol("ftp".into()))
        );
    }

    #[test]
    fn test_weight_normalization() {
        let endpoint = Endpoint::new("c1", "10.0.0.1", 80).unwrap();
        assert_eq!(endpoint.weight, DEFAULT_WEIGHT);
        assert_eq!(endpoint.clone().with_weight(0).weight, 1);
        assert_eq!(endpoint.clone().with_weight(-5).weight, 1);
        assert_eq!(endpoint.with_weight(7).weight, 7);
    }

    #[test]
    fn test_endpoint_validation() {
        assert_eq!(
            Endpoint::new("", "10.0.0.1", 80),
            Err(ValidationError::MissingEndpointId)
        );
        assert!(matches!(
            Endpoint::new("a/b", "10.0.0.1", 80),
            Err(ValidationError::InvalidEndpointId(_))
        ));
        assert!(matches!(
            Endpoint::new("c1", "10.0.0.1", 0),
            Err(ValidationError::InvalidPort(_))
        ));
        assert_eq!(Endpoint::parse_port(" 8080 ").unwrap(), 8080);
        assert!(Endpoint::parse_port("http").is_err());
        assert!(Endpoint::parse_port("70000").is_err());
    }

    #[test]
    fn test_name_validation() {
        assert_eq!(validate_name(""), Err(ValidationError::EmptyName));
        assert_eq!(validate_name(".."), Err(ValidationError::EmptyName));
        assert!(validate_name("a/b.com").is_err());
        assert!(validate_name("api.example.com").is_ok());
        assert!(matches!(
            validate_name("@nodes.example.com"),
            Err(ValidationError::InvalidName(_))
        ));
        assert!(matches!(
            validate_name("api. @nodes .com"),
            Err(ValidationError::InvalidName(_))
        ));
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("api.test"), "api.test");
        assert_eq!(canonical_name("api.test."), "api.test");
        assert_eq!(canonical_name(" api..test "), "api.test");
    }

    #[test]
    fn test_textual_port_and_missing_fields_deserialize() {
        let endpoint: Endpoint =
            serde_json::from_str(r#"{"id":"c1","address":"10.0.0.1","port":"8080"}"#).unwrap();
        assert_eq!(endpoint.port, 8080);
        assert_eq!(endpoint.protocol, Protocol::Http);
        assert_eq!(endpoint.network, None);
        assert_eq!(endpoint.weight, 1);

        let endpoint: Endpoint = serde_json::from_str(
            r#"{"id":"c1","address":"10.0.0.1","port":443,"protocol":"https","weight":-1}"#,
        )
        .unwrap();
        assert_eq!(endpoint.protocol, Protocol::Https);
        assert_eq!(endpoint.weight, 1);
    }

    #[test]
    fn test_record_dedups_and_sorts() {
        let a = Endpoint::new("c1", "10.0.0.2", 80).unwrap();
        let b = Endpoint::new("c2", "10.0.0.1", 80).unwrap();
        let a2 = Endpoint::new("c1", "10.0.0.3", 80).unwrap().with_weight(5);

        let record = ServiceRecord::new("api.test", vec![a, b, a2]);
        assert_eq!(record.endpoints.len(), 2);
        assert_eq!(record.endpoints[0].address, "10.0.0.1");
        assert_eq!(record.endpoints[1].address, "10.0.0.3");
        assert_eq!(record.endpoints[1].weight, 5);
    }
}
