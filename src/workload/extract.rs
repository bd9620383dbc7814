//! Routing metadata extraction.
//!
//! Turns one workload into at most one registry action. Pure: no I/O, no
//! logging, so every rule can be tested directly.
//!
//! ```text
//! tty?                       → skip
//! VHOST / VPORT missing      → skip
//! paused / exited / dead     → Unregister { name, id }
//! VNETWORK missing           → skip
//! no IP on that network      → skip
//! VPROTO / VWEIGHT / VPORT   → Register { name, endpoint } or ExtractError
//! ```

use std::collections::HashMap;

use thiserror::Error;

use crate::registry::{Endpoint, Protocol, ValidationError};
use crate::workload::source::Workload;

pub const ENV_HOST: &str = "VHOST";
pub const ENV_PORT: &str = "VPORT";
pub const ENV_NETWORK: &str = "VNETWORK";
pub const ENV_PROTO: &str = "VPROTO";
pub const ENV_WEIGHT: &str = "VWEIGHT";

/// What the reconciler should do about one workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Register { name: String, endpoint: Endpoint },
    Unregister { name: String, id: String },
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Register { name, .. } | Action::Unregister { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("workload {id}: invalid {field} '{value}'")]
    InvalidField {
        id: String,
        field: &'static str,
        value: String,
    },

    #[error("workload {id}: {source}")]
    Invalid {
        id: String,
        #[source]
        source: ValidationError,
    },
}

/// Split `KEY=VALUE` entries on the first `=`. Entries without one map to "".
pub fn parse_env(entries: &[String]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (entry.clone(), String::new()),
        })
        .collect()
}

fn non_empty<'a>(env: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Decide the registry action for `workload`, if any.
pub fn extract(workload: &Workload) -> Result<Option<Action>, ExtractError> {
    if workload.tty {
        return Ok(None);
    }

    let env = parse_env(&workload.env);
    let (name, port) = match (non_empty(&env, ENV_HOST), non_empty(&env, ENV_PORT)) {
        (Some(name), Some(port)) => (name.to_string(), port),
        _ => return Ok(None),
    };

    if workload.status.is_stopped() {
        return Ok(Some(Action::Unregister {
            name,
            id: workload.id.clone(),
        }));
    }

    let network = match non_empty(&env, ENV_NETWORK) {
        Some(network) => network,
        None => return Ok(None),
    };
    let address = match workload.networks.get(network).map(|ip| ip.trim()) {
        Some(ip) if !ip.is_empty() => ip,
        _ => return Ok(None),
    };

    let invalid = |source| ExtractError::Invalid {
        id: workload.id.clone(),
        source,
    };
    let port = Endpoint::parse_port(port).map_err(invalid)?;
    let mut endpoint = Endpoint::new(workload.id.clone(), address, port)
        .map_err(invalid)?
        .with_network(network);

    if let Some(proto) = non_empty(&env, ENV_PROTO) {
        endpoint = endpoint.with_protocol(proto.parse::<Protocol>().map_err(invalid)?);
    }
    if let Some(weight) = non_empty(&env, ENV_WEIGHT) {
        let weight = weight.parse::<i64>().map_err(|_| ExtractError::InvalidField {
            id: workload.id.clone(),
            field: ENV_WEIGHT,
            value: weight.to_string(),
        })?;
        endpoint = endpoint.with_weight(weight);
    }

    Ok(Some(Action::Register { name, endpoint }))
}
