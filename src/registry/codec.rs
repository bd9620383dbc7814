//! Store key layout.
//!
//! ```text
//! api.example.com + id c1   →   /proxywall/com/example/api/@nodes/c1
//! example.com (directory)    →   /proxywall/com/example/
//! ```
//!
//! Names are stored as their reversed dot-segments so that a prefix query
//! over `encode_dir(suffix)` returns every record under that domain suffix.
//! The layout is stable and shared with other tools reading the store.

/// Default root under which all keys live.
pub const DEFAULT_ROOT: &str = "/proxywall";

/// Marker segment separating the name path from endpoint ids.
pub const NODES_MARKER: &str = "@nodes";

/// Encodes names into store keys and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    /// Normalized root: leading '/', no trailing '/', empty for "/".
    root: String,
}

impl KeyCodec {
    pub fn new(root: &str) -> Self {
        let root = collapse_separators(&format!("/{}", root.trim()));
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    /// Key prefix covering the whole namespace.
    pub fn root_dir(&self) -> String {
        format!("{}/", self.root)
    }

    /// Directory key for `name`, covering the name and all its subdomains.
    pub fn encode_dir(&self, name: &str) -> String {
        let path = reversed_labels(name).collect::<Vec<_>>().join("/");
        collapse_separators(&format!("{}/{}/", self.root, path))
    }

    /// Directory key holding exactly the endpoints of `name`.
    pub fn encode_nodes_dir(&self, name: &str) -> String {
        format!("{}{}/", self.encode_dir(name), NODES_MARKER)
    }

    /// Full key of one endpoint.
    pub fn encode_node(&self, name: &str, id: &str) -> String {
        collapse_separators(&format!("{}{}", self.encode_nodes_dir(name), id))
    }

    /// Recover `(name, id)` from an endpoint key.
    ///
    /// Returns `None` for keys outside the root or not shaped like
    /// `<root>/<labels…>/@nodes/<id>`.
    pub fn decode_node(&self, key: &str) -> Option<(String, String)> {
        let key = collapse_separators(key);
        let rest = key.strip_prefix(&self.root_dir())?;

        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let (id, head) = segments.split_last()?;
        let (marker, labels) = head.split_last()?;
        if *marker != NODES_MARKER || labels.is_empty() || labels.contains(&NODES_MARKER) {
            return None;
        }

        let name = labels
            .iter()
            .rev()
            .flat_map(|label| label.split('.'))
            .filter(|label| !label.is_empty())
            .collect::<Vec<_>>()
            .join(".");
        if name.is_empty() {
            return None;
        }
        Some((name, id.to_string()))
    }
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

fn reversed_labels(name: &str) -> impl Iterator<Item = &str> {
    name.split('.')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .rev()
}

/// Collapse runs of '/' into a single separator.
fn collapse_separators(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut previous_slash = false;
    for c in key.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    out
}
