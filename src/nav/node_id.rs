//! DOM-safe identifiers for tree nodes.
//!
//! An id is `CBT_` followed by the base64 of the path's UTF-8 bytes, with
//! `=` mapped to `-` and `/` mapped to `_`. Standard base64 never emits `-`
//! or `_`, so the mapping stays injective and distinct paths never share an
//! id. The id is one-way: the path travels alongside it as node metadata.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Marker that starts every encoded id.
pub const ID_PREFIX: &str = "CBT_";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Encode a repository path. Input that already carries the prefix is
    /// taken to be an id and returned untouched.
    pub fn encode(path: &str) -> Self {
        if path.starts_with(ID_PREFIX) {
            return NodeId(path.to_string());
        }
        let encoded: String = STANDARD
            .encode(path.as_bytes())
            .chars()
            .map(|c| match c {
                '=' => '-',
                '/' => '_',
                other => other,
            })
            .collect();
        NodeId(format!("{}{}", ID_PREFIX, encoded))
    }

    /// Encode a pre-split segment sequence by joining it with `/` first.
    pub fn encode_segments<S: AsRef<str>>(segments: &[S]) -> Self {
        let joined = segments
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join("/");
        Self::encode(&joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
