//! Address-bar grammar.
//!
//! `optional-host? path-segments (?query)?`, i.e.
//! `^((https?://host)?(/seg)*/(name)?)(\?query)?$`. Both pushing and
//! restoring history go through this one parser so entries round-trip.

use std::borrow::Cow;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

/// Auxiliary query parameters, kept in insertion order.
pub type Parameters = IndexMap<String, String>;

fn grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(r"(?i)^((https?://[^/]+)?((/[^/?]+)*/([^/?]*)))(\?([^?]*))?$")
            .expect("location grammar is a valid regex")
    })
}

/// A parsed address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    /// Host part plus path, without the query.
    pub uri: String,
    /// `scheme://host`, empty for relative addresses.
    pub server: String,
    pub path: String,
    /// Last path segment.
    pub name: String,
    /// Raw query string without `?`.
    pub query: String,
    pub parameters: Parameters,
}

impl Location {
    /// Parse an address; `None` when it does not fit the grammar.
    pub fn parse(url: &str) -> Option<Self> {
        let caps = grammar().captures(url)?;
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");
        let path = match group(3) {
            "" => "/",
            p => p,
        };
        let query = group(7).to_string();
        Some(Self {
            uri: group(1).to_string(),
            server: group(2).to_string(),
            path: path.to_string(),
            name: group(5).to_string(),
            parameters: parse_parameters(&query),
            query,
        })
    }

    /// Address with the same host and path and a different query.
    pub fn with_query(&self, query: &str) -> String {
        compose(&self.server, &self.path, query)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&compose(&self.server, &self.path, &self.query))
    }
}

/// `server + path (+ ?query)`.
pub fn compose(server: &str, path: &str, query: &str) -> String {
    if query.is_empty() {
        format!("{}{}", server, path)
    } else {
        format!("{}{}?{}", server, path, query)
    }
}

/// Escape the characters that would end a URL path (`%`, `?`, `#`) and
/// spaces, so a repository path can be appended to a URL verbatim.
pub fn escape_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '?' => escaped.push_str("%3F"),
            '#' => escaped.push_str("%23"),
            ' ' => escaped.push_str("%20"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Inverse of [`escape_path`].
pub fn unescape_path(path: &str) -> String {
    decode(path)
}

fn decode(part: &str) -> String {
    urlencoding::decode(part)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| part.to_string())
}

/// Split a raw query into decoded name/value pairs. A name without `=`
/// maps to the empty string.
pub fn parse_parameters(query: &str) -> Parameters {
    let mut params = Parameters::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(decode(name), decode(value));
    }
    params
}

/// Inverse of [`parse_parameters`].
pub fn encode_parameters(params: &Parameters) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{}={}", urlencoding::encode(name), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
