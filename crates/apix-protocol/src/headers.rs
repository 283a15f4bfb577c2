//! Ordered, case-insensitive header multimap carried inside frames

use serde::{Deserialize, Serialize};

/// HTTP headers as an ordered list of `(name, value)` pairs.
///
/// Duplicate names are preserved in order. Name comparisons are ASCII
/// case-insensitive. On the wire this is a JSON array of `[name, value]`
/// pairs.
///
/// Values are ISO-8859-1 text: each byte of the HTTP value is one `char`
/// with the same code point (see [`Headers::decode_value`]). ASCII values
/// read as themselves, and values carrying obs-text or UTF-8 bytes survive
/// the trip unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Create an empty header list
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header, keeping any existing values for the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, if any
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether a header with this name is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove every header whose name matches one of `names`
    pub fn remove_all(&mut self, names: &[&str]) {
        self.0
            .retain(|(n, _)| !names.iter().any(|drop| n.eq_ignore_ascii_case(drop)));
    }

    /// Copy of these headers without the named ones
    pub fn without(&self, names: &[&str]) -> Self {
        let mut copy = self.clone();
        copy.remove_all(names);
        copy
    }

    /// Text form of a raw header value
    pub fn decode_value(bytes: &[u8]) -> String {
        bytes.iter().copied().map(char::from).collect()
    }

    /// Raw bytes of a header value produced by [`Headers::decode_value`].
    ///
    /// `None` if the value holds a character above U+00FF.
    pub fn encode_value(value: &str) -> Option<Vec<u8>> {
        value.chars().map(|c| u8::try_from(c).ok()).collect()
    }

    /// Iterate over `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }
}
