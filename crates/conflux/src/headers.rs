//! A simple ordered header map with case-sensitive, last-write-wins keys.

use std::fmt;

/// An ordered header map.
///
/// Keys are case-sensitive and writes are last-write-wins: inserting an
/// existing key replaces its value in place, preserving insertion order.
/// Lookups against received (response) headers use the case-insensitive
/// variants, since HTTP header names are case-insensitive on the wire.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing an existing entry with the same
    /// (case-sensitive) name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Get a header value by exact (case-sensitive) name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a header value ignoring name case.
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Remove a header by exact name, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Whether a header with the exact name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another map into this one; `other`'s values win on conflict.
    pub fn extend(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(n, v)| (n, v)))
            .finish()
    }
}

impl From<&reqwest::header::HeaderMap> for Headers {
    fn from(map: &reqwest::header::HeaderMap) -> Self {
        let mut headers = Headers::new();
        for (name, value) in map.iter() {
            // Non-UTF-8 header values are rare; keep them readable rather
            // than dropping them.
            headers.insert(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_last_write_wins() {
        let mut headers = Headers::new();
        headers.insert("Accept", "text/plain");
        headers.insert("Accept", "application/json");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Accept"), Some("application/json"));
    }

    #[test]
    fn keys_are_case_sensitive() {
        let mut headers = Headers::new();
        headers.insert("X-Token", "a");
        headers.insert("x-token", "b");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("X-Token"), Some("a"));
        assert_eq!(headers.get("x-token"), Some("b"));
    }

    #[test]
    fn ignore_case_lookup_finds_first_match() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/json");
        assert_eq!(
            headers.get_ignore_case("content-type"),
            Some("application/json")
        );
        assert_eq!(headers.get("content-type"), None);
    }

    #[test]
    fn extend_overwrites_conflicts() {
        let mut base = Headers::new();
        base.insert("Accept", "text/plain");
        base.insert("X-Keep", "yes");

        let mut other = Headers::new();
        other.insert("Accept", "application/json");

        base.extend(&other);
        assert_eq!(base.get("Accept"), Some("application/json"));
        assert_eq!(base.get("X-Keep"), Some("yes"));
    }
}
