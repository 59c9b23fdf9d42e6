//! Insertion-ordered header map.
//!
//! # Design
//! Header names compare case-insensitively but keep the spelling of their
//! first insertion, so a per-request override of `x-a` replaces a base
//! `X-A` in place instead of sending the header twice. Storage is a plain
//! `Vec` of pairs: header sets are small and order matters more than
//! lookup speed.

/// An ordered mapping of header name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any existing value for that name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.entries[index].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|index| self.entries.remove(index).1)
    }

    /// Apply every entry of `overrides` on top of this set.
    pub fn merge(&mut self, overrides: &HeaderSet) {
        for (name, value) in overrides.iter() {
            self.set(name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a raw `Name: value` block separated by CRLF.
    ///
    /// Blank lines and lines without a colon or a name are skipped. Names
    /// and values are trimmed, and repeated names are joined with `", "`.
    pub fn parse_block(raw: &str) -> Self {
        let mut headers = HeaderSet::new();
        for line in raw.split("\r\n") {
            if line.trim().is_empty() {
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let value = value.trim();
            match headers.position(name) {
                Some(index) => {
                    let existing = &mut headers.entries[index].1;
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                None => headers.entries.push((name.to_string(), value.to_string())),
            }
        }
        headers
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = HeaderSet::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}
