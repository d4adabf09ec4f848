//! Header map shared by requests and responses.

use std::fmt;

/// An ordered header map.
///
/// Names keep the case they were inserted with. Lookups and replacement are
/// case-insensitive: inserting a name that is already present replaces the
/// earlier entry (name and value), so the last write wins.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any entry with the same name.
    ///
    /// Empty names are ignored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if name.trim().is_empty() {
            return;
        }
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Adds a value to a header, joining it to any existing value with `", "`.
    ///
    /// `Set-Cookie` cannot be folded into one line, so it is replaced instead
    /// and only the last cookie is kept.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let joined = match self.position(&name) {
            Some(index) if !name.eq_ignore_ascii_case("set-cookie") => {
                format!("{}, {}", self.entries[index].1, value)
            }
            _ => value,
        };
        self.insert(name, joined);
    }

    /// Returns the value for `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.entries[index].1.as_str())
    }

    /// Returns `true` if a header with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Removes the header and returns its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|index| self.entries.remove(index).1)
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        headers.extend(iter);
        headers
    }
}

impl<N, V> Extend<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (N, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins_and_keeps_latest_case() {
        let mut headers = Headers::new();
        headers.insert("X-Trace", "a");
        headers.insert("Accept", "*/*");
        headers.insert("x-trace", "b");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("X-TRACE"), Some("b"));
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["x-trace", "Accept"]);
    }

    #[test]
    fn empty_names_are_dropped() {
        let mut headers = Headers::new();
        headers.insert("", "value");
        headers.insert("  ", "value");
        assert!(headers.is_empty());
    }

    #[test]
    fn repeated_values_are_joined_except_cookies() {
        let mut headers = Headers::new();
        headers.append("Vary", "Accept");
        headers.append("vary", "Origin");
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Vary"), Some("Accept, Origin"));
        assert_eq!(headers.get("Set-Cookie"), Some("b=2"));
    }
}
