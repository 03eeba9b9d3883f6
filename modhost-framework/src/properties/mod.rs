//! Ordered key -> typed-value maps used as service attributes and
//! message payloads.
//!
//! Keys are case-sensitive; a duplicate `set` replaces the value
//! in place without disturbing insertion order, which is what
//! [`Properties::keys`] and [`Properties::iter`] expose. Not
//! thread-safe by design (spec ยง4.2) — callers clone before sharing
//! across threads, which is cheap (`Vec`/`HashMap` of owned data).

mod codec;
mod value;

pub use codec::PropertiesError;
pub use value::{PropertyValue, Version};

use std::collections::HashMap;

/// An ordered, case-sensitive string -> [`PropertyValue`] map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: Vec<(String, PropertyValue)>,
    index: HashMap<String, usize>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value for `key`. Replacing preserves
    /// the key's original position in iteration order.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(&idx) = self.index.get(&key) {
            self.entries[idx].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Removes `key`, shifting later entries down by one and
    /// rebuilding the index (properties maps are small and mutated
    /// rarely enough that this is not a hot path).
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        let idx = self.index.remove(key)?;
        let (_, value) = self.entries.remove(idx);
        for (_, stored_idx) in self.index.iter_mut() {
            if *stored_idx > idx {
                *stored_idx -= 1;
            }
        }
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Key/value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parses the `key=value` line format described in spec ยง4.2.
    pub fn load(text: &str) -> Result<Self, PropertiesError> {
        codec::load(text)
    }

    /// Serializes back to the line format. `Properties::load(&p.save())
    /// == p` for any properties that round-trip through `load` first,
    /// and `save(load(s)) == s` for any `s` this function itself
    /// produced (spec ยง8 round-trip law).
    pub fn save(&self) -> String {
        codec::save(self)
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = (&'a str, &'a PropertyValue);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a PropertyValue)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let mut p = Properties::new();
        p.set("service.id", 1i64);
        assert_eq!(p.get("service.id").and_then(|v| v.as_long()), Some(1));
    }

    #[test]
    fn duplicate_set_preserves_position() {
        let mut p = Properties::new();
        p.set("a", "1");
        p.set("b", "2");
        p.set("a", "3");

        let keys: Vec<_> = p.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(p.get("a").unwrap().as_str(), Some("3"));
    }

    #[test]
    fn case_sensitive_keys() {
        let mut p = Properties::new();
        p.set("Key", "upper");
        p.set("key", "lower");
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn remove_reindexes() {
        let mut p = Properties::new();
        p.set("a", "1");
        p.set("b", "2");
        p.set("c", "3");

        p.remove("b");
        assert_eq!(p.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(p.get("c").unwrap().as_str(), Some("3"));
    }

    #[test]
    fn clone_is_independent() {
        let mut p = Properties::new();
        p.set("a", "1");
        let mut cloned = p.clone();
        cloned.set("a", "2");
        assert_eq!(p.get("a").unwrap().as_str(), Some("1"));
        assert_eq!(cloned.get("a").unwrap().as_str(), Some("2"));
    }
}
