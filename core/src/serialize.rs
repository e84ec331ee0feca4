/*!
Ordered, formatted key-value sets.

[`Entries`] holds the tag set or field set of a line while it's being built. Keys and values are already formatted, so [`serialize`] only needs to join them.
*/

use core::fmt;

/**
An ordered set of formatted keys and values.

Keys are unique. Inserting an existing key replaces its value without moving it.
*/
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Entries(Vec<(String, String)>);

impl Entries {
    pub fn new() -> Self {
        Entries::default()
    }

    /**
    Insert an entry, replacing any existing value for the key.
    */
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
    }

    /**
    Insert an entry only if the key isn't already present.
    */
    pub fn insert_absent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();

        if !self.contains_key(&key) {
            self.0.push((key, value.into()));
        }
    }

    /**
    Insert all entries from `other`, replacing existing values.
    */
    pub fn extend(&mut self, other: Entries) {
        for (k, v) in other.0 {
            self.insert(k, v);
        }
    }

    /**
    Insert entries from `other` whose keys aren't already present.
    */
    pub fn extend_absent(&mut self, other: Entries) {
        for (k, v) in other.0 {
            self.insert_absent(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Entries {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entries = Entries::new();

        for (k, v) in iter {
            entries.insert(k, v);
        }

        entries
    }
}

impl fmt::Debug for Entries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl fmt::Display for Entries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;

        for (k, v) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            first = false;

            write!(f, "{k}={v}")?;
        }

        Ok(())
    }
}

/**
Join entries into a `key=value,key=value` fragment.

Keys and values are written as-is.
*/
pub fn serialize(entries: &Entries) -> String {
    entries.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_in_insertion_order() {
        let entries: Entries = [("b", "1i"), ("a", "\"x\"")].into_iter().collect();

        assert_eq!("b=1i,a=\"x\"", serialize(&entries));
    }

    #[test]
    fn serialize_empty() {
        assert_eq!("", serialize(&Entries::new()));
    }

    #[test]
    fn insert_absent_keeps_existing() {
        let mut entries = Entries::new();

        entries.insert("host", "a");
        entries.insert_absent("host", "b");
        entries.insert_absent("pid", "1");

        assert_eq!("host=a,pid=1", serialize(&entries));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut entries = Entries::new();

        entries.insert("a", "1");
        entries.insert("b", "2");
        entries.insert("a", "3");

        assert_eq!("a=3,b=2", serialize(&entries));
    }
}
