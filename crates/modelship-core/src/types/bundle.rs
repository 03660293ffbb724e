use std::collections::btree_map;
use std::collections::BTreeMap;

use bytes::Bytes;

/// Relative path → file content for one deployment.
///
/// Ordered by path so everything derived from a bundle (generated
/// manifests, tree entry lists, fingerprints) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileBundle {
    files: BTreeMap<String, Bytes>,
}

impl FileBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file, returning the previous content.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Bytes>) -> Option<Bytes> {
        self.files.insert(path.into(), content.into())
    }

    /// Insert a file only when the path is free. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, path: impl Into<String>, content: impl Into<Bytes>) -> bool {
        match self.files.entry(path.into()) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(content.into());
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.files.iter().map(|(path, content)| (path.as_str(), content))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|c| c.len() as u64).sum()
    }
}

impl IntoIterator for FileBundle {
    type Item = (String, Bytes);
    type IntoIter = btree_map::IntoIter<String, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<P: Into<String>, C: Into<Bytes>> FromIterator<(P, C)> for FileBundle {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut bundle = Self::new();
        for (path, content) in iter {
            bundle.insert(path, content);
        }
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_and_reports_previous() {
        let mut bundle = FileBundle::new();
        assert!(bundle.insert("a.txt", "one").is_none());
        let prev = bundle.insert("a.txt", "two").unwrap();
        assert_eq!(&prev[..], b"one");
        assert_eq!(&bundle.get("a.txt").unwrap()[..], b"two");
        assert_eq!(bundle.len(), 1);
    }

    #[test]
    fn insert_if_absent_keeps_existing() {
        let mut bundle = FileBundle::new();
        bundle.insert("README.md", "mine");
        assert!(!bundle.insert_if_absent("README.md", "generated"));
        assert_eq!(&bundle.get("README.md").unwrap()[..], b"mine");
        assert!(bundle.insert_if_absent("other.md", "generated"));
    }

    #[test]
    fn paths_are_sorted() {
        let bundle: FileBundle = [("z.py", "1"), ("a.py", "2"), ("m/x.py", "3")]
            .into_iter()
            .collect();
        let paths: Vec<_> = bundle.paths().collect();
        assert_eq!(paths, vec!["a.py", "m/x.py", "z.py"]);
        assert_eq!(bundle.total_bytes(), 3);
    }
}
