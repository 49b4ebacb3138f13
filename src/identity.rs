use std::fmt;
use std::hash::Hasher as _;
use twox_hash::XxHash64;

use crate::source::SourceEntry;

/// Stable fingerprint for one file instance, used as the ledger key.
///
/// Derived from (source path, size, mtime truncated to whole seconds);
/// file contents are never read. Renaming or moving a file produces a new
/// identity and a fresh copy; that trade-off buys cheap fingerprinting
/// over large media trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub fn from_key(key: impl Into<String>) -> Self {
        Identity(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_key(self) -> String {
        self.0
    }
}

impl std::borrow::Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn fingerprint(entry: &SourceEntry) -> Identity {
    fingerprint_parts(&entry.path, entry.size, entry.modified)
}

/// Fingerprint from raw parts, for callers holding snapshot rows rather
/// than full entries.
pub fn fingerprint_parts(path: &str, size: u64, modified: i64) -> Identity {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(path.as_bytes());
    hasher.write(b"|");
    hasher.write(size.to_string().as_bytes());
    hasher.write(b"|");
    hasher.write(modified.to_string().as_bytes());
    Identity(format!("{:016x}", hasher.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: u64, modified: i64) -> SourceEntry {
        SourceEntry {
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            size,
            modified,
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = entry("/src/shoot/clip.mov", 1024, 1700000000);
        assert_eq!(fingerprint(&a), fingerprint(&a));
    }

    #[test]
    fn test_fingerprint_depends_on_path() {
        let a = entry("/src/shoot/clip.mov", 1024, 1700000000);
        let b = entry("/src/other/clip.mov", 1024, 1700000000);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_depends_on_size() {
        let a = entry("/src/shoot/clip.mov", 1024, 1700000000);
        let b = entry("/src/shoot/clip.mov", 1025, 1700000000);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_depends_on_mtime() {
        let a = entry("/src/shoot/clip.mov", 1024, 1700000000);
        let b = entry("/src/shoot/clip.mov", 1024, 1700000001);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_parts_matches_entry() {
        let e = entry("/src/shoot/clip.mov", 1024, 1700000000);
        assert_eq!(fingerprint(&e), fingerprint_parts(&e.path, e.size, e.modified));
    }

    #[test]
    fn test_fingerprint_is_hex_key() {
        let id = fingerprint(&entry("/src/a", 1, 1));
        assert_eq!(id.as_str().len(), 16);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
