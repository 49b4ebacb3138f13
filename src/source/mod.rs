pub mod local;
pub mod remote;

pub use local::LocalSource;
pub use remote::S3Source;

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Error;

/// Reserved marker filename. A directory that contains it is routed; its
/// content is the destination directive.
pub const DIRECTIVE_FILE: &str = ".turbosort";

/// One file as seen by a source. `path` is the stable identifier the
/// fingerprint is built from, so it must be reproducible across restarts:
/// a full filesystem path locally, an `s3://bucket/key` URL remotely.
/// `modified` is whole Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub modified: i64,
}

/// Uniform listing/read interface over a local tree or a remote object
/// store prefix. Directory identifiers are source-specific strings: local
/// directory paths, or remote key prefixes ending in `/`.
pub trait Source: Send {
    /// Directories containing the directive marker, recursively.
    fn list_directories(&self) -> Result<Vec<String>, Error>;

    /// The directive text for a directory, trimmed. `Ok(None)` when the
    /// marker does not exist (the directory is simply not routed).
    fn read_directive(&self, dir: &str) -> Result<Option<String>, Error>;

    /// Direct children of a directory, files only, marker excluded.
    fn list_files(&self, dir: &str) -> Result<Vec<SourceEntry>, Error>;

    /// Copy one entry's bytes to a local destination path. The parent
    /// directory is expected to exist.
    fn fetch(&self, entry: &SourceEntry, dest: &Path) -> Result<(), Error>;

    /// Every file under the root as key -> (size, mtime). Used to diff
    /// remote poll cycles and to build the prune live-set; includes
    /// directive markers so edits to them show up as changes.
    fn snapshot(&self) -> Result<BTreeMap<String, (u64, i64)>, Error>;

    /// The `SourceEntry::path` form of a snapshot key, so fingerprints
    /// built from snapshot rows match fingerprints built from entries.
    fn entry_path(&self, key: &str) -> String;
}
