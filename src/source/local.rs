use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::error;
use walkdir::WalkDir;

use super::{Source, SourceEntry, DIRECTIVE_FILE};
use crate::error::Error;

/// Source backed by a local filesystem tree. Directory identifiers are
/// plain paths under the configured root.
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn modified_secs(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl Source for LocalSource {
    fn list_directories(&self) -> Result<Vec<String>, Error> {
        let mut dirs = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    error!("Error walking {}: {}", self.root.display(), err);
                    continue;
                }
            };
            if entry.file_type().is_file() && entry.file_name() == DIRECTIVE_FILE {
                if let Some(parent) = entry.path().parent() {
                    dirs.push(parent.to_string_lossy().into_owned());
                }
            }
        }
        Ok(dirs)
    }

    fn read_directive(&self, dir: &str) -> Result<Option<String>, Error> {
        let marker = Path::new(dir).join(DIRECTIVE_FILE);
        match fs::read_to_string(&marker) {
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn list_files(&self, dir: &str) -> Result<Vec<SourceEntry>, Error> {
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(dir)? {
            let dir_entry = dir_entry?;
            let metadata = dir_entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if name == DIRECTIVE_FILE {
                continue;
            }
            entries.push(SourceEntry {
                path: dir_entry.path().to_string_lossy().into_owned(),
                name,
                size: metadata.len(),
                modified: modified_secs(&metadata),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn fetch(&self, entry: &SourceEntry, dest: &Path) -> Result<(), Error> {
        fs::copy(&entry.path, dest)?;
        Ok(())
    }

    fn snapshot(&self) -> Result<BTreeMap<String, (u64, i64)>, Error> {
        let mut snapshot = BTreeMap::new();
        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    error!("Error walking {}: {}", self.root.display(), err);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry.metadata().map_err(|err| {
                Error::Source(format!(
                    "metadata for {}: {}",
                    entry.path().display(),
                    err
                ))
            })?;
            snapshot.insert(
                entry.path().to_string_lossy().into_owned(),
                (metadata.len(), modified_secs(&metadata)),
            );
        }
        Ok(snapshot)
    }

    // Local snapshot keys are already full filesystem paths.
    fn entry_path(&self, key: &str) -> String {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_directories_finds_marker_dirs() {
        let dir = tempdir().unwrap();
        let routed = dir.path().join("shoot_a");
        let nested = dir.path().join("outer/shoot_b");
        let plain = dir.path().join("no_marker");
        fs::create_dir_all(&routed).unwrap();
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(&plain).unwrap();
        fs::write(routed.join(DIRECTIVE_FILE), "a/b").unwrap();
        fs::write(nested.join(DIRECTIVE_FILE), "c/d").unwrap();

        let source = LocalSource::new(dir.path());
        let mut dirs = source.list_directories().unwrap();
        dirs.sort();
        assert_eq!(dirs.len(), 2);
        assert!(dirs.contains(&routed.to_string_lossy().into_owned()));
        assert!(dirs.contains(&nested.to_string_lossy().into_owned()));
    }

    #[test]
    fn test_read_directive_trims_and_handles_missing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(DIRECTIVE_FILE), "  documents/work \n").unwrap();

        let source = LocalSource::new(dir.path());
        let dir_id = dir.path().to_string_lossy().into_owned();
        assert_eq!(
            source.read_directive(&dir_id).unwrap(),
            Some("documents/work".to_string())
        );

        let other = tempdir().unwrap();
        let other_id = other.path().to_string_lossy().into_owned();
        assert_eq!(source.read_directive(&other_id).unwrap(), None);
    }

    #[test]
    fn test_list_files_excludes_marker_and_subdirs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(DIRECTIVE_FILE), "x").unwrap();
        fs::write(dir.path().join("clip.mov"), b"0123456789").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/deep.mov"), b"x").unwrap();

        let source = LocalSource::new(dir.path());
        let dir_id = dir.path().to_string_lossy().into_owned();
        let entries = source.list_files(&dir_id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "clip.mov");
        assert_eq!(entries[0].size, 10);
        assert!(entries[0].modified > 0);
    }

    #[test]
    fn test_fetch_copies_bytes() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("clip.mov"), b"payload").unwrap();

        let source = LocalSource::new(src.path());
        let src_id = src.path().to_string_lossy().into_owned();
        let entry = source.list_files(&src_id).unwrap().remove(0);
        let dest = dst.path().join("clip.mov");
        source.fetch(&entry, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_snapshot_includes_markers() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(DIRECTIVE_FILE), "x").unwrap();
        fs::write(dir.path().join("clip.mov"), b"abc").unwrap();

        let source = LocalSource::new(dir.path());
        let snapshot = source.snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
    }
}
