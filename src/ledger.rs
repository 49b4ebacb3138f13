use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::identity::Identity;

/// One completed copy. An identity present in the ledger means the bytes
/// were durably copied to `destination_path` at `timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub source_path: String,
    pub destination_path: String,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct LedgerStats {
    pub total_files: usize,
    pub total_bytes: u64,
    /// destination directory -> (files, bytes)
    pub per_destination: BTreeMap<String, (usize, u64)>,
}

/// Durable identity -> FileRecord store; the sole authority on "already
/// copied". Persisted as a whole JSON document on every mutation, via
/// temp-file-and-rename so a crash mid-write cannot truncate the previous
/// store. All mutations go through the engine's single worker loop.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    records: BTreeMap<String, FileRecord>,
}

impl Ledger {
    /// Read the persisted store. A missing or unparsable file yields an
    /// empty ledger and a log line, never a fatal error; losing history
    /// only weakens the one-and-done guarantee for this run.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, FileRecord>>(&text) {
                Ok(records) => {
                    info!("Loaded history for {} files", records.len());
                    records
                }
                Err(err) => {
                    warn!(
                        "History file {} is unreadable, starting with empty history \
                         (files may be copied again): {}",
                        path.display(),
                        err
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(err) => {
                warn!(
                    "Error reading history file {}, starting with empty history: {}",
                    path.display(),
                    err
                );
                BTreeMap::new()
            }
        };
        Ledger { path, records }
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.records.contains_key(identity.as_str())
    }

    pub fn get(&self, identity: &Identity) -> Option<&FileRecord> {
        self.records.get(identity.as_str())
    }

    /// Insert or replace a record and persist. Replacement only happens on
    /// a force-recopy; normal operation writes each identity once.
    pub fn record(&mut self, identity: Identity, record: FileRecord) -> Result<(), Error> {
        self.records.insert(identity.into_key(), record);
        self.persist()
    }

    /// Drop records whose identity was not observed in the current full
    /// scan. Only meaningful after a full pass, since event-driven partial scans
    /// lack a complete view of what still exists.
    pub fn prune(&mut self, live: &HashSet<Identity>) -> Result<usize, Error> {
        let before = self.records.len();
        self.records.retain(|key, _| live.contains(key.as_str()));
        let removed = before - self.records.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<(), Error> {
        self.records.clear();
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.records.iter()
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats::default();
        for record in self.records.values() {
            stats.total_files += 1;
            stats.total_bytes += record.size;
            let dest_dir = Path::new(&record.destination_path)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let entry = stats.per_destination.entry(dest_dir).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += record.size;
        }
        stats
    }

    fn persist(&self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(&self.records)?;
        fs::write(&tmp_path, text)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
