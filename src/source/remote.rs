use chrono::DateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use super::{Source, SourceEntry, DIRECTIVE_FILE};
use crate::config::AppConfig;
use crate::error::Error;

/// Source backed by an S3-compatible object store, driven through the
/// `aws` CLI. Directory identifiers are key prefixes ending in `/` (the
/// empty string is the bucket/prefix root); key-prefix segments act as
/// directory boundaries. Size and mtime come from object metadata, so
/// identities are reproducible across restarts without filesystem stats.
pub struct S3Source {
    bucket: String,
    prefix: String,
    region: Option<String>,
    endpoint_url: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Object {
    pub key: String,
    pub size: u64,
    pub modified: i64,
}

impl S3Source {
    pub fn from_config(config: &AppConfig) -> Self {
        let trimmed = config.s3_prefix.trim_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };
        S3Source {
            bucket: config.s3_bucket.clone(),
            prefix,
            region: config.s3_region.clone(),
            endpoint_url: config.s3_endpoint_url.clone(),
            access_key: config.s3_access_key.clone(),
            secret_key: config.s3_secret_key.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("aws");
        if let Some(region) = self.region.as_deref().filter(|s| !s.is_empty()) {
            cmd.arg("--region").arg(region);
        }
        if let Some(endpoint) = self.endpoint_url.as_deref().filter(|s| !s.is_empty()) {
            cmd.arg("--endpoint-url").arg(endpoint);
        }
        if let Some(key) = self.access_key.as_deref().filter(|s| !s.is_empty()) {
            cmd.env("AWS_ACCESS_KEY_ID", key);
        }
        if let Some(secret) = self.secret_key.as_deref().filter(|s| !s.is_empty()) {
            cmd.env("AWS_SECRET_ACCESS_KEY", secret);
        }
        cmd
    }

    fn run(mut cmd: Command) -> Result<Vec<u8>, Error> {
        let output = cmd
            .output()
            .map_err(|err| Error::Source(format!("failed to run aws CLI: {}", err)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Source(format!(
                "aws CLI exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn list_objects(&self) -> Result<Vec<S3Object>, Error> {
        let mut cmd = self.command();
        cmd.arg("s3api")
            .arg("list-objects-v2")
            .arg("--bucket")
            .arg(&self.bucket)
            .arg("--output")
            .arg("json");
        if !self.prefix.is_empty() {
            cmd.arg("--prefix").arg(&self.prefix);
        }
        let stdout = Self::run(cmd)?;
        let objects = parse_list_output(&String::from_utf8_lossy(&stdout))?;
        debug!("Listed {} objects under s3://{}/{}", objects.len(), self.bucket, self.prefix);
        Ok(objects)
    }

    fn url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

/// Parse `aws s3api list-objects-v2 --output json`. An empty body (no
/// matching objects) is a valid empty listing.
pub fn parse_list_output(text: &str) -> Result<Vec<S3Object>, Error> {
    #[derive(Deserialize)]
    struct Listing {
        #[serde(rename = "Contents", default)]
        contents: Vec<ListedObject>,
    }

    #[derive(Deserialize)]
    struct ListedObject {
        #[serde(rename = "Key")]
        key: String,
        #[serde(rename = "Size")]
        size: u64,
        #[serde(rename = "LastModified")]
        last_modified: String,
    }

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let listing: Listing = serde_json::from_str(text)
        .map_err(|err| Error::Source(format!("unparsable listing: {}", err)))?;

    listing
        .contents
        .into_iter()
        .map(|obj| {
            let modified = DateTime::parse_from_rfc3339(&obj.last_modified)
                .map_err(|err| {
                    Error::Source(format!(
                        "bad LastModified '{}' for {}: {}",
                        obj.last_modified, obj.key, err
                    ))
                })?
                .timestamp();
            Ok(S3Object {
                key: obj.key,
                size: obj.size,
                modified,
            })
        })
        .collect()
}

/// Key prefixes holding a directive marker, e.g. `media/shoot_a/.turbosort`
/// yields `media/shoot_a/`.
pub fn directories_from(objects: &[S3Object]) -> Vec<String> {
    objects
        .iter()
        .filter_map(|obj| obj.key.strip_suffix(DIRECTIVE_FILE))
        .filter(|dir| dir.is_empty() || dir.ends_with('/'))
        .map(|dir| dir.to_string())
        .collect()
}

/// Objects that are direct children of `dir`: the remainder of the key has
/// no further `/` and is not the directive marker.
pub fn files_under<'a>(objects: &'a [S3Object], dir: &str) -> Vec<&'a S3Object> {
    objects
        .iter()
        .filter(|obj| {
            let rest = match obj.key.strip_prefix(dir) {
                Some(rest) => rest,
                None => return false,
            };
            !rest.is_empty() && !rest.contains('/') && rest != DIRECTIVE_FILE
        })
        .collect()
}

impl Source for S3Source {
    fn list_directories(&self) -> Result<Vec<String>, Error> {
        Ok(directories_from(&self.list_objects()?))
    }

    fn read_directive(&self, dir: &str) -> Result<Option<String>, Error> {
        let mut cmd = self.command();
        cmd.arg("s3")
            .arg("cp")
            .arg(self.url(&format!("{}{}", dir, DIRECTIVE_FILE)))
            .arg("-");
        match Self::run(cmd) {
            Ok(stdout) => Ok(Some(String::from_utf8_lossy(&stdout).trim().to_string())),
            // The CLI reports a missing key as a 404 fetch error; treat it
            // as "not routed" rather than a source failure.
            Err(Error::Source(msg)) if msg.contains("404") || msg.contains("NoSuchKey") => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn list_files(&self, dir: &str) -> Result<Vec<SourceEntry>, Error> {
        let objects = self.list_objects()?;
        let mut entries: Vec<SourceEntry> = files_under(&objects, dir)
            .into_iter()
            .map(|obj| SourceEntry {
                path: self.url(&obj.key),
                name: obj.key[dir.len()..].to_string(),
                size: obj.size,
                modified: obj.modified,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn fetch(&self, entry: &SourceEntry, dest: &Path) -> Result<(), Error> {
        let mut cmd = self.command();
        cmd.arg("s3").arg("cp").arg(&entry.path).arg(dest);
        Self::run(cmd)?;
        Ok(())
    }

    fn snapshot(&self) -> Result<BTreeMap<String, (u64, i64)>, Error> {
        Ok(self
            .list_objects()?
            .into_iter()
            .map(|obj| (obj.key, (obj.size, obj.modified)))
            .collect())
    }

    fn entry_path(&self, key: &str) -> String {
        self.url(key)
    }
}
