use chrono::Utc;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::Error;
use crate::identity;
use crate::ledger::{FileRecord, Ledger};
use crate::routing;
use crate::source::Source;

/// Per-directory evaluation result.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CopyOutcome {
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Evaluate one source directory: resolve its directive, then copy every
/// file whose identity the ledger has not seen. Directories are never
/// marked complete as a unit; completeness is purely per-file via the
/// ledger, so a partially-failed directory resumes where it left off.
pub fn process_directory(
    source: &dyn Source,
    ledger: &mut Ledger,
    config: &AppConfig,
    dir: &str,
) -> Result<CopyOutcome, Error> {
    let directive = match source.read_directive(dir)? {
        Some(text) => text,
        None => {
            debug!("No directive marker in {}, skipping", dir);
            return Ok(CopyOutcome::default());
        }
    };

    let resolved = routing::resolve(&directive, config)
        .map_err(|_| Error::Directive(format!("empty directive in {}", dir)))?;
    let target_dir = resolved.join(Path::new(&config.dest_dir));
    debug!("Target directory for {}: {}", dir, target_dir.display());

    let mut outcome = CopyOutcome::default();
    for entry in source.list_files(dir)? {
        let id = identity::fingerprint(&entry);
        if !config.force_recopy && ledger.contains(&id) {
            outcome.skipped += 1;
            continue;
        }

        let target = target_dir.join(&entry.name);
        let copy_result = std::fs::create_dir_all(&target_dir)
            .map_err(Error::from)
            .and_then(|_| source.fetch(&entry, &target));
        match copy_result {
            Ok(()) => {
                // Record only after the bytes are durably in place; a crash
                // before this line leaves the file unrecorded and it is
                // copied again on the next scan.
                ledger.record(
                    id,
                    FileRecord {
                        source_path: entry.path.clone(),
                        destination_path: target.to_string_lossy().into_owned(),
                        size: entry.size,
                        timestamp: Utc::now(),
                    },
                )?;
                info!("Copied: {} to {}/", entry.name, target_dir.display());
                outcome.copied += 1;
            }
            Err(err) => {
                // Per-file failure: leave it unrecorded so the next trigger
                // retries it, and keep going with the siblings.
                error!(
                    "Copy failed for {} -> {} (identity {}): {}",
                    entry.path,
                    target.display(),
                    id,
                    err
                );
                outcome.failed += 1;
            }
        }
    }

    if outcome.copied > 0 || outcome.failed > 0 {
        info!(
            "Processed {}: {} copied, {} skipped, {} failed",
            dir, outcome.copied, outcome.skipped, outcome.failed
        );
    }
    if outcome.failed > 0 {
        warn!(
            "{} file(s) in {} failed to copy and will be retried",
            outcome.failed, dir
        );
    }
    Ok(outcome)
}
