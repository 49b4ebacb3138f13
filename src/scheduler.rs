use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::AppConfig;
use crate::error::Error;
use crate::executor;
use crate::identity::{self, Identity};
use crate::ledger::Ledger;
use crate::source::{LocalSource, S3Source, Source, DIRECTIVE_FILE};

/// Signals consumed by the worker loop. Everything that happens to the
/// ledger or the destination tree happens on that one loop; notification
/// callbacks and timers only enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A directory under the source root may need evaluation.
    DirChanged(String),
    /// Finish the current evaluation, persist, and exit.
    Shutdown,
}

/// How long a directory's signals must settle before it is evaluated.
/// Bursts of writes to one directory collapse into a single evaluation.
const DEBOUNCE: Duration = Duration::from_millis(500);

const STATS_INTERVAL: Duration = Duration::from_secs(300);

/// The synchronization engine: owns the ledger, the source, and the
/// single serialized worker loop that reconciles filesystem events,
/// periodic rescans, and remote polls into per-directory evaluations.
pub struct Engine {
    config: AppConfig,
    ledger: Ledger,
    source: Box<dyn Source>,
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
}

impl Engine {
    /// Build the engine. Failures here (unreachable roots, bad remote
    /// credentials) are fatal; once `run` starts, errors are absorbed.
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        config.validate()?;

        let source: Box<dyn Source> = if config.use_s3_source {
            let s3 = S3Source::from_config(&config);
            // Probe once so bad credentials fail startup instead of being
            // retried forever by the poll loop.
            s3.list_directories()?;
            Box::new(s3)
        } else {
            fs::create_dir_all(&config.source_dir)?;
            fs::create_dir_all(&config.dest_dir)?;
            Box::new(LocalSource::new(&config.source_dir))
        };

        let ledger = Ledger::load(&config.history_file);
        let (tx, rx) = mpsc::channel();

        Ok(Engine {
            config,
            ledger,
            source,
            tx,
            rx,
        })
    }

    /// Handle for injecting signals from outside the worker loop
    /// (ctrl-c handler, tests).
    pub fn sender(&self) -> Sender<Signal> {
        self.tx.clone()
    }

    /// Run until a `Shutdown` signal arrives. The current directory
    /// evaluation (including any in-flight ledger persist) always
    /// completes before this returns, so the store is never left torn.
    pub fn run(&mut self) -> Result<(), Error> {
        info!("TurboSort initialized: watching {}", self.config.source_dir);
        info!("Files will be sorted to {}", self.config.dest_dir);
        if self.config.enable_year_prefix {
            info!("Year prefix feature is enabled");
        }
        if self.config.enable_drive_suffix {
            info!("Drive suffix '{}' is enabled", self.config.drive_suffix);
        }
        if self.config.force_recopy {
            warn!("FORCE_RECOPY is set: previously copied files will be copied again");
        }

        // Keep the watcher alive for the whole run; dropping it stops
        // event delivery.
        let _watcher = if self.config.use_s3_source {
            None
        } else {
            Some(self.spawn_watcher()?)
        };

        let rescan_every = (self.config.rescan_interval > 0)
            .then(|| Duration::from_secs(self.config.rescan_interval));
        let poll_every = (self.config.use_s3_source && self.config.s3_poll_interval > 0)
            .then(|| Duration::from_secs(self.config.s3_poll_interval));

        // Startup full scan is unconditional.
        self.full_scan();

        let mut pending: HashMap<String, Instant> = HashMap::new();
        let mut remote_snapshot: Option<BTreeMap<String, (u64, i64)>> = None;
        if poll_every.is_some() {
            // Baseline taken right after the startup scan, so the first
            // poll diffs against startup state; without it, an object
            // uploaded before the first poll would land inside the
            // baseline and never trigger an evaluation.
            match self.source.snapshot() {
                Ok(snapshot) => remote_snapshot = Some(snapshot),
                Err(err) => {
                    warn!("Baseline snapshot failed, first poll will seed it: {}", err)
                }
            }
        }

        let mut next_rescan = rescan_every.map(|d| Instant::now() + d);
        let mut next_poll = poll_every.map(|d| Instant::now() + d);
        let mut next_stats = Instant::now() + STATS_INTERVAL;

        loop {
            let now = Instant::now();
            let mut deadline = now + Duration::from_secs(1);
            if let Some(t) = pending.values().map(|t| *t + DEBOUNCE).min() {
                deadline = deadline.min(t);
            }
            for t in [next_rescan, next_poll, Some(next_stats)].into_iter().flatten() {
                deadline = deadline.min(t);
            }

            match self.rx.recv_timeout(deadline.saturating_duration_since(now)) {
                Ok(Signal::DirChanged(dir)) => {
                    pending.insert(dir, Instant::now());
                }
                Ok(Signal::Shutdown) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            // Coalesce whatever else is queued without blocking.
            let mut shutdown = false;
            while let Ok(signal) = self.rx.try_recv() {
                match signal {
                    Signal::DirChanged(dir) => {
                        pending.insert(dir, Instant::now());
                    }
                    Signal::Shutdown => shutdown = true,
                }
            }

            for dir in ready_dirs(&mut pending, Instant::now()) {
                self.evaluate(&dir);
            }

            if shutdown {
                break;
            }

            let now = Instant::now();
            if let (Some(t), Some(every)) = (next_rescan, rescan_every) {
                if now >= t {
                    self.full_scan();
                    next_rescan = Some(Instant::now() + every);
                }
            }
            if let (Some(t), Some(every)) = (next_poll, poll_every) {
                if now >= t {
                    self.poll_remote(&mut remote_snapshot, &mut pending);
                    next_poll = Some(Instant::now() + every);
                }
            }
            if now >= next_stats {
                if !self.ledger.is_empty() {
                    let stats = self.ledger.stats();
                    info!(
                        "Copy totals: {} files, {:.2} MB",
                        stats.total_files,
                        stats.total_bytes as f64 / (1024.0 * 1024.0)
                    );
                }
                next_stats = now + STATS_INTERVAL;
            }
        }

        info!("Stopping TurboSort...");
        if !self.ledger.is_empty() {
            let stats = self.ledger.stats();
            info!(
                "Final totals: {} files copied, {:.2} MB",
                stats.total_files,
                stats.total_bytes as f64 / (1024.0 * 1024.0)
            );
        }
        Ok(())
    }

    /// One PENDING -> PROCESSING transition: resolve the directive and run
    /// the copy executor. Everything recoverable ends up in the logs.
    fn evaluate(&mut self, dir: &str) {
        debug!("Evaluating {}", dir);
        match executor::process_directory(
            self.source.as_ref(),
            &mut self.ledger,
            &self.config,
            dir,
        ) {
            Ok(_) => {}
            Err(Error::Directive(msg)) => warn!("{}", msg),
            Err(err) => error!("Error processing {}: {}", dir, err),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Evaluate every directive directory, then prune ledger entries whose
    /// source file no longer exists. The live set comes from a full source
    /// snapshot, not from directive directories, so records survive a
    /// directory merely losing its marker. Pruning is skipped when the
    /// snapshot fails, since a partial view must not delete history.
    pub fn full_scan(&mut self) {
        info!("Scanning for {} directories...", DIRECTIVE_FILE);
        let dirs = match self.source.list_directories() {
            Ok(dirs) => dirs,
            Err(err) => {
                error!("Full scan listing failed: {}", err);
                return;
            }
        };
        for dir in &dirs {
            self.evaluate(dir);
        }

        let snapshot = match self.source.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Skipping prune, snapshot failed: {}", err);
                return;
            }
        };
        let live: HashSet<Identity> = snapshot
            .iter()
            .map(|(key, (size, modified))| {
                identity::fingerprint_parts(&self.source.entry_path(key), *size, *modified)
            })
            .collect();
        match self.ledger.prune(&live) {
            Ok(0) => {}
            Ok(removed) => info!("Pruned {} ledger entries for deleted sources", removed),
            Err(err) => error!("Error pruning ledger: {}", err),
        }
    }

    /// Remote poll cycle: list current object keys, diff against the
    /// previous snapshot, and mark changed prefixes pending. A failed poll
    /// is skipped and retried next interval.
    fn poll_remote(
        &mut self,
        previous: &mut Option<BTreeMap<String, (u64, i64)>>,
        pending: &mut HashMap<String, Instant>,
    ) {
        let current = match self.source.snapshot() {
            Ok(current) => current,
            Err(err) => {
                warn!("Remote poll failed, retrying next interval: {}", err);
                return;
            }
        };

        if let Some(previous) = previous.as_ref() {
            let changed = diff_dirs(previous, &current);
            if !changed.is_empty() {
                debug!("Remote poll: {} changed prefix(es)", changed.len());
            }
            let now = Instant::now();
            for dir in changed {
                pending.insert(dir, now);
            }
        }
        *previous = Some(current);
    }

    fn spawn_watcher(&self) -> Result<RecommendedWatcher, Error> {
        let tx = self.tx.clone();
        let root = PathBuf::from(&self.config.source_dir);
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    // Enqueue the containing directory and nothing else;
                    // all I/O happens on the worker loop.
                    for path in &event.paths {
                        if let Some(parent) = path.parent() {
                            let _ = tx.send(Signal::DirChanged(
                                parent.to_string_lossy().into_owned(),
                            ));
                        }
                    }
                }
                Err(err) => error!("Watch error: {}", err),
            })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!("Watching {} for changes", root.display());
        Ok(watcher)
    }
}

/// Remove and return the pending directories whose last signal is at
/// least `DEBOUNCE` old. Repeated triggers for one directory count once.
fn ready_dirs(pending: &mut HashMap<String, Instant>, now: Instant) -> Vec<String> {
    let ready: Vec<String> = pending
        .iter()
        .filter(|(_, last)| now.duration_since(**last) >= DEBOUNCE)
        .map(|(dir, _)| dir.clone())
        .collect();
    for dir in &ready {
        pending.remove(dir);
    }
    ready
}

/// Directories whose contents differ between two snapshots: any key
/// added, removed, or changed in size/mtime marks its containing prefix.
fn diff_dirs(
    previous: &BTreeMap<String, (u64, i64)>,
    current: &BTreeMap<String, (u64, i64)>,
) -> Vec<String> {
    let mut dirs: Vec<String> = Vec::new();
    let mut mark = |key: &str| {
        let dir = parent_prefix(key);
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    };

    for (key, meta) in current {
        if previous.get(key) != Some(meta) {
            mark(key);
        }
    }
    for key in previous.keys() {
        if !current.contains_key(key) {
            mark(key);
        }
    }
    dirs
}

/// `media/shoot_a/clip.mov` -> `media/shoot_a/`; top-level keys map to the
/// empty root prefix.
fn parent_prefix(key: &str) -> String {
    match key.rfind('/') {
        Some(i) => key[..=i].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_prefix() {
        assert_eq!(parent_prefix("media/shoot_a/clip.mov"), "media/shoot_a/");
        assert_eq!(parent_prefix("clip.mov"), "");
    }

    #[test]
    fn test_ready_dirs_waits_for_debounce() {
        let mut pending = HashMap::new();
        let start = Instant::now();
        pending.insert("a".to_string(), start);
        pending.insert("b".to_string(), start + Duration::from_millis(400));

        // Only "a" has settled 500ms after the first signal.
        let ready = ready_dirs(&mut pending, start + DEBOUNCE);
        assert_eq!(ready, vec!["a".to_string()]);
        assert!(pending.contains_key("b"));

        let ready = ready_dirs(&mut pending, start + Duration::from_millis(1000));
        assert_eq!(ready, vec!["b".to_string()]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_ready_dirs_coalesces_repeats() {
        let mut pending = HashMap::new();
        let start = Instant::now();
        // The same directory signaled many times is still one entry.
        pending.insert("a".to_string(), start);
        pending.insert("a".to_string(), start);
        pending.insert("a".to_string(), start);
        assert_eq!(pending.len(), 1);
        assert_eq!(ready_dirs(&mut pending, start + DEBOUNCE).len(), 1);
    }

    fn snapshot(entries: &[(&str, u64, i64)]) -> BTreeMap<String, (u64, i64)> {
        entries
            .iter()
            .map(|(k, size, mtime)| (k.to_string(), (*size, *mtime)))
            .collect()
    }

    #[test]
    fn test_diff_dirs_detects_added_changed_removed() {
        let previous = snapshot(&[
            ("media/a/clip.mov", 100, 10),
            ("media/b/clip.mov", 100, 10),
            ("media/c/clip.mov", 100, 10),
        ]);
        let current = snapshot(&[
            ("media/a/clip.mov", 100, 10),     // unchanged
            ("media/b/clip.mov", 100, 99),     // mtime changed
            ("media/d/new.mov", 5, 1),         // added
        ]);

        let mut dirs = diff_dirs(&previous, &current);
        dirs.sort();
        assert_eq!(
            dirs,
            vec![
                "media/b/".to_string(),
                "media/c/".to_string(),
                "media/d/".to_string()
            ]
        );
    }

    #[test]
    fn test_diff_dirs_identical_snapshots() {
        let snap = snapshot(&[("media/a/clip.mov", 100, 10)]);
        assert!(diff_dirs(&snap, &snap).is_empty());
    }

    #[test]
    fn test_poll_marks_files_added_after_baseline() {
        let source_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let state_dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            source_dir: source_dir.path().to_string_lossy().into_owned(),
            dest_dir: dest_dir.path().to_string_lossy().into_owned(),
            history_file: state_dir
                .path()
                .join("history.json")
                .to_string_lossy()
                .into_owned(),
            ..AppConfig::default()
        };
        let shoot = source_dir.path().join("shoot");
        fs::create_dir_all(&shoot).unwrap();
        fs::write(shoot.join(DIRECTIVE_FILE), "documents/work").unwrap();

        let mut engine = Engine::new(config).unwrap();
        // Baseline as taken right after the startup scan.
        let mut previous = Some(engine.source.snapshot().unwrap());
        let mut pending = HashMap::new();

        // A file arriving between the baseline and the first poll must
        // still mark its directory pending.
        fs::write(shoot.join("late.mov"), b"bytes").unwrap();
        engine.poll_remote(&mut previous, &mut pending);
        assert!(pending.contains_key(&format!("{}/", shoot.to_string_lossy())));

        // The next poll sees no further change.
        pending.clear();
        engine.poll_remote(&mut previous, &mut pending);
        assert!(pending.is_empty());
    }
}
