//! Watch mode: translate file-system events into the smallest correct
//! rebuild.
//!
//! Configuration-file events tear down every watcher, rebuild the
//! graph, and reinstall; source events re-run the orchestrator, which
//! re-analyzes from the deepest layer. Events are debounced so editor
//! save bursts coalesce into one walk.

use anyhow::{Context, Result};
use notify::{RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::builder::run_build;
use crate::config::WatchDepth;
use crate::files::is_source_file;
use crate::session::Session;

const DEBOUNCE_DELAY: Duration = Duration::from_millis(250);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Coalesces bursts of paths; flushes once no event has arrived for
/// the configured delay.
pub struct Debouncer {
    delay: Duration,
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Debouncer {
            delay,
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    pub fn record(&mut self, path: PathBuf) {
        self.record_at(Instant::now(), path);
    }

    pub fn record_at(&mut self, now: Instant, path: PathBuf) {
        self.pending.insert(path);
        self.last_event = Some(now);
    }

    /// Drain the pending set once the delay has elapsed since the most
    /// recent event. `None` while events are still settling or nothing
    /// is pending.
    pub fn flush_ready(&mut self, now: Instant) -> Option<FxHashSet<PathBuf>> {
        let last = self.last_event?;
        if now.duration_since(last) <= self.delay {
            return None;
        }
        self.last_event = None;
        Some(std::mem::take(&mut self.pending))
    }
}

/// What to watch for the current graph, and how to classify events
/// against it.
struct WatchPlan {
    config_files: FxHashSet<PathBuf>,
    directories: Vec<(PathBuf, WatchDepth)>,
    explicit_files: FxHashSet<PathBuf>,
    output_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    ConfigChanged,
    SourceChanged,
}

impl WatchPlan {
    fn from_session(session: &mut Session) -> Result<Self> {
        let mut plan = WatchPlan {
            config_files: FxHashSet::default(),
            directories: Vec::new(),
            explicit_files: FxHashSet::default(),
            output_dirs: Vec::new(),
        };

        let ids: Vec<_> = session.graph.queue.build_order().cloned().collect();
        for id in &ids {
            let config = session.configs.load(id)?;
            plan.config_files.insert(id.as_path().to_path_buf());

            for (dir, depth) in &config.wildcard_directories {
                if !plan.directories.iter().any(|(d, _)| d == dir) {
                    plan.directories.push((dir.clone(), *depth));
                }
            }

            for input in &config.input_files {
                if !plan.covers(input) {
                    plan.explicit_files.insert(input.clone());
                }
            }

            if let Some(out_dir) = config.out_dir.as_deref() {
                plan.output_dirs.push(out_dir.to_path_buf());
            }
            if let Some(out_file) = config.out_file.as_deref()
                && let Some(parent) = out_file.parent()
            {
                plan.output_dirs.push(parent.to_path_buf());
            }
        }

        Ok(plan)
    }

    fn covers(&self, path: &Path) -> bool {
        self.directories.iter().any(|(dir, depth)| match depth {
            WatchDepth::Recursive => path.starts_with(dir),
            WatchDepth::Flat => path.parent() == Some(dir.as_path()),
        })
    }

    fn classify(&self, path: &Path) -> Option<EventKind> {
        if self.config_files.contains(path) {
            return Some(EventKind::ConfigChanged);
        }
        // Our own emits land under output directories; reacting to
        // them would loop forever.
        if self.output_dirs.iter().any(|dir| path.starts_with(dir)) {
            return None;
        }
        if self.explicit_files.contains(path) {
            return Some(EventKind::SourceChanged);
        }
        if self.covers(path) && is_source_file(path) {
            return Some(EventKind::SourceChanged);
        }
        None
    }
}

/// Run the watch loop forever (until event delivery ends).
pub fn run(session: &mut Session) -> Result<()> {
    loop {
        let plan = WatchPlan::from_session(session)?;
        let (tx, rx) = mpsc::channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
                Err(err) => warn!("watch error: {err}"),
            }
        })
        .context("failed to create file watcher")?;

        for config in &plan.config_files {
            watch_path(&mut watcher, config, RecursiveMode::NonRecursive);
        }
        for (dir, depth) in &plan.directories {
            let mode = match depth {
                WatchDepth::Recursive => RecursiveMode::Recursive,
                WatchDepth::Flat => RecursiveMode::NonRecursive,
            };
            watch_path(&mut watcher, dir, mode);
        }
        for file in &plan.explicit_files {
            watch_path(&mut watcher, file, RecursiveMode::NonRecursive);
        }

        info!("watching {} projects for changes", session.graph.queue.project_count());

        let mut debouncer = Debouncer::new(DEBOUNCE_DELAY);
        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(path) => {
                    if plan.classify(&path).is_some() {
                        debouncer.record(path);
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
            }

            if let Some(paths) = debouncer.flush_ready(Instant::now()) {
                let config_changed = paths
                    .iter()
                    .any(|path| plan.classify(path) == Some(EventKind::ConfigChanged));
                if config_changed {
                    info!("configuration change detected, rebuilding project graph");
                    break;
                }
                debug!("{} changed paths, rebuilding", paths.len());
                println!("File change detected. Rebuilding...");
                if let Err(err) = run_build(session) {
                    session.reporter.error(&format!("{err:#}"));
                }
            }
        }

        // Dropping the watcher closes every active watch before the
        // graph is rebuilt and watchers are reinstalled.
        drop(watcher);
        if let Err(err) = session.rebuild_graph() {
            session.reporter.error(&format!("{err:#}"));
            // Keep watching with the old graph; the next config change
            // may fix the parse error.
            continue;
        }
        println!("Project configuration changed. Rebuilding...");
        if let Err(err) = run_build(session) {
            session.reporter.error(&format!("{err:#}"));
        }
    }
}

fn watch_path(watcher: &mut notify::RecommendedWatcher, path: &Path, mode: RecursiveMode) {
    if let Err(err) = watcher.watch(path, mode) {
        // Missing inputs surface as Unbuildable during the walk; a
        // failed watch install should not kill the loop.
        debug!("cannot watch {}: {err}", path.display());
    }
}
