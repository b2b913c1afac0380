//! Path traversal: walks each root and yields accepted regular files with their sizes.

use clap::ValueEnum;
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::disk_detect::drive_type_for_path;
use crate::error::DiscoveryError;
use crate::utils::config::ProgressConsts;
use crate::{DiscoveryTotals, PendingFile};

/// How to walk a root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkMode {
    /// `walkdir` on one thread.
    Serial,
    /// `jwalk` on the rayon pool.
    Parallel,
    /// Parallel on SSD roots, serial otherwise.
    #[default]
    Auto,
}

#[derive(Clone, Copy, Debug)]
pub struct DiscoveryOpts {
    /// Descend into subdirectories. When false only direct children of a root are considered.
    pub recursive: bool,
    pub follow_links: bool,
    pub walk_mode: WalkMode,
}

impl Default for DiscoveryOpts {
    fn default() -> Self {
        Self {
            recursive: true,
            follow_links: false,
            walk_mode: WalkMode::Auto,
        }
    }
}

/// One result from a directory walk: either a path to consider or an error with optional path.
pub enum WalkOutcome {
    Ok { path: PathBuf, is_file: bool },
    Err { msg: String, path: Option<PathBuf> },
}

/// Convert a jwalk result into [`WalkOutcome`].
pub fn to_outcome_jwalk(r: Result<jwalk::DirEntry<((), ())>, jwalk::Error>) -> WalkOutcome {
    match r {
        Ok(entry) => WalkOutcome::Ok {
            is_file: entry.file_type().is_file(),
            path: entry.path(),
        },
        Err(err) => WalkOutcome::Err {
            msg: format!("{}", err),
            path: err.path().map(PathBuf::from),
        },
    }
}

/// Convert a walkdir result into [`WalkOutcome`].
pub fn to_outcome_walkdir(r: Result<walkdir::DirEntry, walkdir::Error>) -> WalkOutcome {
    match r {
        Ok(entry) => WalkOutcome::Ok {
            is_file: entry.file_type().is_file(),
            path: entry.into_path(),
        },
        Err(err) => WalkOutcome::Err {
            msg: format!("{}", err),
            path: err.path().map(PathBuf::from),
        },
    }
}

fn max_depth(opts: &DiscoveryOpts) -> usize {
    if opts.recursive { usize::MAX } else { 1 }
}

fn jwalk_iter(root: &Path, opts: &DiscoveryOpts) -> Box<dyn Iterator<Item = WalkOutcome>> {
    use jwalk::Parallelism;
    use std::time::Duration;
    Box::new(
        jwalk::WalkDir::new(root)
            .follow_links(opts.follow_links)
            .max_depth(max_depth(opts))
            .parallelism(Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_secs(60),
            })
            .into_iter()
            .map(to_outcome_jwalk),
    )
}

fn walkdir_iter(root: &Path, opts: &DiscoveryOpts) -> Box<dyn Iterator<Item = WalkOutcome>> {
    use walkdir::WalkDir;
    Box::new(
        WalkDir::new(root)
            .follow_links(opts.follow_links)
            .max_depth(max_depth(opts))
            .into_iter()
            .map(to_outcome_walkdir),
    )
}

fn use_parallel_walk(root: &Path, mode: WalkMode) -> bool {
    match mode {
        WalkMode::Serial => false,
        WalkMode::Parallel => true,
        WalkMode::Auto => drive_type_for_path(root).is_ssd(),
    }
}

/// Walk one root. Regular files passing `accept` are stat'ed and handed to `emit`; every traversal
/// or metadata error goes to `on_error` and the walk continues. A root that is itself a file is
/// considered on its own. Returns totals over accepted files only.
pub fn discover_root(
    root: &Path,
    opts: &DiscoveryOpts,
    accept: &mut dyn FnMut(&Path) -> bool,
    emit: &mut dyn FnMut(PendingFile),
    on_error: &mut dyn FnMut(DiscoveryError),
) -> DiscoveryTotals {
    let parallel = use_parallel_walk(root, opts.walk_mode);
    debug!(
        "Walking {} ({}, recursive={})",
        root.display(),
        if parallel { "jwalk" } else { "walkdir" },
        opts.recursive
    );
    let iter = match parallel {
        true => jwalk_iter(root, opts),
        false => walkdir_iter(root, opts),
    };
    run_walk_loop(iter, opts, accept, emit, on_error)
}

/// Consume `iter`: skip non-files, filter with `accept`, stat the rest for their size.
pub fn run_walk_loop<I>(
    iter: I,
    opts: &DiscoveryOpts,
    accept: &mut dyn FnMut(&Path) -> bool,
    emit: &mut dyn FnMut(PendingFile),
    on_error: &mut dyn FnMut(DiscoveryError),
) -> DiscoveryTotals
where
    I: Iterator<Item = WalkOutcome>,
{
    let mut totals = DiscoveryTotals::default();
    let mut last_log = Instant::now();
    for outcome in iter {
        match outcome {
            WalkOutcome::Ok { path, is_file } => {
                if !is_file || !accept(&path) {
                    continue;
                }
                let meta = if opts.follow_links {
                    std::fs::metadata(&path)
                } else {
                    std::fs::symlink_metadata(&path)
                };
                match meta {
                    Ok(meta) => {
                        totals.file_count += 1;
                        totals.total_bytes += meta.len();
                        emit(PendingFile::new(path, meta.len()));
                    }
                    Err(e) => on_error(DiscoveryError {
                        path: Some(path),
                        message: e.to_string(),
                    }),
                }
                if last_log.elapsed() >= ProgressConsts::DISCOVERY_LOG_INTERVAL {
                    info!(
                        "Discovered {} files ({} bytes)...",
                        totals.file_count, totals.total_bytes
                    );
                    last_log = Instant::now();
                }
            }
            WalkOutcome::Err { msg, path } => on_error(DiscoveryError { path, message: msg }),
        }
    }
    totals
}
