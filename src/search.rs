//! Recursive file search built on the task pool.
//!
//! The demonstrative client for the pool: walk a directory tree, submit one
//! task per candidate file, and collect the outcomes through the tasks'
//! handles. The walk runs on the calling thread while workers read and match
//! files behind it, so directory traversal and file matching overlap.
//!
//! # Flow
//!
//! ```text
//! walk root ──filter──► submit(read + match) ──► handle per path
//!                                   │
//! done() + wait_for_completion() ◄──┘
//!                                   │
//! join handles ──► per-path FileMatches / SearchError
//! ```
//!
//! Per-file I/O failures travel through the task's return value and abort
//! nothing else; a task panic (a matcher bug, not an expected condition)
//! surfaces as [`SearchError::Task`] for that path only.

use crate::error::JoinError;
use crate::pool::{PoolConfig, TaskPool};
use crate::task::TaskHandle;
use ignore::WalkBuilder;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// Configuration
// ============================================================================

/// Search configuration.
pub struct SearchConfig {
    /// Root directory of the walk.
    pub root: PathBuf,

    /// Content patterns. A file matches when any pattern matches its bytes.
    pub matchers: Vec<BytesRegex>,

    /// File-name filter applied to the full path before a task is submitted.
    pub filter: Regex,

    /// Worker thread count for the pool.
    pub workers: usize,

    /// Honor `.gitignore` and global git excludes during the walk.
    pub respect_gitignore: bool,

    /// Skip hidden files and directories.
    pub skip_hidden: bool,
}

impl SearchConfig {
    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.workers > 0, "workers must be > 0");
        assert!(!self.matchers.is_empty(), "at least one matcher is required");
    }
}

// ============================================================================
// Results
// ============================================================================

/// Matches found in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatches {
    /// True when any matcher hit.
    pub matched: bool,
    /// Every match, in file order per matcher. Lossily decoded to UTF-8.
    pub matches: Vec<String>,
}

/// Why one file produced no [`FileMatches`].
#[non_exhaustive]
#[derive(Debug)]
pub enum SearchError {
    /// Reading the file failed.
    Io(io::Error),
    /// The matching task itself failed (panic or abandoned).
    Task(JoinError),
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::Io(err) => write!(f, "read failed: {err}"),
            SearchError::Task(err) => write!(f, "search task failed: {err}"),
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SearchError::Io(err) => Some(err),
            SearchError::Task(err) => Some(err),
        }
    }
}

/// Aggregate counters for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    /// Directories visited by the walk.
    pub dirs_visited: u64,
    /// Files that passed the filter and were submitted.
    pub files_searched: u64,
    /// Total bytes read by matching tasks.
    pub bytes_read: u64,
}

/// Completed search: per-file outcomes keyed by path, plus counters.
pub struct SearchReport {
    pub results: BTreeMap<PathBuf, Result<FileMatches, SearchError>>,
    pub stats: SearchStats,
}

// ============================================================================
// Search
// ============================================================================

/// Reads one file and runs every matcher over its contents.
///
/// Bytes are matched raw (no UTF-8 assumption); match text is decoded
/// lossily for reporting.
fn find_matches(
    path: &Path,
    matchers: &[BytesRegex],
    bytes_read: &AtomicU64,
) -> io::Result<FileMatches> {
    let contents = fs::read(path)?;
    bytes_read.fetch_add(contents.len() as u64, Ordering::Relaxed);

    let mut matches = Vec::new();
    for matcher in matchers {
        for found in matcher.find_iter(&contents) {
            matches.push(String::from_utf8_lossy(found.as_bytes()).into_owned());
        }
    }

    Ok(FileMatches {
        matched: !matches.is_empty(),
        matches,
    })
}

/// Walks `config.root`, matching every filtered file on the pool.
///
/// Walk errors (unreadable directories, broken links) are reported to
/// stderr and skipped; they fail the affected subtree, not the run.
pub fn search(config: &SearchConfig) -> SearchReport {
    config.validate();

    let pool = TaskPool::with_config(PoolConfig {
        workers: config.workers,
        ..PoolConfig::default()
    });
    let matchers = Arc::new(config.matchers.clone());
    let bytes_read = Arc::new(AtomicU64::new(0));
    let mut stats = SearchStats::default();

    let mut pending: BTreeMap<PathBuf, TaskHandle<io::Result<FileMatches>>> = BTreeMap::new();

    let walker = WalkBuilder::new(&config.root)
        .hidden(config.skip_hidden)
        .ignore(false)
        .parents(config.respect_gitignore)
        .git_ignore(config.respect_gitignore)
        .git_global(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                eprintln!("fsearch: walk error: {err}");
                continue;
            }
        };

        match entry.file_type() {
            Some(ft) if ft.is_dir() => {
                stats.dirs_visited += 1;
                continue;
            }
            Some(ft) if ft.is_file() => {}
            // Symlinks, sockets, and entries with no type hint are skipped.
            _ => continue,
        }

        let path = entry.into_path();
        if !config.filter.is_match(&path.to_string_lossy()) {
            continue;
        }
        stats.files_searched += 1;

        let matchers = Arc::clone(&matchers);
        let bytes_read = Arc::clone(&bytes_read);
        let task_path = path.clone();
        let handle = pool.submit(move || find_matches(&task_path, &matchers, &bytes_read));
        pending.insert(path, handle);
    }

    pool.done();
    pool.wait_for_completion();

    let results = pending
        .into_iter()
        .map(|(path, handle)| {
            let outcome = match handle.join() {
                Ok(Ok(matches)) => Ok(matches),
                Ok(Err(err)) => Err(SearchError::Io(err)),
                Err(err) => Err(SearchError::Task(err)),
            };
            (path, outcome)
        })
        .collect();

    stats.bytes_read = bytes_read.load(Ordering::Relaxed);

    SearchReport { results, stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(root: &Path) -> SearchConfig {
        SearchConfig {
            root: root.to_path_buf(),
            matchers: vec![BytesRegex::new("needle").unwrap()],
            filter: Regex::new(".*").unwrap(),
            workers: 2,
            respect_gitignore: false,
            skip_hidden: false,
        }
    }

    #[test]
    fn find_matches_reports_every_hit() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hay.txt");
        fs::write(&file, "a needle, another needle, and hay").unwrap();

        let matchers = vec![BytesRegex::new("needle").unwrap()];
        let bytes = AtomicU64::new(0);
        let found = find_matches(&file, &matchers, &bytes).unwrap();

        assert!(found.matched);
        assert_eq!(found.matches, vec!["needle", "needle"]);
        assert_eq!(bytes.load(Ordering::Relaxed), 33);
    }

    #[test]
    fn find_matches_propagates_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.txt");

        let matchers = vec![BytesRegex::new("x").unwrap()];
        let bytes = AtomicU64::new(0);
        let err = find_matches(&missing, &matchers, &bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(bytes.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn filter_limits_submitted_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), "needle").unwrap();
        fs::write(dir.path().join("skip.log"), "needle").unwrap();

        let mut config = config_for(dir.path());
        config.filter = Regex::new(r"\.txt$").unwrap();

        let report = search(&config);
        assert_eq!(report.stats.files_searched, 1);
        assert_eq!(report.results.len(), 1);
        let (path, outcome) = report.results.iter().next().unwrap();
        assert!(path.ends_with("keep.txt"));
        assert!(outcome.as_ref().unwrap().matched);
    }

    #[test]
    fn matching_is_byte_oriented() {
        let dir = tempfile::tempdir().unwrap();
        let mut contents = vec![0u8, 159, 146, 150]; // invalid UTF-8 prefix
        contents.extend_from_slice(b"needle");
        fs::write(dir.path().join("bin.dat"), &contents).unwrap();

        let report = search(&config_for(dir.path()));
        let outcome = report.results.values().next().unwrap();
        assert!(outcome.as_ref().unwrap().matched);
    }

    #[test]
    #[should_panic(expected = "at least one matcher is required")]
    fn empty_matchers_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(dir.path());
        config.matchers.clear();
        let _report = search(&config);
    }
}
