//! End-to-end smoke test for the bundled file-search client.

use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use std::fs;
use std::path::Path;
use taskpool_rs::search::{search, SearchConfig, SearchError};

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn base_config(root: &Path) -> SearchConfig {
    SearchConfig {
        root: root.to_path_buf(),
        matchers: vec![BytesRegex::new(r"secret_\w+").unwrap()],
        filter: Regex::new(".*").unwrap(),
        workers: 4,
        respect_gitignore: false,
        skip_hidden: false,
    }
}

#[test]
fn finds_matches_across_a_tree() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "top.txt", "secret_alpha here");
    write(dir.path(), "sub/mid.txt", "nothing interesting");
    write(dir.path(), "sub/deep/low.txt", "secret_beta and secret_gamma");

    let report = search(&base_config(dir.path()));

    assert_eq!(report.stats.files_searched, 3);
    assert!(report.stats.dirs_visited >= 3); // root, sub, sub/deep
    assert_eq!(report.stats.bytes_read, 17 + 19 + 28);

    let top = &report.results[&dir.path().join("top.txt")];
    assert_eq!(top.as_ref().unwrap().matches, vec!["secret_alpha"]);

    let mid = &report.results[&dir.path().join("sub/mid.txt")];
    assert!(!mid.as_ref().unwrap().matched);

    let low = &report.results[&dir.path().join("sub/deep/low.txt")];
    assert_eq!(
        low.as_ref().unwrap().matches,
        vec!["secret_beta", "secret_gamma"]
    );
}

#[test]
fn filter_regex_narrows_the_file_set() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.rs", "secret_one");
    write(dir.path(), "b.txt", "secret_two");
    write(dir.path(), "c.rs", "secret_three");

    let mut config = base_config(dir.path());
    config.filter = Regex::new(r"\.rs$").unwrap();

    let report = search(&config);
    assert_eq!(report.stats.files_searched, 2);
    assert!(report.results.keys().all(|p| p.extension().unwrap() == "rs"));
}

#[test]
fn multiple_matchers_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "both.txt", "alpha then beta");

    let mut config = base_config(dir.path());
    config.matchers = vec![
        BytesRegex::new("alpha").unwrap(),
        BytesRegex::new("beta").unwrap(),
    ];

    let report = search(&config);
    let found = report.results[&dir.path().join("both.txt")].as_ref().unwrap();
    assert_eq!(found.matches, vec!["alpha", "beta"]);
}

#[cfg(unix)]
#[test]
fn unreadable_file_fails_only_itself() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "ok.txt", "secret_ok");
    write(dir.path(), "locked.txt", "secret_locked");

    let locked = dir.path().join("locked.txt");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let report = search(&base_config(dir.path()));

    assert!(report.results[&dir.path().join("ok.txt")].is_ok());
    match &report.results[&locked] {
        Err(SearchError::Io(err)) => {
            assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);
        }
        // Mode 000 does not stop root; accept the successful read there.
        Ok(found) => assert!(found.matched),
        other => panic!("expected an I/O error, got {other:?}"),
    }

    // Restore so tempdir cleanup can delete the file.
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
}

#[test]
fn empty_tree_reports_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let report = search(&base_config(dir.path()));
    assert!(report.results.is_empty());
    assert_eq!(report.stats.files_searched, 0);
    assert_eq!(report.stats.bytes_read, 0);
}
