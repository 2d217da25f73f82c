//! End-to-end scenarios exercising the engine across module boundaries,
//! using real temp directories where the filesystem watcher is involved
//! and in-memory fixtures everywhere else. Scenarios that require a real
//! SSH server and `rsync` binary are marked `#[ignore]`, the same way
//! the retrieval pack's rsync reimplementation gates its own transport
//! tests.

use std::fs;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rmote::held_paths::{HeldPathsMonitor, RemoteMtimeSource};
use rmote::local_watcher::LocalWatcher;
use rmote::model::{ChangeEventType, DirectoryAttrs, FileAttrs, FsObject};
use rmote::tree_differ;
use tempfile::TempDir;

fn ts(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn file(path: &str, mtime: i64, size: u64) -> FsObject {
    FsObject::file(path, FileAttrs::new(ts(mtime), size))
}

fn dir(path: &str, mtime: i64) -> FsObject {
    FsObject::directory(path, DirectoryAttrs::new(ts(mtime)))
}

#[test]
fn scenario_initial_parity_reports_no_differences() {
    let local = vec![dir("sub", 1), file("sub/a.txt", 1, 10), file("b.txt", 2, 20)];
    let remote = local.clone();
    assert!(tree_differ::compare(&local, &remote).is_empty());
}

#[test]
fn scenario_left_only_file_is_resolved_after_bulk_up() {
    let local = vec![file("new.txt", 5, 3)];
    let remote_before: Vec<FsObject> = vec![];
    let diffs = tree_differ::compare(&local, &remote_before);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].difference_type, rmote::model::DifferenceType::LeftOnly);

    // A bulk "up" mirrors local onto remote; re-listing after the transfer
    // would show the remote side now matching local.
    let remote_after = local.clone();
    assert!(tree_differ::compare(&local, &remote_after).is_empty());
}

#[test]
fn scenario_attrs_different_remote_newer_is_held_from_initial_walk() {
    struct NoRemote;
    impl RemoteMtimeSource for NoRemote {
        fn remote_mtime(&self, _path: &str) -> anyhow::Result<Option<chrono::DateTime<Utc>>> {
            Ok(None)
        }
    }

    let local = vec![file("config.py", 10, 5)];
    let remote = vec![file("config.py", 20, 5)];
    let monitor = HeldPathsMonitor::new(NoRemote, &local, &remote);
    assert!(monitor.held_paths().contains("config.py"));
}

#[test]
fn scenario_rename_outside_watched_root_is_rewritten_to_delete() {
    let root = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let src = root.path().join("moved.txt");
    fs::write(&src, b"content").unwrap();

    let watcher = LocalWatcher::start(root.path().to_path_buf(), vec![]).unwrap();
    let rx = watcher.receiver();

    std::thread::sleep(Duration::from_millis(100));
    fs::rename(&src, outside.path().join("moved.txt")).unwrap();

    let mut saw_delete = false;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(200)) {
            if event.path == "moved.txt" && event.event_type == ChangeEventType::Deleted {
                saw_delete = true;
                break;
            }
        }
    }
    assert!(saw_delete, "rename outside the watched root should surface as Deleted");
}

#[test]
fn scenario_excluded_path_never_reaches_the_watcher_queue() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("__pycache__")).unwrap();

    let watcher = LocalWatcher::start(root.path().to_path_buf(), vec!["__pycache__".to_string()]).unwrap();
    let rx = watcher.receiver();

    std::thread::sleep(Duration::from_millis(100));
    fs::write(root.path().join("__pycache__").join("a.pyc"), b"bytecode").unwrap();
    fs::write(root.path().join("kept.txt"), b"kept").unwrap();

    let mut saw_excluded = false;
    let mut saw_kept = false;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline && !saw_kept {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(200)) {
            if event.path.contains("__pycache__") {
                saw_excluded = true;
            }
            if event.path == "kept.txt" {
                saw_kept = true;
            }
        }
    }
    assert!(saw_kept, "non-excluded events should still reach the queue");
    assert!(!saw_excluded, "excluded paths must never reach the queue");
}

/// Requires a real `rsync` binary and a reachable loopback SSH server;
/// not exercised in this environment (see `ssh_transport.rs` in the
/// retrieval pack's rsync reimplementation for the same gating pattern).
#[test]
#[ignore]
fn scenario_transient_failure_recovers_via_error_handling_fs_event() {
    // A full run would: start watch mode, break the SSH connection
    // mid-upload, observe ERROR_HANDLING_FS_EVENT, and confirm the
    // Controller stops the watcher, performs a bulk `up --delete`, and
    // restarts watch mode with a fresh Held-Paths Monitor.
    unimplemented!("exercised against a real SSH server outside this environment");
}
