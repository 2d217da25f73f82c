//! Local Watcher (spec §4.7): adapts a native recursive filesystem
//! watcher into a bounded stream of `FsChangeEvent`, applying three
//! ordered filters before anything reaches the Uploader:
//!
//! 1. drop events whose relative path matches an ignore pattern;
//! 2. drop `Modified` events on directories;
//! 3. rewrite a `Moved` whose destination falls outside the watched
//!    root into a `Deleted` with no extra payload.
//!
//! Grounded on the teacher's `notify::recommended_watcher` usage
//! (`Sheol27-rmote/src/main.rs`), with the debounce/coalescing loop
//! dropped: spec §4.9 requires events applied in observed order with no
//! internal reordering or coalescing.

use std::path::{Path, PathBuf};

use crossbeam_channel::{bounded, Receiver, Sender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::model::{ChangeEventType, FsChangeEvent};
use crate::path_matcher;

const QUEUE_CAPACITY: usize = 4096;

pub struct LocalWatcher {
    _watcher: RecommendedWatcher,
    receiver: Receiver<FsChangeEvent>,
}

impl LocalWatcher {
    pub fn start(local_dir: PathBuf, ignore: Vec<String>) -> notify::Result<Self> {
        let (raw_tx, raw_rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;
        watcher.watch(&local_dir, RecursiveMode::Recursive)?;

        let (tx, rx): (Sender<FsChangeEvent>, Receiver<FsChangeEvent>) = bounded(QUEUE_CAPACITY);
        std::thread::spawn(move || forward(raw_rx, tx, local_dir, ignore));

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    pub fn receiver(&self) -> Receiver<FsChangeEvent> {
        self.receiver.clone()
    }
}

fn forward(
    raw_rx: std::sync::mpsc::Receiver<notify::Result<Event>>,
    tx: Sender<FsChangeEvent>,
    local_dir: PathBuf,
    ignore: Vec<String>,
) {
    for res in raw_rx {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "watch error");
                continue;
            }
        };
        for change in translate(&event, &local_dir, &ignore) {
            // A bounded send blocks, which is the backpressure spec §4.7
            // asks for; ordering is preserved because this is the sole
            // producer thread.
            if tx.send(change).is_err() {
                return;
            }
        }
    }
}

fn translate(event: &Event, local_dir: &Path, ignore: &[String]) -> Vec<FsChangeEvent> {
    let is_directory = event.paths.iter().any(|p| p.is_dir());
    let event_type = match event.kind {
        EventKind::Create(_) => ChangeEventType::Created,
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => ChangeEventType::Moved,
        EventKind::Modify(_) => ChangeEventType::Modified,
        EventKind::Remove(_) => ChangeEventType::Deleted,
        _ => return Vec::new(),
    };

    let mut out = Vec::new();
    match event.paths.len() {
        0 => {}
        1 => {
            if let Some(path) = relative(&event.paths[0], local_dir) {
                if let Some(change) = build_single(event_type, is_directory, path) {
                    push_filtered(&mut out, change, local_dir, ignore);
                }
            }
        }
        _ => {
            // A rename pair: notify reports [src, dest].
            let src = relative(&event.paths[0], local_dir);
            let dest = relative(&event.paths[1], local_dir);
            match (src, dest) {
                (Some(src), Some(dest)) => {
                    push_filtered(&mut out, FsChangeEvent::moved(is_directory, src, dest), local_dir, ignore);
                }
                (Some(src), None) => {
                    // Destination left the watched root: rewrite to Deleted.
                    push_filtered(
                        &mut out,
                        FsChangeEvent::new(ChangeEventType::Deleted, is_directory, src),
                        local_dir,
                        ignore,
                    );
                }
                _ => {}
            }
        }
    }
    out
}

fn build_single(event_type: ChangeEventType, is_directory: bool, path: String) -> Option<FsChangeEvent> {
    // Filter 2: `Modified` on a directory is discarded before the queue.
    if event_type == ChangeEventType::Modified && is_directory {
        return None;
    }
    // A single-path rename notification (no paired destination, e.g. a
    // `RenameMode::From`-only event for a move out of the watched root)
    // carries no `dest_path`. `FsChangeEvent::new` always sets `extra:
    // None`, so a bare `Moved` here would violate the invariant that
    // every `Moved` event either has both sides or is rewritten to
    // `Deleted`. Rewrite it the same way the two-path branch does.
    let event_type = if event_type == ChangeEventType::Moved {
        ChangeEventType::Deleted
    } else {
        event_type
    };
    Some(FsChangeEvent::new(event_type, is_directory, path))
}

fn push_filtered(out: &mut Vec<FsChangeEvent>, event: FsChangeEvent, local_dir: &Path, ignore: &[String]) {
    // Filter 1: excluded paths are dropped (checked on the primary path;
    // for Moved events this catches the source side).
    if path_matcher::matches_any_of(&event.path, ignore) {
        debug!(path = %event.path, "dropping excluded event");
        return;
    }
    if let Some(dest) = event.dest_path() {
        if path_matcher::matches_any_of(dest, ignore) {
            debug!(path = dest, "dropping excluded move destination");
            return;
        }
    }
    out.push(event);
}

fn relative(path: &Path, local_dir: &Path) -> Option<String> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    canonical
        .strip_prefix(local_dir)
        .ok()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_on_directory_is_discarded() {
        assert!(build_single(ChangeEventType::Modified, true, "sub".into()).is_none());
    }

    #[test]
    fn modified_on_file_is_kept() {
        assert!(build_single(ChangeEventType::Modified, false, "a.txt".into()).is_some());
    }

    #[test]
    fn created_on_directory_is_kept() {
        assert!(build_single(ChangeEventType::Created, true, "sub".into()).is_some());
    }

    #[test]
    fn single_path_moved_is_rewritten_to_deleted_with_no_dest() {
        let event = build_single(ChangeEventType::Moved, false, "gone.txt".into()).unwrap();
        assert_eq!(event.event_type, ChangeEventType::Deleted);
        assert!(event.dest_path().is_none());
    }

    #[test]
    fn excluded_paths_are_filtered_out() {
        let mut out = Vec::new();
        let ignore = vec!["__pycache__".to_string()];
        push_filtered(
            &mut out,
            FsChangeEvent::new(ChangeEventType::Modified, false, "pkg/__pycache__/a.pyc"),
            Path::new("/local"),
            &ignore,
        );
        assert!(out.is_empty());
    }
}
