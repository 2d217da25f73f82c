//! Core data model shared by every synchronization component (spec §3).

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Whether a listed filesystem entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsObjectType {
    File,
    Directory,
}

/// Attributes of a file entry. Timestamps are truncated to whole seconds
/// at construction time so attribute comparisons never trip on sub-second
/// mtime jitter between a local filesystem and an rsync listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttrs {
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

impl FileAttrs {
    pub fn new(last_modified: DateTime<Utc>, size: u64) -> Self {
        Self {
            last_modified: truncate_to_seconds(last_modified),
            size,
        }
    }
}

/// Attributes of a directory entry. Directory mtimes are tracked but never
/// compared for difference purposes (spec §3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryAttrs {
    pub last_modified: DateTime<Utc>,
}

impl DirectoryAttrs {
    pub fn new(last_modified: DateTime<Utc>) -> Self {
        Self {
            last_modified: truncate_to_seconds(last_modified),
        }
    }
}

fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsObjectAttrs {
    File(FileAttrs),
    Directory(DirectoryAttrs),
}

/// One entry produced by a Tree Lister pass. Immutable once created.
///
/// `path` is always a relative, forward-slash path with no leading slash
/// and is never `.` or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsObject {
    pub path: String,
    pub obj_type: FsObjectType,
    pub attrs: FsObjectAttrs,
}

impl FsObject {
    pub fn file(path: impl Into<String>, attrs: FileAttrs) -> Self {
        Self {
            path: path.into(),
            obj_type: FsObjectType::File,
            attrs: FsObjectAttrs::File(attrs),
        }
    }

    pub fn directory(path: impl Into<String>, attrs: DirectoryAttrs) -> Self {
        Self {
            path: path.into(),
            obj_type: FsObjectType::Directory,
            attrs: FsObjectAttrs::Directory(attrs),
        }
    }

    pub fn file_attrs(&self) -> Option<FileAttrs> {
        match self.attrs {
            FsObjectAttrs::File(a) => Some(a),
            FsObjectAttrs::Directory(_) => None,
        }
    }
}

/// The classification of a single path's discrepancy between two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferenceType {
    LeftOnly,
    RightOnly,
    TypeDifferent,
    AttrsDifferent,
}

/// A single classified discrepancy between a left and a right listing.
///
/// Invariants (spec §3): `LeftOnly` carries no `right`, `RightOnly` carries
/// no `left`; `TypeDifferent`/`AttrsDifferent` carry both, sharing `path`;
/// `AttrsDifferent` is only ever emitted when both sides are files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    pub difference_type: DifferenceType,
    pub left: Option<FsObject>,
    pub right: Option<FsObject>,
}

impl Difference {
    pub fn left_only(obj: FsObject) -> Self {
        Self {
            difference_type: DifferenceType::LeftOnly,
            left: Some(obj),
            right: None,
        }
    }

    pub fn right_only(obj: FsObject) -> Self {
        Self {
            difference_type: DifferenceType::RightOnly,
            left: None,
            right: Some(obj),
        }
    }

    pub fn type_different(left: FsObject, right: FsObject) -> Self {
        Self {
            difference_type: DifferenceType::TypeDifferent,
            left: Some(left),
            right: Some(right),
        }
    }

    pub fn attrs_different(left: FsObject, right: FsObject) -> Self {
        Self {
            difference_type: DifferenceType::AttrsDifferent,
            left: Some(left),
            right: Some(right),
        }
    }

    /// The path this difference is about, taken from whichever side has it.
    pub fn path(&self) -> &str {
        self.left
            .as_ref()
            .or(self.right.as_ref())
            .map(|o| o.path.as_str())
            .expect("a Difference always carries at least one side")
    }
}

/// The kind of filesystem change a Local Watcher observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEventType {
    Created,
    Moved,
    Modified,
    Deleted,
}

/// Extra payload carried only by `Moved` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveExtra {
    pub dest_path: String,
}

/// A single filesystem change relative to the watched local root.
///
/// Invariants (spec §3): `Modified` on a directory never reaches the
/// queue; a `Moved` whose destination falls outside the watched root is
/// rewritten to `Deleted` with `extra = None` before being enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsChangeEvent {
    pub event_type: ChangeEventType,
    pub is_directory: bool,
    pub path: String,
    pub extra: Option<MoveExtra>,
}

impl FsChangeEvent {
    pub fn new(event_type: ChangeEventType, is_directory: bool, path: impl Into<String>) -> Self {
        Self {
            event_type,
            is_directory,
            path: path.into(),
            extra: None,
        }
    }

    pub fn moved(is_directory: bool, path: impl Into<String>, dest_path: impl Into<String>) -> Self {
        Self {
            event_type: ChangeEventType::Moved,
            is_directory,
            path: path.into(),
            extra: Some(MoveExtra {
                dest_path: dest_path.into(),
            }),
        }
    }

    pub fn dest_path(&self) -> Option<&str> {
        self.extra.as_ref().map(|e| e.dest_path.as_str())
    }
}

/// A set of relative paths currently refused for sync, because remote
/// drift was observed on them since the watch session began. Grows
/// monotonically for the lifetime of one watch-mode session (spec §4.8,
/// §9: "sticky held" is intentional).
pub type HeldPathSet = HashSet<String>;

/// Configuration produced by the CLI/config-file layer and consumed
/// read-only by the engine (spec §3, §6.2).
#[derive(Debug, Clone)]
pub struct Configuration {
    pub project: String,
    pub server: Option<String>,
    pub local_dir: PathBuf,
    pub remote_dir: Option<String>,
    pub debug: bool,
    pub ignore: Vec<String>,
}

/// Connection details for the SSH/SFTP transport (spec §3).
#[derive(Debug, Clone)]
pub struct SshDetails {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub key_file: PathBuf,
}
