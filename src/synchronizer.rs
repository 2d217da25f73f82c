//! Per-session Synchronizer: bundles Tree Lister, Bulk Transfer and the
//! Transport together with the ignore list and both roots, for the
//! lifetime of one watch or bulk-sync session (spec §4.10, named after
//! `sml_sync.sync.Synchronizer`).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::bulk_transfer::{self, BulkOpts};
use crate::error::TransferError;
use crate::model::{FsObject, SshDetails};
use crate::transport::Transport;
use crate::tree_lister::{self, ListRoot};

const SSH_OPTIONS: &[&str] = &[
    "-o", "IdentitiesOnly=yes",
    "-o", "StrictHostKeyChecking=no",
    "-o", "BatchMode=yes",
];

/// The pieces of `SshDetails` needed to build `-e ssh ...` strings and
/// `user@host:path` remote specs, shared by Tree Lister and Bulk Transfer.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub key_file: PathBuf,
}

impl SshTarget {
    pub fn from_details(details: &SshDetails) -> Self {
        Self {
            hostname: details.hostname.clone(),
            port: details.port,
            username: details.username.clone(),
            key_file: details.key_file.clone(),
        }
    }

    /// The `ssh ...` command string passed to rsync's `-e`.
    pub fn ssh_command(&self) -> String {
        format!(
            "ssh {} -p {} -i {}",
            SSH_OPTIONS.join(" "),
            self.port,
            shell_words::quote(&self.key_file.display().to_string()),
        )
    }

    pub fn remote_spec(&self, path: &str) -> String {
        format!("{}@{}:{}", self.username, self.hostname, shell_words::quote(path))
    }
}

pub struct Synchronizer {
    local_dir: PathBuf,
    remote_dir: String,
    ssh: SshTarget,
    ignore: Vec<String>,
    transport: Arc<Mutex<Transport>>,
}

impl Synchronizer {
    pub fn new(
        local_dir: PathBuf,
        remote_dir: String,
        ssh_details: &SshDetails,
        ignore: Vec<String>,
        transport: Arc<Mutex<Transport>>,
    ) -> Self {
        Self {
            local_dir,
            remote_dir,
            ssh: SshTarget::from_details(ssh_details),
            ignore,
            transport,
        }
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    pub fn remote_dir(&self) -> &str {
        &self.remote_dir
    }

    pub fn transport(&self) -> Arc<Mutex<Transport>> {
        Arc::clone(&self.transport)
    }

    pub fn list_local(&self) -> Result<Vec<FsObject>, TransferError> {
        tree_lister::list(ListRoot::Local { dir: &self.local_dir }, &self.ignore)
    }

    pub fn list_remote(&self) -> Result<Vec<FsObject>, TransferError> {
        tree_lister::list(
            ListRoot::Remote {
                dir: &self.remote_dir,
                ssh: &self.ssh,
            },
            &self.ignore,
        )
    }

    /// Bulk "up" or "down" for the whole tree, mirroring exactly
    /// (`--delete`) per spec §4.6's table.
    pub fn bulk_up(&self) -> Result<(), TransferError> {
        bulk_transfer::up(&self.local_dir, &self.remote_dir, &self.ssh, "", BulkOpts::Delete, &self.ignore)
    }

    pub fn bulk_down(&self) -> Result<(), TransferError> {
        bulk_transfer::down(&self.local_dir, &self.remote_dir, &self.ssh, "", BulkOpts::Delete, &self.ignore)
    }

    /// Watch-mode "down": never overwrite files newer on the local side.
    pub fn watch_down(&self) -> Result<(), TransferError> {
        bulk_transfer::down(&self.local_dir, &self.remote_dir, &self.ssh, "", BulkOpts::Update, &self.ignore)
    }

    /// Upload a single relative path (file creation/modification in watch
    /// mode), with no delete/update flag.
    pub fn upload_path(&self, relative: &str) -> Result<(), TransferError> {
        bulk_transfer::up(&self.local_dir, &self.remote_dir, &self.ssh, relative, BulkOpts::None, &self.ignore)
    }
}
