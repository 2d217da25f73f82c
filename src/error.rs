//! Error taxonomy and fatality policy (spec §7).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("project {0:?} is declared in both the user-wide and project-local config files")]
    DuplicateProject(String),

    #[error("project-local config file {0:?} declares more than one section")]
    MultipleSectionsInProjectFile(PathBuf),

    #[error("no project configured; pass --project or add one to a config file")]
    MissingProject,

    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
}

#[derive(Error, Debug)]
pub enum IdentityResolutionError {
    #[error("server {0:?} not found")]
    ServerNotFound(String),

    #[error("server name {0:?} is ambiguous")]
    AmbiguousServer(String),

    #[error("no SSH host configured; pass --host or configure a server")]
    MissingHost,
}

#[derive(Error, Debug)]
pub enum TransportConnectError {
    #[error("could not connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("SSH handshake with {host}:{port} failed: {source}")]
    Handshake {
        host: String,
        port: u16,
        #[source]
        source: ssh2::Error,
    },

    #[error("SSH authentication as {user:?} failed: {source}")]
    Auth {
        user: String,
        #[source]
        source: ssh2::Error,
    },

    #[error("opening the SFTP subsystem failed: {0}")]
    SftpOpen(#[source] ssh2::Error),
}

#[derive(Error, Debug)]
#[error("remote path {0:?} does not exist or is not a directory")]
pub struct RemoteNotDirectory(pub String);

/// A non-zero `rsync` exit, carrying its captured stderr (spec §6/§7).
#[derive(Error, Debug)]
#[error("rsync exited with status {status:?}: {stderr}")]
pub struct TransferError {
    pub status: Option<i32>,
    pub stderr: String,
}

/// Any Transport failure other than an ENOENT on `remove`/`rmdir`, which
/// callers are expected to swallow themselves (spec §4.3).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("SFTP operation on {path:?} failed: {source}")]
    Sftp {
        path: String,
        #[source]
        source: ssh2::Error,
    },
}

impl TransportError {
    /// True when this failure is an ENOENT-shaped "the path is already
    /// gone" error, which `remove`/`rmdir` callers treat as success.
    pub fn is_not_found(&self) -> bool {
        const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;
        match self {
            TransportError::Sftp { source, .. } => {
                source.code() == ssh2::ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE)
            }
        }
    }
}
