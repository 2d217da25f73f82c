//! A single long-lived SSH/SFTP session (spec §4.3).
//!
//! All methods take paths already joined with the remote root; Transport
//! itself never knows about `remote_dir`. It is a thin, honest wrapper —
//! policy about which errors are acceptable (ENOENT on `remove`/`rmdir`)
//! lives at the caller, same as the teacher's `App::remote_exists` /
//! `App::remote_is_dir` push that decision up to the call site.

use std::net::TcpStream;
use std::path::{Path, PathBuf};

use ssh2::{FileStat, Session, Sftp};

use crate::error::{TransportConnectError, TransportError};
use crate::model::SshDetails;

pub struct Transport {
    // Kept alive for the lifetime of the Sftp channel; never touched again
    // after construction.
    _session: Session,
    sftp: Sftp,
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

impl Transport {
    pub fn connect(details: &SshDetails) -> Result<Self, TransportConnectError> {
        let tcp = TcpStream::connect((details.hostname.as_str(), details.port)).map_err(|source| {
            TransportConnectError::Connect {
                host: details.hostname.clone(),
                port: details.port,
                source,
            }
        })?;

        let mut session = Session::new().expect("libssh2 session allocation failed");
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|source| TransportConnectError::Handshake {
                host: details.hostname.clone(),
                port: details.port,
                source,
            })?;

        let key_file = expand_tilde(&details.key_file);
        let pub_key_file = {
            let mut p = key_file.clone().into_os_string();
            p.push(".pub");
            PathBuf::from(p)
        };
        session
            .userauth_pubkey_file(
                &details.username,
                Some(pub_key_file.as_path()).filter(|p| p.exists()),
                &key_file,
                None,
            )
            .map_err(|source| TransportConnectError::Auth {
                user: details.username.clone(),
                source,
            })?;

        let sftp = session.sftp().map_err(TransportConnectError::SftpOpen)?;

        Ok(Self {
            _session: session,
            sftp,
        })
    }

    pub fn stat(&self, path: &Path) -> Result<FileStat, TransportError> {
        self.sftp.stat(path).map_err(|source| TransportError::Sftp {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn listdir(&self, path: &Path) -> Result<Vec<(PathBuf, FileStat)>, TransportError> {
        self.sftp.readdir(path).map_err(|source| TransportError::Sftp {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn mkdir(&self, path: &Path) -> Result<(), TransportError> {
        self.sftp.mkdir(path, 0o755).map_err(|source| TransportError::Sftp {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn rmdir(&self, path: &Path) -> Result<(), TransportError> {
        self.sftp.rmdir(path).map_err(|source| TransportError::Sftp {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn remove(&self, path: &Path) -> Result<(), TransportError> {
        self.sftp.unlink(path).map_err(|source| TransportError::Sftp {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn rename(&self, src: &Path, dest: &Path) -> Result<(), TransportError> {
        self.sftp
            .rename(src, dest, None)
            .map_err(|source| TransportError::Sftp {
                path: format!("{} -> {}", src.display(), dest.display()),
                source,
            })
    }

    pub fn is_directory(&self, path: &Path) -> Result<bool, TransportError> {
        Ok(self.stat(path)?.is_dir())
    }
}
