//! Bulk Transfer (spec §4.6): whole- or partial-tree `rsync` invocations
//! in either direction over the same SSH credentials as Transport.

use std::path::Path;
use std::process::Command;

use crate::error::TransferError;
use crate::synchronizer::SshTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOpts {
    /// Mirror exactly: remove destination entries missing from source.
    Delete,
    /// Never overwrite a destination file that is newer (watch-mode "down").
    Update,
    /// No delete/update flag (a single watch-mode file upload).
    None,
}

pub fn up(
    local_dir: &Path,
    remote_dir: &str,
    ssh: &SshTarget,
    path: &str,
    opts: BulkOpts,
    ignore: &[String],
) -> Result<(), TransferError> {
    if Path::new(path).is_absolute() {
        return Err(TransferError {
            status: None,
            stderr: format!("path must be relative, got {path:?}"),
        });
    }
    let from = local_dir.join(path).display().to_string();
    let to = ssh.remote_spec(&join_remote(remote_dir, path));
    run_rsync(&from, &to, ssh, opts, ignore)
}

pub fn down(
    local_dir: &Path,
    remote_dir: &str,
    ssh: &SshTarget,
    path: &str,
    opts: BulkOpts,
    ignore: &[String],
) -> Result<(), TransferError> {
    if Path::new(path).is_absolute() {
        return Err(TransferError {
            status: None,
            stderr: format!("path must be relative, got {path:?}"),
        });
    }
    let from = ssh.remote_spec(&join_remote(remote_dir, path));
    let to = local_dir.join(path).display().to_string();
    run_rsync(&from, &to, ssh, opts, ignore)
}

fn join_remote(remote_dir: &str, path: &str) -> String {
    if path.is_empty() {
        remote_dir.to_string()
    } else {
        format!("{}/{}", remote_dir.trim_end_matches('/'), path)
    }
}

fn run_rsync(
    from: &str,
    to: &str,
    ssh: &SshTarget,
    opts: BulkOpts,
    ignore: &[String],
) -> Result<(), TransferError> {
    let mut cmd = Command::new("rsync");
    cmd.arg("-a").arg("--no-owner").arg("--no-group");
    cmd.arg("-e").arg(ssh.ssh_command());

    match opts {
        BulkOpts::Delete => {
            cmd.arg("--delete");
        }
        BulkOpts::Update => {
            cmd.arg("--update");
        }
        BulkOpts::None => {}
    }

    for pattern in ignore {
        cmd.arg("--exclude").arg(pattern);
    }

    cmd.arg(from).arg(to);

    let output = cmd.output().map_err(|e| TransferError {
        status: None,
        stderr: format!("failed to spawn rsync: {e}"),
    })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(TransferError {
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ssh() -> SshTarget {
        SshTarget {
            hostname: "example.com".into(),
            port: 22,
            username: "root".into(),
            key_file: PathBuf::from("/home/user/.ssh/id_ed25519"),
        }
    }

    #[test]
    fn rejects_absolute_paths() {
        let err = up(Path::new("/local"), "/remote", &ssh(), "/etc/passwd", BulkOpts::Delete, &[])
            .unwrap_err();
        assert!(err.stderr.contains("relative"));
    }

    #[test]
    fn join_remote_handles_empty_and_nonempty_paths() {
        assert_eq!(join_remote("/remote/", ""), "/remote/");
        assert_eq!(join_remote("/remote", "a/b.txt"), "/remote/a/b.txt");
    }
}
