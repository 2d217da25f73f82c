//! Tree Lister (spec §4.4): materializes a flat listing of a local or
//! remote tree by shelling out to `rsync --dry-run --itemize-changes`,
//! reusing exactly the inclusion/exclusion semantics Bulk Transfer will
//! later use for the real transfer (spec §4.4's WHY).

use std::path::Path;
use std::process::Command;

use chrono::{NaiveDateTime, TimeZone, Utc};
use tracing::warn;

use crate::error::TransferError;
use crate::model::{DirectoryAttrs, FileAttrs, FsObject};
use crate::synchronizer::SshTarget;

const OUT_FORMAT: &str = "%i||%n||%M||%l";

/// Which root a listing pass targets.
pub enum ListRoot<'a> {
    Local { dir: &'a Path },
    Remote { dir: &'a str, ssh: &'a SshTarget },
}

pub fn list(root: ListRoot<'_>, excludes: &[String]) -> Result<Vec<FsObject>, TransferError> {
    let mut cmd = Command::new("rsync");
    cmd.arg("-a").arg("--dry-run").arg("--itemize-changes");
    cmd.arg("--out-format").arg(OUT_FORMAT);

    let source = match root {
        ListRoot::Local { dir } => {
            let mut s = dir.display().to_string();
            if !s.ends_with('/') {
                s.push('/');
            }
            s
        }
        ListRoot::Remote { dir, ssh } => {
            cmd.arg("-e").arg(ssh.ssh_command());
            let mut remote_path = dir.to_string();
            if !remote_path.ends_with('/') {
                remote_path.push('/');
            }
            format!("{}@{}:{}", ssh.username, ssh.hostname, shell_words::quote(&remote_path))
        }
    };

    for pattern in excludes {
        cmd.arg("--exclude").arg(pattern);
    }

    cmd.arg(&source).arg("/dev/false");

    let output = cmd.output().map_err(|e| TransferError {
        status: None,
        stderr: format!("failed to spawn rsync: {e}"),
    })?;

    // rsync exits non-zero against /dev/false (it's not a real
    // destination); what matters is that it enumerated the source, which
    // shows up as itemized lines on stdout regardless of the exit code.
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_listing(&stdout))
}

fn parse_listing(stdout: &str) -> Vec<FsObject> {
    let mut objects = Vec::new();
    for line in stdout.lines() {
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(obj) => objects.push(obj),
            None => warn!(line, "skipping unparsable rsync listing line"),
        }
    }
    objects
}

fn parse_line(line: &str) -> Option<FsObject> {
    let fields: Vec<&str> = line.splitn(4, "||").collect();
    let [itemize, path, mtime_str, length_str] = fields[..] else {
        return None;
    };
    if path.is_empty() || path == "." {
        return None;
    }
    let is_dir = itemize.chars().nth(1) == Some('d');
    let mtime = NaiveDateTime::parse_from_str(mtime_str, "%Y/%m/%d-%H:%M:%S").ok()?;
    let mtime = Utc.from_utc_datetime(&mtime);

    if is_dir {
        Some(FsObject::directory(path, DirectoryAttrs::new(mtime)))
    } else {
        let size: u64 = length_str.trim().parse().ok()?;
        Some(FsObject::file(path, FileAttrs::new(mtime, size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_and_directory_lines() {
        let stdout = "cd+++++++++||sub||2024/01/02-03:04:05||0\n\
                       >f+++++++++||sub/a.txt||2024/01/02-03:04:05||42\n";
        let objects = parse_listing(stdout);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].path, "sub");
        assert_eq!(objects[0].obj_type, crate::model::FsObjectType::Directory);
        assert_eq!(objects[1].path, "sub/a.txt");
        assert_eq!(objects[1].file_attrs().unwrap().size, 42);
    }

    #[test]
    fn skips_unparsable_lines_without_aborting() {
        let stdout = ">f+++++++++||ok.txt||2024/01/02-03:04:05||1\n\
                       garbage line with no separators\n\
                       >f+++++++++||also_ok.txt||2024/01/02-03:04:05||2\n";
        let objects = parse_listing(stdout);
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert!(parse_listing("\n\n").is_empty());
    }
}
