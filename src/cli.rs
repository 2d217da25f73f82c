use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Continuous local -> remote directory synchronization over SSH/SFTP
#[derive(Parser, Debug)]
#[command(name = "rmote", author, version, about)]
pub struct Cli {
    /// Project key identifying which config-file section to use. Defaults
    /// to the normalized, absolute form of --local.
    #[arg(long, env = "RMOTE_PROJECT")]
    pub project: Option<String>,

    /// Named server from a config file, resolved to host/port/user/identity
    #[arg(long, env = "RMOTE_SERVER")]
    pub server: Option<String>,

    /// Local directory tree to watch and mirror
    #[arg(long, default_value = ".")]
    pub local: PathBuf,

    /// Remote host (IP or DNS)
    #[arg(long, env = "RMOTE_HOST")]
    pub host: Option<String>,

    /// Remote SSH port
    #[arg(long, env = "RMOTE_PORT")]
    pub port: Option<u16>,

    /// SSH username
    #[arg(long, env = "RMOTE_USER")]
    pub user: Option<String>,

    /// Path to private key (e.g. ~/.ssh/id_ed25519)
    #[arg(long, env = "RMOTE_KEY")]
    pub identity: Option<String>,

    /// Path to public key (e.g. ~/.ssh/id_ed25519.pub)
    #[arg(long, env = "RMOTE_PUB")]
    pub identity_pub: Option<String>,

    /// Optional passphrase for the private key
    #[arg(long, env = "RMOTE_PASSPHRASE")]
    pub passphrase: Option<String>,

    /// Remote base directory to mirror into
    #[arg(long, env = "RMOTE_REMOTE_DIR")]
    pub remote_dir: Option<String>,

    /// Perform a full sync at startup
    #[arg(long, action = ArgAction::SetTrue, default_value_t = true)]
    pub initial_sync: bool,

    /// Disable full sync at startup
    #[arg(long, action = ArgAction::SetTrue, overrides_with = "initial_sync")]
    pub no_initial_sync: bool,

    /// Glob pattern to ignore. May be repeated; replaces the config
    /// file's ignore list entirely when given.
    #[arg(long = "ignore", short = 'x', action = ArgAction::Append)]
    pub ignore: Vec<String>,

    /// Verbose logging
    #[arg(long, env = "RMOTE_DEBUG", action = ArgAction::SetTrue)]
    pub debug: bool,
}
