//! Configuration loader (spec §6.2): merges a user-wide config file, a
//! project-local config file, and CLI flags into one `Configuration` +
//! `SshDetails`.
//!
//! Both files are INI, one section per project, keyed by the project's
//! absolute, tilde-expanded, trailing-slash-stripped local directory.
//! Precedence: CLI flags > project-local file > user-wide file > built-in
//! defaults.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use ini::{Ini, Properties};

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::model::{Configuration, SshDetails};

const PROJECT_FILE_NAME: &str = ".rmote.ini";
const DEFAULT_PORT: u16 = 22;
const DEFAULT_USER: &str = "root";
const DEFAULT_IDENTITY: &str = "~/.ssh/id_ed25519";

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Normalizes a local directory into the exact string used as a config
/// section key: absolute, tilde-expanded, no trailing slash.
fn project_key(local_dir: &Path) -> String {
    let absolute = if local_dir.is_absolute() {
        local_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(local_dir))
            .unwrap_or_else(|_| local_dir.to_path_buf())
    };
    absolute.to_string_lossy().trim_end_matches('/').to_string()
}

fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rmote").map(|dirs| dirs.config_dir().join("config.ini"))
}

fn load_ini(path: &Path) -> Result<Option<Ini>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    Ini::load_from_file(path)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn get<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    props.get(key)
}

/// The raw values one INI section contributes, before CLI overrides.
#[derive(Debug, Default, Clone)]
struct ProjectSection {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    identity: Option<String>,
    remote_dir: Option<String>,
    ignore: Vec<String>,
}

impl ProjectSection {
    fn from_properties(props: &Properties) -> Self {
        Self {
            host: get(props, "host").map(str::to_string),
            port: get(props, "port").and_then(|v| v.parse().ok()),
            user: get(props, "user").map(str::to_string),
            identity: get(props, "identity").map(str::to_string),
            remote_dir: get(props, "remote_dir").map(str::to_string),
            ignore: get(props, "ignore")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
        }
    }

    fn merge_over(self, base: ProjectSection) -> ProjectSection {
        ProjectSection {
            host: self.host.or(base.host),
            port: self.port.or(base.port),
            user: self.user.or(base.user),
            identity: self.identity.or(base.identity),
            remote_dir: self.remote_dir.or(base.remote_dir),
            ignore: if self.ignore.is_empty() { base.ignore } else { self.ignore },
        }
    }
}

/// Loads and merges configuration for one invocation of the CLI.
pub fn load(cli: &Cli) -> Result<(Configuration, SshDetails), ConfigError> {
    let key = cli.project.clone().unwrap_or_else(|| project_key(&cli.local));

    let user_path = user_config_path();
    let user_ini = user_path.as_deref().map(load_ini).transpose()?.flatten();

    let project_path = cli.local.join(PROJECT_FILE_NAME);
    let project_ini = load_ini(&project_path)?;

    if let Some(ini) = &project_ini {
        let section_count = ini.sections().filter(|s| s.is_some()).count();
        if section_count > 1 {
            return Err(ConfigError::MultipleSectionsInProjectFile(project_path));
        }
    }

    let user_section = user_ini.as_ref().and_then(|ini| ini.section(Some(key.as_str()))).map(ProjectSection::from_properties);
    let project_section = project_ini.as_ref().and_then(|ini| ini.section(Some(key.as_str()))).map(ProjectSection::from_properties);

    if user_section.is_some() && project_section.is_some() {
        return Err(ConfigError::DuplicateProject(key));
    }

    let merged = project_section
        .unwrap_or_default()
        .merge_over(user_section.unwrap_or_default());

    let host = cli
        .host
        .clone()
        .or(merged.host)
        .ok_or(ConfigError::MissingProject)?;
    let port = cli.port.or(merged.port).unwrap_or(DEFAULT_PORT);
    let user = cli.user.clone().or(merged.user).unwrap_or_else(|| DEFAULT_USER.to_string());
    let identity = cli
        .identity
        .clone()
        .or(merged.identity)
        .unwrap_or_else(|| DEFAULT_IDENTITY.to_string());
    let remote_dir = cli.remote_dir.clone().or(merged.remote_dir);
    let ignore = if !cli.ignore.is_empty() { cli.ignore.clone() } else { merged.ignore };

    let ssh = SshDetails {
        hostname: host,
        port,
        username: user,
        key_file: expand_tilde(&identity),
    };

    let configuration = Configuration {
        project: key,
        server: cli.server.clone(),
        local_dir: cli.local.clone(),
        remote_dir,
        debug: cli.debug,
        ignore,
    };

    Ok((configuration, ssh))
}
