//! Configuration loading.
//!
//! Settings come from an optional TOML file, with environment variables
//! taking precedence:
//!
//! | Setting | Environment | File key | Default |
//! |---|---|---|---|
//! | config file | `GLRELEASE_CONFIG` | | `<config_dir>/glrelease/config.toml` |
//! | data directory | `GLRELEASE_DATA_DIR` | `data_dir` | `<data_dir>/glrelease` |
//! | git remote | `GLRELEASE_REMOTE` | `remote` | `origin` |
//! | GitLab URL | `GITLAB_URL` | `gitlab.url` | `https://gitlab.com` |
//! | GitLab token | value of `gitlab.token_env` | | `GITLAB_TOKEN` |

use crate::codehost::GitLabConfig;
use crate::error::{ConfigError, GitError, Result};
use crate::exclusions::{normalize_patterns, parse_patterns};
use crate::history::{ThemeColors, ThemeOverrides};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "GLRELEASE_CONFIG";
/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "GLRELEASE_DATA_DIR";
/// Environment variable overriding the git remote
pub const REMOTE_ENV: &str = "GLRELEASE_REMOTE";
/// Environment variable overriding the GitLab URL
pub const GITLAB_URL_ENV: &str = "GITLAB_URL";

/// Contents of the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Where sessions and history are stored
    pub data_dir: Option<PathBuf>,
    /// Git remote name
    pub remote: Option<String>,
    /// Git binary name or path
    pub git_binary: Option<String>,
    /// Exclusion patterns
    pub exclude_patterns: Vec<String>,
    /// File with newline-delimited exclusion patterns
    pub exclude_file: Option<PathBuf>,
    /// GitLab settings
    pub gitlab: GitLabSection,
    /// Theme colors
    pub theme: ThemeOverrides,
}

/// `[gitlab]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitLabSection {
    /// Instance URL
    pub url: Option<String>,
    /// Environment variable holding the token
    pub token_env: Option<String>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Where sessions and history are stored
    pub data_dir: PathBuf,
    /// Git remote name
    pub remote: String,
    /// Git binary name or path
    pub git_binary: String,
    /// Default exclusion patterns
    pub exclude_patterns: Vec<String>,
    /// GitLab client settings
    pub gitlab: GitLabConfig,
    /// Theme colors
    pub theme: ThemeColors,
}

impl Config {
    /// Load from the default locations and the process environment
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Load using `env` to look up environment variables
    pub fn load_with<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (file, base_dir) = match env(CONFIG_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                (read_file(&path)?, parent_dir(&path))
            }
            None => match dirs::config_dir().map(|d| d.join("glrelease").join("config.toml")) {
                Some(path) if path.exists() => (read_file(&path)?, parent_dir(&path)),
                _ => (FileConfig::default(), None),
            },
        };
        Self::resolve(file, base_dir.as_deref(), env)
    }

    /// Combine file settings, environment and defaults.
    ///
    /// `base_dir` is the directory relative file paths are resolved against.
    pub fn resolve<F>(file: FileConfig, base_dir: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = env(DATA_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| file.data_dir.clone().map(|d| relative_to(base_dir, d)))
            .or_else(|| dirs::data_dir().map(|d| d.join("glrelease")))
            .ok_or(ConfigError::NoDataDir)?;

        let remote = env(REMOTE_ENV)
            .or_else(|| file.remote.clone())
            .unwrap_or_else(|| "origin".to_string());

        let mut exclude_patterns = normalize_patterns(&file.exclude_patterns);
        if let Some(exclude_file) = &file.exclude_file {
            let path = relative_to(base_dir, exclude_file.clone());
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            exclude_patterns.extend(parse_patterns(&text));
        }
        exclude_patterns.dedup();

        let token_env = file
            .gitlab
            .token_env
            .clone()
            .unwrap_or_else(|| "GITLAB_TOKEN".to_string());
        let gitlab = GitLabConfig {
            base_url: env(GITLAB_URL_ENV)
                .or_else(|| file.gitlab.url.clone())
                .unwrap_or_else(|| GitLabConfig::default().base_url),
            token: env(&token_env),
            token_env,
        };

        Ok(Self {
            data_dir,
            remote,
            git_binary: file.git_binary.unwrap_or_else(|| "git".to_string()),
            exclude_patterns,
            gitlab,
            theme: ThemeColors::resolve(&file.theme),
        })
    }

    /// Locate the git binary on PATH (or check an explicit path)
    pub fn resolve_git_binary(&self) -> Result<PathBuf> {
        which::which(&self.git_binary).map_err(|_| {
            GitError::BinaryNotFound {
                binary: self.git_binary.clone(),
            }
            .into()
        })
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let config = toml::from_str(&text).map_err(|e| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}

fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent().map(Path::to_path_buf)
}

fn relative_to(base_dir: Option<&Path>, path: PathBuf) -> PathBuf {
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    }
}
