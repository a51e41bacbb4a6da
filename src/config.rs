use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{OverwritePolicy, ProjectId};
use crate::error::OasisError;
use crate::nitrc::DEFAULT_BASE_URL;
use crate::postprocess::MRI_DIR;

pub const CONFIG_FILE_NAME: &str = "oasis-dm.json";
pub const DEFAULT_OUTPUT_DIR: &str = "oasis-data";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub files_to_keep: Vec<String>,
    #[serde(default)]
    pub overwrite: Option<OverwritePolicy>,
    #[serde(default)]
    pub check_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub output_dir: Utf8PathBuf,
    pub project: ProjectId,
    pub base_url: String,
    pub username: Option<String>,
    pub files_to_keep: Vec<String>,
    pub overwrite: OverwritePolicy,
    pub check_dir: String,
    pub timeout: Duration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must be readable. Otherwise `./oasis-dm.json`, then the
    /// per-user config directory, then built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, OasisError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };

        let config = match config_path {
            Some(config_path) => {
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| OasisError::ConfigRead(config_path.clone()))?;
                serde_json::from_str(&content)
                    .map_err(|err| OasisError::ConfigParse(err.to_string()))?
            }
            None => Config::default(),
        };

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, OasisError> {
        let project = match config.project {
            Some(value) => value.parse()?,
            None => ProjectId::default(),
        };

        let mut base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let schema_version = config.schema_version.unwrap_or(SCHEMA_VERSION);
        if schema_version != SCHEMA_VERSION {
            return Err(OasisError::ConfigParse(format!(
                "unsupported schema_version {schema_version}, expected {SCHEMA_VERSION}"
            )));
        }

        Ok(ResolvedConfig {
            schema_version,
            output_dir: Utf8PathBuf::from(
                config
                    .output_dir
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
            project,
            base_url,
            username: config.username.filter(|name| !name.trim().is_empty()),
            files_to_keep: config.files_to_keep,
            overwrite: config.overwrite.unwrap_or_default(),
            check_dir: config.check_dir.unwrap_or_else(|| MRI_DIR.to_string()),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }

    fn discover() -> Option<PathBuf> {
        let user_dir = ProjectDirs::from("org", "oasis-brains", "oasis-dm")
            .map(|dirs| dirs.config_dir().to_path_buf());
        discover_in(Path::new("."), user_dir.as_deref())
    }
}

fn discover_in(local_dir: &Path, user_dir: Option<&Path>) -> Option<PathBuf> {
    let local = local_dir.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    user_dir
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}
