use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::{OptionExt as _, ResultExt as _, Snafu};
use tracing::debug;

use crate::LOG_TARGET;

pub const CONFIG_FILE_NAME: &str = ".gatorconfig.json";
const DB_FILE_NAME: &str = "gator.redb";

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Could not determine the home directory"))]
    HomeDir,
    #[snafu(display("Could not determine a data directory"))]
    DataDir,
    #[snafu(display("Failed to read config file {}", path.display()))]
    Read { path: PathBuf, source: io::Error },
    #[snafu(display("Invalid config file {}", path.display()))]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("Failed to encode config"))]
    Encode { source: serde_json::Error },
    #[snafu(display("Failed to write config file {}", path.display()))]
    Write { path: PathBuf, source: io::Error },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Contents of the configuration file
///
/// Unknown keys are ignored and every key is optional, so a missing or
/// partial file is fine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Database file; defaults to [`default_db_path`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,
}

/// `~/.gatorconfig.json`
pub fn default_config_path() -> ConfigResult<PathBuf> {
    let base_dirs = directories::BaseDirs::new().context(HomeDirSnafu)?;
    Ok(base_dirs.home_dir().join(CONFIG_FILE_NAME))
}

/// Per-user state (or local data) directory of the project
pub fn default_db_path() -> ConfigResult<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "gator").context(DataDirSnafu)?;
    let dir = dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir());
    Ok(dir.join(DB_FILE_NAME))
}

impl Config {
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(target: LOG_TARGET, path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes).context(ParseSnafu { path })
    }

    pub async fn save(&self, path: &Path) -> ConfigResult<()> {
        let mut json = serde_json::to_vec_pretty(self).context(EncodeSnafu)?;
        json.push(b'\n');

        tokio::fs::write(path, json)
            .await
            .context(WriteSnafu { path })?;

        debug!(target: LOG_TARGET, path = %path.display(), "Saved config");
        Ok(())
    }

    pub fn db_path(&self) -> ConfigResult<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn missing_file_is_default() {
        let dir = tempdir().unwrap();

        let config = Config::load(&dir.path().join(CONFIG_FILE_NAME))
            .await
            .unwrap();

        assert_eq!(config, Config::default());
    }

    #[test_log::test(tokio::test)]
    async fn saved_config_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = Config {
            db_path: Some(dir.path().join("db.redb")),
            current_user_name: Some("alice".into()),
        };

        config.save(&path).await.unwrap();

        assert_eq!(Config::load(&path).await.unwrap(), config);
    }

    #[test_log::test(tokio::test)]
    async fn unknown_keys_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(
            &path,
            r#"{"db_url": "postgres://localhost/gator", "current_user_name": "bob"}"#,
        )
        .await
        .unwrap();

        let config = Config::load(&path).await.unwrap();

        assert_eq!(config.current_user_name.as_deref(), Some("bob"));
        assert_eq!(config.db_path, None);
    }

    #[test_log::test(tokio::test)]
    async fn invalid_json_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = Config::load(&path).await.unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }), "{err:?}");
    }
}
