use crate::core::{HashspaceError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[default]
    Sqlite,
}

impl std::str::FromStr for BackendKind {
    type Err = HashspaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(HashspaceError::Config(format!("unknown backend {other:?}"))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendKind,
    /// SQLite file; relative paths are resolved against the root directory.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Object budget for one packed literal context.
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,
    /// Ops that may wait for missing dependencies, per object.
    #[serde(default = "default_pending_limit")]
    pub pending_limit: usize,
    /// How often a sync agent re-reads its stored state without being poked.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
}

fn default_max_objects() -> usize {
    1024
}

fn default_pending_limit() -> usize {
    10_000
}

fn default_refresh_ms() -> u64 {
    5_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            database: None,
            max_objects: default_max_objects(),
            pending_limit: default_pending_limit(),
            refresh_ms: default_refresh_ms(),
        }
    }
}

impl Config {
    pub async fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path).await?;

        if content.trim().is_empty() {
            tracing::warn!("Config file is empty, using default config");
            return Ok(Config::default());
        }

        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse config ({}), using default. File may be corrupted.",
                    e
                );
                Ok(Config::default())
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, content).await?;

        Ok(())
    }

    /// Where the SQLite backend keeps its file.
    pub fn database_path(&self) -> PathBuf {
        let root = get_root_dir().unwrap_or_else(|_| PathBuf::from("hashspace_data"));
        match &self.database {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(".hashspace").join("store.sqlite"),
        }
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let root = get_root_dir()?;
    Ok(root.join(".hashspace").join("config"))
}

pub fn get_root_dir() -> Result<PathBuf> {
    let root_str = std::env::var("HASHSPACE_ROOT").unwrap_or_else(|_| "hashspace_data".to_string());

    let root = PathBuf::from(root_str);
    if root.is_absolute() {
        return Ok(root);
    }
    if let Ok(abs) = std::fs::canonicalize(&root) {
        return Ok(abs);
    }
    match std::env::current_dir() {
        Ok(cwd) => Ok(cwd.join(root)),
        Err(e) => dirs::data_local_dir()
            .map(|dir| dir.join("hashspace"))
            .ok_or(HashspaceError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"backend": "memory"}"#).unwrap();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.max_objects, default_max_objects());
        assert_eq!(config.refresh_ms, default_refresh_ms());
    }

    #[test]
    fn test_absolute_database_path_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("x.sqlite");
        let config = Config {
            database: Some(db.clone()),
            ..Config::default()
        };
        assert_eq!(config.database_path(), db);
    }

    #[test]
    fn test_backend_kind_parses() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("postgres".parse::<BackendKind>().is_err());
    }
}
