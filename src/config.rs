use std::path::{Path, PathBuf};

use crate::engine::{EngineConfig, StreakData, Task};
use crate::storage::sqlite::default_db_path;

pub const DEFAULT_USER_ID: &str = "local";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid task catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub database_url: Option<String>,
    pub user_id: String,
    pub tasks_file: Option<PathBuf>,
    pub streak: StreakData,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let user_id = std::env::var("ENGINE_USER_ID")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string());

        let tasks_file = std::env::var("ENGINE_TASKS_FILE").ok().map(PathBuf::from);

        let current = env_u32("ENGINE_STREAK_CURRENT").unwrap_or(0);
        let longest = env_u32("ENGINE_STREAK_LONGEST").unwrap_or(current).max(current);

        Self {
            log_level,
            database_url,
            user_id,
            tasks_file,
            streak: StreakData::new(current, longest),
            engine: EngineConfig::from_env(),
        }
    }

    /// Explicit `DATABASE_URL`, else a file under the platform data dir.
    pub fn database_target(&self) -> DatabaseTarget {
        match &self.database_url {
            Some(url) => DatabaseTarget::Url(url.clone()),
            None => DatabaseTarget::File(default_db_path()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Url(String),
    File(PathBuf),
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|value| value.parse::<u32>().ok())
}

pub fn load_task_catalog(path: &Path) -> Result<Vec<Task>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn task_catalog_reads_json_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"t1","title":"Cold call","category":"sales","basePoints":100}},
               {{"id":"t2","title":"Journal","basePoints":20,"completed":true}}]"#
        )
        .unwrap();

        let tasks = load_task_catalog(file.path()).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].category_key(), "sales");
        assert_eq!(tasks[1].category_key(), "general");
        assert!(tasks[1].completed);
    }

    #[test]
    fn task_catalog_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_task_catalog(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_catalog_is_io_error() {
        let err = load_task_catalog(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
