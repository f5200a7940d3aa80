//! Persistence collaborator
//!
//! The engine reads its task list and settings once at startup and writes
//! them back after every mutation. Nothing here is allowed to take the engine
//! down: callers log a [`StoreError`] and carry on with what they have in
//! memory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use serde_json::Value;

use crate::models::{Settings, Task};

pub const TASKS_FILE: &str = "tasks.json";
pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Where tasks and settings live between runs
pub trait Store: Send {
    /// Loads the stored tasks. Missing data is an empty list, not an error.
    fn load_tasks(&mut self, rng: &mut dyn rand::RngCore) -> Result<Vec<Task>, StoreError>;

    fn save_tasks(&mut self, tasks: &[Task]) -> Result<(), StoreError>;

    /// Loads the stored settings. Missing data is the defaults, not an error.
    fn load_settings(&mut self) -> Result<Settings, StoreError>;

    fn save_settings(&mut self, settings: &Settings) -> Result<(), StoreError>;
}

/// Decodes a stored task list, coercing each record on its own.
///
/// A non-array document yields no tasks.
pub fn decode_tasks<R: Rng + ?Sized>(document: &Value, rng: &mut R) -> Vec<Task> {
    let now = Utc::now();
    match document {
        Value::Array(items) => items
            .iter()
            .filter(|item| {
                let keep = item.is_object();
                if !keep {
                    tracing::warn!("Skipping stored task that is not an object: {}", item);
                }
                keep
            })
            .map(|item| Task::coerce(item, now, rng))
            .collect(),
        other => {
            tracing::warn!("Stored task list is not an array: {}", other);
            Vec::new()
        }
    }
}

/// Stores tasks and settings as pretty-printed JSON files in one directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.dir.join(TASKS_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    fn read(&self, path: &Path) -> Result<Option<String>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(path)
            .map(Some)
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    fn write(&self, path: &Path, contents: String) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        fs::write(path, contents).map_err(io_err)
    }
}

impl Store for JsonFileStore {
    fn load_tasks(&mut self, rng: &mut dyn rand::RngCore) -> Result<Vec<Task>, StoreError> {
        match self.read(&self.tasks_path())? {
            Some(contents) => {
                let document: Value = serde_json::from_str(&contents)?;
                Ok(decode_tasks(&document, rng))
            }
            None => Ok(Vec::new()),
        }
    }

    fn save_tasks(&mut self, tasks: &[Task]) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(tasks)?;
        self.write(&self.tasks_path(), contents)
    }

    fn load_settings(&mut self) -> Result<Settings, StoreError> {
        match self.read(&self.settings_path())? {
            Some(contents) => Ok(serde_json::from_str::<Settings>(&contents)?.normalized()),
            None => Ok(Settings::default()),
        }
    }

    fn save_settings(&mut self, settings: &Settings) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(settings)?;
        self.write(&self.settings_path(), contents)
    }
}

/// In-memory store, used by tests and by servers started without a data
/// directory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub tasks: Vec<Task>,
    pub settings: Settings,
    /// When set, every call fails with [`StoreError::Unavailable`]
    pub fail: bool,
    pub saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            ..Self::default()
        }
    }

    /// A store whose every call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn load_tasks(&mut self, _rng: &mut dyn rand::RngCore) -> Result<Vec<Task>, StoreError> {
        self.check()?;
        Ok(self.tasks.clone())
    }

    fn save_tasks(&mut self, tasks: &[Task]) -> Result<(), StoreError> {
        self.check()?;
        self.tasks = tasks.to_vec();
        self.saves += 1;
        Ok(())
    }

    fn load_settings(&mut self) -> Result<Settings, StoreError> {
        self.check()?;
        Ok(self.settings.clone())
    }

    fn save_settings(&mut self, settings: &Settings) -> Result<(), StoreError> {
        self.check()?;
        self.settings = settings.clone();
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskDraft;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "orbitask-store-{}-{}-{}",
            name,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_missing_files_load_as_defaults() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut store = JsonFileStore::new(temp_dir("missing"));
        assert!(store.load_tasks(&mut rng).unwrap().is_empty());
        assert_eq!(store.load_settings().unwrap(), Settings::default());
    }

    #[test]
    fn test_file_store_persists_tasks_and_settings() {
        let mut rng = StdRng::seed_from_u64(1);
        let dir = temp_dir("persist");
        let mut store = JsonFileStore::new(&dir);

        let task = TaskDraft::new("Pay rent")
            .with_category("finance")
            .into_task(Utc::now(), &mut rng);
        store.save_tasks(std::slice::from_ref(&task)).unwrap();
        let settings = Settings {
            grouping_enabled: false,
            ..Settings::default()
        };
        store.save_settings(&settings).unwrap();

        let mut reopened = JsonFileStore::new(&dir);
        assert_eq!(reopened.load_tasks(&mut rng).unwrap(), vec![task]);
        assert_eq!(reopened.load_settings().unwrap(), settings);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bad_records_do_not_discard_good_ones() {
        let mut rng = StdRng::seed_from_u64(1);
        let tasks = decode_tasks(
            &json!([
                {"id": "a", "text": "Good", "category": "work"},
                "garbage",
                {"id": "b", "priority": {"nested": true}}
            ]),
            &mut rng,
        );
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "a");
        assert_eq!(tasks[1].id, "b");
        assert!(decode_tasks(&json!({"not": "a list"}), &mut rng).is_empty());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let dir = temp_dir("malformed");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(TASKS_FILE), "{ not json").unwrap();

        let mut store = JsonFileStore::new(&dir);
        assert!(matches!(
            store.load_tasks(&mut rng),
            Err(StoreError::Json(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failing_memory_store() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut store = MemoryStore::failing();
        assert!(store.load_tasks(&mut rng).is_err());
        assert!(store.save_settings(&Settings::default()).is_err());
        assert_eq!(store.saves, 0);
    }
}
