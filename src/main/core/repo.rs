use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::api::types::{Epic, Feature};
use crate::spi::traits::CatalogRepository;
use crate::spi::types::{CancelToken, RepoError};

fn backend(e: rusqlite::Error) -> RepoError {
    RepoError::Backend(e.to_string())
}

fn check_cancel(cancel: &CancelToken) -> Result<(), RepoError> {
    if cancel.is_cancelled() {
        Err(RepoError::Cancelled)
    } else {
        Ok(())
    }
}

/// SQLite-backed catalog repository.
///
/// Task-identifier uniqueness rides on the `tasks.task_key` primary key, so
/// a concurrent duplicate insert surfaces as [`RepoError::Conflict`].
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open (or create) the catalog database at `path`.
    pub fn open(path: &Path) -> Result<Self, RepoError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, RepoError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, RepoError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS epics (
                key          TEXT PRIMARY KEY,
                title        TEXT NOT NULL,
                description  TEXT,
                file_path    TEXT
            );
            CREATE TABLE IF NOT EXISTS features (
                key          TEXT PRIMARY KEY,
                epic_key     TEXT NOT NULL,
                title        TEXT NOT NULL,
                description  TEXT,
                file_path    TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_features_epic ON features(epic_key);
            CREATE TABLE IF NOT EXISTS tasks (
                task_key     TEXT PRIMARY KEY,
                feature_key  TEXT NOT NULL,
                file_path    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_feature ON tasks(feature_key);",
        )
        .map_err(backend)?;
        Ok(Self { conn })
    }
}

impl CatalogRepository for SqliteRepository {
    fn epic_exists(&self, key: &str, cancel: &CancelToken) -> Result<bool, RepoError> {
        check_cancel(cancel)?;
        let count: i64 = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM epics WHERE key = ?1)",
                params![key],
                |row| row.get(0),
            )
            .map_err(backend)?;
        Ok(count != 0)
    }

    fn feature_exists(&self, key: &str, cancel: &CancelToken) -> Result<bool, RepoError> {
        check_cancel(cancel)?;
        let count: i64 = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM features WHERE key = ?1)",
                params![key],
                |row| row.get(0),
            )
            .map_err(backend)?;
        Ok(count != 0)
    }

    fn max_task_sequence(
        &self,
        feature_key: &str,
        cancel: &CancelToken,
    ) -> Result<u32, RepoError> {
        check_cancel(cancel)?;
        // Task identifiers end in a three-digit sequence; the aggregate runs
        // over the indexed feature_key subset.
        let max: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(CAST(substr(task_key, -3) AS INTEGER)), 0)
                 FROM tasks WHERE feature_key = ?1",
                params![feature_key],
                |row| row.get(0),
            )
            .map_err(backend)?;
        Ok(max.max(0) as u32)
    }

    fn register_task(
        &self,
        task_key: &str,
        feature_key: &str,
        file_path: &Path,
        cancel: &CancelToken,
    ) -> Result<(), RepoError> {
        check_cancel(cancel)?;
        let result = self.conn.execute(
            "INSERT INTO tasks (task_key, feature_key, file_path) VALUES (?1, ?2, ?3)",
            params![task_key, feature_key, file_path.to_string_lossy().into_owned()],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(RepoError::Conflict(task_key.to_string()))
            }
            Err(e) => Err(backend(e)),
        }
    }

    fn upsert_epic(&self, epic: &Epic, cancel: &CancelToken) -> Result<(), RepoError> {
        check_cancel(cancel)?;
        self.conn
            .execute(
                "INSERT INTO epics (key, title, description, file_path)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     title = excluded.title,
                     description = excluded.description,
                     file_path = excluded.file_path",
                params![
                    epic.key,
                    epic.title,
                    epic.description,
                    epic.file_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn upsert_feature(&self, feature: &Feature, cancel: &CancelToken) -> Result<(), RepoError> {
        check_cancel(cancel)?;
        self.conn
            .execute(
                "INSERT INTO features (key, epic_key, title, description, file_path)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                     epic_key = excluded.epic_key,
                     title = excluded.title,
                     description = excluded.description,
                     file_path = excluded.file_path",
                params![
                    feature.key,
                    feature.epic_key,
                    feature.title,
                    feature.description,
                    feature.file_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                ],
            )
            .map_err(backend)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    epics: HashSet<String>,
    features: HashSet<String>,
    tasks: HashMap<String, (String, PathBuf)>,
}

/// In-memory repository for tests and ad-hoc runs without a database file.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an epic key directly (test setup).
    pub fn insert_epic_key(&self, key: &str) {
        self.state.lock().unwrap().epics.insert(key.to_string());
    }

    /// Seed a feature key directly (test setup).
    pub fn insert_feature_key(&self, key: &str) {
        self.state.lock().unwrap().features.insert(key.to_string());
    }

    /// Seed an existing task identifier directly (test setup).
    pub fn insert_task_key(&self, task_key: &str, feature_key: &str) {
        self.state
            .lock()
            .unwrap()
            .tasks
            .insert(task_key.to_string(), (feature_key.to_string(), PathBuf::new()));
    }

    pub fn task_count(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }
}

fn sequence_of(task_key: &str) -> Option<u32> {
    let suffix = task_key.rsplit('-').next()?;
    if suffix.len() == 3 {
        suffix.parse().ok()
    } else {
        None
    }
}

impl CatalogRepository for MemoryRepository {
    fn epic_exists(&self, key: &str, cancel: &CancelToken) -> Result<bool, RepoError> {
        check_cancel(cancel)?;
        Ok(self.state.lock().unwrap().epics.contains(key))
    }

    fn feature_exists(&self, key: &str, cancel: &CancelToken) -> Result<bool, RepoError> {
        check_cancel(cancel)?;
        Ok(self.state.lock().unwrap().features.contains(key))
    }

    fn max_task_sequence(
        &self,
        feature_key: &str,
        cancel: &CancelToken,
    ) -> Result<u32, RepoError> {
        check_cancel(cancel)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .iter()
            .filter(|(_, (feature, _))| feature == feature_key)
            .filter_map(|(key, _)| sequence_of(key))
            .max()
            .unwrap_or(0))
    }

    fn register_task(
        &self,
        task_key: &str,
        feature_key: &str,
        file_path: &Path,
        cancel: &CancelToken,
    ) -> Result<(), RepoError> {
        check_cancel(cancel)?;
        let mut state = self.state.lock().unwrap();
        if state.tasks.contains_key(task_key) {
            return Err(RepoError::Conflict(task_key.to_string()));
        }
        state.tasks.insert(
            task_key.to_string(),
            (feature_key.to_string(), file_path.to_path_buf()),
        );
        Ok(())
    }

    fn upsert_epic(&self, epic: &Epic, cancel: &CancelToken) -> Result<(), RepoError> {
        check_cancel(cancel)?;
        self.state.lock().unwrap().epics.insert(epic.key.clone());
        Ok(())
    }

    fn upsert_feature(&self, feature: &Feature, cancel: &CancelToken) -> Result<(), RepoError> {
        check_cancel(cancel)?;
        self.state.lock().unwrap().features.insert(feature.key.clone());
        Ok(())
    }
}
