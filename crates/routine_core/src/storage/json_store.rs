use crate::error::AppError;
use crate::model::{Task, TaskCompletion};
use crate::storage::lock::OwnerLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;
const OWNERS_DIR: &str = "owners";
const STATE_FILE_NAME: &str = "state.json";
const LOCK_FILE_NAME: &str = "state.lock";

#[derive(Debug, Serialize, Deserialize)]
struct StoredOwner {
    schema_version: u32,
    owner_id: String,
    tasks: Vec<Task>,
    #[serde(default)]
    completions: Vec<TaskCompletion>,
}

/// Everything one owner has: their tasks and their completion records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerState {
    pub tasks: Vec<Task>,
    pub completions: Vec<TaskCompletion>,
}

/// Document store partitioned by owner, one JSON document per owner under
/// `<root>/owners/<owner_id>/`.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    lock_timeout: Duration,
}

impl Store {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self::new(store_root()?).with_lock_timeout(lock_timeout_from_env()?))
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn owner_dir(&self, owner_id: &str) -> Result<PathBuf, AppError> {
        let owner_id = validate_owner_id(owner_id)?;
        Ok(self.root.join(OWNERS_DIR).join(owner_id))
    }

    /// Blocks until this caller is the only writer for `owner_id`.
    pub fn lock_owner(&self, owner_id: &str) -> Result<OwnerLock, AppError> {
        let path = self.owner_dir(owner_id)?.join(LOCK_FILE_NAME);
        OwnerLock::acquire(&path, self.lock_timeout)
    }

    pub fn load(&self, owner_id: &str) -> Result<OwnerState, AppError> {
        let owner_id = validate_owner_id(owner_id)?;
        let path = self.owner_dir(owner_id)?.join(STATE_FILE_NAME);
        load_state(&path, owner_id)
    }

    /// Callers must hold the owner's lock.
    pub fn save(&self, owner_id: &str, state: &OwnerState) -> Result<(), AppError> {
        let owner_id = validate_owner_id(owner_id)?;
        let path = self.owner_dir(owner_id)?.join(STATE_FILE_NAME);
        save_state(&path, owner_id, state)
    }
}

pub fn store_root() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var("ROUTINE_STORE_PATH")
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }
    default_root()
}

/// Per-user application directory; holds the store and the config file.
pub fn default_root() -> Result<PathBuf, AppError> {
    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("routine"))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home).join(".config").join("routine"))
    }
}

fn lock_timeout_from_env() -> Result<Duration, AppError> {
    match std::env::var("ROUTINE_LOCK_TIMEOUT_MS") {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| AppError::invalid_input("ROUTINE_LOCK_TIMEOUT_MS must be milliseconds")),
        _ => Ok(Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS)),
    }
}

/// Owner ids name a directory, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_owner_id(raw: &str) -> Result<&str, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("owner is required"));
    }

    let valid = trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid {
        return Err(AppError::invalid_input(
            "owner may only contain letters, digits, '-' and '_'",
        ));
    }

    Ok(trimmed)
}

pub fn load_state(path: &Path, owner_id: &str) -> Result<OwnerState, AppError> {
    if !path.exists() {
        return Ok(OwnerState::default());
    }

    let content =
        std::fs::read_to_string(path).map_err(|err| AppError::storage(err.to_string()))?;
    let stored: StoredOwner =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if !(1..=SCHEMA_VERSION).contains(&stored.schema_version) {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    if stored.owner_id != owner_id {
        return Err(AppError::invalid_data("owner_id does not match partition"));
    }

    if stored.tasks.iter().any(|task| task.owner_id != owner_id) {
        return Err(AppError::invalid_data("task owned by another owner"));
    }

    let mut task_ids = HashSet::new();
    if !stored.tasks.iter().all(|task| task_ids.insert(task.id.as_str())) {
        return Err(AppError::invalid_data("duplicate task id"));
    }

    let mut keys = HashSet::new();
    let unique = stored
        .completions
        .iter()
        .all(|record| keys.insert((record.task_id.as_str(), record.user_id.as_str(), record.date)));
    if !unique {
        return Err(AppError::invalid_data("duplicate completion record"));
    }

    Ok(OwnerState {
        tasks: stored.tasks,
        completions: stored.completions,
    })
}

pub fn save_state(path: &Path, owner_id: &str, state: &OwnerState) -> Result<(), AppError> {
    let stored = StoredOwner {
        schema_version: SCHEMA_VERSION,
        owner_id: owner_id.to_string(),
        tasks: state.tasks.to_vec(),
        completions: state.completions.to_vec(),
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    write_atomic(path, content.as_bytes())
}

/// Writes a sibling temp file and renames it over `path`, so readers see
/// either the old document or the new one.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| AppError::storage(err.to_string()))?;
    }

    let temp_path = temp_path_for(path);
    let result = write_then_rename(&temp_path, path, data);
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result.map_err(|err| AppError::storage(err.to_string()))
}

fn temp_path_for(path: &Path) -> PathBuf {
    path.with_extension(format!("json.tmp.{}", std::process::id()))
}

fn write_then_rename(temp_path: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(temp_path, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(temp_path, path)
}
