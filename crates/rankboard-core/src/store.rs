// Persistence of the roster and of the published page identifiers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::reconcile::MessageId;
use crate::roster::Roster;

/// Identifiers of the live leaderboard pages, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishState {
    pub message_ids: Vec<MessageId>,
}

/// Where the orchestrator keeps its state between runs. Every save replaces
/// the stored value as a whole.
pub trait StateStore: Send + Sync {
    fn load_roster(&self) -> Result<Roster, StoreError>;
    fn save_roster(&self, roster: &Roster) -> Result<(), StoreError>;
    fn load_publish_state(&self) -> Result<PublishState, StoreError>;
    fn save_publish_state(&self, state: &PublishState) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Publish-state file format
// ---------------------------------------------------------------------------

/// On-disk shape of the publish-state file. Older files carry a single
/// `messageId`; current files carry `messageIds`. Unrelated keys are kept.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PublishFile {
    #[serde(rename = "messageIds", default, skip_serializing_if = "Option::is_none")]
    message_ids: Option<Vec<MessageId>>,

    #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
    message_id: Option<MessageId>,

    #[serde(flatten)]
    other: Map<String, Value>,
}

impl PublishFile {
    /// Fold the legacy single identifier into the list form. Returns `true`
    /// when a migration happened.
    fn migrate(&mut self) -> bool {
        if self.message_ids.is_some() {
            // A list already exists; a stale legacy field is just dropped.
            return self.message_id.take().is_some();
        }
        let legacy = self.message_id.take();
        let migrated = legacy.is_some();
        self.message_ids = Some(legacy.into_iter().collect());
        migrated
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// JSON files on disk: one for the roster, one for the publish state.
/// Missing files load as empty state. Writes go through a temp file and a
/// rename so a crash never leaves a half-written file.
pub struct JsonFileStore {
    roster_path: PathBuf,
    publish_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(roster_path: impl Into<PathBuf>, publish_path: impl Into<PathBuf>) -> Self {
        Self {
            roster_path: roster_path.into(),
            publish_path: publish_path.into(),
        }
    }

    fn read_publish_file(&self) -> Result<Option<PublishFile>, StoreError> {
        let Some(text) = read_optional(&self.publish_path)? else {
            return Ok(None);
        };
        let file = serde_json::from_str(&text).map_err(|source| StoreError::Parse {
            path: self.publish_path.clone(),
            source,
        })?;
        Ok(Some(file))
    }
}

impl StateStore for JsonFileStore {
    fn load_roster(&self) -> Result<Roster, StoreError> {
        match read_optional(&self.roster_path)? {
            Some(text) => serde_json::from_str(&text).map_err(|source| StoreError::Parse {
                path: self.roster_path.clone(),
                source,
            }),
            None => Ok(Roster::new()),
        }
    }

    fn save_roster(&self, roster: &Roster) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(roster)?;
        write_atomic(&self.roster_path, &json)
    }

    fn load_publish_state(&self) -> Result<PublishState, StoreError> {
        let Some(mut file) = self.read_publish_file()? else {
            return Ok(PublishState::default());
        };
        if file.migrate() {
            info!(
                "Migrated legacy single message id in {}",
                self.publish_path.display()
            );
        }
        Ok(PublishState {
            message_ids: file.message_ids.unwrap_or_default(),
        })
    }

    fn save_publish_state(&self, state: &PublishState) -> Result<(), StoreError> {
        // Keep keys this store does not own; the legacy field is dropped.
        let other = match self.read_publish_file() {
            Ok(Some(file)) => file.other,
            Ok(None) => Map::new(),
            Err(e) => {
                let backup = sibling(&self.publish_path, ".bak");
                warn!(
                    "Overwriting unreadable {} ({e}); other keys are lost, previous contents kept in {}",
                    self.publish_path.display(),
                    backup.display()
                );
                if let Err(copy_err) = fs::copy(&self.publish_path, &backup) {
                    warn!("Could not keep a copy of {}: {copy_err}", self.publish_path.display());
                }
                Map::new()
            }
        };
        let file = PublishFile {
            message_ids: Some(state.message_ids.clone()),
            message_id: None,
            other,
        };
        let json = serde_json::to_string_pretty(&file)?;
        write_atomic(&self.publish_path, &json)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, contents).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store for tests and dry runs. Writes can be made to fail to
/// exercise persistence error handling.
#[derive(Default)]
pub struct MemoryStore {
    roster: Mutex<Roster>,
    publish: Mutex<PublishState>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(roster: Roster, publish: PublishState) -> Self {
        Self {
            roster: Mutex::new(roster),
            publish: Mutex::new(publish),
            fail_writes: Mutex::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    pub fn roster(&self) -> Roster {
        lock(&self.roster).clone()
    }

    pub fn publish_state(&self) -> PublishState {
        lock(&self.publish).clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if *lock(&self.fail_writes) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StateStore for MemoryStore {
    fn load_roster(&self) -> Result<Roster, StoreError> {
        Ok(self.roster())
    }

    fn save_roster(&self, roster: &Roster) -> Result<(), StoreError> {
        self.check_writable()?;
        *lock(&self.roster) = roster.clone();
        Ok(())
    }

    fn load_publish_state(&self) -> Result<PublishState, StoreError> {
        Ok(self.publish_state())
    }

    fn save_publish_state(&self, state: &PublishState) -> Result<(), StoreError> {
        self.check_writable()?;
        *lock(&self.publish) = state.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
