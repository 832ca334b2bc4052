//! Room record persistence.
//!
//! The engine reads a room's record once, when its timers are first
//! initialized, and writes it back through the write-behind queue. The
//! [`RoomStore`] trait is the seam; [`JsonFileStore`] keeps one
//! `<id>.json` per room and [`MemoryStore`] is for tests and embedding.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use escapade_protocol::RoomId;
use escapade_rules::Variable;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt room record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize room record: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The id would escape the data directory or is otherwise unusable
    /// as a file name.
    #[error("room id '{0}' cannot be stored")]
    InvalidId(RoomId),
}

/// The persisted shape of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: RoomId,
    /// Main timer duration in seconds.
    #[serde(default)]
    pub timer_duration: Option<u64>,
    #[serde(default)]
    pub secondary_timer_enabled: bool,
    #[serde(default)]
    pub secondary_timer_duration: Option<u64>,
    #[serde(default, deserialize_with = "lenient_variables")]
    pub variables: BTreeMap<String, Variable>,
    /// Rule declarations (`timeTriggers`, `variableTriggers`). Kept as raw
    /// JSON; parsing is forgiving and happens at room initialization.
    #[serde(default)]
    pub config: Value,
}

impl RoomRecord {
    /// A record with no variables, no rules and default durations.
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            timer_duration: None,
            secondary_timer_enabled: false,
            secondary_timer_duration: None,
            variables: BTreeMap::new(),
            config: Value::Null,
        }
    }
}

/// Skips variables that don't have a valid `{type, value}` shape instead
/// of failing the whole record.
fn lenient_variables<'de, D: Deserializer<'de>>(
    de: D,
) -> Result<BTreeMap<String, Variable>, D::Error> {
    let raw = Option::<BTreeMap<String, Value>>::deserialize(de)?.unwrap_or_default();
    let mut out = BTreeMap::new();
    for (name, value) in raw {
        let parsed = Variable::deserialize(&value)
            .map_err(|e| e.to_string())
            .and_then(|v| Variable::new(v.kind, &v.value).map_err(|e| e.to_string()));
        match parsed {
            Ok(variable) => {
                out.insert(name, variable);
            }
            Err(error) => warn!(variable = %name, %error, "skipping malformed stored variable"),
        }
    }
    Ok(out)
}

/// Where room records live.
pub trait RoomStore: Send + Sync + 'static {
    /// Reads a record. `Ok(None)` if the room doesn't exist.
    fn load(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<Option<RoomRecord>, StoreError>> + Send;

    /// Writes a record, replacing any previous version.
    fn save(&self, record: &RoomRecord) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// One pretty-printed JSON file per room under a data directory.
///
/// Writes go to a temporary file that is renamed over the target, so a
/// crash mid-write never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Opens (and creates if needed) the data directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        debug!(dir = %dir.display(), "json store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, room_id: &RoomId) -> Result<PathBuf, StoreError> {
        if !room_id.is_valid() {
            return Err(StoreError::InvalidId(room_id.clone()));
        }
        Ok(self.dir.join(format!("{}.json", room_id.as_str())))
    }
}

impl RoomStore for JsonFileStore {
    async fn load(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, StoreError> {
        let path = self.path_for(room_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let mut record: RoomRecord = serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Corrupt { path, source })?;
        // The file name is authoritative.
        record.id = room_id.clone();
        Ok(Some(record))
    }

    async fn save(&self, record: &RoomRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.id)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record).map_err(StoreError::Serialize)?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io { path, source })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Records held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RoomId, RoomRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with records.
    pub fn with_records(records: impl IntoIterator<Item = RoomRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }
}

impl RoomStore for MemoryStore {
    async fn load(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.records.read().await.get(room_id).cloned())
    }

    async fn save(&self, record: &RoomRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }
}
