//! Storage backends for project records
//!
//! Every mutation is a read-modify-write through [`ProjectStore::update`],
//! serialised per project so concurrent appends never lose each other.

use crate::error::MemoryError;
use crate::memory::record::ProjectRecord;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Mutation applied to a loaded record
pub type RecordUpdate<'a> = Box<dyn FnOnce(&mut ProjectRecord) + Send + 'a>;

/// Read/write contract for project records
pub trait ProjectStore: Send + Sync + fmt::Debug {
    /// Load a record; an absent project yields an empty record
    fn load(&self, project_id: &str) -> Result<ProjectRecord, MemoryError>;

    /// Load, mutate and persist a record as one step
    fn update(&self, project_id: &str, f: RecordUpdate<'_>) -> Result<(), MemoryError>;
}

/// Per-project locks
#[derive(Debug, Default)]
struct ProjectLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProjectLocks {
    fn get(&self, project_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}

/// One pretty-printed JSON file per project under a base directory
#[derive(Debug)]
pub struct JsonFileStore {
    base_path: PathBuf,
    locks: ProjectLocks,
}

impl JsonFileStore {
    /// Open (and create if needed) the base directory
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path).map_err(|e| MemoryError::io(&base_path, e))?;
        Ok(Self {
            base_path,
            locks: ProjectLocks::default(),
        })
    }

    /// Base directory
    #[inline]
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// File holding `project_id`
    ///
    /// ASCII alphanumerics, `-` and `_` are kept; every other byte is
    /// percent-encoded, so distinct ids never share a file and no id can
    /// escape the base directory.
    #[must_use]
    pub fn project_file(&self, project_id: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.json", encode_file_stem(project_id)))
    }

    fn read(&self, project_id: &str) -> Result<ProjectRecord, MemoryError> {
        let path = self.project_file(project_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProjectRecord::empty(project_id));
            }
            Err(e) => return Err(MemoryError::io(&path, e)),
        };
        let record = match serde_json::from_str::<ProjectRecord>(&raw) {
            Ok(record) => record,
            Err(e) => {
                let quarantine = path.with_extension("json.corrupt");
                std::fs::rename(&path, &quarantine)
                    .map_err(|e| MemoryError::io(&quarantine, e))?;
                tracing::warn!(
                    project_id,
                    path = %path.display(),
                    quarantine = %quarantine.display(),
                    error = %e,
                    "Unreadable project file moved aside, starting from an empty record"
                );
                return Ok(ProjectRecord::empty(project_id));
            }
        };
        if !record.project_id.is_empty() && record.project_id != project_id {
            return Err(MemoryError::ProjectMismatch {
                expected: project_id.to_string(),
                found: record.project_id,
            });
        }
        Ok(record)
    }

    fn write(&self, project_id: &str, record: &ProjectRecord) -> Result<(), MemoryError> {
        let path = self.project_file(project_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp, body).map_err(|e| MemoryError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| MemoryError::io(&path, e))?;
        Ok(())
    }
}

impl ProjectStore for JsonFileStore {
    fn load(&self, project_id: &str) -> Result<ProjectRecord, MemoryError> {
        let lock = self.locks.get(project_id);
        let _guard = lock.lock();
        self.read(project_id)
    }

    fn update(&self, project_id: &str, f: RecordUpdate<'_>) -> Result<(), MemoryError> {
        let lock = self.locks.get(project_id);
        let _guard = lock.lock();
        let mut record = self.read(project_id)?;
        f(&mut record);
        self.write(project_id, &record)
    }
}

fn encode_file_stem(project_id: &str) -> String {
    if project_id.is_empty() {
        return "%".to_string();
    }
    let mut stem = String::with_capacity(project_id.len());
    for byte in project_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

/// Volatile store for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: DashMap<String, ProjectRecord>,
}

impl InMemoryStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectStore for InMemoryStore {
    fn load(&self, project_id: &str) -> Result<ProjectRecord, MemoryError> {
        Ok(self
            .records
            .get(project_id)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| ProjectRecord::empty(project_id)))
    }

    fn update(&self, project_id: &str, f: RecordUpdate<'_>) -> Result<(), MemoryError> {
        let mut entry = self
            .records
            .entry(project_id.to_string())
            .or_insert_with(|| ProjectRecord::empty(project_id));
        f(entry.value_mut());
        Ok(())
    }
}
