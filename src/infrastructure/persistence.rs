use crate::domain::{AuthGrant, RequestDraft, ResidueRow};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid CSV file: {0}")]
    Csv(#[from] csv::Error),
}

/// Where the in-progress draft survives restarts.
///
/// `load` never fails: a missing or unreadable draft yields the defaults.
pub trait DraftStore: Send {
    fn load(&self) -> RequestDraft;
    fn save(&mut self, draft: &RequestDraft) -> Result<(), PersistenceError>;
    fn clear(&mut self) -> Result<(), PersistenceError>;
}

fn decode_draft(raw: &str, origin: &str) -> RequestDraft {
    match serde_json::from_str::<RequestDraft>(raw) {
        Ok(draft) => draft,
        Err(e) => {
            warn!(origin, error = %e, "stored draft is corrupted, starting from defaults");
            RequestDraft::default()
        }
    }
}

pub struct FileDraftStore {
    path: PathBuf,
}

impl FileDraftStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DraftStore for FileDraftStore {
    fn load(&self) -> RequestDraft {
        match fs::read_to_string(&self.path) {
            Ok(content) => decode_draft(&content, &self.path.display().to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => RequestDraft::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read draft");
                RequestDraft::default()
            }
        }
    }

    fn save(&mut self, draft: &RequestDraft) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(draft)?;
        write_file(&self.path, &json)
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        remove_file(&self.path)
    }
}

/// Draft store kept in memory. Clones share the same slot, which lets a
/// caller keep a handle on what the wizard persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryDraftStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with raw stored text, valid or not.
    pub fn with_raw(raw: &str) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(raw.to_string()))),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().map(|slot| slot.clone()).unwrap_or(None)
    }
}

impl DraftStore for MemoryDraftStore {
    fn load(&self) -> RequestDraft {
        match self.raw() {
            Some(raw) => decode_draft(&raw, "memory"),
            None => RequestDraft::default(),
        }
    }

    fn save(&mut self, draft: &RequestDraft) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(draft)?;
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(json);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
        Ok(())
    }
}

/// Keeps the bearer token and user id between runs.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Option<AuthGrant> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read session");
                return None;
            }
        };
        match serde_json::from_str::<AuthGrant>(&content) {
            Ok(grant) => Some(grant),
            Err(e) => {
                warn!(error = %e, "stored session is invalid, ignoring it");
                None
            }
        }
    }

    pub fn save(&self, grant: &AuthGrant) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(grant)?;
        write_file(&self.path, &json)
    }

    pub fn clear(&self) -> Result<(), PersistenceError> {
        remove_file(&self.path)
    }
}

/// Reads residue rows from a CSV file with `material,cantidad,unidad` headers.
pub fn import_residue_rows(path: &Path) -> Result<Vec<ResidueRow>, PersistenceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.deserialize::<ResidueRow>() {
        let row = record?;
        if !row.is_blank() {
            rows.push(row);
        }
    }
    debug!(path = %path.display(), rows = rows.len(), "imported residue rows");
    Ok(rows)
}

fn write_file(path: &Path, content: &str) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_file(path: &Path) -> Result<(), PersistenceError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
