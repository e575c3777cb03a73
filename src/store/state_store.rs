//! StateStore - atomic state.json read/write

use crate::models::SessionState;
use arc_swap::ArcSwap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Parse attempts before falling back to the last good snapshot
const READ_ATTEMPTS: usize = 2;

/// Pause between attempts, long enough for an in-flight rename to land
const READ_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Errors that can occur reading or writing the state document
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("State file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("Failed to parse state file '{}': {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to persist state file '{}': {}", .path.display(), .source)]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// File identity used to detect a change without parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    modified: Option<SystemTime>,
    len: u64,
    inode: u64,
}

impl Freshness {
    /// Probe `path`; `None` when the file does not exist
    pub fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;

        #[cfg(unix)]
        let inode = std::os::unix::fs::MetadataExt::ino(&meta);
        #[cfg(not(unix))]
        let inode = 0;

        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
            inode,
        })
    }
}

/// Single-document store backing the monitor
pub struct StateStore {
    path: PathBuf,
    last_good: ArcSwap<SessionState>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_good: ArcSwap::from_pointee(SessionState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last snapshot successfully read or written by this store
    pub fn last_good(&self) -> Arc<SessionState> {
        self.last_good.load_full()
    }

    pub fn freshness(&self) -> Option<Freshness> {
        Freshness::of(&self.path)
    }

    /// Read and parse the document once, surfacing any failure
    pub fn read_strict(&self) -> Result<SessionState, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::Missing(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let state: SessionState =
            serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;

        Ok(state.normalized())
    }

    /// Read the latest committed document
    ///
    /// Never fails: a missing file yields the last good snapshot (initially
    /// an empty session), and an unreadable one is retried before falling
    /// back the same way.
    pub fn read(&self) -> Arc<SessionState> {
        for attempt in 1..=READ_ATTEMPTS {
            match self.read_strict() {
                Ok(state) => {
                    let state = Arc::new(state);
                    self.last_good.store(Arc::clone(&state));
                    return state;
                }
                Err(StoreError::Missing(_)) => break,
                Err(e) if attempt < READ_ATTEMPTS => {
                    debug!(error = %e, attempt, "state read raced a writer, retrying");
                    std::thread::sleep(READ_RETRY_DELAY);
                }
                Err(e) => {
                    warn!(error = %e, "state file unreadable, serving last good snapshot");
                }
            }
        }

        self.last_good.load_full()
    }

    /// Atomically replace the document
    ///
    /// Writes to a temporary file in the same directory, then persists it
    /// over the target so readers see either the old or the new document.
    pub fn write(&self, state: &SessionState) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(state)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.flush()?;

        temp_file
            .persist(&self.path)
            .map_err(|e| StoreError::Persist {
                path: self.path.clone(),
                source: e.error,
            })?;

        self.last_good.store(Arc::new(state.clone()));
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
