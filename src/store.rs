//! Session-keyed artifact persistence.
//!
//! Every persisted value is addressed by `(session, name)` and stored as
//! JSON. A missing key surfaces as `ArtifactNotFound`, a normal and
//! reportable condition, since an external reaper may delete an inactive
//! session's artifacts between any two requests.

use crate::error::{DestilarError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Well-known artifact names shared by the CLI stages.
pub mod artifact {
    pub const EVENT_LOG: &str = "event_log";
    pub const SCHEMA: &str = "schema";
    pub const DATASET: &str = "dataset";
    pub const NETWORK: &str = "network";
    pub const TREE: &str = "tree";
    pub const Y_DISTILLED: &str = "y_distilled";
    pub const Y_DISTILLED_TREE: &str = "y_distilled_tree";
    pub const EVALUATION: &str = "evaluation";
}

/// Key-value persistence for session artifacts.
pub trait ArtifactStore {
    /// Persist a value under `(session, name)`, overwriting silently.
    fn save<T: Serialize>(&self, session: &str, name: &str, value: &T) -> Result<()>;

    /// Load the value stored under `(session, name)`.
    fn load<T: DeserializeOwned>(&self, session: &str, name: &str) -> Result<T>;

    /// True if an artifact exists under `(session, name)`.
    fn exists(&self, session: &str, name: &str) -> bool;

    /// Remove a session and all of its artifacts. Removing an absent
    /// session is not an error.
    fn delete_session(&self, session: &str) -> Result<()>;
}

/// Filesystem store: one pretty-printed JSON file per artifact under
/// `root/<session>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`; the directory is created on demand.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session: &str) -> Result<PathBuf> {
        validate_key(session, "session")?;
        Ok(self.root.join(session))
    }

    fn artifact_path(&self, session: &str, name: &str) -> Result<PathBuf> {
        validate_key(name, "artifact name")?;
        Ok(self.session_dir(session)?.join(format!("{name}.json")))
    }
}

/// Session and artifact keys become path components; reject anything that
/// could escape the store root.
fn validate_key(key: &str, what: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !key.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(DestilarError::InvalidSession {
            session: key.to_string(),
            message: format!("{what} must be non-empty [A-Za-z0-9_.-] and not start with '.'"),
        })
    }
}

impl ArtifactStore for FsStore {
    fn save<T: Serialize>(&self, session: &str, name: &str, value: &T) -> Result<()> {
        let path = self.artifact_path(session, name)?;
        let dir = self.session_dir(session)?;
        fs::create_dir_all(&dir)
            .map_err(|e| DestilarError::io(format!("creating {}", dir.display()), e))?;

        let json = serde_json::to_string_pretty(value).map_err(|e| {
            DestilarError::Serialization {
                message: format!("encoding artifact '{name}': {e}"),
            }
        })?;
        fs::write(&path, json)
            .map_err(|e| DestilarError::io(format!("writing {}", path.display()), e))
    }

    fn load<T: DeserializeOwned>(&self, session: &str, name: &str) -> Result<T> {
        let path = self.artifact_path(session, name)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DestilarError::ArtifactNotFound {
                    session: session.to_string(),
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(DestilarError::io(format!("reading {}", path.display()), e)),
        };
        serde_json::from_str(&content).map_err(|e| DestilarError::Serialization {
            message: format!("decoding artifact '{name}': {e}"),
        })
    }

    fn exists(&self, session: &str, name: &str) -> bool {
        self.artifact_path(session, name)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    fn delete_session(&self, session: &str) -> Result<()> {
        let dir = self.session_dir(session)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DestilarError::io(format!("removing {}", dir.display()), e)),
        }
    }
}
