//! Durable snapshot storage for the game-state document.
//!
//! The engine persists the whole document after every mutation and reloads it
//! on startup, merged over compiled defaults. Storage failures are reported to
//! callers as [`StorageError`] values; they log and continue in memory, so a
//! missing or broken backend never takes the game down.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::dao::storage::{StorageError, StorageResult};

/// Durability layer for the game-state document.
///
/// Implementations hold exactly one snapshot (the local-storage analog of the
/// browser original): `save` overwrites it wholesale, `load` returns it if
/// present, `clear` removes it.
pub trait SnapshotStore: Send + Sync {
    /// Read the stored snapshot, if any.
    fn load(&self) -> StorageResult<Option<Value>>;
    /// Replace the stored snapshot with the given document.
    fn save(&self, document: &Value) -> StorageResult<()>;
    /// Remove the stored snapshot.
    fn clear(&self) -> StorageResult<()>;
}

/// File-backed snapshot store writing one JSON document.
///
/// Writes go through a sibling temp file followed by a rename so a crash
/// mid-write cannot leave a half-written snapshot behind.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Create a store at `path`, creating parent directories as needed.
    pub fn new(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| {
                StorageError::unavailable(
                    format!("creating snapshot directory `{}`", parent.display()),
                    err,
                )
            })?;
        }
        Ok(Self { path })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> StorageResult<Option<Value>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StorageError::unavailable(
                    format!("reading snapshot `{}`", self.path.display()),
                    err,
                ));
            }
        };

        let document = serde_json::from_str(&contents).map_err(|err| {
            StorageError::corrupt(format!("decoding snapshot `{}`", self.path.display()), err)
        })?;
        Ok(Some(document))
    }

    fn save(&self, document: &Value) -> StorageResult<()> {
        let serialized = serde_json::to_string(document).map_err(|err| {
            StorageError::corrupt("encoding game state snapshot".to_string(), err)
        })?;

        let temp = self.temp_path();
        fs::write(&temp, serialized).map_err(|err| {
            StorageError::unavailable(format!("writing snapshot `{}`", temp.display()), err)
        })?;
        fs::rename(&temp, &self.path).map_err(|err| {
            StorageError::unavailable(
                format!("committing snapshot `{}`", self.path.display()),
                err,
            )
        })?;
        debug!(path = %self.path.display(), "snapshot persisted");
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::unavailable(
                format!("removing snapshot `{}`", self.path.display()),
                err,
            )),
        }
    }
}
