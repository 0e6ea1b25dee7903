//! Durable continuation tokens, one per (group, stream), kept in a single YAML
//! document that operators can read and edit by hand.
//!
//! The store has exactly one writer (the poll worker). Every `put_token` is a
//! read-modify-write of the whole table followed by a temp-file rename, so an
//! interrupted worker leaves either the previous table or the new one on disk.

use crate::source::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// group name -> stream name -> continuation token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointTable {
    groups: BTreeMap<String, BTreeMap<String, String>>,
}

impl CheckpointTable {
    pub fn get(&self, target: &Target) -> Option<&str> {
        self.groups
            .get(target.group())
            .and_then(|streams| streams.get(target.stream()))
            .map(String::as_str)
    }

    pub fn set(&mut self, target: &Target, token: impl Into<String>) {
        self.groups
            .entry(target.group().to_owned())
            .or_default()
            .insert(target.stream().to_owned(), token.into());
    }

    /// Number of targets with a stored token.
    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub enum CheckpointError {
    Read { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: serde_yaml::Error },
    Encode { source: serde_yaml::Error },
    Write { path: PathBuf, source: io::Error },
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Read { path, .. } => {
                write!(f, "failed to read checkpoint file {}", path.display())
            }
            CheckpointError::Parse { path, .. } => {
                write!(f, "checkpoint file {} is malformed", path.display())
            }
            CheckpointError::Encode { .. } => write!(f, "failed to encode checkpoint table"),
            CheckpointError::Write { path, .. } => {
                write!(f, "failed to write checkpoint file {}", path.display())
            }
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckpointError::Read { source, .. } | CheckpointError::Write { source, .. } => {
                Some(source)
            }
            CheckpointError::Parse { source, .. } | CheckpointError::Encode { source } => {
                Some(source)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the full table. A missing (or empty) file is the first-run state.
    pub fn load(&self) -> Result<CheckpointTable, CheckpointError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(CheckpointTable::default());
            }
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(CheckpointTable::default());
        }

        serde_yaml::from_str(&contents).map_err(|source| CheckpointError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Returns the stored token for `target`, with trailing whitespace removed.
    pub fn get_token(&self, target: &Target) -> Result<Option<String>, CheckpointError> {
        let table = self.load()?;
        Ok(table
            .get(target)
            .map(str::trim_end)
            .filter(|token| !token.is_empty())
            .map(str::to_owned))
    }

    /// Overwrites the token for `target` only; every other entry is preserved.
    pub fn put_token(&self, target: &Target, token: &str) -> Result<(), CheckpointError> {
        let mut table = self.load()?;
        table.set(target, token);
        self.write(&table)
    }

    fn write(&self, table: &CheckpointTable) -> Result<(), CheckpointError> {
        let encoded =
            serde_yaml::to_string(table).map_err(|source| CheckpointError::Encode { source })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| CheckpointError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        let tmp_path = self.temp_path();
        fs::write(&tmp_path, encoded).map_err(|source| CheckpointError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| CheckpointError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::trace!(path = %self.path.display(), targets = table.len(), "checkpoint table written");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
