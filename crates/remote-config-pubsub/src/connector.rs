// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-slot channels carrying the latest Remote Config payload from the
//! publishing process to every subscriber.
//!
//! A connector holds at most one [`SharedData`] value. Writes overwrite the
//! slot (last write wins) and reads are level-triggered: reading never
//! consumes the slot, so two reads without an intervening write return the
//! same payload. Consumers are expected to diff repeated payloads themselves.
//!
//! Backends:
//!
//! - `SharedMemoryConnector` (unix): an anonymous `MAP_SHARED` segment mapped
//!   before the application forks. Writes made by the parent after the fork
//!   reach every child.
//! - [`FileConnector`]: a JSON document on disk, replaced through an atomic
//!   rename so readers in unrelated processes never see a partial payload.
//! - [`MemoryConnector`]: a lock-protected slot in process memory, for
//!   single-process use. It does not cross `fork`: a child only keeps a copy
//!   of the value written before the fork.

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tempfile::NamedTempFile;

use crate::error::ConnectorError;
use crate::metadata::{ConfigMetadata, RawConfig, SharedData, SharedDataRef};

/// Transport-agnostic single-slot channel between a publisher and its subscribers.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Replaces the slot content with the given payload.
    fn write(
        &self,
        metadata: Option<&ConfigMetadata>,
        config: &RawConfig,
    ) -> Result<(), ConnectorError>;

    /// Returns the latest payload without clearing it, or `None` when nothing
    /// was ever written.
    fn read(&self) -> Result<Option<SharedData>, ConnectorError>;
}

/// In-process connector backed by an `RwLock`. Writes never cross `fork`.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    slot: RwLock<Option<SharedData>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for MemoryConnector {
    fn write(
        &self,
        metadata: Option<&ConfigMetadata>,
        config: &RawConfig,
    ) -> Result<(), ConnectorError> {
        let data = SharedData {
            metadata: metadata.cloned(),
            config: config.clone(),
        };
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(data);
        Ok(())
    }

    fn read(&self) -> Result<Option<SharedData>, ConnectorError> {
        Ok(self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// File-backed connector shared by every process that knows the path.
#[derive(Debug, Clone)]
pub struct FileConnector {
    path: PathBuf,
}

impl FileConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the JSON document holding the slot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl Connector for FileConnector {
    fn write(
        &self,
        metadata: Option<&ConfigMetadata>,
        config: &RawConfig,
    ) -> Result<(), ConnectorError> {
        let document = serde_json::to_vec(&SharedDataRef { metadata, config })?;

        let directory = self.directory();
        fs::create_dir_all(directory)?;

        // The temporary file must live next to the target so the rename stays
        // on one filesystem and is atomic.
        let mut staging = NamedTempFile::new_in(directory)?;
        staging.write_all(&document)?;
        staging.as_file().sync_all()?;
        staging
            .persist(&self.path)
            .map_err(|err| ConnectorError::Io(err.error))?;
        Ok(())
    }

    fn read(&self) -> Result<Option<SharedData>, ConnectorError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_connector_starts_empty() {
        let connector = MemoryConnector::new();
        assert!(connector.read().expect("read").is_none());
    }

    #[test]
    fn memory_connector_reads_are_level_triggered() {
        let connector = MemoryConnector::new();
        let metadata = ConfigMetadata::new("cfg", "LIVE_DEBUGGING", 1);
        connector
            .write(Some(&metadata), &json!({"id": "p1"}))
            .expect("write");

        let first = connector.read().expect("read").expect("payload");
        let second = connector.read().expect("read").expect("payload");
        assert_eq!(first, second);
        assert_eq!(first.metadata, Some(metadata));
    }

    #[test]
    fn memory_connector_last_write_wins() {
        let connector = MemoryConnector::new();
        connector.write(None, &json!({"a": 1})).expect("write");
        connector.write(None, &json!({"b": 2})).expect("write");

        let data = connector.read().expect("read").expect("payload");
        assert_eq!(data.config, json!({"b": 2}));
        assert!(data.metadata.is_none());
    }

    #[test]
    fn file_connector_missing_file_reads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let connector = FileConnector::new(dir.path().join("absent.json"));
        assert!(connector.read().expect("read").is_none());
    }

    #[test]
    fn file_connector_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("asm.json");
        let writer = FileConnector::new(&path);
        let reader = FileConnector::new(&path);

        let metadata = ConfigMetadata::new("cfg", "ASM_FEATURES", 7);
        writer
            .write(Some(&metadata), &json!({"asm": {"enabled": true}}))
            .expect("write");
        writer.write(Some(&metadata), &json!(false)).expect("write");

        let data = reader.read().expect("read").expect("payload");
        assert_eq!(data.metadata, Some(metadata));
        assert_eq!(data.config, json!(false));

        // No staging files are left behind next to the slot.
        let entries = fs::read_dir(path.parent().expect("parent"))
            .expect("read_dir")
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn file_connector_reports_corrupted_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("slot.json");
        fs::write(&path, b"{not json").expect("write garbage");

        let connector = FileConnector::new(&path);
        assert!(matches!(
            connector.read(),
            Err(ConnectorError::Serialization(_))
        ));
    }
}
