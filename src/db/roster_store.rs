// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable roster membership records, one per followee.
//!
//! Only identity and refresh bookkeeping are stored here; cached health
//! data lives elsewhere.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Persisted roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterRecord {
    pub id: String,
    pub display_name: String,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

/// Backing store for roster records.
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// Write (or overwrite) the record for `record.id`.
    async fn save(&self, record: &RosterRecord) -> Result<(), AppError>;

    /// Every readable record; unreadable ones are skipped.
    async fn load_all(&self) -> Result<Vec<RosterRecord>, AppError>;

    /// Remove the record for `id`; removing a missing record is not an error.
    async fn delete(&self, id: &str) -> Result<(), AppError>;
}

/// Directory of JSON files, one per followee.
///
/// File names are the SHA-256 of the followee id, so arbitrary ids are safe
/// on any filesystem. Writes go to a temp file that is synced and renamed
/// over the old record, then the directory itself is synced so the rename
/// is durable too.
#[derive(Debug, Clone)]
pub struct FileRosterStore {
    dir: PathBuf,
}

impl FileRosterStore {
    /// Open the store, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        tracing::info!(dir = %dir.display(), "Roster store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_stem(id: &str) -> String {
        hex::encode(Sha256::digest(id.as_bytes()))
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", Self::file_stem(id), RECORD_EXTENSION))
    }

    /// Flush the directory entry table.
    #[cfg(unix)]
    async fn sync_dir(&self) -> std::io::Result<()> {
        tokio::fs::File::open(&self.dir).await?.sync_all().await
    }

    // Directories cannot be opened as files here; renames are as durable
    // as the platform makes them.
    #[cfg(not(unix))]
    async fn sync_dir(&self) -> std::io::Result<()> {
        Ok(())
    }

    fn temp_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.{}",
            Self::file_stem(id),
            RECORD_EXTENSION,
            TEMP_EXTENSION
        ))
    }
}

#[async_trait]
impl RosterStore for FileRosterStore {
    async fn save(&self, record: &RosterRecord) -> Result<(), AppError> {
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| AppError::Storage(format!("Failed to encode roster record: {}", e)))?;

        let temp_path = self.temp_path(&record.id);
        let final_path = self.record_path(&record.id);
        let io_err =
            |e: std::io::Error| AppError::Storage(format!("Failed to write roster record: {}", e));

        let mut file = tokio::fs::File::create(&temp_path).await.map_err(io_err)?;
        file.write_all(&bytes).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&temp_path, &final_path)
            .await
            .map_err(io_err)?;
        self.sync_dir().await.map_err(io_err)?;

        tracing::debug!(followee_id = %record.id, "Roster record saved");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<RosterRecord>, AppError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            AppError::Storage(format!("Failed to list {}: {}", self.dir.display(), e))
        })?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to list roster records: {}", e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable roster record");
                    continue;
                }
            };

            match serde_json::from_slice::<RosterRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping corrupt roster record");
                }
            }
        }

        tracing::info!(count = records.len(), "Loaded roster records");
        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => {
                self.sync_dir().await.map_err(|e| {
                    AppError::Storage(format!("Failed to delete roster record: {}", e))
                })?;
                tracing::debug!(followee_id = id, "Roster record deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete roster record: {}",
                e
            ))),
        }
    }
}

/// In-memory store for tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryRosterStore {
    records: DashMap<String, RosterRecord>,
}

impl MemoryRosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<RosterRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RosterStore for MemoryRosterStore {
    async fn save(&self, record: &RosterRecord) -> Result<(), AppError> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<RosterRecord>, AppError> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.records.remove(id);
        Ok(())
    }
}
