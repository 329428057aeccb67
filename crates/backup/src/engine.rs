// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup engine
//!
//! Streams gzip-compressed tars of a server's data directory to a temp file,
//! atomically finalizes, and enforces the per-type retention cap on every
//! create. Archive I/O runs on the blocking pool so it never stalls request
//! handling.

use crate::filename::{backup_filename, parse_backup_filename, BackupType};
use flate2::write::GzEncoder;
use flate2::Compression;
use garcon_core::{format_millis, parse_millis, Clock, Error, Result};
use garcon_store::fs as store;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Gzip level for backup archives.
const GZIP_LEVEL: u32 = 6;

/// One backup, as derived from its filename and size on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub server_id: String,
    /// ISO-8601 millisecond timestamp, UTC.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    /// Archive size in bytes.
    pub size: u64,
    /// Transient metadata; returned on create, never stored on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub filename: String,
    pub path: String,
}

/// Result of a restore.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub server_id: String,
    pub restored_from: String,
    pub pre_restore_backup: BackupRecord,
}

/// Backup engine over the configured servers/backups directories.
#[derive(Clone)]
pub struct BackupEngine<C: Clock> {
    servers_dir: PathBuf,
    backups_dir: PathBuf,
    max_per_type: usize,
    clock: C,
}

impl<C: Clock> BackupEngine<C> {
    pub fn new(servers_dir: PathBuf, backups_dir: PathBuf, max_per_type: usize, clock: C) -> Self {
        Self { servers_dir, backups_dir, max_per_type, clock }
    }

    fn server_data_dir(&self, server_id: &str) -> PathBuf {
        self.servers_dir.join(server_id)
    }

    fn server_backup_dir(&self, server_id: &str) -> PathBuf {
        self.backups_dir.join(server_id)
    }

    /// List backups for a server, newest first. A missing backup directory
    /// yields an empty list.
    pub async fn list(&self, server_id: &str) -> Result<Vec<BackupRecord>> {
        let dir = self.server_backup_dir(server_id);
        let mut records = Vec::new();
        for path in store::list_files(&dir, None).await? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let Some((timestamp, backup_type)) = parse_backup_filename(name) else {
                continue; // operator-placed file, not ours
            };
            let size = tokio::fs::metadata(&path).await?.len();
            records.push(BackupRecord {
                server_id: server_id.to_string(),
                timestamp,
                backup_type,
                size,
                description: None,
                filename: name.to_string(),
                path: path.display().to_string(),
            });
        }
        records.sort_by(|a, b| parse_millis(&b.timestamp).cmp(&parse_millis(&a.timestamp)));
        Ok(records)
    }

    /// Create a backup of the server's data directory.
    pub async fn create(
        &self,
        server_id: &str,
        backup_type: BackupType,
        description: Option<String>,
    ) -> Result<BackupRecord> {
        let data_dir = self.server_data_dir(server_id);
        if !store::is_dir(&data_dir).await {
            return Err(Error::not_found("server data directory for", server_id));
        }
        let backup_dir = self.server_backup_dir(server_id);
        store::ensure_dir(&backup_dir).await?;

        // Timestamp after the precondition check.
        let timestamp = format_millis(self.clock.now());
        let filename = backup_filename(&timestamp, backup_type);
        let path = backup_dir.join(&filename);
        let tmp = backup_dir.join(format!("{filename}.tmp"));

        archive_dir(&data_dir, &tmp).await?;
        tokio::fs::rename(&tmp, &path).await?;
        let size = tokio::fs::metadata(&path).await?.len();

        info!(%server_id, %filename, size, "backup created");

        // Best-effort: a retention failure never fails the create.
        if let Err(e) = self.enforce_retention(server_id, backup_type).await {
            warn!(%server_id, error = %e, "backup retention enforcement failed");
        }

        Ok(BackupRecord {
            server_id: server_id.to_string(),
            timestamp,
            backup_type,
            size,
            description,
            filename,
            path: path.display().to_string(),
        })
    }

    /// Delete the backup with exactly this parsed timestamp.
    pub async fn delete(&self, server_id: &str, timestamp: &str) -> Result<()> {
        let records = self.list(server_id).await?;
        let record = records
            .into_iter()
            .find(|r| r.timestamp == timestamp)
            .ok_or_else(|| Error::not_found("backup", timestamp))?;
        tokio::fs::remove_file(&record.path).await?;
        info!(%server_id, %timestamp, "backup deleted");
        Ok(())
    }

    /// Remove every backup of a server.
    pub async fn delete_all(&self, server_id: &str) -> Result<()> {
        store::remove_dir(&self.server_backup_dir(server_id)).await
    }

    /// Restore a server's data directory from a backup.
    ///
    /// Takes a pre-restore backup of the current tree first; if extraction
    /// then fails, that backup is retained and the error surfaces.
    pub async fn restore(&self, server_id: &str, timestamp: &str) -> Result<RestoreOutcome> {
        let records = self.list(server_id).await?;
        let source = records
            .into_iter()
            .find(|r| r.timestamp == timestamp)
            .ok_or_else(|| Error::not_found("backup", timestamp))?;

        let pre_restore = self.create(server_id, BackupType::PreRestore, None).await?;

        let data_dir = self.server_data_dir(server_id);
        store::remove_dir(&data_dir).await?;
        store::ensure_dir(&data_dir).await?;
        extract_archive(Path::new(&source.path), &data_dir).await?;

        info!(%server_id, restored_from = %timestamp, "restore complete");
        Ok(RestoreOutcome {
            server_id: server_id.to_string(),
            restored_from: timestamp.to_string(),
            pre_restore_backup: pre_restore,
        })
    }

    /// Delete the oldest backups of this type beyond the cap.
    async fn enforce_retention(&self, server_id: &str, backup_type: BackupType) -> Result<()> {
        let of_type: Vec<BackupRecord> = self
            .list(server_id)
            .await?
            .into_iter()
            .filter(|r| r.backup_type == backup_type)
            .collect();
        // list() is newest-first, so the excess is the tail.
        for stale in of_type.iter().skip(self.max_per_type) {
            info!(%server_id, filename = %stale.filename, "retention trim");
            tokio::fs::remove_file(&stale.path).await?;
        }
        Ok(())
    }
}

/// Tar + gzip `src` into `dst` on the blocking pool.
async fn archive_dir(src: &Path, dst: &Path) -> Result<()> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let file = std::fs::File::create(&dst)?;
        let encoder = GzEncoder::new(file, Compression::new(GZIP_LEVEL));
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(".", &src)?;
        builder.into_inner()?.finish()?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Internal(format!("archive task: {e}")))??;
    Ok(())
}

/// Unpack a gzip tarball into `dst` on the blocking pool.
async fn extract_archive(archive: &Path, dst: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let file = std::fs::File::open(&archive)?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(decoder);
        archive.unpack(&dst)?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Internal(format!("extract task: {e}")))??;
    Ok(())
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
