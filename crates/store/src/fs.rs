// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File store: typed YAML/JSON documents and recursive directory operations
//!
//! Callers own document semantics; this module only encodes, decodes, and
//! moves bytes. Writes go through a temp file and rename so a crashed write
//! never leaves a half-document behind. Listing a missing directory yields an
//! empty list rather than an error.

use garcon_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Create a directory tree; idempotent.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    Ok(())
}

pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

pub async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

/// Read and decode a YAML document.
pub async fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).await?;
    serde_yaml::from_slice(&bytes)
        .map_err(|e| Error::Internal(format!("yaml {}: {e}", path.display())))
}

/// Encode and atomically write a YAML document.
pub async fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_yaml::to_string(value)
        .map_err(|e| Error::Internal(format!("yaml {}: {e}", path.display())))?;
    write_atomic(path, bytes.as_bytes()).await
}

/// Read and decode a JSON document.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encode and atomically write a JSON document.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

/// Write-then-rename so readers never observe a partial file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Recursively copy `src` into `dst`, creating `dst` as needed.
///
/// Existing files in `dst` are overwritten; files only present in `dst`
/// survive (pure copy, no sync).
pub async fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    if !is_dir(src).await {
        return Err(Error::not_found("directory", src.display()));
    }
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).await?;
        let mut entries = fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else if file_type.is_file() {
                fs::copy(entry.path(), target).await?;
            }
            // symlinks and specials are skipped; server trees are plain files
        }
    }
    Ok(())
}

/// Recursively delete a directory tree; missing tree is not an error.
pub async fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// List files in a directory, optionally filtered by extension.
/// A missing directory yields an empty list.
pub async fn list_files(path: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        if let Some(ext) = extension {
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// List direct subdirectory names. A missing directory yields an empty list.
pub async fn list_subdirs(path: &Path) -> Result<Vec<String>> {
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                dirs.push(name.to_string());
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Sum of file sizes under a directory tree.
pub async fn dir_size(path: &Path) -> Result<u64> {
    let mut total = 0u64;
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                total += entry.metadata().await?.len();
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
