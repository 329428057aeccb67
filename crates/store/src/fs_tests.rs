// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Doc {
    name: String,
    count: u32,
}

#[tokio::test]
async fn yaml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.yaml");
    let doc = Doc { name: "alpha".into(), count: 3 };

    write_yaml(&path, &doc).await.unwrap();
    let back: Doc = read_yaml(&path).await.unwrap();
    assert_eq!(back, doc);
}

#[tokio::test]
async fn json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    let doc = Doc { name: "beta".into(), count: 7 };

    write_json(&path, &doc).await.unwrap();
    let back: Doc = read_json(&path).await.unwrap();
    assert_eq!(back, doc);
}

#[tokio::test]
async fn write_creates_missing_parents_and_leaves_no_tmp() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a/b/doc.yaml");

    write_yaml(&path, &Doc { name: "x".into(), count: 0 }).await.unwrap();
    assert!(exists(&path).await);
    let siblings = list_files(path.parent().unwrap(), None).await.unwrap();
    assert_eq!(siblings, vec![path]);
}

#[tokio::test]
async fn copy_dir_is_recursive_and_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    tokio::fs::create_dir_all(src.join("nested")).await.unwrap();
    tokio::fs::write(src.join("top.txt"), b"new").await.unwrap();
    tokio::fs::write(src.join("nested/deep.txt"), b"deep").await.unwrap();
    tokio::fs::create_dir_all(&dst).await.unwrap();
    tokio::fs::write(dst.join("top.txt"), b"old").await.unwrap();
    tokio::fs::write(dst.join("keep.txt"), b"keep").await.unwrap();

    copy_dir(&src, &dst).await.unwrap();

    assert_eq!(tokio::fs::read(dst.join("top.txt")).await.unwrap(), b"new");
    assert_eq!(tokio::fs::read(dst.join("nested/deep.txt")).await.unwrap(), b"deep");
    // pure copy: files only present in dst survive
    assert_eq!(tokio::fs::read(dst.join("keep.txt")).await.unwrap(), b"keep");
}

#[tokio::test]
async fn copy_dir_missing_source_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = copy_dir(&dir.path().join("nope"), &dir.path().join("dst")).await.unwrap_err();
    assert_eq!(err.kind(), garcon_core::ErrorKind::NotFound);
}

#[tokio::test]
async fn remove_dir_tolerates_missing() {
    let dir = tempfile::tempdir().unwrap();
    remove_dir(&dir.path().join("missing")).await.unwrap();
}

#[tokio::test]
async fn list_files_filters_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("a.yaml"), b"-").await.unwrap();
    tokio::fs::write(dir.path().join("b.txt"), b"-").await.unwrap();
    tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();

    let yamls = list_files(dir.path(), Some("yaml")).await.unwrap();
    assert_eq!(yamls, vec![dir.path().join("a.yaml")]);

    let all = list_files(dir.path(), None).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn listing_missing_directory_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    assert!(list_files(&dir.path().join("none"), None).await.unwrap().is_empty());
    assert!(list_subdirs(&dir.path().join("none")).await.unwrap().is_empty());
}

#[tokio::test]
async fn dir_size_sums_recursively() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::create_dir_all(dir.path().join("sub")).await.unwrap();
    tokio::fs::write(dir.path().join("a"), vec![0u8; 100]).await.unwrap();
    tokio::fs::write(dir.path().join("sub/b"), vec![0u8; 28]).await.unwrap();

    assert_eq!(dir_size(dir.path()).await.unwrap(), 128);
}
