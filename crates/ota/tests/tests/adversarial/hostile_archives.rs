//! Adversarial test: archives that try to escape the bundle root, or carry
//! no usable content, never become bundles.

use ota_core::{DownloadRequest, UpdaterError};
use ota_store::ExtractError;
use ota_tests::{write_raw_tar_gz, Harness};

#[tokio::test]
async fn parent_traversal_is_rejected() {
    let h = Harness::new();
    let updater = h.boot().await;
    let archive = h.path().join("evil.tar.gz");
    write_raw_tar_gz(&archive, "../../escaped.txt", b"gotcha");

    let err = updater
        .download(DownloadRequest::new(archive.to_string_lossy()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UpdaterError::Extract(ExtractError::UnsafePath(_))
    ));
    assert!(!h.path().join("escaped.txt").exists());
    assert!(!h.path().join("data/escaped.txt").exists());
    assert_eq!(updater.list().len(), 1);
}

#[tokio::test]
async fn failed_extraction_leaves_no_staging_behind() {
    let h = Harness::new();
    let updater = h.boot().await;
    let archive = h.path().join("evil.tar.gz");
    write_raw_tar_gz(&archive, "../escaped.txt", b"x");
    let _ = updater
        .download(DownloadRequest::new(archive.to_string_lossy()))
        .await;

    let staging = updater.store().root().join("staging");
    assert_eq!(std::fs::read_dir(staging).unwrap().count(), 0);
}

#[tokio::test]
async fn metadata_only_archive_is_empty() {
    let h = Harness::new();
    let updater = h.boot().await;
    let archive = h.archive(
        "metadata",
        &[("__MACOSX/._index.html", b"meta"), (".DS_Store", b"meta")],
    );

    let err = updater
        .download(DownloadRequest::new(archive.to_string_lossy()))
        .await
        .unwrap_err();
    assert!(matches!(err, UpdaterError::Extract(ExtractError::Empty)));
}

#[tokio::test]
async fn entry_point_in_nested_subfolder_is_not_found() {
    let h = Harness::new();
    let updater = h.boot().await;
    // Two levels deep: only one wrapping folder is flattened.
    let archive = h.archive("deep", &[("a/b/index.html", b"<html>")]);
    let bundle = updater
        .download(DownloadRequest::new(archive.to_string_lossy()))
        .await
        .unwrap();

    assert!(matches!(
        updater.set(&bundle.version, None),
        Err(UpdaterError::InvalidBundle { .. })
    ));
}
