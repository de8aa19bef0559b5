//! Tests for the Windows layer backend.
//!
//! The `wclayer` tool itself is only present on Windows hosts, so
//! these tests cover the validation surface, availability reporting,
//! and the failure path when the tool cannot be spawned.

use std::fs;
use std::path::PathBuf;

use strata::{Backend, Error, WclayerBackend};
use tempfile::TempDir;

#[tokio::test]
async fn test_provision_empty_layers_fails() {
    let temp = TempDir::new().unwrap();
    let backend = WclayerBackend::new();
    let rootfs = temp.path().join("rootfs");

    let result = backend.provision(&[], &rootfs, temp.path()).await;

    assert!(matches!(result, Err(Error::EmptyLayers)));
    assert!(!rootfs.exists(), "rootfs should be untouched");
}

#[tokio::test]
async fn test_provision_existing_rootfs_fails() {
    let temp = TempDir::new().unwrap();
    let backend = WclayerBackend::new();
    let rootfs = temp.path().join("rootfs");
    fs::create_dir_all(&rootfs).unwrap();

    let result = backend
        .provision(&[PathBuf::from("base.tar")], &rootfs, temp.path())
        .await;

    assert!(matches!(result, Err(Error::AlreadyProvisioned(_))));
}

#[cfg(not(windows))]
#[tokio::test]
async fn test_provision_without_tool_reports_subprocess_failure() {
    let temp = TempDir::new().unwrap();
    let backend = WclayerBackend::new();
    let rootfs = temp.path().join("rootfs");

    let result = backend
        .provision(&[PathBuf::from("base.tar")], &rootfs, temp.path())
        .await;

    match result {
        Err(Error::Subprocess {
            tool, exit_code, ..
        }) => {
            assert_eq!(tool, "wclayer");
            assert_eq!(exit_code, None, "spawn failure carries no exit code");
        }
        other => panic!("expected Subprocess error, got: {other:?}"),
    }

    // The rootfs directory was created before the first import; the
    // caller is expected to clean up with destroy.
    assert!(rootfs.exists());
}

#[cfg(not(windows))]
#[tokio::test]
async fn test_destroy_without_tool_fails_after_best_effort_unmount() {
    let temp = TempDir::new().unwrap();
    let backend = WclayerBackend::new();
    let rootfs = temp.path().join("rootfs");

    // The unmount failure is logged and swallowed; the first remove
    // still surfaces its error.
    let result = backend.destroy(&rootfs, temp.path()).await;

    assert!(matches!(result, Err(Error::Subprocess { .. })));
}

#[tokio::test]
async fn test_shutdown_cancels_pending_operations() {
    let temp = TempDir::new().unwrap();
    let backend = WclayerBackend::new();

    backend.shutdown();

    let result = backend
        .provision(
            &[PathBuf::from("base.tar")],
            &temp.path().join("rootfs"),
            temp.path(),
        )
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn test_wclayer_backend_surface() {
    let backend = WclayerBackend::new();
    assert_eq!(backend.name(), "wclayer");

    #[cfg(not(windows))]
    {
        assert!(!backend.is_available());
        let reason = backend.unavailable_reason().unwrap();
        assert!(reason.contains("Windows"), "reason was: {reason}");
    }
}
