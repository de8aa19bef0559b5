//! Tests for the command runner and tool façade.
//!
//! Round-trips real subprocesses (`tar`, `gzip`, the sha512 tool) and
//! independently verifies their results with the pure-Rust equivalents.

#![cfg(unix)]

use std::fs;
use std::io::Read;

use sha2::{Digest, Sha512};
use strata::command::{self, Compression};
use strata::Error;
use tempfile::TempDir;

// =============================================================================
// Runner Tests
// =============================================================================

#[tokio::test]
async fn test_run_returns_stdout() {
    let output = command::run("sh", &["-c".into(), "echo hello".into()])
        .await
        .unwrap();
    assert_eq!(output, "hello\n");
}

#[tokio::test]
async fn test_run_failure_captures_exit_code_and_stderr() {
    let err = command::run("sh", &["-c".into(), "echo oops >&2; exit 3".into()])
        .await
        .unwrap_err();

    match err {
        Error::Subprocess {
            tool,
            exit_code,
            stderr,
        } => {
            assert_eq!(tool, "sh");
            assert_eq!(exit_code, Some(3));
            assert_eq!(stderr, "oops");
        }
        other => panic!("expected Subprocess error, got: {other}"),
    }
}

#[tokio::test]
async fn test_run_closes_stdin() {
    // `cat` with a closed stdin exits immediately instead of blocking.
    let output = command::run("cat", &[]).await.unwrap();
    assert_eq!(output, "");
}

// =============================================================================
// Digest Tests
// =============================================================================

#[tokio::test]
async fn test_sha512_matches_independent_digest() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("blob");
    let content = b"strata digest test payload";
    fs::write(&file, content).unwrap();

    let digest = command::sha512(&file).await.unwrap();

    let expected = hex::encode(Sha512::digest(content));
    assert_eq!(digest, expected);
}

#[tokio::test]
async fn test_sha512_missing_file_fails() {
    let temp = TempDir::new().unwrap();

    let result = command::sha512(&temp.path().join("absent")).await;

    assert!(matches!(result, Err(Error::Subprocess { .. })));
}

// =============================================================================
// Compression Tests
// =============================================================================

#[tokio::test]
async fn test_gzip_decompress_roundtrip() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("data.txt");
    let content = "round-trip me\n".repeat(100);
    fs::write(&file, &content).unwrap();

    command::gzip(&file).await.unwrap();
    let compressed = temp.path().join("data.txt.gz");
    assert!(compressed.exists());
    assert!(!file.exists(), "gzip replaces the input");

    // Sanity-check the container format before round-tripping back.
    let mut decoder = flate2::read::GzDecoder::new(fs::File::open(&compressed).unwrap());
    let mut decoded = String::new();
    decoder.read_to_string(&mut decoded).unwrap();
    assert_eq!(decoded, content);

    command::decompress(&compressed).await.unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), content);
}

// =============================================================================
// Archive Tests
// =============================================================================

#[tokio::test]
async fn test_tar_untar_roundtrip() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    fs::create_dir_all(work.join("tree/sub")).unwrap();
    fs::write(work.join("tree/file.txt"), "contents").unwrap();
    fs::write(work.join("tree/sub/nested.txt"), "nested").unwrap();

    let archive = temp.path().join("tree.tar");
    command::tar(std::path::Path::new("tree"), &archive, Some(&work), None)
        .await
        .unwrap();

    // Independently parse the archive before round-tripping it back.
    let mut parsed = tar::Archive::new(fs::File::open(&archive).unwrap());
    let mut entries: Vec<String> = parsed
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert!(entries.contains(&"tree/file.txt".to_string()), "{entries:?}");
    assert!(entries.contains(&"tree/sub/nested.txt".to_string()));

    let dest = temp.path().join("dest");
    fs::create_dir_all(&dest).unwrap();
    command::untar(&archive, Some(&dest)).await.unwrap();

    assert_eq!(
        fs::read_to_string(dest.join("tree/file.txt")).unwrap(),
        "contents"
    );
    assert_eq!(
        fs::read_to_string(dest.join("tree/sub/nested.txt")).unwrap(),
        "nested"
    );
}

#[tokio::test]
async fn test_tar_with_gzip_compression() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    fs::create_dir_all(work.join("tree")).unwrap();
    fs::write(work.join("tree/file.txt"), "compress me").unwrap();

    let archive = temp.path().join("tree.tar.gz");
    command::tar(
        std::path::Path::new("tree"),
        &archive,
        Some(&work),
        Some(Compression::Gzip),
    )
    .await
    .unwrap();

    // Gzip magic bytes confirm the compression flag took effect.
    let bytes = fs::read(&archive).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    // `tar -x` detects the compression on extraction.
    let dest = temp.path().join("dest");
    fs::create_dir_all(&dest).unwrap();
    command::untar(&archive, Some(&dest)).await.unwrap();
    assert_eq!(
        fs::read_to_string(dest.join("tree/file.txt")).unwrap(),
        "compress me"
    );
}

#[tokio::test]
async fn test_untar_missing_archive_fails() {
    let temp = TempDir::new().unwrap();

    let result = command::untar(&temp.path().join("absent.tar"), None).await;

    match result {
        Err(Error::Subprocess { tool, .. }) => assert_eq!(tool, "tar"),
        other => panic!("expected Subprocess error, got: {other:?}"),
    }
}

// =============================================================================
// PATH Probing
// =============================================================================

#[test]
fn test_tool_on_path() {
    assert!(command::tool_on_path("sh"));
    assert!(!command::tool_on_path("strata-definitely-missing-tool"));
}
