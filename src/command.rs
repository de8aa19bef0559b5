//! External command runner and typed tool façade.
//!
//! Everything the provisioner shells out to goes through [`run`]: the
//! child gets a closed stdin, both output streams piped, and the
//! caller's working directory. Failures carry the captured stderr so
//! the operator sees what the tool actually said.
//!
//! The typed wrappers below each build one argument vector and
//! delegate. They are compiled on every platform; availability is a
//! runtime question answered by [`tool_on_path`], not a compile-time
//! one.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::constants::WCLAYER_TOOL;
use crate::error::{Error, Result};

// =============================================================================
// Runner
// =============================================================================

/// Runs `tool` with `args`, waits for it to exit, and returns its
/// captured stdout.
///
/// stdin is closed, stdout and stderr are captured, and the child
/// inherits the current working directory. A spawn failure or non-zero
/// exit surfaces as [`Error::Subprocess`] carrying the trimmed stderr.
pub async fn run(tool: &str, args: &[OsString]) -> Result<String> {
    debug!(
        "running: {} {}",
        tool,
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let output = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| Error::Subprocess {
            tool: tool.to_string(),
            exit_code: None,
            stderr: format!("failed to spawn: {e}"),
        })?;

    if !output.status.success() {
        return Err(Error::Subprocess {
            tool: tool.to_string(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Returns true if `tool` resolves to an executable on `PATH`.
pub fn tool_on_path(tool: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };

    std::env::split_paths(&path).any(|dir| {
        let candidate = dir.join(tool);
        if candidate.is_file() {
            return true;
        }

        #[cfg(windows)]
        for ext in crate::constants::PATH_EXTENSIONS {
            if dir.join(format!("{tool}{ext}")).is_file() {
                return true;
            }
        }

        false
    })
}

// =============================================================================
// Archive Tools
// =============================================================================

/// Compression formats understood by the `tar` wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// gzip (`tar -z`).
    Gzip,
    /// bzip2 (`tar -j`).
    Bzip2,
    /// xz (`tar -J`).
    Xz,
}

impl Compression {
    /// The single-letter `tar` flag for this format.
    fn tar_flag(self) -> &'static str {
        match self {
            Self::Gzip => "-z",
            Self::Bzip2 => "-j",
            Self::Xz => "-J",
        }
    }
}

fn tar_args(
    input: &Path,
    output: &Path,
    directory: Option<&Path>,
    compression: Option<Compression>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-c".into(), "-f".into(), output.into()];

    if let Some(dir) = directory {
        args.push("-C".into());
        args.push(dir.into());
    }

    if let Some(compression) = compression {
        args.push(compression.tar_flag().into());
    }

    args.push(input.into());
    args
}

/// Archives `input` into `output`, optionally changing into `directory`
/// first and compressing with `compression`.
pub async fn tar(
    input: &Path,
    output: &Path,
    directory: Option<&Path>,
    compression: Option<Compression>,
) -> Result<()> {
    run("tar", &tar_args(input, output, directory, compression)).await?;
    Ok(())
}

fn untar_args(input: &Path, directory: Option<&Path>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-x".into(), "-f".into(), input.into()];

    if let Some(dir) = directory {
        args.push("-C".into());
        args.push(dir.into());
    }

    args
}

/// Extracts the archive `input` into `directory`, or the current
/// directory when none is given.
pub async fn untar(input: &Path, directory: Option<&Path>) -> Result<()> {
    run("tar", &untar_args(input, directory)).await?;
    Ok(())
}

/// Compresses `input` in place, producing `<input>.gz`.
pub async fn gzip(input: &Path) -> Result<()> {
    run("gzip", &[input.into()]).await?;
    Ok(())
}

/// Decompresses `input` in place; the format is selected by the file
/// extension.
pub async fn decompress(input: &Path) -> Result<()> {
    run("gzip", &["-d".into(), input.into()]).await?;
    Ok(())
}

// =============================================================================
// Digests
// =============================================================================

/// Computes the SHA-512 digest of `input`, returning the hex string.
pub async fn sha512(input: &Path) -> Result<String> {
    #[cfg(target_os = "linux")]
    let (tool, args): (&str, Vec<OsString>) = ("sha512sum", vec![input.into()]);

    #[cfg(not(target_os = "linux"))]
    let (tool, args): (&str, Vec<OsString>) =
        ("shasum", vec!["-a".into(), "512".into(), input.into()]);

    let output = run(tool, &args).await?;

    let digest = output
        .split_whitespace()
        .next()
        .ok_or_else(|| Error::Internal(format!("no digest in '{tool}' output: '{output}'")))?;

    if digest.len() != 128 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Internal(format!(
            "unexpected digest in '{tool}' output: '{digest}'"
        )));
    }

    Ok(digest.to_string())
}

// =============================================================================
// Windows Container Layers (wclayer)
// =============================================================================

fn push_layer_flags(args: &mut Vec<OsString>, layers: &[impl AsRef<OsStr>]) {
    for layer in layers {
        args.push("-l".into());
        args.push(layer.as_ref().into());
    }
}

/// Creates a writable scratch layer at `scratch` on top of the
/// read-only `rlayers` (ordered top-first, base last).
pub async fn wclayer_create(scratch: &Path, rlayers: &[impl AsRef<OsStr>]) -> Result<()> {
    let mut args: Vec<OsString> = vec!["create".into(), scratch.into()];
    push_layer_flags(&mut args, rlayers);
    run(WCLAYER_TOOL, &args).await?;
    Ok(())
}

/// Imports the layer tarball `input` into `directory`, layered over the
/// already-imported `parents` (ordered top-first).
pub async fn wclayer_import(
    directory: &Path,
    input: &Path,
    parents: &[impl AsRef<OsStr>],
) -> Result<()> {
    let mut args: Vec<OsString> = vec!["import".into(), directory.into(), input.into()];
    push_layer_flags(&mut args, parents);
    run(WCLAYER_TOOL, &args).await?;
    Ok(())
}

/// Exports the layer at `directory` to the tarball `output`.
pub async fn wclayer_export(
    directory: &Path,
    output: &Path,
    gzip: bool,
    parents: &[impl AsRef<OsStr>],
) -> Result<()> {
    let mut args: Vec<OsString> = vec!["export".into(), directory.into(), "-o".into(), output.into()];
    if gzip {
        args.push("--gzip".into());
    }
    push_layer_flags(&mut args, parents);
    run(WCLAYER_TOOL, &args).await?;
    Ok(())
}

/// Mounts the scratch layer at `scratch` over the read-only `rlayers`
/// (ordered top-first, base last).
pub async fn wclayer_mount(scratch: &Path, rlayers: &[impl AsRef<OsStr>]) -> Result<()> {
    let mut args: Vec<OsString> = vec!["mount".into(), scratch.into()];
    push_layer_flags(&mut args, rlayers);
    run(WCLAYER_TOOL, &args).await?;
    Ok(())
}

/// Unmounts the layer mounted at `directory`.
pub async fn wclayer_unmount(directory: &Path) -> Result<()> {
    run(WCLAYER_TOOL, &["unmount".into(), directory.into()]).await?;
    Ok(())
}

/// Removes the layer at `directory` from the layer store.
pub async fn wclayer_remove(directory: &Path) -> Result<()> {
    run(WCLAYER_TOOL, &["remove".into(), directory.into()]).await?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_tar_args_plain() {
        let args = tar_args(Path::new("rootfs"), Path::new("out.tar"), None, None);
        assert_eq!(strs(&args), ["-c", "-f", "out.tar", "rootfs"]);
    }

    #[test]
    fn test_tar_args_with_directory_and_compression() {
        let args = tar_args(
            Path::new("rootfs"),
            Path::new("out.tar.gz"),
            Some(Path::new("/work")),
            Some(Compression::Gzip),
        );
        assert_eq!(
            strs(&args),
            ["-c", "-f", "out.tar.gz", "-C", "/work", "-z", "rootfs"]
        );
    }

    #[test]
    fn test_tar_compression_flags() {
        assert_eq!(Compression::Gzip.tar_flag(), "-z");
        assert_eq!(Compression::Bzip2.tar_flag(), "-j");
        assert_eq!(Compression::Xz.tar_flag(), "-J");
    }

    #[test]
    fn test_untar_args() {
        let args = untar_args(Path::new("in.tar"), Some(Path::new("dest")));
        assert_eq!(strs(&args), ["-x", "-f", "in.tar", "-C", "dest"]);
    }

    #[test]
    fn test_wclayer_layer_flags_preserve_order() {
        let mut args: Vec<OsString> = vec![];
        push_layer_flags(&mut args, &["c:\\l\\1", "c:\\l\\2"]);
        assert_eq!(strs(&args), ["-l", "c:\\l\\1", "-l", "c:\\l\\2"]);
    }

    #[tokio::test]
    async fn test_run_missing_tool_reports_spawn_failure() {
        let err = run("strata-no-such-tool", &[]).await.unwrap_err();
        match err {
            Error::Subprocess {
                tool, exit_code, ..
            } => {
                assert_eq!(tool, "strata-no-such-tool");
                assert_eq!(exit_code, None);
            }
            other => panic!("expected Subprocess error, got: {other}"),
        }
    }

    #[test]
    fn test_tool_on_path_finds_common_tool() {
        #[cfg(unix)]
        assert!(tool_on_path("sh"));
        assert!(!tool_on_path("strata-no-such-tool"));
    }
}
