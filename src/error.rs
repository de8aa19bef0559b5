//! Error types for the rootfs provisioning layer.

use std::path::PathBuf;

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while provisioning or destroying a rootfs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Provision Preconditions
    // =========================================================================
    /// No filesystem layers were provided.
    #[error("no filesystem layers provided")]
    EmptyLayers,

    /// The target rootfs already exists.
    #[error("rootfs is already provisioned: {}", .0.display())]
    AlreadyProvisioned(PathBuf),

    // =========================================================================
    // Filesystem Errors
    // =========================================================================
    /// A filesystem operation failed. `op` names the phase
    /// (`mkdir`, `stat`, `walk`, `unlink`, `rmdir`, `copy`).
    #[error("{op} failed for '{}': {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    /// A whiteout marker survived the copy but could not be removed.
    #[error("failed to remove whiteout file '{}': {source}", .path.display())]
    WhiteoutRemovalFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    // =========================================================================
    // Subprocess Errors
    // =========================================================================
    /// An external tool exited non-zero or could not be spawned.
    /// `exit_code` is `None` when the child could not be spawned or reaped.
    #[error("'{tool}' failed{}: {stderr}", fmt_exit_code(.exit_code))]
    Subprocess {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    // =========================================================================
    // Cancellation
    // =========================================================================
    /// The backend was shut down while the operation was pending.
    #[error("operation cancelled")]
    Cancelled,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wraps an I/O error with the failing phase and path.
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => String::new(),
    }
}
