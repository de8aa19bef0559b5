//! Provisioning backend trait - the contract between the containerizer
//! and the rootfs provisioning algorithms.
//!
//! A backend turns an ordered stack of image layers into a usable root
//! filesystem (`provision`) and tears it down again (`destroy`):
//!
//! ```text
//! provision(layers, rootfs, backend_dir) → rootfs populated
//! destroy(rootfs, backend_dir)           → rootfs gone, true
//! ```
//!
//! Layers are ordered base-first; top layers override lower layers.
//! Any reversal a particular tool needs is a backend concern.
//!
//! # Concurrency
//!
//! Each backend instance serializes its own operations: a provision or
//! destroy dispatched to an instance runs to completion before the next
//! one starts, in dispatch order. Distinct instances run in parallel.
//! Callers never provision the same rootfs concurrently.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};

// =============================================================================
// Backend Selection
// =============================================================================

/// Names a provisioning backend, for configuration and registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Whiteout-aware layered copy (POSIX and Windows).
    Copy,
    /// Windows-native layer store driven by the `wclayer` tool.
    Wclayer,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Wclayer => write!(f, "wclayer"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "copy" => Ok(Self::Copy),
            "wclayer" => Ok(Self::Wclayer),
            other => Err(Error::Internal(format!("unknown backend '{other}'"))),
        }
    }
}

// =============================================================================
// Backend Trait
// =============================================================================

/// A root filesystem provisioning backend.
///
/// # Lifecycle
///
/// The containerizer allocates a fresh, nonexistent `rootfs` path and a
/// `backend_dir` workspace, then calls `provision` just before the
/// container starts and `destroy` just after it exits. Between those
/// calls the rootfs belongs to the caller. `destroy` may only be issued
/// once the `provision` for the same rootfs has completed (success or
/// failure).
///
/// # Failure
///
/// A failed `provision` does not roll back partial rootfs state; the
/// caller cleans up with `destroy`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the backend name.
    fn name(&self) -> &str;

    /// Checks if this backend can run on the current host.
    fn is_available(&self) -> bool;

    /// Returns the reason why this backend is unavailable (if any).
    fn unavailable_reason(&self) -> Option<String>;

    /// Materializes `layers` (base-first) into `rootfs`.
    ///
    /// Fails with [`Error::EmptyLayers`] when no layers are given and
    /// [`Error::AlreadyProvisioned`] when `rootfs` already exists. On
    /// success `rootfs` exists, is non-empty, and contains no whiteout
    /// markers; the backend workspace may have gained entries.
    async fn provision(&self, layers: &[PathBuf], rootfs: &Path, backend_dir: &Path)
        -> Result<()>;

    /// Tears down a provisioned `rootfs`.
    ///
    /// Resolves `true` on full success, after which `rootfs` no longer
    /// exists. `false` is reserved for nothing-to-destroy outcomes;
    /// current backends always resolve `true` or fail. Destroying a
    /// nonexistent rootfs is an error.
    async fn destroy(&self, rootfs: &Path, backend_dir: &Path) -> Result<bool>;

    /// Stops the backend: pending and future operations abort with
    /// [`Error::Cancelled`] at their next checkpoint. In-flight
    /// subprocesses are left to finish.
    fn shutdown(&self);
}

// =============================================================================
// Operation State
// =============================================================================

/// Per-instance operation gate shared by the backends: a fair mutex
/// serializing operations in dispatch order, plus the cooperative
/// cancellation flag flipped by `shutdown()`.
#[derive(Debug, Default)]
pub(crate) struct OpState {
    ops: Mutex<()>,
    cancelled: AtomicBool,
}

impl OpState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquires the operation lock. Tokio mutexes are fair, so waiting
    /// operations proceed in dispatch order.
    pub(crate) async fn begin(&self) -> Result<MutexGuard<'_, ()>> {
        let guard = self.ops.lock().await;
        self.checkpoint()?;
        Ok(guard)
    }

    /// Cancellation checkpoint, observed between phases and layers.
    pub(crate) fn checkpoint(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    pub(crate) fn shutdown(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
