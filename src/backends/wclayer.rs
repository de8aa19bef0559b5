//! Windows layer provisioning backend.
//!
//! Builds a container rootfs out of the Windows-native layer store by
//! driving the external `wclayer` tool:
//!
//! 1. Layer tarballs are imported **top-down** into numeric
//!    directories under the rootfs (`rootfs/1` is the top layer);
//!    each lower import lists the already-imported higher layers as
//!    parents. Numeric names keep path length bounded - `wclayer
//!    import` is sensitive to it.
//! 2. A writable scratch layer is created at
//!    `<backend_dir>/scratch/<rootfs-basename>/` on top of the
//!    read-only stack.
//! 3. The merged view is mounted at the scratch layer.
//!
//! `destroy` unmounts the scratch layer (best-effort), then removes
//! the scratch layer and the rootfs from the layer store.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::backend::{Backend, OpState};
use crate::command;
use crate::constants::{SCRATCH_DIR, WCLAYER_TOOL};
use crate::error::{Error, Result};

// =============================================================================
// WclayerBackend
// =============================================================================

/// Provisioning backend for Windows container layers.
///
/// ## Thread Safety
///
/// The backend is `Send + Sync`; operations on one instance are
/// serialized in dispatch order by an internal fair mutex.
pub struct WclayerBackend {
    state: OpState,
}

impl WclayerBackend {
    /// Creates a new wclayer backend.
    pub fn new() -> Self {
        Self {
            state: OpState::new(),
        }
    }
}

impl Default for WclayerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for WclayerBackend {
    fn name(&self) -> &str {
        "wclayer"
    }

    #[cfg(windows)]
    fn is_available(&self) -> bool {
        command::tool_on_path(WCLAYER_TOOL)
    }

    #[cfg(not(windows))]
    fn is_available(&self) -> bool {
        false
    }

    fn unavailable_reason(&self) -> Option<String> {
        if self.is_available() {
            return None;
        }

        if cfg!(windows) {
            Some(format!("'{WCLAYER_TOOL}' not found on PATH"))
        } else {
            Some("wclayer backend only available on Windows".to_string())
        }
    }

    async fn provision(
        &self,
        layers: &[PathBuf],
        rootfs: &Path,
        backend_dir: &Path,
    ) -> Result<()> {
        let _guard = self.state.begin().await?;

        if layers.is_empty() {
            return Err(Error::EmptyLayers);
        }

        if fs::symlink_metadata(rootfs).is_ok() {
            return Err(Error::AlreadyProvisioned(rootfs.to_path_buf()));
        }

        fs::create_dir_all(rootfs).map_err(|e| Error::io("mkdir", rootfs, e))?;

        // Imports chain strictly sequentially: each lower layer needs
        // the higher layers already present in the layer store.
        let steps = import_plan(layers, rootfs);
        for step in &steps {
            self.state.checkpoint()?;
            command::wclayer_import(&step.directory, &step.tarball, &step.parents).await?;
        }

        // The import directories are ordered top-first, so the base
        // layer sits last - the wclayer convention for create/mount.
        let rlayers: Vec<PathBuf> = steps.into_iter().map(|s| s.directory).collect();
        let scratch = scratch_dir(backend_dir, rootfs)?;

        self.state.checkpoint()?;
        command::wclayer_create(&scratch, &rlayers).await?;

        self.state.checkpoint()?;
        command::wclayer_mount(&scratch, &rlayers).await?;

        info!(
            "provisioned rootfs '{}' from {} layer(s), scratch at '{}'",
            rootfs.display(),
            rlayers.len(),
            scratch.display()
        );
        Ok(())
    }

    async fn destroy(&self, rootfs: &Path, backend_dir: &Path) -> Result<bool> {
        let _guard = self.state.begin().await?;

        let scratch = scratch_dir(backend_dir, rootfs)?;

        // Best-effort: the scratch layer may already be unmounted.
        if let Err(e) = command::wclayer_unmount(&scratch).await {
            warn!(
                "failed to unmount scratch directory '{}': {e}",
                scratch.display()
            );
        }

        command::wclayer_remove(&scratch).await?;
        command::wclayer_remove(rootfs).await?;

        info!("destroyed rootfs '{}'", rootfs.display());
        Ok(true)
    }

    fn shutdown(&self) {
        self.state.shutdown();
    }
}

// =============================================================================
// Import Planning
// =============================================================================

/// One `wclayer import` invocation: a layer tarball, its numeric
/// target directory, and the higher layers it is layered under.
#[derive(Debug, PartialEq, Eq)]
struct ImportStep {
    directory: PathBuf,
    tarball: PathBuf,
    parents: Vec<PathBuf>,
}

/// Pairs each layer tarball with its import directory and parent list,
/// in import order (top layer first). The j-th import (1-based) lands
/// in `rootfs/<j>` with parents `rootfs/1 ... rootfs/<j-1>`.
fn import_plan(layers: &[PathBuf], rootfs: &Path) -> Vec<ImportStep> {
    let directories: Vec<PathBuf> = (1..=layers.len())
        .map(|i| rootfs.join(i.to_string()))
        .collect();

    layers
        .iter()
        .rev()
        .enumerate()
        .map(|(i, tarball)| ImportStep {
            directory: directories[i].clone(),
            tarball: tarball.clone(),
            parents: directories[..i].to_vec(),
        })
        .collect()
}

/// Derives the per-rootfs scratch volume path inside the backend
/// workspace: `<backend_dir>/scratch/<rootfs-basename>/`.
fn scratch_dir(backend_dir: &Path, rootfs: &Path) -> Result<PathBuf> {
    let rootfs_id = rootfs.file_name().ok_or_else(|| {
        Error::Internal(format!("rootfs '{}' has no basename", rootfs.display()))
    })?;

    Ok(backend_dir.join(SCRATCH_DIR).join(rootfs_id))
}

// =============================================================================
// Tests
// =============================================================================
