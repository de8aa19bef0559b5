//! Copy provisioning backend - whiteout-aware layered copy.
//!
//! Materializes a layer stack by copying each layer, base first, onto
//! the rootfs while honoring AUFS whiteout semantics. Every layer goes
//! through four phases:
//!
//! 1. **Scan**: a physical preorder walk of the layer records whiteout
//!    markers and queues the rootfs paths that must be removed before
//!    the copy (whiteout targets, kind changes, symlinks about to be
//!    overwritten).
//! 2. **Pre-copy removals**: the queued paths are deleted. A path may
//!    already be gone because an ancestor was removed earlier in the
//!    queue; that is not an error.
//! 3. **Copy**: the layer is copied over the rootfs preserving
//!    attributes, ownership, and symlinks as links. On POSIX this is a
//!    `cp -a` subprocess; on Windows a native recursive copy.
//! 4. **Whiteout cleanup**: the copied-in marker files are unlinked so
//!    no `.wh.` entry survives in the merged tree.
//!
//! ## Whiteout Semantics
//!
//! - `.wh.<name>` deletes the sibling `<name>` inherited from lower
//!   layers.
//! - `.wh..wh..opq` wipes the entire containing directory before this
//!   layer's own contents are applied.
//!
//! ## Security
//!
//! A symlink in the rootfs is never followed when a higher layer
//! replaces it: the link is removed as a link before the copy runs.
//! Otherwise a stack like `ROOTFS: /bad -> /usr/bin/python`,
//! `LAYER: /bad is a malicious executable` would overwrite the link
//! target on the host-shared lower layer instead of the link itself.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::backend::{Backend, OpState};
use crate::constants::{WHITEOUT_OPAQUE, WHITEOUT_PREFIX};
use crate::error::{Error, Result};
use crate::paths::relative_to;

#[cfg(unix)]
use crate::command;

// =============================================================================
// CopyBackend
// =============================================================================

/// Provisioning backend that fully materializes the merged rootfs with
/// a plain recursive copy per layer.
///
/// ## Thread Safety
///
/// The backend is `Send + Sync`; operations on one instance are
/// serialized in dispatch order by an internal fair mutex.
pub struct CopyBackend {
    state: OpState,
}

impl CopyBackend {
    /// Creates a new copy backend.
    pub fn new() -> Self {
        Self {
            state: OpState::new(),
        }
    }

    async fn apply_layer(&self, layer: &Path, rootfs: &Path) -> Result<()> {
        debug!(
            "applying layer '{}' to rootfs '{}'",
            layer.display(),
            rootfs.display()
        );

        let plan = scan_layer(layer, rootfs)?;
        self.state.checkpoint()?;

        execute_removals(&plan.removals)?;
        self.state.checkpoint()?;

        copy_layer(layer, rootfs).await?;
        remove_whiteouts(&plan.whiteouts)
    }
}

impl Default for CopyBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for CopyBackend {
    fn name(&self) -> &str {
        "copy"
    }

    #[cfg(unix)]
    fn is_available(&self) -> bool {
        command::tool_on_path("cp") && command::tool_on_path("rm")
    }

    #[cfg(windows)]
    fn is_available(&self) -> bool {
        true
    }

    fn unavailable_reason(&self) -> Option<String> {
        if self.is_available() {
            None
        } else {
            Some("'cp' and 'rm' must be on PATH".to_string())
        }
    }

    async fn provision(
        &self,
        layers: &[PathBuf],
        rootfs: &Path,
        _backend_dir: &Path,
    ) -> Result<()> {
        let _guard = self.state.begin().await?;

        if layers.is_empty() {
            return Err(Error::EmptyLayers);
        }

        if fs::symlink_metadata(rootfs).is_ok() {
            return Err(Error::AlreadyProvisioned(rootfs.to_path_buf()));
        }

        fs::create_dir_all(rootfs).map_err(|e| Error::io("mkdir", rootfs, e))?;

        for layer in layers {
            self.state.checkpoint()?;
            self.apply_layer(layer, rootfs).await?;
        }

        info!(
            "provisioned rootfs '{}' from {} layer(s)",
            rootfs.display(),
            layers.len()
        );
        Ok(())
    }

    async fn destroy(&self, rootfs: &Path, _backend_dir: &Path) -> Result<bool> {
        let _guard = self.state.begin().await?;

        fs::symlink_metadata(rootfs).map_err(|e| Error::io("stat", rootfs, e))?;

        #[cfg(unix)]
        command::run("rm", &["-rf".into(), rootfs.into()]).await?;

        #[cfg(windows)]
        fs::remove_dir_all(rootfs).map_err(|e| Error::io("rmdir", rootfs, e))?;

        info!("destroyed rootfs '{}'", rootfs.display());
        Ok(true)
    }

    fn shutdown(&self) {
        self.state.shutdown();
    }
}

// =============================================================================
// Phase 1: Scan
// =============================================================================

/// Removal and cleanup work discovered while scanning one layer.
#[derive(Debug, Default)]
struct LayerPlan {
    /// Marker files (rootfs coordinates) to unlink after the copy.
    whiteouts: Vec<PathBuf>,
    /// Rootfs paths to delete before the copy, in discovery order.
    removals: Vec<PathBuf>,
}

/// Walks `layer` physically (never dereferencing symlinks) in preorder
/// and builds the removal plan against the partially built `rootfs`.
fn scan_layer(layer: &Path, rootfs: &Path) -> Result<LayerPlan> {
    let mut plan = LayerPlan::default();
    let mut stack = vec![layer.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| Error::io("walk", &dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| Error::io("walk", &dir, e))?;
            let path = entry.path();
            let meta =
                fs::symlink_metadata(&path).map_err(|e| Error::io("walk", &path, e))?;

            scan_entry(layer, rootfs, &path, &meta, &mut plan)?;

            if meta.is_dir() {
                stack.push(path);
            }
        }
    }

    Ok(plan)
}

fn scan_entry(
    layer: &Path,
    rootfs: &Path,
    path: &Path,
    meta: &fs::Metadata,
    plan: &mut LayerPlan,
) -> Result<()> {
    let rel = relative_to(layer, path)?;
    let rootfs_path = rootfs.join(rel);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    // Whiteout markers are regular files; a directory or symlink whose
    // name happens to start with the prefix is ordinary content.
    if meta.is_file() && name.starts_with(WHITEOUT_PREFIX) {
        plan.whiteouts.push(rootfs_path.clone());

        let parent = rootfs.join(rel.parent().unwrap_or_else(|| Path::new("")));
        if name == WHITEOUT_OPAQUE {
            // Wiping the whole directory is safe: it exists in this
            // layer too and the copy re-creates it with the layer's
            // own contents.
            plan.removals.push(parent);
        } else {
            let target = name.strip_prefix(WHITEOUT_PREFIX).unwrap();
            plan.removals.push(parent.join(target));
        }
    }

    // `exists`/`is_dir` stat through symlinks here; only the follow-up
    // check asks about the link itself. A symlink-to-directory is thus
    // caught by the second branch, not the kind comparison.
    if rootfs_path.exists() {
        if rootfs_path.is_dir() != meta.is_dir() {
            // Kind change across layers: a directory replaced by a
            // file or vice versa. The symlink case matters most: if a
            // directory overwrites `ROOTFS: /bad -> /usr`, the link
            // must go before `LAYER: /bad/bin/.wh..wh..opq` could wipe
            // the link target.
            plan.removals.push(rootfs_path);
        } else if is_symlink(&rootfs_path) {
            // The copy must replace the link, not write through it.
            plan.removals.push(rootfs_path);
        }
    }

    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

// =============================================================================
// Phase 2: Pre-copy Removals
// =============================================================================

/// Deletes the queued rootfs paths in order. Paths already gone are
/// skipped: an opaque wipe earlier in the queue may have taken an
/// ancestor with it.
fn execute_removals(removals: &[PathBuf]) -> Result<()> {
    for path in removals {
        let Ok(meta) = fs::symlink_metadata(path) else {
            continue;
        };

        if meta.is_dir() {
            fs::remove_dir_all(path).map_err(|e| Error::io("rmdir", path, e))?;
        } else {
            // Symlinks land here: `symlink_metadata` never follows, so
            // a link to a directory is unlinked as a link.
            fs::remove_file(path).map_err(|e| Error::io("unlink", path, e))?;
        }
    }

    Ok(())
}

// =============================================================================
// Phase 3: Copy
// =============================================================================

#[cfg(all(unix, not(any(target_os = "macos", target_os = "freebsd"))))]
async fn copy_layer(layer: &Path, rootfs: &Path) -> Result<()> {
    // GNU cp: -T treats the destination as the target itself, so the
    // layer's contents land directly in the rootfs.
    command::run("cp", &["-aT".into(), layer.into(), rootfs.into()]).await?;
    Ok(())
}

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
async fn copy_layer(layer: &Path, rootfs: &Path) -> Result<()> {
    // BSD cp has no -T; a trailing slash on the source copies the
    // contents rather than the directory itself.
    let mut source = layer.as_os_str().to_os_string();
    if !source.to_string_lossy().ends_with('/') {
        source.push("/");
    }

    command::run("cp", &["-a".into(), source, rootfs.into()]).await?;
    Ok(())
}

#[cfg(windows)]
async fn copy_layer(layer: &Path, rootfs: &Path) -> Result<()> {
    copy_tree(layer, rootfs)
}

/// Recursive attribute-preserving tree copy. Symlinks are recreated as
/// links; existing entries of the same kind are overwritten.
#[cfg(windows)]
fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    use std::os::windows::fs as winfs;

    let mut stack = vec![(source.to_path_buf(), dest.to_path_buf())];

    while let Some((from, to)) = stack.pop() {
        fs::create_dir_all(&to).map_err(|e| Error::io("copy", &to, e))?;

        let entries = fs::read_dir(&from).map_err(|e| Error::io("copy", &from, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io("copy", &from, e))?;
            let from_path = entry.path();
            let to_path = to.join(entry.file_name());
            let meta = fs::symlink_metadata(&from_path)
                .map_err(|e| Error::io("copy", &from_path, e))?;
            let file_type = meta.file_type();

            if file_type.is_dir() {
                stack.push((from_path, to_path));
            } else if file_type.is_symlink() {
                let target =
                    fs::read_link(&from_path).map_err(|e| Error::io("copy", &from_path, e))?;

                if fs::symlink_metadata(&to_path).is_ok() {
                    fs::remove_file(&to_path).map_err(|e| Error::io("copy", &to_path, e))?;
                }

                // Directory links need the directory flavor of the API.
                let link_result = if from_path.is_dir() {
                    winfs::symlink_dir(&target, &to_path)
                } else {
                    winfs::symlink_file(&target, &to_path)
                };
                link_result.map_err(|e| Error::io("copy", &to_path, e))?;
            } else {
                fs::copy(&from_path, &to_path).map_err(|e| Error::io("copy", &to_path, e))?;
            }
        }
    }

    Ok(())
}

// =============================================================================
// Phase 4: Whiteout Cleanup
// =============================================================================

/// Unlinks the marker files the copy brought into the rootfs. A marker
/// is only allowed to be missing when its parent directory vanished in
/// the same layer pass.
fn remove_whiteouts(whiteouts: &[PathBuf]) -> Result<()> {
    for marker in whiteouts {
        match fs::remove_file(marker) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let parent_exists = marker.parent().map(Path::exists).unwrap_or(false);
                if parent_exists {
                    return Err(Error::WhiteoutRemovalFailed {
                        path: marker.clone(),
                        source: e,
                    });
                }
            }
            Err(e) => {
                return Err(Error::WhiteoutRemovalFailed {
                    path: marker.clone(),
                    source: e,
                });
            }
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
