//! # strata
//!
//! **Container Root Filesystem Provisioner**
//!
//! This crate materializes an ordered stack of read-only image layers
//! into a usable container root filesystem, and tears it down on
//! container destruction. It is invoked by a containerizer just before
//! a container starts and just after it exits.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            strata                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                      Backend Trait                        │  │
//! │  │   provision(layers, rootfs, backend_dir) → rootfs ready   │  │
//! │  │   destroy(rootfs, backend_dir)           → rootfs gone    │  │
//! │  └───────────────────────────┬───────────────────────────────┘  │
//! │                              │                                  │
//! │  ┌──────────────────────┐    │    ┌──────────────────────────┐  │
//! │  │     CopyBackend      │    │    │      WclayerBackend      │  │
//! │  │  whiteout-aware      │    │    │  Windows layer store     │  │
//! │  │  layered copy        │    │    │  via `wclayer` tool      │  │
//! │  │  (POSIX + Windows)   │    │    │  import/create/mount     │  │
//! │  └──────────┬───────────┘    │    └────────────┬─────────────┘  │
//! │             │                │                 │                │
//! │  ┌──────────┴────────────────┴─────────────────┴─────────────┐  │
//! │  │              Command Runner + Tool Façade                 │  │
//! │  │  cp │ rm │ tar │ gzip │ sha512sum │ wclayer …             │  │
//! │  │  stdin closed │ stderr captured into failures             │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Layer Model
//!
//! Layers are immutable extracted directories ordered **base-first**;
//! top layers override lower layers. Deletions are expressed with AUFS
//! whiteouts:
//!
//! | Marker | Meaning |
//! |--------|---------|
//! | `.wh.<name>` | delete the sibling `<name>` from lower layers |
//! | `.wh..wh..opq` | discard all lower-layer contents of this directory |
//!
//! The merged rootfs never contains a whiteout marker.
//!
//! # Concurrency Model
//!
//! Each backend instance serializes its own operations in dispatch
//! order; distinct instances run in parallel. Callers serialize per
//! target: the same rootfs is never provisioned concurrently, and
//! `destroy` is only issued after the matching `provision` completed.
//! Cancellation is cooperative - `shutdown()` aborts pending work at
//! phase boundaries and in-flight subprocesses are left to finish.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::{Path, PathBuf};
//! use strata::{Backend, CopyBackend};
//!
//! #[tokio::main]
//! async fn main() -> strata::Result<()> {
//!     let backend = CopyBackend::new();
//!
//!     let layers = vec![
//!         PathBuf::from("/var/lib/agent/layers/base"),
//!         PathBuf::from("/var/lib/agent/layers/app"),
//!     ];
//!     let rootfs = Path::new("/var/lib/agent/containers/c1/rootfs");
//!     let backend_dir = Path::new("/var/lib/agent/provisioner");
//!
//!     backend.provision(&layers, rootfs, backend_dir).await?;
//!     // ... run the container ...
//!     backend.destroy(rootfs, backend_dir).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

// =============================================================================
// Modules
// =============================================================================

pub mod backend;
pub mod backends;
pub mod command;
pub mod constants;
pub mod error;
pub mod paths;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{Backend, BackendType};
pub use backends::{BackendRegistry, CopyBackend, WclayerBackend};
pub use error::{Error, Result};
