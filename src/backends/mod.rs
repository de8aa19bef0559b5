//! Provisioning backend implementations.
//!
//! Each backend realizes the [`Backend`] contract with a different
//! algorithm: `copy` fully materializes the merged rootfs, `wclayer`
//! drives the Windows-native layer store. All backends are compiled on
//! every platform; availability is a runtime question.

pub mod copy;
pub mod wclayer;

pub use self::copy::CopyBackend;
pub use self::wclayer::WclayerBackend;

use crate::backend::{Backend, BackendType};
use std::sync::Arc;

/// Registry of the compiled provisioning backends.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Creates a registry holding one instance of every backend.
    pub fn new() -> Self {
        let backends: Vec<Arc<dyn Backend>> = vec![
            Arc::new(CopyBackend::new()),
            Arc::new(WclayerBackend::new()),
        ];

        Self { backends }
    }

    /// Returns all registered backends.
    pub fn all(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    /// Returns the backends usable on this host.
    pub fn available(&self) -> Vec<&dyn Backend> {
        self.backends
            .iter()
            .filter(|b| b.is_available())
            .map(|b| b.as_ref())
            .collect()
    }

    /// Gets a backend by name.
    pub fn get(&self, name: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .map(|b| b.as_ref())
    }

    /// Gets a backend by type.
    pub fn get_typed(&self, ty: BackendType) -> Option<&dyn Backend> {
        self.get(&ty.to_string())
    }

    /// Picks the preferred backend for this host: `wclayer` on Windows
    /// when the tool is present, otherwise the copy backend.
    pub fn default_backend(&self) -> Option<&dyn Backend> {
        if cfg!(windows) {
            if let Some(backend) = self.get_typed(BackendType::Wclayer) {
                if backend.is_available() {
                    return Some(backend);
                }
            }
        }

        self.get_typed(BackendType::Copy)
            .filter(|b| b.is_available())
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
