//! Error taxonomy for plugin loading and verification.

use std::path::{Path, PathBuf};

use lockstep_abi::ContractId;

/// Errors produced while loading, verifying or registering a plugin.
///
/// The two variants a host is expected to branch on are
/// [`GateError::ContractMismatch`] (the binary loaded fine but was built
/// against a different interface revision) and [`GateError::BinaryLoad`]
/// (the binary never made it into the process, so no identifier was ever
/// compared). Both are recoverable at the loader boundary: the host keeps
/// running without the plugin.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The plugin reported a different interface revision than the host
    /// expects. The plugin was unloaded without any further calls into it.
    #[error("Incompatible contract: expected {expected}, plugin reported {reported}")]
    ContractMismatch {
        /// Identifier the host was built against.
        expected: ContractId,
        /// Identifier the plugin binary reported.
        reported: ContractId,
    },

    /// The plugin binary could not be located or mapped into the process.
    /// Raised before any identifier comparison.
    #[error("Failed to load plugin binary {path:?}: {reason}")]
    BinaryLoad {
        /// Path the load was attempted from.
        path: PathBuf,
        /// What the binary-loading facility reported.
        reason: String,
    },

    /// A required export is missing from the plugin binary.
    #[error("Symbol not found: {0}")]
    MissingEntryPoint(&'static str),

    /// The descriptor entry point returned a null pointer.
    #[error("Plugin descriptor is null")]
    NullDescriptor,

    /// The descriptor was present but malformed.
    #[error("Invalid plugin descriptor: {0}")]
    InvalidDescriptor(String),

    /// The plugin's create entry point failed after a compatible verdict.
    #[error("Plugin instantiation failed: {0}")]
    InstantiateFailed(String),

    /// No plugin with the given name is registered.
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// A plugin is already active for this path or name.
    #[error("Plugin already loaded: {0}")]
    AlreadyLoaded(String),
}

impl GateError {
    /// Build a [`GateError::BinaryLoad`] for `path`.
    pub fn binary_load(path: &Path, reason: impl Into<String>) -> Self {
        Self::BinaryLoad {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Result type for loading and verification operations.
pub type Result<T> = std::result::Result<T, GateError>;
