//! The binary-loading facility and the loaded-but-unverified binary.
//!
//! Mapping a plugin binary into the process is deliberately separated from
//! verifying it: [`BinaryLoader`] only locates and maps, and the
//! [`PluginBinary`] it hands back answers the one frozen identifier query.
//! Everything else on the binary is off limits until the gate has returned a
//! compatible verdict. Tests substitute in-process fakes at this seam;
//! production hosts use [`DynamicLibraryLoader`].

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use lockstep_abi::descriptor::{
    symbols, ContractIdFn, CreateInstanceFn, DestroyInstanceFn, PluginDescriptorFn,
};
use lockstep_abi::{ContractId, PluginInfo};

use crate::config::LoaderConfig;
use crate::error::{GateError, Result};

/// A plugin binary that is mapped into the process but not yet verified.
///
/// Only [`PluginBinary::reported_contract_id`] may be called before the
/// version gate has admitted the binary; it resolves the frozen entry point,
/// which is stable across every interface revision. [`PluginBinary::descriptor`]
/// dereferences revision-dependent data and is only safe to interpret once
/// both sides agree on the contract, so callers invoke it strictly after a
/// compatible verdict.
pub trait PluginBinary: Send + Sync + std::fmt::Debug {
    /// Path this binary was loaded from.
    fn path(&self) -> &Path;

    /// Query the frozen identifier entry point.
    fn reported_contract_id(&self) -> Result<ContractId>;

    /// Read and validate the plugin descriptor. Post-verdict only.
    fn descriptor(&self) -> Result<ValidatedDescriptor>;
}

/// Descriptor contents after null and UTF-8/semver validation.
///
/// The function pointers still point into the plugin binary; whoever holds
/// them must keep the originating [`PluginBinary`] alive.
pub struct ValidatedDescriptor {
    /// Owned name and build version.
    pub info: PluginInfo,
    /// Constructs the plugin instance.
    pub create: CreateInstanceFn,
    /// Releases an instance produced by `create`.
    pub destroy: DestroyInstanceFn,
}

/// The external facility that locates and maps plugin binaries.
///
/// Failures here surface as [`GateError::BinaryLoad`], before any identifier
/// is compared.
pub trait BinaryLoader: Send + Sync {
    /// Map the binary at `path` into the process.
    fn load(&self, path: &Path) -> Result<Box<dyn PluginBinary>>;
}

/// [`BinaryLoader`] backed by `libloading`.
///
/// When search paths are configured, a binary may only be loaded from inside
/// one of them (checked against canonicalized paths, so symlinks cannot step
/// outside). An empty search-path list leaves loading unconfined.
pub struct DynamicLibraryLoader {
    /// Directories plugins may be loaded from.
    search_paths: Vec<PathBuf>,
}

impl DynamicLibraryLoader {
    /// Create an unconfined loader.
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
        }
    }

    /// Create a loader confined to the configured search paths.
    pub fn with_config(config: &LoaderConfig) -> Self {
        Self {
            search_paths: config.search_paths.clone(),
        }
    }

    /// Add a search path for plugins.
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }

    /// Validate `path` and return its canonical form.
    fn validate_path(&self, path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(GateError::binary_load(path, "path does not exist"));
        }
        if !path.is_file() {
            return Err(GateError::binary_load(path, "path is not a file"));
        }
        if !is_native_library(path) {
            return Err(GateError::binary_load(
                path,
                format!(
                    "not a native library for this platform (expected .{})",
                    std::env::consts::DLL_EXTENSION
                ),
            ));
        }

        let canonical = path
            .canonicalize()
            .map_err(|e| GateError::binary_load(path, format!("cannot canonicalize path: {e}")))?;

        if !self.search_paths.is_empty() {
            let allowed = self.search_paths.iter().any(|search_path| {
                search_path
                    .canonicalize()
                    .map(|canonical_search| canonical.starts_with(canonical_search))
                    .unwrap_or(false)
            });
            if !allowed {
                return Err(GateError::binary_load(
                    path,
                    "path is not within the configured search paths",
                ));
            }
        }

        Ok(canonical)
    }
}

impl Default for DynamicLibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryLoader for DynamicLibraryLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn PluginBinary>> {
        let canonical = self.validate_path(path)?;

        // SAFETY: mapping a library runs its initializers; the path has been
        // confined to the configured search paths above.
        let library = unsafe {
            Library::new(&canonical)
                .map_err(|e| GateError::binary_load(path, format!("failed to map library: {e}")))?
        };

        tracing::debug!("Mapped plugin binary {:?}", path);

        Ok(Box::new(LoadedLibrary {
            library,
            path: path.to_path_buf(),
        }))
    }
}

/// A dynamic library mapped by [`DynamicLibraryLoader`].
///
/// Dropping it unmaps the library, which is how a rejected binary is
/// discarded.
#[derive(Debug)]
struct LoadedLibrary {
    library: Library,
    path: PathBuf,
}

impl PluginBinary for LoadedLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn reported_contract_id(&self) -> Result<ContractId> {
        // SAFETY: the symbol's name and signature are frozen; any binary
        // exporting it returns a RawContractId by value.
        let query: Symbol<ContractIdFn> = unsafe {
            self.library
                .get(symbols::CONTRACT_ID.as_bytes())
                .map_err(|_| GateError::MissingEntryPoint(symbols::CONTRACT_ID))?
        };
        // SAFETY: no arguments in, 128 bits out; callable before any verdict.
        let raw = unsafe { query() };
        Ok(ContractId::from_raw(raw))
    }

    fn descriptor(&self) -> Result<ValidatedDescriptor> {
        // SAFETY: the descriptor signature is agreed on by both sides once
        // the gate has passed; callers only reach this post-verdict.
        let entry: Symbol<PluginDescriptorFn> = unsafe {
            self.library
                .get(symbols::PLUGIN_DESCRIPTOR.as_bytes())
                .map_err(|_| GateError::MissingEntryPoint(symbols::PLUGIN_DESCRIPTOR))?
        };
        // SAFETY: descriptor entry points return a pointer to a static
        // descriptor inside the (still mapped) binary.
        let descriptor = unsafe { entry() };
        if descriptor.is_null() {
            return Err(GateError::NullDescriptor);
        }

        // SAFETY: non-null and backed by the mapped library held in self.
        let descriptor = unsafe { &*descriptor };
        // SAFETY: same backing as above.
        unsafe { descriptor.validate() }
            .map_err(|reason| GateError::InvalidDescriptor(reason.to_string()))?;
        // SAFETY: validate() checked the string pointers; they point at
        // nul-terminated statics inside the mapped library.
        let info =
            unsafe { PluginInfo::from_descriptor(descriptor) }.map_err(GateError::InvalidDescriptor)?;

        Ok(ValidatedDescriptor {
            info,
            create: descriptor.create,
            destroy: descriptor.destroy,
        })
    }
}

/// Check whether a file looks like a native library for this platform.
pub fn is_native_library(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str());
    match std::env::consts::OS {
        "macos" => ext == Some("dylib"),
        "windows" => ext == Some("dll"),
        _ => ext == Some("so"),
    }
}

/// List the native libraries directly inside `dir`, sorted by path.
///
/// Unreadable directories yield an empty list; per-file errors are the
/// caller's concern since loading is where they surface.
pub fn discover_in_dir(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_native_library(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    found
}
