//! Loader configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variables read by the loader.
pub mod env_vars {
    /// Directories to search for plugin binaries, separated the way the
    /// platform separates `PATH` entries.
    pub const PLUGIN_PATH: &str = "LOCKSTEP_PLUGIN_PATH";
}

/// Configuration for the binary-loading facility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directories plugins may be loaded from. An empty list leaves loading
    /// unconfined.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

impl LoaderConfig {
    /// Empty configuration: no search paths, loading unconfined.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read search paths from [`env_vars::PLUGIN_PATH`].
    ///
    /// An unset or empty variable yields the unconfined default.
    pub fn from_env() -> Self {
        let search_paths = std::env::var_os(env_vars::PLUGIN_PATH)
            .map(|raw| std::env::split_paths(&raw).collect())
            .unwrap_or_default();
        Self { search_paths }
    }

    /// Add a search path.
    pub fn with_search_path(mut self, path: impl AsRef<Path>) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }
}
