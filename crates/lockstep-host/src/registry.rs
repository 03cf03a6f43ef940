//! Registry of verified plugins and their load records.
//!
//! The registry is the publication point: a handle is inserted (and handed
//! out) only after the whole handshake has completed, so any thread that can
//! see the `Arc` also sees a fully verified plugin. Rejected and failed
//! attempts leave a record behind for operators to inspect.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use lockstep_abi::{ContractId, InterfaceContract};

use crate::binary::discover_in_dir;
use crate::error::{GateError, Result};
use crate::loader::{LoadState, PluginLoader, VerifiedPlugin};

/// Outcome bookkeeping for one plugin path.
///
/// A record accumulates across attempts: `attempts` counts every handshake
/// run against the path, while `state`, `reported` and `last_error` reflect
/// the latest one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRecord {
    /// Path the attempts were made against.
    pub path: PathBuf,
    /// State after the latest attempt.
    pub state: LoadState,
    /// Identifier the host expects.
    pub expected: ContractId,
    /// Identifier the binary reported, when the query got that far.
    pub reported: Option<ContractId>,
    /// Number of load attempts against this path.
    pub attempts: u32,
    /// Error from the latest attempt, if it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the plugin became active, if it did.
    pub loaded_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl LoadRecord {
    fn new(path: &Path, expected: ContractId) -> Self {
        Self {
            path: path.to_path_buf(),
            state: LoadState::default(),
            expected,
            reported: None,
            attempts: 0,
            last_error: None,
            loaded_at: None,
        }
    }
}

/// Async registry of verified plugins for one contract type.
///
/// Verified handles are keyed by plugin name; records are keyed by path,
/// because a rejected binary never gets far enough to reveal a name.
pub struct GateRegistry<C: InterfaceContract> {
    loader: PluginLoader<C>,
    plugins: RwLock<HashMap<String, Arc<VerifiedPlugin<C>>>>,
    records: RwLock<HashMap<PathBuf, LoadRecord>>,
}

impl<C: InterfaceContract> GateRegistry<C> {
    /// Registry over [`PluginLoader::new`].
    pub fn new() -> Self {
        Self::with_loader(PluginLoader::new())
    }

    /// Registry over a custom loader.
    pub fn with_loader(loader: PluginLoader<C>) -> Self {
        Self {
            loader,
            plugins: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Run a load attempt and publish the handle on success.
    ///
    /// Every attempt is recorded. A path whose latest attempt is still
    /// active is not reloaded; unload it first.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Arc<VerifiedPlugin<C>>> {
        let path = path.as_ref();

        {
            let records = self.records.read().await;
            if let Some(record) = records.get(path) {
                if record.state == LoadState::Active {
                    return Err(GateError::AlreadyLoaded(path.display().to_string()));
                }
            }
        }

        let outcome = self.loader.load(path);

        match outcome {
            Ok(plugin) => {
                let name = plugin.info().name.clone();
                let handle = Arc::new(plugin);

                let inserted = {
                    let mut plugins = self.plugins.write().await;
                    if plugins.contains_key(&name) {
                        false
                    } else {
                        plugins.insert(name.clone(), handle.clone());
                        true
                    }
                };

                let mut records = self.records.write().await;
                let record = records
                    .entry(path.to_path_buf())
                    .or_insert_with(|| LoadRecord::new(path, C::CONTRACT_ID));
                record.attempts += 1;

                if inserted {
                    record.state = LoadState::Active;
                    record.reported = Some(C::CONTRACT_ID);
                    record.last_error = None;
                    record.loaded_at = Some(chrono::Utc::now());
                    Ok(handle)
                } else {
                    // The duplicate instance is dropped here, through its
                    // own destroy entry point.
                    record.state = LoadState::Unloaded;
                    record.last_error =
                        Some(format!("a plugin named '{name}' is already registered"));
                    record.loaded_at = None;
                    Err(GateError::AlreadyLoaded(name))
                }
            }
            Err(err) => {
                let mut records = self.records.write().await;
                let record = records
                    .entry(path.to_path_buf())
                    .or_insert_with(|| LoadRecord::new(path, C::CONTRACT_ID));
                record.attempts += 1;
                record.state = match &err {
                    // Never mapped: the attempt died before the handshake.
                    GateError::BinaryLoad { .. } => LoadState::Unloaded,
                    // Mapped but unusable: mismatched, mute or broken.
                    _ => LoadState::Rejected,
                };
                if let GateError::ContractMismatch { reported, .. } = &err {
                    record.reported = Some(*reported);
                }
                record.last_error = Some(err.to_string());
                record.loaded_at = None;
                Err(err)
            }
        }
    }

    /// Get a verified plugin by name.
    pub async fn get(&self, name: &str) -> Option<Arc<VerifiedPlugin<C>>> {
        self.plugins.read().await.get(name).cloned()
    }

    /// The load record for `path`, if any attempt was made.
    pub async fn record(&self, path: &Path) -> Option<LoadRecord> {
        self.records.read().await.get(path).cloned()
    }

    /// All load records, sorted by path.
    pub async fn list(&self) -> Vec<LoadRecord> {
        let mut records: Vec<LoadRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    /// Drop the registry's handle for a plugin.
    ///
    /// Clones already handed out stay valid until their holders release
    /// them; the instance and its library go away with the last one.
    pub async fn unload(&self, name: &str) -> Result<()> {
        let handle = self
            .plugins
            .write()
            .await
            .remove(name)
            .ok_or_else(|| GateError::NotFound(name.to_string()))?;

        let path = handle.path().to_path_buf();
        {
            let mut records = self.records.write().await;
            if let Some(record) = records.get_mut(&path) {
                record.state = LoadState::Unloaded;
                record.loaded_at = None;
            }
        }

        tracing::info!("Unloaded plugin {}", name);
        Ok(())
    }

    /// Attempt to load every native library directly inside `dir`.
    ///
    /// Each binary is an independent attempt; one bad file never aborts the
    /// sweep. Returns the records for the paths visited.
    pub async fn discover_and_load(&self, dir: &Path) -> Vec<LoadRecord> {
        let mut visited = Vec::new();

        for path in discover_in_dir(dir) {
            match self.load(&path).await {
                Ok(plugin) => {
                    tracing::info!("Loaded plugin {} from {:?}", plugin.info().name, path);
                }
                Err(e) => {
                    tracing::warn!("Failed to load plugin {:?}: {}", path, e);
                }
            }
            if let Some(record) = self.record(&path).await {
                visited.push(record);
            }
        }

        visited
    }

    /// Number of active plugins.
    pub async fn count(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// Whether a plugin with this name is active.
    pub async fn contains(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }
}

impl<C: InterfaceContract> Default for GateRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
