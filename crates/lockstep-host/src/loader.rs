//! The load-time handshake.
//!
//! One load attempt walks a fixed sequence: map the binary, ask it which
//! contract revision it was built against (the single frozen symbol),
//! compare identifiers, and only on a compatible verdict read the descriptor
//! and construct the interface. A [`VerifiedPlugin`] can only come out of
//! that sequence, so holding one is proof the gate passed.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::path::Path;

use serde::{Deserialize, Serialize};

use lockstep_abi::descriptor::DestroyInstanceFn;
use lockstep_abi::gate::{check, Verdict};
use lockstep_abi::{ContractId, InterfaceContract, PluginInfo};

use crate::binary::{BinaryLoader, DynamicLibraryLoader, PluginBinary};
use crate::config::LoaderConfig;
use crate::error::{GateError, Result};

/// Where one plugin binary stands in its load lifecycle.
///
/// `Active` and `Rejected` are terminal for a single attempt; a later
/// attempt on the same path starts over from `Unloaded` and re-runs the
/// whole handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// Not mapped into the process.
    #[default]
    Unloaded,
    /// Mapped, identifier not yet verified.
    LoadedUnverified,
    /// Verified compatible; interface methods are callable.
    Active,
    /// Verified incompatible (or unusable); unloaded and left inert.
    Rejected,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::LoadedUnverified => write!(f, "loaded_unverified"),
            Self::Active => write!(f, "active"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Drives the handshake for one contract type.
///
/// The loader itself is stateless; every call to [`PluginLoader::load`] is
/// an independent attempt with its own verdict.
pub struct PluginLoader<C: InterfaceContract> {
    facility: Box<dyn BinaryLoader>,
    _contract: PhantomData<fn() -> C>,
}

impl<C: InterfaceContract> PluginLoader<C> {
    /// Loader over an unconfined [`DynamicLibraryLoader`].
    pub fn new() -> Self {
        Self::with_facility(Box::new(DynamicLibraryLoader::new()))
    }

    /// Loader over a [`DynamicLibraryLoader`] confined by `config`.
    pub fn with_config(config: &LoaderConfig) -> Self {
        Self::with_facility(Box::new(DynamicLibraryLoader::with_config(config)))
    }

    /// Loader over a custom binary-loading facility.
    pub fn with_facility(facility: Box<dyn BinaryLoader>) -> Self {
        Self {
            facility,
            _contract: PhantomData,
        }
    }

    /// The identifier this host was built against.
    pub fn expected_contract_id(&self) -> ContractId {
        C::CONTRACT_ID
    }

    /// Run one full load attempt against the binary at `path`.
    ///
    /// The identifier is queried exactly once, strictly before any other
    /// symbol is touched. On a mismatch the binary is dropped (unloaded)
    /// and [`GateError::ContractMismatch`] carries both identifiers.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<VerifiedPlugin<C>> {
        let path = path.as_ref();
        tracing::debug!("Loading plugin binary {:?}", path);

        let binary = self.facility.load(path)?;

        let expected = C::CONTRACT_ID;
        let reported = binary.reported_contract_id()?;

        match check(expected, reported) {
            Verdict::Compatible => {}
            Verdict::Incompatible => {
                tracing::warn!(
                    "Rejected plugin {:?}: expected contract {}, reported {}",
                    path,
                    expected,
                    reported
                );
                drop(binary);
                return Err(GateError::ContractMismatch { expected, reported });
            }
        }

        let descriptor = binary.descriptor()?;
        // SAFETY: the verdict was compatible, so both binaries agree on what
        // this entry point constructs.
        let instance = unsafe { (descriptor.create)() };
        if instance.is_null() {
            return Err(GateError::InstantiateFailed(format!(
                "plugin '{}' create entry point returned null",
                descriptor.info.name
            )));
        }

        tracing::info!(
            "Verified plugin {} v{} from {:?}",
            descriptor.info.name,
            descriptor.info.version,
            path
        );

        Ok(VerifiedPlugin {
            instance,
            destroy: descriptor.destroy,
            info: descriptor.info,
            binary,
            _contract: PhantomData,
        })
    }
}

impl<C: InterfaceContract> Default for PluginLoader<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A plugin that passed the gate, with its interface live.
///
/// There is no other way to obtain one: construction is private to
/// [`PluginLoader::load`], which only gets here after a compatible verdict.
/// The instance is destroyed through the plugin's own destroy entry point
/// before the binary handle drops, so the code behind the vtable stays
/// mapped for the drop glue.
pub struct VerifiedPlugin<C: InterfaceContract> {
    instance: *mut c_void,
    destroy: DestroyInstanceFn,
    info: PluginInfo,
    // Declared after `instance` on purpose: field drop order keeps the
    // library mapped while the instance is torn down.
    binary: Box<dyn PluginBinary>,
    _contract: PhantomData<fn() -> C>,
}

// SAFETY: `instance` owns a Box<C::Interface> produced inside the plugin,
// and C::Interface is Send + Sync by the contract trait's bounds. `destroy`
// is a plain function pointer and the binary box is Send + Sync by trait
// bound.
unsafe impl<C: InterfaceContract> Send for VerifiedPlugin<C> {}
// SAFETY: see above; shared references only expose &C::Interface.
unsafe impl<C: InterfaceContract> Sync for VerifiedPlugin<C> {}

impl<C: InterfaceContract> VerifiedPlugin<C> {
    /// The verified interface.
    pub fn interface(&self) -> &C::Interface {
        // SAFETY: `instance` was produced by the plugin's create entry point
        // for this contract and stays alive until drop.
        unsafe { lockstep_abi::descriptor::instance_ref::<C>(self.instance) }
    }

    /// Name and build version the plugin declared.
    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    /// Path the plugin was loaded from.
    pub fn path(&self) -> &Path {
        self.binary.path()
    }

    /// The contract identifier both sides agreed on.
    pub fn contract_id(&self) -> ContractId {
        C::CONTRACT_ID
    }
}

impl<C: InterfaceContract> Drop for VerifiedPlugin<C> {
    fn drop(&mut self) {
        // SAFETY: `instance` came from the plugin's create entry point and
        // is released exactly once; the library is still mapped because the
        // binary field drops after this body.
        unsafe { (self.destroy)(self.instance) };
    }
}

impl<C: InterfaceContract> std::fmt::Debug for VerifiedPlugin<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedPlugin")
            .field("name", &self.info.name)
            .field("version", &self.info.version)
            .field("contract_id", &C::CONTRACT_ID)
            .finish()
    }
}

/// Untyped identifier query for tooling.
///
/// Maps a binary, reads the frozen entry point and unloads again, without
/// naming any contract. This is what `lockstep plugin inspect` runs.
pub struct ContractProbe {
    facility: Box<dyn BinaryLoader>,
}

impl ContractProbe {
    /// Probe over an unconfined [`DynamicLibraryLoader`].
    pub fn new() -> Self {
        Self::with_facility(Box::new(DynamicLibraryLoader::new()))
    }

    /// Probe over a [`DynamicLibraryLoader`] confined by `config`.
    pub fn with_config(config: &LoaderConfig) -> Self {
        Self::with_facility(Box::new(DynamicLibraryLoader::with_config(config)))
    }

    /// Probe over a custom binary-loading facility.
    pub fn with_facility(facility: Box<dyn BinaryLoader>) -> Self {
        Self { facility }
    }

    /// Report which contract revision the binary at `path` was built
    /// against. The binary is unloaded before this returns.
    pub fn probe(&self, path: impl AsRef<Path>) -> Result<ContractId> {
        let path = path.as_ref();
        tracing::debug!("Probing plugin binary {:?}", path);
        let binary = self.facility.load(path)?;
        binary.reported_contract_id()
    }
}

impl Default for ContractProbe {
    fn default() -> Self {
        Self::new()
    }
}
