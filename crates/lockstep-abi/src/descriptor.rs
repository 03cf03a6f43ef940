//! Plugin descriptor and FFI export surface.
//!
//! Plugins expose exactly two symbols. The identifier query is frozen: its
//! name and signature never change, whatever happens to the interface, so a
//! host of any vintage can always ask "which revision were you built
//! against" before touching anything else. The descriptor entry point is
//! only dereferenced after a compatible verdict and may evolve together
//! with the interface.

use std::ffi::{c_char, c_void, CStr};

use serde::{Deserialize, Serialize};

use crate::contract::{InterfaceContract, RawContractId};

/// Names of the symbols a plugin binary exports.
pub mod symbols {
    /// The frozen identifier query: no arguments in, 128 bits out.
    ///
    /// This is the only symbol a host may call before the version gate has
    /// returned a compatible verdict.
    pub const CONTRACT_ID: &str = "lockstep_contract_id";

    /// The descriptor entry point. Post-verdict only.
    pub const PLUGIN_DESCRIPTOR: &str = "lockstep_plugin_descriptor";
}

/// Signature of the [`symbols::CONTRACT_ID`] export.
pub type ContractIdFn = unsafe extern "C" fn() -> RawContractId;

/// Signature of the [`symbols::PLUGIN_DESCRIPTOR`] export.
pub type PluginDescriptorFn = unsafe extern "C" fn() -> *const PluginDescriptor;

/// Function pointer type for creating the plugin instance.
///
/// # Safety
///
/// The returned pointer must come from [`instance_into_raw`] for the
/// contract both sides agreed on, or be null on failure.
pub type CreateInstanceFn = unsafe extern "C" fn() -> *mut c_void;

/// Function pointer type for destroying a plugin instance.
///
/// # Safety
///
/// The pointer must have been produced by the matching [`CreateInstanceFn`]
/// and must not be used afterwards.
pub type DestroyInstanceFn = unsafe extern "C" fn(*mut c_void);

/// Descriptor returned by the [`symbols::PLUGIN_DESCRIPTOR`] export.
///
/// `#[repr(C)]` so the layout is identical on both sides of the boundary.
/// The gate has already passed by the time a host reads this, so both
/// binaries agree on what `create` produces.
#[repr(C)]
pub struct PluginDescriptor {
    /// Null-terminated plugin name.
    pub name: *const c_char,
    /// Null-terminated plugin build version (semver text, metadata only).
    pub version: *const c_char,
    /// Constructs the plugin instance.
    pub create: CreateInstanceFn,
    /// Releases an instance produced by `create`.
    pub destroy: DestroyInstanceFn,
}

// SAFETY: PluginDescriptor contains only raw pointers to static data and
// function pointers, which are inherently Send + Sync.
unsafe impl Send for PluginDescriptor {}
unsafe impl Sync for PluginDescriptor {}

impl PluginDescriptor {
    /// Check the descriptor for null string pointers.
    ///
    /// # Safety
    ///
    /// The descriptor must have been returned by a plugin's descriptor
    /// entry point and still be backed by its (mapped) binary.
    pub unsafe fn validate(&self) -> Result<(), &'static str> {
        if self.name.is_null() {
            return Err("plugin name is null");
        }
        if self.version.is_null() {
            return Err("plugin version is null");
        }
        Ok(())
    }
}

/// Safe, owned mirror of a validated [`PluginDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name.
    pub name: String,
    /// Plugin build version. Never consulted by the gate.
    pub version: semver::Version,
}

impl PluginInfo {
    /// Build an info record directly, mostly useful for test facilities.
    pub fn new(name: impl Into<String>, version: semver::Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Copy the descriptor's strings into owned, checked form.
    ///
    /// # Safety
    ///
    /// The descriptor must pass [`PluginDescriptor::validate`] and its
    /// string pointers must refer to nul-terminated data that outlives the
    /// call.
    pub unsafe fn from_descriptor(descriptor: &PluginDescriptor) -> Result<Self, String> {
        // SAFETY: caller guarantees both pointers are valid and
        // nul-terminated.
        let name = unsafe { CStr::from_ptr(descriptor.name) }
            .to_str()
            .map_err(|_| "plugin name is not valid UTF-8".to_string())?
            .to_string();
        let version_text = unsafe { CStr::from_ptr(descriptor.version) }
            .to_str()
            .map_err(|_| "plugin version is not valid UTF-8".to_string())?;
        let version = version_text
            .parse()
            .map_err(|e| format!("plugin version is not valid semver: {e}"))?;
        Ok(Self { name, version })
    }
}

/// Move a boxed interface across the FFI boundary.
///
/// The trait object is boxed a second time so a thin pointer crosses the
/// boundary; the fat pointer (data + vtable) stays intact inside the outer
/// box. Generated `create` exports call this.
pub fn instance_into_raw<C: InterfaceContract>(instance: Box<C::Interface>) -> *mut c_void {
    let boxed: Box<Box<C::Interface>> = Box::new(instance);
    Box::into_raw(boxed) as *mut c_void
}

/// Borrow the interface behind a pointer from [`instance_into_raw`].
///
/// # Safety
///
/// `ptr` must have been produced by `instance_into_raw::<C>` and must stay
/// alive (not destroyed) for the whole of `'a`.
pub unsafe fn instance_ref<'a, C: InterfaceContract>(ptr: *mut c_void) -> &'a C::Interface {
    // SAFETY: caller guarantees ptr points at a live Box<C::Interface>.
    unsafe { &**(ptr as *const Box<C::Interface>) }
}

/// Release a pointer produced by [`instance_into_raw`].
///
/// Generated `destroy` exports call this, so allocation and deallocation
/// both happen inside the plugin binary.
///
/// # Safety
///
/// `ptr` must have been produced by `instance_into_raw::<C>` and must not
/// be used again afterwards.
pub unsafe fn instance_drop_raw<C: InterfaceContract>(ptr: *mut c_void) {
    // SAFETY: caller guarantees ptr came from instance_into_raw::<C>.
    drop(unsafe { Box::from_raw(ptr as *mut Box<C::Interface>) });
}
