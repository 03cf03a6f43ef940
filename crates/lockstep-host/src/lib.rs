//! Host-side plugin loading behind the version gate.
//!
//! This crate owns the load sequence: map a binary, ask it for its contract
//! identifier through the frozen query entry point, compare against the
//! host's pinned identifier, and only then touch the rest of the plugin's
//! surface. A plugin that fails the comparison is unmapped without any
//! further calls into it.
//!
//! # Quick start
//!
//! ```no_run
//! use lockstep_abi::{contract_id, ContractId, InterfaceContract};
//! use lockstep_host::PluginLoader;
//!
//! pub trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! pub struct GreeterContract;
//!
//! impl InterfaceContract for GreeterContract {
//!     const CONTRACT_ID: ContractId = contract_id!("5c2f0761-9f3a-4d6e-8c3b-2a8d6c1e4f90");
//!     type Interface = dyn Greeter;
//! }
//!
//! # fn main() -> lockstep_host::Result<()> {
//! let loader = PluginLoader::<GreeterContract>::new();
//! let plugin = loader.load("plugins/libgreeter.so")?;
//! println!("{}", plugin.interface().greet());
//! # Ok(())
//! # }
//! ```

pub mod binary;
pub mod config;
pub mod error;
pub mod loader;
pub mod registry;

pub use binary::{
    discover_in_dir, is_native_library, BinaryLoader, DynamicLibraryLoader, PluginBinary,
    ValidatedDescriptor,
};
pub use config::{env_vars, LoaderConfig};
pub use error::{GateError, Result};
pub use loader::{ContractProbe, LoadState, PluginLoader, VerifiedPlugin};
pub use registry::{GateRegistry, LoadRecord};
