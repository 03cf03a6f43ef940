//! Lockstep plugin ABI.
//!
//! The surface shared between a host and its dynamically loaded plugins:
//! the interface contract identifier, the version gate that compares them,
//! and the two symbols every plugin binary exports. Host and plugin build
//! and ship independently; this crate is the one thing both link so that a
//! stale pairing is caught at load time instead of corrupting memory later.
//!
//! # Quick Start
//!
//! Define the contract once, shared by host and plugin:
//!
//! ```rust
//! use lockstep_abi::prelude::*;
//! use lockstep_abi::contract_id;
//!
//! pub trait Tally: Send + Sync {
//!     fn record(&self, amount: u64) -> u64;
//!     fn total(&self) -> u64;
//! }
//!
//! pub struct TallyContract;
//!
//! impl InterfaceContract for TallyContract {
//!     const CONTRACT_ID: ContractId =
//!         contract_id!("de81f48e-7701-45f2-a91b-1914f88dfd11");
//!     type Interface = dyn Tally;
//! }
//! ```
//!
//! The plugin crate implements `Tally` and invokes
//! [`declare_plugin!`](crate::declare_plugin); the host loads it through
//! `lockstep-host`, which refuses any binary whose reported identifier is
//! not bit-for-bit equal to `TallyContract::CONTRACT_ID`.

pub mod contract;
pub mod descriptor;
pub mod gate;
#[macro_use]
pub mod macros;

pub use contract::{ContractId, InterfaceContract, ParseContractIdError, RawContractId};
pub use descriptor::{
    symbols, ContractIdFn, CreateInstanceFn, DestroyInstanceFn, PluginDescriptor,
    PluginDescriptorFn, PluginInfo,
};
pub use gate::{check, Verdict};

// Plugin build versions are semver; re-exported so plugin crates need no
// direct dependency for PluginInfo values.
pub use semver;

#[doc(hidden)]
pub use uuid as __uuid;

/// Prelude module with common imports.
pub mod prelude {
    pub use crate::contract::{ContractId, InterfaceContract, RawContractId};
    pub use crate::descriptor::{PluginDescriptor, PluginInfo};
    pub use crate::gate::{check, Verdict};
    pub use crate::{contract_id, declare_plugin};
}
