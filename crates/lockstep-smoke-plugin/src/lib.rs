//! In-tree tally plugin for exercising the gate end to end.
//!
//! Built as a cdylib, this is the binary the ignored end-to-end tests load
//! through the real dynamic linker. Built as an rlib, it lends those tests
//! the interface and contract pins, so host and plugin are compiled against
//! the same definitions in one place.

use std::sync::atomic::{AtomicU64, Ordering};

use lockstep_abi::{contract_id, declare_plugin, ContractId, InterfaceContract};

/// A monotonically growing tally.
pub trait Tally: Send + Sync {
    /// Add `amount` and return the new total.
    fn record(&self, amount: u64) -> u64;

    /// The running total.
    fn total(&self) -> u64;
}

/// Pin for the current tally interface revision. This is the identifier
/// the plugin binary reports.
pub struct TallyContract;

impl InterfaceContract for TallyContract {
    const CONTRACT_ID: ContractId = contract_id!("de81f48e-7701-45f2-a91b-1914f88dfd11");
    type Interface = dyn Tally;
}

/// Pin for the superseded revision of the same interface. Kept so tests can
/// drive the rejection path against the real binary: a host built against
/// this pin must never activate the plugin.
pub struct StaleTallyContract;

impl InterfaceContract for StaleTallyContract {
    const CONTRACT_ID: ContractId = contract_id!("a7bb194e-4e7c-4850-af12-ea9f30ea5a13");
    type Interface = dyn Tally;
}

#[derive(Default)]
struct CounterTally {
    total: AtomicU64,
}

impl Tally for CounterTally {
    fn record(&self, amount: u64) -> u64 {
        self.total.fetch_add(amount, Ordering::SeqCst) + amount
    }

    fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }
}

declare_plugin! {
    contract: TallyContract,
    name: "smoke-tally",
    version: "0.1.0",
    create: || Box::new(CounterTally::default()),
}
