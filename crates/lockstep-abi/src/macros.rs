//! Export macro for plugin crates.

/// Declare a plugin's exports for one contract.
///
/// Emits the frozen `lockstep_contract_id` query, the descriptor entry
/// point, and the create/destroy glue that moves the boxed interface across
/// the FFI boundary. Exactly one invocation is allowed per plugin binary.
///
/// # Example
///
/// ```ignore
/// use lockstep_abi::{contract_id, declare_plugin, ContractId, InterfaceContract};
///
/// pub trait Tally: Send + Sync {
///     fn record(&self, amount: u64) -> u64;
/// }
///
/// pub struct TallyContract;
///
/// impl InterfaceContract for TallyContract {
///     const CONTRACT_ID: ContractId =
///         contract_id!("de81f48e-7701-45f2-a91b-1914f88dfd11");
///     type Interface = dyn Tally;
/// }
///
/// #[derive(Default)]
/// struct CounterTally;
///
/// impl Tally for CounterTally {
///     fn record(&self, amount: u64) -> u64 {
///         amount
///     }
/// }
///
/// declare_plugin! {
///     contract: TallyContract,
///     name: "smoke-tally",
///     version: "0.1.0",
///     create: || Box::new(CounterTally::default()),
/// }
/// ```
#[macro_export]
macro_rules! declare_plugin {
    (
        contract: $contract:ty,
        name: $name:literal,
        version: $version:literal,
        create: $create:expr $(,)?
    ) => {
        static __LOCKSTEP_PLUGIN_NAME: &[u8] = concat!($name, "\0").as_bytes();
        static __LOCKSTEP_PLUGIN_VERSION: &[u8] = concat!($version, "\0").as_bytes();

        extern "C" fn __lockstep_plugin_create() -> *mut ::std::ffi::c_void {
            let constructor: fn() -> ::std::boxed::Box<
                <$contract as $crate::InterfaceContract>::Interface,
            > = $create;
            $crate::descriptor::instance_into_raw::<$contract>(constructor())
        }

        extern "C" fn __lockstep_plugin_destroy(instance: *mut ::std::ffi::c_void) {
            // SAFETY: the host only hands back pointers produced by
            // __lockstep_plugin_create.
            unsafe { $crate::descriptor::instance_drop_raw::<$contract>(instance) }
        }

        static __LOCKSTEP_PLUGIN_DESCRIPTOR: $crate::PluginDescriptor =
            $crate::PluginDescriptor {
                name: __LOCKSTEP_PLUGIN_NAME.as_ptr() as *const ::std::ffi::c_char,
                version: __LOCKSTEP_PLUGIN_VERSION.as_ptr() as *const ::std::ffi::c_char,
                create: __lockstep_plugin_create,
                destroy: __lockstep_plugin_destroy,
            };

        /// Frozen identifier query. Name and signature are stable across
        /// every interface revision.
        #[no_mangle]
        pub extern "C" fn lockstep_contract_id() -> $crate::RawContractId {
            <$contract as $crate::InterfaceContract>::CONTRACT_ID.to_raw()
        }

        /// Descriptor entry point, read by the host only after a compatible
        /// verdict.
        #[no_mangle]
        pub extern "C" fn lockstep_plugin_descriptor() -> *const $crate::PluginDescriptor {
            &__LOCKSTEP_PLUGIN_DESCRIPTOR
        }
    };
}
