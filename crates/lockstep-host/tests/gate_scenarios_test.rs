//! Handshake scenarios driven through an in-process binary facility.
//!
//! A fake [`BinaryLoader`] stands in for the dynamic linker so these tests
//! can observe exactly which entry points the loader touches, in which
//! order, without building a cdylib first.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use lockstep_abi::descriptor::{
    instance_drop_raw, instance_into_raw, CreateInstanceFn, DestroyInstanceFn,
};
use lockstep_abi::{contract_id, ContractId, InterfaceContract, PluginInfo};
use lockstep_host::{
    BinaryLoader, ContractProbe, GateError, GateRegistry, LoadState, PluginBinary, PluginLoader,
    Result, ValidatedDescriptor,
};

/// The interface revision this host is built against.
pub trait Tally: Send + Sync {
    fn record(&self, amount: u64) -> u64;
    fn total(&self) -> u64;
}

pub struct TallyContract;

impl InterfaceContract for TallyContract {
    const CONTRACT_ID: ContractId = contract_id!("de81f48e-7701-45f2-a91b-1914f88dfd11");
    type Interface = dyn Tally;
}

/// Identifier of a superseded revision of the same interface.
const STALE_ID: ContractId = contract_id!("a7bb194e-4e7c-4850-af12-ea9f30ea5a13");

#[derive(Default)]
struct CountingTally {
    total: AtomicU64,
}

impl Tally for CountingTally {
    fn record(&self, amount: u64) -> u64 {
        self.total.fetch_add(amount, Ordering::SeqCst) + amount
    }

    fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }
}

extern "C" fn create_tally() -> *mut c_void {
    instance_into_raw::<TallyContract>(Box::new(CountingTally::default()))
}

extern "C" fn destroy_tally(instance: *mut c_void) {
    unsafe { instance_drop_raw::<TallyContract>(instance) };
}

/// Counters for everything the facility and its binaries were asked to do.
#[derive(Debug, Default)]
struct Observations {
    loads: AtomicUsize,
    id_queries: AtomicUsize,
    descriptor_reads: AtomicUsize,
    unloads: AtomicUsize,
}

impl Observations {
    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn id_queries(&self) -> usize {
        self.id_queries.load(Ordering::SeqCst)
    }

    fn descriptor_reads(&self) -> usize {
        self.descriptor_reads.load(Ordering::SeqCst)
    }

    fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct FakeBinary {
    path: PathBuf,
    reported: ContractId,
    create: CreateInstanceFn,
    destroy: DestroyInstanceFn,
    obs: Arc<Observations>,
}

impl PluginBinary for FakeBinary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn reported_contract_id(&self) -> Result<ContractId> {
        self.obs.id_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.reported)
    }

    fn descriptor(&self) -> Result<ValidatedDescriptor> {
        self.obs.descriptor_reads.fetch_add(1, Ordering::SeqCst);
        Ok(ValidatedDescriptor {
            info: PluginInfo::new("fake-tally", lockstep_abi::semver::Version::new(0, 1, 0)),
            create: self.create,
            destroy: self.destroy,
        })
    }
}

impl Drop for FakeBinary {
    fn drop(&mut self) {
        self.obs.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-process facility whose binaries report a fixed identifier.
struct FakeFacility {
    reported: ContractId,
    create: CreateInstanceFn,
    destroy: DestroyInstanceFn,
    fail_reason: Option<String>,
    obs: Arc<Observations>,
}

impl FakeFacility {
    fn reporting(reported: ContractId) -> (Self, Arc<Observations>) {
        Self::with_entry_points(reported, create_tally, destroy_tally)
    }

    fn with_entry_points(
        reported: ContractId,
        create: CreateInstanceFn,
        destroy: DestroyInstanceFn,
    ) -> (Self, Arc<Observations>) {
        let obs = Arc::new(Observations::default());
        let facility = Self {
            reported,
            create,
            destroy,
            fail_reason: None,
            obs: obs.clone(),
        };
        (facility, obs)
    }

    fn failing(reason: &str) -> (Self, Arc<Observations>) {
        let (mut facility, obs) = Self::reporting(TallyContract::CONTRACT_ID);
        facility.fail_reason = Some(reason.to_string());
        (facility, obs)
    }
}

impl BinaryLoader for FakeFacility {
    fn load(&self, path: &Path) -> Result<Box<dyn PluginBinary>> {
        self.obs.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.fail_reason {
            return Err(GateError::binary_load(path, reason.clone()));
        }
        Ok(Box::new(FakeBinary {
            path: path.to_path_buf(),
            reported: self.reported,
            create: self.create,
            destroy: self.destroy,
            obs: self.obs.clone(),
        }))
    }
}

#[test]
fn test_matching_identifier_activates_plugin() {
    let (facility, obs) = FakeFacility::reporting(TallyContract::CONTRACT_ID);
    let loader = PluginLoader::<TallyContract>::with_facility(Box::new(facility));

    let plugin = loader.load("plugins/libtally.so").unwrap();
    assert_eq!(plugin.info().name, "fake-tally");
    assert_eq!(plugin.contract_id(), TallyContract::CONTRACT_ID);

    let tally = plugin.interface();
    assert_eq!(tally.record(5), 5);
    assert_eq!(tally.record(2), 7);
    assert_eq!(tally.total(), 7);

    assert_eq!(obs.loads(), 1);
    assert_eq!(obs.id_queries(), 1);
    assert_eq!(obs.descriptor_reads(), 1);
    assert_eq!(obs.unloads(), 0);

    drop(plugin);
    assert_eq!(obs.unloads(), 1);
}

#[test]
fn test_mismatched_identifier_is_rejected_before_descriptor_read() {
    let (facility, obs) = FakeFacility::reporting(STALE_ID);
    let loader = PluginLoader::<TallyContract>::with_facility(Box::new(facility));

    let err = loader.load("plugins/libstale.so").unwrap_err();
    match err {
        GateError::ContractMismatch { expected, reported } => {
            assert_eq!(expected, TallyContract::CONTRACT_ID);
            assert_eq!(reported, STALE_ID);
        }
        other => panic!("expected ContractMismatch, got {other:?}"),
    }

    // The identifier was read once and nothing else was touched before the
    // binary went away.
    assert_eq!(obs.id_queries(), 1);
    assert_eq!(obs.descriptor_reads(), 0);
    assert_eq!(obs.unloads(), 1);
}

#[test]
fn test_facility_failure_precedes_any_identifier_query() {
    let (facility, obs) = FakeFacility::failing("no such file");
    let loader = PluginLoader::<TallyContract>::with_facility(Box::new(facility));

    let err = loader.load("plugins/missing.so").unwrap_err();
    assert!(matches!(err, GateError::BinaryLoad { .. }));

    assert_eq!(obs.loads(), 1);
    assert_eq!(obs.id_queries(), 0);
    assert_eq!(obs.descriptor_reads(), 0);
}

#[test]
fn test_missing_file_is_a_binary_load_failure() {
    let loader = PluginLoader::<TallyContract>::new();
    let err = loader.load("/nonexistent/plugins/libtally.so").unwrap_err();

    match err {
        GateError::BinaryLoad { path, .. } => {
            assert_eq!(path, PathBuf::from("/nonexistent/plugins/libtally.so"));
        }
        other => panic!("expected BinaryLoad, got {other:?}"),
    }
}

#[test]
fn test_instance_destroyed_exactly_once() {
    static CREATED: AtomicUsize = AtomicUsize::new(0);
    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    struct OneShotTally;

    impl Tally for OneShotTally {
        fn record(&self, amount: u64) -> u64 {
            amount
        }

        fn total(&self) -> u64 {
            0
        }
    }

    extern "C" fn create_one_shot() -> *mut c_void {
        CREATED.fetch_add(1, Ordering::SeqCst);
        instance_into_raw::<TallyContract>(Box::new(OneShotTally))
    }

    extern "C" fn destroy_one_shot(instance: *mut c_void) {
        DESTROYED.fetch_add(1, Ordering::SeqCst);
        unsafe { instance_drop_raw::<TallyContract>(instance) };
    }

    let (facility, obs) = FakeFacility::with_entry_points(
        TallyContract::CONTRACT_ID,
        create_one_shot,
        destroy_one_shot,
    );
    let loader = PluginLoader::<TallyContract>::with_facility(Box::new(facility));

    let plugin = loader.load("plugins/liboneshot.so").unwrap();
    assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    assert_eq!(DESTROYED.load(Ordering::SeqCst), 0);

    drop(plugin);
    assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
    assert_eq!(obs.unloads(), 1);
}

#[test]
fn test_probe_reads_identifier_without_activating() {
    let (facility, obs) = FakeFacility::reporting(STALE_ID);
    let probe = ContractProbe::with_facility(Box::new(facility));

    let reported = probe.probe("plugins/libstale.so").unwrap();
    assert_eq!(reported, STALE_ID);

    assert_eq!(obs.descriptor_reads(), 0);
    assert_eq!(obs.unloads(), 1);
}

#[tokio::test]
async fn test_registry_publishes_verified_plugin() {
    let (facility, _obs) = FakeFacility::reporting(TallyContract::CONTRACT_ID);
    let loader = PluginLoader::<TallyContract>::with_facility(Box::new(facility));
    let registry = GateRegistry::with_loader(loader);

    let path = Path::new("plugins/libtally.so");
    let handle = registry.load(path).await.unwrap();
    assert_eq!(handle.info().name, "fake-tally");
    assert_eq!(handle.interface().record(4), 4);

    assert!(registry.contains("fake-tally").await);
    assert_eq!(registry.count().await, 1);

    let record = registry.record(path).await.unwrap();
    assert_eq!(record.state, LoadState::Active);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.reported, Some(TallyContract::CONTRACT_ID));
    assert!(record.loaded_at.is_some());
    assert!(record.last_error.is_none());
}

#[tokio::test]
async fn test_registry_repeated_mismatch_leaves_rejected_record() {
    let (facility, obs) = FakeFacility::reporting(STALE_ID);
    let loader = PluginLoader::<TallyContract>::with_facility(Box::new(facility));
    let registry = GateRegistry::with_loader(loader);

    let path = Path::new("plugins/libstale.so");
    for _ in 0..2 {
        let err = registry.load(path).await.unwrap_err();
        assert!(matches!(err, GateError::ContractMismatch { .. }));
    }

    let record = registry.record(path).await.unwrap();
    assert_eq!(record.state, LoadState::Rejected);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.expected, TallyContract::CONTRACT_ID);
    assert_eq!(record.reported, Some(STALE_ID));
    assert!(record.last_error.as_deref().unwrap().contains("Incompatible"));
    assert!(record.loaded_at.is_none());

    // Each attempt ran its own handshake against a fresh mapping.
    assert_eq!(obs.id_queries(), 2);
    assert_eq!(obs.unloads(), 2);
    assert_eq!(registry.count().await, 0);
}

#[tokio::test]
async fn test_registry_does_not_reload_active_path() {
    let (facility, obs) = FakeFacility::reporting(TallyContract::CONTRACT_ID);
    let loader = PluginLoader::<TallyContract>::with_facility(Box::new(facility));
    let registry = GateRegistry::with_loader(loader);

    let path = Path::new("plugins/libtally.so");
    registry.load(path).await.unwrap();

    let err = registry.load(path).await.unwrap_err();
    assert!(matches!(err, GateError::AlreadyLoaded(_)));

    // The second call never reached the facility.
    assert_eq!(obs.loads(), 1);
    let record = registry.record(path).await.unwrap();
    assert_eq!(record.attempts, 1);
    assert_eq!(record.state, LoadState::Active);
}

#[tokio::test]
async fn test_registry_unload_then_reload_runs_fresh_handshake() {
    let (facility, obs) = FakeFacility::reporting(TallyContract::CONTRACT_ID);
    let loader = PluginLoader::<TallyContract>::with_facility(Box::new(facility));
    let registry = GateRegistry::with_loader(loader);

    let path = Path::new("plugins/libtally.so");
    registry.load(path).await.unwrap();
    registry.unload("fake-tally").await.unwrap();

    let record = registry.record(path).await.unwrap();
    assert_eq!(record.state, LoadState::Unloaded);
    assert!(record.loaded_at.is_none());
    assert!(!registry.contains("fake-tally").await);

    registry.load(path).await.unwrap();
    let record = registry.record(path).await.unwrap();
    assert_eq!(record.state, LoadState::Active);
    assert_eq!(record.attempts, 2);
    assert_eq!(obs.id_queries(), 2);
}

#[tokio::test]
async fn test_registry_handle_crosses_threads() {
    let (facility, _obs) = FakeFacility::reporting(TallyContract::CONTRACT_ID);
    let loader = PluginLoader::<TallyContract>::with_facility(Box::new(facility));
    let registry = GateRegistry::with_loader(loader);

    registry.load("plugins/libtally.so").await.unwrap();
    let handle = registry.get("fake-tally").await.unwrap();

    let worker = tokio::spawn(async move { handle.interface().record(5) });
    assert_eq!(worker.await.unwrap(), 5);

    // The publication point is the registry map; the spawned thread saw a
    // fully verified instance.
    let again = registry.get("fake-tally").await.unwrap();
    assert_eq!(again.interface().total(), 5);
}

#[tokio::test]
async fn test_discover_and_load_records_every_visited_path() {
    let dir = tempfile::tempdir().unwrap();
    let ext = std::env::consts::DLL_EXTENSION;
    let garbage = dir.path().join(format!("libgarbage.{ext}"));
    std::fs::write(&garbage, b"not object code").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let registry = GateRegistry::<TallyContract>::new();
    let visited = registry.discover_and_load(dir.path()).await;

    assert_eq!(visited.len(), 1);
    assert_eq!(visited[0].path, garbage);
    assert_eq!(visited[0].state, LoadState::Unloaded);
    assert_eq!(visited[0].attempts, 1);
    assert!(visited[0].last_error.is_some());
    assert_eq!(registry.count().await, 0);
}
