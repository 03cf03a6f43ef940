//! End-to-end handshake against the real smoke plugin cdylib.
//!
//! These tests go through the actual dynamic linker, so they need the
//! plugin built first:
//!
//! ```text
//! cargo build -p lockstep-smoke-plugin
//! cargo test -p lockstep-host --test smoke_plugin_test -- --ignored
//! ```

use std::path::PathBuf;

use lockstep_abi::InterfaceContract;
use lockstep_host::{ContractProbe, GateError, PluginLoader};
use lockstep_smoke_plugin::{StaleTallyContract, Tally, TallyContract};

/// Path to the built smoke plugin cdylib, trying debug then release.
fn smoke_plugin_artifact() -> PathBuf {
    #[cfg(target_os = "macos")]
    let file = "liblockstep_smoke_plugin.dylib";
    #[cfg(target_os = "windows")]
    let file = "lockstep_smoke_plugin.dll";
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let file = "liblockstep_smoke_plugin.so";

    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("..");
    path.push("..");
    path.push("target");
    path.push("debug");
    path.push(file);

    if !path.exists() {
        path.pop();
        path.pop();
        path.push("release");
        path.push(file);
    }

    path
}

#[test]
#[ignore = "requires the smoke plugin cdylib to be built"]
fn test_full_handshake_activates_smoke_plugin() {
    let path = smoke_plugin_artifact();
    if !path.exists() {
        println!("Skipping test: smoke plugin not found at {:?}", path);
        return;
    }

    let loader = PluginLoader::<TallyContract>::new();
    let plugin = loader.load(&path).unwrap();

    assert_eq!(plugin.info().name, "smoke-tally");
    assert_eq!(plugin.contract_id(), TallyContract::CONTRACT_ID);

    let tally = plugin.interface();
    assert_eq!(tally.record(5), 5);
    assert_eq!(tally.record(2), 7);
    assert_eq!(tally.total(), 7);
}

#[test]
#[ignore = "requires the smoke plugin cdylib to be built"]
fn test_probe_reports_the_pinned_identifier() {
    let path = smoke_plugin_artifact();
    if !path.exists() {
        println!("Skipping test: smoke plugin not found at {:?}", path);
        return;
    }

    let probe = ContractProbe::new();
    let reported = probe.probe(&path).unwrap();
    assert_eq!(reported, TallyContract::CONTRACT_ID);
}

#[test]
#[ignore = "requires the smoke plugin cdylib to be built"]
fn test_stale_host_rejects_the_built_plugin() {
    let path = smoke_plugin_artifact();
    if !path.exists() {
        println!("Skipping test: smoke plugin not found at {:?}", path);
        return;
    }

    let loader = PluginLoader::<StaleTallyContract>::new();
    let err = loader.load(&path).unwrap_err();

    match err {
        GateError::ContractMismatch { expected, reported } => {
            assert_eq!(expected, StaleTallyContract::CONTRACT_ID);
            assert_eq!(reported, TallyContract::CONTRACT_ID);
        }
        other => panic!("expected ContractMismatch, got {other:?}"),
    }
}
