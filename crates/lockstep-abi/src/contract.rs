//! Interface contract identifiers.
//!
//! A [`ContractId`] names one exact revision of the interface shared between
//! a host and its plugins. It is pinned at build time, regenerated whenever
//! the interface changes shape, and compared bit for bit during the load
//! handshake. The identifier is semantically opaque: equality is the only
//! meaningful operation on it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 128-bit identifier for a cross-binary interface revision.
///
/// Host and plugin each compile in the identifier of the interface revision
/// they were built against. The version gate admits a plugin only when both
/// sides carry the exact same value; see [`crate::gate::check`].
///
/// The canonical text form is the lowercase hyphenated 8-4-4-4-12 rendering,
/// so identifiers can be read out of source files by tooling that never runs
/// a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(Uuid);

impl ContractId {
    /// Wrap an already-parsed UUID.
    ///
    /// Prefer the [`contract_id!`](crate::contract_id) macro for pinning
    /// identifiers in source.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Build an identifier from its raw 128-bit value.
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// The identifier as a raw 128-bit value.
    pub const fn as_u128(self) -> u128 {
        self.0.as_u128()
    }

    /// Build an identifier from the four-field wire layout.
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self::from_raw(RawContractId {
            data1,
            data2,
            data3,
            data4,
        })
    }

    /// Generate a fresh random identifier.
    ///
    /// This is what `lockstep id new` calls. Identifiers are drawn from a
    /// 2^122 space, so independently generated values never collide in
    /// practice and no central registry is involved.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from its text form.
    pub fn parse(text: &str) -> Result<Self, ParseContractIdError> {
        Ok(Self(Uuid::try_parse(text)?))
    }

    /// Convert to the `#[repr(C)]` layout that crosses the FFI boundary.
    pub const fn to_raw(self) -> RawContractId {
        let b = self.0.into_bytes();
        RawContractId {
            data1: u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            data2: u16::from_be_bytes([b[4], b[5]]),
            data3: u16::from_be_bytes([b[6], b[7]]),
            data4: [b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]],
        }
    }

    /// Convert back from the `#[repr(C)]` wire layout.
    pub const fn from_raw(raw: RawContractId) -> Self {
        let d1 = raw.data1.to_be_bytes();
        let d2 = raw.data2.to_be_bytes();
        let d3 = raw.data3.to_be_bytes();
        let d4 = raw.data4;
        Self(Uuid::from_bytes([
            d1[0], d1[1], d1[2], d1[3], d2[0], d2[1], d3[0], d3[1], d4[0], d4[1], d4[2], d4[3],
            d4[4], d4[5], d4[6], d4[7],
        ]))
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Uuid renders the canonical lowercase hyphenated form.
        self.0.fmt(f)
    }
}

impl FromStr for ContractId {
    type Err = ParseContractIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error returned when parsing a contract identifier from text.
#[derive(Debug, thiserror::Error)]
#[error("Invalid contract identifier: {0}")]
pub struct ParseContractIdError(#[from] uuid::Error);

/// The identifier in its C-compatible four-field layout.
///
/// This is what the frozen `lockstep_contract_id` export returns. The field
/// split matches the classic GUID struct, so a host written against a
/// different toolchain (or language) sees the same bytes in the same order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawContractId {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Binds a pinned identifier to the Rust interface it describes.
///
/// Implement this on a marker type, once per plugin interface. The host
/// loads plugins through the marker, and the compiler guarantees that a
/// verified handle for contract `C` only ever exposes `C::Interface`.
/// Changing the interface means pinning a fresh `CONTRACT_ID`, which is what
/// keeps stale binaries out.
///
/// # Example
///
/// ```
/// use lockstep_abi::{contract_id, ContractId, InterfaceContract};
///
/// pub trait Codec: Send + Sync {
///     fn encode(&self, input: &str) -> String;
/// }
///
/// pub struct CodecContract;
///
/// impl InterfaceContract for CodecContract {
///     const CONTRACT_ID: ContractId =
///         contract_id!("5d2f4e6a-0c1b-4b6e-9f3a-7c8d9e0a1b2c");
///     type Interface = dyn Codec;
/// }
/// ```
pub trait InterfaceContract {
    /// Identifier of the interface revision this contract describes.
    const CONTRACT_ID: ContractId;

    /// The interface type plugins implement, typically `dyn SomeTrait`.
    type Interface: ?Sized + Send + Sync + 'static;
}

/// Pin a contract identifier in source, parsed at compile time.
///
/// The literal stays verbatim in the file, so `lockstep id show` (and any
/// other tooling that scans source text) can read it without a build.
///
/// Regeneration policy: pin a **fresh** identifier (`lockstep id new --pin`)
/// for every change to the interface, however small. If two branches pinned
/// different identifiers and the lines conflict in a merge, generate a new
/// one; never resolve the conflict by picking either side, because the
/// merged interface matches neither.
///
/// # Example
///
/// ```
/// use lockstep_abi::{contract_id, ContractId};
///
/// const TALLY_CONTRACT_ID: ContractId =
///     contract_id!("de81f48e-7701-45f2-a91b-1914f88dfd11");
/// ```
#[macro_export]
macro_rules! contract_id {
    ($text:literal) => {
        $crate::ContractId::from_uuid($crate::__uuid::uuid!($text))
    };
}
