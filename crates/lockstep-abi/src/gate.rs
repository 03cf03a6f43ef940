//! The version gate.
//!
//! A single pure comparison decides whether a plugin built against some
//! interface revision may talk to this host. There are no version ranges,
//! no "compatible enough" heuristics and no negotiation: either both sides
//! pinned the same identifier or the plugin is rejected before any other
//! symbol of it is touched.

use serde::{Deserialize, Serialize};

use crate::contract::ContractId;

/// Outcome of one compatibility check.
///
/// A verdict is derived per load attempt and never persisted; retrying a
/// load re-runs the gate from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Both sides pinned the same interface revision.
    Compatible,
    /// The identifiers differ; no further cross-binary call is permitted.
    Incompatible,
}

impl Verdict {
    /// True for [`Verdict::Compatible`].
    pub const fn is_compatible(self) -> bool {
        matches!(self, Verdict::Compatible)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compatible => write!(f, "compatible"),
            Self::Incompatible => write!(f, "incompatible"),
        }
    }
}

/// Compare the host's expected identifier against the one a plugin reports.
///
/// Returns [`Verdict::Compatible`] iff the two values are bit-for-bit equal.
/// The check is pure, constant time and symmetric in its arguments; the only
/// asymmetry in the system is who acts on the verdict.
pub const fn check(host: ContractId, plugin: ContractId) -> Verdict {
    if host.as_u128() == plugin.as_u128() {
        Verdict::Compatible
    } else {
        Verdict::Incompatible
    }
}
