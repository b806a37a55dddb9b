//! Container and database discovery.
//!
//! Discovery code builds tool commands, runs them through an
//! [`Executor`](crate::exec::Executor) and decodes the output with
//! [`crate::parse`]. It never looks at whether a target is local or remote.

use thiserror::Error;

use crate::exec::ExecError;
use crate::parse::NameRejection;

mod containers;
mod databases;
mod types;

pub use containers::ContainerDiscovery;
pub use databases::{CredentialAttempt, CredentialPlan, DatabaseDiscovery, DatabaseListing};
pub use types::{ContainerRecord, DatabaseRecord, LEGACY_ENCODING, LEGACY_OWNER, UNKNOWN_SIZE};

pub(crate) const DISCOVERY_TARGET: &str = "pgscout::discovery";

/// Errors surfaced by container and database discovery.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DiscoveryError {
    /// Every credential attempt failed, or the output was diagnostic text.
    #[error("discovery failed: {diagnostic}")]
    DiscoveryFailed {
        /// Most recent diagnostic text.
        diagnostic: String,
    },
    /// A caller-supplied name was unsafe to place in a command.
    #[error("invalid {kind} {value:?}: {reason}")]
    InvalidName {
        /// What the name identifies, for example `container` or `role`.
        kind: String,
        /// Rejected value.
        value: String,
        /// Why it was rejected.
        #[source]
        reason: NameRejection,
    },
    /// Command execution failed before any output could be judged.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl DiscoveryError {
    /// Returns `true` when the next credential attempt may still succeed.
    ///
    /// Transport, spawn and cancellation failures are never retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryFailed { .. } | Self::Exec(ExecError::ExecutionFailed { .. })
        )
    }

    /// Diagnostic text carried by the error.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::DiscoveryFailed { diagnostic }
            | Self::Exec(ExecError::ExecutionFailed { diagnostic, .. }) => diagnostic.clone(),
            other => other.to_string(),
        }
    }
}

pub(crate) fn require_valid(
    kind: &str,
    value: &str,
    check: impl FnOnce(&str) -> Result<(), NameRejection>,
) -> Result<(), DiscoveryError> {
    check(value).map_err(|reason| DiscoveryError::InvalidName {
        kind: kind.to_owned(),
        value: value.to_owned(),
        reason,
    })
}
