//! Core library for discovering PostgreSQL across a fleet of servers.
//!
//! A [`target::ServerTarget`] names one server. [`exec::Executor`] runs
//! commands on it, locally or over ssh, either capturing their output or
//! streaming it through an [`exec::DumpHandle`]. [`discovery`] lists
//! PostgreSQL containers and databases, resolving an unknown role through
//! an ordered credential fallback, and [`dump`] streams `pg_dump` output to
//! a writer while surfacing the producer's exit status.

pub mod config;
pub mod discovery;
pub mod dump;
pub mod exec;
pub mod inventory;
pub mod parse;
pub mod target;
pub mod telemetry;
#[cfg(test)]
mod test_support;
pub mod tools;

pub use config::{ConfigError, ScoutConfig};
pub use discovery::{
    ContainerDiscovery, ContainerRecord, CredentialAttempt, CredentialPlan, DatabaseDiscovery,
    DatabaseListing, DatabaseRecord, DiscoveryError,
};
pub use dump::{DumpError, DumpOptions, DumpStreamer};
pub use exec::{
    CommandOutput, DumpHandle, ExecError, ExecSettings, Executor, ProcessRunner, RemoteCommand,
    TokioProcessRunner,
};
pub use inventory::{Inventory, InventoryError};
pub use target::{ExecutionMode, ServerTarget};
pub use tools::{DiscoveryScope, ToolPaths};
