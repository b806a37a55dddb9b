//! Command-line interface definitions for the `pgscout` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `pgscout` binary.
#[derive(Debug, Parser)]
#[command(
    name = "pgscout",
    version,
    about = "Discover PostgreSQL containers and databases across servers and stream dumps",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Server inventory file. Overrides `inventory_path` from configuration.
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) inventory: Option<String>,
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub(crate) json: bool,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `pgscout`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// List servers from the inventory.
    #[command(name = "servers")]
    Servers,
    /// Check that a server accepts commands.
    ///
    /// With `--container`, check that PostgreSQL in that container accepts
    /// connections instead.
    #[command(name = "status")]
    Status(ScopeArgs),
    /// List PostgreSQL containers running on a server.
    #[command(name = "containers")]
    Containers(ServerArgs),
    /// List databases in a container or on the host installation.
    #[command(name = "databases")]
    Databases(ScopeArgs),
    /// Stream a database dump to a file or standard output.
    #[command(name = "dump")]
    Dump(DumpCommand),
}

/// Selects one server.
#[derive(Debug, Args)]
pub(crate) struct ServerArgs {
    /// Server id from the inventory.
    #[arg(value_name = "SERVER")]
    pub(crate) server: String,
}

/// Selects a server and, optionally, a container on it.
#[derive(Debug, Args)]
pub(crate) struct ScopeArgs {
    /// Server id from the inventory.
    #[arg(value_name = "SERVER")]
    pub(crate) server: String,
    /// Container id or name; the host installation is used when omitted.
    #[arg(long, value_name = "ID")]
    pub(crate) container: Option<String>,
}

/// Arguments for `pgscout dump`.
#[derive(Debug, Args)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "flag-style CLI options are naturally booleans"
)]
pub(crate) struct DumpCommand {
    /// Server and optional container.
    #[command(flatten)]
    pub(crate) scope: ScopeArgs,
    /// Database to dump.
    #[arg(value_name = "DATABASE")]
    pub(crate) database: String,
    /// Dump only the data.
    #[arg(long)]
    pub(crate) data_only: bool,
    /// Dump only the schema.
    #[arg(long)]
    pub(crate) schema_only: bool,
    /// Restrict the dump to a table; repeat for several.
    #[arg(long = "table", value_name = "TABLE")]
    pub(crate) tables: Vec<String>,
    /// Role overriding the server's configured `postgres_user`.
    #[arg(long, value_name = "ROLE")]
    pub(crate) role: Option<String>,
    /// Write the dump here instead of standard output.
    #[arg(long, short = 'o', value_name = "PATH", conflicts_with = "suggested_name")]
    pub(crate) output: Option<String>,
    /// Write the dump to `<server>_<container|host>_<database>.sql` in the
    /// current directory.
    #[arg(long)]
    pub(crate) suggested_name: bool,
    /// Abort the dump after this many seconds. No limit when omitted.
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,
    /// Replace an existing output file.
    #[arg(long)]
    pub(crate) force: bool,
}
