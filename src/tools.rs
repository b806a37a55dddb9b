//! Builders for the external tool command lines.
//!
//! Every builder returns a [`RemoteCommand`] argument vector; nothing here
//! concatenates strings for a shell. Values that originate from callers must
//! be validated before they reach these builders.

use std::fmt;

use crate::exec::RemoteCommand;
use crate::parse::{NameRejection, validate_container_ref};
use crate::target::ServerTarget;

/// `docker ps` template producing one tab-separated line per container.
pub const CONTAINER_FORMAT: &str =
    "{{.ID}}\t{{.Names}}\t{{.Image}}\t{{.Status}}\t{{.Ports}}\t{{.Labels}}\t{{.CreatedAt}}";

/// `docker inspect` template printing one environment declaration per line.
pub const CONTAINER_ENV_FORMAT: &str = "{{range .Config.Env}}{{println .}}{{end}}";

/// Query listing non-template databases as `name|owner|encoding|size`.
pub const DATABASE_LIST_QUERY: &str = "SELECT datname, \
    pg_catalog.pg_get_userbyid(datdba), \
    pg_encoding_to_char(encoding), \
    pg_size_pretty(pg_database_size(datname)) \
    FROM pg_database WHERE datistemplate = false ORDER BY datname;";

/// Maintenance database used for listing and readiness checks.
pub const MAINTENANCE_DATABASE: &str = "postgres";

/// Where PostgreSQL runs on a target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DiscoveryScope {
    /// Inside the named container.
    Container(String),
    /// Installed natively on the host.
    Host,
}

impl DiscoveryScope {
    /// Validates a container reference before it is used in a command.
    ///
    /// # Errors
    ///
    /// Returns the [`NameRejection`] describing why the reference is unsafe.
    pub fn validate(&self) -> Result<(), NameRejection> {
        match self {
            Self::Container(id) => validate_container_ref(id),
            Self::Host => Ok(()),
        }
    }

    /// Short label used in file names: the first eight characters of the
    /// container id, or `host`.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Container(id) => id.chars().take(8).collect(),
            Self::Host => String::from("host"),
        }
    }
}

impl fmt::Display for DiscoveryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container(id) => write!(f, "container {id}"),
            Self::Host => f.write_str("host"),
        }
    }
}

/// Executable names or paths for the external tools.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolPaths {
    /// Container runtime client.
    pub docker: String,
    /// PostgreSQL interactive terminal.
    pub psql: String,
    /// PostgreSQL dump tool.
    pub pg_dump: String,
    /// PostgreSQL readiness probe.
    pub pg_isready: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            docker: String::from("docker"),
            psql: String::from("psql"),
            pg_dump: String::from("pg_dump"),
            pg_isready: String::from("pg_isready"),
        }
    }
}

impl ToolPaths {
    /// `docker`, with `-H <endpoint>` when the target overrides it.
    #[must_use]
    pub fn docker(&self, target: &ServerTarget) -> RemoteCommand {
        let command = RemoteCommand::new(&self.docker);
        match target.docker_host() {
            Some(endpoint) => command.args(["-H", endpoint]),
            None => command,
        }
    }

    /// `docker ps` listing running containers in [`CONTAINER_FORMAT`].
    #[must_use]
    pub fn container_listing(&self, target: &ServerTarget) -> RemoteCommand {
        self.docker(target)
            .args(["ps", "--format", CONTAINER_FORMAT])
    }

    /// `docker inspect` printing a container's environment declarations.
    #[must_use]
    pub fn container_environment(&self, target: &ServerTarget, container: &str) -> RemoteCommand {
        self.docker(target)
            .args(["inspect", "--format", CONTAINER_ENV_FORMAT, container])
    }

    /// Runs `inner` in `scope`: directly on the host or via `docker exec`.
    #[must_use]
    pub fn scoped(
        &self,
        target: &ServerTarget,
        scope: &DiscoveryScope,
        inner: RemoteCommand,
    ) -> RemoteCommand {
        match scope {
            DiscoveryScope::Host => inner,
            DiscoveryScope::Container(id) => self
                .docker(target)
                .args(["exec", id.as_str()])
                .then_run(inner),
        }
    }

    /// `psql` running [`DATABASE_LIST_QUERY`] in unaligned tuples-only mode.
    #[must_use]
    pub fn database_listing(&self, role: Option<&str>) -> RemoteCommand {
        with_role(RemoteCommand::new(&self.psql), role)
            .args(["-X", "-A", "-t", "-F", "|", "-d", MAINTENANCE_DATABASE])
            .args(["-c", DATABASE_LIST_QUERY])
    }

    /// `pg_isready` against the maintenance database.
    #[must_use]
    pub fn readiness(&self, role: Option<&str>) -> RemoteCommand {
        with_role(RemoteCommand::new(&self.pg_isready), role).args(["-d", MAINTENANCE_DATABASE])
    }
}

fn with_role(command: RemoteCommand, role: Option<&str>) -> RemoteCommand {
    match role {
        Some(name) => command.args(["-U", name]),
        None => command,
    }
}
