//! Server targets and local/remote execution classification.
//!
//! A [`ServerTarget`] describes one server from the inventory: where it
//! lives, how to open a shell on it, and which container runtime endpoint and
//! PostgreSQL role to use once there. Every discovery or dump operation runs
//! against exactly one target.

use std::fmt;
use std::net::IpAddr;

use serde::Deserialize;

/// Role used when a target does not configure `postgres_user`.
pub const DEFAULT_POSTGRES_ROLE: &str = "postgres";

/// SSH port used when a target omits `port`.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Where commands for a target are executed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutionMode {
    /// Commands run as local processes without any shell.
    Local,
    /// Commands run through a remote shell session.
    Remote,
}

/// Credential used to open the remote shell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShellCredential<'a> {
    /// Path to a private key file. Takes precedence over a password.
    PrivateKey(&'a str),
    /// Password supplied non-interactively to the shell client.
    Password(&'a str),
    /// Neither configured; the shell client's default identity applies.
    Default,
}

/// One server from the inventory.
#[derive(Clone, Deserialize, Eq, PartialEq)]
pub struct ServerTarget {
    /// Stable identifier used to select the server.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Network address. Empty, `localhost` and loopback literals mean local.
    #[serde(default)]
    pub host: String,
    /// SSH port for remote targets.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Remote login user.
    #[serde(default)]
    pub username: Option<String>,
    /// Remote login password.
    #[serde(default)]
    pub password: Option<String>,
    /// Path to the private key used for remote login.
    #[serde(default)]
    pub private_key: Option<String>,
    /// Container runtime endpoint passed to `docker -H`.
    #[serde(default)]
    pub docker_host: Option<String>,
    /// PostgreSQL role tried first during discovery and used for dumps.
    #[serde(default)]
    pub postgres_user: Option<String>,
    /// Free-form description shown in listings.
    #[serde(default)]
    pub description: Option<String>,
}

const fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|text| text.trim()).filter(|text| !text.is_empty())
}

impl ServerTarget {
    /// Creates a target that executes on the local machine.
    #[must_use]
    pub fn local(id: impl Into<String>) -> Self {
        Self::remote(id, "")
    }

    /// Creates a target reached at `host` with no credential configured.
    #[must_use]
    pub fn remote(id: impl Into<String>, host: impl Into<String>) -> Self {
        let identifier = id.into();
        Self {
            name: identifier.clone(),
            id: identifier,
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: None,
            password: None,
            private_key: None,
            docker_host: None,
            postgres_user: None,
            description: None,
        }
    }

    /// Classifies the target as local or remote from its address alone.
    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        classify_host(&self.host)
    }

    /// Returns the credential to use for the remote shell.
    #[must_use]
    pub fn credential(&self) -> ShellCredential<'_> {
        if let Some(key) = non_blank(self.private_key.as_ref()) {
            return ShellCredential::PrivateKey(key);
        }
        non_blank(self.password.as_ref()).map_or(ShellCredential::Default, ShellCredential::Password)
    }

    /// Returns `user@host`, or the bare host when no user is configured.
    #[must_use]
    pub fn ssh_destination(&self) -> String {
        let host = self.host.trim();
        non_blank(self.username.as_ref())
            .map_or_else(|| host.to_owned(), |user| format!("{user}@{host}"))
    }

    /// Returns the container runtime endpoint override, if any.
    #[must_use]
    pub fn docker_host(&self) -> Option<&str> {
        non_blank(self.docker_host.as_ref())
    }

    /// Returns the configured PostgreSQL role or [`DEFAULT_POSTGRES_ROLE`].
    #[must_use]
    pub fn postgres_role(&self) -> &str {
        non_blank(self.postgres_user.as_ref()).unwrap_or(DEFAULT_POSTGRES_ROLE)
    }

    /// Returns the display name, falling back to the identifier.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTarget")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key)
            .field("docker_host", &self.docker_host)
            .field("postgres_user", &self.postgres_user)
            .field("description", &self.description)
            .finish()
    }
}

/// Classifies an address as local or remote.
///
/// Empty addresses, `localhost` and loopback IP literals (optionally in
/// brackets) are local; everything else is remote.
///
/// # Examples
///
/// ```
/// use pgscout::target::{ExecutionMode, classify_host};
///
/// assert_eq!(classify_host(""), ExecutionMode::Local);
/// assert_eq!(classify_host("127.0.0.1"), ExecutionMode::Local);
/// assert_eq!(classify_host("db-1.internal"), ExecutionMode::Remote);
/// ```
#[must_use]
pub fn classify_host(host: &str) -> ExecutionMode {
    let trimmed = host.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("localhost") {
        return ExecutionMode::Local;
    }

    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    match unbracketed.parse::<IpAddr>() {
        Ok(address) if address.is_loopback() => ExecutionMode::Local,
        _ => ExecutionMode::Remote,
    }
}
