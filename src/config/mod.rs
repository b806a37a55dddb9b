//! Layered settings loaded via `ortho-config`.
//!
//! Values merge defaults, `pgscout.toml` discovered on the usual search
//! path, and `PGSCOUT_*` environment variables, in that order of precedence.

use std::ffi::OsString;
use std::str::FromStr;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::exec::ExecSettings;
use crate::telemetry::LogFormat;
use crate::tools::ToolPaths;

/// Inventory file used when none is configured.
pub const DEFAULT_INVENTORY_PATH: &str = "servers.yaml";

/// Execution, tool and logging settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "PGSCOUT",
    discovery(
        app_name = "pgscout",
        env_var = "PGSCOUT_CONFIG_PATH",
        config_file_name = "pgscout.toml",
        dotfile_name = ".pgscout.toml",
        project_file_name = "pgscout.toml"
    )
)]
pub struct ScoutConfig {
    /// Path to the YAML server inventory.
    #[ortho_config(default = DEFAULT_INVENTORY_PATH.to_owned())]
    pub inventory_path: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `sshpass` executable used for password logins.
    #[ortho_config(default = "sshpass".to_owned())]
    pub sshpass_bin: String,
    /// Whether to force batch mode for key-based SSH logins.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking. Off by default, which leaves
    /// connections open to impersonation of the remote host.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// SSH `ConnectTimeout` in seconds; `0` keeps the client default.
    #[ortho_config(default = 10)]
    pub ssh_connect_timeout_secs: u64,
    /// Deadline for discovery commands in seconds; `0` disables it.
    #[ortho_config(default = 30)]
    pub discovery_timeout_secs: u64,
    /// Path to the `docker` client.
    #[ortho_config(default = "docker".to_owned())]
    pub docker_bin: String,
    /// Path to `psql`.
    #[ortho_config(default = "psql".to_owned())]
    pub psql_bin: String,
    /// Path to `pg_dump`.
    #[ortho_config(default = "pg_dump".to_owned())]
    pub pg_dump_bin: String,
    /// Path to `pg_isready`.
    #[ortho_config(default = "pg_isready".to_owned())]
    pub pg_isready_bin: String,
    /// `tracing` filter directives.
    #[ortho_config(default = "info".to_owned())]
    pub log_filter: String,
    /// Log output format, `compact` or `json`.
    #[ortho_config(default = "compact".to_owned())]
    pub log_format: String,
}

/// Errors raised while loading or validating [`ScoutConfig`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// A required value is empty.
    #[error("missing {field}: set PGSCOUT_{env_suffix} or add {field} to pgscout.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// A value is present but not one of the accepted forms.
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidValue {
        /// Configuration field that failed validation.
        field: String,
        /// Rejected value.
        value: String,
        /// Accepted forms.
        reason: String,
    },
    /// Parsing or merging configuration layers failed.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl ScoutConfig {
    /// Loads configuration from defaults, files and environment variables
    /// without reading the process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("pgscout")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures every required value is present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] for an empty value and
    /// [`ConfigError::InvalidValue`] for an unknown log format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, field) in [
            (&self.inventory_path, "inventory_path"),
            (&self.ssh_bin, "ssh_bin"),
            (&self.sshpass_bin, "sshpass_bin"),
            (&self.ssh_known_hosts_file, "ssh_known_hosts_file"),
            (&self.docker_bin, "docker_bin"),
            (&self.psql_bin, "psql_bin"),
            (&self.pg_dump_bin, "pg_dump_bin"),
            (&self.pg_isready_bin, "pg_isready_bin"),
            (&self.log_filter, "log_filter"),
        ] {
            Self::require_value(value, field)?;
        }
        self.log_format().map(|_| ())
    }

    /// Parsed log format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the format is unknown.
    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        LogFormat::from_str(self.log_format.trim()).map_err(|_| ConfigError::InvalidValue {
            field: String::from("log_format"),
            value: self.log_format.clone(),
            reason: String::from("expected `compact` or `json`"),
        })
    }

    /// Inventory location as a UTF-8 path.
    #[must_use]
    pub fn inventory_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.inventory_path.trim())
    }

    /// Execution settings for [`Executor`](crate::exec::Executor).
    #[must_use]
    pub fn exec_settings(&self) -> ExecSettings {
        ExecSettings {
            ssh_bin: self.ssh_bin.clone(),
            sshpass_bin: self.sshpass_bin.clone(),
            batch_mode: self.ssh_batch_mode,
            strict_host_key_checking: self.ssh_strict_host_key_checking,
            known_hosts_file: self.ssh_known_hosts_file.clone(),
            connect_timeout_secs: Some(self.ssh_connect_timeout_secs).filter(|secs| *secs > 0),
            capture_deadline: Some(self.discovery_timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    /// Tool executables used to build commands.
    #[must_use]
    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths {
            docker: self.docker_bin.clone(),
            psql: self.psql_bin.clone(),
            pg_dump: self.pg_dump_bin.clone(),
            pg_isready: self.pg_isready_bin.clone(),
        }
    }

    fn require_value(value: &str, field: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidConfig {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
