//! YAML server inventory.
//!
//! The inventory lists every server the CLI can target:
//!
//! ```yaml
//! servers:
//!   - id: prod
//!     name: Production
//!     host: db.example.com
//!     username: deploy
//!     private_key: ~/.ssh/id_ed25519
//!     postgres_user: app
//! ```

use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::target::ServerTarget;

/// Errors raised while loading or querying the inventory.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InventoryError {
    /// The inventory file could not be read.
    #[error("failed to read inventory {path}: {message}")]
    Read {
        /// Inventory path.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// The inventory file is not valid YAML of the expected shape.
    #[error("failed to parse inventory {path}: {message}")]
    Parse {
        /// Inventory path.
        path: Utf8PathBuf,
        /// Parser error string.
        message: String,
    },
    /// A server entry has an empty `id`.
    #[error("server entry {index} in the inventory has an empty id")]
    MissingId {
        /// Zero-based position in `servers`.
        index: usize,
    },
    /// Two server entries share an `id`.
    #[error("server id {id:?} appears more than once in the inventory")]
    DuplicateId {
        /// Repeated identifier.
        id: String,
    },
    /// No server with the requested `id` exists.
    #[error("server with id {id:?} not found")]
    UnknownServer {
        /// Requested identifier.
        id: String,
    },
}

/// Servers loaded from the inventory file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Inventory {
    #[serde(default)]
    servers: Vec<ServerTarget>,
}

impl Inventory {
    /// Reads and validates the inventory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Read`] when the file cannot be read and the
    /// errors of [`Inventory::parse`] otherwise.
    pub fn load(path: &Utf8Path) -> Result<Self, InventoryError> {
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let read_error = |message: String| InventoryError::Read {
            path: path.to_path_buf(),
            message,
        };
        let file_name = path
            .file_name()
            .ok_or_else(|| read_error(String::from("inventory path is missing a filename")))?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| read_error(err.to_string()))?;
        let contents = dir
            .read_to_string(file_name)
            .map_err(|err| read_error(err.to_string()))?;

        let inventory = Self::parse(&contents).map_err(|err| match err {
            InventoryError::Parse { message, .. } => InventoryError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        debug!(path = %path, servers = inventory.servers.len(), "loaded inventory");
        Ok(inventory)
    }

    /// Parses inventory YAML. An empty document yields an empty inventory.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Parse`] for malformed YAML,
    /// [`InventoryError::MissingId`] for a blank id and
    /// [`InventoryError::DuplicateId`] for a repeated id.
    pub fn parse(contents: &str) -> Result<Self, InventoryError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let inventory: Self =
            serde_yaml::from_str(contents).map_err(|err| InventoryError::Parse {
                path: Utf8PathBuf::new(),
                message: err.to_string(),
            })?;

        let mut seen = HashSet::new();
        for (index, server) in inventory.servers.iter().enumerate() {
            if server.id.trim().is_empty() {
                return Err(InventoryError::MissingId { index });
            }
            if !seen.insert(server.id.as_str()) {
                return Err(InventoryError::DuplicateId {
                    id: server.id.clone(),
                });
            }
        }
        Ok(inventory)
    }

    /// Servers in file order.
    #[must_use]
    pub fn servers(&self) -> &[ServerTarget] {
        &self.servers
    }

    /// Looks up a server by id.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::UnknownServer`] when no server matches.
    pub fn server(&self, id: &str) -> Result<&ServerTarget, InventoryError> {
        self.servers
            .iter()
            .find(|server| server.id == id)
            .ok_or_else(|| InventoryError::UnknownServer { id: id.to_owned() })
    }
}

#[cfg(test)]
mod tests;
