//! Records produced by discovery.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Size reported when the listing does not include one.
pub const UNKNOWN_SIZE: &str = "unknown";

/// Owner assumed for rows in the legacy single-column shape.
pub const LEGACY_OWNER: &str = "postgres";

/// Encoding assumed for rows in the legacy single-column shape.
pub const LEGACY_ENCODING: &str = "UTF8";

/// A running container that hosts PostgreSQL.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ContainerRecord {
    /// Container identifier as printed by the runtime.
    pub id: String,
    /// Container name without a leading slash.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Lifecycle status text, for example `Up 2 hours`.
    pub status: String,
    /// Published port mappings.
    pub ports: Vec<String>,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
    /// Creation time, when the runtime reported a parseable one.
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: Option<OffsetDateTime>,
}

/// One non-template database.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DatabaseRecord {
    /// Database name; unique within one container or host.
    pub name: String,
    /// Owning role.
    pub owner: String,
    /// Character encoding.
    pub encoding: String,
    /// Human readable size, or [`UNKNOWN_SIZE`].
    pub size: String,
}

impl DatabaseRecord {
    /// Builds a record from the four listing columns.
    #[must_use]
    pub fn new(name: &str, owner: &str, encoding: &str, size: &str) -> Self {
        Self {
            name: name.to_owned(),
            owner: owner.to_owned(),
            encoding: encoding.to_owned(),
            size: if size.is_empty() {
                String::from(UNKNOWN_SIZE)
            } else {
                size.to_owned()
            },
        }
    }

    /// Builds a record from the legacy name-only shape.
    #[must_use]
    pub fn legacy(name: &str) -> Self {
        Self::new(name, LEGACY_OWNER, LEGACY_ENCODING, UNKNOWN_SIZE)
    }
}

#[expect(
    clippy::ref_option,
    reason = "serde's serialize_with hands the field over by reference"
)]
fn serialize_timestamp<S: Serializer>(
    value: &Option<OffsetDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(timestamp) => {
            let text = timestamp
                .format(&Rfc3339)
                .map_err(serde::ser::Error::custom)?;
            serializer.serialize_some(&text)
        }
        None => serializer.serialize_none(),
    }
}
