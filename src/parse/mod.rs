//! Decoders for tool output and validators for interpolated names.
//!
//! Discovery treats command-line tool output as a small protocol:
//!
//! - database listings are `|`-separated rows of `name|owner|encoding|size`,
//!   or the legacy single `name` column;
//! - container listings are tab-separated rows of
//!   `id, name, image, status[, ports[, labels[, created]]]`.
//!
//! Before any row is decoded the whole output is screened for diagnostic
//! text. A shell or tool error that lands on stdout must never be mistaken
//! for data, so any match rejects the entire output.

use std::collections::BTreeMap;

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::{debug, warn};

use crate::discovery::{ContainerRecord, DatabaseRecord, DiscoveryError};

const PARSE_TARGET: &str = "pgscout::parse";

/// Template databases that are never reported.
pub const RESERVED_DATABASES: [&str; 2] = ["template0", "template1"];

/// PostgreSQL's identifier length limit.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Longest container reference accepted in a command.
pub const MAX_CONTAINER_REF_LEN: usize = 128;

/// Label that marks a container as PostgreSQL regardless of its name.
pub const POSTGRES_LABEL_KEY: &str = "db.type";

/// Value of [`POSTGRES_LABEL_KEY`] that qualifies a container.
pub const POSTGRES_LABEL_VALUE: &str = "postgresql";

/// Case-insensitive substrings that mark output as a diagnostic.
pub const ERROR_SIGNATURES: [&str; 11] = [
    "password authentication failed",
    "authentication failed",
    "connection refused",
    "could not connect",
    "permission denied",
    "command not found",
    "executable file not found",
    "no such file or directory",
    "no such container",
    "does not exist",
    "cannot connect to the docker daemon",
];

/// Case-insensitive line prefixes that mark output as a diagnostic.
pub const ERROR_LINE_PREFIXES: [&str; 4] = ["fatal:", "error:", "psql:", "error response from daemon"];

const DOCKER_CREATED_AT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute]"
);

/// Why a candidate name was rejected.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum NameRejection {
    /// The name is empty or whitespace.
    #[error("name is empty")]
    Empty,
    /// The name is a reserved template database.
    #[error("{name} is a reserved template database")]
    Reserved {
        /// Rejected name.
        name: String,
    },
    /// The name contains `/` or `\`.
    #[error("name contains a path separator")]
    PathSeparator,
    /// The name starts with `.`.
    #[error("name starts with a dot")]
    LeadingDot,
    /// The name starts with `-` and would be read as an option.
    #[error("name starts with a dash")]
    LeadingDash,
    /// The name exceeds the length limit.
    #[error("name is {length} characters long, the limit is {max}")]
    TooLong {
        /// Length of the rejected name in characters.
        length: usize,
        /// Maximum permitted length.
        max: usize,
    },
    /// The name contains a character outside the permitted set.
    #[error("name contains invalid character {ch:?}")]
    InvalidCharacter {
        /// First offending character.
        ch: char,
    },
}

/// Validates a database or role name before it is reported or interpolated.
///
/// Accepts 1 to 63 characters from `[A-Za-z0-9_-]`, not starting with `.` or
/// `-`, and never a reserved template database.
///
/// # Errors
///
/// Returns the first [`NameRejection`] that applies.
///
/// # Examples
///
/// ```
/// use pgscout::parse::{NameRejection, validate_database_name};
///
/// assert!(validate_database_name("orders_2024").is_ok());
/// assert_eq!(validate_database_name("../etc"), Err(NameRejection::PathSeparator));
/// ```
pub fn validate_database_name(name: &str) -> Result<(), NameRejection> {
    if name.trim().is_empty() {
        return Err(NameRejection::Empty);
    }
    if RESERVED_DATABASES.contains(&name) {
        return Err(NameRejection::Reserved {
            name: name.to_owned(),
        });
    }
    check_identifier(name, MAX_IDENTIFIER_LEN, |_| false)
}

/// Validates a table name, allowing one `.` for schema qualification.
///
/// # Errors
///
/// Returns the first [`NameRejection`] that applies to either part.
pub fn validate_table_name(name: &str) -> Result<(), NameRejection> {
    match name.split_once('.') {
        Some((schema, table)) => {
            check_identifier(schema, MAX_IDENTIFIER_LEN, |_| false)?;
            check_identifier(table, MAX_IDENTIFIER_LEN, |_| false)
        }
        None => check_identifier(name, MAX_IDENTIFIER_LEN, |_| false),
    }
}

/// Validates a container id or name before it is used in `docker exec`.
///
/// # Errors
///
/// Returns the first [`NameRejection`] that applies.
pub fn validate_container_ref(reference: &str) -> Result<(), NameRejection> {
    check_identifier(reference, MAX_CONTAINER_REF_LEN, |ch| ch == '.')
}

fn check_identifier(
    name: &str,
    max: usize,
    extra_allowed: impl Fn(char) -> bool,
) -> Result<(), NameRejection> {
    if name.trim().is_empty() {
        return Err(NameRejection::Empty);
    }
    if name.contains(['/', '\\']) {
        return Err(NameRejection::PathSeparator);
    }
    if name.starts_with('.') {
        return Err(NameRejection::LeadingDot);
    }
    if name.starts_with('-') {
        return Err(NameRejection::LeadingDash);
    }
    let length = name.chars().count();
    if length > max {
        return Err(NameRejection::TooLong { length, max });
    }
    match name
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-') || extra_allowed(*ch)))
    {
        Some(ch) => Err(NameRejection::InvalidCharacter { ch }),
        None => Ok(()),
    }
}

/// Returns the first error signature found in `output`, if any.
#[must_use]
pub fn find_error_signature(output: &str) -> Option<&'static str> {
    let lowered = output.to_lowercase();
    if let Some(signature) = ERROR_SIGNATURES
        .iter()
        .find(|signature| lowered.contains(*signature))
        .copied()
    {
        return Some(signature);
    }
    lowered.lines().find_map(|line| {
        let trimmed = line.trim_start();
        ERROR_LINE_PREFIXES
            .iter()
            .find(|prefix| trimmed.starts_with(*prefix))
            .copied()
    })
}

/// Rejects `output` as a whole when it carries an error signature.
///
/// # Errors
///
/// Returns [`DiscoveryError::DiscoveryFailed`] with the trimmed output as
/// the diagnostic.
pub fn screen_output(output: &str) -> Result<(), DiscoveryError> {
    match find_error_signature(output) {
        Some(signature) => {
            warn!(target: PARSE_TARGET, signature, "output rejected as diagnostic text");
            Err(DiscoveryError::DiscoveryFailed {
                diagnostic: output.trim().to_owned(),
            })
        }
        None => Ok(()),
    }
}

/// Why a database listing row was left out of the result.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RowRejection {
    /// The row's name failed validation.
    #[error(transparent)]
    Name(NameRejection),
    /// The row had two or three fields.
    #[error("expected 1 or 4 fields, found {fields}")]
    Malformed {
        /// Number of `|`-separated fields found.
        fields: usize,
    },
}

/// A row dropped from a database listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RejectedRow {
    /// One-based line number within the output.
    pub line_number: usize,
    /// Trimmed line content.
    pub content: String,
    /// Why the row was dropped.
    pub reason: RowRejection,
}

/// Result of decoding a database listing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParsedDatabases {
    /// Records that passed validation, in output order.
    pub records: Vec<DatabaseRecord>,
    /// Rows that were dropped.
    pub rejected: Vec<RejectedRow>,
}

/// Decodes a `|`-separated database listing.
///
/// # Errors
///
/// Returns [`DiscoveryError::DiscoveryFailed`] when the output carries an
/// error signature; no records are produced in that case.
///
/// # Examples
///
/// ```
/// use pgscout::parse::parse_database_list;
///
/// let parsed = parse_database_list("mydb|alice|UTF8|10 MB\ntemplate0|postgres|UTF8|8 MB")?;
/// assert_eq!(parsed.records.len(), 1);
/// assert_eq!(parsed.records[0].owner, "alice");
/// # Ok::<(), pgscout::discovery::DiscoveryError>(())
/// ```
pub fn parse_database_list(output: &str) -> Result<ParsedDatabases, DiscoveryError> {
    screen_output(output)?;

    let mut parsed = ParsedDatabases::default();
    for (index, raw) in output.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        let candidate = match fields.as_slice() {
            [name] => Ok(DatabaseRecord::legacy(name)),
            [name, owner, encoding, size, ..] => Ok(DatabaseRecord::new(name, owner, encoding, size)),
            _ => Err(RowRejection::Malformed {
                fields: fields.len(),
            }),
        };
        let checked = candidate.and_then(|record| {
            validate_database_name(&record.name)
                .map(|()| record)
                .map_err(RowRejection::Name)
        });
        match checked {
            Ok(record) => parsed.records.push(record),
            Err(reason) => {
                debug!(target: PARSE_TARGET, line = line, reason = ?reason, "database row dropped");
                parsed.rejected.push(RejectedRow {
                    line_number: index + 1,
                    content: line.to_owned(),
                    reason,
                });
            }
        }
    }
    Ok(parsed)
}

const CONTAINER_RECORD_MIN_FIELDS: usize = 4;

/// Decodes a tab-separated `docker ps` listing, keeping PostgreSQL
/// containers only.
///
/// Lines with fewer than four fields are logged and skipped. Only those
/// lines are screened for error signatures; record lines carry free-form
/// labels and are never screened.
///
/// # Errors
///
/// Returns [`DiscoveryError::DiscoveryFailed`] when a non-record line
/// carries an error signature.
pub fn parse_container_list(output: &str) -> Result<Vec<ContainerRecord>, DiscoveryError> {
    let stray = output
        .lines()
        .filter(|line| line.split('\t').count() < CONTAINER_RECORD_MIN_FIELDS)
        .collect::<Vec<_>>()
        .join("\n");
    screen_output(&stray)?;

    let mut records = Vec::new();
    for raw in output.lines() {
        let line = raw.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let [id, name, image, status, rest @ ..] = fields.as_slice() else {
            warn!(
                target: PARSE_TARGET,
                line = line,
                fields = fields.len(),
                "unexpected container listing line"
            );
            continue;
        };

        let record = ContainerRecord {
            id: id.trim().to_owned(),
            name: name.trim().trim_start_matches('/').to_owned(),
            image: image.trim().to_owned(),
            status: status.trim().to_owned(),
            ports: rest.first().map_or_else(Vec::new, |text| parse_ports(text)),
            labels: rest
                .get(1)
                .map_or_else(BTreeMap::new, |text| parse_labels(text)),
            created_at: rest.get(2).and_then(|text| parse_created_at(text)),
        };
        if is_postgres_container(&record) {
            records.push(record);
        }
    }
    Ok(records)
}

/// Returns `true` when the image or name mentions postgres or the explicit
/// label override is present.
#[must_use]
pub fn is_postgres_container(record: &ContainerRecord) -> bool {
    let mentions = |text: &str| text.to_lowercase().contains("postgres");
    let labelled = record
        .labels
        .get(POSTGRES_LABEL_KEY)
        .is_some_and(|value| value.eq_ignore_ascii_case(POSTGRES_LABEL_VALUE));
    labelled || mentions(&record.image) || mentions(&record.name)
}

fn parse_ports(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|port| !port.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_labels(text: &str) -> BTreeMap<String, String> {
    text.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

/// Parses Docker's `YYYY-MM-DD HH:MM:SS +ZZZZ ZONE` creation time.
fn parse_created_at(text: &str) -> Option<OffsetDateTime> {
    let stamp = text.split_whitespace().take(3).collect::<Vec<_>>().join(" ");
    OffsetDateTime::parse(&stamp, DOCKER_CREATED_AT).ok()
}
