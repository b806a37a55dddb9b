//! Streaming database dumps.
//!
//! [`DumpStreamer::open`] starts `pg_dump` in the requested scope and hands
//! back the [`DumpHandle`] without reading from it. Dump content is opaque;
//! only the producer's exit status is judged, and only when the handle is
//! closed.

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::exec::{DumpHandle, ExecError, Executor, ProcessRunner, RemoteCommand};
use crate::parse::{
    NameRejection, validate_container_ref, validate_database_name, validate_table_name,
};
use crate::target::ServerTarget;
use crate::tools::{DiscoveryScope, ToolPaths};

const DUMP_TARGET: &str = "pgscout::dump";

/// Output-shape options for a dump.
///
/// Flags are additive; setting both `data_only` and `schema_only` passes
/// both to the tool.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DumpOptions {
    /// Dump only the data, not the schema.
    pub data_only: bool,
    /// Dump only the schema, not the data.
    pub schema_only: bool,
    /// Restrict the dump to these tables, optionally schema-qualified.
    pub tables: Vec<String>,
    /// Role overriding the target's configured role.
    pub role: Option<String>,
}

/// Errors raised while opening or consuming a dump.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DumpError {
    /// A name was unsafe to place in the dump command.
    #[error("invalid {kind} {value:?}: {reason}")]
    InvalidName {
        /// What the name identifies.
        kind: String,
        /// Rejected value.
        value: String,
        /// Why it was rejected.
        #[source]
        reason: NameRejection,
    },
    /// Starting, running or closing the producer failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
    /// Writing the dump to its destination failed.
    #[error("failed to write dump output: {message}")]
    Output {
        /// Operating system error string.
        message: String,
    },
}

/// Builds and starts dump producers.
#[derive(Debug)]
pub struct DumpStreamer<'a, R: ProcessRunner> {
    executor: &'a Executor<R>,
    tools: &'a ToolPaths,
}

impl<'a, R: ProcessRunner> DumpStreamer<'a, R> {
    /// Creates a streamer bound to an executor and tool paths.
    #[must_use]
    pub const fn new(executor: &'a Executor<R>, tools: &'a ToolPaths) -> Self {
        Self { executor, tools }
    }

    /// Builds the dump command after validating every interpolated name.
    ///
    /// # Errors
    ///
    /// Returns [`DumpError::InvalidName`] for an unsafe container reference,
    /// role, database or table name.
    pub fn build_command(
        &self,
        target: &ServerTarget,
        scope: &DiscoveryScope,
        database: &str,
        options: &DumpOptions,
    ) -> Result<RemoteCommand, DumpError> {
        if let DiscoveryScope::Container(container) = scope {
            require_valid("container", container, validate_container_ref)?;
        }
        let role = options
            .role
            .as_deref()
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .unwrap_or_else(|| target.postgres_role());
        require_valid("role", role, validate_database_name)?;
        require_valid("database", database, validate_database_name)?;
        for table in &options.tables {
            require_valid("table", table, validate_table_name)?;
        }

        let mut command = RemoteCommand::new(&self.tools.pg_dump).args(["-U", role]);
        if options.data_only {
            command = command.arg("--data-only");
        }
        if options.schema_only {
            command = command.arg("--schema-only");
        }
        for table in &options.tables {
            command = command.args(["-t", table.as_str()]);
        }
        Ok(self.tools.scoped(target, scope, command.arg(database)))
    }

    /// Starts the dump and returns its handle unread.
    ///
    /// The caller must close the handle exactly once. Cancelling `cancel`
    /// kills the producer.
    ///
    /// # Errors
    ///
    /// Returns [`DumpError::InvalidName`] from validation and
    /// [`DumpError::Exec`] when the producer cannot be started. A failing
    /// producer is reported by [`DumpHandle::close`].
    pub fn open(
        &self,
        target: &ServerTarget,
        scope: &DiscoveryScope,
        database: &str,
        options: &DumpOptions,
        cancel: &CancellationToken,
    ) -> Result<DumpHandle, DumpError> {
        let command = self.build_command(target, scope, database, options)?;
        let handle = self.executor.stream(target, &command, cancel)?;
        info!(
            target: DUMP_TARGET,
            server = %target.id,
            scope = %scope,
            database,
            "dump started"
        );
        Ok(handle)
    }
}

/// Copies the whole stream into `writer` and closes the handle.
///
/// The handle is closed whether or not copying succeeded. Cancelling the
/// handle's token stops the copy and kills the producer.
///
/// # Errors
///
/// Returns [`DumpError::Output`] when writing fails, otherwise the close
/// error when the producer failed or was cancelled.
pub async fn copy_to<W>(mut handle: DumpHandle, writer: &mut W) -> Result<u64, DumpError>
where
    W: AsyncWrite + Unpin,
{
    let cancel = handle.cancel_token();
    let copied = tokio::select! {
        () = cancel.cancelled() => None,
        result = copy_and_flush(&mut handle, writer) => Some(result),
    };
    let closed = handle.close().await;
    match (copied, closed) {
        (Some(Err(err)), closed) => {
            if let Err(close_err) = closed {
                warn!(target: DUMP_TARGET, error = %close_err, "producer failed after output error");
            }
            Err(DumpError::Output {
                message: err.to_string(),
            })
        }
        (_, Err(err)) => Err(err.into()),
        (_, Ok(bytes)) => {
            info!(target: DUMP_TARGET, bytes, "dump complete");
            Ok(bytes)
        }
    }
}

async fn copy_and_flush<W>(handle: &mut DumpHandle, writer: &mut W) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let bytes = tokio::io::copy(handle, writer).await?;
    writer.flush().await?;
    Ok(bytes)
}

/// Suggested file name: `<server>_<container prefix | host>_<database>.sql`.
///
/// Characters outside `[A-Za-z0-9_.-]` are replaced with `_`.
///
/// # Examples
///
/// ```
/// use pgscout::dump::dump_file_name;
/// use pgscout::tools::DiscoveryScope;
///
/// let scope = DiscoveryScope::Container(String::from("abc123def456"));
/// assert_eq!(dump_file_name("prod db", &scope, "orders"), "prod_db_abc123de_orders.sql");
/// ```
#[must_use]
pub fn dump_file_name(server: &str, scope: &DiscoveryScope, database: &str) -> String {
    let raw = format!("{server}_{}_{database}.sql", scope.label());
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn require_valid(
    kind: &str,
    value: &str,
    check: impl FnOnce(&str) -> Result<(), NameRejection>,
) -> Result<(), DumpError> {
    check(value).map_err(|reason| DumpError::InvalidName {
        kind: kind.to_owned(),
        value: value.to_owned(),
        reason,
    })
}

#[cfg(test)]
mod tests;
