//! Listing PostgreSQL containers on a target.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::exec::{Executor, ProcessRunner};
use crate::parse::{parse_container_list, screen_output};
use crate::target::ServerTarget;
use crate::tools::ToolPaths;

use super::{ContainerRecord, DISCOVERY_TARGET, DiscoveryError};

/// Lists running containers that host PostgreSQL.
#[derive(Debug)]
pub struct ContainerDiscovery<'a, R: ProcessRunner> {
    executor: &'a Executor<R>,
    tools: &'a ToolPaths,
}

impl<'a, R: ProcessRunner> ContainerDiscovery<'a, R> {
    /// Creates a discovery bound to an executor and tool paths.
    #[must_use]
    pub const fn new(executor: &'a Executor<R>, tools: &'a ToolPaths) -> Self {
        Self { executor, tools }
    }

    /// Lists PostgreSQL containers on `target`.
    ///
    /// Returns an empty list when nothing qualifies.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Exec`] when the listing command fails and
    /// [`DiscoveryError::DiscoveryFailed`] when stderr or a non-record line
    /// of stdout is diagnostic text.
    pub async fn list(
        &self,
        target: &ServerTarget,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContainerRecord>, DiscoveryError> {
        let command = self.tools.container_listing(target);
        let output = self.executor.run(target, &command, cancel).await?;
        screen_output(&output.stderr)?;
        let records = parse_container_list(&output.stdout)?;
        info!(
            target: DISCOVERY_TARGET,
            server = %target.id,
            count = records.len(),
            "listed postgres containers"
        );
        Ok(records)
    }
}
