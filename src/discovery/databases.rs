//! Listing databases with an ordered credential fallback.
//!
//! The role that may connect is not known in advance. [`CredentialPlan`]
//! lists the candidate strategies in a fixed order and runs them until one
//! succeeds:
//!
//! 1. the role configured for the target, or `postgres`;
//! 2. the `POSTGRES_USER` declared in the container's environment;
//! 3. no role at all, leaving it to the tool's default identity.

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::exec::{ExecError, Executor, ProcessRunner};
use crate::parse::{
    RejectedRow, parse_database_list, screen_output, validate_container_ref, validate_database_name,
};
use crate::target::ServerTarget;
use crate::tools::{DiscoveryScope, ToolPaths};

use super::{DISCOVERY_TARGET, DatabaseRecord, DiscoveryError, require_valid};

const POSTGRES_USER_DECLARATION: &str = "POSTGRES_USER=";

/// One way of authenticating against PostgreSQL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CredentialAttempt {
    /// The role configured for the target, or `postgres`.
    ConfiguredRole(String),
    /// The role declared by the container's `POSTGRES_USER`.
    EnvironmentRole(String),
    /// No explicit role.
    DefaultRole,
}

impl CredentialAttempt {
    /// Role passed with `-U`, if any.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        match self {
            Self::ConfiguredRole(role) | Self::EnvironmentRole(role) => Some(role),
            Self::DefaultRole => None,
        }
    }
}

impl fmt::Display for CredentialAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfiguredRole(role) => write!(f, "configured role {role}"),
            Self::EnvironmentRole(role) => write!(f, "environment role {role}"),
            Self::DefaultRole => f.write_str("default role"),
        }
    }
}

/// Ordered list of credential attempts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CredentialPlan {
    attempts: Vec<CredentialAttempt>,
}

impl CredentialPlan {
    /// Builds the plan for `target`.
    ///
    /// `environment_role` is included only when it differs from the
    /// configured role.
    #[must_use]
    pub fn for_target(target: &ServerTarget, environment_role: Option<&str>) -> Self {
        let configured = target.postgres_role();
        let mut attempts = vec![CredentialAttempt::ConfiguredRole(configured.to_owned())];
        if let Some(role) = environment_role.filter(|role| *role != configured) {
            attempts.push(CredentialAttempt::EnvironmentRole(role.to_owned()));
        }
        attempts.push(CredentialAttempt::DefaultRole);
        Self { attempts }
    }

    /// Attempts in execution order.
    #[must_use]
    pub fn attempts(&self) -> &[CredentialAttempt] {
        &self.attempts
    }

    /// Runs attempts in order and returns the first success together with
    /// the attempt that produced it.
    ///
    /// # Errors
    ///
    /// Non-retryable errors (see [`DiscoveryError::is_retryable`]) are
    /// returned immediately. When every attempt fails, returns
    /// [`DiscoveryError::DiscoveryFailed`] with the last diagnostic.
    pub async fn execute<T, F, Fut>(
        &self,
        mut run_attempt: F,
    ) -> Result<(CredentialAttempt, T), DiscoveryError>
    where
        F: FnMut(CredentialAttempt) -> Fut,
        Fut: Future<Output = Result<T, DiscoveryError>>,
    {
        let mut last_diagnostic = String::from("no credential attempts were made");
        for attempt in &self.attempts {
            match run_attempt(attempt.clone()).await {
                Ok(value) => return Ok((attempt.clone(), value)),
                Err(err) if err.is_retryable() => {
                    debug!(
                        target: DISCOVERY_TARGET,
                        attempt = %attempt,
                        error = %err,
                        "credential attempt failed"
                    );
                    last_diagnostic = err.diagnostic();
                }
                Err(err) => return Err(err),
            }
        }
        Err(DiscoveryError::DiscoveryFailed {
            diagnostic: last_diagnostic,
        })
    }
}

/// Databases found on a target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatabaseListing {
    /// Valid, non-template databases.
    pub records: Vec<DatabaseRecord>,
    /// Rows dropped by validation.
    pub rejected: Vec<RejectedRow>,
    /// Credential attempt that succeeded.
    pub attempt: CredentialAttempt,
}

/// Lists databases inside a container or on a host installation.
#[derive(Debug)]
pub struct DatabaseDiscovery<'a, R: ProcessRunner> {
    executor: &'a Executor<R>,
    tools: &'a ToolPaths,
}

impl<'a, R: ProcessRunner> DatabaseDiscovery<'a, R> {
    /// Creates a discovery bound to an executor and tool paths.
    #[must_use]
    pub const fn new(executor: &'a Executor<R>, tools: &'a ToolPaths) -> Self {
        Self { executor, tools }
    }

    /// Lists non-template databases in `scope` on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidName`] when the container reference
    /// or configured role is unsafe, [`DiscoveryError::Exec`] for transport,
    /// spawn and cancellation failures, and
    /// [`DiscoveryError::DiscoveryFailed`] when every attempt fails.
    pub async fn list(
        &self,
        target: &ServerTarget,
        scope: &DiscoveryScope,
        cancel: &CancellationToken,
    ) -> Result<DatabaseListing, DiscoveryError> {
        validate_scope(target, scope)?;
        let environment_role = match scope {
            DiscoveryScope::Container(container) => {
                self.environment_role(target, container, cancel).await?
            }
            DiscoveryScope::Host => None,
        };
        let plan = CredentialPlan::for_target(target, environment_role.as_deref());

        let (attempt, parsed) = plan
            .execute(move |attempt| async move {
                let command = self.tools.scoped(
                    target,
                    scope,
                    self.tools.database_listing(attempt.role()),
                );
                let output = self.executor.run(target, &command, cancel).await?;
                screen_output(&output.combined())?;
                parse_database_list(&output.stdout)
            })
            .await?;

        info!(
            target: DISCOVERY_TARGET,
            server = %target.id,
            scope = %scope,
            attempt = %attempt,
            count = parsed.records.len(),
            rejected = parsed.rejected.len(),
            "listed databases"
        );
        Ok(DatabaseListing {
            records: parsed.records,
            rejected: parsed.rejected,
            attempt,
        })
    }

    /// Checks that PostgreSQL in `scope` accepts connections.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::DiscoveryFailed`] when the readiness probe
    /// reports failure, plus the validation and execution errors of
    /// [`DatabaseDiscovery::list`].
    pub async fn probe(
        &self,
        target: &ServerTarget,
        scope: &DiscoveryScope,
        cancel: &CancellationToken,
    ) -> Result<(), DiscoveryError> {
        validate_scope(target, scope)?;
        let command = self.tools.scoped(
            target,
            scope,
            self.tools.readiness(Some(target.postgres_role())),
        );
        match self.executor.run(target, &command, cancel).await {
            Ok(output) => {
                info!(
                    target: DISCOVERY_TARGET,
                    server = %target.id,
                    scope = %scope,
                    status = output.stdout.trim(),
                    "postgres is accepting connections"
                );
                Ok(())
            }
            Err(ExecError::ExecutionFailed { diagnostic, .. }) => {
                Err(DiscoveryError::DiscoveryFailed { diagnostic })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Reads `POSTGRES_USER` from the container's environment.
    ///
    /// A failing lookup or an unsafe value yields `None`; transport failures
    /// are returned.
    async fn environment_role(
        &self,
        target: &ServerTarget,
        container: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, DiscoveryError> {
        let command = self.tools.container_environment(target, container);
        let output = match self.executor.run(target, &command, cancel).await {
            Ok(output) => output,
            Err(ExecError::ExecutionFailed { diagnostic, .. }) => {
                debug!(
                    target: DISCOVERY_TARGET,
                    container,
                    diagnostic = %diagnostic,
                    "container environment unavailable"
                );
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let role = output
            .stdout
            .lines()
            .filter_map(|line| line.trim().strip_prefix(POSTGRES_USER_DECLARATION))
            .map(str::trim)
            .find(|role| !role.is_empty());
        match role {
            Some(candidate) => match validate_database_name(candidate) {
                Ok(()) => Ok(Some(candidate.to_owned())),
                Err(reason) => {
                    warn!(
                        target: DISCOVERY_TARGET,
                        container,
                        reason = %reason,
                        "ignoring unsafe POSTGRES_USER"
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

fn validate_scope(target: &ServerTarget, scope: &DiscoveryScope) -> Result<(), DiscoveryError> {
    if let DiscoveryScope::Container(container) = scope {
        require_valid("container", container, validate_container_ref)?;
    }
    require_valid("role", target.postgres_role(), validate_database_name)
}
