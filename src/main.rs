//! Binary entry point for the pgscout CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pgscout::config::{ConfigError, ScoutConfig};
use pgscout::discovery::{
    ContainerDiscovery, ContainerRecord, DatabaseDiscovery, DatabaseRecord, DiscoveryError,
};
use pgscout::dump::{DumpError, DumpOptions, DumpStreamer, copy_to, dump_file_name};
use pgscout::exec::{Executor, RemoteCommand, TokioProcessRunner};
use pgscout::inventory::{Inventory, InventoryError};
use pgscout::target::ServerTarget;
use pgscout::telemetry::{self, TelemetryError};
use pgscout::tools::{DiscoveryScope, ToolPaths};

use cli::{Cli, Command, DumpCommand, ScopeArgs, ServerArgs};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("dump failed: {0}")]
    Dump(#[from] DumpError),
    #[error("server {server} is unreachable: {reason}")]
    Unreachable { server: String, reason: String },
    #[error("failed to write {destination}: {message}")]
    Output {
        destination: String,
        message: String,
    },
}

impl CliError {
    fn stdout(err: &io::Error) -> Self {
        Self::Output {
            destination: String::from("standard output"),
            message: err.to_string(),
        }
    }
}

/// No-op run on the server itself to prove it accepts commands.
const REACHABILITY_COMMAND: &str = "true";

struct App {
    inventory: Inventory,
    executor: Executor<TokioProcessRunner>,
    tools: ToolPaths,
    json: bool,
    cancel: CancellationToken,
}

#[derive(Debug, Serialize)]
struct ServerSummary<'a> {
    id: &'a str,
    name: &'a str,
    host: &'a str,
    port: u16,
    description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    server_id: &'a str,
    scope: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct DumpSummary<'a> {
    server_id: &'a str,
    database: &'a str,
    path: &'a str,
    bytes: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ScoutConfig::load_without_cli_args()?;
    config.validate()?;
    telemetry::initialise(&config.log_filter, config.log_format()?)?;

    let inventory_path = cli
        .inventory
        .as_deref()
        .map_or_else(|| config.inventory_path(), Utf8PathBuf::from);
    let app = App {
        inventory: Inventory::load(&inventory_path)?,
        executor: Executor::with_process_runner(config.exec_settings()),
        tools: config.tool_paths(),
        json: cli.json,
        cancel: interrupt_token(),
    };

    match cli.command {
        Command::Servers => app.servers(),
        Command::Status(args) => app.status(&args).await,
        Command::Containers(args) => app.containers(&args).await,
        Command::Databases(args) => app.databases(&args).await,
        Command::Dump(args) => app.dump(&args).await,
    }
}

/// Token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            trigger.cancel();
        }
    });
    token
}

fn scope_of(args: &ScopeArgs) -> DiscoveryScope {
    args.container
        .as_ref()
        .map_or(DiscoveryScope::Host, |container| {
            DiscoveryScope::Container(container.clone())
        })
}

impl App {
    fn target(&self, server: &str) -> Result<&ServerTarget, CliError> {
        Ok(self.inventory.server(server)?)
    }

    fn servers(&self) -> Result<(), CliError> {
        let summaries: Vec<ServerSummary<'_>> = self
            .inventory
            .servers()
            .iter()
            .map(|server| ServerSummary {
                id: &server.id,
                name: server.display_name(),
                host: if server.host.is_empty() {
                    "localhost"
                } else {
                    &server.host
                },
                port: server.port,
                description: server.description.as_deref(),
            })
            .collect();
        if self.json {
            return emit_json(&summaries);
        }
        let rows = summaries
            .iter()
            .map(|server| {
                vec![
                    server.id.to_owned(),
                    server.name.to_owned(),
                    format!("{}:{}", server.host, server.port),
                    server.description.unwrap_or_default().to_owned(),
                ]
            })
            .collect::<Vec<_>>();
        emit_table(&["ID", "NAME", "ADDRESS", "DESCRIPTION"], &rows)
    }

    async fn status(&self, args: &ScopeArgs) -> Result<(), CliError> {
        let target = self.target(&args.server)?;
        let scope = scope_of(args);
        let outcome = match &scope {
            DiscoveryScope::Host => self
                .executor
                .run(target, &RemoteCommand::new(REACHABILITY_COMMAND), &self.cancel)
                .await
                .map(drop)
                .map_err(|err| err.to_string()),
            DiscoveryScope::Container(_) => DatabaseDiscovery::new(&self.executor, &self.tools)
                .probe(target, &scope, &self.cancel)
                .await
                .map_err(|err| err.to_string()),
        };
        let report = StatusReport {
            server_id: &target.id,
            scope: scope.to_string(),
            status: if outcome.is_ok() {
                "reachable"
            } else {
                "unreachable"
            },
            error: outcome.as_ref().err().cloned(),
        };
        if self.json {
            emit_json(&report)?;
        } else {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{} ({}): {}", report.server_id, report.scope, report.status)
                .map_err(|err| CliError::stdout(&err))?;
        }
        outcome.map_err(|reason| CliError::Unreachable {
            server: target.id.clone(),
            reason,
        })
    }

    async fn containers(&self, args: &ServerArgs) -> Result<(), CliError> {
        let target = self.target(&args.server)?;
        let records = ContainerDiscovery::new(&self.executor, &self.tools)
            .list(target, &self.cancel)
            .await?;
        if self.json {
            return emit_json(&records);
        }
        let rows = records.iter().map(container_row).collect::<Vec<_>>();
        emit_table(&["ID", "NAME", "IMAGE", "STATUS", "PORTS"], &rows)
    }

    async fn databases(&self, args: &ScopeArgs) -> Result<(), CliError> {
        let target = self.target(&args.server)?;
        let scope = scope_of(args);
        let listing = DatabaseDiscovery::new(&self.executor, &self.tools)
            .list(target, &scope, &self.cancel)
            .await?;
        for row in &listing.rejected {
            warn!(
                line = row.line_number,
                content = %row.content,
                reason = %row.reason,
                "skipped database row"
            );
        }
        if self.json {
            return emit_json(&listing.records);
        }
        let rows = listing.records.iter().map(database_row).collect::<Vec<_>>();
        emit_table(&["NAME", "OWNER", "ENCODING", "SIZE"], &rows)
    }

    async fn dump(&self, args: &DumpCommand) -> Result<(), CliError> {
        let target = self.target(&args.scope.server)?;
        let scope = scope_of(&args.scope);
        let options = DumpOptions {
            data_only: args.data_only,
            schema_only: args.schema_only,
            tables: args.tables.clone(),
            role: args.role.clone(),
        };
        let cancel = self.cancel.child_token();
        if let Some(secs) = args.timeout {
            let deadline = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                warn!(timeout_secs = secs, "dump deadline elapsed");
                deadline.cancel();
            });
        }

        let destination = args.output.clone().or_else(|| {
            args.suggested_name
                .then(|| dump_file_name(&target.id, &scope, &args.database))
        });
        let streamer = DumpStreamer::new(&self.executor, &self.tools);
        // Validate and build before touching the destination.
        streamer.build_command(target, &scope, &args.database, &options)?;

        let Some(path) = destination else {
            let handle = streamer.open(target, &scope, &args.database, &options, &cancel)?;
            copy_to(handle, &mut tokio::io::stdout()).await?;
            return Ok(());
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create(args.force)
            .truncate(args.force)
            .create_new(!args.force)
            .open(&path)
            .await
            .map_err(|err| CliError::Output {
                destination: path.clone(),
                message: err.to_string(),
            })?;
        let result = match streamer.open(target, &scope, &args.database, &options, &cancel) {
            Ok(handle) => copy_to(handle, &mut file).await,
            Err(err) => Err(err),
        };
        drop(file);
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path, error = %remove_err, "failed to remove partial dump");
                }
                return Err(err.into());
            }
        };

        info!(path = %path, bytes, "dump written");
        if self.json {
            emit_json(&DumpSummary {
                server_id: &target.id,
                database: &args.database,
                path: &path,
                bytes,
            })?;
        }
        Ok(())
    }
}

fn container_row(record: &ContainerRecord) -> Vec<String> {
    vec![
        record.id.chars().take(12).collect(),
        record.name.clone(),
        record.image.clone(),
        record.status.clone(),
        record.ports.join(", "),
    ]
}

fn database_row(record: &DatabaseRecord) -> Vec<String> {
    vec![
        record.name.clone(),
        record.owner.clone(),
        record.encoding.clone(),
        record.size.clone(),
    ]
}

fn emit_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).map_err(|err| CliError::Output {
        destination: String::from("standard output"),
        message: err.to_string(),
    })?;
    writeln!(stdout).map_err(|err| CliError::stdout(&err))
}

fn emit_table(headers: &[&str], rows: &[Vec<String>]) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    write_table(&mut stdout, headers, rows).map_err(|err| CliError::stdout(&err))
}

fn write_table(
    mut target: impl Write,
    headers: &[&str],
    rows: &[Vec<String>],
) -> io::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let render = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        padded.join("  ").trim_end().to_owned()
    };
    writeln!(target, "{}", render(headers.to_vec()))?;
    for row in rows {
        writeln!(target, "{}", render(row.iter().map(String::as_str).collect()))?;
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "error: {err}").ok();
}
