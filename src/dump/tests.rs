//! Tests for dump command construction and streaming.

use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::exec::ExecSettings;
use crate::test_support::{ScriptedRunner, StreamScript};

#[fixture]
fn executor() -> Executor<ScriptedRunner> {
    Executor::new(
        ExecSettings {
            capture_deadline: None,
            ..ExecSettings::default()
        },
        ScriptedRunner::new(),
    )
}

fn render(
    executor: &Executor<ScriptedRunner>,
    target: &ServerTarget,
    scope: &DiscoveryScope,
    options: &DumpOptions,
) -> String {
    let tools = ToolPaths::default();
    DumpStreamer::new(executor, &tools)
        .build_command(target, scope, "mydb", options)
        .expect("command should build")
        .render_shell_line()
}

#[rstest]
fn default_dump_uses_postgres_role(executor: Executor<ScriptedRunner>) {
    let line = render(
        &executor,
        &ServerTarget::local("local"),
        &DiscoveryScope::Host,
        &DumpOptions::default(),
    );
    assert_eq!(line, "pg_dump -U postgres mydb");
}

#[rstest]
fn flags_are_additive_and_tables_repeat(executor: Executor<ScriptedRunner>) {
    let options = DumpOptions {
        data_only: true,
        schema_only: true,
        tables: vec![String::from("orders"), String::from("sales.items")],
        role: None,
    };
    let line = render(
        &executor,
        &ServerTarget::local("local"),
        &DiscoveryScope::Container(String::from("abc123")),
        &options,
    );
    assert_eq!(
        line,
        "docker exec abc123 pg_dump -U postgres --data-only --schema-only -t orders -t sales.items mydb"
    );
}

#[rstest]
#[case(None, Some("configured"), "configured")]
#[case(Some("override"), Some("configured"), "override")]
#[case(Some("  "), None, "postgres")]
fn role_resolution_order(
    executor: Executor<ScriptedRunner>,
    #[case] option_role: Option<&str>,
    #[case] configured: Option<&str>,
    #[case] expected: &str,
) {
    let target = ServerTarget {
        postgres_user: configured.map(str::to_owned),
        ..ServerTarget::local("local")
    };
    let options = DumpOptions {
        role: option_role.map(str::to_owned),
        ..DumpOptions::default()
    };
    let line = render(&executor, &target, &DiscoveryScope::Host, &options);
    assert_eq!(line, format!("pg_dump -U {expected} mydb"));
}

#[rstest]
#[case("mydb; rm -rf /", "database")]
#[case("-Fc", "database")]
fn unsafe_databases_are_rejected_before_spawning(
    executor: Executor<ScriptedRunner>,
    #[case] database: &str,
    #[case] kind: &str,
) {
    let tools = ToolPaths::default();
    let err = DumpStreamer::new(&executor, &tools)
        .open(
            &ServerTarget::local("local"),
            &DiscoveryScope::Host,
            database,
            &DumpOptions::default(),
            &CancellationToken::new(),
        )
        .expect_err("unsafe name rejected");

    assert!(
        matches!(&err, DumpError::InvalidName { kind: rejected, .. } if rejected == kind),
        "{err:?}"
    );
    assert!(executor.runner().invocations().is_empty());
}

#[rstest]
fn unsafe_tables_and_roles_are_rejected(executor: Executor<ScriptedRunner>) {
    let tools = ToolPaths::default();
    let streamer = DumpStreamer::new(&executor, &tools);
    let target = ServerTarget::local("local");

    let table = DumpOptions {
        tables: vec![String::from("a.b.c")],
        ..DumpOptions::default()
    };
    let role = DumpOptions {
        role: Some(String::from("x' OR '1")),
        ..DumpOptions::default()
    };
    for options in [table, role] {
        assert!(
            streamer
                .build_command(&target, &DiscoveryScope::Host, "mydb", &options)
                .is_err()
        );
    }
}

#[rstest]
#[tokio::test]
async fn copy_to_writes_stream_and_reports_bytes(executor: Executor<ScriptedRunner>) {
    executor
        .runner()
        .push_stream(StreamScript::new("-- dump\nSELECT 1;\n", 0));
    let tools = ToolPaths::default();
    let handle = DumpStreamer::new(&executor, &tools)
        .open(
            &ServerTarget::local("local"),
            &DiscoveryScope::Host,
            "mydb",
            &DumpOptions::default(),
            &CancellationToken::new(),
        )
        .expect("dump should start");

    let mut sink = Vec::new();
    let bytes = copy_to(handle, &mut sink).await.expect("dump should finish");

    assert_eq!(bytes, 18);
    assert_eq!(sink, b"-- dump\nSELECT 1;\n");
}

#[rstest]
#[tokio::test]
async fn copy_to_surfaces_producer_failure_after_clean_copy(
    executor: Executor<ScriptedRunner>,
) {
    executor.runner().push_stream(
        StreamScript::new("-- partial\n", 1).with_stderr("pg_dump: error: query failed\n"),
    );
    let tools = ToolPaths::default();
    let handle = DumpStreamer::new(&executor, &tools)
        .open(
            &ServerTarget::local("local"),
            &DiscoveryScope::Host,
            "mydb",
            &DumpOptions::default(),
            &CancellationToken::new(),
        )
        .expect("dump should start");

    let mut sink = Vec::new();
    let err = copy_to(handle, &mut sink)
        .await
        .expect_err("exit status must surface");
    assert!(
        matches!(err, DumpError::Exec(ExecError::ProcessExit { status: Some(1), .. })),
        "{err:?}"
    );
    assert_eq!(sink, b"-- partial\n");
}

#[rstest]
#[tokio::test]
async fn cancelling_mid_copy_kills_the_producer(executor: Executor<ScriptedRunner>) {
    executor
        .runner()
        .push_stream(StreamScript::new("-- header\n", 0).lingering(30));
    let tools = ToolPaths::default();
    let cancel = CancellationToken::new();
    let handle = DumpStreamer::new(&executor, &tools)
        .open(
            &ServerTarget::local("local"),
            &DiscoveryScope::Host,
            "mydb",
            &DumpOptions::default(),
            &cancel,
        )
        .expect("dump should start");

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        trigger.cancel();
    });
    let mut sink = Vec::new();
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        copy_to(handle, &mut sink),
    )
    .await
    .expect("cancellation must stop the copy");

    assert!(
        matches!(result, Err(DumpError::Exec(ExecError::Canceled { .. }))),
        "{result:?}"
    );
}

#[rstest]
#[case(DiscoveryScope::Container(String::from("abc123def456")), "prod_abc123de_orders.sql")]
#[case(DiscoveryScope::Host, "prod_host_orders.sql")]
fn dump_file_names(#[case] scope: DiscoveryScope, #[case] expected: &str) {
    assert_eq!(dump_file_name("prod", &scope, "orders"), expected);
}
