//! Configuration validation and conversion tests.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::test_support::EnvGuard;

#[fixture]
fn base_config() -> ScoutConfig {
    ScoutConfig {
        inventory_path: String::from(DEFAULT_INVENTORY_PATH),
        ssh_bin: String::from("ssh"),
        sshpass_bin: String::from("sshpass"),
        ssh_batch_mode: true,
        ssh_strict_host_key_checking: false,
        ssh_known_hosts_file: String::from("/dev/null"),
        ssh_connect_timeout_secs: 10,
        discovery_timeout_secs: 30,
        docker_bin: String::from("docker"),
        psql_bin: String::from("psql"),
        pg_dump_bin: String::from("pg_dump"),
        pg_isready_bin: String::from("pg_isready"),
        log_filter: String::from("info"),
        log_format: String::from("compact"),
    }
}

#[rstest]
fn defaults_validate(base_config: ScoutConfig) {
    assert!(base_config.validate().is_ok());
}

#[rstest]
fn defaults_match_executor_defaults(base_config: ScoutConfig) {
    assert_eq!(base_config.exec_settings(), ExecSettings::default());
    assert_eq!(base_config.tool_paths(), ToolPaths::default());
}

#[rstest]
#[case::ssh_bin("ssh_bin")]
#[case::docker_bin("docker_bin")]
#[case::inventory_path("inventory_path")]
fn blank_values_are_rejected_with_guidance(base_config: ScoutConfig, #[case] field: &str) {
    let mut cfg = base_config;
    let slot = match field {
        "ssh_bin" => &mut cfg.ssh_bin,
        "docker_bin" => &mut cfg.docker_bin,
        _ => &mut cfg.inventory_path,
    };
    *slot = String::from("  ");

    let err = cfg.validate().expect_err("blank value must fail");
    assert_eq!(
        err,
        ConfigError::InvalidConfig {
            field: field.to_owned()
        }
    );
    assert!(
        err.to_string()
            .contains(&format!("PGSCOUT_{}", field.to_uppercase())),
        "{err}"
    );
}

#[rstest]
fn unknown_log_format_is_rejected(base_config: ScoutConfig) {
    let cfg = ScoutConfig {
        log_format: String::from("pretty"),
        ..base_config
    };
    assert!(matches!(
        cfg.validate(),
        Err(ConfigError::InvalidValue { ref field, .. }) if field == "log_format"
    ));
}

#[rstest]
fn zero_timeouts_disable_limits(base_config: ScoutConfig) {
    let cfg = ScoutConfig {
        ssh_connect_timeout_secs: 0,
        discovery_timeout_secs: 0,
        ..base_config
    };
    let settings = cfg.exec_settings();
    assert_eq!(settings.connect_timeout_secs, None);
    assert_eq!(settings.capture_deadline, None);
}

#[rstest]
fn timeouts_convert_to_durations(base_config: ScoutConfig) {
    let cfg = ScoutConfig {
        discovery_timeout_secs: 5,
        ..base_config
    };
    assert_eq!(cfg.exec_settings().capture_deadline, Some(Duration::from_secs(5)));
}

#[tokio::test]
async fn environment_overrides_defaults() {
    let _guard = EnvGuard::set_vars(&[
        ("PGSCOUT_DOCKER_BIN", "/opt/docker/bin/docker"),
        ("PGSCOUT_LOG_FORMAT", "json"),
    ])
    .await;

    let cfg = ScoutConfig::load_without_cli_args().expect("config should load");

    assert_eq!(cfg.docker_bin, "/opt/docker/bin/docker");
    assert_eq!(cfg.log_format(), Ok(LogFormat::Json));
    assert_eq!(cfg.inventory_path(), Utf8PathBuf::from(DEFAULT_INVENTORY_PATH));
}
