//! Tests for ssh option construction and credential handling.

use rstest::rstest;

use super::super::*;
use super::fixtures::{args_of, remote_target, settings};

fn option_values(args: &[String]) -> Vec<&str> {
    args.windows(2)
        .filter(|pair| pair.first().is_some_and(|flag| flag == "-o"))
        .filter_map(|pair| pair.get(1).map(String::as_str))
        .collect()
}

#[rstest]
fn default_options_disable_host_key_checking(
    settings: ExecSettings,
    remote_target: ServerTarget,
) {
    let invocation = remote_invocation(&settings, &remote_target, "true");
    let args = args_of(&invocation);

    assert_eq!(invocation.program, "ssh");
    assert_eq!(args.get(..2), Some(&[String::from("-p"), String::from("2222")][..]));
    let options = option_values(&args);
    assert!(options.contains(&"BatchMode=yes"), "{options:?}");
    assert!(options.contains(&"StrictHostKeyChecking=no"), "{options:?}");
    assert!(options.contains(&"UserKnownHostsFile=/dev/null"), "{options:?}");
    assert!(options.contains(&"ConnectTimeout=10"), "{options:?}");
}

#[rstest]
fn strict_host_key_checking_is_configurable(
    settings: ExecSettings,
    remote_target: ServerTarget,
) {
    let strict = ExecSettings {
        strict_host_key_checking: true,
        known_hosts_file: String::from("/etc/ssh/ssh_known_hosts"),
        ..settings
    };
    let args = args_of(&remote_invocation(&strict, &remote_target, "true"));
    let options = option_values(&args);
    assert!(options.contains(&"StrictHostKeyChecking=yes"), "{options:?}");
    assert!(
        options.contains(&"UserKnownHostsFile=/etc/ssh/ssh_known_hosts"),
        "{options:?}"
    );
}

#[rstest]
fn private_key_is_passed_with_identity_flag(
    settings: ExecSettings,
    remote_target: ServerTarget,
) {
    let target = ServerTarget {
        private_key: Some(String::from("/keys/id_ed25519")),
        password: Some(String::from("ignored")),
        ..remote_target
    };
    let invocation = remote_invocation(&settings, &target, "true");
    let args = args_of(&invocation);

    assert_eq!(invocation.program, "ssh");
    let identity = args
        .iter()
        .position(|arg| arg == "-i")
        .and_then(|index| args.get(index + 1));
    assert_eq!(identity.map(String::as_str), Some("/keys/id_ed25519"));
    assert!(invocation.envs.is_empty(), "key auth must not set SSHPASS");
}

#[rstest]
fn password_is_supplied_through_sshpass_environment(
    settings: ExecSettings,
    remote_target: ServerTarget,
) {
    let target = ServerTarget {
        password: Some(String::from("s3cret")),
        ..remote_target
    };
    let invocation = remote_invocation(&settings, &target, "true");
    let args = args_of(&invocation);

    assert_eq!(invocation.program, "sshpass");
    assert_eq!(args.get(..2), Some(&[String::from("-e"), String::from("ssh")][..]));
    assert!(!args.iter().any(|arg| arg.contains("s3cret")), "{args:?}");
    assert_eq!(
        invocation.envs,
        vec![(String::from(SSHPASS_ENV), String::from("s3cret"))]
    );
    assert!(!option_values(&args).contains(&"BatchMode=yes"));
    assert!(!format!("{invocation:?}").contains("s3cret"));
}

#[rstest]
fn connect_timeout_can_be_disabled(settings: ExecSettings, remote_target: ServerTarget) {
    let relaxed = ExecSettings {
        connect_timeout_secs: None,
        ..settings
    };
    let args = args_of(&remote_invocation(&relaxed, &remote_target, "true"));
    assert!(
        !option_values(&args)
            .iter()
            .any(|option| option.starts_with("ConnectTimeout"))
    );
}

#[rstest]
fn expand_tilde_leaves_absolute_paths() {
    assert_eq!(expand_tilde("/abs/key"), "/abs/key");
    assert_eq!(expand_tilde("relative/key"), "relative/key");
}
