//! Shared fixtures for exec tests.

use rstest::fixture;

use super::super::*;

#[fixture]
pub fn settings() -> ExecSettings {
    ExecSettings {
        capture_deadline: None,
        ..ExecSettings::default()
    }
}

#[fixture]
pub fn remote_target() -> ServerTarget {
    ServerTarget {
        username: Some(String::from("deploy")),
        port: 2222,
        ..ServerTarget::remote("db-1", "10.0.0.5")
    }
}

pub fn args_of(invocation: &Invocation) -> Vec<String> {
    invocation
        .args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}
