//! Remote shell invocation construction.
//!
//! Remote commands are rendered into a single escaped line and handed to the
//! `ssh` client. Password credentials are supplied through `sshpass -e` so the
//! secret only ever reaches the child's environment.

use std::ffi::OsString;
use std::time::Duration;

use crate::target::{ServerTarget, ShellCredential};

use super::process::Invocation;

/// Environment variable read by `sshpass -e`.
pub const SSHPASS_ENV: &str = "SSHPASS";

/// Exit code reserved by the `ssh` client for transport and authentication
/// failures.
pub const SSH_TRANSPORT_EXIT_CODE: i32 = 255;

/// `sshpass` exit codes for an invalid password and a host key problem.
const SSHPASS_AUTH_EXIT_CODES: [i32; 2] = [5, 6];

/// Default capture-mode deadline.
pub const DEFAULT_CAPTURE_DEADLINE: Duration = Duration::from_secs(30);

/// Default `ConnectTimeout` passed to the ssh client, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Settings that shape how commands reach their targets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecSettings {
    /// Path to the `ssh` executable.
    pub ssh_bin: String,
    /// Path to the `sshpass` executable used for password credentials.
    pub sshpass_bin: String,
    /// Whether to pass `BatchMode=yes` when no password is involved.
    pub batch_mode: bool,
    /// Whether the remote host key must match a known host.
    pub strict_host_key_checking: bool,
    /// Known hosts file handed to the ssh client.
    pub known_hosts_file: String,
    /// `ConnectTimeout` in seconds; `None` leaves the client default.
    pub connect_timeout_secs: Option<u64>,
    /// Deadline applied to capture-mode commands; `None` disables it.
    pub capture_deadline: Option<Duration>,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            sshpass_bin: String::from("sshpass"),
            batch_mode: true,
            strict_host_key_checking: false,
            known_hosts_file: String::from("/dev/null"),
            connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            capture_deadline: Some(DEFAULT_CAPTURE_DEADLINE),
        }
    }
}

/// Builds the invocation that runs `command_line` on `target` via ssh.
///
/// `command_line` must already be shell-escaped; it is passed to the remote
/// shell as a single argument.
#[must_use]
pub fn remote_invocation(
    settings: &ExecSettings,
    target: &ServerTarget,
    command_line: &str,
) -> Invocation {
    let credential = target.credential();
    let mut args = vec![OsString::from("-p"), OsString::from(target.port.to_string())];

    if let ShellCredential::PrivateKey(key) = credential {
        args.push(OsString::from("-i"));
        args.push(OsString::from(expand_tilde(key)));
    }

    let uses_password = matches!(credential, ShellCredential::Password(_));
    if settings.batch_mode && !uses_password {
        push_option(&mut args, "BatchMode=yes");
    }
    if uses_password {
        push_option(&mut args, "PreferredAuthentications=password,keyboard-interactive");
        push_option(&mut args, "PubkeyAuthentication=no");
    }

    let strict = if settings.strict_host_key_checking {
        "yes"
    } else {
        "no"
    };
    push_option(&mut args, &format!("StrictHostKeyChecking={strict}"));
    push_option(
        &mut args,
        &format!("UserKnownHostsFile={}", settings.known_hosts_file),
    );
    if let Some(seconds) = settings.connect_timeout_secs {
        push_option(&mut args, &format!("ConnectTimeout={seconds}"));
    }

    args.push(OsString::from(target.ssh_destination()));
    args.push(OsString::from(command_line));

    match credential {
        ShellCredential::Password(password) => {
            let mut wrapped = vec![OsString::from("-e"), OsString::from(&settings.ssh_bin)];
            wrapped.extend(args);
            Invocation::new(settings.sshpass_bin.clone(), wrapped).env(SSHPASS_ENV, password)
        }
        ShellCredential::PrivateKey(_) | ShellCredential::Default => {
            Invocation::new(settings.ssh_bin.clone(), args)
        }
    }
}

/// Returns `true` when `code` means the remote shell was never reached.
#[must_use]
pub fn is_transport_failure(invocation: &Invocation, settings: &ExecSettings, code: i32) -> bool {
    if code == SSH_TRANSPORT_EXIT_CODE {
        return true;
    }
    invocation.program == settings.sshpass_bin && SSHPASS_AUTH_EXIT_CODES.contains(&code)
}

fn push_option(args: &mut Vec<OsString>, option: &str) {
    args.push(OsString::from("-o"));
    args.push(OsString::from(option));
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// The input is returned unchanged when `HOME` is not set.
///
/// # Examples
///
/// ```
/// # use pgscout::exec::expand_tilde;
/// assert_eq!(expand_tilde("/etc/keys/id_ed25519"), "/etc/keys/id_ed25519");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}
