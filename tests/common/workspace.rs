//! Temporary inventory and fake PostgreSQL tooling for CLI tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

const INVENTORY: &str = "\
servers:
  - id: local
    name: Workstation
    description: developer machine
  - id: prod
    name: Production
    host: db.example.invalid
    username: deploy
";

const DOCKER: &str = r#"#!/bin/sh
if [ "$1" = "ps" ]; then
  printf 'abc123def456\tpg-main\tpostgres:15\tUp 2 hours\t5432:5432/tcp,\t\t\n'
  printf 'fff000111222\tweb\tnginx:1.25\tUp 3 hours\t80/tcp\t\t\n'
  exit 0
fi
echo "unexpected docker invocation: $*" >&2
exit 64
"#;

const PSQL: &str = r#"#!/bin/sh
if [ "$1" = "-U" ] && [ "$2" = "postgres" ]; then
  echo 'psql: error: FATAL:  role "postgres" does not exist' >&2
  exit 2
fi
printf 'mydb|alice|UTF8|10 MB\n'
printf 'template0|postgres|UTF8|8 MB\n'
"#;

const PG_DUMP: &str = r#"#!/bin/sh
for database; do :; done
if [ "$database" = "broken" ]; then
  printf -- '-- partial\n'
  echo 'pg_dump: error: query failed' >&2
  exit 1
fi
printf -- '-- dump of %s\nSELECT 1;\n' "$database"
"#;

/// Scratch directory with an inventory and executable tool stand-ins.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Creates the inventory and fake `docker`, `psql` and `pg_dump`.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("servers.yaml"), INVENTORY).expect("write inventory");
        let workspace = Self { dir };
        workspace.tool("docker", DOCKER);
        workspace.tool("psql", PSQL);
        workspace.tool("pg_dump", PG_DUMP);
        workspace
    }

    fn tool(&self, name: &str, script: &str) {
        let path = self.path(name);
        fs::write(&path, script).expect("write tool script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod tool");
    }

    /// Absolute path of `name` inside the workspace.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Workspace root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// `pgscout` configured to use the workspace inventory and tools.
    pub fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("pgscout");
        cmd.current_dir(self.root())
            .env("PGSCOUT_INVENTORY_PATH", self.path("servers.yaml"))
            .env("PGSCOUT_DOCKER_BIN", self.path("docker"))
            .env("PGSCOUT_PSQL_BIN", self.path("psql"))
            .env("PGSCOUT_PG_DUMP_BIN", self.path("pg_dump"))
            .env("PGSCOUT_LOG_FILTER", "warn");
        cmd
    }
}
