//! Inventory parsing and lookup tests.

use camino::Utf8PathBuf;
use rstest::rstest;
use tempfile::TempDir;

use super::*;
use crate::target::{DEFAULT_SSH_PORT, ExecutionMode};

const INVENTORY: &str = "\
servers:
  - id: local
    name: Workstation
  - id: prod
    name: Production
    host: db.example.com
    port: 2222
    username: deploy
    private_key: ~/.ssh/id_ed25519
    postgres_user: app
    docker_host: unix:///run/user/1000/docker.sock
docker:
  default_host: unix:///var/run/docker.sock
";

#[rstest]
fn parses_servers_in_file_order() {
    let inventory = Inventory::parse(INVENTORY).expect("inventory should parse");
    let ids: Vec<&str> = inventory.servers().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["local", "prod"]);
}

#[rstest]
fn fills_defaults_for_omitted_fields() {
    let inventory = Inventory::parse(INVENTORY).expect("inventory should parse");
    let local = inventory.server("local").expect("local server");
    assert_eq!(local.port, DEFAULT_SSH_PORT);
    assert_eq!(local.execution_mode(), ExecutionMode::Local);
    assert_eq!(local.postgres_role(), "postgres");

    let prod = inventory.server("prod").expect("prod server");
    assert_eq!(prod.port, 2222);
    assert_eq!(prod.execution_mode(), ExecutionMode::Remote);
    assert_eq!(prod.postgres_role(), "app");
}

#[rstest]
fn unknown_server_is_reported() {
    let inventory = Inventory::parse(INVENTORY).expect("inventory should parse");
    assert_eq!(
        inventory.server("staging"),
        Err(InventoryError::UnknownServer {
            id: String::from("staging")
        })
    );
}

#[rstest]
#[case("servers:\n  - id: a\n  - id: a\n", InventoryError::DuplicateId { id: String::from("a") })]
#[case("servers:\n  - id: a\n  - id: ' '\n", InventoryError::MissingId { index: 1 })]
fn rejects_ambiguous_entries(#[case] yaml: &str, #[case] expected: InventoryError) {
    assert_eq!(Inventory::parse(yaml), Err(expected));
}

#[rstest]
fn empty_document_is_an_empty_inventory() {
    assert!(Inventory::parse("  \n").expect("empty parses").servers().is_empty());
}

#[rstest]
fn load_reads_from_disk_and_tags_parse_errors_with_path() {
    let tmp = TempDir::new().expect("tempdir");
    let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 tempdir");
    let good = dir.join("servers.yaml");
    let bad = dir.join("broken.yaml");
    std::fs::write(&good, INVENTORY).expect("write inventory");
    std::fs::write(&bad, "servers: [").expect("write broken inventory");

    assert_eq!(Inventory::load(&good).expect("load").servers().len(), 2);
    let err = Inventory::load(&bad).expect_err("broken yaml");
    assert!(
        matches!(&err, InventoryError::Parse { path, .. } if *path == bad),
        "{err:?}"
    );
}

#[rstest]
fn load_reports_missing_file() {
    let tmp = TempDir::new().expect("tempdir");
    let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 tempdir");
    let err = Inventory::load(&dir.join("absent.yaml")).expect_err("missing file");
    assert!(matches!(err, InventoryError::Read { .. }), "{err:?}");
}
