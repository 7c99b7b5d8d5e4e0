use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn autobackup(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("autobackup").unwrap();
    cmd.env_remove("AUTOBACKUP_BACKEND")
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(data_dir.path());
    cmd
}

fn write_state(data_dir: &TempDir) {
    let state = serde_json::json!({
        "chat-next-web-store": {
            "sessions": [
                { "id": "s1", "messages": [{ "id": "m1" }, { "id": "m2" }] }
            ]
        },
        "app-config": {},
        "access-control": {}
    });
    std::fs::write(
        data_dir.path().join("state.json"),
        serde_json::to_string(&state).unwrap(),
    )
    .unwrap();
}

#[test]
fn status_without_backups() {
    let dir = TempDir::new().unwrap();

    autobackup(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Enabled:     No"))
        .stdout(predicate::str::contains("Last backup: never"));
}

#[test]
fn config_clamps_and_persists() {
    let dir = TempDir::new().unwrap();

    autobackup(&dir)
        .args(["config", "--enable", "--interval", "500", "--max-backups", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Interval: 168h"))
        .stdout(predicate::str::contains("Keep:     3"));

    autobackup(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Enabled:  true"))
        .stdout(predicate::str::contains("Interval: 168h"));
}

#[test]
fn now_then_list_shows_backup() {
    let dir = TempDir::new().unwrap();
    write_state(&dir);

    autobackup(&dir)
        .arg("now")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup created: AutoBackup-"));

    autobackup(&dir)
        .args(["list", "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 sessions, 2 messages"))
        .stdout(predicate::str::contains("Total: 1 backup(s)"));
}

#[test]
fn restore_requires_force() {
    let dir = TempDir::new().unwrap();
    write_state(&dir);

    autobackup(&dir).arg("now").assert().success();

    autobackup(&dir)
        .args(["restore", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));

    autobackup(&dir)
        .args(["restore", "latest", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored 1 sessions with 2 messages."));
}

#[test]
fn clear_with_key_value_backend() {
    let dir = TempDir::new().unwrap();
    write_state(&dir);

    autobackup(&dir)
        .args(["--backend", "kv", "now"])
        .assert()
        .success();
    assert!(dir.path().join("autobackup-kv.json").exists());

    autobackup(&dir)
        .args(["--backend", "kv", "clear", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 1 backup(s)."));

    autobackup(&dir)
        .args(["--backend", "kv", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found."));
}

#[test]
fn restore_unknown_backup_fails() {
    let dir = TempDir::new().unwrap();

    autobackup(&dir)
        .args(["restore", "deadbeef", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
