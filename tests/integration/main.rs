//! Integration tests for packdex
//!
//! A real project on disk driven through the session and the CLI binary.

use packdex_core::{LocalFs, Store};
use packdex_watcher::ProjectSession;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write(root: &Path, path: &str, contents: &str) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, contents).unwrap();
}

fn read(root: &Path, path: &str) -> String {
    std::fs::read_to_string(root.join(path)).unwrap()
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "packdex.toml", "[plugins.custom_commands]\n");
    write(
        root,
        "BP/entities/golem.json",
        r#"{
    // comments are allowed
    "minecraft:entity": {
        "description": { "identifier": "test:golem" },
        "events": { "wake": { "run_command": { "command": "/announce golem" } } },
        "loot": "loot_tables/golem.json",
    }
}"#,
    );
    write(
        root,
        "RP/entity/golem.json",
        r#"{ "minecraft:client_entity": { "description": { "identifier": "test:golem" } } }"#,
    );
    write(root, "BP/commands/announce.json", r#"{ "name": "announce", "commands": ["say $1 is here"] }"#);
    write(root, "BP/functions/start.mcfunction", "# boot\nannounce world\n");
    dir
}

fn packdex(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_packdex"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute packdex")
}

#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_packdex"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("packdex"));
    assert!(stdout.contains("Incremental indexer and build pipeline"));
}

#[test]
fn test_session_builds_and_rebuilds_on_disk() {
    let dir = project();
    let root = dir.path();
    let mut session = ProjectSession::open(Arc::new(LocalFs::new(root))).unwrap();

    let report = session.run_pass().unwrap();
    assert_eq!(report.total_files, 5);
    assert_eq!(read(root, "builds/dev/BP/functions/start.mcfunction"), "# boot\nsay world is here\n");
    let entity: serde_json::Value =
        serde_json::from_str(&read(root, "builds/dev/BP/entities/golem.json")).unwrap();
    assert_eq!(
        entity["minecraft:entity"]["events"]["wake"]["run_command"]["command"],
        serde_json::json!("/say golem is here")
    );
    assert!(!root.join("builds/dev/BP/commands/announce.json").exists());
    assert!(root.join(".packdex/cache.json").exists());

    std::thread::sleep(Duration::from_millis(20));
    write(root, "BP/commands/announce.json", r#"{ "name": "announce", "commands": ["say $1 arrived", "playsound note.harp @a"] }"#);
    let report = session.run_pass().unwrap();
    assert_eq!(report.changed_files, vec!["BP/commands/announce.json"]);
    assert_eq!(report.written.len(), 2);
    assert_eq!(
        read(root, "builds/dev/BP/functions/start.mcfunction"),
        "# boot\nsay world arrived\nplaysound note.harp @a\n"
    );
    let entity: serde_json::Value =
        serde_json::from_str(&read(root, "builds/dev/BP/entities/golem.json")).unwrap();
    assert_eq!(
        entity["minecraft:entity"]["events"]["wake"]["run_command"]["command"],
        serde_json::json!(["/say golem arrived", "/playsound note.harp @a"])
    );
}

#[test]
fn test_cache_survives_a_new_session() {
    let dir = project();
    let root = dir.path();
    ProjectSession::open(Arc::new(LocalFs::new(root)))
        .unwrap()
        .run_pass()
        .unwrap();

    let mut session = ProjectSession::open(Arc::new(LocalFs::new(root))).unwrap();
    let scan = session.index().unwrap();
    assert!(scan.changed_files.is_empty());
    assert!(!scan.persisted);
    assert_eq!(
        session.store().get("BP/entities/golem.json", "entity").unwrap().values("identifier"),
        ["test:golem".to_string()]
    );

    let golem = session.graph().lookup("entity", "BP/entities/golem.json").unwrap();
    assert_eq!(session.graph().to_directory(golem).len(), 2);
}

#[test]
fn test_cli_build_json_and_clear() {
    let dir = project();
    let root = dir.path();

    let output = packdex(root, &["build", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "Granted");
    assert_eq!(report["total_files"], 5);

    let output = packdex(root, &["graph", "BP/entities/golem.json"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("RP/entity/golem.json"));

    let output = packdex(root, &["clear", "--all"]);
    assert!(output.status.success());
    assert!(!root.join(".packdex").exists());
    assert!(!root.join("builds").exists());
}

#[test]
fn test_cli_reports_missing_root() {
    let dir = TempDir::new().unwrap();
    let output = packdex(&dir.path().join("nope"), &["index"]);
    assert!(!output.status.success());
}
