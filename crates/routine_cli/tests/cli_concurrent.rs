use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("routine-{nanos}-{name}"))
}

fn spawn_add(store: &Path, owner: &str, name: &str, start: &str, end: &str) -> Child {
    Command::new(env!("CARGO_BIN_EXE_routine"))
        .env("ROUTINE_STORE_PATH", store)
        .env("ROUTINE_CONFIG_PATH", store.join("config.json"))
        .env_remove("RUST_LOG")
        .args(["--owner", owner, "add", name, "--start", start, "--end", end])
        .args(["--date", "2025-03-22", "--json"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn routine")
}

fn list_count(store: &Path, owner: &str) -> usize {
    let output = Command::new(env!("CARGO_BIN_EXE_routine"))
        .env("ROUTINE_STORE_PATH", store)
        .env("ROUTINE_CONFIG_PATH", store.join("config.json"))
        .args(["--owner", owner, "list", "--json"])
        .output()
        .expect("failed to run list");
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    value.as_array().unwrap().len()
}

#[test]
fn racing_overlapping_adds_commit_exactly_one() {
    let store = temp_path("race-same-owner");
    let children: Vec<Child> = (0..4)
        .map(|n| spawn_add(&store, "alice", &format!("Task {n}"), "09:00", "10:00"))
        .collect();

    let mut committed = 0;
    let mut conflicts = 0;
    for child in children {
        let output = child.wait_with_output().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        if output.status.success() {
            committed += 1;
        } else {
            assert_eq!(value["error"]["code"], "overlap_conflict");
            conflicts += 1;
        }
    }
    let stored = list_count(&store, "alice");
    std::fs::remove_dir_all(&store).ok();

    assert_eq!(committed, 1);
    assert_eq!(conflicts, 3);
    assert_eq!(stored, 1);
}

#[test]
fn racing_adds_for_different_owners_all_commit() {
    let store = temp_path("race-owners");
    let children: Vec<Child> = ["alice", "bob", "carol"]
        .into_iter()
        .map(|owner| spawn_add(&store, owner, "Read", "09:00", "10:00"))
        .collect();

    for child in children {
        let output = child.wait_with_output().unwrap();
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    let counts: Vec<usize> = ["alice", "bob", "carol"]
        .into_iter()
        .map(|owner| list_count(&store, owner))
        .collect();
    std::fs::remove_dir_all(&store).ok();

    assert_eq!(counts, vec![1, 1, 1]);
}
