use std::fs::{self, File};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tempfile::TempDir;
use tracksync::bridge::TASKS_FILE;
use tracksync::codec::{decode_snapshot, encode_snapshot, encode_task_list, PathCodec};
use tracksync::entity::{Project, Snapshot, Task, TaskStatus};
use tracksync::{CloudStore, DirectoryCloudStore, FileBridge, SyncConfig, SyncOrchestrator};

fn tracksync_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tracksync"))
}

fn write_config(tmp: &TempDir) -> std::path::PathBuf {
    let path = tmp.path().join("config.yaml");
    let yaml = format!(
        "data_dir: {}\nhome_dir: {}\n",
        tmp.path().join("data").display(),
        tmp.path().display()
    );
    fs::write(&path, yaml).unwrap();
    path
}

fn test_config(tmp: &TempDir, data: &str) -> SyncConfig {
    let mut config = SyncConfig::with_data_dir(tmp.path().join(data));
    config.home_dir = tmp.path().to_path_buf();
    config.save_debounce_ms = 50;
    config.settle_delay_ms = 20;
    config
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}

#[test]
fn test_status_without_snapshot() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp);

    let output = tracksync_cmd()
        .args(["--config", config.to_str().unwrap(), "status"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No snapshot found"));
}

#[test]
fn test_status_json_reports_progress() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(&tmp);

    let project = Project::new("Website");
    let mut snapshot = Snapshot::empty(Utc::now());
    snapshot.tasks = vec![
        Task::new("design", Some(project.id)).with_status(TaskStatus::Done),
        Task::new("build", Some(project.id)),
    ];
    snapshot.projects.push(project);
    let bytes = encode_snapshot(&snapshot, &PathCodec::new(tmp.path().to_path_buf())).unwrap();
    fs::create_dir_all(tmp.path().join("data")).unwrap();
    fs::write(tmp.path().join("data").join("tracksync.json"), bytes).unwrap();

    let output = tracksync_cmd()
        .args(["--config", config_path.to_str().unwrap(), "status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let projects = value.as_array().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["name"], "Website");
    assert_eq!(projects[0]["totalTasks"], 2);
    assert_eq!(projects[0]["doneTasks"], 1);
    assert_eq!(projects[0]["progress"], 50.0);
}

#[test]
fn test_status_with_corrupt_snapshot_fails() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp);
    fs::create_dir_all(tmp.path().join("data")).unwrap();
    fs::write(tmp.path().join("data").join("tracksync.json"), b"not json").unwrap();

    let output = tracksync_cmd()
        .args(["--config", config.to_str().unwrap(), "status"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error"));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.yaml");
    fs::write(&path, "sprint_length_days: 0\n").unwrap();

    let output = tracksync_cmd()
        .args(["--config", path.to_str().unwrap(), "status"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sprint_length_days"));
}

#[tokio::test]
async fn test_second_device_loads_first_devices_changes() {
    let tmp = TempDir::new().unwrap();
    let cloud = Arc::new(DirectoryCloudStore::new(tmp.path().join("cloud")));

    let mut laptop = SyncOrchestrator::new(test_config(&tmp, "laptop"), cloud.clone());
    laptop.load_and_start_sync().await;
    let pid = laptop.add_project(Project::new("Shared"));
    laptop.add_task(Task::new("written on the laptop", Some(pid)));
    settle().await;
    laptop.shutdown().await;

    let mut desktop = SyncOrchestrator::new(test_config(&tmp, "desktop"), cloud);
    desktop.load_and_start_sync().await;

    let store = desktop.store();
    assert_eq!(store.projects().len(), 1);
    assert_eq!(store.projects()[0].name, "Shared");
    assert_eq!(store.tasks_for(pid).count(), 1);
    assert_eq!(store.projects()[0].derived().total_tasks, 1);
}

fn external_write(path: &Path, bytes: &[u8]) {
    fs::write(path, bytes).unwrap();
    let later = SystemTime::now() + Duration::from_secs(5);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(later)
        .unwrap();
}

#[tokio::test]
async fn test_bridge_edit_flows_to_cloud() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("code").join("site");
    fs::create_dir_all(&source).unwrap();
    let config = test_config(&tmp, "data");
    let cloud = Arc::new(DirectoryCloudStore::new(tmp.path().join("cloud")));

    let mut sync = SyncOrchestrator::new(config.clone(), cloud.clone());
    sync.load_and_start_sync().await;
    let mut project = Project::new("Site");
    project.source_path = Some(source);
    let pid = sync.add_project(project.clone());
    sync.add_task(Task::new("unrelated", None));
    settle().await;

    let dir = FileBridge::bridge_dir(&project).unwrap();
    let edited = vec![
        Task::new("from the agent", None),
        Task::new("also from the agent", None).with_status(TaskStatus::Done),
    ];
    external_write(&dir.join(TASKS_FILE), &encode_task_list(&edited).unwrap());

    for _ in 0..60 {
        sync.drain_events();
        if sync.store().tasks_for(pid).count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(sync.store().tasks_for(pid).count(), 2);
    assert_eq!(sync.store().project(pid).unwrap().derived().progress, 50.0);
    assert_eq!(sync.store().tasks().len(), 3);

    settle().await;
    let bytes = cloud.read(&config.snapshot_file).unwrap().unwrap();
    let written = decode_snapshot(&bytes, &PathCodec::new(config.home_dir.clone())).unwrap();
    let titles: Vec<&str> = written
        .tasks
        .iter()
        .filter(|t| t.belongs_to(pid))
        .map(|t| t.title.as_str())
        .collect();
    assert_eq!(titles, vec!["from the agent", "also from the agent"]);
    sync.shutdown().await;
}
