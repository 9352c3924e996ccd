use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::codec::{decode_snapshot, to_sorted_json, PathCodec};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::storage::DirectoryCloudStore;
use crate::sync::{DomainStore, SyncOrchestrator};

const DEFAULT_CLOUD_DIR: &str = "cloud";

/// Load the config file if one was given, defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::load(path),
        None => Ok(SyncConfig::default()),
    }
}

pub fn handle_run(config: SyncConfig, cloud_dir: Option<PathBuf>) -> Result<()> {
    let cloud_dir = cloud_dir.unwrap_or_else(|| config.data_dir.join(DEFAULT_CLOUD_DIR));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        info!(
            data_dir = %config.data_dir.display(),
            cloud_dir = %cloud_dir.display(),
            "starting sync"
        );
        let cloud = Arc::new(DirectoryCloudStore::new(cloud_dir));
        let mut sync = SyncOrchestrator::new(config, cloud);
        sync.load_and_start_sync().await;

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                return;
            }
            on_signal.cancel();
        });

        sync.run(cancel).await;
        sync.shutdown().await;
    });
    Ok(())
}

pub fn handle_status(config: SyncConfig, json: bool) -> Result<()> {
    let path = config.local_snapshot_path();
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if json {
                println!("[]");
            } else {
                println!("No snapshot found at {}", path.display());
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let snapshot = decode_snapshot(&bytes, &PathCodec::new(config.home_dir.clone()))?;
    let timestamp = snapshot.timestamp;
    let mut store = DomainStore::from_snapshot(snapshot);
    store.recompute_derived();

    if json {
        let projects: Vec<_> = store
            .projects()
            .iter()
            .map(|p| {
                let d = p.derived();
                json!({
                    "id": p.id.to_string(),
                    "name": p.name,
                    "activeSprint": d.active_sprint,
                    "totalTasks": d.total_tasks,
                    "doneTasks": d.done_tasks,
                    "progress": d.progress,
                })
            })
            .collect();
        print!("{}", String::from_utf8_lossy(&to_sorted_json(&projects)?));
        return Ok(());
    }

    println!("Snapshot {} ({})", timestamp, path.display());
    if store.projects().is_empty() {
        println!("No projects.");
        return Ok(());
    }
    println!();
    for project in store.projects() {
        let d = project.derived();
        println!(
            "  {:<24} {:>3}/{:<3} {:>5.1}%  {}",
            project.name, d.done_tasks, d.total_tasks, d.progress, d.active_sprint
        );
    }
    Ok(())
}
