use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cloud::{CloudStore, CloudSubscription};
use super::debounce::Debouncer;
use super::write_atomic;
use crate::codec::{decode_snapshot, encode_snapshot, PathCodec};
use crate::config::SyncConfig;
use crate::entity::Snapshot;

/// Pick the replica to load: the greater timestamp wins, ties go to the
/// local copy.
pub fn pick_latest(local: Option<Snapshot>, cloud: Option<Snapshot>) -> Option<Snapshot> {
    match (local, cloud) {
        (Some(local), Some(cloud)) => {
            if cloud.is_newer_than(&local) {
                Some(cloud)
            } else {
                Some(local)
            }
        }
        (local, None) => local,
        (None, cloud) => cloud,
    }
}

struct Shared {
    local_path: PathBuf,
    cloud: Arc<dyn CloudStore>,
    cloud_name: String,
    paths: PathCodec,
    physical_writes: AtomicU64,
}

impl Shared {
    fn write_snapshot(&self, snapshot: &Snapshot) {
        let bytes = match encode_snapshot(snapshot, &self.paths) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode snapshot, skipping write");
                return;
            }
        };

        if let Some(cloud) = self.read_cloud() {
            if cloud.is_newer_than(snapshot) {
                info!(
                    ours = %snapshot.timestamp,
                    cloud = %cloud.timestamp,
                    "cloud copy is newer, skipping stale write"
                );
                return;
            }
        }

        let local_ok = match self.write_local(&bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.local_path.display(), error = %e, "local cache write failed");
                false
            }
        };
        let cloud_ok = match self.cloud.write(&self.cloud_name, &bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(name = %self.cloud_name, error = %e, "cloud write failed");
                false
            }
        };
        if !local_ok && !cloud_ok {
            return;
        }
        self.physical_writes.fetch_add(1, Ordering::SeqCst);
        debug!(timestamp = %snapshot.timestamp, bytes = bytes.len(), local_ok, cloud_ok, "snapshot written");
    }

    fn write_local(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&self.local_path, bytes)
    }

    fn read_local(&self) -> Option<Snapshot> {
        let bytes = match fs::read(&self.local_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.local_path.display(), error = %e, "local cache unreadable");
                return None;
            }
        };
        self.decode("local", &bytes)
    }

    fn read_cloud_bytes(&self) -> Option<Vec<u8>> {
        match self.cloud.read(&self.cloud_name) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(name = %self.cloud_name, error = %e, "cloud copy unreadable");
                None
            }
        }
    }

    fn read_cloud(&self) -> Option<Snapshot> {
        let bytes = self.read_cloud_bytes()?;
        self.decode("cloud", &bytes)
    }

    fn decode(&self, source: &str, bytes: &[u8]) -> Option<Snapshot> {
        match decode_snapshot(bytes, &self.paths) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(source, error = %e, "snapshot undecodable, treating as absent");
                None
            }
        }
    }

    /// Adopt the cloud copy if it is strictly newer than the local cache.
    fn check_cloud(&self) -> Option<Snapshot> {
        let bytes = self.read_cloud_bytes()?;
        let cloud = self.decode("cloud", &bytes)?;
        if let Some(local) = self.read_local() {
            if !cloud.is_newer_than(&local) {
                return None;
            }
        }
        if let Err(e) = self.write_local(&bytes) {
            warn!(path = %self.local_path.display(), error = %e, "failed to refresh local cache");
        }
        Some(cloud)
    }
}

struct Monitor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Whole-snapshot persistence to a local cache file and a cloud store.
///
/// No operation here returns an error: unreadable or undecodable data is
/// treated as absent and failed writes are logged.
pub struct PersistenceEngine {
    shared: Arc<Shared>,
    writer: Debouncer<Snapshot>,
    poll_interval: Duration,
    monitor: Option<Monitor>,
}

impl PersistenceEngine {
    /// Must be called from within a tokio runtime.
    pub fn new(config: &SyncConfig, cloud: Arc<dyn CloudStore>) -> Self {
        let shared = Arc::new(Shared {
            local_path: config.local_snapshot_path(),
            cloud,
            cloud_name: config.snapshot_file.clone(),
            paths: PathCodec::new(config.home_dir.clone()),
            physical_writes: AtomicU64::new(0),
        });
        let sink_shared = Arc::clone(&shared);
        let writer = Debouncer::spawn(config.save_debounce(), move |snapshot: Snapshot| {
            sink_shared.write_snapshot(&snapshot)
        });

        Self {
            shared,
            writer,
            poll_interval: config.cloud_poll_interval(),
            monitor: None,
        }
    }

    /// Queue a snapshot; only the latest one per debounce window is written.
    pub fn save(&self, snapshot: Snapshot) {
        self.writer.submit(snapshot);
    }

    /// Write now, superseding anything still queued.
    pub async fn save_immediately(&self, snapshot: Snapshot) {
        self.writer.flush(snapshot).await;
    }

    /// Write whatever is still queued without waiting for its window.
    /// Returns whether anything was pending.
    pub async fn flush_pending(&self) -> bool {
        self.writer.flush_pending().await
    }

    /// Drop the queued snapshot, if any, so it never reaches disk.
    pub fn discard_pending(&self) {
        self.writer.discard();
    }

    /// Read both replicas and return the newer one.
    pub async fn load(&self) -> Option<Snapshot> {
        let shared = Arc::clone(&self.shared);
        let read = tokio::task::spawn_blocking(move || (shared.read_local(), shared.read_cloud()));
        let (local, cloud) = match read.await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "snapshot load task failed");
                return None;
            }
        };

        debug!(
            local = ?local.as_ref().map(|s| s.timestamp),
            cloud = ?cloud.as_ref().map(|s| s.timestamp),
            "loaded replicas"
        );
        pick_latest(local, cloud)
    }

    /// Watch the cloud copy. Whenever it becomes strictly newer than the
    /// local cache, the cache is overwritten and `on_change` receives the
    /// cloud snapshot. Push notifications are backed up by a periodic poll.
    pub fn start_monitoring<F>(&mut self, on_change: F)
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        self.stop_monitoring();

        let subscription = match self.shared.cloud.subscribe(&self.shared.cloud_name) {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(error = %e, "cloud change notifications unavailable, polling only");
                None
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(monitor_loop(
            Arc::clone(&self.shared),
            subscription,
            self.poll_interval,
            cancel.clone(),
            on_change,
        ));
        self.monitor = Some(Monitor { cancel, task });
    }

    pub fn stop_monitoring(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.cancel.cancel();
            drop(monitor.task);
        }
    }

    /// Number of snapshots physically written since startup.
    pub fn physical_writes(&self) -> u64 {
        self.shared.physical_writes.load(Ordering::SeqCst)
    }
}

impl Drop for PersistenceEngine {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

async fn monitor_loop<F>(
    shared: Arc<Shared>,
    mut subscription: Option<CloudSubscription>,
    poll_interval: Duration,
    cancel: CancellationToken,
    on_change: F,
) where
    F: Fn(Snapshot) + Send + Sync + 'static,
{
    let mut poll = tokio::time::interval(poll_interval);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = next_change(&mut subscription) => {}
            _ = poll.tick() => {}
        }

        let check_shared = Arc::clone(&shared);
        match tokio::task::spawn_blocking(move || check_shared.check_cloud()).await {
            Ok(Some(snapshot)) => {
                info!(timestamp = %snapshot.timestamp, "newer cloud snapshot adopted");
                on_change(snapshot);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cloud check failed"),
        }
    }
    debug!("cloud monitoring stopped");
}

async fn next_change(subscription: &mut Option<CloudSubscription>) {
    if let Some(sub) = subscription {
        if sub.changed().await.is_some() {
            return;
        }
        *subscription = None;
    }
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Project;
    use crate::storage::{DirectoryCloudStore, MemoryCloudStore};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn snapshot_at(secs: i64, name: &str) -> Snapshot {
        let mut snapshot = Snapshot::empty(Utc.timestamp_opt(secs, 0).unwrap());
        snapshot.projects.push(Project::new(name));
        snapshot
    }

    fn test_config(tmp: &TempDir) -> SyncConfig {
        let mut config = SyncConfig::with_data_dir(tmp.path().join("data"));
        config.home_dir = tmp.path().to_path_buf();
        config.save_debounce_ms = 100;
        config
    }

    fn write_cloud(cloud: &MemoryCloudStore, config: &SyncConfig, snapshot: &Snapshot) {
        let bytes = encode_snapshot(snapshot, &PathCodec::new(config.home_dir.clone())).unwrap();
        cloud.write(&config.snapshot_file, &bytes).unwrap();
    }

    fn write_local(config: &SyncConfig, snapshot: &Snapshot) {
        let bytes = encode_snapshot(snapshot, &PathCodec::new(config.home_dir.clone())).unwrap();
        fs::create_dir_all(&config.data_dir).unwrap();
        fs::write(config.local_snapshot_path(), bytes).unwrap();
    }

    #[test]
    fn test_pick_latest_prefers_newer_cloud() {
        let local = snapshot_at(100, "local");
        let cloud = snapshot_at(200, "cloud");
        let picked = pick_latest(Some(local), Some(cloud.clone())).unwrap();
        assert_eq!(picked, cloud);
    }

    #[test]
    fn test_pick_latest_tie_goes_to_local() {
        let local = snapshot_at(100, "local");
        let cloud = snapshot_at(100, "cloud");
        let picked = pick_latest(Some(local.clone()), Some(cloud)).unwrap();
        assert_eq!(picked, local);
    }

    #[test]
    fn test_pick_latest_single_or_none() {
        let only = snapshot_at(5, "only");
        assert_eq!(pick_latest(Some(only.clone()), None), Some(only.clone()));
        assert_eq!(pick_latest(None, Some(only.clone())), Some(only));
        assert_eq!(pick_latest(None, None), None);
    }

    #[tokio::test]
    async fn test_load_returns_newer_cloud() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let cloud = Arc::new(MemoryCloudStore::new());
        write_local(&config, &snapshot_at(100, "local"));
        write_cloud(&cloud, &config, &snapshot_at(200, "cloud"));

        let engine = PersistenceEngine::new(&config, cloud);
        let loaded = engine.load().await.unwrap();
        assert_eq!(loaded.projects[0].name, "cloud");
    }

    #[tokio::test]
    async fn test_load_treats_corrupt_local_as_absent() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let cloud = Arc::new(MemoryCloudStore::new());
        fs::create_dir_all(&config.data_dir).unwrap();
        fs::write(config.local_snapshot_path(), b"{ truncated").unwrap();
        write_cloud(&cloud, &config, &snapshot_at(50, "cloud"));

        let engine = PersistenceEngine::new(&config, cloud);
        let loaded = engine.load().await.unwrap();
        assert_eq!(loaded.projects[0].name, "cloud");
    }

    #[tokio::test]
    async fn test_load_with_nothing_is_none() {
        let tmp = TempDir::new().unwrap();
        let engine = PersistenceEngine::new(&test_config(&tmp), Arc::new(MemoryCloudStore::new()));
        assert!(engine.load().await.is_none());
    }

    #[tokio::test]
    async fn test_three_saves_in_one_window_write_once() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let cloud = Arc::new(MemoryCloudStore::new());
        let engine = PersistenceEngine::new(&config, cloud.clone());

        engine.save(snapshot_at(1, "first"));
        engine.save(snapshot_at(2, "second"));
        engine.save(snapshot_at(3, "third"));
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        assert_eq!(engine.physical_writes(), 1);
        let bytes = cloud.read(&config.snapshot_file).unwrap().unwrap();
        let written = decode_snapshot(&bytes, &PathCodec::new(config.home_dir.clone())).unwrap();
        assert_eq!(written.projects[0].name, "third");
        assert!(config.local_snapshot_path().exists());
    }

    #[tokio::test]
    async fn test_save_immediately_writes_both_replicas() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let cloud = Arc::new(MemoryCloudStore::new());
        let engine = PersistenceEngine::new(&config, cloud.clone());

        engine.save_immediately(snapshot_at(10, "now")).await;

        assert_eq!(engine.physical_writes(), 1);
        assert!(cloud.read(&config.snapshot_file).unwrap().is_some());
        let local = fs::read(config.local_snapshot_path()).unwrap();
        let local = decode_snapshot(&local, &PathCodec::new(config.home_dir.clone())).unwrap();
        assert_eq!(local.projects[0].name, "now");
    }

    #[tokio::test]
    async fn test_stale_snapshot_never_overwrites_newer_cloud() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let cloud = Arc::new(MemoryCloudStore::new());
        write_cloud(&cloud, &config, &snapshot_at(200, "remote"));
        let engine = PersistenceEngine::new(&config, cloud.clone());

        engine.save_immediately(snapshot_at(100, "old local")).await;

        assert_eq!(engine.physical_writes(), 0);
        let bytes = cloud.read(&config.snapshot_file).unwrap().unwrap();
        let kept = decode_snapshot(&bytes, &PathCodec::new(config.home_dir.clone())).unwrap();
        assert_eq!(kept.projects[0].name, "remote");
        assert!(!config.local_snapshot_path().exists());
    }

    #[tokio::test]
    async fn test_discarded_snapshot_is_not_written() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let cloud = Arc::new(MemoryCloudStore::new());
        let engine = PersistenceEngine::new(&config, cloud.clone());

        engine.save(snapshot_at(1, "queued"));
        engine.discard_pending();
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;

        assert_eq!(engine.physical_writes(), 0);
        assert!(cloud.read(&config.snapshot_file).unwrap().is_none());
        assert!(!engine.flush_pending().await);
    }

    #[tokio::test]
    async fn test_flush_pending_writes_queued_snapshot_once() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let engine = PersistenceEngine::new(&config, Arc::new(MemoryCloudStore::new()));

        engine.save(snapshot_at(1, "queued"));
        assert!(engine.flush_pending().await);
        assert_eq!(engine.physical_writes(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!engine.flush_pending().await);
        assert_eq!(engine.physical_writes(), 1);
    }

    #[tokio::test]
    async fn test_failed_writes_are_not_counted() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, b"a file, not a folder").unwrap();

        let mut config = test_config(&tmp);
        config.data_dir = blocker.join("data");
        let cloud = Arc::new(DirectoryCloudStore::new(blocker.join("cloud")));
        let engine = PersistenceEngine::new(&config, cloud);

        engine.save_immediately(snapshot_at(10, "nowhere")).await;
        assert_eq!(engine.physical_writes(), 0);
    }

    #[tokio::test]
    async fn test_write_counts_when_only_local_lands() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, b"a file, not a folder").unwrap();

        let config = test_config(&tmp);
        let cloud = Arc::new(DirectoryCloudStore::new(blocker.join("cloud")));
        let engine = PersistenceEngine::new(&config, cloud);

        engine.save_immediately(snapshot_at(10, "local only")).await;
        assert_eq!(engine.physical_writes(), 1);
        assert!(config.local_snapshot_path().exists());
    }

    #[tokio::test]
    async fn test_monitoring_adopts_newer_cloud_copy() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let cloud = Arc::new(MemoryCloudStore::new());
        let mut engine = PersistenceEngine::new(&config, cloud.clone());
        engine.save_immediately(snapshot_at(100, "mine")).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.start_monitoring(move |snapshot| {
            let _ = tx.send(snapshot);
        });

        let newer = Snapshot {
            timestamp: Utc.timestamp_opt(100, 0).unwrap() + ChronoDuration::seconds(60),
            ..snapshot_at(0, "theirs")
        };
        write_cloud(&cloud, &config, &newer);

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.projects[0].name, "theirs");

        let local = fs::read(config.local_snapshot_path()).unwrap();
        let local = decode_snapshot(&local, &PathCodec::new(config.home_dir.clone())).unwrap();
        assert_eq!(local.timestamp, newer.timestamp);
        engine.stop_monitoring();
    }

    #[tokio::test]
    async fn test_monitoring_ignores_older_cloud_copy() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let cloud = Arc::new(MemoryCloudStore::new());
        let mut engine = PersistenceEngine::new(&config, cloud.clone());
        engine.save_immediately(snapshot_at(100, "mine")).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.start_monitoring(move |snapshot| {
            let _ = tx.send(snapshot);
        });
        write_cloud(&cloud, &config, &snapshot_at(50, "stale"));

        let received = tokio::time::timeout(std::time::Duration::from_millis(300), rx.recv()).await;
        assert!(received.is_err());
    }
}
