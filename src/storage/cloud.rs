use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use super::write_atomic;
use crate::error::Result;

/// A replicated object store shared between devices.
///
/// Implementations only move bytes; merging is the persistence engine's
/// job.
pub trait CloudStore: Send + Sync {
    /// Read an object. A missing object is `Ok(None)`.
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    /// Replace an object atomically.
    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()>;

    /// Get notified whenever the object called `name` changes.
    fn subscribe(&self, name: &str) -> Result<CloudSubscription>;
}

/// Change notifications for one object. Dropping it ends the subscription.
pub struct CloudSubscription {
    changes: mpsc::UnboundedReceiver<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl CloudSubscription {
    /// Resolves on the next change, `None` once the source is gone.
    pub async fn changed(&mut self) -> Option<()> {
        let next = self.changes.recv().await;
        // collapse notifications that piled up meanwhile
        while self.changes.try_recv().is_ok() {}
        next
    }
}

/// A cloud store backed by a folder that some other agent replicates
/// (a synced drive, a network mount).
pub struct DirectoryCloudStore {
    root: PathBuf,
}

impl DirectoryCloudStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CloudStore for DirectoryCloudStore {
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.root.join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        write_atomic(&self.root.join(name), bytes)
    }

    fn subscribe(&self, name: &str) -> Result<CloudSubscription> {
        fs::create_dir_all(&self.root)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let target = name.to_string();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let relevant = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(OsStr::new(&target)));
                if relevant {
                    let _ = tx.send(());
                }
            }
        })?;
        watcher.watch(&self.root, RecursiveMode::NonRecursive)?;
        debug!(root = %self.root.display(), name, "watching cloud folder");

        Ok(CloudSubscription {
            changes: rx,
            _watcher: Some(watcher),
        })
    }
}

/// In-process cloud store. Every write notifies subscribers of that name.
#[derive(Default)]
pub struct MemoryCloudStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<()>)>>,
}

impl MemoryCloudStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CloudStore for MemoryCloudStore {
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "cloud store lock poisoned"))?;
        Ok(objects.get(name).cloned())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        {
            let mut objects = self
                .objects
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "cloud store lock poisoned"))?;
            objects.insert(name.to_string(), bytes.to_vec());
        }
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|(target, tx)| target != name || tx.send(()).is_ok());
        }
        Ok(())
    }

    fn subscribe(&self, name: &str) -> Result<CloudSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push((name.to_string(), tx));
        }
        Ok(CloudSubscription {
            changes: rx,
            _watcher: None,
        })
    }
}
