use std::path::PathBuf;
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{BridgeCore, BridgeEvent};
use crate::error::Result;

/// A live watch on one project's bridge folder. Dropping it releases the
/// OS watch handle and stops the task.
pub(crate) struct WatchHandle {
    pub(crate) dir: PathBuf,
    _watcher: RecommendedWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub(crate) fn start(
        core: Arc<BridgeCore>,
        project_id: Uuid,
        dir: PathBuf,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Result<Self> {
        let (fs_tx, fs_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    let _ = fs_tx.send(());
                }
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(watch_loop(
            core,
            project_id,
            dir.clone(),
            fs_rx,
            cancel.clone(),
            events,
        ));

        Ok(Self {
            dir,
            _watcher: watcher,
            cancel,
            task,
        })
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

async fn watch_loop(
    core: Arc<BridgeCore>,
    project_id: Uuid,
    dir: PathBuf,
    mut fs_events: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<BridgeEvent>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = fs_events.recv() => {
                if received.is_none() {
                    break;
                }
            }
        }

        // let a non-atomic writer finish before reading
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(core.settle_delay) => {}
        }
        while fs_events.try_recv().is_ok() {}

        let check_core = Arc::clone(&core);
        let check_dir = dir.clone();
        let found = tokio::task::spawn_blocking(move || {
            check_core.check_for_changes(project_id, &check_dir)
        })
        .await;

        match found {
            Ok(found) => {
                for event in found {
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!(%project_id, error = %e, "bridge change check failed"),
        }
    }
    debug!(%project_id, "bridge watch stopped");
}
