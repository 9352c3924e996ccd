use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::warn;

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

enum Command<T> {
    Submit(T),
    Flush(T, oneshot::Sender<()>),
    FlushPending(oneshot::Sender<bool>),
    Discard,
}

/// Queue-plus-timer stage in front of a blocking writer.
///
/// Items submitted within one window collapse into a single call of the
/// sink carrying the most recent item. The window opens at the first
/// submission after an idle period. `flush` bypasses the window and
/// replaces anything pending, so writes always land in submission order.
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Start the worker task. Must be called from within a tokio runtime.
    pub fn spawn<F>(window: Duration, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(window, Arc::new(sink), rx));
        Self { tx }
    }

    pub fn submit(&self, item: T) {
        if self.tx.send(Command::Submit(item)).is_err() {
            warn!("debounce worker stopped, dropping write");
        }
    }

    /// Drop whatever is waiting for the window to close.
    pub fn discard(&self) {
        let _ = self.tx.send(Command::Discard);
    }

    /// Write `item` now and wait for the sink to finish.
    pub async fn flush(&self, item: T) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(item, done_tx)).is_err() {
            warn!("debounce worker stopped, dropping write");
            return;
        }
        let _ = done_rx.await;
    }

    /// Write the pending item, if any, without waiting for its window.
    /// Returns whether anything was written.
    pub async fn flush_pending(&self) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::FlushPending(done_tx)).is_err() {
            return false;
        }
        done_rx.await.unwrap_or(false)
    }
}

async fn run<T: Send + 'static>(
    window: Duration,
    sink: Sink<T>,
    mut rx: mpsc::UnboundedReceiver<Command<T>>,
) {
    let mut pending: Option<T> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => match tokio::time::timeout_at(at, rx.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    deadline = None;
                    if let Some(item) = pending.take() {
                        write(&sink, item).await;
                    }
                    continue;
                }
            },
            None => rx.recv().await,
        };

        match command {
            Some(Command::Submit(item)) => {
                if deadline.is_none() {
                    deadline = Some(Instant::now() + window);
                }
                pending = Some(item);
            }
            Some(Command::Discard) => {
                pending = None;
                deadline = None;
            }
            Some(Command::Flush(item, done)) => {
                pending = None;
                deadline = None;
                write(&sink, item).await;
                let _ = done.send(());
            }
            Some(Command::FlushPending(done)) => {
                deadline = None;
                let wrote = match pending.take() {
                    Some(item) => {
                        write(&sink, item).await;
                        true
                    }
                    None => false,
                };
                let _ = done.send(wrote);
            }
            None => {
                // all handles dropped: last submitted write still lands
                if let Some(item) = pending.take() {
                    write(&sink, item).await;
                }
                break;
            }
        }
    }
}

async fn write<T: Send + 'static>(sink: &Sink<T>, item: T) {
    let sink = Arc::clone(sink);
    if let Err(e) = tokio::task::spawn_blocking(move || sink(item)).await {
        warn!(error = %e, "debounced write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) + Send + Sync + 'static) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink_written = Arc::clone(&written);
        (written, move |n| sink_written.lock().unwrap().push(n))
    }

    #[tokio::test]
    async fn test_burst_collapses_to_last_item() {
        let (written, sink) = recording();
        let debouncer = Debouncer::spawn(Duration::from_millis(100), sink);

        debouncer.submit(1);
        debouncer.submit(2);
        debouncer.submit(3);
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(*written.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_separate_windows_write_separately() {
        let (written, sink) = recording();
        let debouncer = Debouncer::spawn(Duration::from_millis(50), sink);

        debouncer.submit(1);
        tokio::time::sleep(Duration::from_millis(250)).await;
        debouncer.submit(2);
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(*written.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_flush_supersedes_pending() {
        let (written, sink) = recording();
        let debouncer = Debouncer::spawn(Duration::from_millis(100), sink);

        debouncer.submit(1);
        debouncer.flush(9).await;
        assert_eq!(*written.lock().unwrap(), vec![9]);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*written.lock().unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn test_flush_pending_writes_only_when_something_waits() {
        let (written, sink) = recording();
        let debouncer = Debouncer::spawn(Duration::from_millis(100), sink);

        assert!(!debouncer.flush_pending().await);
        debouncer.submit(4);
        assert!(debouncer.flush_pending().await);
        assert_eq!(*written.lock().unwrap(), vec![4]);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!debouncer.flush_pending().await);
        assert_eq!(*written.lock().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_discard_drops_pending_item() {
        let (written, sink) = recording();
        let debouncer = Debouncer::spawn(Duration::from_millis(100), sink);

        debouncer.submit(1);
        debouncer.discard();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(written.lock().unwrap().is_empty());

        debouncer.submit(2);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*written.lock().unwrap(), vec![2]);
    }
}
