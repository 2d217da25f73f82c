//! Uploader (spec §4.9): the single-consumer worker that drains the
//! watcher's event queue through the Held-Paths Monitor and applies
//! mutations via Transport/Bulk Transfer, in strict observed order.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::error;

use crate::error::TransportError;
use crate::exchange::{Exchange, Message};
use crate::held_paths::{HeldPathsMonitor, RemoteMtimeSource};
use crate::model::{ChangeEventType, FsChangeEvent};
use crate::synchronizer::Synchronizer;
use crate::transport::Transport;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Adapts a shared `Transport` into a `RemoteMtimeSource` rooted at
/// `remote_dir`, for use by the Held-Paths Monitor.
pub struct TransportMtimeSource {
    transport: Arc<Mutex<Transport>>,
    remote_dir: PathBuf,
}

impl TransportMtimeSource {
    pub fn new(transport: Arc<Mutex<Transport>>, remote_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            remote_dir: remote_dir.into(),
        }
    }
}

impl RemoteMtimeSource for TransportMtimeSource {
    fn remote_mtime(&self, relative_path: &str) -> anyhow::Result<Option<chrono::DateTime<chrono::Utc>>> {
        let full = self.remote_dir.join(relative_path);
        let transport = self.transport.lock().expect("transport lock poisoned");
        match transport.stat(&full) {
            Ok(stat) => Ok(stat.mtime.map(|secs| chrono::DateTime::from_timestamp(secs as i64, 0).unwrap_or_default())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct Uploader {
    queue: Receiver<FsChangeEvent>,
    synchronizer: Arc<Synchronizer>,
    monitor: HeldPathsMonitor<TransportMtimeSource>,
    exchange: Exchange,
    stop: Arc<AtomicBool>,
}

impl Uploader {
    pub fn new(
        queue: Receiver<FsChangeEvent>,
        synchronizer: Arc<Synchronizer>,
        monitor: HeldPathsMonitor<TransportMtimeSource>,
        exchange: Exchange,
    ) -> Self {
        Self {
            queue,
            synchronizer,
            monitor,
            exchange,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Runs until `stop_handle()` is set, on the calling thread.
    pub fn run(mut self) {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let event = match self.queue.recv_timeout(RECV_TIMEOUT) {
                Ok(event) => event,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            };

            let decision = match self.monitor.should_sync(&event) {
                Ok(v) => v,
                Err(e) => {
                    error!(error = %e, path = %event.path, "failed to evaluate should_sync");
                    self.exchange.publish(Message::ErrorHandlingFsEvent);
                    continue;
                }
            };
            if decision.newly_held {
                self.exchange
                    .publish(Message::HeldFilesChanged(self.monitor.held_paths().clone()));
            }
            if !decision.should_sync {
                continue;
            }

            self.exchange.publish(Message::StartingHandlingFsEvent(event.clone()));
            match self.apply(&event) {
                Ok(()) => {
                    if let Err(e) = self.monitor.has_synced(&event) {
                        error!(error = %e, path = %event.path, "failed to record post-sync timestamp");
                    }
                    self.exchange.publish(Message::FinishedHandlingFsEvent(event));
                }
                Err(e) => {
                    error!(error = %e, path = %event.path, "failed to apply fs event");
                    self.exchange.publish(Message::ErrorHandlingFsEvent);
                }
            }
        }
    }

    /// Dispatch table per spec §4.9.
    fn apply(&self, event: &FsChangeEvent) -> anyhow::Result<()> {
        let transport = self.synchronizer.transport();
        let remote_dir = self.synchronizer.remote_dir().to_string();
        let remote_path = |p: &str| Path::new(&remote_dir).join(p);

        match (event.event_type, event.is_directory) {
            (ChangeEventType::Created | ChangeEventType::Modified, true) => {
                let transport = transport.lock().expect("transport lock poisoned");
                transport.mkdir(&remote_path(&event.path))?;
            }
            (ChangeEventType::Deleted, true) => {
                swallow_not_found(transport.lock().expect("transport lock poisoned").rmdir(&remote_path(&event.path)))?;
            }
            (ChangeEventType::Moved, true) => {
                let dest = event.dest_path().expect("Moved event always carries dest_path");
                let transport = transport.lock().expect("transport lock poisoned");
                transport.rename(&remote_path(&event.path), &remote_path(dest))?;
            }
            (ChangeEventType::Created | ChangeEventType::Modified, false) => {
                self.synchronizer.upload_path(&event.path)?;
            }
            (ChangeEventType::Deleted, false) => {
                swallow_not_found(transport.lock().expect("transport lock poisoned").remove(&remote_path(&event.path)))?;
            }
            (ChangeEventType::Moved, false) => {
                let dest = event.dest_path().expect("Moved event always carries dest_path");
                let transport = transport.lock().expect("transport lock poisoned");
                transport.rename(&remote_path(&event.path), &remote_path(dest))?;
            }
        }
        Ok(())
    }
}

/// ENOENT on `remove`/`rmdir` is logged and swallowed (spec §4.3/§7); any
/// other error propagates.
fn swallow_not_found(result: Result<(), TransportError>) -> anyhow::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            tracing::debug!(error = %e, "ignoring ENOENT on remove/rmdir");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::held_paths::HeldPathsMonitor;
    use crossbeam_channel::unbounded;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// A fake remote clock used to drive Uploader-ordering tests without a
    /// real Transport/SFTP session.
    struct FakeRemote(RefCell<HashMap<String, chrono::DateTime<chrono::Utc>>>);

    impl RemoteMtimeSource for FakeRemote {
        fn remote_mtime(&self, path: &str) -> anyhow::Result<Option<chrono::DateTime<chrono::Utc>>> {
            Ok(self.0.borrow().get(path).copied())
        }
    }

    #[test]
    fn should_sync_consulted_before_has_synced_in_event_order() {
        // Ground the Uploader-ordering property (spec §8) at the Monitor
        // level: a sequence of non-held events is evaluated and recorded
        // in the same order it was produced.
        let remote = FakeRemote(RefCell::new(HashMap::new()));
        let mut monitor = HeldPathsMonitor::new(remote, &[], &[]);

        let events = vec![
            FsChangeEvent::new(ChangeEventType::Created, false, "a.txt"),
            FsChangeEvent::new(ChangeEventType::Created, false, "b.txt"),
            FsChangeEvent::new(ChangeEventType::Modified, false, "a.txt"),
        ];

        let mut processed = Vec::new();
        for event in &events {
            if monitor.should_sync(event).unwrap().should_sync {
                processed.push(event.path.clone());
                monitor.has_synced(event).unwrap();
            }
        }

        assert_eq!(processed, vec!["a.txt", "b.txt", "a.txt"]);
    }

    #[test]
    fn queue_preserves_fifo_order() {
        let (tx, rx) = unbounded::<FsChangeEvent>();
        tx.send(FsChangeEvent::new(ChangeEventType::Created, false, "1")).unwrap();
        tx.send(FsChangeEvent::new(ChangeEventType::Created, false, "2")).unwrap();
        tx.send(FsChangeEvent::new(ChangeEventType::Created, false, "3")).unwrap();

        let mut seen = Vec::new();
        while let Ok(e) = rx.try_recv() {
            seen.push(e.path);
        }
        assert_eq!(seen, vec!["1", "2", "3"]);
    }
}
