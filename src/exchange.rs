//! Exchange (spec §4.1, §6.3): a typed, process-wide pub/sub bus.
//!
//! Rendered as a tagged `Message` enum with a fieldless `MessageKind`
//! companion for subscription keys, per spec §9's recommendation over a
//! stringly-typed `(type, payload)` pair. `crossbeam_channel` gives the
//! unbounded, never-blocking `publish` spec §4.1 requires (it's already a
//! workspace dependency across the broader rsync reimplementation in this
//! retrieval pack).

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, info};

use crate::model::{Difference, FsChangeEvent, HeldPathSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    StopCalled,
    VerifyRemoteDirectory,
    RemoteDirectorySet,
    PromptForRemoteDirectory,
    StartInitialFileTreeWalk,
    WalkStatusChange,
    DisplayDifferences,
    RefreshDifferences,
    SyncLocalToPlatform,
    SyncPlatformToLocal,
    StartWatchSync,
    StopWatchSync,
    DownInWatchSync,
    StartWatchSyncMainLoop,
    HeldFilesChanged,
    StartingHandlingFsEvent,
    FinishedHandlingFsEvent,
    ErrorHandlingFsEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStatus {
    Connecting,
    LocalWalk,
    RemoteWalk,
    CalculatingDifferences,
}

/// One message in the catalogue of spec §6.3, carrying its payload.
#[derive(Debug, Clone)]
pub enum Message {
    StopCalled,
    VerifyRemoteDirectory(Option<String>),
    RemoteDirectorySet(String),
    PromptForRemoteDirectory,
    StartInitialFileTreeWalk,
    WalkStatusChange(WalkStatus),
    DisplayDifferences(Vec<Difference>),
    RefreshDifferences,
    SyncLocalToPlatform,
    SyncPlatformToLocal,
    StartWatchSync,
    StopWatchSync,
    DownInWatchSync,
    StartWatchSyncMainLoop,
    HeldFilesChanged(HeldPathSet),
    StartingHandlingFsEvent(FsChangeEvent),
    FinishedHandlingFsEvent(FsChangeEvent),
    ErrorHandlingFsEvent,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::StopCalled => MessageKind::StopCalled,
            Message::VerifyRemoteDirectory(_) => MessageKind::VerifyRemoteDirectory,
            Message::RemoteDirectorySet(_) => MessageKind::RemoteDirectorySet,
            Message::PromptForRemoteDirectory => MessageKind::PromptForRemoteDirectory,
            Message::StartInitialFileTreeWalk => MessageKind::StartInitialFileTreeWalk,
            Message::WalkStatusChange(_) => MessageKind::WalkStatusChange,
            Message::DisplayDifferences(_) => MessageKind::DisplayDifferences,
            Message::RefreshDifferences => MessageKind::RefreshDifferences,
            Message::SyncLocalToPlatform => MessageKind::SyncLocalToPlatform,
            Message::SyncPlatformToLocal => MessageKind::SyncPlatformToLocal,
            Message::StartWatchSync => MessageKind::StartWatchSync,
            Message::StopWatchSync => MessageKind::StopWatchSync,
            Message::DownInWatchSync => MessageKind::DownInWatchSync,
            Message::StartWatchSyncMainLoop => MessageKind::StartWatchSyncMainLoop,
            Message::HeldFilesChanged(_) => MessageKind::HeldFilesChanged,
            Message::StartingHandlingFsEvent(_) => MessageKind::StartingHandlingFsEvent,
            Message::FinishedHandlingFsEvent(_) => MessageKind::FinishedHandlingFsEvent,
            Message::ErrorHandlingFsEvent => MessageKind::ErrorHandlingFsEvent,
        }
    }
}

pub type Handler = Arc<dyn Fn(&Message) + Send + Sync + 'static>;

struct Subscription {
    id: u64,
    kind: MessageKind,
    handler: Handler,
}

#[derive(Clone)]
pub struct Exchange {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    subscribers: Arc<Mutex<Vec<Subscription>>>,
    next_id: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
}

pub struct SubscriptionId(u64);

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl Exchange {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enqueue a message; returns immediately and never fails.
    pub fn publish(&self, message: Message) {
        // An unbounded channel only errs if every receiver was dropped,
        // which only happens after `stop`; publishing past that point is
        // a no-op rather than a panic.
        let _ = self.sender.send(message);
    }

    pub fn subscribe(
        &self,
        kind: MessageKind,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .expect("exchange subscriber lock poisoned")
            .push(Subscription {
                id,
                kind,
                handler: Arc::new(handler),
            });
        SubscriptionId(id)
    }

    /// Idempotent; removes at most one entry across all message kinds.
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        let mut subs = self.subscribers.lock().expect("exchange subscriber lock poisoned");
        if let Some(pos) = subs.iter().position(|s| s.id == id.0) {
            subs.remove(pos);
        }
    }

    /// Runs the dispatcher loop on the calling thread until `stop()` is
    /// called and the queue drains. Intended to be spawned on its own
    /// thread by the caller.
    pub fn run(&self) {
        loop {
            match self.receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(message) => self.dispatch(message),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    if self.stop.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn dispatch(&self, message: Message) {
        let kind = message.kind();
        // Snapshot the matching handlers under the lock (cheap Arc
        // clones), then invoke outside it so a handler that
        // subscribes/unsubscribes mid-dispatch can't deadlock.
        let matching: Vec<Handler> = {
            let subs = self.subscribers.lock().expect("exchange subscriber lock poisoned");
            subs.iter()
                .filter(|s| s.kind == kind)
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };
        if !matching.is_empty() {
            info!(?kind, subscribers = matching.len(), "dispatching message");
        }
        for handler in matching {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&message))) {
                error!(?kind, panic = ?payload, "subscriber handler panicked; continuing");
            }
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn unsubscribed_handler_receives_no_further_messages() {
        let exchange = Exchange::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let sub = exchange.subscribe(
            MessageKind::StopCalled,
            Box::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        exchange.dispatch(Message::StopCalled);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        exchange.unsubscribe(&sub);
        exchange.dispatch(Message::StopCalled);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_subscribers_are_unaffected_by_unsubscribe() {
        let exchange = Exchange::new();
        let a_count = Arc::new(AtomicUsize::new(0));
        let b_count = Arc::new(AtomicUsize::new(0));

        let a_clone = Arc::clone(&a_count);
        let sub_a = exchange.subscribe(MessageKind::RefreshDifferences, Box::new(move |_| {
            a_clone.fetch_add(1, Ordering::SeqCst);
        }));
        let b_clone = Arc::clone(&b_count);
        exchange.subscribe(MessageKind::RefreshDifferences, Box::new(move |_| {
            b_clone.fetch_add(1, Ordering::SeqCst);
        }));

        exchange.unsubscribe(&sub_a);
        exchange.dispatch(Message::RefreshDifferences);

        assert_eq!(a_count.load(Ordering::SeqCst), 0);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_panic_is_caught_and_does_not_stop_dispatch() {
        let exchange = Exchange::new();
        exchange.subscribe(MessageKind::StopCalled, Box::new(|_| panic!("boom")));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        exchange.subscribe(MessageKind::StopCalled, Box::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        exchange.dispatch(Message::StopCalled);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_and_run_delivers_in_fifo_order() {
        let exchange = Exchange::new();
        let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let order_clone = Arc::clone(&order);
        exchange.subscribe(
            MessageKind::WalkStatusChange,
            Box::new(move |msg| {
                if let Message::WalkStatusChange(status) = msg {
                    let tag = match status {
                        WalkStatus::Connecting => 0,
                        WalkStatus::LocalWalk => 1,
                        WalkStatus::RemoteWalk => 2,
                        WalkStatus::CalculatingDifferences => 3,
                    };
                    order_clone.lock().unwrap().push(tag);
                }
            }),
        );

        exchange.publish(Message::WalkStatusChange(WalkStatus::Connecting));
        exchange.publish(Message::WalkStatusChange(WalkStatus::LocalWalk));
        exchange.publish(Message::WalkStatusChange(WalkStatus::RemoteWalk));
        exchange.publish(Message::WalkStatusChange(WalkStatus::CalculatingDifferences));
        exchange.stop();

        let handle = {
            let exchange = exchange.clone();
            std::thread::spawn(move || exchange.run())
        };
        handle.join().unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }
}
