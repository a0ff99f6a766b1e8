//! Outbound notifications, delivered off the ingestion task.
//!
//! Handlers enqueue text through a [`NotifierHandle`], which never blocks.
//! A single worker task drains the queue and hands each text to a
//! [`NotificationSink`], so a slow endpoint delays notifications but never
//! the line reader.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::NotifyError;

/// Default number of notifications that may wait for delivery.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Something that can deliver one notification text.
///
/// `send` makes exactly one attempt. Callers log failures and move on.
pub trait NotificationSink: Send + Sync + 'static {
    fn send(&self, text: &str) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Cheap to clone; enqueueing never waits.
#[derive(Clone, Debug)]
pub struct NotifierHandle {
    tx: mpsc::Sender<String>,
}

impl NotifierHandle {
    /// Queues `text` for delivery.
    ///
    /// Fails when the queue is full or the worker has stopped. The text is
    /// dropped in both cases.
    pub fn notify(&self, text: impl Into<String>) -> Result<(), NotifyError> {
        self.tx.try_send(text.into()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::WorkerStopped,
        })
    }
}

/// Worker that delivers queued notifications one at a time.
pub struct Notifier<S> {
    sink: S,
    rx: mpsc::Receiver<String>,
}

impl<S: NotificationSink> Notifier<S> {
    /// Creates the worker and the handle that feeds it.
    pub fn new(sink: S, capacity: usize) -> (Self, NotifierHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { sink, rx }, NotifierHandle { tx })
    }

    /// Delivers notifications until every handle is dropped and the queue
    /// is empty.
    pub async fn run(mut self) {
        while let Some(text) = self.rx.recv().await {
            match self.sink.send(&text).await {
                Ok(()) => info!(chars = text.chars().count(), "notification delivered"),
                Err(err) => warn!(error = %err, "notification failed"),
            }
        }
        debug!("notifier exiting");
    }

    /// Takes everything currently queued without delivering it.
    #[cfg(test)]
    pub(crate) fn drain_queued(&mut self) -> Vec<String> {
        let mut queued = Vec::new();
        while let Ok(text) = self.rx.try_recv() {
            queued.push(text);
        }
        queued
    }
}

/// Spawns the delivery worker on the current runtime.
pub fn spawn<S: NotificationSink>(sink: S, capacity: usize) -> (NotifierHandle, JoinHandle<()>) {
    let (notifier, handle) = Notifier::new(sink, capacity);
    let task = tokio::spawn(notifier.run());
    (handle, task)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl NotificationSink for RecordingSink {
        async fn send(&self, text: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(text.to_string());
            if text.starts_with("fail") {
                return Err(NotifyError::Transport("refused".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_survives_failures() {
        let sink = RecordingSink::default();
        let (handle, task) = spawn(sink.clone(), 8);

        handle.notify("first").expect("queue first");
        handle.notify("fail second").expect("queue second");
        handle.notify(String::from("third")).expect("queue third");
        drop(handle);

        task.await.expect("worker should exit cleanly");
        assert_eq!(
            *sink.sent.lock().unwrap(),
            vec!["first", "fail second", "third"]
        );
    }

    #[tokio::test]
    async fn full_queue_drops_the_message() {
        let (_notifier, handle) = Notifier::new(RecordingSink::default(), 1);

        handle.notify("kept").expect("first message fits");
        let err = handle.notify("dropped").expect_err("queue should be full");
        assert!(matches!(err, NotifyError::QueueFull));
    }

    #[tokio::test]
    async fn stopped_worker_is_reported() {
        let (notifier, handle) = Notifier::new(RecordingSink::default(), 4);
        drop(notifier);

        let err = handle.notify("late").expect_err("worker is gone");
        assert!(matches!(err, NotifyError::WorkerStopped));
    }
}
