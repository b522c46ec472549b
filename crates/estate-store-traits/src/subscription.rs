//! Live subscriptions

use std::fmt;

use flume::Receiver;
use serde_json::Value;

use crate::{StoreError, StorePath};

/// One delivery: the full node at the subscribed path (`None` when empty) or
/// a backend error.
pub type SnapshotEvent = Result<Option<Value>, StoreError>;

type Release = Box<dyn FnOnce() + Send + 'static>;

/// Handle on a live subscription.
///
/// The backend listener is released exactly once: by [`Subscription::unsubscribe`],
/// which consumes the handle, or when the handle is dropped.
pub struct Subscription {
    path: StorePath,
    rx: Receiver<SnapshotEvent>,
    release: Option<Release>,
}

impl Subscription {
    /// Wrap a snapshot receiver and the hook that releases the backend listener.
    pub fn new(
        path: StorePath,
        rx: Receiver<SnapshotEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            path,
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Subscribed path.
    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Wait for the next snapshot. `None` once the backend side has gone away.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.rx.recv_async().await.ok()
    }

    /// Take an already-delivered snapshot without waiting.
    pub fn try_next(&mut self) -> Option<SnapshotEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving updates and release the backend listener.
    pub fn unsubscribe(mut self) {
        self.release_listener();
    }

    fn release_listener(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_listener();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("released", &self.release.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn release_runs_once_on_unsubscribe() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (_tx, rx) = flume::unbounded();
        let sub = Subscription::new(StorePath::root(), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_runs_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (_tx, rx) = flume::unbounded();
        {
            let _sub = Subscription::new(StorePath::root(), rx, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn try_next_yields_buffered_snapshot() {
        let (tx, rx) = flume::unbounded();
        let mut sub = Subscription::new(StorePath::root(), rx, || {});
        tx.send(Ok(Some(Value::from(1)))).unwrap();
        assert_eq!(sub.try_next(), Some(Ok(Some(Value::from(1)))));
        assert!(sub.try_next().is_none());
    }
}
