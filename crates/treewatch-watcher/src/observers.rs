//! Generic observer channel.
//!
//! Every routed event is broadcast here regardless of whether a
//! specific handler picked it up. Warnings and failures travel the same
//! way, so one receiver sees everything the engine has to say.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;
use treewatch_core::{EventKind, Notification};

/// A receiver for engine notifications, optionally narrowed to one kind.
#[derive(Debug)]
pub struct EventReceiver {
    inner: broadcast::Receiver<Notification>,
    kind: Option<EventKind>,
}

impl EventReceiver {
    pub(crate) fn new(inner: broadcast::Receiver<Notification>, kind: Option<EventKind>) -> Self {
        Self { inner, kind }
    }

    /// Returns the next matching notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.inner.try_recv() {
                Ok(note) if self.accepts(&note) => return Some(note),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Observer fell behind, {} notifications dropped", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Waits for the next matching notification.
    ///
    /// Returns None once the engine has been dropped.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.inner.recv().await {
                Ok(note) if self.accepts(&note) => return Some(note),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Observer fell behind, {} notifications dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Everything currently buffered.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Kind-filtered receivers only see events of that kind.
    fn accepts(&self, note: &Notification) -> bool {
        match self.kind {
            None => true,
            Some(kind) => matches!(note, Notification::Event(event) if event.kind == kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use treewatch_core::WatchEvent;

    fn event(kind: EventKind) -> Notification {
        Notification::Event(WatchEvent {
            kind,
            watched_dir: PathBuf::from("/w"),
            filename: "a.txt".into(),
            relative_path: PathBuf::from("/w"),
        })
    }

    #[test]
    fn test_kind_receiver_skips_other_notifications() {
        let (tx, _) = broadcast::channel(16);
        let mut all = EventReceiver::new(tx.subscribe(), None);
        let mut adds = EventReceiver::new(tx.subscribe(), Some(EventKind::Add));

        tx.send(event(EventKind::Change)).unwrap();
        tx.send(Notification::Warning { message: "w".into() }).unwrap();
        tx.send(event(EventKind::Add)).unwrap();

        assert_eq!(all.drain().len(), 3);
        let seen = adds.drain();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event().map(|e| e.kind), Some(EventKind::Add));
    }

    #[test]
    fn test_lagging_receiver_recovers() {
        let (tx, _) = broadcast::channel(2);
        let mut rx = EventReceiver::new(tx.subscribe(), None);
        for _ in 0..5 {
            tx.send(event(EventKind::Change)).unwrap();
        }
        assert_eq!(rx.drain().len(), 2);
    }

    #[tokio::test]
    async fn test_recv_ends_when_sender_dropped() {
        let (tx, _) = broadcast::channel(4);
        let mut rx = EventReceiver::new(tx.subscribe(), None);
        tx.send(event(EventKind::Unlink)).unwrap();
        drop(tx);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
