#![forbid(unsafe_code)]

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::trace;

use crate::{EventError, EventResult, RetrieveFlags};

/// Unbounded "post event, retrieve event" mailbox.
///
/// Every clone shares the same channel. Unlike a broadcast bus, each event
/// is retrieved exactly once, in posting order.
///
/// `post()` never blocks and is safe to call while holding a lock.
/// After [`shutdown`](Self::shutdown) every call fails with
/// [`EventError::Shutdown`] and blocked retrievers are woken.
pub struct EventQueue<E> {
    tx: kanal::Sender<E>,
    rx: kanal::Receiver<E>,
    shutdown: Arc<AtomicBool>,
}

impl<E> EventQueue<E> {
    /// Create an empty event queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = kanal::unbounded();
        Self {
            tx,
            rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Append an event to the queue.
    pub fn post(&self, event: E) -> EventResult<()> {
        if self.is_shutdown() {
            return Err(EventError::Shutdown);
        }
        self.tx.send(event).map_err(|_| EventError::Shutdown)
    }

    /// Retrieve the oldest event.
    ///
    /// With [`RetrieveFlags::NO_WAIT`] returns [`EventError::NoEvent`] when the
    /// queue is empty; otherwise blocks the calling thread until an event is
    /// posted or the queue is shut down.
    pub fn retrieve(&self, flags: RetrieveFlags) -> EventResult<E> {
        if self.is_shutdown() {
            return Err(EventError::Shutdown);
        }
        if flags.is_no_wait() {
            return match self.rx.try_recv() {
                Ok(Some(event)) => Ok(event),
                Ok(None) => Err(EventError::NoEvent),
                Err(_) => Err(EventError::Shutdown),
            };
        }
        self.rx.recv().map_err(|_| EventError::Shutdown)
    }

    /// Wait asynchronously for the oldest event.
    pub async fn next(&self) -> EventResult<E> {
        if self.is_shutdown() {
            return Err(EventError::Shutdown);
        }
        self.rx
            .as_async()
            .recv()
            .await
            .map_err(|_| EventError::Shutdown)
    }

    /// Take the oldest event if one is queued.
    pub fn try_next(&self) -> Option<E> {
        self.retrieve(RetrieveFlags::NO_WAIT).ok()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Shut the queue down. Pending events are discarded.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!(discarded = self.rx.len(), "event queue shut down");
        let _ = self.rx.close();
    }
}

impl<E> Clone for EventQueue<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.rx.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestEvent {
        Started,
        Value(u32),
        Ended,
    }

    #[test]
    fn post_then_retrieve_in_order() {
        let queue = EventQueue::new();
        queue.post(TestEvent::Started).unwrap();
        queue.post(TestEvent::Value(7)).unwrap();
        queue.post(TestEvent::Ended).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.retrieve(RetrieveFlags::NO_WAIT), Ok(TestEvent::Started));
        assert_eq!(queue.retrieve(RetrieveFlags::NO_WAIT), Ok(TestEvent::Value(7)));
        assert_eq!(queue.retrieve(RetrieveFlags::NO_WAIT), Ok(TestEvent::Ended));
        assert!(queue.is_empty());
    }

    #[test]
    fn no_wait_on_empty_queue() {
        let queue = EventQueue::<TestEvent>::new();
        assert_eq!(
            queue.retrieve(RetrieveFlags::NO_WAIT),
            Err(EventError::NoEvent)
        );
        assert!(queue.try_next().is_none());
    }

    #[rstest]
    #[case::post(true)]
    #[case::retrieve(false)]
    fn shutdown_rejects_everything(#[case] post: bool) {
        let queue = EventQueue::new();
        queue.post(TestEvent::Started).unwrap();
        queue.shutdown();
        queue.shutdown();

        let result = if post {
            queue.post(TestEvent::Ended)
        } else {
            queue.retrieve(RetrieveFlags::NO_WAIT).map(|_| ())
        };
        assert_eq!(result, Err(EventError::Shutdown));
        assert!(queue.is_shutdown());
    }

    #[test]
    fn clone_shares_channel() {
        let queue = EventQueue::new();
        let other = queue.clone();
        other.post(TestEvent::Value(1)).unwrap();
        assert_eq!(queue.try_next(), Some(TestEvent::Value(1)));
    }

    #[test]
    fn blocking_retrieve_wakes_on_post() {
        let queue = EventQueue::new();
        let poster = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            poster.post(TestEvent::Value(42)).unwrap();
        });

        assert_eq!(
            queue.retrieve(RetrieveFlags::empty()),
            Ok(TestEvent::Value(42))
        );
        handle.join().unwrap();
    }

    #[test]
    fn blocking_retrieve_wakes_on_shutdown() {
        let queue = EventQueue::<TestEvent>::new();
        let closer = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            closer.shutdown();
        });

        assert_eq!(
            queue.retrieve(RetrieveFlags::empty()),
            Err(EventError::Shutdown)
        );
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn next_waits_for_event() {
        let queue = EventQueue::new();
        let poster = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            poster.post(TestEvent::Ended).unwrap();
        });

        let event = tokio::time::timeout(Duration::from_secs(1), queue.next())
            .await
            .unwrap();
        assert_eq!(event, Ok(TestEvent::Ended));
    }
}
