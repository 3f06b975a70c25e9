//! Recording handler for exercising [`OperationQueue`](crate::OperationQueue).
//!
//! `RecordingHandler` keeps its own "current operation" marker, the way a
//! state machine with deferred completion does: a [`TestOp::Defer`] stays
//! current after `dispatch` returns until [`HandlerLog::complete_current`] is
//! called, and every operation validated in the meantime is rejected as busy.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use thiserror::Error;

use crate::traits::OperationHandler;

/// Operation understood by [`RecordingHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOp {
    /// Completes inside `dispatch`.
    Complete(u32),
    /// Stays current after `dispatch` returns.
    Defer(u32),
    /// `dispatch` returns an error.
    Fail(u32),
}

impl TestOp {
    pub fn id(self) -> u32 {
        match self {
            Self::Complete(id) | Self::Defer(id) | Self::Fail(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestOpError {
    #[error("operation {0} rejected: another operation is in flight")]
    Busy(u32),
    #[error("operation {0} failed")]
    Failed(u32),
}

#[derive(Debug, Default)]
struct LogInner {
    dispatched: Vec<u32>,
    reported: Vec<TestOpError>,
    current: Option<u32>,
    active: usize,
    max_active: usize,
}

/// Shared record of what a [`RecordingHandler`] saw.
#[derive(Debug, Clone, Default)]
pub struct HandlerLog {
    inner: Arc<Mutex<LogInner>>,
}

impl HandlerLog {
    /// Ids of dispatched operations, in dispatch order.
    pub fn dispatched(&self) -> Vec<u32> {
        self.inner.lock().dispatched.clone()
    }

    /// Errors passed to `report`, in order.
    pub fn reported(&self) -> Vec<TestOpError> {
        self.inner.lock().reported.clone()
    }

    /// Id of the deferred operation still in flight.
    pub fn current(&self) -> Option<u32> {
        self.inner.lock().current
    }

    /// Finish the deferred operation. Returns its id.
    pub fn complete_current(&self) -> Option<u32> {
        self.inner.lock().current.take()
    }

    /// Highest number of simultaneous `dispatch` calls observed.
    pub fn max_concurrent(&self) -> usize {
        self.inner.lock().max_active
    }
}

/// Handler that records every call into a [`HandlerLog`].
#[derive(Debug)]
pub struct RecordingHandler {
    log: HandlerLog,
    dispatch_delay: Option<Duration>,
}

impl RecordingHandler {
    pub fn new(log: HandlerLog) -> Self {
        Self {
            log,
            dispatch_delay: None,
        }
    }

    /// Block the consumer for `delay` inside every `dispatch`.
    #[must_use]
    pub fn with_dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = Some(delay);
        self
    }
}

impl OperationHandler for RecordingHandler {
    type Op = TestOp;
    type Error = TestOpError;

    fn validate(&mut self, op: &TestOp) -> Result<(), TestOpError> {
        match self.log.current() {
            Some(_) => Err(TestOpError::Busy(op.id())),
            None => Ok(()),
        }
    }

    fn dispatch(&mut self, op: TestOp) -> Result<(), TestOpError> {
        {
            let mut inner = self.log.inner.lock();
            inner.active += 1;
            inner.max_active = inner.max_active.max(inner.active);
            inner.dispatched.push(op.id());
            if let TestOp::Defer(id) = op {
                inner.current = Some(id);
            }
        }

        if let Some(delay) = self.dispatch_delay {
            std::thread::sleep(delay);
        }

        self.log.inner.lock().active -= 1;

        match op {
            TestOp::Fail(id) => Err(TestOpError::Failed(id)),
            TestOp::Complete(_) | TestOp::Defer(_) => Ok(()),
        }
    }

    fn report(&mut self, error: TestOpError) {
        self.log.inner.lock().reported.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_operation_blocks_validation() {
        let log = HandlerLog::default();
        let mut handler = RecordingHandler::new(log.clone());

        handler.dispatch(TestOp::Defer(1)).unwrap();
        assert_eq!(log.current(), Some(1));
        assert_eq!(
            handler.validate(&TestOp::Complete(2)),
            Err(TestOpError::Busy(2))
        );

        assert_eq!(log.complete_current(), Some(1));
        assert!(handler.validate(&TestOp::Complete(2)).is_ok());
    }

    #[test]
    fn failing_operation_returns_error() {
        let mut handler = RecordingHandler::new(HandlerLog::default());
        assert_eq!(
            handler.dispatch(TestOp::Fail(3)),
            Err(TestOpError::Failed(3))
        );
    }
}
