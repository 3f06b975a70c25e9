//! Back-channel from a stream to its owning source.
//!
//! A stream never calls into the source directly. Everything it needs from
//! the source while the source lock is held goes through [`SourceLink`]:
//! posting a source-level event, or queueing an operation that the source
//! dispatches on a later cycle.

#![forbid(unsafe_code)]

use crate::{error::SourceResult, events::SourceEvent, operation::Operation};

pub(crate) trait SourceLink {
    /// Post an event on the source's event queue.
    fn post_source_event(&self, event: SourceEvent) -> SourceResult<()>;

    /// Queue an operation for asynchronous dispatch.
    fn queue_operation(&self, op: Operation) -> SourceResult<()>;
}

#[cfg(test)]
pub(crate) mod recording {
    use parking_lot::Mutex;

    use super::*;
    use crate::error::SourceError;

    /// `SourceLink` that records instead of dispatching.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingLink {
        pub(crate) events: Mutex<Vec<SourceEvent>>,
        pub(crate) ops: Mutex<Vec<Operation>>,
        pub(crate) fail_ops: bool,
    }

    impl RecordingLink {
        pub(crate) fn failing() -> Self {
            Self {
                fail_ops: true,
                ..Self::default()
            }
        }

        pub(crate) fn take_ops(&self) -> Vec<Operation> {
            std::mem::take(&mut *self.ops.lock())
        }

        pub(crate) fn take_events(&self) -> Vec<SourceEvent> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl SourceLink for RecordingLink {
        fn post_source_event(&self, event: SourceEvent) -> SourceResult<()> {
            self.events.lock().push(event);
            Ok(())
        }

        fn queue_operation(&self, op: Operation) -> SourceResult<()> {
            if self.fail_ops {
                return Err(SourceError::Unexpected);
            }
            self.ops.lock().push(op);
            Ok(())
        }
    }
}
