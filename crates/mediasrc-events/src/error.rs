#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors produced by an [`EventQueue`](crate::EventQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("event queue is shut down")]
    Shutdown,

    #[error("no event available")]
    NoEvent,
}

/// Result type for event queue operations.
pub type EventResult<T> = Result<T, EventError>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::shutdown(EventError::Shutdown, "event queue is shut down")]
    #[case::no_event(EventError::NoEvent, "no event available")]
    fn test_error_display(#[case] error: EventError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }
}
