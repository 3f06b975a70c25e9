use thiserror::Error;

/// Errors produced by an [`OperationQueue`](crate::OperationQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The consumer task is gone (cancelled or panicked).
    #[error("operation queue closed")]
    Closed,
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(QueueError::Closed.to_string(), "operation queue closed");
    }

    #[test]
    fn test_queue_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QueueError>();
    }
}
