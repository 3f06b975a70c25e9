#![forbid(unsafe_code)]

use mediasrc_events::EventError;
use mediasrc_worker::QueueError;
use thiserror::Error;

use crate::types::StreamId;

/// Errors produced by a media source and its streams.
///
/// Synchronous entry points (`start`, `request_sample`, ...) return these
/// directly. Failures inside the serialized dispatch are posted as
/// [`SourceEvent::Error`](crate::SourceEvent::Error) instead, unless the
/// source has been shut down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("unsupported time format")]
    UnsupportedTimeFormat,

    #[error("request is not valid in the current state")]
    InvalidRequest,

    #[error("end of stream")]
    EndOfStream,

    #[error("out of memory")]
    OutOfMemory,

    /// A programming invariant was violated.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(&'static str),

    #[error("unexpected failure")]
    Unexpected,

    #[error("unknown stream: {0}")]
    UnknownStream(StreamId),

    #[error("event queue: {0}")]
    Events(#[from] EventError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Result type for media source operations.
pub type SourceResult<T> = Result<T, SourceError>;
