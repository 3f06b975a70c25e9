#![forbid(unsafe_code)]

use crate::{
    error::SourceError,
    types::{MediaSample, StartPosition, StreamId},
};

/// Events posted on a source's event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// A stream was selected that was not active before.
    NewStream { stream: StreamId },
    /// An already active stream was restarted.
    UpdatedStream { stream: StreamId },
    /// `Start` completed.
    SourceStarted { position: StartPosition },
    /// `Stop` completed.
    SourceStopped,
    /// `Pause` completed.
    SourcePaused,
    /// Every active stream reached its end.
    EndOfPresentation,
    /// An asynchronous operation failed.
    Error { error: SourceError },
}

/// Events posted on a stream's event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    StreamStarted { position: StartPosition },
    StreamStopped,
    /// A sample answering the oldest pending request.
    Sample(MediaSample),
    /// Last sample delivered.
    EndOfStream,
}
