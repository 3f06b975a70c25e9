#![forbid(unsafe_code)]

use std::fmt;

use crate::{
    descriptor::PresentationDescriptor,
    types::{StartPosition, StreamId},
};

/// Command queued on a source's operation queue.
///
/// Host calls (`start`, `stop`, `pause`) and stream notifications
/// (`RequestData`, `EndOfStream`) all travel through the same queue, so at
/// most one of them is being dispatched at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Start {
        descriptor: PresentationDescriptor,
        position: StartPosition,
    },
    Stop,
    Pause,
    /// A stream is running low on samples.
    RequestData { stream: StreamId },
    /// A stream delivered its last sample.
    EndOfStream { stream: StreamId },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Start { .. } => OperationKind::Start,
            Self::Stop => OperationKind::Stop,
            Self::Pause => OperationKind::Pause,
            Self::RequestData { .. } => OperationKind::RequestData,
            Self::EndOfStream { .. } => OperationKind::EndOfStream,
        }
    }
}

/// Tag of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Start,
    Stop,
    Pause,
    RequestData,
    EndOfStream,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::RequestData => "request-data",
            Self::EndOfStream => "end-of-stream",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(
        Operation::Start { descriptor: PresentationDescriptor::default(), position: StartPosition::Current },
        OperationKind::Start,
        "start"
    )]
    #[case(Operation::Stop, OperationKind::Stop, "stop")]
    #[case(Operation::Pause, OperationKind::Pause, "pause")]
    #[case(Operation::RequestData { stream: StreamId(1) }, OperationKind::RequestData, "request-data")]
    #[case(Operation::EndOfStream { stream: StreamId(1) }, OperationKind::EndOfStream, "end-of-stream")]
    fn operation_kind(#[case] op: Operation, #[case] kind: OperationKind, #[case] name: &str) {
        assert_eq!(op.kind(), kind);
        assert_eq!(kind.to_string(), name);
    }
}
