#![forbid(unsafe_code)]

use std::{fmt, time::Duration};

use bitflags::bitflags;
use bytes::Bytes;

/// Identifier of a stream within its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Major media type of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
    Data,
}

/// Time format of a start position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeFormat {
    /// Presentation reference time. The only supported format.
    #[default]
    Reference,
    /// Any other format, identified by an opaque id.
    Other(u128),
}

/// Where a `Start` should begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartPosition {
    /// Continue from the current position.
    Current,
    /// Absolute presentation time.
    Absolute(Duration),
    /// Position in format-specific units (e.g. a frame index).
    Units(u64),
}

impl StartPosition {
    /// Absolute position zero.
    pub const ZERO: Self = Self::Absolute(Duration::ZERO);

    pub fn is_absolute(self) -> bool {
        matches!(self, Self::Absolute(_))
    }
}

/// Opaque correlation handle supplied with a sample request and returned
/// attached to the delivered sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for Token {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A timed media sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSample {
    /// Presentation time.
    pub time: Duration,
    pub duration: Duration,
    /// Payload.
    pub data: Bytes,
    /// Token of the request this sample answered. Set on delivery.
    pub token: Option<Token>,
}

impl MediaSample {
    pub fn new(time: Duration, duration: Duration, data: impl Into<Bytes>) -> Self {
        Self {
            time,
            duration,
            data: data.into(),
            token: None,
        }
    }
}

/// Lifecycle state of a media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceState {
    /// Initial state. Not opened yet.
    #[default]
    Invalid,
    Opening,
    Stopped,
    Paused,
    Started,
    /// Terminal.
    Shutdown,
}

/// Lifecycle state of a single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamState {
    #[default]
    Invalid,
    Stopped,
    Started,
    /// Terminal.
    Shutdown,
}

bitflags! {
    /// Capabilities advertised by a media source.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Characteristics: u32 {
        const IS_LIVE = 0b0000_0001;
        const CAN_SEEK = 0b0000_0010;
        const CAN_PAUSE = 0b0000_0100;
    }
}
