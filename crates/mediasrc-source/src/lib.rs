//! Pull-mode media source.
//!
//! A [`MediaSource`] owns a fixed set of streams. The host starts a
//! presentation, then pulls samples from each [`MediaStream`] with
//! [`request_sample`](MediaStream::request_sample); samples arrive as
//! [`StreamEvent::Sample`] on the stream's event queue, in request order.
//!
//! - State transitions (`start`, `stop`, `pause`) are serialized on a
//!   single-flight operation queue and complete asynchronously.
//! - A stream holding fewer samples than the low-water mark asks its
//!   [`DataProducer`] for more.
//! - When every active stream has delivered its last sample, the source
//!   posts [`SourceEvent::EndOfPresentation`].

#![forbid(unsafe_code)]

mod buffer;
mod config;
mod context;
mod descriptor;
mod error;
mod events;
mod operation;
mod producer;
mod source;
mod stream;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{DEFAULT_LOW_WATER_MARK, SourceConfig};
pub use descriptor::{PresentationDescriptor, StreamDescriptor};
pub use error::{SourceError, SourceResult};
pub use events::{SourceEvent, StreamEvent};
pub use mediasrc_events::{EventError, EventQueue, RetrieveFlags};
pub use operation::{Operation, OperationKind};
pub use producer::{DataProducer, NullProducer, SampleSink};
pub use source::MediaSource;
pub use stream::MediaStream;
pub use types::{
    Characteristics, MediaKind, MediaSample, SourceState, StartPosition, StreamId, StreamState,
    TimeFormat, Token,
};
