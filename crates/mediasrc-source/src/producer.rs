//! Upstream data seam.
//!
//! When a stream runs low it queues `RequestData`. On dispatch the source
//! calls its [`DataProducer`] with a [`SampleSink`] bound to that stream.

#![forbid(unsafe_code)]

use crate::{
    error::SourceResult,
    stream::StreamCore,
    types::{MediaSample, StreamId},
};

/// Produces samples on demand.
///
/// Called on the source's operation queue with the source lock held: keep it
/// short and never call back into the source or its streams from here. Push
/// whatever is ready and return. Pushing nothing is fine; the stream asks
/// again on its next request.
pub trait DataProducer: Send + 'static {
    fn request_data(&mut self, stream: StreamId, sink: &mut SampleSink<'_>) -> SourceResult<()>;
}

impl<F> DataProducer for F
where
    F: FnMut(StreamId, &mut SampleSink<'_>) -> SourceResult<()> + Send + 'static,
{
    fn request_data(&mut self, stream: StreamId, sink: &mut SampleSink<'_>) -> SourceResult<()> {
        self(stream, sink)
    }
}

/// Producer that never has data. Samples are then pushed from outside with
/// [`MediaStream::deliver`](crate::MediaStream::deliver).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProducer;

impl DataProducer for NullProducer {
    fn request_data(&mut self, _stream: StreamId, _sink: &mut SampleSink<'_>) -> SourceResult<()> {
        Ok(())
    }
}

/// Write end of one stream's sample buffer, valid for a single
/// `request_data` call.
pub struct SampleSink<'a> {
    stream: &'a mut StreamCore,
    pushed: usize,
    ended: bool,
}

impl<'a> SampleSink<'a> {
    pub(crate) fn new(stream: &'a mut StreamCore) -> Self {
        Self {
            stream,
            pushed: 0,
            ended: false,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream.id()
    }

    /// Append a sample to the stream's buffer.
    ///
    /// # Errors
    ///
    /// [`SourceError::InvalidRequest`](crate::SourceError::InvalidRequest) if
    /// the stream already ended or was deselected.
    pub fn push(&mut self, sample: MediaSample) -> SourceResult<()> {
        self.stream.push_sample(sample)?;
        self.pushed += 1;
        Ok(())
    }

    /// Mark the stream as ended. Buffered samples are still delivered.
    pub fn end_of_stream(&mut self) -> SourceResult<()> {
        self.stream.mark_end_of_stream()?;
        self.ended = true;
        Ok(())
    }

    /// Samples currently buffered, including those pushed through this sink.
    pub fn buffered(&self) -> usize {
        self.stream.buffered_samples()
    }

    pub(crate) fn produced(&self) -> bool {
        self.pushed > 0 || self.ended
    }
}
