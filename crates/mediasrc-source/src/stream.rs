//! Stream state machine.
//!
//! [`StreamCore`] holds the mutable state of one stream and lives inside the
//! source's locked state. Hosts and producers reach it through the
//! [`MediaStream`] handle, which holds only a weak back-reference to the
//! source and the stream's index.

#![forbid(unsafe_code)]

use std::{
    fmt,
    sync::{Arc, Weak},
};

use mediasrc_events::EventQueue;
use tracing::{debug, trace, warn};

use crate::{
    buffer::SampleBuffer,
    context::SourceLink,
    descriptor::StreamDescriptor,
    error::{SourceError, SourceResult},
    events::{SourceEvent, StreamEvent},
    operation::Operation,
    source::{MediaSource, SourceShared},
    types::{MediaSample, StartPosition, StreamId, StreamState, Token},
};

#[derive(Debug)]
pub(crate) struct StreamCore {
    descriptor: StreamDescriptor,
    state: StreamState,
    active: bool,
    /// Upstream has no more data.
    end_of_stream: bool,
    /// Stream-level `EndOfStream` posted for this run.
    eos_signaled: bool,
    /// The source counted this stream's end toward end-of-presentation.
    eos_accounted: bool,
    buffer: SampleBuffer,
    events: EventQueue<StreamEvent>,
}

impl StreamCore {
    pub(crate) fn new(descriptor: StreamDescriptor, low_water_mark: usize) -> Self {
        Self {
            descriptor,
            state: StreamState::Invalid,
            active: false,
            end_of_stream: false,
            eos_signaled: false,
            eos_accounted: false,
            buffer: SampleBuffer::new(low_water_mark),
            events: EventQueue::new(),
        }
    }

    pub(crate) fn id(&self) -> StreamId {
        self.descriptor.id()
    }

    pub(crate) fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn events(&self) -> &EventQueue<StreamEvent> {
        &self.events
    }

    pub(crate) fn buffered_samples(&self) -> usize {
        self.buffer.sample_count()
    }

    pub(crate) fn pending_requests(&self) -> usize {
        self.buffer.request_count()
    }

    /// Queue a consumer request and try to answer it.
    ///
    /// Dispatch failures go to the source's event queue, not to the caller.
    pub(crate) fn request_sample(
        &mut self,
        token: Option<Token>,
        link: &impl SourceLink,
    ) -> SourceResult<()> {
        if matches!(
            self.state,
            StreamState::Invalid | StreamState::Stopped | StreamState::Shutdown
        ) || !self.active
        {
            return Err(SourceError::InvalidRequest);
        }
        if self.end_of_stream && !self.buffer.has_samples() {
            return Err(SourceError::EndOfStream);
        }

        self.buffer.push_request(token)?;
        self.dispatch_or_report(link);
        Ok(())
    }

    pub(crate) fn dispatch_or_report(&mut self, link: &impl SourceLink) {
        if let Err(error) = self.dispatch_samples(link) {
            if self.state == StreamState::Shutdown {
                trace!(stream = %self.id(), %error, "dispatch error after shutdown suppressed");
                return;
            }
            warn!(stream = %self.id(), %error, "sample dispatch failed");
            let _ = link.post_source_event(SourceEvent::Error { error });
        }
    }

    /// Match buffered samples with pending requests, then decide whether to
    /// signal end-of-stream or ask the source for more data.
    pub(crate) fn dispatch_samples(&mut self, link: &impl SourceLink) -> SourceResult<()> {
        if self.state != StreamState::Started {
            return Ok(());
        }

        let id = self.id();
        while let Some(sample) = self.buffer.next_delivery() {
            trace!(stream = %id, time = ?sample.time, token = ?sample.token, "sample delivered");
            self.events.post(StreamEvent::Sample(sample))?;
        }

        if !self.buffer.has_samples() && self.end_of_stream {
            if !self.eos_signaled {
                self.eos_signaled = true;
                debug!(stream = %id, "end of stream");
                self.events.post(StreamEvent::EndOfStream)?;
                link.queue_operation(Operation::EndOfStream { stream: id })?;
            }
        } else if self.active && !self.end_of_stream && self.buffer.below_low_water() {
            trace!(stream = %id, buffered = self.buffer.sample_count(), "requesting data");
            link.queue_operation(Operation::RequestData { stream: id })?;
        }

        Ok(())
    }

    /// Select or deselect the stream. Deselecting drops every buffered sample
    /// and pending request.
    pub(crate) fn activate(&mut self, active: bool) {
        if active == self.active {
            return;
        }
        self.active = active;

        if !active {
            // An end-of-stream still in flight goes stale; signal it again
            // on the next run.
            if !self.eos_accounted {
                self.eos_signaled = false;
            }
            debug!(
                stream = %self.id(),
                samples = self.buffer.sample_count(),
                requests = self.buffer.request_count(),
                "stream deactivated, dropping buffered data"
            );
            self.buffer.clear();
        }
    }

    pub(crate) fn start(
        &mut self,
        position: StartPosition,
        link: &impl SourceLink,
    ) -> SourceResult<()> {
        self.events.post(StreamEvent::StreamStarted { position })?;
        self.state = StreamState::Started;
        // Requests queued before the start are answered now.
        self.dispatch_samples(link)
    }

    pub(crate) fn stop(&mut self) -> SourceResult<()> {
        self.rewind();
        self.state = StreamState::Stopped;
        self.events.post(StreamEvent::StreamStopped)?;
        Ok(())
    }

    /// Forget buffered data and end-of-stream progress.
    pub(crate) fn rewind(&mut self) {
        self.buffer.clear();
        self.end_of_stream = false;
        self.eos_signaled = false;
        self.eos_accounted = false;
    }

    pub(crate) fn shutdown(&mut self) {
        self.state = StreamState::Shutdown;
        self.buffer.clear();
        self.events.shutdown();
    }

    /// Producer side: buffer a sample.
    pub(crate) fn push_sample(&mut self, sample: MediaSample) -> SourceResult<()> {
        self.ensure_accepting()?;
        self.buffer.push_sample(sample)
    }

    /// Producer side: no more samples will follow.
    pub(crate) fn mark_end_of_stream(&mut self) -> SourceResult<()> {
        self.ensure_accepting()?;
        self.end_of_stream = true;
        Ok(())
    }

    /// Whether a `RequestData` for this stream should reach the producer.
    pub(crate) fn wants_data(&self) -> bool {
        self.active && self.state == StreamState::Started && !self.end_of_stream
    }

    /// Active and not yet counted toward end-of-presentation.
    pub(crate) fn awaits_end_of_stream(&self) -> bool {
        self.active && !self.eos_accounted
    }

    /// Record that the source counted this stream's end. Returns `false` for
    /// a stale notification (stream deselected, stopped or already counted).
    pub(crate) fn account_end_of_stream(&mut self) -> bool {
        if self.active && self.eos_signaled && !self.eos_accounted {
            self.eos_accounted = true;
            true
        } else {
            false
        }
    }

    fn ensure_accepting(&self) -> SourceResult<()> {
        if !self.active || self.state == StreamState::Shutdown || self.end_of_stream {
            return Err(SourceError::InvalidRequest);
        }
        Ok(())
    }
}

/// Handle to one stream of a [`MediaSource`].
///
/// Cheap to clone. Holds a weak reference to the source: once the source is
/// dropped every operation fails with [`SourceError::InvalidRequest`].
#[derive(Clone)]
pub struct MediaStream {
    index: usize,
    descriptor: StreamDescriptor,
    events: EventQueue<StreamEvent>,
    source: Weak<SourceShared>,
}

impl MediaStream {
    pub(crate) fn new(index: usize, core: &StreamCore, source: Weak<SourceShared>) -> Self {
        Self {
            index,
            descriptor: core.descriptor().clone(),
            events: core.events().clone(),
            source,
        }
    }

    pub fn id(&self) -> StreamId {
        self.descriptor.id()
    }

    /// Descriptor the stream was created with.
    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    /// The stream's event queue.
    pub fn events(&self) -> &EventQueue<StreamEvent> {
        &self.events
    }

    /// The owning source, if it is still alive.
    pub fn source(&self) -> Option<MediaSource> {
        self.source.upgrade().map(MediaSource::from_shared)
    }

    /// Ask for one sample.
    ///
    /// The sample arrives later as [`StreamEvent::Sample`] with `token`
    /// attached. Requests are answered in the order they were made.
    ///
    /// # Errors
    ///
    /// - [`SourceError::InvalidRequest`] if the stream is not started or not
    ///   selected.
    /// - [`SourceError::EndOfStream`] if the stream ended and nothing is
    ///   buffered.
    pub fn request_sample(&self, token: Option<Token>) -> SourceResult<()> {
        self.with_core(|core, link| core.request_sample(token, link))
    }

    /// Push a produced sample into the stream's buffer.
    pub fn deliver(&self, sample: MediaSample) -> SourceResult<()> {
        self.with_core(|core, link| {
            core.push_sample(sample)?;
            core.dispatch_or_report(link);
            Ok(())
        })
    }

    /// Signal that no more samples will be delivered.
    pub fn end_of_stream(&self) -> SourceResult<()> {
        self.with_core(|core, link| {
            core.mark_end_of_stream()?;
            core.dispatch_or_report(link);
            Ok(())
        })
    }

    pub fn is_active(&self) -> bool {
        self.with_core(|core, _| Ok(core.is_active()))
            .unwrap_or(false)
    }

    pub fn state(&self) -> StreamState {
        self.with_core(|core, _| Ok(core.state()))
            .unwrap_or(StreamState::Shutdown)
    }

    pub fn buffered_samples(&self) -> usize {
        self.with_core(|core, _| Ok(core.buffered_samples()))
            .unwrap_or(0)
    }

    pub fn pending_requests(&self) -> usize {
        self.with_core(|core, _| Ok(core.pending_requests()))
            .unwrap_or(0)
    }

    fn with_core<T>(
        &self,
        f: impl FnOnce(&mut StreamCore, &SourceShared) -> SourceResult<T>,
    ) -> SourceResult<T> {
        let shared: Arc<SourceShared> = self.source.upgrade().ok_or(SourceError::InvalidRequest)?;
        shared.with_stream(self.index, f)
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id())
            .field("kind", &self.descriptor.kind())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mediasrc_events::RetrieveFlags;
    use rstest::rstest;

    use super::*;
    use crate::{context::recording::RecordingLink, types::MediaKind};

    fn sample(n: u64) -> MediaSample {
        MediaSample::new(
            Duration::from_millis(n * 10),
            Duration::from_millis(10),
            vec![n as u8],
        )
    }

    fn started_stream(link: &RecordingLink) -> StreamCore {
        let mut core = StreamCore::new(StreamDescriptor::new(0, MediaKind::Audio), 2);
        core.activate(true);
        core.start(StartPosition::ZERO, link).unwrap();
        let _ = core.events().try_next();
        link.take_ops();
        core
    }

    fn stream_events(core: &StreamCore) -> Vec<StreamEvent> {
        std::iter::from_fn(|| core.events().retrieve(RetrieveFlags::NO_WAIT).ok()).collect()
    }

    #[rstest]
    #[case::inactive(false, false)]
    #[case::not_started(true, false)]
    #[case::stopped(true, true)]
    fn request_on_unavailable_stream_is_invalid(#[case] active: bool, #[case] stopped: bool) {
        let link = RecordingLink::default();
        let mut core = StreamCore::new(StreamDescriptor::new(0, MediaKind::Video), 2);
        core.activate(active);
        if stopped {
            core.start(StartPosition::ZERO, &link).unwrap();
            core.stop().unwrap();
        }
        assert_eq!(
            core.request_sample(Some(Token::new(1)), &link),
            Err(SourceError::InvalidRequest)
        );
    }

    #[test]
    fn request_on_inactive_stream_ignores_buffer() {
        let link = RecordingLink::default();
        let mut core = started_stream(&link);
        core.push_sample(sample(0)).unwrap();
        core.activate(false);
        assert_eq!(
            core.request_sample(None, &link),
            Err(SourceError::InvalidRequest)
        );
    }

    #[test]
    fn empty_request_is_queued_and_asks_for_data() {
        let link = RecordingLink::default();
        let mut core = started_stream(&link);

        core.request_sample(Some(Token::new(10)), &link).unwrap();

        assert_eq!(core.pending_requests(), 1);
        assert!(stream_events(&core).is_empty());
        assert_eq!(
            link.take_ops(),
            vec![Operation::RequestData {
                stream: StreamId(0)
            }]
        );
    }

    #[test]
    fn end_of_stream_with_empty_buffer_rejects() {
        let link = RecordingLink::default();
        let mut core = started_stream(&link);
        core.mark_end_of_stream().unwrap();
        core.dispatch_samples(&link).unwrap();
        let _ = stream_events(&core);

        assert_eq!(
            core.request_sample(None, &link),
            Err(SourceError::EndOfStream)
        );
    }

    #[test]
    fn end_of_stream_with_last_sample_delivers_it() {
        let link = RecordingLink::default();
        let mut core = started_stream(&link);
        core.push_sample(sample(1)).unwrap();
        core.mark_end_of_stream().unwrap();

        core.request_sample(Some(Token::new(5)), &link).unwrap();

        let mut delivered = sample(1);
        delivered.token = Some(Token::new(5));
        assert_eq!(
            stream_events(&core),
            vec![StreamEvent::Sample(delivered), StreamEvent::EndOfStream]
        );
        assert_eq!(
            link.take_ops(),
            vec![Operation::EndOfStream {
                stream: StreamId(0)
            }]
        );
    }

    #[rstest]
    #[case::requests_first(true)]
    #[case::samples_first(false)]
    fn delivers_in_request_order(#[case] requests_first: bool) {
        let link = RecordingLink::default();
        let mut core = started_stream(&link);

        if requests_first {
            core.request_sample(Some(Token::new(1)), &link).unwrap();
            core.request_sample(Some(Token::new(2)), &link).unwrap();
            core.push_sample(sample(1)).unwrap();
            core.push_sample(sample(2)).unwrap();
            core.dispatch_samples(&link).unwrap();
        } else {
            core.push_sample(sample(1)).unwrap();
            core.push_sample(sample(2)).unwrap();
            core.request_sample(Some(Token::new(1)), &link).unwrap();
            core.request_sample(Some(Token::new(2)), &link).unwrap();
        }

        let pairs: Vec<_> = stream_events(&core)
            .into_iter()
            .filter_map(|event| match event {
                StreamEvent::Sample(s) => Some((s.token, s.data[0])),
                _ => None,
            })
            .collect();
        assert_eq!(
            pairs,
            vec![(Some(Token::new(1)), 1), (Some(Token::new(2)), 2)]
        );
    }

    #[test]
    fn deactivation_is_a_lossy_reset() {
        let link = RecordingLink::default();
        let mut core = started_stream(&link);
        for n in 0..3 {
            core.push_sample(sample(n)).unwrap();
        }
        core.activate(false);
        core.activate(true);
        assert_eq!(core.buffered_samples(), 0);

        // Requests dropped by deactivation do not come back either.
        core.request_sample(Some(Token::new(1)), &link).unwrap();
        core.request_sample(Some(Token::new(2)), &link).unwrap();
        core.activate(false);
        core.activate(true);

        assert_eq!(core.buffered_samples(), 0);
        assert_eq!(core.pending_requests(), 0);
        core.push_sample(sample(9)).unwrap();
        core.dispatch_samples(&link).unwrap();
        assert!(
            !stream_events(&core)
                .iter()
                .any(|e| matches!(e, StreamEvent::Sample(_)))
        );
    }

    #[test]
    fn activate_same_value_is_noop() {
        let link = RecordingLink::default();
        let mut core = started_stream(&link);
        core.push_sample(sample(0)).unwrap();
        core.activate(true);
        assert_eq!(core.buffered_samples(), 1);
    }

    #[test]
    fn end_of_stream_is_signaled_once() {
        let link = RecordingLink::default();
        let mut core = started_stream(&link);
        core.mark_end_of_stream().unwrap();

        core.dispatch_samples(&link).unwrap();
        core.dispatch_samples(&link).unwrap();
        core.start(StartPosition::Current, &link).unwrap();

        let eos_events = stream_events(&core)
            .into_iter()
            .filter(|e| *e == StreamEvent::EndOfStream)
            .count();
        assert_eq!(eos_events, 1);
        assert_eq!(
            link.take_ops(),
            vec![Operation::EndOfStream {
                stream: StreamId(0)
            }]
        );
        assert!(core.account_end_of_stream());
        assert!(!core.account_end_of_stream());
    }

    #[test]
    fn start_answers_requests_queued_before() {
        let link = RecordingLink::default();
        let mut core = StreamCore::new(StreamDescriptor::new(0, MediaKind::Audio), 2);
        core.activate(true);
        core.push_sample(sample(4)).unwrap();
        core.buffer.push_request(Some(Token::new(8))).unwrap();

        core.start(StartPosition::ZERO, &link).unwrap();

        let events = stream_events(&core);
        assert_eq!(
            events[0],
            StreamEvent::StreamStarted {
                position: StartPosition::ZERO
            }
        );
        assert!(matches!(
            &events[1],
            StreamEvent::Sample(s) if s.token == Some(Token::new(8))
        ));
        assert_eq!(core.state(), StreamState::Started);
    }

    #[test]
    fn buffer_at_low_water_stops_requesting() {
        let link = RecordingLink::default();
        let mut core = started_stream(&link);
        core.push_sample(sample(0)).unwrap();
        core.push_sample(sample(1)).unwrap();
        core.dispatch_samples(&link).unwrap();
        assert!(link.take_ops().is_empty());
    }

    #[test]
    fn dispatch_failure_goes_to_source_events() {
        let link = RecordingLink::failing();
        let mut core = StreamCore::new(StreamDescriptor::new(0, MediaKind::Audio), 2);
        core.activate(true);
        assert!(core.start(StartPosition::ZERO, &link).is_err());

        core.request_sample(None, &link).unwrap();
        assert_eq!(
            link.take_events(),
            vec![SourceEvent::Error {
                error: SourceError::Unexpected
            }]
        );
    }

    #[test]
    fn dispatch_failure_after_shutdown_is_swallowed() {
        let link = RecordingLink::failing();
        let mut core = StreamCore::new(StreamDescriptor::new(0, MediaKind::Audio), 2);
        core.activate(true);
        core.shutdown();
        core.dispatch_or_report(&link);
        assert!(link.take_events().is_empty());
        assert_eq!(
            core.request_sample(None, &link),
            Err(SourceError::InvalidRequest)
        );
    }

    #[test]
    fn producer_push_rejected_when_inactive_or_ended() {
        let link = RecordingLink::default();
        let mut core = started_stream(&link);
        core.mark_end_of_stream().unwrap();
        assert_eq!(core.push_sample(sample(0)), Err(SourceError::InvalidRequest));

        let mut idle = StreamCore::new(StreamDescriptor::new(1, MediaKind::Video), 2);
        assert_eq!(idle.push_sample(sample(0)), Err(SourceError::InvalidRequest));
        assert_eq!(idle.mark_end_of_stream(), Err(SourceError::InvalidRequest));
    }
}
