//! Media source state machine.
//!
//! ```text
//! host ──start/stop/pause──► OperationQueue ──► SourceOpHandler
//!                                 ▲                  │ (source lock)
//!                                 │                  ▼
//!          RequestData/EndOfStream└──────────── SourceInner ─► StreamCore[]
//! ```
//!
//! One `parking_lot::Mutex` guards the source state and every stream's
//! mutable state. Streams never call into the source inline: they queue
//! operations which the consumer task dispatches on a later cycle.

#![forbid(unsafe_code)]

use std::{
    fmt,
    sync::{Arc, Weak},
};

use mediasrc_events::EventQueue;
use mediasrc_worker::{OperationHandler, OperationQueue};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    config::SourceConfig,
    context::SourceLink,
    descriptor::{PresentationDescriptor, StreamDescriptor},
    error::{SourceError, SourceResult},
    events::SourceEvent,
    operation::{Operation, OperationKind},
    producer::{DataProducer, NullProducer, SampleSink},
    stream::{MediaStream, StreamCore},
    types::{Characteristics, SourceState, StartPosition, StreamId, TimeFormat},
};

/// A pull-mode media source.
///
/// Cheap to clone; clones share the same source. The operation queue stops
/// when the last clone is dropped or the configured cancel token fires.
///
/// ```ignore
/// let source = MediaSource::with_producer(SourceConfig::default(), producer)?;
/// let pd = source.create_presentation_descriptor()?;
/// source.start(Some(&pd), None, Some(StartPosition::ZERO))?;
/// source.flush().await?;
///
/// let video = source.stream(StreamId(0)).unwrap();
/// video.request_sample(Some(Token::new(1)))?;
/// let event = video.events().next().await?;
/// ```
#[derive(Clone)]
pub struct MediaSource {
    shared: Arc<SourceShared>,
}

impl MediaSource {
    /// Create a source whose samples are pushed through
    /// [`MediaStream::deliver`].
    ///
    /// # Errors
    ///
    /// [`SourceError::InvalidArgument`] for duplicate stream ids or a zero
    /// low-water mark.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(config: SourceConfig) -> SourceResult<Self> {
        Self::with_producer(config, NullProducer)
    }

    /// Create a source that pulls samples from `producer`.
    ///
    /// # Errors
    ///
    /// See [`MediaSource::new`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_producer<P: DataProducer>(config: SourceConfig, producer: P) -> SourceResult<Self> {
        if config.low_water_mark == 0 {
            return Err(SourceError::InvalidArgument("low water mark must be positive"));
        }
        let descriptor = PresentationDescriptor::new(config.streams)?;
        let cancel = config
            .cancel
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let name = config.name.unwrap_or_else(|| "media-source".to_owned());
        let low_water_mark = config.low_water_mark;

        let shared = Arc::new_cyclic(|weak: &Weak<SourceShared>| {
            let cores: Vec<StreamCore> = descriptor
                .streams()
                .iter()
                .map(|d| StreamCore::new(d.clone(), low_water_mark))
                .collect();
            let streams = cores
                .iter()
                .enumerate()
                .map(|(index, core)| MediaStream::new(index, core, weak.clone()))
                .collect();
            let ops = OperationQueue::spawn(
                SourceOpHandler {
                    source: weak.clone(),
                },
                &cancel,
            );

            SourceShared {
                name,
                inner: Mutex::new(SourceInner::new(cores, descriptor, Box::new(producer))),
                events: EventQueue::new(),
                ops,
                cancel: cancel.clone(),
                streams,
            }
        });

        shared.open();
        Ok(Self { shared })
    }

    pub(crate) fn from_shared(shared: Arc<SourceShared>) -> Self {
        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn characteristics(&self) -> Characteristics {
        Characteristics::CAN_PAUSE
    }

    /// Copy of the current stream selection.
    ///
    /// # Errors
    ///
    /// [`SourceError::InvalidRequest`] after shutdown.
    pub fn create_presentation_descriptor(&self) -> SourceResult<PresentationDescriptor> {
        let inner = self.shared.inner.lock();
        if inner.state == SourceState::Shutdown {
            return Err(SourceError::InvalidRequest);
        }
        Ok(inner.descriptor.clone())
    }

    /// Start or restart the presentation.
    ///
    /// Validates the arguments and queues a `Start` operation. Completion is
    /// signaled by [`SourceEvent::SourceStarted`] on [`events`](Self::events).
    ///
    /// Seeking is not supported: an absolute position must be zero and is
    /// only accepted while the source is stopped.
    ///
    /// # Errors
    ///
    /// - [`SourceError::InvalidArgument`] if the descriptor or position is
    ///   missing, or the descriptor names a stream this source does not have.
    /// - [`SourceError::UnsupportedTimeFormat`] for a non-reference time
    ///   format or a position in format-specific units.
    /// - [`SourceError::InvalidRequest`] for a seek, or after shutdown.
    pub fn start(
        &self,
        descriptor: Option<&PresentationDescriptor>,
        time_format: Option<TimeFormat>,
        position: Option<StartPosition>,
    ) -> SourceResult<()> {
        let (Some(descriptor), Some(position)) = (descriptor, position) else {
            return Err(SourceError::InvalidArgument(
                "presentation descriptor and start position are required",
            ));
        };
        if time_format.is_some_and(|format| format != TimeFormat::Reference) {
            return Err(SourceError::UnsupportedTimeFormat);
        }
        if let StartPosition::Units(_) = position {
            return Err(SourceError::UnsupportedTimeFormat);
        }

        let inner = self.shared.inner.lock();
        if inner.state == SourceState::Shutdown {
            return Err(SourceError::InvalidRequest);
        }
        if let StartPosition::Absolute(time) = position
            && (inner.state != SourceState::Stopped || !time.is_zero())
        {
            debug!(source = %self.shared.name, state = ?inner.state, ?time, "seek rejected");
            return Err(SourceError::InvalidRequest);
        }
        if descriptor
            .streams()
            .iter()
            .any(|stream| !inner.descriptor.contains(stream.id()))
        {
            return Err(SourceError::InvalidArgument(
                "presentation descriptor names an unknown stream",
            ));
        }

        self.shared.ops.enqueue(Operation::Start {
            descriptor: descriptor.clone(),
            position,
        })?;
        Ok(())
    }

    /// Queue a `Stop`. Signaled by [`SourceEvent::SourceStopped`].
    pub fn stop(&self) -> SourceResult<()> {
        self.enqueue_control(Operation::Stop)
    }

    /// Queue a `Pause`. Signaled by [`SourceEvent::SourcePaused`]; fails
    /// asynchronously with an error event unless the source is started by
    /// the time the pause is dispatched.
    pub fn pause(&self) -> SourceResult<()> {
        self.enqueue_control(Operation::Pause)
    }

    /// Terminal transition.
    ///
    /// Every stream is shut down with its buffers cleared, all event queues
    /// are shut down, and operations still queued become silent no-ops.
    /// Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state == SourceState::Shutdown {
            return;
        }
        inner.shutdown();
        drop(inner);

        self.shared.events.shutdown();
        debug!(source = %self.shared.name, "source shut down");
    }

    pub fn state(&self) -> SourceState {
        self.shared.inner.lock().state
    }

    /// Handle to the stream with `id`.
    pub fn stream(&self, id: StreamId) -> Option<MediaStream> {
        self.shared.streams.iter().find(|s| s.id() == id).cloned()
    }

    pub fn streams(&self) -> &[MediaStream] {
        &self.shared.streams
    }

    pub fn stream_count(&self) -> usize {
        self.shared.streams.len()
    }

    /// The source's event queue.
    pub fn events(&self) -> &EventQueue<SourceEvent> {
        &self.shared.events
    }

    /// Active streams that still have to reach end-of-stream.
    pub fn pending_end_of_stream(&self) -> usize {
        self.shared.inner.lock().pending_eos
    }

    /// Wait until every queued operation, including those queued by
    /// dispatches in the meantime, has been processed.
    pub async fn flush(&self) -> SourceResult<()> {
        self.shared.ops.settle().await?;
        Ok(())
    }

    fn enqueue_control(&self, op: Operation) -> SourceResult<()> {
        let inner = self.shared.inner.lock();
        if inner.state == SourceState::Shutdown {
            return Err(SourceError::InvalidRequest);
        }
        self.shared.ops.enqueue(op)?;
        Ok(())
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSource")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("streams", &self.shared.streams.len())
            .finish_non_exhaustive()
    }
}

pub(crate) struct SourceShared {
    name: String,
    inner: Mutex<SourceInner>,
    events: EventQueue<SourceEvent>,
    ops: OperationQueue<Operation>,
    cancel: CancellationToken,
    streams: Vec<MediaStream>,
}

impl SourceShared {
    fn open(&self) {
        let mut inner = self.inner.lock();
        inner.state = SourceState::Opening;
        trace!(source = %self.name, "opening");
        inner.state = SourceState::Stopped;
        debug!(source = %self.name, streams = inner.streams.len(), "source opened");
    }

    /// Run `f` on the stream at `index` with the source lock held.
    pub(crate) fn with_stream<T>(
        &self,
        index: usize,
        f: impl FnOnce(&mut StreamCore, &Self) -> SourceResult<T>,
    ) -> SourceResult<T> {
        let mut inner = self.inner.lock();
        let core = inner
            .streams
            .get_mut(index)
            .ok_or(SourceError::InternalInconsistency("stream index out of range"))?;
        f(core, self)
    }

    fn dispatch(&self, op: Operation) -> SourceResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == SourceState::Shutdown {
            trace!(source = %self.name, op = %op.kind(), "ignored after shutdown");
            return Ok(());
        }
        debug!(source = %self.name, op = %op.kind(), state = ?inner.state, "dispatching");

        match op {
            Operation::Start {
                descriptor,
                position,
            } => inner.with_current(OperationKind::Start, |inner| {
                inner.start(&descriptor, position, self)
            }),
            Operation::Stop => inner.with_current(OperationKind::Stop, |inner| inner.stop(self)),
            Operation::Pause => inner.with_current(OperationKind::Pause, |inner| inner.pause(self)),
            Operation::RequestData { stream } => inner.request_data(stream, self),
            Operation::EndOfStream { stream } => inner.end_of_stream(stream, self),
        }
    }

    fn report(&self, error: SourceError) {
        if self.inner.lock().state == SourceState::Shutdown {
            trace!(source = %self.name, %error, "error after shutdown suppressed");
            return;
        }
        warn!(source = %self.name, %error, "operation failed");
        let _ = self.events.post(SourceEvent::Error { error });
    }
}

impl SourceLink for SourceShared {
    fn post_source_event(&self, event: SourceEvent) -> SourceResult<()> {
        self.events.post(event)?;
        Ok(())
    }

    fn queue_operation(&self, op: Operation) -> SourceResult<()> {
        self.ops.enqueue(op)?;
        Ok(())
    }
}

impl Drop for SourceShared {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State guarded by the source lock.
struct SourceInner {
    state: SourceState,
    streams: Vec<StreamCore>,
    descriptor: PresentationDescriptor,
    /// Active streams whose end-of-stream has not been counted yet.
    pending_eos: usize,
    presentation_ended: bool,
    /// Operation being dispatched.
    current: Option<OperationKind>,
    producer: Box<dyn DataProducer>,
}

impl SourceInner {
    fn new(
        streams: Vec<StreamCore>,
        descriptor: PresentationDescriptor,
        producer: Box<dyn DataProducer>,
    ) -> Self {
        Self {
            state: SourceState::Invalid,
            streams,
            descriptor,
            pending_eos: 0,
            presentation_ended: false,
            current: None,
            producer,
        }
    }

    /// Run a state transition as the current operation.
    fn with_current(
        &mut self,
        kind: OperationKind,
        f: impl FnOnce(&mut Self) -> SourceResult<()>,
    ) -> SourceResult<()> {
        debug_assert!(
            self.current.is_none(),
            "{kind} dispatched while another operation is in flight"
        );
        if self.current.is_some() {
            return Err(SourceError::InternalInconsistency(
                "operation dispatched while another is in flight",
            ));
        }
        self.current = Some(kind);
        let result = f(self);
        self.current = None;
        result
    }

    fn start(
        &mut self,
        descriptor: &PresentationDescriptor,
        position: StartPosition,
        link: &impl SourceLink,
    ) -> SourceResult<()> {
        if self.state == SourceState::Stopped {
            self.presentation_ended = false;
        }

        let pending_before = self.pending_eos;
        self.select_streams(descriptor, position, link)?;

        let ids: Vec<StreamId> = self.descriptor.streams().iter().map(StreamDescriptor::id).collect();
        for id in ids {
            if descriptor.is_selected(id) {
                self.descriptor.select(id)?;
            } else {
                self.descriptor.deselect(id)?;
            }
        }

        self.state = SourceState::Started;
        debug!(pending_eos = self.pending_eos, ?position, "source started");
        link.post_source_event(SourceEvent::SourceStarted { position })?;

        // Deselecting the last unfinished stream ends the presentation.
        if pending_before > 0 && self.streams.iter().any(StreamCore::is_active) {
            self.end_presentation_if_done(link)?;
        }
        Ok(())
    }

    /// Activate the selected streams and start them; deactivate the rest.
    fn select_streams(
        &mut self,
        descriptor: &PresentationDescriptor,
        position: StartPosition,
        link: &impl SourceLink,
    ) -> SourceResult<()> {
        self.pending_eos = 0;

        for core in &mut self.streams {
            let selected = descriptor.is_selected(core.id());
            let was_active = core.is_active();
            core.activate(selected);
            if !selected {
                continue;
            }

            if core.awaits_end_of_stream() {
                self.pending_eos += 1;
            }
            let stream = core.id();
            let event = if was_active {
                SourceEvent::UpdatedStream { stream }
            } else {
                SourceEvent::NewStream { stream }
            };
            link.post_source_event(event)?;
            core.start(position, link)?;
        }

        Ok(())
    }

    fn stop(&mut self, link: &impl SourceLink) -> SourceResult<()> {
        for core in &mut self.streams {
            if core.is_active() {
                core.stop()?;
            } else {
                core.rewind();
            }
        }
        self.state = SourceState::Stopped;
        self.pending_eos = 0;
        self.presentation_ended = false;
        link.post_source_event(SourceEvent::SourceStopped)
    }

    fn pause(&mut self, link: &impl SourceLink) -> SourceResult<()> {
        if self.state != SourceState::Started {
            return Err(SourceError::InvalidRequest);
        }
        self.state = SourceState::Paused;
        link.post_source_event(SourceEvent::SourcePaused)
    }

    fn request_data(&mut self, stream: StreamId, link: &impl SourceLink) -> SourceResult<()> {
        let core = self
            .streams
            .iter_mut()
            .find(|core| core.id() == stream)
            .ok_or(SourceError::UnknownStream(stream))?;
        if !core.wants_data() {
            trace!(%stream, "stale data request");
            return Ok(());
        }

        let mut sink = SampleSink::new(core);
        self.producer.request_data(stream, &mut sink)?;
        if sink.produced() {
            core.dispatch_samples(link)?;
        }
        Ok(())
    }

    fn end_of_stream(&mut self, stream: StreamId, link: &impl SourceLink) -> SourceResult<()> {
        let core = self
            .streams
            .iter_mut()
            .find(|core| core.id() == stream)
            .ok_or(SourceError::UnknownStream(stream))?;
        if !core.account_end_of_stream() {
            trace!(%stream, "stale end of stream");
            return Ok(());
        }

        if self.pending_eos == 0 {
            return Err(SourceError::InternalInconsistency(
                "end of stream with no stream pending",
            ));
        }
        self.pending_eos -= 1;
        debug!(%stream, remaining = self.pending_eos, "stream ended");

        self.end_presentation_if_done(link)
    }

    /// Post `EndOfPresentation` once no active stream is left to finish.
    fn end_presentation_if_done(&mut self, link: &impl SourceLink) -> SourceResult<()> {
        if self.pending_eos == 0 && !self.presentation_ended {
            self.presentation_ended = true;
            debug!("end of presentation");
            link.post_source_event(SourceEvent::EndOfPresentation)?;
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.state = SourceState::Shutdown;
        self.pending_eos = 0;
        for core in &mut self.streams {
            core.shutdown();
        }
    }
}

/// Bridges the operation queue to the source it serves.
struct SourceOpHandler {
    source: Weak<SourceShared>,
}

impl OperationHandler for SourceOpHandler {
    type Op = Operation;
    type Error = SourceError;

    fn validate(&mut self, op: &Operation) -> SourceResult<()> {
        let Some(source) = self.source.upgrade() else {
            return Ok(());
        };
        let inner = source.inner.lock();
        if let Some(current) = inner.current {
            debug!(source = %source.name, %current, rejected = %op.kind(), "operation in flight");
            return Err(SourceError::InvalidRequest);
        }
        Ok(())
    }

    fn dispatch(&mut self, op: Operation) -> SourceResult<()> {
        match self.source.upgrade() {
            Some(source) => source.dispatch(op),
            None => {
                trace!(op = %op.kind(), "source dropped");
                Ok(())
            }
        }
    }

    fn report(&mut self, error: SourceError) {
        if let Some(source) = self.source.upgrade() {
            source.report(error);
        }
    }
}
