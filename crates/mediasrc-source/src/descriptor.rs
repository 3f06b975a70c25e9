//! Presentation and stream descriptors.
//!
//! A [`PresentationDescriptor`] lists the streams of a source together with
//! their selection flags. The source hands out clones of its current
//! selection; a caller passes one to `start` to choose the streams it wants.

#![forbid(unsafe_code)]

use crate::{
    error::{SourceError, SourceResult},
    types::{MediaKind, StreamId},
};

/// Identity and selection of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    id: StreamId,
    kind: MediaKind,
    selected: bool,
}

impl StreamDescriptor {
    /// Create an unselected descriptor.
    pub fn new(id: u32, kind: MediaKind) -> Self {
        Self {
            id: StreamId(id),
            kind,
            selected: false,
        }
    }

    #[must_use]
    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }
}

/// Ordered set of stream descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresentationDescriptor {
    streams: Vec<StreamDescriptor>,
}

impl PresentationDescriptor {
    /// Build a descriptor, rejecting duplicate stream ids.
    pub fn new(streams: Vec<StreamDescriptor>) -> SourceResult<Self> {
        for (i, stream) in streams.iter().enumerate() {
            if streams[..i].iter().any(|other| other.id == stream.id) {
                return Err(SourceError::InvalidArgument("duplicate stream id"));
            }
        }
        Ok(Self { streams })
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    pub fn get(&self, id: StreamId) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.get(id).is_some()
    }

    /// Whether `id` is present and selected.
    pub fn is_selected(&self, id: StreamId) -> bool {
        self.get(id).is_some_and(StreamDescriptor::is_selected)
    }

    pub fn select(&mut self, id: StreamId) -> SourceResult<()> {
        self.set_selected(id, true)
    }

    pub fn deselect(&mut self, id: StreamId) -> SourceResult<()> {
        self.set_selected(id, false)
    }

    /// Ids of the selected streams, in descriptor order.
    pub fn selected_ids(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.streams.iter().filter(|s| s.selected).map(|s| s.id)
    }

    fn set_selected(&mut self, id: StreamId, selected: bool) -> SourceResult<()> {
        let stream = self
            .streams
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(SourceError::UnknownStream(id))?;
        stream.selected = selected;
        Ok(())
    }
}
