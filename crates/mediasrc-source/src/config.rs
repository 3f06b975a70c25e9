#![forbid(unsafe_code)]

use tokio_util::sync::CancellationToken;

use crate::{descriptor::StreamDescriptor, types::MediaKind};

/// Default sample-buffer low-water mark.
pub const DEFAULT_LOW_WATER_MARK: usize = 2;

/// Configuration for a media source.
///
/// Used with `MediaSource::new(config)`.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Parent cancellation token. The source stops its operation queue when
    /// this fires or when the source is dropped.
    pub cancel: Option<CancellationToken>,
    /// A stream asks for more data while it buffers fewer samples than this.
    pub low_water_mark: usize,
    /// Name used in log fields.
    pub name: Option<String>,
    /// Stream layout. Fixed for the lifetime of the source.
    pub streams: Vec<StreamDescriptor>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::new(vec![
            StreamDescriptor::new(0, MediaKind::Video).with_selected(true),
            StreamDescriptor::new(1, MediaKind::Audio).with_selected(true),
        ])
    }
}

impl SourceConfig {
    /// Create config with the given stream layout and default settings.
    #[must_use]
    pub fn new(streams: Vec<StreamDescriptor>) -> Self {
        Self {
            cancel: None,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            name: None,
            streams,
        }
    }

    /// Set cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Set the backpressure threshold.
    #[must_use]
    pub fn with_low_water_mark(mut self, samples: usize) -> Self {
        self.low_water_mark = samples;
        self
    }

    #[must_use]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_two_selected_streams() {
        let config = SourceConfig::default();
        assert_eq!(config.streams.len(), 2);
        assert!(config.streams.iter().all(StreamDescriptor::is_selected));
        assert_eq!(config.low_water_mark, DEFAULT_LOW_WATER_MARK);
        assert!(config.cancel.is_none());
    }

    #[test]
    fn builders_apply() {
        let config = SourceConfig::default()
            .with_low_water_mark(5)
            .with_name("camera");
        assert_eq!(config.low_water_mark, 5);
        assert_eq!(config.name.as_deref(), Some("camera"));
    }
}
