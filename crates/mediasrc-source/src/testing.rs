//! Test helpers: scripted producers and event draining.

use std::{collections::HashMap, sync::Arc, time::Duration};

use mediasrc_events::EventQueue;
use parking_lot::Mutex;

use crate::{
    DataProducer, MediaKind, MediaSample, SampleSink, SourceConfig, SourceResult,
    StreamDescriptor, StreamId,
};

/// Sample `n` of a 10 ms cadence with a one-byte payload.
pub fn sample(n: u64) -> MediaSample {
    MediaSample::new(
        Duration::from_millis(n * 10),
        Duration::from_millis(10),
        vec![(n % 256) as u8],
    )
}

/// Config with `count` selected audio streams, ids `0..count`.
pub fn config_with_streams(count: u32) -> SourceConfig {
    SourceConfig::new(
        (0..count)
            .map(|id| StreamDescriptor::new(id, MediaKind::Audio).with_selected(true))
            .collect(),
    )
}

/// Take every queued event without waiting.
pub fn drain<E>(queue: &EventQueue<E>) -> Vec<E> {
    std::iter::from_fn(|| queue.try_next()).collect()
}

/// Shared record of `request_data` calls.
#[derive(Debug, Clone, Default)]
pub struct ProducerLog(Arc<Mutex<Vec<StreamId>>>);

impl ProducerLog {
    pub fn calls(&self) -> Vec<StreamId> {
        self.0.lock().clone()
    }

    pub fn count(&self, stream: StreamId) -> usize {
        self.0.lock().iter().filter(|&&s| s == stream).count()
    }
}

/// Producer with a fixed number of samples per stream.
///
/// Each call pushes up to `batch` samples; once `total` samples have been
/// produced for a stream it marks the stream ended.
#[derive(Debug)]
pub struct ScriptedProducer {
    total: u64,
    batch: u64,
    produced: HashMap<StreamId, u64>,
    log: ProducerLog,
}

impl ScriptedProducer {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            batch: 1,
            produced: HashMap::new(),
            log: ProducerLog::default(),
        }
    }

    #[must_use]
    pub fn with_batch(mut self, batch: u64) -> Self {
        self.batch = batch.max(1);
        self
    }

    pub fn log(&self) -> ProducerLog {
        self.log.clone()
    }
}

impl DataProducer for ScriptedProducer {
    fn request_data(&mut self, stream: StreamId, sink: &mut SampleSink<'_>) -> SourceResult<()> {
        self.log.0.lock().push(stream);

        let produced = self.produced.entry(stream).or_insert(0);
        for _ in 0..self.batch {
            if *produced >= self.total {
                break;
            }
            sink.push(sample(*produced))?;
            *produced += 1;
        }
        if *produced >= self.total {
            sink.end_of_stream()?;
        }
        Ok(())
    }
}
