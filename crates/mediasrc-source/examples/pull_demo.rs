//! Pull a synthetic two-stream presentation to its end.
//!
//! ```
//! cargo run -p mediasrc-source --example pull_demo [SAMPLES]
//! ```

use std::{env::args, error::Error, time::Duration};

use mediasrc_source::{
    DataProducer, MediaSample, MediaSource, SampleSink, SourceConfig, SourceError, SourceEvent,
    SourceResult, StartPosition, StreamEvent, StreamId, Token,
};
use tracing::{info, metadata::LevelFilter};
use tracing_subscriber::EnvFilter;

/// Emits `frames` samples per stream at 40 ms (video) or 20 ms (audio).
struct Synthetic {
    frames: u64,
    next: [u64; 2],
}

impl DataProducer for Synthetic {
    fn request_data(&mut self, stream: StreamId, sink: &mut SampleSink<'_>) -> SourceResult<()> {
        let slot = (stream.0 as usize).min(1);
        let step = if stream.0 == 0 { 40 } else { 20 };
        let n = self.next[slot];
        if n < self.frames {
            let payload = vec![0u8; if stream.0 == 0 { 4096 } else { 512 }];
            sink.push(MediaSample::new(
                Duration::from_millis(n * step),
                Duration::from_millis(step),
                payload,
            ))?;
            self.next[slot] += 1;
        }
        if self.next[slot] >= self.frames {
            sink.end_of_stream()?;
        }
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::default()
                .add_directive("mediasrc_source=debug".parse()?)
                .add_directive(LevelFilter::INFO.into()),
        )
        .with_line_number(false)
        .with_file(false)
        .init();

    let frames: u64 = args().nth(1).map_or(Ok(25), |s| s.parse())?;
    let producer = Synthetic {
        frames,
        next: [0; 2],
    };
    let source = MediaSource::with_producer(SourceConfig::default().with_name("demo"), producer)?;

    let pd = source.create_presentation_descriptor()?;
    source.start(Some(&pd), None, Some(StartPosition::ZERO))?;

    let mut consumers = Vec::new();
    for stream in source.streams().iter().cloned() {
        consumers.push(tokio::spawn(async move {
            let mut received = 0u64;
            let mut token = 0u64;
            loop {
                match stream.events().next().await? {
                    StreamEvent::StreamStarted { position } => {
                        info!(stream = %stream.id(), ?position, "stream started");
                    }
                    StreamEvent::Sample(sample) => {
                        received += 1;
                        info!(
                            stream = %stream.id(),
                            time = ?sample.time,
                            bytes = sample.data.len(),
                            token = ?sample.token,
                            "sample"
                        );
                    }
                    StreamEvent::EndOfStream => break,
                    StreamEvent::StreamStopped => continue,
                }
                match stream.request_sample(Some(Token::new(token))) {
                    // The last sample is out; the end-of-stream event follows.
                    Ok(()) | Err(SourceError::EndOfStream) => token += 1,
                    Err(error) => return Err(error.into()),
                }
            }
            Ok::<_, Box<dyn Error + Send + Sync>>(received)
        }));
    }

    loop {
        match source.events().next().await? {
            SourceEvent::EndOfPresentation => {
                info!("end of presentation");
                break;
            }
            SourceEvent::Error { error } => return Err(error.into()),
            event => info!(?event),
        }
    }

    for consumer in consumers {
        let received = consumer.await??;
        info!(received, "consumer finished");
    }

    source.shutdown();
    Ok(())
}
