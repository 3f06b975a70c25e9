//! Per-stream sample buffer.
//!
//! Holds produced samples and pending consumer requests and pairs them in
//! strict FIFO order: the oldest request receives the oldest sample.

#![forbid(unsafe_code)]

use std::collections::VecDeque;

use crate::{
    error::{SourceError, SourceResult},
    types::{MediaSample, Token},
};

#[derive(Debug)]
pub(crate) struct SampleBuffer {
    samples: VecDeque<MediaSample>,
    requests: VecDeque<Option<Token>>,
    low_water_mark: usize,
}

impl SampleBuffer {
    pub(crate) fn new(low_water_mark: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            requests: VecDeque::new(),
            low_water_mark,
        }
    }

    pub(crate) fn push_sample(&mut self, sample: MediaSample) -> SourceResult<()> {
        self.samples
            .try_reserve(1)
            .map_err(|_| SourceError::OutOfMemory)?;
        self.samples.push_back(sample);
        Ok(())
    }

    pub(crate) fn push_request(&mut self, token: Option<Token>) -> SourceResult<()> {
        self.requests
            .try_reserve(1)
            .map_err(|_| SourceError::OutOfMemory)?;
        self.requests.push_back(token);
        Ok(())
    }

    /// Pop the next (request, sample) pair, returning the sample with the
    /// request's token attached.
    pub(crate) fn next_delivery(&mut self) -> Option<MediaSample> {
        if self.samples.is_empty() || self.requests.is_empty() {
            return None;
        }
        let mut sample = self.samples.pop_front()?;
        sample.token = self.requests.pop_front()?;
        Some(sample)
    }

    pub(crate) fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn has_samples(&self) -> bool {
        !self.samples.is_empty()
    }

    pub(crate) fn below_low_water(&self) -> bool {
        self.samples.len() < self.low_water_mark
    }

    /// Drop every buffered sample and pending request.
    pub(crate) fn clear(&mut self) {
        self.samples.clear();
        self.requests.clear();
    }
}
