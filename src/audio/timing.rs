// Audio timing utilities for sample-accurate click scheduling

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared output timeline counter
/// Advanced by whoever renders audio, read by the scheduler thread.
#[derive(Debug, Clone)]
pub struct AudioTiming {
    /// Current sample position (incremented by the render callback)
    sample_position: Arc<AtomicU64>,
    /// Set once the first block has been rendered
    started: Arc<AtomicBool>,
    sample_rate: u32,
}

impl AudioTiming {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            started: Arc::new(AtomicBool::new(false)),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Current sample position, None until the timeline has started
    pub fn current_sample(&self) -> Option<u64> {
        if self.started.load(Ordering::Acquire) {
            Some(self.sample_position.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Advance sample position (called from the render callback)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::AcqRel);
        self.started.store(true, Ordering::Release);
    }

    /// Mark the timeline as running without advancing it
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Convert a sample count to wall-clock duration
    pub fn samples_to_duration(&self, samples: u64) -> Duration {
        samples_to_duration(samples, self.sample_rate)
    }

    /// Convert a duration to a sample count (truncating)
    pub fn duration_to_samples(&self, duration: Duration) -> u64 {
        duration_to_samples(duration, self.sample_rate)
    }
}

pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(samples as f64 / sample_rate.max(1) as f64)
}

pub fn duration_to_samples(duration: Duration, sample_rate: u32) -> u64 {
    (duration.as_secs_f64() * sample_rate as f64) as u64
}

/// Maps output timeline positions to `Instant`s
///
/// Anchored on the last (position, instant) pair observed from the output;
/// estimates extrapolate linearly from there.
#[derive(Debug, Clone, Copy)]
pub struct TimelineClock {
    sample_rate: u32,
    reference: Option<(u64, Instant)>,
}

impl TimelineClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            reference: None,
        }
    }

    /// Record that the output reported `position` at `now`
    pub fn observe(&mut self, position: u64, now: Instant) {
        self.reference = Some((position, now));
    }

    pub fn reset(&mut self) {
        self.reference = None;
    }

    pub fn is_synced(&self) -> bool {
        self.reference.is_some()
    }

    /// Estimated timeline position at `now`
    pub fn estimate_position(&self, now: Instant) -> Option<u64> {
        let (position, at) = self.reference?;
        let elapsed = now.saturating_duration_since(at);
        Some(position + duration_to_samples(elapsed, self.sample_rate))
    }

    /// Estimated instant at which the output reaches `sample_time`
    pub fn instant_for(&self, sample_time: u64) -> Option<Instant> {
        let (position, at) = self.reference?;
        if sample_time >= position {
            Some(at + samples_to_duration(sample_time - position, self.sample_rate))
        } else {
            let behind = samples_to_duration(position - sample_time, self.sample_rate);
            Some(at.checked_sub(behind).unwrap_or(at))
        }
    }
}
