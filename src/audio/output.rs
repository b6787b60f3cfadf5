// Audio output facility - What the scheduler needs from the device layer

use crate::sequencer::metronome::VoiceBuffer;
use thiserror::Error;

/// When a buffer starts playing on the output timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayAt {
    /// As soon as the output processes the request
    Immediately,
    /// At an absolute sample position on the output timeline
    Sample(u64),
}

/// Identifies one scheduled buffer when its playback completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackTicket {
    /// Schedule generation; bumped on every stop/restart
    pub generation: u64,
    /// Monotonic click counter within the scheduler
    pub sequence: u64,
}

impl PlaybackTicket {
    /// True if `self` is `from` or was scheduled after it in the same generation
    pub fn is_at_or_after(&self, from: PlaybackTicket) -> bool {
        self.generation == from.generation && self.sequence >= from.sequence
    }
}

/// One buffer handed to the output
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub buffer: VoiceBuffer,
    pub at: PlayAt,
    pub ticket: PlaybackTicket,
}

/// Lower-level audio output used by the click scheduler
///
/// Implementations report finished buffers by pushing the request's ticket
/// into the completion channel they were built with; the scheduler context
/// drains that channel itself.
pub trait AudioOutput {
    /// Sample rate of the output timeline
    fn sample_rate(&self) -> u32;

    /// Queue a buffer for playback
    fn play(&mut self, request: PlayRequest);

    /// Current position on the output timeline
    /// None while the output cannot report one yet (e.g. before its first callback).
    fn current_position(&self) -> Option<u64>;

    /// Drop every queued or sounding buffer without reporting completion
    fn stop_all(&mut self);

    /// Drop the buffers of `from`'s generation whose sequence is at or after
    /// `from.sequence`, without reporting completion
    fn cancel_from(&mut self, from: PlaybackTicket);
}

impl<T: AudioOutput + ?Sized> AudioOutput for Box<T> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn play(&mut self, request: PlayRequest) {
        (**self).play(request)
    }

    fn current_position(&self) -> Option<u64> {
        (**self).current_position()
    }

    fn stop_all(&mut self) {
        (**self).stop_all()
    }

    fn cancel_from(&mut self, from: PlaybackTicket) {
        (**self).cancel_from(from)
    }
}

/// Errors opening a real output device
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Device configuration error: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
}
