// Offline output - Output facility driven by explicit render calls
//
// Behaves like a device callback: `render` mixes scheduled buffers into a block,
// advances the timeline and reports finished buffers. Clones share state, so one
// handle can live in the scheduler while another plays the audio thread.

use crate::audio::output::{AudioOutput, PlayAt, PlayRequest, PlaybackTicket};
use crate::audio::timing::AudioTiming;
use crate::messaging::channels::CompletionProducer;
use crate::sequencer::metronome::VoiceBuffer;
use ringbuf::traits::Producer;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A play request as the output received it
#[derive(Debug, Clone)]
pub struct PlayRecord {
    pub ticket: PlaybackTicket,
    pub at: PlayAt,
    /// Timeline position the buffer starts at
    pub start_sample: u64,
    pub buffer: VoiceBuffer,
}

#[derive(Debug)]
struct ActivePlayback {
    buffer: VoiceBuffer,
    start_sample: u64,
    ticket: PlaybackTicket,
}

struct OfflineState {
    active: Vec<ActivePlayback>,
    history: Vec<PlayRecord>,
    completions: CompletionProducer,
    stop_count: usize,
}

#[derive(Clone)]
pub struct OfflineOutput {
    state: Arc<Mutex<OfflineState>>,
    timing: AudioTiming,
}

impl OfflineOutput {
    /// Output whose timeline reports no position until the first render
    pub fn new(sample_rate: u32, completions: CompletionProducer) -> Self {
        Self {
            state: Arc::new(Mutex::new(OfflineState {
                active: Vec::new(),
                history: Vec::new(),
                completions,
                stop_count: 0,
            })),
            timing: AudioTiming::new(sample_rate),
        }
    }

    /// Output whose timeline is already running at position 0
    pub fn started(sample_rate: u32, completions: CompletionProducer) -> Self {
        let output = Self::new(sample_rate, completions);
        output.timing.mark_started();
        output
    }

    pub fn timing(&self) -> &AudioTiming {
        &self.timing
    }

    /// Render one mono block, advancing the timeline by `frames`
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut block = vec![0.0f32; frames];
        let block_start = self.timing.current_sample().unwrap_or(0);
        let block_end = block_start + frames as u64;

        {
            let mut state = self.lock();
            let OfflineState {
                active,
                completions,
                ..
            } = &mut *state;

            active.retain(|playback| {
                let end = playback.start_sample + playback.buffer.len() as u64;
                let from = playback.start_sample.max(block_start);
                let to = end.min(block_end);

                for t in from..to {
                    let sample = playback.buffer.samples()[(t - playback.start_sample) as usize];
                    block[(t - block_start) as usize] += sample;
                }

                if end <= block_end {
                    // Full completion ring: the scheduler drops the click on its next teardown
                    let _ = completions.try_push(playback.ticket);
                    false
                } else {
                    true
                }
            });
        }

        self.timing.advance(frames);
        block
    }

    /// Every request received so far
    pub fn history(&self) -> Vec<PlayRecord> {
        self.lock().history.clone()
    }

    /// Buffers queued or sounding
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn stop_count(&self) -> usize {
        self.lock().stop_count
    }

    fn lock(&self) -> MutexGuard<'_, OfflineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioOutput for OfflineOutput {
    fn sample_rate(&self) -> u32 {
        self.timing.sample_rate()
    }

    fn play(&mut self, request: PlayRequest) {
        let now = self.timing.current_sample().unwrap_or(0);
        let start_sample = match request.at {
            PlayAt::Immediately => now,
            PlayAt::Sample(sample) => sample.max(now),
        };

        let mut state = self.lock();
        state.history.push(PlayRecord {
            ticket: request.ticket,
            at: request.at,
            start_sample,
            buffer: request.buffer.clone(),
        });
        state.active.push(ActivePlayback {
            buffer: request.buffer,
            start_sample,
            ticket: request.ticket,
        });
    }

    fn current_position(&self) -> Option<u64> {
        self.timing.current_sample()
    }

    fn stop_all(&mut self) {
        let mut state = self.lock();
        state.active.clear();
        state.stop_count += 1;
    }

    fn cancel_from(&mut self, from: PlaybackTicket) {
        self.lock()
            .active
            .retain(|playback| !playback.ticket.is_at_or_after(from));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::create_completion_channel;
    use ringbuf::traits::Consumer;

    fn ticket(sequence: u64) -> PlaybackTicket {
        PlaybackTicket {
            generation: 0,
            sequence,
        }
    }

    #[test]
    fn test_position_unavailable_until_render() {
        let (tx, _rx) = create_completion_channel(8);
        let output = OfflineOutput::new(48000, tx);
        assert_eq!(output.current_position(), None);
        output.render(64);
        assert_eq!(output.current_position(), Some(64));
    }

    #[test]
    fn test_scheduled_buffer_lands_at_sample() {
        let (tx, mut rx) = create_completion_channel(8);
        let mut output = OfflineOutput::started(48000, tx);

        output.play(PlayRequest {
            buffer: VoiceBuffer::new(vec![1.0, 1.0, 1.0]),
            at: PlayAt::Sample(10),
            ticket: ticket(7),
        });

        let block = output.render(16);
        assert_eq!(&block[9..14], &[0.0, 1.0, 1.0, 1.0, 0.0]);
        assert_eq!(rx.try_pop(), Some(ticket(7)));
        assert_eq!(output.active_count(), 0);
    }

    #[test]
    fn test_buffer_spanning_blocks_completes_once() {
        let (tx, mut rx) = create_completion_channel(8);
        let mut output = OfflineOutput::started(48000, tx);

        output.play(PlayRequest {
            buffer: VoiceBuffer::new(vec![0.5; 10]),
            at: PlayAt::Immediately,
            ticket: ticket(1),
        });

        output.render(4);
        assert_eq!(rx.try_pop(), None);
        output.render(4);
        assert_eq!(rx.try_pop(), None);
        output.render(4);
        assert_eq!(rx.try_pop(), Some(ticket(1)));
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_stop_all_drops_without_completion() {
        let (tx, mut rx) = create_completion_channel(8);
        let mut output = OfflineOutput::started(48000, tx);

        output.play(PlayRequest {
            buffer: VoiceBuffer::new(vec![0.5; 10]),
            at: PlayAt::Sample(100),
            ticket: ticket(1),
        });
        output.stop_all();
        output.render(256);

        assert_eq!(rx.try_pop(), None);
        assert_eq!(output.stop_count(), 1);
        assert_eq!(output.history().len(), 1);
    }

    #[test]
    fn test_cancel_from_keeps_earlier_buffers() {
        let (tx, mut rx) = create_completion_channel(8);
        let mut output = OfflineOutput::started(48000, tx);

        for sequence in 1..=3 {
            output.play(PlayRequest {
                buffer: VoiceBuffer::new(vec![0.5; 4]),
                at: PlayAt::Sample(sequence * 8),
                ticket: ticket(sequence),
            });
        }
        output.cancel_from(ticket(2));
        assert_eq!(output.active_count(), 1);

        output.render(64);
        assert_eq!(rx.try_pop(), Some(ticket(1)));
        assert_eq!(rx.try_pop(), None);
        // Not a teardown
        assert_eq!(output.stop_count(), 0);
    }
}
