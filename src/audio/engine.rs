// Audio engine - cpal output facility for the click scheduler
//
// # Threads
//
// `CpalOutput` is the scheduler-side handle: it is `Send`, queues play/stop
// requests into a ringbuf and reads the timeline counter. The cpal `Stream`
// lives in `OutputStream`, which stays on the thread that opened it (CoreAudio
// streams are not `Send`).
//
// # Format Support
//
// Internally everything is mono f32. The callback converts to the device
// format (F32, I16, U16) through cpal's `FromSample<f32>` and duplicates the
// signal on every channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use log::{error, info, warn};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::audio::output::{AudioOutput, OutputError, PlayAt, PlayRequest, PlaybackTicket};
use crate::audio::timing::AudioTiming;
use crate::messaging::channels::CompletionProducer;
use crate::sequencer::metronome::VoiceBuffer;

/// Voices the callback can hold at once; a lookahead of 3 needs far fewer
const MAX_ACTIVE_VOICES: usize = 16;
const REQUEST_RINGBUFFER_CAPACITY: usize = 64;
/// Every buffer the callback can hold or receive between two drains
const RETIRED_RINGBUFFER_CAPACITY: usize = MAX_ACTIVE_VOICES + REQUEST_RINGBUFFER_CAPACITY;

enum OutputRequest {
    Play(PlayRequest),
    StopAll,
    CancelFrom(PlaybackTicket),
}

/// Keeps the device stream alive
pub struct OutputStream {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
    channels: usize,
}

impl OutputStream {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

/// Scheduler-side handle on the device
pub struct CpalOutput {
    requests: HeapProd<OutputRequest>,
    /// Buffers the callback is done with; freed here, off the audio thread
    retired: HeapCons<VoiceBuffer>,
    timing: AudioTiming,
    dropped_requests: u64,
}

impl CpalOutput {
    /// Open the default output device and start its stream
    pub fn open_default(
        completions: CompletionProducer,
    ) -> Result<(OutputStream, CpalOutput), OutputError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported_config = device.default_output_config()?;
        let sample_format = supported_config.sample_format();
        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();

        info!(
            "Output device: {} ({} Hz, {} ch, {:?})",
            device_name, sample_rate, channels, sample_format
        );

        let (request_tx, request_rx) =
            HeapRb::<OutputRequest>::new(REQUEST_RINGBUFFER_CAPACITY).split();
        let (retired_tx, retired_rx) =
            HeapRb::<VoiceBuffer>::new(RETIRED_RINGBUFFER_CAPACITY).split();
        let timing = AudioTiming::new(sample_rate);

        let state = CallbackState {
            requests: request_rx,
            completions,
            retired: retired_tx,
            voices: Vec::with_capacity(MAX_ACTIVE_VOICES),
            timing: timing.clone(),
            channels,
        };

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, state),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, state),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, state),
            other => return Err(OutputError::UnsupportedFormat(format!("{:?}", other))),
        }?;
        stream.play()?;

        Ok((
            OutputStream {
                _stream: stream,
                device_name,
                sample_rate,
                channels,
            },
            CpalOutput {
                requests: request_tx,
                retired: retired_rx,
                timing,
                dropped_requests: 0,
            },
        ))
    }

    /// Requests lost because the request ring was full
    pub fn dropped_requests(&self) -> u64 {
        self.dropped_requests
    }

    fn send(&mut self, request: OutputRequest) {
        while self.retired.try_pop().is_some() {}

        if self.requests.try_push(request).is_err() {
            self.dropped_requests += 1;
            warn!("Output request queue full, request dropped");
        }
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.timing.sample_rate()
    }

    fn play(&mut self, request: PlayRequest) {
        self.send(OutputRequest::Play(request));
    }

    fn current_position(&self) -> Option<u64> {
        self.timing.current_sample()
    }

    fn stop_all(&mut self) {
        self.send(OutputRequest::StopAll);
    }

    fn cancel_from(&mut self, from: PlaybackTicket) {
        self.send(OutputRequest::CancelFrom(from));
    }
}

struct ActiveVoice {
    buffer: VoiceBuffer,
    start_sample: u64,
    ticket: PlaybackTicket,
}

/// Everything the real-time callback owns
struct CallbackState {
    requests: HeapCons<OutputRequest>,
    completions: CompletionProducer,
    retired: HeapProd<VoiceBuffer>,
    voices: Vec<ActiveVoice>,
    timing: AudioTiming,
    channels: usize,
}

impl CallbackState {
    // ========== REAL-TIME ZONE ==========
    // No allocations, no deallocations, no I/O, no locks
    fn process<T>(&mut self, data: &mut [T])
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.channels.max(1);
        let frames = data.len() / channels;
        let block_start = self.timing.current_sample().unwrap_or(0);
        let block_end = block_start + frames as u64;

        while let Some(request) = self.requests.try_pop() {
            match request {
                OutputRequest::Play(request) => {
                    let start_sample = match request.at {
                        PlayAt::Immediately => block_start,
                        PlayAt::Sample(sample) => sample,
                    };
                    if self.voices.len() < MAX_ACTIVE_VOICES {
                        self.voices.push(ActiveVoice {
                            buffer: request.buffer,
                            start_sample,
                            ticket: request.ticket,
                        });
                    } else {
                        // No free slot: report it finished so the window keeps moving
                        let _ = self.completions.try_push(request.ticket);
                        let _ = self.retired.try_push(request.buffer);
                    }
                }
                OutputRequest::StopAll => self.release_voices(|_| true, false),
                OutputRequest::CancelFrom(from) => {
                    self.release_voices(|voice| voice.ticket.is_at_or_after(from), false)
                }
            }
        }

        for (i, frame) in data.chunks_mut(channels).enumerate() {
            let t = block_start + i as u64;
            let mut mixed = 0.0f32;
            for voice in &self.voices {
                if t >= voice.start_sample {
                    let offset = (t - voice.start_sample) as usize;
                    if let Some(sample) = voice.buffer.samples().get(offset) {
                        mixed += *sample;
                    }
                }
            }

            let value = T::from_sample(mixed.clamp(-1.0, 1.0));
            for out in frame.iter_mut() {
                *out = value;
            }
        }

        self.release_voices(
            |voice| voice.start_sample + voice.buffer.len() as u64 <= block_end,
            true,
        );

        self.timing.advance(frames);
    }

    /// Remove matching voices and hand their buffers back to the scheduler side
    ///
    /// A full retired ring drops the buffer here; the ring is sized so that
    /// only happens when the scheduler stops draining it.
    fn release_voices(&mut self, mut matches: impl FnMut(&ActiveVoice) -> bool, completed: bool) {
        let mut i = 0;
        while i < self.voices.len() {
            if matches(&self.voices[i]) {
                let voice = self.voices.swap_remove(i);
                if completed {
                    let _ = self.completions.try_push(voice.ticket);
                }
                let _ = self.retired.try_push(voice.buffer);
            } else {
                i += 1;
            }
        }
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut state: CallbackState,
) -> Result<Stream, OutputError>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            state.process(data);
        },
        |err| {
            error!("Audio stream error: {}", err);
        },
        None,
    )?;
    Ok(stream)
}
