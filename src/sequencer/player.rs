// Metronome player - Dedicated scheduler thread and its public handle
//
// The worker owns the scheduler, the output handle and the receiving ends of
// the command and completion channels. Nothing outside the worker thread
// touches scheduler state; other threads only send commands or read the
// shared transport atomics.

use crate::audio::output::AudioOutput;
use crate::messaging::channels::{
    BeatProducer, BeatReceiver, CommandConsumer, CommandProducer, CompletionConsumer,
    create_beat_channel, create_command_channel,
};
use crate::messaging::command::Command;
use crate::sequencer::metronome::{AccentPolicy, VoiceSet};
use crate::sequencer::scheduler::ClickScheduler;
use crate::sequencer::transport::{SharedTransportState, TransportState};
use crate::settings::MetronomeSettings;
use log::{debug, info, warn};
use ringbuf::traits::{Consumer, Producer};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const COMMAND_RINGBUFFER_CAPACITY: usize = 64;
const BEAT_RINGBUFFER_CAPACITY: usize = 64;
/// Shortest wait between passes, so a late completion cannot spin the thread
const MIN_WAKE_INTERVAL: Duration = Duration::from_millis(1);

/// One scheduler context: commands in, completions in, beats out
pub struct SchedulerWorker<O: AudioOutput> {
    scheduler: ClickScheduler,
    output: O,
    commands: CommandConsumer,
    completions: CompletionConsumer,
    beats: BeatProducer,
    poll_interval: Duration,
    shutdown: bool,
}

impl<O: AudioOutput> SchedulerWorker<O> {
    pub fn new(
        scheduler: ClickScheduler,
        output: O,
        commands: CommandConsumer,
        completions: CompletionConsumer,
        beats: BeatProducer,
        poll_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            output,
            commands,
            completions,
            beats,
            poll_interval,
            shutdown: false,
        }
    }

    /// Run one pass at `now`; returns when the next pass is due
    pub fn tick(&mut self, now: Instant) -> Instant {
        while let Some(command) = self.commands.try_pop() {
            self.apply(command, now);
        }

        while let Some(ticket) = self.completions.try_pop() {
            self.scheduler.acknowledge(ticket);
        }

        self.deliver_due(now);
        self.scheduler.pump(&mut self.output, now);
        // The first click of a schedule notifies immediately
        self.deliver_due(now);

        let next_poll = now + self.poll_interval;
        match self.scheduler.next_deadline() {
            Some(deadline) => deadline.min(next_poll).max(now + MIN_WAKE_INTERVAL),
            None => next_poll,
        }
    }

    fn deliver_due(&mut self, now: Instant) {
        let beats = &mut self.beats;
        self.scheduler.fire_due(now, |event| {
            if beats.try_push(event).is_err() {
                warn!("Beat channel full, beat {} dropped", event.beat_index);
            }
        });
    }

    fn apply(&mut self, command: Command, now: Instant) {
        let output = &mut self.output;
        match command {
            Command::Start { reset_position } => self.scheduler.start(output, reset_position, now),
            Command::Stop => self.scheduler.stop(output),
            Command::SetTempo(bpm) => self.scheduler.set_tempo(output, bpm, now),
            Command::SetMeter(beats) => self.scheduler.set_meter(output, beats, now),
            Command::SetSubdivision(clicks) => self.scheduler.set_subdivision(output, clicks, now),
            Command::SetVoices(voices) => {
                debug!("Swapping voice set");
                self.scheduler.set_voices(voices)
            }
            Command::SetAccentPolicy(policy) => self.scheduler.set_accent_policy(policy),
            Command::Shutdown => {
                self.scheduler.stop(output);
                self.shutdown = true;
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub fn scheduler(&self) -> &ClickScheduler {
        &self.scheduler
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}

/// Public handle on a running metronome
///
/// Every setter is safe to call while playing; the change is applied on the
/// scheduler thread.
pub struct MetronomePlayer {
    commands: CommandProducer,
    transport: Arc<SharedTransportState>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MetronomePlayer {
    /// Spawn the scheduler thread
    ///
    /// `completions` must be the receiving end of the channel `output`
    /// reports finished buffers on. The returned receiver is meant for the
    /// UI thread.
    pub fn spawn<O>(
        output: O,
        completions: CompletionConsumer,
        voices: VoiceSet,
        settings: &MetronomeSettings,
    ) -> io::Result<(Self, BeatReceiver)>
    where
        O: AudioOutput + Send + 'static,
    {
        let settings = settings.sanitized();
        let transport = SharedTransportState::new();
        let scheduler = ClickScheduler::with_transport(
            settings.pattern_config(),
            voices,
            settings.scheduler_options(),
            output.sample_rate(),
            Arc::clone(&transport),
        );

        let (command_tx, command_rx) = create_command_channel(COMMAND_RINGBUFFER_CAPACITY);
        let (beat_tx, beat_rx) = create_beat_channel(BEAT_RINGBUFFER_CAPACITY);

        let mut worker = SchedulerWorker::new(
            scheduler,
            output,
            command_rx,
            completions,
            beat_tx,
            settings.poll_interval(),
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        let thread = thread::Builder::new()
            .name("click-scheduler".to_string())
            .spawn(move || {
                info!("Scheduler thread started");
                while !shutdown_flag.load(Ordering::Acquire) {
                    let next = worker.tick(Instant::now());
                    if worker.is_shutdown() {
                        break;
                    }
                    let wait = next.saturating_duration_since(Instant::now());
                    if !wait.is_zero() {
                        thread::park_timeout(wait);
                    }
                }
                info!("Scheduler thread exiting");
            })?;

        let player = Self {
            commands: command_tx,
            transport: Arc::clone(&transport),
            shutdown,
            thread: Some(thread),
        };
        Ok((player, BeatReceiver::new(beat_rx, transport)))
    }

    /// Start playing; `reset_position` restarts the cycle at beat 0
    pub fn start(&mut self, reset_position: bool) -> bool {
        self.send(Command::Start { reset_position })
    }

    /// Stop playing; does nothing if already stopped
    pub fn stop(&mut self) -> bool {
        self.send(Command::Stop)
    }

    pub fn set_tempo(&mut self, bpm: f64) -> bool {
        self.send(Command::SetTempo(bpm))
    }

    pub fn set_meter(&mut self, beats_per_cycle: u8) -> bool {
        self.send(Command::SetMeter(beats_per_cycle))
    }

    pub fn set_subdivision(&mut self, clicks_per_beat: u8) -> bool {
        self.send(Command::SetSubdivision(clicks_per_beat))
    }

    pub fn set_voices(&mut self, voices: VoiceSet) -> bool {
        self.send(Command::SetVoices(voices))
    }

    pub fn set_accent_policy(&mut self, policy: AccentPolicy) -> bool {
        self.send(Command::SetAccentPolicy(policy))
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn transport(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.transport)
    }

    fn send(&mut self, command: Command) -> bool {
        if self.commands.try_push(command).is_err() {
            warn!("Command queue full, command dropped");
            return false;
        }
        if let Some(thread) = &self.thread {
            thread.thread().unpark();
        }
        true
    }
}

impl Drop for MetronomePlayer {
    fn drop(&mut self) {
        let _ = self.send(Command::Shutdown);
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                warn!("Scheduler thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::offline::OfflineOutput;
    use crate::messaging::channels::{BeatConsumer, create_completion_channel};
    use crate::sequencer::metronome::ClickType;
    use crate::sequencer::scheduler::SchedulerOptions;

    struct Harness {
        worker: SchedulerWorker<OfflineOutput>,
        output: OfflineOutput,
        commands: CommandProducer,
        beats: BeatConsumer,
    }

    fn harness(settings: MetronomeSettings) -> Harness {
        let (completion_tx, completion_rx) = create_completion_channel(16);
        let output = OfflineOutput::started(48000, completion_tx);
        let scheduler = ClickScheduler::new(
            settings.pattern_config(),
            VoiceSet::sine_clicks(48000),
            settings.scheduler_options(),
            48000,
        );
        let (command_tx, command_rx) = create_command_channel(16);
        let (beat_tx, beat_rx) = create_beat_channel(16);
        let worker = SchedulerWorker::new(
            scheduler,
            output.clone(),
            command_rx,
            completion_rx,
            beat_tx,
            settings.poll_interval(),
        );
        Harness {
            worker,
            output,
            commands: command_tx,
            beats: beat_rx,
        }
    }

    #[test]
    fn test_start_command_schedules_and_notifies() {
        let mut h = harness(MetronomeSettings::default());
        let now = Instant::now();
        assert!(h.commands.try_push(Command::Start { reset_position: true }).is_ok());

        h.worker.tick(now);

        assert_eq!(h.worker.scheduler().outstanding(), 2);
        assert_eq!(h.beats.try_pop().map(|e| e.beat_index), Some(0));
    }

    #[test]
    fn test_tick_returns_earliest_deadline() {
        let mut h = harness(MetronomeSettings::default());
        let now = Instant::now();
        assert!(h.commands.try_push(Command::Start { reset_position: true }).is_ok());

        let next = h.worker.tick(now);
        // The first click (480 samples) ends before the poll and beat 1
        assert_eq!(next, now + Duration::from_millis(10));
    }

    #[test]
    fn test_tick_never_returns_a_past_deadline() {
        let mut h = harness(MetronomeSettings::default());
        let now = Instant::now();
        assert!(h.commands.try_push(Command::Start { reset_position: true }).is_ok());
        h.worker.tick(now);

        // First click is over but its completion has not been rendered yet
        let late = now + Duration::from_millis(30);
        assert_eq!(h.worker.tick(late), late + MIN_WAKE_INTERVAL);
    }

    #[test]
    fn test_fast_subdivided_pattern_keeps_even_spacing() {
        let settings = MetronomeSettings {
            bpm: 999.0,
            subdivision: 4,
            ..MetronomeSettings::default()
        };
        let interval = settings.pattern_config().click_interval_samples(48000);
        let mut h = harness(settings);
        let t0 = Instant::now();
        assert!(h.commands.try_push(Command::Start { reset_position: true }).is_ok());

        // Wake only when the worker asks to; the device renders 48 samples per ms
        let mut next = t0;
        for ms in 0..1000u64 {
            let now = t0 + Duration::from_millis(ms);
            if now >= next {
                next = h.worker.tick(now);
            }
            h.output.render(48);
        }

        let starts: Vec<u64> = h.output.history().iter().map(|r| r.start_sample).collect();
        assert!(starts.len() >= 60, "only {} clicks in one second", starts.len());
        for pair in starts.windows(2) {
            assert_eq!(pair[1] - pair[0], interval, "uneven spacing in {:?}", starts);
        }
    }

    #[test]
    fn test_completions_free_the_window() {
        let mut h = harness(MetronomeSettings::default());
        let now = Instant::now();
        assert!(h.commands.try_push(Command::Start { reset_position: true }).is_ok());
        h.worker.tick(now);

        // Play past the first click (480 samples)
        h.output.render(512);
        h.worker.tick(now + Duration::from_millis(11));

        assert_eq!(h.worker.scheduler().outstanding(), SchedulerOptions::default().lookahead);
        assert_eq!(h.output.history().len(), 3);
    }

    #[test]
    fn test_voice_swap_applies_to_next_click() {
        let mut h = harness(MetronomeSettings::default());
        let now = Instant::now();
        assert!(h.commands.try_push(Command::Start { reset_position: true }).is_ok());
        h.worker.tick(now);

        let swapped = VoiceSet::sine_clicks(24000);
        assert!(h.commands.try_push(Command::SetVoices(swapped.clone())).is_ok());
        h.output.render(512);
        h.worker.tick(now + Duration::from_millis(11));

        let history = h.output.history();
        let last = history.last().unwrap();
        assert!(last.buffer.ptr_eq(swapped.buffer_for(ClickType::Regular)));
        // Nothing was torn down
        assert_eq!(h.output.stop_count(), 0);
    }

    #[test]
    fn test_shutdown_command_stops() {
        let mut h = harness(MetronomeSettings::default());
        let now = Instant::now();
        assert!(h.commands.try_push(Command::Start { reset_position: true }).is_ok());
        assert!(h.commands.try_push(Command::Shutdown).is_ok());
        h.worker.tick(now);

        assert!(h.worker.is_shutdown());
        assert_eq!(h.worker.scheduler().state(), TransportState::Stopped);
        assert_eq!(h.output.active_count(), 0);
    }
}
