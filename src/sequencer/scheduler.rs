// Click scheduler - Lookahead scheduling of click buffers on the output timeline
//
// All state here is owned by one thread. Time enters only through the `now`
// arguments and the output's own timeline position, so every operation can be
// driven deterministically from tests.

use super::metronome::{AccentPolicy, ClickType, VoiceSet, select_voice};
use super::pattern::{CyclePosition, PatternConfig};
use super::reconfigure::{Reconfiguration, RestartPolicy, remap_beat_index};
use super::timeline::{Subdivision, Tempo};
use super::transport::{SharedTransportState, TransportState};
use crate::audio::output::{AudioOutput, PlayAt, PlayRequest, PlaybackTicket};
use crate::audio::timing::{TimelineClock, duration_to_samples};
use crate::messaging::notification::{BeatEvent, NotificationQueue};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tuning knobs for the scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerOptions {
    /// Clicks kept handed to the output ahead of time (1-3)
    pub lookahead: usize,
    pub accent_policy: AccentPolicy,
    pub restart: RestartPolicy,
    /// Beat notifications fire this much before their click
    pub notify_lead: Duration,
}

impl SchedulerOptions {
    pub const MIN_LOOKAHEAD: usize = 1;
    pub const MAX_LOOKAHEAD: usize = 3;
    /// Notifications never run further ahead of their click than this
    pub const MAX_NOTIFY_LEAD: Duration = Duration::from_millis(10);

    pub fn with_lookahead(self, lookahead: usize) -> Self {
        Self {
            lookahead: lookahead.clamp(Self::MIN_LOOKAHEAD, Self::MAX_LOOKAHEAD),
            ..self
        }
    }

    /// Copy with every field clamped into its valid range
    pub fn clamped(self) -> Self {
        Self {
            notify_lead: self.notify_lead.min(Self::MAX_NOTIFY_LEAD),
            ..self.with_lookahead(self.lookahead)
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            lookahead: 2,
            accent_policy: AccentPolicy::default(),
            restart: RestartPolicy::default(),
            notify_lead: Duration::ZERO,
        }
    }
}

/// Where the schedule sits on the output timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineAnchor {
    /// Nothing committed since the last (re)start
    Unset,
    /// First click committed for immediate playback, output position still unknown
    Pending { committed_at: Instant },
    /// Sample time of the next click
    Anchored { next_sample_time: u64 },
}

/// One click handed to the output and not yet finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledClick {
    pub ticket: PlaybackTicket,
    /// None for the immediate first click of a schedule
    pub sample_time: Option<u64>,
    /// Sample time the buffer finishes at, when the output reported a position
    pub end_sample: Option<u64>,
    /// Position captured when the click was scheduled
    pub position: CyclePosition,
    pub voice: ClickType,
    /// Beat notification queued for this click
    pub notification: Option<u64>,
}

impl ScheduledClick {
    /// Whether the click has begun sounding at output position `played_until`
    pub fn has_started(&self, played_until: Option<u64>) -> bool {
        match (self.sample_time, played_until) {
            (Some(sample_time), Some(position)) => sample_time <= position,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn beat_index(&self) -> u8 {
        self.position.beat_index
    }

    pub fn click_in_beat(&self) -> u8 {
        self.position.click_in_beat
    }
}

pub struct ClickScheduler {
    config: PatternConfig,
    position: CyclePosition,
    voices: VoiceSet,
    options: SchedulerOptions,
    sample_rate: u32,

    window: VecDeque<ScheduledClick>,
    anchor: TimelineAnchor,
    clock: TimelineClock,
    notifications: NotificationQueue,

    state: TransportState,
    resume_at: Option<Instant>,
    generation: u64,
    next_sequence: u64,
    last_beat_at: Option<Instant>,
    transport: Arc<SharedTransportState>,
}

impl ClickScheduler {
    pub fn new(
        config: PatternConfig,
        voices: VoiceSet,
        options: SchedulerOptions,
        sample_rate: u32,
    ) -> Self {
        Self::with_transport(config, voices, options, sample_rate, SharedTransportState::new())
    }

    /// Create a scheduler publishing into an existing shared transport state
    pub fn with_transport(
        config: PatternConfig,
        voices: VoiceSet,
        options: SchedulerOptions,
        sample_rate: u32,
        transport: Arc<SharedTransportState>,
    ) -> Self {
        let options = options.clamped();
        transport.set_state(TransportState::Stopped);
        transport.set_generation(0);

        Self {
            config,
            position: CyclePosition::origin(),
            voices,
            options,
            sample_rate: sample_rate.max(1),
            window: VecDeque::with_capacity(SchedulerOptions::MAX_LOOKAHEAD),
            anchor: TimelineAnchor::Unset,
            clock: TimelineClock::new(sample_rate),
            notifications: NotificationQueue::new(),
            state: TransportState::Stopped,
            resume_at: None,
            generation: 0,
            next_sequence: 0,
            last_beat_at: None,
            transport,
        }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Position of the next click to be scheduled
    pub fn position(&self) -> CyclePosition {
        self.position
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn anchor(&self) -> TimelineAnchor {
        self.anchor
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn voices(&self) -> &VoiceSet {
        &self.voices
    }

    pub fn window(&self) -> impl Iterator<Item = &ScheduledClick> {
        self.window.iter()
    }

    /// Clicks handed to the output whose completion has not arrived yet
    pub fn outstanding(&self) -> usize {
        self.window.len()
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn resume_at(&self) -> Option<Instant> {
        self.resume_at
    }

    pub fn transport(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.transport)
    }

    /// Estimated instant at which a sample time is heard
    pub fn instant_for(&self, sample_time: u64) -> Option<Instant> {
        self.clock.instant_for(sample_time)
    }

    /// Start scheduling
    ///
    /// With `reset_position` the cycle restarts at (0, 0), tearing down a
    /// running schedule first. Starting while already running without a reset
    /// is a no-op.
    pub fn start(&mut self, output: &mut dyn AudioOutput, reset_position: bool, now: Instant) {
        if self.state.is_running() {
            if !reset_position {
                return;
            }
            self.teardown(output);
        }

        if reset_position {
            self.position = CyclePosition::origin();
        }
        info!(
            "Metronome start at {} ({}, {}, {})",
            self.position,
            self.config.tempo(),
            self.config.time_signature(),
            self.config.subdivision()
        );

        self.resume_at = None;
        self.set_state(TransportState::Playing);
        self.pump(output, now);
    }

    /// Stop scheduling; idempotent
    ///
    /// Pending buffers are dropped, pending notifications cancelled and the
    /// position moves to the start of the next beat that has not sounded.
    pub fn stop(&mut self, output: &mut dyn AudioOutput) {
        if self.state.is_stopped() {
            return;
        }

        let resume = self.rollback_position(output).aligned_to_beat(&self.config);
        self.teardown(output);
        self.position = resume;
        self.last_beat_at = None;
        self.set_state(TransportState::Stopped);
        info!("Metronome stopped, next start at {}", self.position);
    }

    pub fn set_tempo(&mut self, output: &mut dyn AudioOutput, bpm: f64, now: Instant) {
        self.reconfigure(output, Reconfiguration::Tempo(Tempo::new(bpm)), now);
    }

    pub fn set_meter(&mut self, output: &mut dyn AudioOutput, beats_per_cycle: u8, now: Instant) {
        self.reconfigure(output, Reconfiguration::Meter(beats_per_cycle), now);
    }

    pub fn set_subdivision(&mut self, output: &mut dyn AudioOutput, clicks_per_beat: u8, now: Instant) {
        self.reconfigure(
            output,
            Reconfiguration::Subdivision(Subdivision::new(clicks_per_beat)),
            now,
        );
    }

    /// Swap the voice buffers; the next scheduled click uses them
    pub fn set_voices(&mut self, voices: VoiceSet) {
        self.voices = voices;
        debug!("Voice set replaced");
    }

    pub fn set_accent_policy(&mut self, policy: AccentPolicy) {
        self.options.accent_policy = policy;
    }

    /// Apply a live change
    pub fn reconfigure(&mut self, output: &mut dyn AudioOutput, change: Reconfiguration, now: Instant) {
        let new_config = change.apply(self.config);
        if new_config == self.config {
            return;
        }

        if !change.requires_restart() {
            self.apply_meter(output, new_config);
            return;
        }

        if !self.state.is_running() {
            // Subdivision may have shrunk under the stored position
            self.position = self.position.aligned_to_beat(&new_config);
            self.config = new_config;
            return;
        }

        let delay = self.options.restart.delay(&self.config, self.last_beat_at, now);
        let resume = self.rollback_position(output).aligned_to_beat(&new_config);
        self.teardown(output);

        self.config = new_config;
        self.position = resume;
        self.resume_at = Some(now + delay);
        self.set_state(TransportState::Restarting);
        info!(
            "Reconfigured to {} / {}, restarting at {} in {:?}",
            new_config.tempo(),
            new_config.subdivision(),
            self.position,
            delay
        );
    }

    /// Meter changes keep the click grid and the generation
    ///
    /// Committed clicks that have not started and fall past the new meter are
    /// withdrawn together with everything after them; the schedule refills
    /// from the first withdrawn slot with remapped beats.
    fn apply_meter(&mut self, output: &mut dyn AudioOutput, new_config: PatternConfig) {
        let old_beats = self.config.beats_per_cycle();
        let new_beats = new_config.beats_per_cycle();

        let played_until = output.current_position();
        let first_dropped = self
            .window
            .iter()
            .position(|click| !click.has_started(played_until) && click.beat_index() >= new_beats);

        let mut withdrawn = 0;
        if let Some(index) = first_dropped {
            let first = self.window[index];
            output.cancel_from(first.ticket);
            for click in self.window.drain(index..) {
                if let Some(sequence) = click.notification {
                    self.notifications.cancel(sequence);
                }
                withdrawn += 1;
            }
            if let Some(sample_time) = first.sample_time {
                self.anchor = TimelineAnchor::Anchored {
                    next_sample_time: sample_time,
                };
            }
            self.position = first.position;
        }

        self.position.beat_index = remap_beat_index(self.position.beat_index, new_beats);
        let cancelled = self.notifications.cancel_beats_from(new_beats);
        self.config = new_config;

        debug!(
            "Meter {} -> {}, next click at {}, {} click(s) withdrawn, {} notification(s) dropped",
            old_beats, new_beats, self.position, withdrawn, cancelled
        );
    }

    /// A buffer finished playing
    /// Returns false for completions from a torn-down schedule.
    pub fn acknowledge(&mut self, ticket: PlaybackTicket) -> bool {
        if ticket.generation != self.generation {
            debug!("Ignoring stale completion {:?}", ticket);
            return false;
        }

        match self.window.iter().position(|c| c.ticket == ticket) {
            Some(index) => {
                self.window.remove(index);
                true
            }
            None => false,
        }
    }

    /// Top up the lookahead window; returns the number of clicks scheduled
    /// Calling it with a full window does nothing.
    pub fn pump(&mut self, output: &mut dyn AudioOutput, now: Instant) -> usize {
        if !self.state.is_running() {
            return 0;
        }

        if let Some(resume_at) = self.resume_at {
            if now < resume_at {
                return 0;
            }
            self.resume_at = None;
            self.set_state(TransportState::Playing);
        }

        let mut scheduled = 0;
        while self.window.len() < self.options.lookahead {
            if !self.schedule_next(output, now) {
                break;
            }
            scheduled += 1;
        }
        scheduled
    }

    /// Hand due notifications to `deliver`, in scheduling order
    pub fn fire_due(&mut self, now: Instant, mut deliver: impl FnMut(BeatEvent)) -> usize {
        let mut fired = 0;
        while let Some(notification) = self.notifications.pop_due(now) {
            self.last_beat_at = Some(notification.fire_at + self.options.notify_lead);
            self.transport.set_last_beat(Some(notification.beat_index));
            deliver(notification.to_event());
            fired += 1;
        }
        fired
    }

    /// Earliest instant at which the scheduler has timed work
    ///
    /// Includes the expected end of the oldest click in the window, when its
    /// completion frees a slot for the next one.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.resume_at,
            self.notifications.next_deadline(),
            self.refill_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn refill_deadline(&self) -> Option<Instant> {
        if !self.state.is_running() {
            return None;
        }
        let end_sample = self.window.front()?.end_sample?;
        self.clock.instant_for(end_sample)
    }

    fn schedule_next(&mut self, output: &mut dyn AudioOutput, now: Instant) -> bool {
        let interval = self.config.click_interval_samples(self.sample_rate);

        let at = match self.anchor {
            TimelineAnchor::Unset => PlayAt::Immediately,
            TimelineAnchor::Pending { committed_at } => {
                let Some(position) = output.current_position() else {
                    debug!("Output timeline still unavailable, retrying next pass");
                    return false;
                };
                self.clock.observe(position, now);
                let elapsed = duration_to_samples(
                    now.saturating_duration_since(committed_at),
                    self.sample_rate,
                );
                PlayAt::Sample(position + interval.saturating_sub(elapsed))
            }
            TimelineAnchor::Anchored { next_sample_time } => {
                match output.current_position() {
                    Some(position) => {
                        self.clock.observe(position, now);
                        if position > next_sample_time {
                            warn!(
                                "Scheduler fell behind the output timeline by {} samples",
                                position - next_sample_time
                            );
                            PlayAt::Sample(position)
                        } else {
                            PlayAt::Sample(next_sample_time)
                        }
                    }
                    None => PlayAt::Sample(next_sample_time),
                }
            }
        };

        // Capture first; nothing below reads self.position until the advance
        let captured = self.position;
        let selection = select_voice(&self.config, captured, self.options.accent_policy);

        let ticket = PlaybackTicket {
            generation: self.generation,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        let buffer = self.voices.buffer_for(selection.voice).clone();
        let buffer_len = buffer.len();
        output.play(PlayRequest {
            buffer,
            at,
            ticket,
        });

        let length = buffer_len as u64;
        let (sample_time, end_sample, fire_at) = match at {
            PlayAt::Immediately => match output.current_position() {
                Some(position) => {
                    self.clock.observe(position, now);
                    self.anchor = TimelineAnchor::Anchored {
                        next_sample_time: position + interval,
                    };
                    (None, Some(position + length), now)
                }
                None => {
                    warn!("Output timeline not available yet, first click is untimed");
                    self.anchor = TimelineAnchor::Pending { committed_at: now };
                    (None, None, now)
                }
            },
            PlayAt::Sample(sample_time) => {
                self.anchor = TimelineAnchor::Anchored {
                    next_sample_time: sample_time + interval,
                };
                let fire_at = self.clock.instant_for(sample_time).unwrap_or(now);
                (Some(sample_time), Some(sample_time + length), fire_at)
            }
        };

        let notification = selection.is_beat_boundary.then(|| {
            let fire_at = fire_at
                .checked_sub(self.options.notify_lead)
                .unwrap_or(fire_at);
            self.notifications
                .schedule(captured.beat_index, self.generation, fire_at)
        });

        self.window.push_back(ScheduledClick {
            ticket,
            sample_time,
            end_sample,
            position: captured,
            voice: selection.voice,
            notification,
        });
        self.transport.record_click();

        debug!(
            "Click {} {:?} at {:?} (seq {})",
            captured, selection.voice, sample_time, ticket.sequence
        );

        self.position = captured.advanced(&self.config);
        true
    }

    /// Position of the earliest click in the window that has not started
    /// sounding, or the current position if every click has started
    ///
    /// Clicks committed before a meter change may sit past the current meter;
    /// their beat is remapped the same way the live position was.
    fn rollback_position(&self, output: &dyn AudioOutput) -> CyclePosition {
        let played_until = output.current_position();
        let position = self
            .window
            .iter()
            .find(|click| !click.has_started(played_until))
            .map(|click| click.position)
            .unwrap_or(self.position);

        CyclePosition {
            beat_index: remap_beat_index(position.beat_index, self.config.beats_per_cycle()),
            ..position
        }
    }

    fn teardown(&mut self, output: &mut dyn AudioOutput) {
        output.stop_all();
        let cancelled = self.notifications.cancel_all();
        self.window.clear();
        self.anchor = TimelineAnchor::Unset;
        self.clock.reset();
        self.resume_at = None;
        self.generation += 1;
        self.transport.set_generation(self.generation);
        debug!(
            "Schedule torn down ({} notification(s) cancelled), generation {}",
            cancelled, self.generation
        );
    }

    fn set_state(&mut self, state: TransportState) {
        self.state = state;
        self.transport.set_state(state);
    }
}
