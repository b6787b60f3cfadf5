// Types for metronome settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sequencer::metronome::AccentPolicy;
use crate::sequencer::pattern::PatternConfig;
use crate::sequencer::reconfigure::RestartPolicy;
use crate::sequencer::scheduler::SchedulerOptions;
use crate::sequencer::timeline::{Subdivision, Tempo, TimeSignature};

/// Persisted metronome settings
/// Missing fields take their default when loading older files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    /// Tempo (BPM)
    pub bpm: f64,
    /// Beats per cycle (1-16)
    pub beats_per_cycle: u8,
    /// Meter denominator, display only
    pub denominator: u8,
    /// Clicks per beat (1-4)
    pub subdivision: u8,
    pub accent_policy: AccentPolicy,
    /// Clicks handed to the output ahead of time (1-3)
    pub lookahead: usize,
    /// Scheduler poll period
    pub poll_interval_ms: u64,
    /// Minimum delay before a live restart
    pub restart_floor_ms: u64,
    /// Maximum live restart delay as a fraction of a beat
    pub restart_cap_ratio: f64,
    /// Beat notifications fire this much before their click
    pub notify_lead_ms: u64,
}

impl MetronomeSettings {
    pub const MIN_POLL_INTERVAL_MS: u64 = 1;
    pub const MAX_POLL_INTERVAL_MS: u64 = 250;
    pub const MAX_RESTART_FLOOR_MS: u64 = 100;
    pub const MAX_NOTIFY_LEAD_MS: u64 = 10;

    /// Copy with every field clamped into its valid range
    pub fn sanitized(&self) -> Self {
        let config = self.pattern_config();
        Self {
            bpm: config.tempo().bpm(),
            beats_per_cycle: config.beats_per_cycle(),
            denominator: config.time_signature().denominator(),
            subdivision: config.clicks_per_beat(),
            accent_policy: self.accent_policy,
            lookahead: self
                .lookahead
                .clamp(SchedulerOptions::MIN_LOOKAHEAD, SchedulerOptions::MAX_LOOKAHEAD),
            poll_interval_ms: self
                .poll_interval_ms
                .clamp(Self::MIN_POLL_INTERVAL_MS, Self::MAX_POLL_INTERVAL_MS),
            restart_floor_ms: self.restart_floor_ms.min(Self::MAX_RESTART_FLOOR_MS),
            restart_cap_ratio: RestartPolicy::new(Duration::ZERO, self.restart_cap_ratio).cap_ratio,
            notify_lead_ms: self.notify_lead_ms.min(Self::MAX_NOTIFY_LEAD_MS),
        }
    }

    pub fn pattern_config(&self) -> PatternConfig {
        PatternConfig::new(
            Tempo::new(self.bpm),
            TimeSignature::new(self.beats_per_cycle, self.denominator),
            Subdivision::new(self.subdivision),
        )
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            lookahead: self.lookahead,
            accent_policy: self.accent_policy,
            restart: RestartPolicy::new(
                Duration::from_millis(self.restart_floor_ms.min(Self::MAX_RESTART_FLOOR_MS)),
                self.restart_cap_ratio,
            ),
            notify_lead: Duration::from_millis(self.notify_lead_ms.min(Self::MAX_NOTIFY_LEAD_MS)),
        }
        .clamped()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(Self::MIN_POLL_INTERVAL_MS, Self::MAX_POLL_INTERVAL_MS),
        )
    }
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_cycle: 4,
            denominator: 4,
            subdivision: 1,
            accent_policy: AccentPolicy::WholeFirstBeat,
            lookahead: 2,
            poll_interval_ms: 50,
            restart_floor_ms: 20,
            restart_cap_ratio: RestartPolicy::DEFAULT_CAP_RATIO,
            notify_lead_ms: 0,
        }
    }
}
