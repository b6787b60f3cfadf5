// Reconfiguration - Live changes to tempo, meter and subdivision
// Pure helpers; the scheduler applies them on its own thread

use super::pattern::PatternConfig;
use super::timeline::{Subdivision, Tempo};
use std::time::{Duration, Instant};

/// A live change to the pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconfiguration {
    Tempo(Tempo),
    Meter(u8),
    Subdivision(Subdivision),
}

impl Reconfiguration {
    /// New snapshot with the change applied; `config` is left untouched
    pub fn apply(&self, config: PatternConfig) -> PatternConfig {
        match *self {
            Reconfiguration::Tempo(tempo) => config.with_tempo(tempo),
            Reconfiguration::Meter(beats) => {
                config.with_time_signature(config.time_signature().with_beats(beats))
            }
            Reconfiguration::Subdivision(subdivision) => config.with_subdivision(subdivision),
        }
    }

    /// Tempo and subdivision change the click grid and need a stop/restart;
    /// a meter change only remaps the beat index.
    pub fn requires_restart(&self) -> bool {
        matches!(
            self,
            Reconfiguration::Tempo(_) | Reconfiguration::Subdivision(_)
        )
    }
}

/// Beat index after the meter changes to `new_beats_per_cycle`
/// Kept when still in range, wrapped otherwise.
pub fn remap_beat_index(beat_index: u8, new_beats_per_cycle: u8) -> u8 {
    let new_beats_per_cycle = new_beats_per_cycle.max(1);
    if beat_index < new_beats_per_cycle {
        beat_index
    } else {
        beat_index % new_beats_per_cycle
    }
}

/// How long a live restart waits before the first click of the new schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestartPolicy {
    /// Minimum delay
    pub floor: Duration,
    /// Maximum delay as a fraction of the old beat interval
    pub cap_ratio: f64,
}

impl RestartPolicy {
    pub const DEFAULT_FLOOR: Duration = Duration::from_millis(20);
    pub const DEFAULT_CAP_RATIO: f64 = 0.75;

    pub fn new(floor: Duration, cap_ratio: f64) -> Self {
        let cap_ratio = if cap_ratio.is_finite() {
            cap_ratio.clamp(0.0, 1.0)
        } else {
            Self::DEFAULT_CAP_RATIO
        };
        Self { floor, cap_ratio }
    }

    /// Delay until the old configuration's next beat, measured from the last
    /// beat that started, capped at `cap_ratio` of the old beat interval
    ///
    /// `floor` raises short delays but never past the cap, so a restart
    /// always lands within the old beat.
    pub fn delay(&self, old: &PatternConfig, last_beat_at: Option<Instant>, now: Instant) -> Duration {
        let beat = old.tempo().beat_duration();
        let cap = beat.mul_f64(self.cap_ratio);

        let remaining = match last_beat_at {
            Some(at) => (at + beat).saturating_duration_since(now),
            None => Duration::ZERO,
        };

        remaining.min(cap).max(self.floor.min(cap))
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FLOOR, Self::DEFAULT_CAP_RATIO)
    }
}
