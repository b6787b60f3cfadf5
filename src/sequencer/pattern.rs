// Pattern - Click pattern snapshot and cycle position
// PatternConfig is replaced wholesale on reconfiguration, CyclePosition is a plain value

use super::timeline::{Subdivision, Tempo, TimeSignature};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable description of the click pattern
///
/// Every `with_*` method returns a new snapshot, so a reconfiguration is
/// applied by swapping the value the scheduler reads.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PatternConfig {
    tempo: Tempo,
    time_signature: TimeSignature,
    subdivision: Subdivision,
}

impl PatternConfig {
    pub fn new(tempo: Tempo, time_signature: TimeSignature, subdivision: Subdivision) -> Self {
        Self {
            tempo,
            time_signature,
            subdivision,
        }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn subdivision(&self) -> Subdivision {
        self.subdivision
    }

    pub fn beats_per_cycle(&self) -> u8 {
        self.time_signature.beats_per_cycle()
    }

    pub fn clicks_per_beat(&self) -> u8 {
        self.subdivision.clicks_per_beat()
    }

    /// Total clicks before the position returns to (0, 0)
    pub fn clicks_per_cycle(&self) -> usize {
        self.beats_per_cycle() as usize * self.clicks_per_beat() as usize
    }

    pub fn with_tempo(self, tempo: Tempo) -> Self {
        Self { tempo, ..self }
    }

    pub fn with_time_signature(self, time_signature: TimeSignature) -> Self {
        Self {
            time_signature,
            ..self
        }
    }

    pub fn with_subdivision(self, subdivision: Subdivision) -> Self {
        Self {
            subdivision,
            ..self
        }
    }

    /// Seconds between two consecutive clicks: (60 / bpm) / subdivision
    pub fn click_interval_seconds(&self) -> f64 {
        self.tempo.beat_duration_seconds() / self.clicks_per_beat() as f64
    }

    /// Click interval on the output timeline, rounded to whole samples
    pub fn click_interval_samples(&self, sample_rate: u32) -> u64 {
        (self.click_interval_seconds() * sample_rate as f64)
            .round()
            .max(1.0) as u64
    }
}

/// Where the next click sits in the cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CyclePosition {
    pub beat_index: u8,
    pub click_in_beat: u8,
}

impl CyclePosition {
    pub fn new(beat_index: u8, click_in_beat: u8) -> Self {
        Self {
            beat_index,
            click_in_beat,
        }
    }

    /// (0, 0): first click of the first beat
    pub fn origin() -> Self {
        Self::default()
    }

    /// The position one click later
    ///
    /// Consumes the captured value and returns the successor, the caller
    /// decides whether to store it.
    pub fn advanced(self, config: &PatternConfig) -> Self {
        let next_click = self.click_in_beat + 1;
        if next_click >= config.clicks_per_beat() {
            Self {
                beat_index: (self.beat_index + 1) % config.beats_per_cycle(),
                click_in_beat: 0,
            }
        } else {
            Self {
                beat_index: self.beat_index,
                click_in_beat: next_click,
            }
        }
    }

    /// First click of the beat that follows this position, or self if the
    /// position already starts a beat
    pub fn aligned_to_beat(self, config: &PatternConfig) -> Self {
        if self.click_in_beat == 0 {
            self
        } else {
            Self {
                beat_index: (self.beat_index + 1) % config.beats_per_cycle(),
                click_in_beat: 0,
            }
        }
    }

    pub fn is_valid_for(&self, config: &PatternConfig) -> bool {
        self.beat_index < config.beats_per_cycle() && self.click_in_beat < config.clicks_per_beat()
    }
}

impl fmt::Display for CyclePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.beat_index + 1, self.click_in_beat + 1)
    }
}
