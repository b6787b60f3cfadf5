// Timeline - Musical time values
// Tempo, meter and subdivision, clamped into their valid ranges on construction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Time signature (numerator/denominator)
/// Only the numerator drives timing; the denominator is display information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    numerator: u8,
    denominator: u8,
}

impl TimeSignature {
    pub const MIN_BEATS: u8 = 1;
    pub const MAX_BEATS: u8 = 16;

    /// Creates a new time signature
    /// Numerator is clamped to [1, 16]; a denominator that is not a power
    /// of two falls back to 4.
    pub fn new(numerator: u8, denominator: u8) -> Self {
        let denominator = if denominator.is_power_of_two() {
            denominator
        } else {
            4
        };
        Self {
            numerator: numerator.clamp(Self::MIN_BEATS, Self::MAX_BEATS),
            denominator,
        }
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// Common 6/8 time signature
    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    /// Number of beats per cycle
    pub fn beats_per_cycle(&self) -> u8 {
        self.numerator
    }

    pub fn denominator(&self) -> u8 {
        self.denominator
    }

    /// Same denominator, different beat count
    pub fn with_beats(&self, beats_per_cycle: u8) -> Self {
        Self::new(beats_per_cycle, self.denominator)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 999.0;

    /// Creates a new tempo, clamped to [20.0, 999.0]
    /// Non-finite input falls back to the default tempo.
    pub fn new(bpm: f64) -> Self {
        let bpm = if bpm.is_finite() {
            bpm.clamp(Self::MIN_BPM, Self::MAX_BPM)
        } else {
            Self::default().bpm
        };
        Self { bpm }
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one beat in samples at given sample rate
    pub fn beat_duration_samples(&self, sample_rate: f64) -> f64 {
        self.beat_duration_seconds() * sample_rate
    }

    pub fn beat_duration(&self) -> Duration {
        Duration::from_secs_f64(self.beat_duration_seconds())
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Clicks per beat (1 = quarter, 2 = eighths, 3 = triplets, 4 = sixteenths)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subdivision(u8);

impl Subdivision {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    /// Creates a subdivision, clamped to [1, 4]
    pub fn new(clicks_per_beat: u8) -> Self {
        Self(clicks_per_beat.clamp(Self::MIN, Self::MAX))
    }

    pub fn clicks_per_beat(&self) -> u8 {
        self.0
    }
}

impl Default for Subdivision {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for Subdivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per beat", self.0)
    }
}
