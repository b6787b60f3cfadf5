// Metronome - Voice selection and voice buffers
// Maps a captured cycle position to the voice that plays it

use super::pattern::{CyclePosition, PatternConfig};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::sync::Arc;

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClickType {
    /// Click on the first beat of the cycle
    Accent,
    /// Click on other beats
    Regular,
}

/// Which clicks of the first beat carry the accent voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccentPolicy {
    /// Every click of beat 0 is accented (S accented clicks per cycle)
    #[default]
    WholeFirstBeat,
    /// Only the very first click of the cycle is accented
    FirstClickOnly,
}

/// Outcome of voice selection for one click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickSelection {
    pub voice: ClickType,
    /// True for the first click of a beat; drives beat notifications
    pub is_beat_boundary: bool,
}

/// Select the voice for a click
///
/// `position` is taken by value: callers pass the position captured for this
/// click, before anything advances it. It must lie inside `config`'s cycle.
pub fn select_voice(
    config: &PatternConfig,
    position: CyclePosition,
    policy: AccentPolicy,
) -> ClickSelection {
    debug_assert!(
        position.is_valid_for(config),
        "position {} outside a {}-beat cycle of {} clicks",
        position,
        config.beats_per_cycle(),
        config.clicks_per_beat()
    );

    let accented = match policy {
        AccentPolicy::WholeFirstBeat => position.beat_index == 0,
        AccentPolicy::FirstClickOnly => position.beat_index == 0 && position.click_in_beat == 0,
    };

    ClickSelection {
        voice: if accented {
            ClickType::Accent
        } else {
            ClickType::Regular
        },
        is_beat_boundary: position.click_in_beat == 0,
    }
}

/// Pre-rendered mono audio for one voice
/// The scheduler never looks inside; only the output facility reads samples.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceBuffer {
    samples: Arc<[f32]>,
}

impl VoiceBuffer {
    pub fn new(samples: impl Into<Arc<[f32]>>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True if both handles point at the same allocation
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

/// The two buffers played by the metronome
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSet {
    accent: VoiceBuffer,
    regular: VoiceBuffer,
}

impl VoiceSet {
    /// Duration of a default click
    const CLICK_DURATION_MS: f32 = 10.0;

    pub fn new(accent: VoiceBuffer, regular: VoiceBuffer) -> Self {
        Self { accent, regular }
    }

    /// Get the buffer for a click type
    pub fn buffer_for(&self, click_type: ClickType) -> &VoiceBuffer {
        match click_type {
            ClickType::Accent => &self.accent,
            ClickType::Regular => &self.regular,
        }
    }

    /// Two short decaying sine clicks, the accent higher and louder
    pub fn sine_clicks(sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        let num_samples = ((Self::CLICK_DURATION_MS / 1000.0) * sample_rate) as usize;

        Self {
            accent: Self::render_click(sample_rate, num_samples, 1200.0, 0.6),
            regular: Self::render_click(sample_rate, num_samples, 800.0, 0.4),
        }
    }

    fn render_click(
        sample_rate: f32,
        num_samples: usize,
        frequency: f32,
        amplitude: f32,
    ) -> VoiceBuffer {
        let phase_increment = 2.0 * PI * frequency / sample_rate;

        let samples: Vec<f32> = (0..num_samples)
            .map(|i| {
                let t = i as f32 / num_samples as f32;
                let envelope = (-t * 8.0).exp();
                (i as f32 * phase_increment).sin() * envelope * amplitude
            })
            .collect();

        VoiceBuffer::new(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::timeline::{Subdivision, Tempo, TimeSignature};

    fn config(beats: u8, subdivision: u8) -> PatternConfig {
        PatternConfig::new(
            Tempo::new(120.0),
            TimeSignature::new(beats, 4),
            Subdivision::new(subdivision),
        )
    }

    #[test]
    fn test_whole_first_beat_is_accented() {
        let cfg = config(4, 3);
        for click in 0..3 {
            let sel = select_voice(
                &cfg,
                CyclePosition::new(0, click),
                AccentPolicy::WholeFirstBeat,
            );
            assert_eq!(sel.voice, ClickType::Accent);
        }
        let sel = select_voice(&cfg, CyclePosition::new(1, 0), AccentPolicy::WholeFirstBeat);
        assert_eq!(sel.voice, ClickType::Regular);
    }

    #[test]
    fn test_first_click_only_policy() {
        let cfg = config(4, 3);
        let first = select_voice(&cfg, CyclePosition::new(0, 0), AccentPolicy::FirstClickOnly);
        let second = select_voice(&cfg, CyclePosition::new(0, 1), AccentPolicy::FirstClickOnly);
        assert_eq!(first.voice, ClickType::Accent);
        assert_eq!(second.voice, ClickType::Regular);
    }

    #[test]
    fn test_beat_boundary_flag() {
        let cfg = config(4, 4);
        let policy = AccentPolicy::default();
        assert!(select_voice(&cfg, CyclePosition::new(2, 0), policy).is_beat_boundary);
        assert!(!select_voice(&cfg, CyclePosition::new(2, 1), policy).is_beat_boundary);
        assert!(!select_voice(&cfg, CyclePosition::new(2, 3), policy).is_beat_boundary);
    }

    #[test]
    fn test_sine_clicks() {
        let voices = VoiceSet::sine_clicks(48000);

        let accent = voices.buffer_for(ClickType::Accent);
        let regular = voices.buffer_for(ClickType::Regular);

        // 10ms at 48kHz = 480 samples
        assert_eq!(accent.len(), 480);
        assert_eq!(regular.len(), 480);

        let peak = |b: &VoiceBuffer| b.samples().iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        assert!(peak(accent) > peak(regular));
    }

    #[test]
    fn test_voice_buffer_clones_share_storage() {
        let buffer = VoiceBuffer::new(vec![0.1, 0.2]);
        let clone = buffer.clone();
        assert!(buffer.ptr_eq(&clone));
        assert!(!buffer.ptr_eq(&VoiceBuffer::new(vec![0.1, 0.2])));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside a 3-beat cycle")]
    fn test_select_voice_rejects_position_outside_cycle() {
        select_voice(&config(3, 2), CyclePosition::new(3, 0), AccentPolicy::WholeFirstBeat);
    }
}
