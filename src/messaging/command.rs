// Command types - Communication UI → scheduler thread

use crate::sequencer::metronome::{AccentPolicy, VoiceSet};

#[derive(Debug, Clone)]
pub enum Command {
    Start { reset_position: bool },
    Stop,
    SetTempo(f64),
    SetMeter(u8),
    SetSubdivision(u8),
    SetVoices(VoiceSet),
    SetAccentPolicy(AccentPolicy),
    Shutdown,
}
