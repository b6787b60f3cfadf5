// Sequencer module
// Pattern state, voice selection, click scheduling and live reconfiguration

pub mod metronome;
pub mod pattern;
pub mod player;
pub mod reconfigure;
pub mod scheduler;
pub mod timeline;
pub mod transport;

pub use metronome::{AccentPolicy, ClickSelection, ClickType, VoiceBuffer, VoiceSet, select_voice};
pub use pattern::{CyclePosition, PatternConfig};
pub use player::{MetronomePlayer, SchedulerWorker};
pub use reconfigure::{Reconfiguration, RestartPolicy, remap_beat_index};
pub use scheduler::{ClickScheduler, ScheduledClick, SchedulerOptions, TimelineAnchor};
pub use timeline::{Subdivision, Tempo, TimeSignature};
pub use transport::{SharedTransportState, TransportState};
