// Click scheduler - Library exports for the demo binary, tests and benchmarks

pub mod audio;
pub mod messaging;
pub mod sequencer;
pub mod settings;

// Re-export commonly used types for convenience
pub use audio::engine::{CpalOutput, OutputStream};
pub use audio::offline::OfflineOutput;
pub use audio::output::{AudioOutput, OutputError, PlayAt, PlayRequest, PlaybackTicket};
pub use audio::timing::{AudioTiming, TimelineClock};
pub use messaging::channels::{BeatReceiver, create_completion_channel};
pub use messaging::notification::{BeatEvent, NotificationQueue, PendingNotification};
pub use sequencer::{
    AccentPolicy, ClickScheduler, ClickType, CyclePosition, MetronomePlayer, PatternConfig,
    ScheduledClick, SchedulerOptions, Subdivision, Tempo, TimeSignature, TransportState,
    VoiceBuffer, VoiceSet,
};
pub use settings::{MetronomeSettings, SettingsError, SettingsManager};
