// Metronome settings
// Serializable configuration, persisted as RON

pub mod manager;
pub mod types;

pub use manager::{SettingsError, SettingsManager};
pub use types::MetronomeSettings;
