// Settings manager - Load/save metronome settings as RON

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use ron::ser::PrettyConfig;

use crate::settings::types::MetronomeSettings;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),
}

/// Reads and writes one settings file
pub struct SettingsManager {
    path: PathBuf,
}

impl SettingsManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings; a missing file yields the defaults
    pub fn load(&self) -> Result<MetronomeSettings, SettingsError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", self.path.display());
                return Ok(MetronomeSettings::default());
            }
            Err(e) => return Err(e.into()),
        };

        let settings: MetronomeSettings = ron::from_str(&text)?;
        info!("Loaded settings from {}", self.path.display());
        Ok(settings.sanitized())
    }

    /// Save settings, creating parent directories as needed
    pub fn save(&self, settings: &MetronomeSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let text = ron::ser::to_string_pretty(settings, PrettyConfig::default())?;
        fs::write(&self.path, text)?;
        info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::metronome::AccentPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path().join("none.ron"));
        assert_eq!(manager.load().unwrap(), MetronomeSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path().join("nested/metronome.ron"));

        let settings = MetronomeSettings {
            bpm: 90.0,
            beats_per_cycle: 3,
            subdivision: 3,
            accent_policy: AccentPolicy::FirstClickOnly,
            ..MetronomeSettings::default()
        };
        manager.save(&settings).unwrap();

        assert_eq!(manager.load().unwrap(), settings);
    }

    #[test]
    fn test_partial_file_uses_defaults_and_clamps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.ron");
        fs::write(&path, "(bpm: 5000.0, subdivision: 2)").unwrap();

        let settings = SettingsManager::new(&path).load().unwrap();
        assert_eq!(settings.bpm, 999.0);
        assert_eq!(settings.subdivision, 2);
        assert_eq!(settings.beats_per_cycle, 4);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.ron");
        fs::write(&path, "(bpm: \"fast\")").unwrap();

        let result = SettingsManager::new(&path).load();
        assert!(matches!(result, Err(SettingsError::Parse(_))));
    }
}
