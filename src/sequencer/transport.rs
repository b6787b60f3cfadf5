// Transport - Scheduler run state published to other threads
// Written only by the scheduler thread, read by the UI side

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

/// Scheduler run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    /// Running, waiting out a restart delay after a reconfiguration
    Restarting,
}

impl TransportState {
    /// Check if the metronome is logically running (Playing or Restarting)
    pub fn is_running(&self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Restarting)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped)
    }
}

/// Shared transport state
/// Thread-safe via atomics for communication with the UI thread
#[derive(Debug)]
pub struct SharedTransportState {
    running: AtomicBool,
    restarting: AtomicBool,
    generation: AtomicU64,
    last_beat: AtomicU8,
    clicks_scheduled: AtomicU64,
}

impl SharedTransportState {
    const NO_BEAT: u8 = u8::MAX;

    /// Create new shared transport state
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get current transport state
    pub fn state(&self) -> TransportState {
        if !self.running.load(Ordering::Acquire) {
            TransportState::Stopped
        } else if self.restarting.load(Ordering::Acquire) {
            TransportState::Restarting
        } else {
            TransportState::Playing
        }
    }

    pub fn set_state(&self, state: TransportState) {
        self.running.store(state.is_running(), Ordering::Release);
        self.restarting
            .store(state == TransportState::Restarting, Ordering::Release);
    }

    /// Generation of the schedule currently playing
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::Release);
    }

    /// Beat index of the last delivered beat notification
    pub fn last_beat(&self) -> Option<u8> {
        match self.last_beat.load(Ordering::Relaxed) {
            Self::NO_BEAT => None,
            beat => Some(beat),
        }
    }

    pub fn set_last_beat(&self, beat: Option<u8>) {
        self.last_beat
            .store(beat.unwrap_or(Self::NO_BEAT), Ordering::Relaxed);
    }

    /// Total clicks handed to the output since creation
    pub fn clicks_scheduled(&self) -> u64 {
        self.clicks_scheduled.load(Ordering::Relaxed)
    }

    pub fn record_click(&self) {
        self.clicks_scheduled.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for SharedTransportState {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            restarting: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            last_beat: AtomicU8::new(Self::NO_BEAT),
            clicks_scheduled: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_state() {
        assert!(TransportState::Playing.is_running());
        assert!(TransportState::Restarting.is_running());
        assert!(!TransportState::Stopped.is_running());
        assert!(TransportState::Stopped.is_stopped());
    }

    #[test]
    fn test_shared_transport_state() {
        let state = SharedTransportState::new();
        assert_eq!(state.state(), TransportState::Stopped);

        state.set_state(TransportState::Restarting);
        assert_eq!(state.state(), TransportState::Restarting);

        state.set_state(TransportState::Playing);
        assert_eq!(state.state(), TransportState::Playing);

        state.set_state(TransportState::Stopped);
        assert_eq!(state.state(), TransportState::Stopped);
    }

    #[test]
    fn test_last_beat() {
        let state = SharedTransportState::new();
        assert_eq!(state.last_beat(), None);
        state.set_last_beat(Some(3));
        assert_eq!(state.last_beat(), Some(3));
        state.set_last_beat(None);
        assert_eq!(state.last_beat(), None);
    }

    #[test]
    fn test_click_counter() {
        let state = SharedTransportState::new();
        state.record_click();
        state.record_click();
        assert_eq!(state.clicks_scheduled(), 2);
    }
}
