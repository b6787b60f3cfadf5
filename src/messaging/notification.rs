// Beat notifications - Deferred "beat B starts now" events for the observer

use std::collections::VecDeque;
use std::time::Instant;

/// Event delivered to the observer when a beat starts sounding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatEvent {
    pub beat_index: u8,
    /// Schedule generation the event belongs to
    pub generation: u64,
    pub sequence: u64,
}

/// A queued notification waiting for its fire time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingNotification {
    pub sequence: u64,
    pub generation: u64,
    pub beat_index: u8,
    pub fire_at: Instant,
}

impl PendingNotification {
    pub fn to_event(self) -> BeatEvent {
        BeatEvent {
            beat_index: self.beat_index,
            generation: self.generation,
            sequence: self.sequence,
        }
    }
}

/// Ordered queue of pending notifications
///
/// Fire times never decrease from front to back, so due entries are always
/// taken from the front and firing order equals scheduling order.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: VecDeque<PendingNotification>,
    next_sequence: u64,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a notification; returns its sequence number
    pub fn schedule(&mut self, beat_index: u8, generation: u64, fire_at: Instant) -> u64 {
        // Keep the queue ordered even if an estimate lands before its predecessor
        let fire_at = match self.pending.back() {
            Some(last) if last.fire_at > fire_at => last.fire_at,
            _ => fire_at,
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.push_back(PendingNotification {
            sequence,
            generation,
            beat_index,
            fire_at,
        });
        sequence
    }

    /// Remove and return the front notification if it is due at `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<PendingNotification> {
        if self.pending.front()?.fire_at <= now {
            self.pending.pop_front()
        } else {
            None
        }
    }

    /// Cancel everything; returns how many notifications were dropped
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.pending.len();
        while self.pending.pop_front().is_some() {}
        cancelled
    }

    /// Cancel one notification by sequence; false if it already fired
    pub fn cancel(&mut self, sequence: u64) -> bool {
        match self.pending.iter().position(|n| n.sequence == sequence) {
            Some(index) => self.pending.remove(index).is_some(),
            None => false,
        }
    }

    /// Cancel notifications for beats that no longer exist in a shorter meter
    pub fn cancel_beats_from(&mut self, beats_per_cycle: u8) -> usize {
        let before = self.pending.len();
        self.pending.retain(|n| n.beat_index < beats_per_cycle);
        before - self.pending.len()
    }

    /// Fire time of the next notification
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.front().map(|n| n.fire_at)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingNotification> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fires_in_order_when_due() {
        let now = Instant::now();
        let mut queue = NotificationQueue::new();
        queue.schedule(0, 1, now + Duration::from_millis(10));
        queue.schedule(1, 1, now + Duration::from_millis(20));

        assert!(queue.pop_due(now).is_none());
        assert_eq!(queue.next_deadline(), Some(now + Duration::from_millis(10)));

        let later = now + Duration::from_millis(25);
        assert_eq!(queue.pop_due(later).map(|n| n.beat_index), Some(0));
        assert_eq!(queue.pop_due(later).map(|n| n.beat_index), Some(1));
        assert!(queue.pop_due(later).is_none());
    }

    #[test]
    fn test_cancel_all() {
        let now = Instant::now();
        let mut queue = NotificationQueue::new();
        queue.schedule(0, 1, now);
        queue.schedule(1, 1, now);

        assert_eq!(queue.cancel_all(), 2);
        assert!(queue.is_empty());
        assert!(queue.pop_due(now + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_cancel_single_notification() {
        let now = Instant::now();
        let mut queue = NotificationQueue::new();
        let first = queue.schedule(0, 1, now);
        let second = queue.schedule(1, 1, now);

        assert!(queue.cancel(second));
        assert!(!queue.cancel(second));
        assert_eq!(queue.pop_due(now).map(|n| n.sequence), Some(first));
        assert!(!queue.cancel(first));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_out_of_order_fire_time_is_pushed_back() {
        let now = Instant::now();
        let mut queue = NotificationQueue::new();
        queue.schedule(0, 1, now + Duration::from_millis(50));
        queue.schedule(1, 1, now + Duration::from_millis(40));

        let fire_times: Vec<_> = queue.iter().map(|n| n.fire_at).collect();
        assert_eq!(fire_times[0], fire_times[1]);
    }

    #[test]
    fn test_cancel_beats_from() {
        let now = Instant::now();
        let mut queue = NotificationQueue::new();
        queue.schedule(2, 1, now);
        queue.schedule(3, 1, now);
        queue.schedule(0, 1, now);

        assert_eq!(queue.cancel_beats_from(3), 1);
        let beats: Vec<_> = queue.iter().map(|n| n.beat_index).collect();
        assert_eq!(beats, vec![2, 0]);
    }

    #[test]
    fn test_sequences_are_monotonic() {
        let now = Instant::now();
        let mut queue = NotificationQueue::new();
        let a = queue.schedule(0, 1, now);
        queue.cancel_all();
        let b = queue.schedule(0, 2, now);
        assert!(b > a);
    }
}
