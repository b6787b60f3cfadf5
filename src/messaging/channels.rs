// Communication channels lock-free

use crate::audio::output::PlaybackTicket;
use crate::messaging::command::Command;
use crate::messaging::notification::BeatEvent;
use crate::sequencer::transport::SharedTransportState;
use ringbuf::traits::{Consumer, Split};
use ringbuf::HeapRb;
use std::sync::Arc;

pub type CommandProducer = ringbuf::HeapProd<Command>;
pub type CommandConsumer = ringbuf::HeapCons<Command>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<Command>::new(capacity);
    rb.split()
}

/// Playback completions, pushed by the output's render context
pub type CompletionProducer = ringbuf::HeapProd<PlaybackTicket>;
pub type CompletionConsumer = ringbuf::HeapCons<PlaybackTicket>;

pub fn create_completion_channel(capacity: usize) -> (CompletionProducer, CompletionConsumer) {
    let rb = HeapRb::<PlaybackTicket>::new(capacity);
    rb.split()
}

pub type BeatProducer = ringbuf::HeapProd<BeatEvent>;
pub type BeatConsumer = ringbuf::HeapCons<BeatEvent>;

pub fn create_beat_channel(capacity: usize) -> (BeatProducer, BeatConsumer) {
    let rb = HeapRb::<BeatEvent>::new(capacity);
    rb.split()
}

/// UI-side end of the beat channel
///
/// Drained from the UI's own thread (e.g. once per frame). Events from a
/// schedule generation that has since been torn down are discarded.
pub struct BeatReceiver {
    consumer: BeatConsumer,
    transport: Arc<SharedTransportState>,
}

impl BeatReceiver {
    pub fn new(consumer: BeatConsumer, transport: Arc<SharedTransportState>) -> Self {
        Self {
            consumer,
            transport,
        }
    }

    /// Deliver every pending beat to `observer`; returns how many were delivered
    pub fn drain(&mut self, mut observer: impl FnMut(u8)) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.consumer.try_pop() {
            if event.generation != self.transport.generation() {
                continue;
            }
            observer(event.beat_index);
            delivered += 1;
        }
        delivered
    }

    pub fn transport(&self) -> &Arc<SharedTransportState> {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Producer;

    #[test]
    fn test_receiver_drops_stale_generation() {
        let transport = SharedTransportState::new();
        transport.set_generation(2);
        let (mut tx, rx) = create_beat_channel(8);
        let mut receiver = BeatReceiver::new(rx, Arc::clone(&transport));

        let event = |beat_index, generation| BeatEvent {
            beat_index,
            generation,
            sequence: 0,
        };
        let _ = tx.try_push(event(3, 1));
        let _ = tx.try_push(event(0, 2));
        let _ = tx.try_push(event(1, 2));

        let mut beats = Vec::new();
        let delivered = receiver.drain(|beat| beats.push(beat));
        assert_eq!(delivered, 2);
        assert_eq!(beats, vec![0, 1]);
    }

    #[test]
    fn test_completion_channel_capacity() {
        let (mut tx, mut rx) = create_completion_channel(2);
        let ticket = PlaybackTicket {
            generation: 0,
            sequence: 0,
        };
        assert!(tx.try_push(ticket).is_ok());
        assert!(tx.try_push(ticket).is_ok());
        assert!(tx.try_push(ticket).is_err());
        assert_eq!(rx.try_pop(), Some(ticket));
    }
}
