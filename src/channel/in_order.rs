use crate::channel::{last_frame, Channel, ChannelConfig, ChannelCore, PendingPackets};
use crate::error::RudpError;
use crate::packet::{ChannelKind, Packet};
use crate::pending::{PacketQueue, PendingPacket};
use crate::sequence::Sequencer;

use log::trace;

use std::fmt;
use std::time::Duration;

/// Unreliable channel that drops stale packets.
///
/// Outgoing packets are sequenced by the channel, the sequence in the given
/// packet is ignored. A received packet is only delivered if its sequence is
/// newer than every sequence delivered before, so packets can be lost but never
/// arrive out of order. Fragmented messages are checked once reassembled.
#[derive(Debug)]
pub struct InOrderChannel<E> {
    core: ChannelCore<E>,
    sequencer: Sequencer,
}

impl<E> InOrderChannel<E> {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            core: ChannelCore::new(config),
            sequencer: Sequencer::default(),
        }
    }
}

impl<E> Default for InOrderChannel<E> {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl<E: Clone + fmt::Debug> Channel<E> for InOrderChannel<E> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InOrder
    }

    fn update(&mut self, duration: Duration) {
        self.core.advance_time(duration);
    }

    fn queue_outgoing(&mut self, endpoint: E, packet: Packet) -> Result<PendingPacket<E>, RudpError> {
        let sequence = self.sequencer.next_outgoing();
        let frames = self.core.enqueue_outgoing(endpoint, packet.with_sequence(sequence))?;
        Ok(last_frame(&frames))
    }

    fn queue_incoming(&mut self, endpoint: E, packet: Packet) -> Option<PendingPacket<E>> {
        let packet = self.core.reassemble(packet)?;
        if !self.sequencer.accept(packet.sequence()) {
            trace!("Dropped stale packet {}", packet.sequence());
            return None;
        }

        Some(self.core.deliver(endpoint, packet))
    }

    fn try_get_next_outgoing(&mut self) -> Option<PendingPacket<E>> {
        self.core.outgoing().pop()
    }

    fn try_get_next_incoming(&mut self) -> Option<PendingPacket<E>> {
        self.core.next_incoming()
    }

    fn get_pending_outgoing(&mut self) -> PendingPackets<'_, E> {
        PendingPackets::queued(self.core.outgoing().drain())
    }

    fn get_pending_incoming(&mut self) -> PendingPackets<'_, E> {
        self.core.pending_incoming()
    }

    fn incoming_queue(&self) -> PacketQueue<E> {
        self.core.incoming().clone()
    }

    fn outgoing_queue(&self) -> PacketQueue<E> {
        self.core.outgoing().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    fn data(sequence: u16) -> Packet {
        Packet::new(PacketType::Data, ChannelKind::InOrder, sequence, vec![sequence as u8])
    }

    #[test]
    fn assigns_sequences() {
        let mut channel: InOrderChannel<()> = InOrderChannel::default();
        for expected in 0..3 {
            let pending = channel.queue_outgoing((), data(100)).unwrap();
            assert_eq!(pending.sequence(), expected);
        }
    }

    #[test]
    fn drops_stale_packets() {
        let mut channel: InOrderChannel<()> = InOrderChannel::default();
        assert!(channel.queue_incoming((), data(1)).is_some());
        assert!(channel.queue_incoming((), data(3)).is_some());
        assert!(channel.queue_incoming((), data(2)).is_none());
        assert!(channel.queue_incoming((), data(3)).is_none());

        let sequences: Vec<u16> = channel.get_pending_incoming().map(|p| p.sequence()).collect();
        assert_eq!(sequences, vec![1, 3]);
    }

    #[test]
    fn first_packet_always_accepted() {
        let mut channel: InOrderChannel<()> = InOrderChannel::default();
        assert!(channel.queue_incoming((), data(40000)).is_some());
        assert!(channel.queue_incoming((), data(0)).is_some());
    }

    #[test]
    fn sequence_wraparound() {
        let mut sender: InOrderChannel<()> = InOrderChannel::default();
        let mut receiver: InOrderChannel<()> = InOrderChannel::default();
        for _ in 0..65534 {
            sender.sequencer.next_outgoing();
        }

        for _ in 0..4 {
            sender.queue_outgoing((), data(0)).unwrap();
        }
        let frames: Vec<_> = sender.get_pending_outgoing().collect();
        let sequences: Vec<u16> = frames.iter().map(|p| p.sequence()).collect();
        assert_eq!(sequences, vec![65534, 65535, 0, 1]);

        for frame in frames {
            assert!(receiver.queue_incoming((), frame.packet().clone()).is_some());
        }
        // A packet from before the wrap is stale now
        assert!(receiver.queue_incoming((), data(65535)).is_none());
        assert_eq!(receiver.get_pending_incoming().count(), 4);
    }

    #[test]
    fn fragmented_message_is_sequenced_once() {
        let mut sender: InOrderChannel<()> = InOrderChannel::default();
        let mut receiver: InOrderChannel<()> = InOrderChannel::default();
        let message = Packet::new(PacketType::Data, ChannelKind::InOrder, 0, vec![3u8; 2500]);

        sender.queue_outgoing((), message.clone()).unwrap();
        let frames: Vec<_> = sender.get_pending_outgoing().collect();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.sequence() == 0));

        for frame in frames.iter().rev() {
            receiver.queue_incoming((), frame.packet().clone());
        }
        let delivered = receiver.try_get_next_incoming().unwrap();
        assert_eq!(delivered.payload(), message.payload());

        // The same message again is stale
        for frame in frames.iter() {
            assert!(receiver.queue_incoming((), frame.packet().clone()).is_none());
        }
        assert!(receiver.try_get_next_incoming().is_none());
    }
}
