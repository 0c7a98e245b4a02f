use crate::acknowledgement::PacketAcknowledgement;
use crate::channel::{last_frame, Channel, ChannelConfig, ChannelCore, PendingPackets};
use crate::error::RudpError;
use crate::packet::{ChannelKind, Packet};
use crate::pending::{PacketQueue, PendingPacket};
use crate::sequence::Sequencer;

use log::trace;

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// In order channel where every message is acknowledged by the receiver.
///
/// Messages not acknowledged within the resend interval are sent again until
/// their Ack arrives. Every received message is acknowledged, stale ones
/// included, so lost Acks are recovered by the next resend.
#[derive(Debug)]
pub struct ReliableChannel<E> {
    core: ChannelCore<E>,
    sequencer: Sequencer,
    acks: PacketAcknowledgement<E>,
    resends: VecDeque<PendingPacket<E>>,
}

impl<E> ReliableChannel<E> {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            core: ChannelCore::new(config),
            sequencer: Sequencer::default(),
            acks: PacketAcknowledgement::default(),
            resends: VecDeque::new(),
        }
    }
}

impl<E> Default for ReliableChannel<E> {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl<E: Clone> ReliableChannel<E> {
    /// Number of sent messages waiting for an Ack.
    pub fn unacked_len(&self) -> usize {
        self.acks.len()
    }

    fn collect_resends(&mut self) {
        let resends = self
            .acks
            .packets_to_resend(self.core.current_time(), self.core.config().resend_interval);
        self.resends.extend(resends);
    }
}

impl<E: Clone + fmt::Debug> Channel<E> for ReliableChannel<E> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Reliable
    }

    fn update(&mut self, duration: Duration) {
        self.core.advance_time(duration);
    }

    fn queue_outgoing(&mut self, endpoint: E, packet: Packet) -> Result<PendingPacket<E>, RudpError> {
        let sequence = self.sequencer.next_outgoing();
        let frames = self.core.enqueue_outgoing(endpoint, packet.with_sequence(sequence))?;
        let last = last_frame(&frames);
        self.acks.handle_outgoing_group(sequence, frames, self.core.current_time());

        Ok(last)
    }

    fn queue_incoming(&mut self, endpoint: E, packet: Packet) -> Option<PendingPacket<E>> {
        if !packet.is_fragmented() && self.acks.handle_incoming(&packet) {
            return None;
        }

        let packet = self.core.reassemble(packet)?;
        self.core.send_ack(endpoint.clone(), &packet);

        if !self.sequencer.accept(packet.sequence()) {
            trace!("Dropped stale packet {}", packet.sequence());
            return None;
        }

        Some(self.core.deliver(endpoint, packet))
    }

    fn try_get_next_outgoing(&mut self) -> Option<PendingPacket<E>> {
        self.collect_resends();
        self.resends.pop_front().or_else(|| self.core.outgoing().pop())
    }

    fn try_get_next_incoming(&mut self) -> Option<PendingPacket<E>> {
        self.core.next_incoming()
    }

    fn get_pending_outgoing(&mut self) -> PendingPackets<'_, E> {
        self.collect_resends();
        let resends = std::mem::take(&mut self.resends);
        PendingPackets::new(resends, self.core.outgoing().drain())
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
