use crate::acknowledgement::PacketAcknowledgement;
use crate::channel::{last_frame, Channel, ChannelConfig, ChannelCore, PendingPackets};
use crate::error::RudpError;
use crate::packet::{ChannelKind, Packet};
use crate::pending::{PacketQueue, PendingPacket};
use crate::reorder::ReorderBuffer;
use crate::sequence::Sequencer;

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Reliable channel that delivers every message in the order it was sent.
///
/// Messages arriving ahead of a missing one are held until the gap is filled.
/// A gap that stays open for longer than `reorder_timeout` is skipped, so a
/// message that is never received cannot stall the channel.
#[derive(Debug)]
pub struct ReliableInOrderChannel<E> {
    core: ChannelCore<E>,
    sequencer: Sequencer,
    acks: PacketAcknowledgement<E>,
    resends: VecDeque<PendingPacket<E>>,
    reorder_buffer: ReorderBuffer<E>,
}

impl<E> ReliableInOrderChannel<E> {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            core: ChannelCore::new(config),
            sequencer: Sequencer::default(),
            acks: PacketAcknowledgement::default(),
            resends: VecDeque::new(),
            reorder_buffer: ReorderBuffer::new(),
        }
    }

    /// Number of received messages held back waiting for a missing one.
    pub fn held_len(&self) -> usize {
        self.reorder_buffer.len()
    }
}

impl<E> Default for ReliableInOrderChannel<E> {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl<E: Clone> ReliableInOrderChannel<E> {
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

    fn expire_reorder_buffer(&mut self) {
        let released = self
            .reorder_buffer
            .expire(self.core.current_time(), self.core.config().reorder_timeout);
        for packet in released {
            self.core.incoming().push(packet);
        }
    }
}

impl<E: Clone + fmt::Debug> Channel<E> for ReliableInOrderChannel<E> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::ReliableInOrder
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

        let sequence = packet.sequence();
        let released = self
            .reorder_buffer
            .insert(PendingPacket::incoming(endpoint, packet), self.core.current_time());

        let mut delivered = None;
        for pending in released {
            if pending.sequence() == sequence {
                delivered = Some(pending.clone());
            }
            self.core.incoming().push(pending);
        }

        self.expire_reorder_buffer();
        delivered
    }

    fn try_get_next_outgoing(&mut self) -> Option<PendingPacket<E>> {
        self.collect_resends();
        self.resends.pop_front().or_else(|| self.core.outgoing().pop())
    }

    fn try_get_next_incoming(&mut self) -> Option<PendingPacket<E>> {
        self.expire_reorder_buffer();
        self.core.next_incoming()
    }

    fn get_pending_outgoing(&mut self) -> PendingPackets<'_, E> {
        self.collect_resends();
        let resends = std::mem::take(&mut self.resends);
        PendingPackets::new(resends, self.core.outgoing().drain())
    }

    fn get_pending_incoming(&mut self) -> PendingPackets<'_, E> {
        self.expire_reorder_buffer();
        self.core.pending_incoming()
    }

    fn incoming_queue(&self) -> PacketQueue<E> {
        self.core.incoming().clone()
    }

    fn outgoing_queue(&self) -> PacketQueue<E> {
        self.core.outgoing().clone()
    }
}
