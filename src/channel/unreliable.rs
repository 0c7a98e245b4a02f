use crate::channel::{last_frame, Channel, ChannelConfig, ChannelCore, PendingPackets};
use crate::error::RudpError;
use crate::packet::{ChannelKind, Packet};
use crate::pending::{PacketQueue, PendingPacket};

use std::fmt;
use std::time::Duration;

/// Channel with the same guarantees as a udp socket.
/// Packets can be lost and are delivered in the order they were received,
/// only fragmented messages are held until all of their fragments arrived.
#[derive(Debug)]
pub struct UnreliableChannel<E> {
    core: ChannelCore<E>,
}

impl<E> UnreliableChannel<E> {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            core: ChannelCore::new(config),
        }
    }
}

impl<E> Default for UnreliableChannel<E> {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl<E: Clone + fmt::Debug> Channel<E> for UnreliableChannel<E> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Unreliable
    }

    fn update(&mut self, duration: Duration) {
        self.core.advance_time(duration);
    }

    fn queue_outgoing(&mut self, endpoint: E, packet: Packet) -> Result<PendingPacket<E>, RudpError> {
        let frames = self.core.enqueue_outgoing(endpoint, packet)?;
        Ok(last_frame(&frames))
    }

    fn queue_incoming(&mut self, endpoint: E, packet: Packet) -> Option<PendingPacket<E>> {
        let packet = self.core.reassemble(packet)?;
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
