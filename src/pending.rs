use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender, TryIter};

use crate::packet::{Packet, PacketType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// A packet waiting in one of the channel queues, together with the endpoint it
/// came from or should be sent to.
///
/// Cloning is cheap, the payload and the encoded frame are reference counted.
#[derive(Debug, Clone)]
pub struct PendingPacket<E> {
    endpoint: E,
    direction: Direction,
    packet: Packet,
    bytes: Bytes,
}

impl<E> PendingPacket<E> {
    pub fn new(endpoint: E, packet: Packet, direction: Direction) -> Self {
        let bytes = packet.to_bytes();
        Self {
            endpoint,
            direction,
            packet,
            bytes,
        }
    }

    pub fn incoming(endpoint: E, packet: Packet) -> Self {
        Self::new(endpoint, packet, Direction::Incoming)
    }

    pub fn outgoing(endpoint: E, packet: Packet) -> Self {
        Self::new(endpoint, packet, Direction::Outgoing)
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn sequence(&self) -> u16 {
        self.packet.sequence()
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet.packet_type()
    }

    /// Message bytes without any header.
    pub fn payload(&self) -> &Bytes {
        self.packet.payload()
    }

    /// Encoded frame, ready to be written to a socket.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_parts(self) -> (E, Packet) {
        (self.endpoint, self.packet)
    }
}

/// Multi-producer multi-consumer FIFO of pending packets.
///
/// Handles are cheap to clone and all clones share the same queue, so one
/// thread may enqueue while another dequeues.
#[derive(Debug)]
pub struct PacketQueue<E> {
    sender: Sender<PendingPacket<E>>,
    receiver: Receiver<PendingPacket<E>>,
}

impl<E> Clone for PacketQueue<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<E> Default for PacketQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> PacketQueue<E> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn push(&self, packet: PendingPacket<E>) {
        // Both ends live in self, the queue cannot be disconnected.
        let _ = self.sender.send(packet);
    }

    pub fn pop(&self) -> Option<PendingPacket<E>> {
        self.receiver.try_recv().ok()
    }

    /// Lazily dequeues packets until the queue is empty.
    pub fn drain(&self) -> TryIter<'_, PendingPacket<E>> {
        self.receiver.try_iter()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
