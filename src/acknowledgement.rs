use crate::packet::{Packet, PacketType};
use crate::pending::PendingPacket;

use log::trace;

use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug)]
struct UnackedPacket<E> {
    // All the frames of the message, a fragmented message has one per fragment.
    packets: Vec<PendingPacket<E>>,
    last_sent: Duration,
    send_order: u64,
}

/// Tracks outgoing packets until an Ack with the same sequence is received.
///
/// There is no retry limit, a packet is offered for resend every interval
/// until it is acknowledged or the tracker is dropped.
#[derive(Debug)]
pub struct PacketAcknowledgement<E> {
    unacked_packets: BTreeMap<u16, UnackedPacket<E>>,
    next_send_order: u64,
}

impl<E> Default for PacketAcknowledgement<E> {
    fn default() -> Self {
        Self {
            unacked_packets: BTreeMap::new(),
            next_send_order: 0,
        }
    }
}

impl<E: Clone> PacketAcknowledgement<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.unacked_packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unacked_packets.is_empty()
    }

    pub fn contains(&self, sequence: u16) -> bool {
        self.unacked_packets.contains_key(&sequence)
    }

    /// Registers, or replaces, the packet tracked under `sequence`.
    pub fn handle_outgoing(&mut self, sequence: u16, packet: PendingPacket<E>, current_time: Duration) {
        self.handle_outgoing_group(sequence, vec![packet], current_time);
    }

    /// Registers every frame of a message under the message sequence.
    pub fn handle_outgoing_group(&mut self, sequence: u16, packets: Vec<PendingPacket<E>>, current_time: Duration) {
        let unacked_packet = UnackedPacket {
            packets,
            last_sent: current_time,
            send_order: self.next_send_order,
        };
        self.next_send_order += 1;
        self.unacked_packets.insert(sequence, unacked_packet);
    }

    /// Returns true when the packet is an Ack and was consumed by the tracker.
    pub fn handle_incoming(&mut self, packet: &Packet) -> bool {
        if packet.packet_type() != PacketType::Ack {
            return false;
        }

        if self.unacked_packets.remove(&packet.sequence()).is_some() {
            trace!("Packet {} acknowledged", packet.sequence());
        }
        true
    }

    /// Returns the packets not sent for at least `resend_interval` and marks them as sent.
    /// Packets come out in the order they were first sent, across sequence wraparound.
    pub fn packets_to_resend(&mut self, current_time: Duration, resend_interval: Duration) -> Vec<PendingPacket<E>> {
        let mut due: Vec<&mut UnackedPacket<E>> = vec![];
        for (sequence, unacked_packet) in self.unacked_packets.iter_mut() {
            if current_time.saturating_sub(unacked_packet.last_sent) < resend_interval {
                continue;
            }

            trace!("Resending packet {} ({} frames)", sequence, unacked_packet.packets.len());
            unacked_packet.last_sent = current_time;
            due.push(unacked_packet);
        }
        due.sort_by_key(|unacked_packet| unacked_packet.send_order);

        let mut packets = vec![];
        for unacked_packet in due {
            packets.extend(unacked_packet.packets.iter().cloned());
        }

        packets
    }
}
