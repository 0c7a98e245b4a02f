mod in_order;
mod reliable;
mod reliable_in_order;
mod unreliable;

pub use in_order::InOrderChannel;
pub use reliable::ReliableChannel;
pub use reliable_in_order::ReliableInOrderChannel;
pub use unreliable::UnreliableChannel;

use crate::error::RudpError;
use crate::fragment::{build_fragments, FragmentAssembler, ReassembledMessage};
use crate::packet::{ChannelKind, Packet, PacketType, FRAGMENT_HEADER_SIZE, PACKET_HEADER_SIZE};
use crate::pending::{PacketQueue, PendingPacket};

use bytes::Bytes;
use crossbeam_channel::TryIter;
use log::{trace, warn};

use std::collections::{vec_deque, VecDeque};
use std::fmt;
use std::time::Duration;

/// Configuration shared by every channel kind.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelConfig {
    /// Maximum size of a datagram, payloads that do not fit are fragmented
    pub max_buffer_size: usize,
    /// Incomplete fragment groups not updated within this duration are discarded
    pub fragment_timeout: Duration,
    /// Minimum time before an unacknowledged packet is sent again
    pub resend_interval: Duration,
    /// Time a reliable in order channel waits for a missing packet before skipping it.
    ///
    /// Defaults to 5 seconds, the same window incomplete fragment groups get: with the
    /// default resend interval the sender has had about ten attempts to fill the gap.
    /// A skipped packet that arrives later is still delivered, out of order.
    pub reorder_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 1024,
            fragment_timeout: Duration::from_secs(5),
            resend_interval: Duration::from_millis(500),
            reorder_timeout: Duration::from_secs(5),
        }
    }
}

impl ChannelConfig {
    /// Largest payload sent in a single packet, with room left for the fragment header.
    ///
    /// # Panics
    ///
    /// Panics if `max_buffer_size` cannot hold the headers plus one byte of payload.
    pub fn max_payload(&self) -> usize {
        let overhead = PACKET_HEADER_SIZE + FRAGMENT_HEADER_SIZE;
        assert!(
            self.max_buffer_size > overhead,
            "max_buffer_size must be greater than {}, got {}",
            overhead,
            self.max_buffer_size
        );

        self.max_buffer_size - overhead
    }
}

/// A unidirectional pair of packet queues with a delivery guarantee.
///
/// The owner pushes outgoing packets with `queue_outgoing` and hands the frames
/// returned by `get_pending_outgoing` to the socket. Packets read from the socket
/// go through `queue_incoming` and come out of `get_pending_incoming` once the
/// channel guarantee allows it.
pub trait Channel<E>: fmt::Debug {
    fn kind(&self) -> ChannelKind;

    /// Advances the channel clock, used for resends and the expiry of buffered state.
    fn update(&mut self, duration: Duration);

    /// Enqueues a packet to be sent, split into fragments when it does not fit
    /// in one datagram. Returns the last packet enqueued.
    fn queue_outgoing(&mut self, endpoint: E, packet: Packet) -> Result<PendingPacket<E>, RudpError>;

    /// Processes a received packet. Returns the delivered packet when this call
    /// made it available on the incoming queue.
    fn queue_incoming(&mut self, endpoint: E, packet: Packet) -> Option<PendingPacket<E>>;

    fn try_get_next_outgoing(&mut self) -> Option<PendingPacket<E>>;

    fn try_get_next_incoming(&mut self) -> Option<PendingPacket<E>>;

    /// Drains the packets ready to be sent.
    fn get_pending_outgoing(&mut self) -> PendingPackets<'_, E>;

    /// Drains the packets ready to be delivered.
    fn get_pending_incoming(&mut self) -> PendingPackets<'_, E>;

    /// Handle to the queue of delivered packets, usable from another thread.
    fn incoming_queue(&self) -> PacketQueue<E>;

    /// Handle to the queue of packets to be sent, usable from another thread.
    /// Resends of reliable channels are only produced by
    /// `try_get_next_outgoing` and `get_pending_outgoing`.
    fn outgoing_queue(&self) -> PacketQueue<E>;
}

/// Creates the channel implementing the guarantee of `kind`.
pub fn new_channel<E>(kind: ChannelKind, config: ChannelConfig) -> Box<dyn Channel<E> + Send>
where
    E: Clone + fmt::Debug + Send + 'static,
{
    match kind {
        ChannelKind::Unreliable => Box::new(UnreliableChannel::new(config)),
        ChannelKind::InOrder => Box::new(InOrderChannel::new(config)),
        ChannelKind::Reliable => Box::new(ReliableChannel::new(config)),
        ChannelKind::ReliableInOrder => Box::new(ReliableInOrderChannel::new(config)),
    }
}

/// One-shot drain of a channel queue, resends first.
pub struct PendingPackets<'a, E> {
    resends: vec_deque::IntoIter<PendingPacket<E>>,
    queued: TryIter<'a, PendingPacket<E>>,
}

impl<'a, E> PendingPackets<'a, E> {
    pub(crate) fn new(resends: VecDeque<PendingPacket<E>>, queued: TryIter<'a, PendingPacket<E>>) -> Self {
        Self {
            resends: resends.into_iter(),
            queued,
        }
    }

    pub(crate) fn queued(queued: TryIter<'a, PendingPacket<E>>) -> Self {
        Self::new(VecDeque::new(), queued)
    }
}

impl<'a, E> Iterator for PendingPackets<'a, E> {
    type Item = PendingPacket<E>;

    fn next(&mut self) -> Option<Self::Item> {
        self.resends.next().or_else(|| self.queued.next())
    }
}

impl<'a, E> fmt::Debug for PendingPackets<'a, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingPackets")
            .field("resends", &self.resends.len())
            .finish_non_exhaustive()
    }
}

/// Queues, fragmentation and reassembly, the part every channel kind shares.
#[derive(Debug)]
pub(crate) struct ChannelCore<E> {
    config: ChannelConfig,
    current_time: Duration,
    outgoing: PacketQueue<E>,
    incoming: PacketQueue<E>,
    assembler: FragmentAssembler,
    next_fragment_id: u16,
}

impl<E> ChannelCore<E> {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            current_time: Duration::ZERO,
            outgoing: PacketQueue::new(),
            incoming: PacketQueue::new(),
            assembler: FragmentAssembler::new(),
            next_fragment_id: 0,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn current_time(&self) -> Duration {
        self.current_time
    }

    pub fn advance_time(&mut self, duration: Duration) {
        self.current_time += duration;
    }

    pub fn outgoing(&self) -> &PacketQueue<E> {
        &self.outgoing
    }

    pub fn incoming(&self) -> &PacketQueue<E> {
        &self.incoming
    }

    /// Feeds a received packet to the assembler. Unfragmented packets are
    /// returned as is, fragments only once their message is complete.
    pub fn reassemble(&mut self, packet: Packet) -> Option<Packet> {
        if !packet.is_fragmented() {
            return Some(packet);
        }

        self.assembler.expire_stale(self.current_time, self.config.fragment_timeout);
        if let Err(e) = self.assembler.add_fragment(&packet, self.current_time) {
            warn!("Dropped invalid fragment: {}", e);
            return None;
        }

        self.assembler.try_take_complete().map(ReassembledMessage::into_packet)
    }

    pub fn expire_fragments(&mut self) {
        self.assembler.expire_stale(self.current_time, self.config.fragment_timeout);
    }

    pub fn pending_incoming(&mut self) -> PendingPackets<'_, E> {
        self.expire_fragments();
        PendingPackets::queued(self.incoming.drain())
    }

    pub fn next_incoming(&mut self) -> Option<PendingPacket<E>> {
        self.expire_fragments();
        self.incoming.pop()
    }
}

impl<E: Clone> ChannelCore<E> {
    /// Enqueues the packet, or its fragments when the payload is larger than
    /// the maximum payload. Returns every frame enqueued, in order.
    pub fn enqueue_outgoing(&mut self, endpoint: E, packet: Packet) -> Result<Vec<PendingPacket<E>>, RudpError> {
        let max_payload = self.config.max_payload();
        let packets = if packet.payload().len() > max_payload && !packet.is_fragmented() {
            let fragment_id = self.next_fragment_id;
            let fragments = build_fragments(&packet, fragment_id, max_payload)?;
            self.next_fragment_id = fragment_id.wrapping_add(1);
            trace!(
                "Split packet {} into {} fragments with id {}",
                packet.sequence(),
                fragments.len(),
                fragment_id
            );
            fragments
        } else {
            vec![packet]
        };

        let frames: Vec<PendingPacket<E>> = packets
            .into_iter()
            .map(|packet| PendingPacket::outgoing(endpoint.clone(), packet))
            .collect();

        for frame in frames.iter() {
            self.outgoing.push(frame.clone());
        }

        Ok(frames)
    }

    /// Makes the packet available on the incoming queue.
    pub fn deliver(&self, endpoint: E, packet: Packet) -> PendingPacket<E> {
        let pending = PendingPacket::incoming(endpoint, packet);
        self.incoming.push(pending.clone());
        pending
    }

    /// Enqueues an Ack for a received packet. Acks skip sequencing and tracking.
    pub fn send_ack(&self, endpoint: E, received: &Packet) {
        trace!("Sending ack for packet {}", received.sequence());
        let ack = Packet::new(PacketType::Ack, received.channel_kind(), received.sequence(), Bytes::new());
        self.outgoing.push(PendingPacket::outgoing(endpoint, ack));
    }
}

/// Last frame of a message returned by `ChannelCore::enqueue_outgoing`.
pub(crate) fn last_frame<E: Clone>(frames: &[PendingPacket<E>]) -> PendingPacket<E> {
    frames.last().cloned().expect("a message always has at least one frame")
}
