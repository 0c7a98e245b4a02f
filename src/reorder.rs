use crate::pending::PendingPacket;
use crate::sequence::is_newer;

use log::{debug, trace};

use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug)]
struct HeldPacket<E> {
    packet: PendingPacket<E>,
    received_at: Duration,
}

/// Holds accepted packets that arrived ahead of the next expected sequence
/// and releases them as soon as the stream is contiguous again.
///
/// Sequences passed over when a gap expires are remembered, and a skipped
/// packet that still arrives is released late instead of being dropped.
#[derive(Debug)]
pub struct ReorderBuffer<E> {
    next_expected: u16,
    held: HashMap<u16, HeldPacket<E>>,
    skipped: HashSet<u16>,
}

impl<E> Default for ReorderBuffer<E> {
    fn default() -> Self {
        Self::with_next_expected(0)
    }
}

impl<E> ReorderBuffer<E> {
    /// Buffer for a stream starting at sequence 0, the first sequence a channel sends.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_next_expected(next_expected: u16) -> Self {
        Self {
            next_expected,
            held: HashMap::new(),
            skipped: HashSet::new(),
        }
    }

    /// Sequence that must arrive before anything held is released.
    pub fn next_expected(&self) -> u16 {
        self.next_expected
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn is_held(&self, sequence: u16) -> bool {
        self.held.contains_key(&sequence)
    }

    /// Whether the sequence was passed over by an expired gap and was not received yet.
    pub fn is_skipped(&self, sequence: u16) -> bool {
        self.skipped.contains(&sequence)
    }

    /// Offers a packet to the buffer and returns the packets that can be delivered, in order.
    ///
    /// Packets older than the next expected sequence were already delivered and
    /// are dropped, unless their sequence was skipped by `expire`.
    pub fn insert(&mut self, packet: PendingPacket<E>, current_time: Duration) -> Vec<PendingPacket<E>> {
        let sequence = packet.sequence();
        let mut released = vec![];

        if sequence == self.next_expected {
            released.push(packet);
            self.next_expected = sequence.wrapping_add(1);
            self.release_contiguous(&mut released);
        } else if is_newer(sequence, self.next_expected) {
            trace!("Holding packet {}, waiting for {}", sequence, self.next_expected);
            self.held.entry(sequence).or_insert(HeldPacket {
                packet,
                received_at: current_time,
            });
        } else if self.skipped.remove(&sequence) {
            trace!("Releasing skipped packet {} out of order", sequence);
            released.push(packet);
        } else {
            trace!("Dropping packet {}, already delivered", sequence);
        }

        released
    }

    /// Skips the gap in front of any packet held for `timeout` or longer.
    ///
    /// Every held packet up to the newest expired one is released in sequence
    /// order, followed by the packets contiguous to it.
    pub fn expire(&mut self, current_time: Duration, timeout: Duration) -> Vec<PendingPacket<E>> {
        let mut released = vec![];
        let next = self.next_expected;

        let skip_distance = self
            .held
            .iter()
            .filter(|(_, held)| current_time.saturating_sub(held.received_at) >= timeout)
            .map(|(&sequence, _)| sequence.wrapping_sub(next))
            .max();

        let Some(skip_distance) = skip_distance else {
            return released;
        };

        let last = next.wrapping_add(skip_distance);
        debug!("Reorder gap expired, skipping from {} to {}", next, last);

        for distance in 0..=skip_distance {
            let sequence = next.wrapping_add(distance);
            match self.held.remove(&sequence) {
                Some(held) => released.push(held.packet),
                None => {
                    self.skipped.insert(sequence);
                }
            }
        }
        self.next_expected = last.wrapping_add(1);
        self.release_contiguous(&mut released);

        // Sequences half the sequence space behind can no longer be told apart from new ones.
        let next = self.next_expected;
        self.skipped.retain(|&sequence| next.wrapping_sub(sequence) <= i16::MAX as u16);

        released
    }

    fn release_contiguous(&mut self, released: &mut Vec<PendingPacket<E>>) {
        while let Some(held) = self.held.remove(&self.next_expected) {
            trace!("Releasing held packet {}", self.next_expected);
            released.push(held.packet);
            self.next_expected = self.next_expected.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ChannelKind, Packet, PacketType};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn pending(sequence: u16) -> PendingPacket<()> {
        PendingPacket::incoming((), Packet::new(PacketType::Data, ChannelKind::ReliableInOrder, sequence, vec![1u8]))
    }

    fn insert(buffer: &mut ReorderBuffer<()>, sequence: u16, current_time: Duration) -> Vec<u16> {
        buffer.insert(pending(sequence), current_time).iter().map(|p| p.sequence()).collect()
    }

    fn expire(buffer: &mut ReorderBuffer<()>, current_time: Duration) -> Vec<u16> {
        buffer.expire(current_time, TIMEOUT).iter().map(|p| p.sequence()).collect()
    }

    #[test]
    fn stream_starts_at_zero() {
        let mut buffer = ReorderBuffer::new();
        assert_eq!(buffer.next_expected(), 0);
        assert!(insert(&mut buffer, 1, Duration::ZERO).is_empty());
        assert!(buffer.is_held(1));
        assert_eq!(insert(&mut buffer, 0, Duration::ZERO), vec![0, 1]);
        assert_eq!(buffer.next_expected(), 2);
    }

    #[test]
    fn release_in_order() {
        let mut buffer = ReorderBuffer::with_next_expected(1);
        assert_eq!(insert(&mut buffer, 1, Duration::ZERO), vec![1]);
        assert!(insert(&mut buffer, 3, Duration::ZERO).is_empty());
        assert!(insert(&mut buffer, 4, Duration::ZERO).is_empty());
        assert_eq!(insert(&mut buffer, 2, Duration::ZERO), vec![2, 3, 4]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.next_expected(), 5);
    }

    #[test]
    fn drop_old_and_duplicates() {
        let mut buffer = ReorderBuffer::with_next_expected(5);
        insert(&mut buffer, 5, Duration::ZERO);
        assert!(insert(&mut buffer, 5, Duration::ZERO).is_empty());
        assert!(insert(&mut buffer, 4, Duration::ZERO).is_empty());
        assert!(insert(&mut buffer, 7, Duration::ZERO).is_empty());
        assert!(insert(&mut buffer, 7, Duration::ZERO).is_empty());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn release_across_wrap() {
        let mut buffer = ReorderBuffer::with_next_expected(65534);
        assert_eq!(insert(&mut buffer, 65534, Duration::ZERO), vec![65534]);
        assert!(insert(&mut buffer, 0, Duration::ZERO).is_empty());
        assert_eq!(insert(&mut buffer, 65535, Duration::ZERO), vec![65535, 0]);
        assert_eq!(buffer.next_expected(), 1);
    }

    #[test]
    fn expire_skips_gap() {
        let mut buffer = ReorderBuffer::with_next_expected(1);
        insert(&mut buffer, 1, Duration::ZERO);
        insert(&mut buffer, 4, Duration::from_millis(100));
        insert(&mut buffer, 3, Duration::from_millis(600));
        insert(&mut buffer, 6, Duration::from_millis(700));

        assert!(expire(&mut buffer, Duration::from_millis(1000)).is_empty());

        // 4 expired, 3 is released with it even though it is younger
        assert_eq!(expire(&mut buffer, Duration::from_millis(1100)), vec![3, 4]);
        assert_eq!(buffer.next_expected(), 5);
        assert!(buffer.is_held(6));
        assert!(buffer.is_skipped(2));

        assert_eq!(insert(&mut buffer, 5, Duration::from_millis(1200)), vec![5, 6]);
    }

    #[test]
    fn skipped_packet_delivered_late() {
        let mut buffer = ReorderBuffer::with_next_expected(10);
        insert(&mut buffer, 12, Duration::ZERO);
        assert_eq!(expire(&mut buffer, TIMEOUT), vec![12]);
        assert!(buffer.is_skipped(10));
        assert!(buffer.is_skipped(11));

        assert_eq!(insert(&mut buffer, 11, TIMEOUT), vec![11]);
        assert_eq!(insert(&mut buffer, 10, TIMEOUT), vec![10]);

        // Only once
        assert!(insert(&mut buffer, 10, TIMEOUT).is_empty());
        assert!(!buffer.is_skipped(10));
    }

    #[test]
    fn expire_releases_following_contiguous() {
        let mut buffer = ReorderBuffer::new();
        insert(&mut buffer, 0, Duration::ZERO);
        insert(&mut buffer, 2, Duration::ZERO);
        insert(&mut buffer, 3, Duration::from_millis(900));

        assert_eq!(expire(&mut buffer, TIMEOUT), vec![2, 3]);
        assert_eq!(buffer.next_expected(), 4);
    }

    #[test]
    fn forget_skipped_half_range_behind() {
        let mut buffer = ReorderBuffer::new();
        insert(&mut buffer, 1, Duration::ZERO);
        expire(&mut buffer, TIMEOUT);
        assert!(buffer.is_skipped(0));

        // Move the stream forward by more than half the sequence space
        let mut time = TIMEOUT;
        for sequence in [20000u16, 40000] {
            insert(&mut buffer, sequence, time);
            time += TIMEOUT;
            expire(&mut buffer, time);
        }
        assert!(!buffer.is_skipped(0));
    }
}
