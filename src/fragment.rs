use crate::error::RudpError;
use crate::packet::{ChannelKind, FragmentInfo, Packet, PacketType, MAX_FRAGMENTS};

use bytes::{Bytes, BytesMut};
use log::{debug, error, trace};

use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentError {
    NotFragmented,
    InvalidTotalFragments { fragment_id: u16, expected: u8, got: u8 },
    InvalidFragmentIndex { fragment_id: u16, index: u8, total: u8 },
}

impl fmt::Display for FragmentError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use FragmentError::*;

        match *self {
            NotFragmented => write!(fmt, "packet is not fragmented"),
            InvalidTotalFragments { fragment_id, expected, got } => {
                write!(
                    fmt,
                    "fragment with id {} has invalid number of fragments, expected {}, got {}",
                    fragment_id, expected, got
                )
            }
            InvalidFragmentIndex { fragment_id, index, total } => {
                write!(fmt, "fragment with id {} has invalid index {}, expected < {}", fragment_id, index, total)
            }
        }
    }
}

impl Error for FragmentError {}

/// A message rebuilt from all the fragments of one fragment group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledMessage {
    pub payload: Bytes,
    pub packet_type: PacketType,
    pub channel_kind: ChannelKind,
    pub sequence: u16,
}

impl ReassembledMessage {
    pub fn into_packet(self) -> Packet {
        Packet::new(self.packet_type, self.channel_kind, self.sequence, self.payload)
    }
}

#[derive(Debug)]
struct FragmentCollection {
    fragments: Vec<Option<Bytes>>,
    num_fragments_received: usize,
    last_update: Duration,
    packet_type: PacketType,
    channel_kind: ChannelKind,
    sequence: u16,
}

impl FragmentCollection {
    fn new(packet: &Packet, current_time: Duration) -> Self {
        Self {
            fragments: vec![None; packet.fragment_info().total_fragments as usize],
            num_fragments_received: 0,
            last_update: current_time,
            packet_type: packet.packet_type(),
            channel_kind: packet.channel_kind(),
            sequence: packet.sequence(),
        }
    }

    fn is_complete(&self) -> bool {
        self.num_fragments_received == self.fragments.len()
    }

    fn reassemble(self) -> ReassembledMessage {
        let len = self.fragments.iter().flatten().map(|f| f.len()).sum();
        let mut payload = BytesMut::with_capacity(len);
        for fragment in self.fragments.iter().flatten() {
            payload.extend_from_slice(fragment);
        }

        ReassembledMessage {
            payload: payload.freeze(),
            packet_type: self.packet_type,
            channel_kind: self.channel_kind,
            sequence: self.sequence,
        }
    }
}

/// Buffers fragments by fragment id until every fragment of a group arrived.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    collections: HashMap<u16, FragmentCollection>,
    completed: VecDeque<u16>,
}

impl FragmentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fragment groups still being assembled.
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Stores the fragment payload in the collection for its fragment id.
    /// A fragment index that was already received is ignored.
    pub fn add_fragment(&mut self, packet: &Packet, current_time: Duration) -> Result<(), FragmentError> {
        if !packet.is_fragmented() {
            return Err(FragmentError::NotFragmented);
        }

        let FragmentInfo {
            fragment_id,
            fragment_index,
            total_fragments,
        } = packet.fragment_info();

        if fragment_index >= total_fragments {
            return Err(FragmentError::InvalidFragmentIndex {
                fragment_id,
                index: fragment_index,
                total: total_fragments,
            });
        }

        let collection = self
            .collections
            .entry(fragment_id)
            .or_insert_with(|| FragmentCollection::new(packet, current_time));

        if collection.fragments.len() != total_fragments as usize {
            return Err(FragmentError::InvalidTotalFragments {
                fragment_id,
                expected: collection.fragments.len() as u8,
                got: total_fragments,
            });
        }

        let slot = &mut collection.fragments[fragment_index as usize];
        if slot.is_some() {
            return Ok(());
        }

        *slot = Some(packet.payload().clone());
        collection.num_fragments_received += 1;
        collection.last_update = current_time;

        trace!(
            "Received fragment {} of group {} ({}/{})",
            fragment_index,
            fragment_id,
            collection.num_fragments_received,
            total_fragments
        );

        if collection.is_complete() {
            self.completed.push_back(fragment_id);
        }

        Ok(())
    }

    /// Takes at most one fully received message, in completion order.
    pub fn try_take_complete(&mut self) -> Option<ReassembledMessage> {
        while let Some(fragment_id) = self.completed.pop_front() {
            let complete = self.collections.get(&fragment_id).is_some_and(|c| c.is_complete());
            if !complete {
                continue;
            }

            if let Some(collection) = self.collections.remove(&fragment_id) {
                let message = collection.reassemble();
                trace!(
                    "Completed the reassembly of group {} ({} bytes)",
                    fragment_id,
                    message.payload.len()
                );
                return Some(message);
            }
        }

        None
    }

    /// Discards fragment groups that were not updated within `timeout`.
    pub fn expire_stale(&mut self, current_time: Duration, timeout: Duration) {
        self.collections.retain(|fragment_id, collection| {
            let stale = current_time.saturating_sub(collection.last_update) > timeout;
            if stale {
                debug!(
                    "Discarding fragment group {}, received {} of {} fragments",
                    fragment_id,
                    collection.num_fragments_received,
                    collection.fragments.len()
                );
            }
            !stale
        });
    }
}

/// Splits the packet payload into fragments of at most `max_payload` bytes that share `fragment_id`.
pub fn build_fragments(packet: &Packet, fragment_id: u16, max_payload: usize) -> Result<Vec<Packet>, RudpError> {
    let payload = packet.payload();
    let num_fragments = payload.len().div_ceil(max_payload);

    if num_fragments > MAX_FRAGMENTS {
        error!(
            "Fragmentation exceeded maximum number of fragments, got {}, maximum is {}.",
            num_fragments, MAX_FRAGMENTS
        );
        return Err(RudpError::PayloadTooLarge {
            payload_len: payload.len(),
            fragments_needed: num_fragments,
            max_fragments: MAX_FRAGMENTS,
        });
    }

    let fragments = (0..num_fragments)
        .map(|index| {
            let start = index * max_payload;
            let end = payload.len().min(start + max_payload);
            let fragment = FragmentInfo {
                fragment_id,
                fragment_index: index as u8,
                total_fragments: num_fragments as u8,
            };
            Packet::new_fragment(
                packet.packet_type(),
                packet.channel_kind(),
                packet.sequence(),
                payload.slice(start..end),
                fragment,
            )
        })
        .collect();

    Ok(fragments)
}
