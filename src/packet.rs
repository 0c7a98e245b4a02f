use byteorder::{ByteOrder, ReadBytesExt};
use bytes::Bytes;

use std::fmt;
use std::io::{self, Cursor, Read};

#[cfg(not(feature = "big_endian"))]
pub(crate) type WireOrder = byteorder::LittleEndian;
#[cfg(feature = "big_endian")]
pub(crate) type WireOrder = byteorder::BigEndian;

/// Header byte plus the u16 sequence.
pub const PACKET_HEADER_SIZE: usize = 3;
/// Fragment id (u16), fragment index (u8) and total fragments (u8).
pub const FRAGMENT_HEADER_SIZE: usize = 4;
/// Maximum number of fragments a message can be split into.
pub const MAX_FRAGMENTS: usize = u8::MAX as usize;

const FRAGMENTED_BIT: u8 = 0x80;
const CHANNEL_MASK: u8 = 0x60;
const CHANNEL_SHIFT: u8 = 5;
const TYPE_MASK: u8 = 0x1F;

/// Kind of packet, encoded in the 5 low bits of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PacketType {
    UnconnectedMessage = 0,
    Connect = 1,
    Disconnect = 2,
    Data = 3,
    Ack = 4,
    Ping = 5,
    Pong = 6,
}

/// Delivery guarantee of the channel that produced a packet, encoded in 2 bits of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ChannelKind {
    Unreliable = 0,
    Reliable = 1,
    InOrder = 2,
    ReliableInOrder = 3,
}

/// Fragment metadata, only meaningful for fragmented packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentInfo {
    pub fragment_id: u16,
    pub fragment_index: u8,
    pub total_fragments: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    packet_type: PacketType,
    channel_kind: ChannelKind,
    sequence: u16,
    fragmented: bool,
    fragment: FragmentInfo,
    payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationError {
    BufferTooShort,
    InvalidPacketType(u8),
    InvalidTotalFragments,
    InvalidFragmentIndex { index: u8, total: u8 },
}

impl std::error::Error for SerializationError {}

impl fmt::Display for SerializationError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use SerializationError::*;

        match *self {
            BufferTooShort => write!(fmt, "buffer too short"),
            InvalidPacketType(value) => write!(fmt, "invalid packet type {}", value),
            InvalidTotalFragments => write!(fmt, "invalid total fragments, must be at least 1"),
            InvalidFragmentIndex { index, total } => {
                write!(fmt, "invalid fragment index {}, expected < {}", index, total)
            }
        }
    }
}

impl From<io::Error> for SerializationError {
    fn from(_: io::Error) -> Self {
        SerializationError::BufferTooShort
    }
}

impl TryFrom<u8> for PacketType {
    type Error = SerializationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use PacketType::*;

        match value {
            0 => Ok(UnconnectedMessage),
            1 => Ok(Connect),
            2 => Ok(Disconnect),
            3 => Ok(Data),
            4 => Ok(Ack),
            5 => Ok(Ping),
            6 => Ok(Pong),
            _ => Err(SerializationError::InvalidPacketType(value)),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        packet_type as u8
    }
}

impl ChannelKind {
    /// Decodes the 2 channel bits, higher bits are ignored.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => ChannelKind::Unreliable,
            1 => ChannelKind::Reliable,
            2 => ChannelKind::InOrder,
            _ => ChannelKind::ReliableInOrder,
        }
    }

    pub fn is_reliable(&self) -> bool {
        matches!(self, ChannelKind::Reliable | ChannelKind::ReliableInOrder)
    }
}

impl From<ChannelKind> for u8 {
    fn from(kind: ChannelKind) -> Self {
        kind as u8
    }
}

impl Default for FragmentInfo {
    fn default() -> Self {
        Self {
            fragment_id: 0,
            fragment_index: 0,
            total_fragments: 1,
        }
    }
}

impl Packet {
    pub fn new(packet_type: PacketType, channel_kind: ChannelKind, sequence: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            channel_kind,
            sequence,
            fragmented: false,
            fragment: FragmentInfo::default(),
            payload: payload.into(),
        }
    }

    /// Creates a packet with the fragmented bit set and default fragment metadata,
    /// the metadata must be filled with [`Packet::set_fragment_info`].
    pub fn new_fragmented(packet_type: PacketType, channel_kind: ChannelKind, sequence: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            fragmented: true,
            ..Self::new(packet_type, channel_kind, sequence, payload)
        }
    }

    pub fn new_fragment(
        packet_type: PacketType,
        channel_kind: ChannelKind,
        sequence: u16,
        payload: impl Into<Bytes>,
        fragment: FragmentInfo,
    ) -> Self {
        let mut packet = Self::new_fragmented(packet_type, channel_kind, sequence, payload);
        packet.set_fragment_info(fragment);
        packet
    }

    /// # Panics
    ///
    /// Panics if the packet is not fragmented or if `total_fragments` is 0.
    pub fn set_fragment_info(&mut self, fragment: FragmentInfo) {
        assert!(self.fragmented, "cannot set fragment info on a non-fragmented packet");
        assert!(fragment.total_fragments > 0, "total fragments must be at least 1");
        self.fragment = fragment;
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn channel_kind(&self) -> ChannelKind {
        self.channel_kind
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn is_fragmented(&self) -> bool {
        self.fragmented
    }

    pub fn fragment_info(&self) -> FragmentInfo {
        self.fragment
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub(crate) fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    /// Header byte, layout `F CC TTTTT`.
    pub fn header(&self) -> u8 {
        let fragmented = if self.fragmented { FRAGMENTED_BIT } else { 0 };
        let channel = (u8::from(self.channel_kind) << CHANNEL_SHIFT) & CHANNEL_MASK;
        fragmented | channel | (u8::from(self.packet_type) & TYPE_MASK)
    }

    pub fn serialized_size(&self) -> usize {
        let header_size = if self.fragmented {
            PACKET_HEADER_SIZE + FRAGMENT_HEADER_SIZE
        } else {
            PACKET_HEADER_SIZE
        };
        header_size + self.payload.len()
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = vec![0u8; self.serialized_size()];
        self.encode(&mut buffer);
        buffer.into()
    }

    /// Writes the packet to the start of `buffer`, returning the number of bytes written.
    pub fn write_to(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        let size = self.serialized_size();
        if buffer.len() < size {
            return Err(SerializationError::BufferTooShort);
        }
        self.encode(&mut buffer[..size]);
        Ok(size)
    }

    // Buffer must have exactly `serialized_size` bytes.
    fn encode(&self, buffer: &mut [u8]) {
        buffer[0] = self.header();
        WireOrder::write_u16(&mut buffer[1..PACKET_HEADER_SIZE], self.sequence);

        let mut offset = PACKET_HEADER_SIZE;
        if self.fragmented {
            WireOrder::write_u16(&mut buffer[offset..offset + 2], self.fragment.fragment_id);
            buffer[offset + 2] = self.fragment.fragment_index;
            buffer[offset + 3] = self.fragment.total_fragments;
            offset += FRAGMENT_HEADER_SIZE;
        }

        buffer[offset..].copy_from_slice(&self.payload);
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Packet, SerializationError> {
        let mut cursor = Cursor::new(bytes);

        let header = cursor.read_u8()?;
        let packet_type = PacketType::try_from(header & TYPE_MASK)?;
        let channel_kind = ChannelKind::from_bits((header & CHANNEL_MASK) >> CHANNEL_SHIFT);
        let fragmented = header & FRAGMENTED_BIT != 0;
        let sequence = cursor.read_u16::<WireOrder>()?;

        let fragment = if fragmented {
            let fragment_id = cursor.read_u16::<WireOrder>()?;
            let fragment_index = cursor.read_u8()?;
            let total_fragments = cursor.read_u8()?;
            if total_fragments == 0 {
                return Err(SerializationError::InvalidTotalFragments);
            }
            if fragment_index >= total_fragments {
                return Err(SerializationError::InvalidFragmentIndex {
                    index: fragment_index,
                    total: total_fragments,
                });
            }
            FragmentInfo {
                fragment_id,
                fragment_index,
                total_fragments,
            }
        } else {
            FragmentInfo::default()
        };

        let mut payload = Vec::with_capacity(bytes.len() - cursor.position() as usize);
        cursor.read_to_end(&mut payload)?;

        Ok(Packet {
            packet_type,
            channel_kind,
            sequence,
            fragmented,
            fragment,
            payload: payload.into(),
        })
    }
}

impl TryFrom<&[u8]> for Packet {
    type Error = SerializationError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Packet::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let packet = Packet::new(PacketType::Ack, ChannelKind::ReliableInOrder, 0, Bytes::new());
        assert_eq!(packet.header(), 0b0110_0100);

        let packet = Packet::new_fragment(
            PacketType::Data,
            ChannelKind::Reliable,
            0,
            Bytes::new(),
            FragmentInfo {
                fragment_id: 0,
                fragment_index: 0,
                total_fragments: 1,
            },
        );
        assert_eq!(packet.header(), 0b1010_0011);
    }

    #[cfg(not(feature = "big_endian"))]
    #[test]
    fn little_endian_wire_format() {
        let packet = Packet::new_fragment(
            PacketType::Data,
            ChannelKind::Unreliable,
            0x0102,
            vec![9u8, 8],
            FragmentInfo {
                fragment_id: 0x0304,
                fragment_index: 1,
                total_fragments: 2,
            },
        );
        assert_eq!(&packet.to_bytes()[..], &[0x83, 0x02, 0x01, 0x04, 0x03, 1, 2, 9, 8]);

        let packet = Packet::new(PacketType::Connect, ChannelKind::Reliable, 0xABCD, vec![7u8]);
        assert_eq!(&packet.to_bytes()[..], &[0x21, 0xCD, 0xAB, 7]);
    }

    #[cfg(feature = "big_endian")]
    #[test]
    fn big_endian_wire_format() {
        let packet = Packet::new(PacketType::Connect, ChannelKind::Reliable, 0xABCD, vec![7u8]);
        assert_eq!(&packet.to_bytes()[..], &[0x21, 0xAB, 0xCD, 7]);
    }

    #[test]
    fn serialize_packet() {
        let packet = Packet::new(PacketType::Data, ChannelKind::InOrder, 65535, vec![1u8, 2, 3, 4, 5]);
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), PACKET_HEADER_SIZE + 5);

        let recv_packet = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(packet, recv_packet);
        assert_eq!(recv_packet.to_bytes(), bytes);
    }

    #[test]
    fn serialize_fragment_packet() {
        let fragment = FragmentInfo {
            fragment_id: 513,
            fragment_index: 254,
            total_fragments: 255,
        };
        let packet = Packet::new_fragment(PacketType::Connect, ChannelKind::Reliable, 42, vec![5u8; 100], fragment);
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), PACKET_HEADER_SIZE + FRAGMENT_HEADER_SIZE + 100);

        let recv_packet = Packet::from_bytes(&bytes).unwrap();
        assert!(recv_packet.is_fragmented());
        assert_eq!(recv_packet.fragment_info(), fragment);
        assert_eq!(packet, recv_packet);
    }

    #[test]
    fn empty_payload() {
        let packet = Packet::new(PacketType::Ack, ChannelKind::Reliable, 7, Bytes::new());
        let recv_packet = Packet::from_bytes(&packet.to_bytes()).unwrap();
        assert!(recv_packet.payload().is_empty());
        assert_eq!(recv_packet.sequence(), 7);
    }

    #[test]
    fn write_to_buffer() {
        let packet = Packet::new(PacketType::Data, ChannelKind::Unreliable, 1, vec![1u8, 2, 3]);
        let mut buffer = [0u8; 16];
        let len = packet.write_to(&mut buffer).unwrap();
        assert_eq!(&buffer[..len], &packet.to_bytes()[..]);

        let mut small = [0u8; 4];
        assert_eq!(packet.write_to(&mut small), Err(SerializationError::BufferTooShort));
    }

    #[test]
    fn truncated_buffers() {
        assert_eq!(Packet::from_bytes(&[]), Err(SerializationError::BufferTooShort));
        assert_eq!(Packet::from_bytes(&[0x03, 0x01]), Err(SerializationError::BufferTooShort));
        // Fragmented bit set but only 3 of the 4 metadata bytes present
        assert_eq!(Packet::from_bytes(&[0x83, 0, 0, 1, 0, 0]), Err(SerializationError::BufferTooShort));
    }

    #[test]
    fn invalid_fragment_metadata() {
        assert_eq!(
            Packet::from_bytes(&[0x83, 0, 0, 0, 0, 0, 0]),
            Err(SerializationError::InvalidTotalFragments)
        );
        assert_eq!(
            Packet::from_bytes(&[0x83, 0, 0, 0, 0, 3, 3]),
            Err(SerializationError::InvalidFragmentIndex { index: 3, total: 3 })
        );
    }

    #[test]
    fn invalid_packet_type() {
        assert_eq!(Packet::from_bytes(&[0x1F, 0, 0]), Err(SerializationError::InvalidPacketType(31)));
    }

    #[test]
    #[should_panic]
    fn fragment_info_on_non_fragmented_packet() {
        let mut packet = Packet::new(PacketType::Data, ChannelKind::Unreliable, 0, Bytes::new());
        packet.set_fragment_info(FragmentInfo::default());
    }

    #[test]
    #[should_panic]
    fn zero_total_fragments() {
        let mut packet = Packet::new_fragmented(PacketType::Data, ChannelKind::Unreliable, 0, Bytes::new());
        packet.set_fragment_info(FragmentInfo {
            fragment_id: 0,
            fragment_index: 0,
            total_fragments: 0,
        });
    }
}
