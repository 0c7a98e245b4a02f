pub mod acknowledgement;
pub mod channel;
pub mod error;
pub mod fragment;
pub mod packet;
mod pending;
mod reorder;
mod sequence;

pub use bytes::Bytes;

pub use acknowledgement::PacketAcknowledgement;
pub use channel::{
    new_channel, Channel, ChannelConfig, InOrderChannel, PendingPackets, ReliableChannel, ReliableInOrderChannel, UnreliableChannel,
};
pub use error::RudpError;
pub use fragment::{build_fragments, FragmentAssembler, FragmentError, ReassembledMessage};
pub use packet::{ChannelKind, FragmentInfo, Packet, PacketType, SerializationError};
pub use pending::{Direction, PacketQueue, PendingPacket};
pub use reorder::ReorderBuffer;
pub use sequence::{is_newer, is_older};
