use crate::fragment::FragmentError;
use crate::packet::SerializationError;

use std::fmt;

#[derive(Debug)]
pub enum RudpError {
    /// Raw bytes could not be decoded into a packet
    Serialization(SerializationError),
    /// The payload needs more fragments than the wire format can express
    PayloadTooLarge {
        payload_len: usize,
        fragments_needed: usize,
        max_fragments: usize,
    },
    /// An invalid fragment was given to the fragment assembler
    Fragment(FragmentError),
}

impl std::error::Error for RudpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RudpError::Serialization(err) => Some(err),
            RudpError::Fragment(err) => Some(err),
            RudpError::PayloadTooLarge { .. } => None,
        }
    }
}

impl fmt::Display for RudpError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use RudpError::*;

        match *self {
            Serialization(ref err) => write!(fmt, "failed to decode packet: {}", err),
            PayloadTooLarge {
                payload_len,
                fragments_needed,
                max_fragments,
            } => write!(
                fmt,
                "payload too large: {} bytes would require {} fragments (max {})",
                payload_len, fragments_needed, max_fragments
            ),
            Fragment(ref err) => write!(fmt, "{}", err),
        }
    }
}

impl From<SerializationError> for RudpError {
    fn from(inner: SerializationError) -> Self {
        RudpError::Serialization(inner)
    }
}

impl From<FragmentError> for RudpError {
    fn from(inner: FragmentError) -> Self {
        RudpError::Fragment(inner)
    }
}
