/// Returns whether `s1` is newer than `s2`, taking the u16 wraparound into account.
///
/// The difference is read as a signed 16 bit quantity: `s1` is newer when it is
/// ahead of `s2` by less than half of the sequence space.
#[inline]
pub fn is_newer(s1: u16, s2: u16) -> bool {
    (s1.wrapping_sub(s2) as i16) > 0
}

#[inline]
pub fn is_older(s1: u16, s2: u16) -> bool {
    is_newer(s2, s1)
}

/// Sequence state shared by the in-order family of channels.
#[derive(Debug, Default, Clone)]
pub(crate) struct Sequencer {
    next_outgoing: u16,
    highest_accepted: Option<u16>,
}

impl Sequencer {
    /// Returns the sequence for the next outgoing packet and advances the counter.
    pub fn next_outgoing(&mut self) -> u16 {
        let sequence = self.next_outgoing;
        self.next_outgoing = self.next_outgoing.wrapping_add(1);
        sequence
    }

    #[cfg(test)]
    pub fn highest_accepted(&self) -> Option<u16> {
        self.highest_accepted
    }

    /// Accepts the sequence if it is newer than every sequence accepted so far.
    pub fn accept(&mut self, sequence: u16) -> bool {
        match self.highest_accepted {
            Some(highest) if !is_newer(sequence, highest) => false,
            _ => {
                self.highest_accepted = Some(sequence);
                true
            }
        }
    }
}
