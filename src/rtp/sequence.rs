//! Extended sequence numbers.
//!
//! Wire sequence numbers are 16 bits and wrap every 65536 packets. The buffer
//! orders packets by an unwrapped 64-bit key instead: `wire + cycle * 65536`.
//! The packet carrying 0xFFFF is the one most often lost at the boundary, so a
//! rollover is also inferred from a large backward jump.

use super::error::JitterError;

/// Size of the 16-bit wire sequence space
pub const SEQ_SPACE: u64 = 0x1_0000;

/// A backward jump larger than this is taken as a missed rollover
pub const ROLLOVER_JUMP: u64 = 0xF000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SequenceTracker {
    cycle: u64,
    /// One past the most recently computed key. Also the private counter
    /// handed out in FIFO / ignore-sequence mode.
    dummy_cseq: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of observed or inferred rollovers
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Compute the ordering key for a packet.
    ///
    /// With `use_counter` set (FIFO mode, ignore-sequence adds, packets with
    /// no wire sequence) every call yields a fresh key from the private
    /// counter.
    pub fn compute_key(&mut self, wire_seq: u32, use_counter: bool) -> Result<u64, JitterError> {
        if use_counter {
            let key = self.dummy_cseq;
            self.dummy_cseq += 1;
            return Ok(key);
        }

        if wire_seq > 0xFFFF {
            return Err(JitterError::InvalidSequence(wire_seq));
        }

        let wire = wire_seq as u64;
        let mut key = wire + self.cycle * SEQ_SPACE;

        if wire == 0xFFFF {
            // Assume the rollover even if the next packet never shows up
            self.cycle += 1;
        } else if key < self.dummy_cseq && self.dummy_cseq - key > ROLLOVER_JUMP {
            self.cycle += 1;
            key = wire + self.cycle * SEQ_SPACE;
        }

        self.dummy_cseq = key + 1;
        Ok(key)
    }
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /// Proves: a valid key always maps back to its wire sequence
    #[kani::proof]
    fn key_preserves_wire_sequence() {
        let cycle: u32 = kani::any();
        let dummy: u32 = kani::any();
        let seq: u16 = kani::any();
        let mut tracker = SequenceTracker {
            cycle: cycle as u64,
            dummy_cseq: dummy as u64,
        };
        let key = tracker.compute_key(seq as u32, false).unwrap();
        kani::assert(key % SEQ_SPACE == seq as u64, "key must preserve wire sequence");
    }

    /// Proves: values above 16 bits are always rejected
    #[kani::proof]
    fn wide_sequence_rejected() {
        let seq: u32 = kani::any();
        kani::assume(seq > 0xFFFF);
        let mut tracker = SequenceTracker::new();
        kani::assert(tracker.compute_key(seq, false).is_err(), "must reject");
    }
}
