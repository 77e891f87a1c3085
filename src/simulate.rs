//! Synthetic packet streams with loss, reordering and duplication.
//!
//! Used by the `--simulate` mode of the binary and by tests to exercise the
//! jitter buffer without a network.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::rtp::MediaPacket;

/// RTP timestamp step for 20 ms of 8 kHz audio
pub const TIMESTAMP_STEP: u32 = 160;

#[derive(Debug, Clone, PartialEq)]
pub struct StreamProfile {
    /// Packets the sender emits (before loss and duplication)
    pub count: usize,
    pub start_seq: u16,
    /// Probability that a packet is lost
    pub loss_rate: f64,
    /// Packets are shuffled within consecutive windows of this size
    pub reorder_window: usize,
    /// Probability that a packet is delivered twice
    pub duplicate_rate: f64,
}

impl Default for StreamProfile {
    fn default() -> Self {
        Self {
            count: 1000,
            start_seq: 0,
            loss_rate: 0.05,
            reorder_window: 4,
            duplicate_rate: 0.02,
        }
    }
}

impl StreamProfile {
    pub fn with_count(count: usize) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }
}

/// Generate the arrival order of a stream under `profile`.
/// The same seed always produces the same stream.
pub fn generate(profile: &StreamProfile, seed: u64) -> Vec<MediaPacket> {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut arrivals: Vec<MediaPacket> = Vec::with_capacity(profile.count);
    for i in 0..profile.count {
        if rng.gen_bool(profile.loss_rate.clamp(0.0, 1.0)) {
            continue;
        }
        let seq = profile.start_seq.wrapping_add(i as u16);
        let timestamp = (i as u32).wrapping_mul(TIMESTAMP_STEP);
        let packet = MediaPacket::new(seq, timestamp, (i as u32).to_be_bytes().to_vec());
        if rng.gen_bool(profile.duplicate_rate.clamp(0.0, 1.0)) {
            arrivals.push(packet.clone());
        }
        arrivals.push(packet);
    }

    if profile.reorder_window > 1 {
        for window in arrivals.chunks_mut(profile.reorder_window) {
            window.shuffle(&mut rng);
        }
    }

    arrivals
}
