/// RTP Jitter Buffer state
///
/// `BufferState` holds admitted-but-undelivered packets keyed by their
/// extended sequence number and decides which packet, if any, may be handed
/// to the consumer next. It does no locking of its own; the concurrent
/// [`JitterBuffer`](super::JitterBuffer) wraps it in a mutex.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::error::JitterError;
use super::packet::Sequenced;
use super::sequence::{SequenceTracker, SEQ_SPACE};

/// A stale packet this far behind `next` counts as a big jump
pub const BIG_JUMP_DISTANCE: u64 = 10;

/// Big jumps tolerated before a stale packet is taken as a resync signal
pub const RESYNC_THRESHOLD: u32 = 20;

/// Configuration for the jitter buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitterConfig {
    /// Longest a blocked `wait` holds out for a missing packet before
    /// delivering the next one it has. Zero waits indefinitely.
    pub max_wait: Duration,
    /// Whether `wait(true)` may block at all
    pub blocking: bool,
    /// Ignore wire sequence numbers and deliver in arrival order
    pub fifo: bool,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(60),
            blocking: true,
            fifo: false,
        }
    }
}

impl JitterConfig {
    pub fn new(max_wait_ms: u64, blocking: bool, fifo: bool) -> Self {
        Self {
            max_wait: Duration::from_millis(max_wait_ms),
            blocking,
            fifo,
        }
    }
}

/// How a packet was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued for ordered delivery
    Queued { key: u64 },
    /// Accepted as a resynchronization signal after repeated far-stale
    /// arrivals; older queued packets were discarded
    Resync { key: u64 },
}

impl Admission {
    pub fn key(&self) -> u64 {
        match *self {
            Admission::Queued { key } | Admission::Resync { key } => key,
        }
    }
}

/// Readiness of the head of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// May be delivered now
    Ready,
    /// Older than `next`, discard without delivering
    Stale,
    /// Ahead of `next` and no hurry-up in effect
    Pending,
}

/// Jitter buffer state
#[derive(Debug)]
pub struct BufferState<P> {
    config: JitterConfig,
    /// Packets indexed by extended sequence number
    packets: BTreeMap<u64, P>,
    /// One past the key of the last delivered packet
    next: Option<u64>,
    tracker: SequenceTracker,
    canceled: bool,
    hurry_up: bool,
    big_jumps: u32,
    last_loss: u64,
    stats: JitterStats,
}

impl<P: Sequenced> BufferState<P> {
    pub fn new(config: JitterConfig) -> Self {
        Self {
            config,
            packets: BTreeMap::new(),
            next: None,
            tracker: SequenceTracker::new(),
            canceled: false,
            hurry_up: false,
            big_jumps: 0,
            last_loss: 0,
            stats: JitterStats::default(),
        }
    }

    pub fn config(&self) -> &JitterConfig {
        &self.config
    }

    /// Admit a packet, or say why not
    pub fn admit(&mut self, mut packet: P, ignore_seq: bool) -> Result<Admission, JitterError> {
        if self.canceled {
            return Err(JitterError::Canceled);
        }
        self.stats.packets_received += 1;

        let wire = packet.wire_sequence();
        let use_counter = ignore_seq || self.config.fifo || wire.is_none();
        let key = match self.tracker.compute_key(wire.unwrap_or(0), use_counter) {
            Ok(key) => key,
            Err(e) => {
                debug!("Dropping packet: {}", e);
                return Err(e);
            }
        };

        if self.packets.contains_key(&key) {
            trace!("Dropping duplicate packet: key={}", key);
            self.stats.duplicates += 1;
            return Err(JitterError::DuplicatePacket(key));
        }

        let mut admission = Admission::Queued { key };
        if let Some(next) = self.next.filter(|&next| !self.config.fifo && key < next) {
            if self.big_jumps > RESYNC_THRESHOLD {
                warn!(
                    "Resynchronizing at key={} (next was {}), discarding {} queued packets",
                    key,
                    next,
                    self.packets.len()
                );
                self.hurry_up = true;
                self.big_jumps = 0;
                self.packets.clear();
                self.next = None;
                self.stats.resyncs += 1;
                admission = Admission::Resync { key };
            } else if next - key > BIG_JUMP_DISTANCE {
                self.big_jumps += 1;
                self.stats.severe_reorders += 1;
                debug!(
                    "Dropping far-stale packet: key={} next={} (big jumps: {})",
                    key, next, self.big_jumps
                );
                return Err(JitterError::SevereReorder { key, next });
            } else {
                trace!("Dropping late packet: key={} (expected >= {})", key, next);
                self.stats.stale_dropped += 1;
                return Err(JitterError::StalePacket { key, next });
            }
        }

        if ignore_seq {
            packet.set_wire_sequence((key % SEQ_SPACE) as u16);
        }
        self.packets.insert(key, packet);
        self.stats.packets_queued += 1;
        trace!("Buffered packet: key={}, buffer_size={}", key, self.packets.len());

        Ok(admission)
    }

    /// Readiness of the packet keyed `key` if it were at the head
    pub fn readiness(&self, key: u64) -> Readiness {
        match self.next {
            None => Readiness::Ready,
            Some(next) if key < next => Readiness::Stale,
            Some(next) if key == next => Readiness::Ready,
            Some(_) if self.hurry_up => Readiness::Ready,
            Some(_) => Readiness::Pending,
        }
    }

    /// Check if the head of the queue can be delivered now
    pub fn head_ready(&self) -> bool {
        !self.canceled
            && self
                .packets
                .keys()
                .next()
                .is_some_and(|&key| self.readiness(key) == Readiness::Ready)
    }

    /// Remove and return the head of the queue if it may be delivered now,
    /// discarding stale heads along the way
    pub fn take_ready(&mut self) -> Option<P> {
        loop {
            let (&key, _) = self.packets.first_key_value()?;
            match self.readiness(key) {
                Readiness::Pending => return None,
                // Admission already refuses keys behind `next`; this guards
                // the head if that ever changes
                Readiness::Stale => {
                    trace!("Discarding stale head: key={}", key);
                    self.packets.remove(&key);
                    self.stats.stale_dropped += 1;
                }
                Readiness::Ready => {
                    let packet = self.packets.remove(&key)?;
                    self.deliver(key);
                    return Some(packet);
                }
            }
        }
    }

    fn deliver(&mut self, key: u64) {
        self.last_loss = match self.next {
            Some(next) => key.saturating_sub(next),
            None => 0,
        };
        if self.next == Some(key) {
            self.big_jumps = 0;
        }
        if self.last_loss > 0 {
            debug!(
                "Skipping {} missing packets, jumping to key {}",
                self.last_loss, key
            );
        }
        self.next = Some(key + 1);
        self.hurry_up = false;
        self.stats.packets_delivered += 1;
        self.stats.packets_lost += self.last_loss;
    }

    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Clear cancellation and reorder bookkeeping, and with `clear_queue`
    /// also drop queued packets and forget the delivery position
    pub fn reset(&mut self, clear_queue: bool) {
        self.canceled = false;
        self.big_jumps = 0;
        if clear_queue {
            self.packets.clear();
            self.next = None;
        }
    }

    /// Drop queued packets only
    pub fn clear(&mut self) {
        self.packets.clear();
    }

    pub fn hurry_up(&mut self) {
        self.hurry_up = true;
    }

    /// Hurry-up caused by `max_wait` running out
    pub fn timed_out(&mut self) {
        self.hurry_up = true;
        self.stats.timeouts += 1;
    }

    pub fn is_hurrying(&self) -> bool {
        self.hurry_up
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Packets skipped by the most recent delivery
    pub fn loss(&self) -> u64 {
        self.last_loss
    }

    /// Key the next in-order delivery must carry, if known
    pub fn next_key(&self) -> Option<u64> {
        self.next
    }

    pub fn big_jumps(&self) -> u32 {
        self.big_jumps
    }

    pub fn stats(&self) -> JitterStats {
        JitterStats {
            current_depth: self.packets.len(),
            ..self.stats.clone()
        }
    }
}

/// Statistics about jitter buffer operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JitterStats {
    pub packets_received: u64,
    pub packets_queued: u64,
    pub packets_delivered: u64,
    pub duplicates: u64,
    pub stale_dropped: u64,
    pub severe_reorders: u64,
    pub resyncs: u64,
    pub timeouts: u64,
    pub packets_lost: u64,
    pub current_depth: usize,
}
