//! Waiting on several jitter buffers from one thread.
//!
//! Buffers only wake a multi-buffer waiter if they signal through the same
//! condition variable. [`MultiWaitGroup`] owns that shared signal and is the
//! only way to create buffers bound to it, so the contract is checked rather
//! than assumed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

use super::buffer::{JitterBuffer, Signal, Wake};
use super::error::JitterError;
use super::jitter::JitterConfig;
use super::packet::{MediaPacket, Sequenced};

/// Most buffers a single `wait_multi` call accepts
pub const MAX_MULTI_WAIT: usize = 32;

/// Default queue depth above which a timed-out multi-wait hurries a buffer up
pub const DEFAULT_HURRY_DEPTH: usize = 2;

pub struct MultiWaitGroup<P = MediaPacket> {
    signal: Arc<Signal>,
    /// Signal generation as of the last completed `wait_multi`
    observed: Mutex<u64>,
    hurry_depth: usize,
    _packet: std::marker::PhantomData<fn() -> P>,
}

impl<P: Sequenced> Default for MultiWaitGroup<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Sequenced> MultiWaitGroup<P> {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(Signal::new()),
            observed: Mutex::new(0),
            hurry_depth: DEFAULT_HURRY_DEPTH,
            _packet: std::marker::PhantomData,
        }
    }

    /// Set the queue depth above which a timed-out wait forces delivery.
    ///
    /// Lower values trade latency for completeness: a buffer holding more than
    /// this many packets stops waiting for its missing one once a round of
    /// `wait_multi` passes without any signal.
    pub fn with_hurry_depth(mut self, depth: usize) -> Self {
        self.hurry_depth = depth;
        self
    }

    /// Create a buffer that signals through this group
    pub fn create_buffer(&self, config: JitterConfig) -> JitterBuffer<P> {
        JitterBuffer::with_signal(config, Arc::clone(&self.signal))
    }

    /// Wait once for any member buffer to signal, then report which of
    /// `buffers` (by index) have a packet deliverable right now.
    ///
    /// Signals raised since the previous call are not lost: the wait returns
    /// immediately if any arrived. On a timeout with no signal, every buffer
    /// holding more than the hurry depth is hurried up and no buffers are
    /// reported ready for this round.
    pub fn wait_multi(
        &self,
        buffers: &[&JitterBuffer<P>],
        timeout: Duration,
    ) -> Result<Vec<usize>, JitterError> {
        if buffers.is_empty() {
            return Err(JitterError::InvalidMultiWait("no buffers given".to_string()));
        }
        if buffers.len() > MAX_MULTI_WAIT {
            return Err(JitterError::InvalidMultiWait(format!(
                "{} buffers exceeds the limit of {}",
                buffers.len(),
                MAX_MULTI_WAIT
            )));
        }
        if let Some(index) = buffers.iter().position(|b| !b.shares_signal(&self.signal)) {
            return Err(JitterError::InvalidMultiWait(format!(
                "buffer {} was not created by this group",
                index
            )));
        }

        let seen = *self.observed.lock().unwrap_or_else(PoisonError::into_inner);
        let (wake, generation) = self.signal.wait_since(seen, Some(timeout));
        // Record what the wait saw, not the current value: a signal raised
        // after a timeout must wake the next round
        *self.observed.lock().unwrap_or_else(PoisonError::into_inner) = generation;

        if wake == Wake::TimedOut {
            for (index, buffer) in buffers.iter().enumerate() {
                let depth = buffer.len();
                if depth > self.hurry_depth {
                    debug!("Multi-wait timed out, hurrying buffer {} ({} queued)", index, depth);
                    buffer.hurry_up();
                }
            }
            return Ok(Vec::new());
        }

        let ready: Vec<usize> = buffers
            .iter()
            .enumerate()
            .filter(|(_, buffer)| buffer.head_ready())
            .map(|(index, _)| index)
            .collect();
        trace!("Multi-wait woke with {} of {} buffers ready", ready.len(), buffers.len());
        Ok(ready)
    }
}
