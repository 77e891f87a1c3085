//! Thread-safe jitter buffer handle and blocking retrieval.
//!
//! Producers call [`JitterBuffer::add`] from any thread; consumers call
//! [`JitterBuffer::wait`]. Each buffer's state sits behind its own mutex.
//! Wake-ups go through a generation-counted signal, which several buffers may
//! share so that one thread can wait on all of them (see [`MultiWaitGroup`](super::MultiWaitGroup)).

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::error::JitterError;
use super::jitter::{Admission, BufferState, JitterConfig, JitterStats};
use super::packet::{MediaPacket, Sequenced};

/// Outcome of waiting on a [`Signal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    Signaled,
    TimedOut,
}

/// Condition variable with a generation counter.
///
/// Waiters snapshot the generation before inspecting buffer state and then
/// sleep only while it is unchanged, so a notify that lands between the
/// inspection and the sleep is never lost.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Sleep until the generation moves past `seen` or `timeout` elapses.
    /// `None` waits indefinitely.
    ///
    /// Also returns the generation observed under the lock when the wait
    /// ended. On a timeout this is exactly `seen`, so a notify racing the
    /// return is still pending for the next call.
    pub(crate) fn wait_since(&self, seen: u64, timeout: Option<Duration>) -> (Wake, u64) {
        let guard = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        match timeout {
            None => {
                let guard = self
                    .cond
                    .wait_while(guard, |generation| *generation == seen)
                    .unwrap_or_else(PoisonError::into_inner);
                (Wake::Signaled, *guard)
            }
            Some(timeout) => {
                let (guard, result) = self
                    .cond
                    .wait_timeout_while(guard, timeout, |generation| *generation == seen)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() && *guard == seen {
                    (Wake::TimedOut, seen)
                } else {
                    (Wake::Signaled, *guard)
                }
            }
        }
    }
}

struct Inner<P> {
    state: Mutex<BufferState<P>>,
    signal: Arc<Signal>,
}

/// A concurrent, sequence-aware jitter buffer.
///
/// Cloning the handle shares the same buffer. Queued packets are released
/// when the last handle is dropped.
///
/// # Example
///
/// ```rust
/// use mediajitter::rtp::{JitterBuffer, JitterConfig, MediaPacket};
///
/// let buffer = JitterBuffer::new(JitterConfig::default());
/// buffer.add(MediaPacket::new(10, 0, vec![]));
/// buffer.add(MediaPacket::new(12, 320, vec![]));
/// buffer.add(MediaPacket::new(11, 160, vec![]));
///
/// assert_eq!(buffer.wait(false).unwrap().sequence, Some(10));
/// assert_eq!(buffer.wait(false).unwrap().sequence, Some(11));
/// assert_eq!(buffer.wait(false).unwrap().sequence, Some(12));
/// ```
pub struct JitterBuffer<P = MediaPacket> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for JitterBuffer<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Sequenced> JitterBuffer<P> {
    pub fn new(config: JitterConfig) -> Self {
        Self::with_signal(config, Arc::new(Signal::new()))
    }

    pub(crate) fn with_signal(config: JitterConfig, signal: Arc<Signal>) -> Self {
        debug!(
            "Creating jitter buffer: max_wait={:?} blocking={} fifo={}",
            config.max_wait, config.blocking, config.fifo
        );
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BufferState::new(config)),
                signal,
            }),
        }
    }

    pub(crate) fn shares_signal(&self, signal: &Arc<Signal>) -> bool {
        Arc::ptr_eq(&self.inner.signal, signal)
    }

    fn lock(&self) -> MutexGuard<'_, BufferState<P>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a packet. Returns false if it was dropped (canceled buffer,
    /// invalid sequence, duplicate, or stale).
    pub fn add(&self, packet: P) -> bool {
        self.add_logged(packet, false)
    }

    /// Admit a packet in arrival order regardless of its wire sequence,
    /// which is overwritten with the assigned key.
    pub fn add_ignoring_sequence(&self, packet: P) -> bool {
        self.add_logged(packet, true)
    }

    fn add_logged(&self, packet: P, ignore_seq: bool) -> bool {
        match self.try_add(packet, ignore_seq) {
            Ok(_) => true,
            // Already traced by the admission policy
            Err(e) if e.is_routine() => false,
            Err(e) => {
                warn!("Rejected packet: {}", e);
                false
            }
        }
    }

    /// Admit a packet and report exactly what happened
    pub fn try_add(&self, packet: P, ignore_seq: bool) -> Result<Admission, JitterError> {
        let admission = self.lock().admit(packet, ignore_seq)?;
        self.inner.signal.notify();
        Ok(admission)
    }

    /// Retrieve the next packet in order.
    ///
    /// With `block` set on a blocking buffer this sleeps until a packet is
    /// deliverable or the buffer is canceled. When `max_wait` is non-zero a
    /// missing packet is given up on after that long and the earliest queued
    /// packet is delivered instead. `None` is a normal outcome.
    pub fn wait(&self, block: bool) -> Option<P> {
        let mut deadline: Option<Instant> = None;

        loop {
            let seen = self.inner.signal.generation();
            let max_wait = {
                let mut state = self.lock();
                if state.is_canceled() {
                    trace!("Wait on canceled jitter buffer");
                    return None;
                }
                if let Some(packet) = state.take_ready() {
                    return Some(packet);
                }
                if !block || !state.config().blocking {
                    return None;
                }
                state.config().max_wait
            };

            if max_wait.is_zero() {
                self.inner.signal.wait_since(seen, None);
                continue;
            }

            let deadline_at = *deadline.get_or_insert_with(|| Instant::now() + max_wait);
            let remaining = deadline_at.saturating_duration_since(Instant::now());
            let wake = if remaining.is_zero() {
                Wake::TimedOut
            } else {
                self.inner.signal.wait_since(seen, Some(remaining)).0
            };

            if wake == Wake::TimedOut {
                let mut state = self.lock();
                debug!(
                    "Jitter buffer wait timed out after {:?}, hurrying up ({} queued)",
                    max_wait,
                    state.len()
                );
                state.timed_out();
                deadline = None;
            }
        }
    }

    /// Release all blocked waiters with no packet and refuse further adds
    /// until [`reset`](Self::reset). Queued packets are kept.
    pub fn cancel(&self) {
        self.lock().cancel();
        self.inner.signal.notify();
    }

    /// Clear cancellation and reorder bookkeeping. With `clear` set, also
    /// drop queued packets and forget the delivery position.
    pub fn reset(&self, clear: bool) {
        self.lock().reset(clear);
    }

    /// Drop queued packets
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Deliver the earliest queued packet on the next wait even if the
    /// expected one has not arrived
    pub fn hurry_up(&self) {
        self.lock().hurry_up();
        self.inner.signal.notify();
    }

    /// Number of queued packets. Advisory only; it may change immediately.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Packets skipped by the most recent successful wait
    pub fn loss(&self) -> u64 {
        self.lock().loss()
    }

    pub fn is_canceled(&self) -> bool {
        self.lock().is_canceled()
    }

    pub(crate) fn head_ready(&self) -> bool {
        self.lock().head_ready()
    }

    pub fn stats(&self) -> JitterStats {
        self.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn make_packet(seq: u16) -> MediaPacket {
        MediaPacket::new(seq, seq as u32 * 160, vec![0u8; 160])
    }

    #[test]
    fn test_nonblocking_wait_on_empty() {
        let buffer: JitterBuffer = JitterBuffer::new(JitterConfig::default());
        assert!(buffer.wait(false).is_none());
        assert_eq!(buffer.loss(), 0);
    }

    #[test]
    fn test_nonblocking_buffer_never_blocks() {
        let buffer: JitterBuffer = JitterBuffer::new(JitterConfig::new(0, false, false));
        let start = Instant::now();
        assert!(buffer.wait(true).is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_blocking_wait_woken_by_add() {
        let buffer: JitterBuffer = JitterBuffer::new(JitterConfig::new(0, true, false));
        let producer = buffer.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.add(make_packet(7));
        });

        let packet = buffer.wait(true).expect("should receive packet");
        assert_eq!(packet.sequence, Some(7));
        handle.join().unwrap();
    }

    #[test]
    fn test_timeout_hurries_up() {
        let buffer: JitterBuffer = JitterBuffer::new(JitterConfig::new(30, true, false));
        buffer.add(make_packet(1));
        assert_eq!(buffer.wait(false).unwrap().sequence, Some(1));

        buffer.add(make_packet(3));
        assert!(buffer.wait(false).is_none());

        let start = Instant::now();
        let packet = buffer.wait(true).expect("hurry-up should deliver");
        assert_eq!(packet.sequence, Some(3));
        assert_eq!(buffer.loss(), 1);
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert_eq!(buffer.stats().timeouts, 1);
    }

    #[test]
    fn test_hurry_up_releases_gap() {
        let buffer: JitterBuffer = JitterBuffer::new(JitterConfig::new(0, true, false));
        buffer.add(make_packet(1));
        buffer.wait(false);
        buffer.add(make_packet(5));
        assert!(buffer.wait(false).is_none());
        buffer.hurry_up();
        assert_eq!(buffer.wait(false).unwrap().sequence, Some(5));
        assert_eq!(buffer.loss(), 3);
    }

    #[test]
    fn test_cancel_then_reset() {
        let buffer: JitterBuffer = JitterBuffer::new(JitterConfig::default());
        buffer.add(make_packet(1));
        buffer.cancel();
        assert!(buffer.is_canceled());
        assert!(!buffer.add(make_packet(2)));
        assert!(buffer.wait(true).is_none());
        // Cancel keeps queued data
        assert_eq!(buffer.len(), 1);

        buffer.reset(false);
        assert!(!buffer.is_canceled());
        assert_eq!(buffer.wait(false).unwrap().sequence, Some(1));
    }

    #[test]
    fn test_try_add_reports_reason() {
        let buffer: JitterBuffer = JitterBuffer::new(JitterConfig::default());
        assert_eq!(buffer.try_add(make_packet(4), false), Ok(Admission::Queued { key: 4 }));
        assert_eq!(
            buffer.try_add(make_packet(4), false),
            Err(JitterError::DuplicatePacket(4))
        );
    }

    #[test]
    fn test_add_folds_every_rejection_into_false() {
        let buffer: JitterBuffer = JitterBuffer::new(JitterConfig::default());
        let mut wide = make_packet(0);
        wide.sequence = Some(0x1_0000);
        assert!(!buffer.add(wide));
        assert!(buffer.add(make_packet(1)));
        assert!(!buffer.add(make_packet(1)));
        buffer.cancel();
        assert!(!buffer.add_ignoring_sequence(make_packet(2)));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_signal_wait_returns_on_prior_notify() {
        let signal = Signal::new();
        let seen = signal.generation();
        signal.notify();
        assert_eq!(
            signal.wait_since(seen, Some(Duration::from_secs(5))),
            (Wake::Signaled, seen + 1)
        );
    }

    #[test]
    fn test_signal_times_out() {
        let signal = Signal::new();
        let seen = signal.generation();
        assert_eq!(
            signal.wait_since(seen, Some(Duration::from_millis(10))),
            (Wake::TimedOut, seen)
        );
    }

    #[test]
    fn test_notify_after_timeout_stays_pending() {
        let signal = Signal::new();
        let seen = signal.generation();
        let (wake, observed) = signal.wait_since(seen, Some(Duration::from_millis(5)));
        assert_eq!(wake, Wake::TimedOut);

        // A producer notifies between the timeout and the caller recording it
        signal.notify();
        assert_eq!(observed, seen);

        let start = Instant::now();
        assert_eq!(
            signal.wait_since(observed, Some(Duration::from_secs(5))),
            (Wake::Signaled, seen + 1)
        );
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
