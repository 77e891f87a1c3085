use thiserror::Error;

/// Why a packet was not admitted, or why a multi-buffer wait was refused.
///
/// None of these are fatal. [`JitterBuffer::add`](super::JitterBuffer::add)
/// folds them all into `false`, warning only about the ones that are not
/// [routine](Self::is_routine) under loss and reordering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JitterError {
    #[error("invalid wire sequence number {0} (must fit in 16 bits)")]
    InvalidSequence(u32),

    #[error("duplicate packet for key {0}")]
    DuplicatePacket(u64),

    #[error("stale packet: key {key} is older than next expected {next}")]
    StalePacket { key: u64, next: u64 },

    #[error("severe reorder: key {key} is far behind next expected {next}")]
    SevereReorder { key: u64, next: u64 },

    #[error("jitter buffer canceled")]
    Canceled,

    #[error("invalid multi-buffer wait: {0}")]
    InvalidMultiWait(String),
}

impl JitterError {
    /// True for outcomes that are expected under normal packet loss and
    /// reordering, as opposed to malformed input or misuse.
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            JitterError::DuplicatePacket(_) | JitterError::StalePacket { .. } | JitterError::SevereReorder { .. }
        )
    }
}
