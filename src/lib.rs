//! mediajitter - sequence-aware jitter buffering for real-time media
//!
//! This module exports the buffer engine and its collaborators for the
//! binary and for integration testing.

pub mod cli;
pub mod config;
pub mod rtp;
pub mod simulate;
