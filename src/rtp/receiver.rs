use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::buffer::JitterBuffer;
use super::jitter::Admission;
use super::packet::MediaPacket;

/// What happened during one receive run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiveSummary {
    /// Datagrams read from the socket
    pub datagrams: u64,
    /// Packets the jitter buffer accepted
    pub admitted: u64,
    /// Datagrams that were not valid RTP
    pub malformed: u64,
    /// Valid RTP packets the jitter buffer refused (duplicate, late, canceled)
    pub dropped: u64,
    /// Whether the run ended because of cancellation
    pub cancelled: bool,
}

/// Reads RTP datagrams from a UDP socket and feeds them to a jitter buffer
pub struct RtpReceiver {
    socket: UdpSocket,
    buffer: JitterBuffer<MediaPacket>,
}

impl RtpReceiver {
    /// Bind to a specific port (or 0 for auto-assign)
    pub async fn bind(port: u16, buffer: JitterBuffer<MediaPacket>) -> Result<Self> {
        let addr = format!("0.0.0.0:{}", port);
        let socket = UdpSocket::bind(&addr)
            .await
            .context(format!("Failed to bind RTP socket on {}", addr))?;

        debug!("RTP receiver bound to port {}", port);

        Ok(Self { socket, buffer })
    }

    /// Create from an already-bound socket (avoids port race conditions)
    pub fn from_socket(socket: UdpSocket, buffer: JitterBuffer<MediaPacket>) -> Self {
        Self { socket, buffer }
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Receive RTP packets for the specified duration with cancellation support
    pub async fn receive_for_cancellable(
        &mut self,
        duration: Duration,
        cancel_token: CancellationToken,
    ) -> Result<ReceiveSummary> {
        let mut buf = [0u8; 2048];
        let deadline = tokio::time::Instant::now() + duration;
        let mut summary = ReceiveSummary::default();
        let mut first_packet_logged = false;

        loop {
            if cancel_token.is_cancelled() {
                debug!("RTP receive cancelled by shutdown signal");
                summary.cancelled = true;
                break;
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            tokio::select! {
                result = timeout(remaining.min(Duration::from_millis(20)), self.socket.recv_from(&mut buf)) => {
                    match result {
                        Ok(Ok((len, addr))) => {
                            summary.datagrams += 1;
                            if !first_packet_logged {
                                info!("First RTP packet received: {} bytes from {}", len, addr);
                                first_packet_logged = true;
                            }
                            self.process_packet(&buf[..len], &mut summary);
                        }
                        Ok(Err(e)) => {
                            warn!("RTP receive error: {}", e);
                        }
                        Err(_) => {}
                    }
                }
                _ = cancel_token.cancelled() => {
                    debug!("RTP receive cancelled by shutdown signal");
                    summary.cancelled = true;
                    break;
                }
            }
        }

        info!(
            "RTP receive done: {} datagrams, {} admitted, {} dropped, {} malformed",
            summary.datagrams, summary.admitted, summary.dropped, summary.malformed
        );
        Ok(summary)
    }

    fn process_packet(&self, data: &[u8], summary: &mut ReceiveSummary) {
        let Some(packet) = MediaPacket::from_rtp(data) else {
            trace!("Ignoring non-RTP datagram of {} bytes", data.len());
            summary.malformed += 1;
            return;
        };

        match self.buffer.try_add(packet, false) {
            Ok(admission) => {
                summary.admitted += 1;
                if let Admission::Resync { .. } = admission {
                    info!("RTP stream resynchronized at key {}", admission.key());
                }
            }
            Err(e) if e.is_routine() => summary.dropped += 1,
            Err(e) => {
                warn!("Rejected RTP packet: {}", e);
                summary.dropped += 1;
            }
        }
    }
}
