/// Media packets as seen by the jitter buffer.
///
/// The buffer never looks at payload bytes. All it needs from a packet is an
/// optional wire sequence number and a way to overwrite it, which is what
/// [`Sequenced`] captures.

use bytes::Bytes;

/// Contract between the jitter buffer and whatever packet type the I/O layer
/// produces.
///
/// Ownership stands in for the duplicate/release pair: the buffer takes the
/// packet by value on admission, hands it back by value on delivery, and
/// drops it if it is discarded.
pub trait Sequenced: Send {
    /// Wire sequence number, if the packet carries one.
    ///
    /// Wider than 16 bits so that malformed values coming from a
    /// collaborator can be detected instead of silently truncated.
    fn wire_sequence(&self) -> Option<u32>;

    /// Overwrite the wire sequence number (used when the buffer assigns its
    /// own ordering key).
    fn set_wire_sequence(&mut self, sequence: u16);
}

/// An opaque, sequence-numbered unit of media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub sequence: Option<u32>,
    pub timestamp: u32,
    /// End-of-unit marker (the RTP M bit)
    pub marker: bool,
    pub payload_type: u8,
    pub ssrc: u32,
    pub payload: Bytes,
}

impl MediaPacket {
    pub fn new(sequence: u16, timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence: Some(sequence as u32),
            timestamp,
            marker: false,
            payload_type: 0,
            ssrc: 0,
            payload: payload.into(),
        }
    }

    /// A packet without a wire sequence number. The buffer orders these by
    /// arrival.
    pub fn unsequenced(timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence: None,
            timestamp,
            marker: false,
            payload_type: 0,
            ssrc: 0,
            payload: payload.into(),
        }
    }

    /// Parse an RTP datagram into a packet.
    /// Returns None for anything that is not a well-formed RTP v2 packet.
    pub fn from_rtp(data: &[u8]) -> Option<Self> {
        let header = parse_rtp_header(data)?;
        if header.payload_offset > data.len() {
            return None;
        }

        Some(Self {
            sequence: Some(header.sequence as u32),
            timestamp: header.timestamp,
            marker: header.marker,
            payload_type: header.payload_type,
            ssrc: header.ssrc,
            payload: Bytes::copy_from_slice(&data[header.payload_offset..]),
        })
    }
}

impl Sequenced for MediaPacket {
    fn wire_sequence(&self) -> Option<u32> {
        self.sequence
    }

    fn set_wire_sequence(&mut self, sequence: u16) {
        self.sequence = Some(sequence as u32);
    }
}

/// RTP fixed header fields plus the offset where the payload starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub payload_type: u8,
    pub marker: bool,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload_offset: usize,
}

/// Parse an RTP header from raw bytes.
///
/// The payload offset accounts for the CSRC list and, when the packet is long
/// enough to carry it, the header extension. It may point past the end of a
/// truncated packet; callers must check.
pub fn parse_rtp_header(data: &[u8]) -> Option<RtpHeader> {
    if data.len() < 12 {
        return None;
    }
    let version = (data[0] >> 6) & 0x03;
    if version != 2 {
        return None;
    }

    let cc = data[0] & 0x0F;
    let has_extension = (data[0] & 0x10) != 0;
    let mut offset = 12 + (cc as usize * 4);
    if has_extension && data.len() >= offset + 4 {
        let ext_length = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        offset += 4 + (ext_length * 4);
    }

    Some(RtpHeader {
        payload_type: data[1] & 0x7F,
        marker: (data[1] & 0x80) != 0,
        sequence: u16::from_be_bytes([data[2], data[3]]),
        timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        payload_offset: offset,
    })
}
