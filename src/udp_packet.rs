//! Fixed-size packet record carried at the front of every measurement datagram.
//!
//! # Packet Format
//!
//! ```text
//! ┌──────────────┬──────────────────┬──────────────────┬──────────────┐
//! │  Sequence    │  Send timestamp  │  Recv timestamp  │   Padding    │
//! │  (4 bytes)   │    (8 bytes)     │    (8 bytes)     │  (variable)  │
//! └──────────────┴──────────────────┴──────────────────┴──────────────┘
//! ```
//!
//! - **Sequence**: source-assigned packet index, starting at 0 (big-endian)
//! - **Send timestamp**: source clock ticks at the moment of sending (big-endian)
//! - **Recv timestamp**: always zero on the wire, filled in by the receiver
//! - **Padding**: zero bytes up to the configured payload size
//!
//! Timestamps are raw [`Clock`](crate::clock::Clock) ticks. Sender and receiver
//! must use the same clock source for latencies to be meaningful, and the
//! figures are only comparable when both run on the same host.
//!
//! # Examples
//!
//! ```
//! use udpprobe::udp_packet::{build_payload, parse_payload, RECORD_SIZE};
//!
//! let payload = build_payload(7, 123_456, 64);
//! assert_eq!(payload.len(), 64);
//!
//! let record = parse_payload(&payload).expect("payload holds a record");
//! assert_eq!(record.sequence, 7);
//! assert_eq!(record.send_timestamp, 123_456);
//! assert_eq!(record.receive_timestamp, 0);
//! # let _ = RECORD_SIZE;
//! ```

use serde::{Deserialize, Serialize};

/// Size of the encoded packet record in bytes.
pub const RECORD_SIZE: usize = 20; // 4 (sequence) + 8 (send) + 8 (receive)

/// Largest UDP payload that fits in a single IPv4 datagram.
pub const MAX_PAYLOAD_SIZE: usize = 65_507;

/// One measurement packet: sequence number plus send and receive timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Source-assigned packet index
    pub sequence: u32,
    /// Source clock ticks at send time
    pub send_timestamp: u64,
    /// Receiver clock ticks at acceptance time (zero on the wire)
    pub receive_timestamp: u64,
}

impl PacketRecord {
    /// Creates a record as the packet source emits it.
    pub fn new(sequence: u32, send_timestamp: u64) -> Self {
        Self {
            sequence,
            send_timestamp,
            receive_timestamp: 0,
        }
    }

    /// Returns a copy stamped with the receiver's arrival time.
    pub fn received_at(mut self, receive_timestamp: u64) -> Self {
        self.receive_timestamp = receive_timestamp;
        self
    }

    /// Serializes the record to bytes (big-endian)
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        self.write_to(&mut bytes);
        bytes
    }

    /// Writes the record into the first [`RECORD_SIZE`] bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`RECORD_SIZE`].
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..12].copy_from_slice(&self.send_timestamp.to_be_bytes());
        buf[12..20].copy_from_slice(&self.receive_timestamp.to_be_bytes());
    }

    /// Deserializes a record from the front of `bytes`.
    ///
    /// Returns `None` if fewer than [`RECORD_SIZE`] bytes are available.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < RECORD_SIZE {
            return None;
        }

        let sequence = u32::from_be_bytes(bytes[0..4].try_into().ok()?);
        let send_timestamp = u64::from_be_bytes(bytes[4..12].try_into().ok()?);
        let receive_timestamp = u64::from_be_bytes(bytes[12..20].try_into().ok()?);

        Some(Self {
            sequence,
            send_timestamp,
            receive_timestamp,
        })
    }
}

/// Builds a zero-padded payload of `payload_size` bytes carrying a fresh record.
///
/// `payload_size` is clamped up to [`RECORD_SIZE`] so the record always fits.
pub fn build_payload(sequence: u32, send_timestamp: u64, payload_size: usize) -> Vec<u8> {
    let mut payload = vec![0u8; payload_size.max(RECORD_SIZE)];
    PacketRecord::new(sequence, send_timestamp).write_to(&mut payload);
    payload
}

/// Parses the record prefix of a received payload; padding is ignored.
pub fn parse_payload(payload: &[u8]) -> Option<PacketRecord> {
    PacketRecord::from_bytes(payload)
}
