//! udpprobe - UDP latency, throughput and packet-loss probe
//!
//! A sender emits a bounded burst of fixed-size UDP datagrams, each carrying a
//! sequence number and a send timestamp. A receiver listens on a well-known
//! port, stamps every arrival, and once the burst is complete, the sender has
//! gone quiet, or the operator interrupts, reports per-packet latency,
//! aggregate throughput and the number of dropped packets.
//!
//! # Features
//!
//! - Bounded-wait reception with a per-packet inactivity deadline
//! - Cancellable runs that still report what was collected
//! - Monotonic or TSC timestamps
//! - Text or JSON reports
//! - Asynchronous I/O using tokio

pub mod clock;
pub mod config;
pub mod error;
pub mod measurements;
pub mod receiver;
pub mod report;
pub mod sender;
pub mod udp_packet;

pub use config::{Config, Mode};
pub use error::{Error, Result};
pub use measurements::ReceiveBuffer;
pub use receiver::{Reception, Receiver, Termination};
pub use report::Report;
pub use sender::{SendSummary, Sender};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
