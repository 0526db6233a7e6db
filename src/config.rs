use crate::clock::ClockSource;
use crate::udp_packet::{MAX_PAYLOAD_SIZE, RECORD_SIZE};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Well-known port the receiver listens on and the sender targets.
pub const DEFAULT_PORT: u16 = 9876;

/// Default inactivity tolerance between two datagrams.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(2);

/// Role of this process in a measurement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Listens for the burst and reports on it
    Receiver,
    /// Emits the burst
    Sender,
}

/// Configuration for a single measurement run.
///
/// The configuration is immutable once a [`Receiver`](crate::Receiver) or
/// [`Sender`](crate::Sender) has been built from it. Use the builder methods to
/// customize the defaults.
///
/// # Examples
///
/// ## Receiver
///
/// ```
/// use udpprobe::Config;
/// use std::time::Duration;
///
/// let config = Config::receiver(9876)
///     .with_packet_count(1000)
///     .with_payload_size(1472)
///     .with_tolerance(Duration::from_secs(5))
///     .with_quiet(true);
///
/// assert!(config.validate().is_ok());
/// ```
///
/// ## Sender
///
/// ```
/// use udpprobe::Config;
/// use std::net::Ipv4Addr;
///
/// let config = Config::sender(Ipv4Addr::LOCALHOST, 9876)
///     .with_packet_count(1000)
///     .with_payload_size(1472);
///
/// assert_eq!(config.destination, Some(Ipv4Addr::LOCALHOST));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Receiver or sender
    pub mode: Mode,

    /// UDP port to listen on (receiver) or send to (sender)
    pub port: u16,

    /// Local address to bind the receiver to
    pub bind_addr: Ipv4Addr,

    /// Destination address (sender only)
    pub destination: Option<Ipv4Addr>,

    /// Number of datagrams in the burst
    pub packet_count: usize,

    /// Size of every datagram payload in bytes
    pub payload_size: usize,

    /// Maximum silence between two datagrams before the receiver gives up
    pub tolerance: Duration,

    /// Suppress per-packet report lines
    pub quiet: bool,

    /// Emit the report as JSON
    pub json: bool,

    /// Timestamp source
    pub clock: ClockSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Receiver,
            port: DEFAULT_PORT,
            bind_addr: Ipv4Addr::UNSPECIFIED,
            destination: None,
            packet_count: 1,
            payload_size: RECORD_SIZE,
            tolerance: DEFAULT_TOLERANCE,
            quiet: false,
            json: false,
            clock: ClockSource::Monotonic,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a receiver configuration listening on `port`.
    pub fn receiver(port: u16) -> Self {
        Self {
            mode: Mode::Receiver,
            port,
            ..Default::default()
        }
    }

    /// Creates a sender configuration targeting `destination:port`.
    pub fn sender(destination: Ipv4Addr, port: u16) -> Self {
        Self {
            mode: Mode::Sender,
            port,
            destination: Some(destination),
            ..Default::default()
        }
    }

    /// Sets the number of datagrams in the burst.
    pub fn with_packet_count(mut self, packet_count: usize) -> Self {
        self.packet_count = packet_count;
        self
    }

    /// Sets the datagram payload size. Must be at least
    /// [`RECORD_SIZE`](crate::udp_packet::RECORD_SIZE) bytes.
    pub fn with_payload_size(mut self, payload_size: usize) -> Self {
        self.payload_size = payload_size;
        self
    }

    /// Sets the inactivity tolerance. Must be a whole number of seconds, at
    /// least one.
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Enables or disables per-packet report lines.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Enables or disables JSON report output.
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Sets the local address the receiver binds to.
    pub fn with_bind_addr(mut self, bind_addr: Ipv4Addr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Selects the timestamp source.
    pub fn with_clock(mut self, clock: ClockSource) -> Self {
        self.clock = clock;
        self
    }

    /// Address the receiver binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind_addr, self.port))
    }

    /// Address the sender targets, if one is configured.
    pub fn target_addr(&self) -> Option<SocketAddr> {
        self.destination
            .map(|ip| SocketAddr::V4(SocketAddrV4::new(ip, self.port)))
    }

    /// Checks the configuration before any socket is created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - the packet count is zero
    /// - the payload cannot hold a packet record or exceeds one IPv4 datagram
    /// - the tolerance is shorter than a second or not whole seconds
    /// - a sender has no destination
    pub fn validate(&self) -> Result<()> {
        if self.packet_count == 0 {
            return Err(Error::Config(
                "Packet count must be at least 1".to_string(),
            ));
        }
        if u32::try_from(self.packet_count).is_err() {
            return Err(Error::Config(format!(
                "Packet count must not exceed {}",
                u32::MAX
            )));
        }

        if self.payload_size < RECORD_SIZE {
            return Err(Error::Config(format!(
                "Payload size must be at least {} bytes",
                RECORD_SIZE
            )));
        }
        if self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(Error::Config(format!(
                "Payload size must not exceed {} bytes",
                MAX_PAYLOAD_SIZE
            )));
        }

        match self.mode {
            Mode::Receiver => {
                if self.tolerance < Duration::from_secs(1) || self.tolerance.subsec_nanos() != 0 {
                    return Err(Error::Config(
                        "Tolerance must be a whole number of seconds, at least 1".to_string(),
                    ));
                }
            }
            Mode::Sender => {
                if self.destination.is_none() {
                    return Err(Error::Config(
                        "Sender requires a destination address".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}
