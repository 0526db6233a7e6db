use crate::clock::Clock;
use crate::config::Config;
use crate::udp_packet::PacketRecord;
use crate::{Error, Result};
use log::{debug, error, info};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

/// Totals for one burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSummary {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

/// The packet source.
///
/// Sends `packet_count` datagrams of `payload_size` bytes back to back, each
/// carrying its sequence number and the clock reading taken just before the
/// send.
///
/// # Examples
///
/// ```no_run
/// use udpprobe::{Config, Sender};
/// use std::net::Ipv4Addr;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::sender(Ipv4Addr::LOCALHOST, 9876).with_packet_count(1000);
/// let summary = Sender::build(config).await?.run().await?;
/// println!("sent {} packets", summary.packets_sent);
/// # Ok(())
/// # }
/// ```
pub struct Sender {
    config: Config,
    target: SocketAddr,
    clock: Arc<dyn Clock>,
}

impl Sender {
    /// Validates `config` and builds its clock.
    ///
    /// TSC calibration blocks the calling thread; inside a runtime use
    /// [`build`](Self::build).
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let clock = config.clock.build()?;
        Self::with_clock(config, clock)
    }

    /// Async counterpart of [`new`](Self::new): the clock is built on the
    /// blocking pool.
    pub async fn build(config: Config) -> Result<Self> {
        config.validate()?;
        let clock = config.clock.build_async().await?;
        Self::with_clock(config, clock)
    }

    /// Same as [`new`](Self::new) with an explicit clock.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let target = config
            .target_addr()
            .ok_or_else(|| Error::Config("Sender requires a destination address".to_string()))?;

        Ok(Self {
            config,
            target,
            clock,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Emits the burst.
    ///
    /// # Errors
    ///
    /// Returns an error if the local socket cannot be created or connected, or
    /// if any send fails. No retry is attempted.
    pub async fn run(&self) -> Result<SendSummary> {
        let local = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| Error::Bind {
                addr: local,
                source,
            })?;
        socket.connect(self.target).await?;

        info!(
            "Sending {} packets of {} bytes to {}",
            self.config.packet_count, self.config.payload_size, self.target
        );

        let mut payload = vec![0u8; self.config.payload_size];
        let mut bytes_sent = 0u64;
        let start = Instant::now();

        for sequence in 0..self.config.packet_count as u32 {
            PacketRecord::new(sequence, self.clock.now()).write_to(&mut payload);

            match socket.send(&payload).await {
                Ok(n) => bytes_sent += n as u64,
                Err(e) => {
                    error!("Error sending UDP packet {}: {}", sequence, e);
                    return Err(e.into());
                }
            }
        }

        let summary = SendSummary {
            packets_sent: self.config.packet_count as u64,
            bytes_sent,
            elapsed: start.elapsed(),
        };
        debug!("Burst finished: {:?}", summary);
        Ok(summary)
    }
}
