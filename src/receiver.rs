use crate::clock::Clock;
use crate::config::Config;
use crate::measurements::ReceiveBuffer;
use crate::report::Report;
use crate::udp_packet::parse_payload;
use crate::{Error, Result};
use log::{debug, error, info, warn};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Scratch space for one datagram; large enough to see oversized ones.
const RECV_BUFFER_SIZE: usize = 65_536;

/// Why the reception loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Every expected datagram arrived
    Complete,
    /// No datagram arrived within the tolerance window
    TimedOut { tolerance: Duration },
    /// Termination was requested through the cancellation token
    Interrupted,
    /// A datagram of the wrong size arrived
    ProtocolError {
        from: SocketAddr,
        expected: usize,
        received: usize,
    },
}

impl Termination {
    /// Whether the run must end with a nonzero exit status.
    pub fn is_failure(&self) -> bool {
        matches!(self, Termination::ProtocolError { .. })
    }

    /// Converts a protocol violation into an [`Error`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Termination::ProtocolError {
                from,
                expected,
                received,
            } => Err(Error::Protocol(format!(
                "Received unknown packet from {}: {} bytes, expected {}",
                from, received, expected
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Complete => write!(f, "complete"),
            Termination::TimedOut { tolerance } => {
                write!(f, "timed out after {} seconds", tolerance.as_secs())
            }
            Termination::Interrupted => write!(f, "interrupted"),
            Termination::ProtocolError { .. } => write!(f, "protocol error"),
        }
    }
}

/// Result of one reception run: the collected buffer and how the run ended.
#[derive(Debug, Clone)]
pub struct Reception {
    pub buffer: ReceiveBuffer,
    pub termination: Termination,
    payload_size: usize,
    clock_hz: u64,
}

impl Reception {
    /// Builds the latency/throughput/loss report for this run.
    pub fn report(&self) -> Report {
        Report::generate(&self.buffer, self.payload_size, self.clock_hz)
    }
}

/// What ended a single bounded wait.
enum Event {
    Datagram(usize, SocketAddr),
    Deadline,
    Cancelled,
}

/// The reception engine.
///
/// Binds the listening port, accepts up to `packet_count` datagrams of exactly
/// `payload_size` bytes, and stamps each one on arrival. The run ends when
/// every slot is filled, when no datagram arrives within the tolerance window
/// after the previous one, when the cancellation token fires, or when a
/// datagram of the wrong size shows up.
///
/// # Examples
///
/// ```no_run
/// use udpprobe::{Config, Receiver};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::receiver(9876).with_packet_count(1000);
/// let receiver = Receiver::bind(config).await?;
///
/// let reception = receiver.run().await?;
/// reception.report().emit(false)?;
/// # Ok(())
/// # }
/// ```
pub struct Receiver {
    config: Config,
    socket: UdpSocket,
    buffer: ReceiveBuffer,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
}

impl Receiver {
    /// Validates `config`, builds its clock, reserves the receive buffer, then
    /// binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the clock cannot be
    /// set up, the receive buffer cannot be allocated, or the address cannot
    /// be bound. Everything but the bind happens before any socket is created.
    pub async fn bind(config: Config) -> Result<Self> {
        config.validate()?;
        let clock = config.clock.build_async().await?;
        Self::bind_with_clock(config, clock).await
    }

    /// Same as [`bind`](Self::bind) with an explicit clock.
    pub async fn bind_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let buffer = ReceiveBuffer::try_new(config.packet_count)?;

        let addr = config.listen_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;

        info!(
            "Receiver listening on {} for {} packets of {} bytes",
            socket.local_addr()?,
            config.packet_count,
            config.payload_size
        );

        Ok(Self {
            config,
            socket,
            buffer,
            clock,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Address the socket is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Token that ends the run early when cancelled.
    ///
    /// Cancelling is treated like an inactivity timeout: the run stops and the
    /// slots collected so far are reported.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the reception loop to termination. Each receiver runs once.
    ///
    /// The inactivity deadline starts with the first accepted datagram and is
    /// rearmed after every one; until then the loop waits for the sender
    /// indefinitely. A sender that delivers K < N packets therefore yields
    /// N − K drops once the tolerance lapses, except for K = 0: with no
    /// datagram at all the run only ends through the cancellation token.
    ///
    /// # Errors
    ///
    /// Returns an error only if the socket itself fails. Wrong-size datagrams
    /// end the run with [`Termination::ProtocolError`] so the partial buffer
    /// can still be reported.
    pub async fn run(mut self) -> Result<Reception> {
        let mut buffer = std::mem::replace(&mut self.buffer, ReceiveBuffer::new(0));
        let mut scratch = vec![0u8; RECV_BUFFER_SIZE];
        let tolerance = self.config.tolerance;

        let termination = loop {
            if buffer.is_full() {
                break Termination::Complete;
            }

            let event = self
                .next_event(&mut scratch, buffer.filled() > 0, tolerance)
                .await?;

            match event {
                Event::Datagram(len, from) if len == self.config.payload_size => {
                    // Validated payload size guarantees a full record prefix.
                    let Some(record) = parse_payload(&scratch[..len]) else {
                        break Termination::ProtocolError {
                            from,
                            expected: self.config.payload_size,
                            received: len,
                        };
                    };
                    let record = record.received_at(self.clock.now());
                    if let Some(index) = buffer.push(record) {
                        debug!(
                            "Slot {}: sequence {} from {} ({} bytes)",
                            index, record.sequence, from, len
                        );
                    }
                }
                Event::Datagram(len, from) => {
                    error!(
                        "Received unknown packet from {}: {} bytes, expected {}",
                        from, len, self.config.payload_size
                    );
                    break Termination::ProtocolError {
                        from,
                        expected: self.config.payload_size,
                        received: len,
                    };
                }
                Event::Deadline => {
                    warn!(
                        "Received no further packets in {} seconds",
                        tolerance.as_secs()
                    );
                    break Termination::TimedOut { tolerance };
                }
                Event::Cancelled => {
                    info!("Reception interrupted");
                    break Termination::Interrupted;
                }
            }
        };

        info!(
            "Reception {}: {} of {} packets",
            termination,
            buffer.filled(),
            buffer.capacity()
        );

        Ok(Reception {
            buffer,
            termination,
            payload_size: self.config.payload_size,
            clock_hz: self.clock.frequency(),
        })
    }

    /// Waits for one datagram, bounded by the deadline once `armed`.
    async fn next_event(
        &self,
        scratch: &mut [u8],
        armed: bool,
        tolerance: Duration,
    ) -> Result<Event> {
        let recv = async {
            if armed {
                time::timeout(tolerance, self.socket.recv_from(scratch)).await
            } else {
                Ok(self.socket.recv_from(scratch).await)
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => Ok(Event::Cancelled),
            result = recv => match result {
                Ok(Ok((len, from))) => Ok(Event::Datagram(len, from)),
                Ok(Err(e)) => {
                    error!("Error receiving UDP packet: {}", e);
                    Err(e.into())
                }
                Err(_) => Ok(Event::Deadline),
            },
        }
    }
}
