use clap::{Parser, Subcommand};
use std::net::Ipv4Addr;
use std::time::Duration;
use udpprobe::clock::ClockSource;
use udpprobe::config::DEFAULT_PORT;
use udpprobe::udp_packet::RECORD_SIZE;
use udpprobe::{Config, Receiver, Sender};

#[derive(Parser)]
#[command(name = "udpprobe")]
#[command(about = "UDP latency, throughput and packet-loss meter", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for a burst and report latency, throughput and drops
    #[command(alias = "rx")]
    Receive {
        /// Number of packets to expect
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Payload size in bytes
        #[arg(short = 's', long, default_value_t = RECORD_SIZE)]
        size: usize,

        /// Seconds to wait for the next packet before giving up. Not applied
        /// before the first packet: that wait is unbounded until Ctrl-C
        #[arg(short = 't', long, default_value = "2")]
        tolerance: u64,

        /// Suppress per-packet output
        #[arg(short, long)]
        quiet: bool,

        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Bind to specific IPv4 address
        #[arg(short, long)]
        bind: Option<Ipv4Addr>,

        /// Print the report as JSON on stdout; the summary lines still go to
        /// stderr
        #[arg(short = 'J', long)]
        json: bool,

        /// Timestamp source (monotonic or tsc)
        #[arg(long, default_value = "monotonic")]
        clock: String,
    },

    /// Send a burst of timestamped packets
    #[command(alias = "tx")]
    Send {
        /// Destination IPv4 address
        destination: String,

        /// Number of packets to send
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Payload size in bytes
        #[arg(short = 's', long, default_value_t = RECORD_SIZE)]
        size: usize,

        /// Destination port
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Timestamp source (monotonic or tsc)
        #[arg(long, default_value = "monotonic")]
        clock: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Receive {
            count,
            size,
            tolerance,
            quiet,
            port,
            bind,
            json,
            clock,
        } => {
            let mut config = Config::receiver(port)
                .with_packet_count(count)
                .with_payload_size(size)
                .with_tolerance(Duration::from_secs(tolerance))
                .with_quiet(quiet)
                .with_json(json)
                .with_clock(clock.parse::<ClockSource>()?);

            if let Some(bind_addr) = bind {
                config = config.with_bind_addr(bind_addr);
            }

            let receiver = Receiver::bind(config).await?;

            let cancel_token = receiver.cancellation_token().clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel_token.cancel();
                }
            });

            let reception = receiver.run().await?;
            let report = reception.report();

            if json {
                println!("{}", report.to_json(quiet)?);
                report.emit(true)?;
            } else {
                report.emit(quiet)?;
            }

            reception.termination.into_result()?;
        }

        Commands::Send {
            destination,
            count,
            size,
            port,
            clock,
        } => {
            let destination: Ipv4Addr = destination
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", destination))?;
            println!("Sending to: {}", destination);

            let config = Config::sender(destination, port)
                .with_packet_count(count)
                .with_payload_size(size)
                .with_clock(clock.parse::<ClockSource>()?);

            let summary = Sender::build(config).await?.run().await?;
            log::info!(
                "Sent {} packets ({} bytes) in {:.3} ms",
                summary.packets_sent,
                summary.bytes_sent,
                summary.elapsed.as_secs_f64() * 1000.0
            );
        }
    }

    Ok(())
}
