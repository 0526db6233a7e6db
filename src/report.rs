//! Latency, throughput and loss report derived from a [`ReceiveBuffer`].
//!
//! Report generation is pure: the same buffer, payload size and clock
//! frequency always produce the same [`Report`], and the buffer is never
//! modified.
//!
//! # Output
//!
//! Per-packet lines (suppressed in quiet mode) go to one writer:
//!
//! ```text
//! <seq> <send ticks> <recv ticks> (<latency ticks>) <latency µs>
//! ```
//!
//! The two summary lines always go to the other:
//!
//! ```text
//! Average throughput: 1234 MB/s = 9.87 Gbit/s
//! Dropped packets: 7 of 10 (70.0%)
//! ```
//!
//! # Examples
//!
//! ```
//! use udpprobe::measurements::ReceiveBuffer;
//! use udpprobe::report::Report;
//! use udpprobe::udp_packet::PacketRecord;
//!
//! let mut buffer = ReceiveBuffer::new(2);
//! buffer.push(PacketRecord::new(0, 1_000).received_at(3_000));
//!
//! let report = Report::generate(&buffer, 64, 1_000_000_000);
//! assert_eq!(report.summary.dropped, 1);
//! assert_eq!(report.summary.drop_percent_display(), "50.0%");
//! ```

use crate::clock::{ticks_to_duration, ticks_to_micros};
use crate::measurements::ReceiveBuffer;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Latency of one received packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketLatency {
    pub sequence: u32,
    pub send_timestamp: u64,
    pub receive_timestamp: u64,
    pub latency_ticks: u64,
    pub latency_us: u64,
}

/// Aggregate figures for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub expected: usize,
    pub received: usize,
    pub dropped: usize,
    pub drop_percent: f64,
    pub payload_size: usize,
    pub clock_hz: u64,
    pub elapsed_secs: f64,
    pub throughput_mb_per_sec: f64,
    pub throughput_gbit_per_sec: f64,
}

impl Summary {
    /// Drop percentage with one decimal, e.g. `"70.0%"`.
    pub fn drop_percent_display(&self) -> String {
        format!("{:.1}%", self.drop_percent)
    }

    /// Writes the throughput and drop lines.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "Average throughput: {:.0} MB/s = {:.2} Gbit/s",
            self.throughput_mb_per_sec, self.throughput_gbit_per_sec
        )?;
        writeln!(
            out,
            "Dropped packets: {} of {} ({})",
            self.dropped,
            self.expected,
            self.drop_percent_display()
        )
    }
}

/// Complete report for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub summary: Summary,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub packets: Vec<PacketLatency>,
}

impl Report {
    /// Derives the report from `buffer`.
    ///
    /// Throughput counts `received × payload_size` bytes over the span from
    /// the first filled slot's send timestamp to the last filled slot's
    /// receive timestamp. It is zero when nothing was received or the span
    /// is empty.
    pub fn generate(buffer: &ReceiveBuffer, payload_size: usize, clock_hz: u64) -> Self {
        let packets: Vec<PacketLatency> = buffer
            .records()
            .map(|(_, record)| {
                let latency_ticks = record
                    .receive_timestamp
                    .saturating_sub(record.send_timestamp);
                PacketLatency {
                    sequence: record.sequence,
                    send_timestamp: record.send_timestamp,
                    receive_timestamp: record.receive_timestamp,
                    latency_ticks,
                    latency_us: ticks_to_micros(latency_ticks, clock_hz),
                }
            })
            .collect();

        let expected = buffer.capacity();
        let received = buffer.filled();
        let dropped = buffer.dropped();
        let drop_percent = if expected > 0 {
            dropped as f64 * 100.0 / expected as f64
        } else {
            0.0
        };

        let elapsed_secs = match (buffer.first_filled(), buffer.last_filled()) {
            (Some((_, first)), Some((_, last))) => {
                let ticks = last.receive_timestamp.saturating_sub(first.send_timestamp);
                ticks_to_duration(ticks, clock_hz).as_secs_f64()
            }
            _ => 0.0,
        };

        let throughput_mb_per_sec = if received > 0 && elapsed_secs > 0.0 {
            (received as f64 * payload_size as f64) / elapsed_secs / 1_000_000.0
        } else {
            0.0
        };

        Self {
            summary: Summary {
                expected,
                received,
                dropped,
                drop_percent,
                payload_size,
                clock_hz,
                elapsed_secs,
                throughput_mb_per_sec,
                throughput_gbit_per_sec: throughput_mb_per_sec * 8.0 / 1000.0,
            },
            packets,
        }
    }

    /// Writes one line per received packet.
    pub fn write_packets<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for p in &self.packets {
            writeln!(
                out,
                "{:5} {} {} ({}) {}",
                p.sequence, p.send_timestamp, p.receive_timestamp, p.latency_ticks, p.latency_us
            )?;
        }
        Ok(())
    }

    /// Writes the two summary lines.
    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.summary.write_to(out)
    }

    /// Serializes the report; packet rows are omitted when `quiet` is set.
    pub fn to_json(&self, quiet: bool) -> Result<String> {
        let json = if quiet {
            serde_json::to_string_pretty(&Report {
                summary: self.summary.clone(),
                packets: Vec::new(),
            })?
        } else {
            serde_json::to_string_pretty(self)?
        };
        Ok(json)
    }

    /// Prints packet lines to stdout (unless `quiet`) and the summary to stderr.
    pub fn emit(&self, quiet: bool) -> io::Result<()> {
        if !quiet {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            self.write_packets(&mut out)?;
            out.flush()?;
        }

        let stderr = io::stderr();
        let mut err = stderr.lock();
        self.write_summary(&mut err)
    }
}
