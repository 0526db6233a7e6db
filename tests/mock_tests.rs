// Engine tests driven by a scripted clock so timestamps and latencies are exact

use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use udpprobe::clock::Clock;
use udpprobe::udp_packet::build_payload;
use udpprobe::{Config, Receiver, Termination};

/// Clock that advances by a fixed step on every reading
struct SteppingClock {
    next: AtomicU64,
    step: u64,
    hz: u64,
}

impl SteppingClock {
    fn new(start: u64, step: u64, hz: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            step,
            hz,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> u64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }

    fn frequency(&self) -> u64 {
        self.hz
    }
}

fn receiver_config(count: usize, payload: usize) -> Config {
    Config::receiver(0)
        .with_bind_addr(Ipv4Addr::LOCALHOST)
        .with_packet_count(count)
        .with_payload_size(payload)
        .with_tolerance(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepping_clock() {
        let clock = SteppingClock::new(10, 5, 1_000);
        assert_eq!(clock.now(), 10);
        assert_eq!(clock.now(), 15);
        assert_eq!(clock.to_duration(500), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_latencies_use_receiver_clock() {
        // 1 MHz: one tick per microsecond.
        let clock = Arc::new(SteppingClock::new(1_000, 1_000, 1_000_000));
        let receiver = Receiver::bind_with_clock(receiver_config(3, 64), clock)
            .await
            .unwrap();
        let addr = receiver.local_addr().unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        for (seq, tx) in [(0u32, 100u64), (1, 200), (2, 300)] {
            peer.send_to(&build_payload(seq, tx, 64), addr).unwrap();
        }

        let reception = receiver.run().await.unwrap();
        assert_eq!(reception.termination, Termination::Complete);

        let receive: Vec<u64> = reception
            .buffer
            .records()
            .map(|(_, r)| r.receive_timestamp)
            .collect();
        assert_eq!(receive, vec![1_000, 2_000, 3_000]);

        let report = reception.report();
        let latencies: Vec<u64> = report.packets.iter().map(|p| p.latency_us).collect();
        assert_eq!(latencies, vec![900, 1_800, 2_700]);

        // 3 × 64 bytes over 2900 µs.
        let expected = 3.0 * 64.0 / 0.0029 / 1_000_000.0;
        assert!((report.summary.throughput_mb_per_sec - expected).abs() < 1e-9);
        assert_eq!(report.summary.clock_hz, 1_000_000);
    }

    #[tokio::test]
    async fn test_packet_lines_are_exact() {
        let clock = Arc::new(SteppingClock::new(5_000, 1, 1_000_000));
        let receiver = Receiver::bind_with_clock(receiver_config(2, 32), clock)
            .await
            .unwrap();
        let addr = receiver.local_addr().unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(&build_payload(0, 4_000, 32), addr).unwrap();
        peer.send_to(&build_payload(1, 4_500, 32), addr).unwrap();

        let reception = receiver.run().await.unwrap();
        let report = reception.report();

        let mut out = Vec::new();
        report.write_packets(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "    0 4000 5000 (1000) 1000\n    1 4500 5001 (501) 501\n"
        );
    }

    #[tokio::test]
    async fn test_payload_sequence_does_not_place_records() {
        let clock = Arc::new(SteppingClock::new(10, 10, 1_000_000));
        let receiver = Receiver::bind_with_clock(receiver_config(3, 64), clock)
            .await
            .unwrap();
        let addr = receiver.local_addr().unwrap();

        // Arrival order wins over the sequence field.
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        for seq in [2u32, 0, 1] {
            peer.send_to(&build_payload(seq, 1, 64), addr).unwrap();
        }

        let reception = receiver.run().await.unwrap();
        let order: Vec<u32> = reception.buffer.slots().flatten().map(|r| r.sequence).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }
}
