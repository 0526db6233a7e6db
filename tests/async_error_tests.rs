use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use udpprobe::clock::{Clock, MonotonicClock};
use udpprobe::udp_packet::{build_payload, RECORD_SIZE};
use udpprobe::{Config, Error, Receiver, Termination};

fn receiver_config(count: usize) -> Config {
    Config::receiver(0)
        .with_bind_addr(Ipv4Addr::LOCALHOST)
        .with_packet_count(count)
        .with_payload_size(64)
        .with_tolerance(Duration::from_secs(1))
}

/// A datagram shorter than the payload size aborts the run
#[tokio::test]
async fn test_short_datagram_is_protocol_error() {
    let receiver = Receiver::bind(receiver_config(4)).await.unwrap();
    let addr = receiver.local_addr().unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    let now = MonotonicClock.now();
    peer.send_to(&build_payload(0, now, 64), addr).unwrap();
    peer.send_to(&[0u8; 10], addr).unwrap();

    let reception = tokio::time::timeout(Duration::from_secs(5), receiver.run())
        .await
        .expect("receiver hung on a malformed datagram")
        .unwrap();

    match &reception.termination {
        Termination::ProtocolError {
            expected, received, ..
        } => {
            assert_eq!(*expected, 64);
            assert_eq!(*received, 10);
        }
        other => panic!("Expected protocol error, got {:?}", other),
    }
    assert!(reception.termination.is_failure());

    // Best-effort report still covers what arrived before the bad datagram.
    let report = reception.report();
    assert_eq!(report.summary.received, 1);
    assert_eq!(report.summary.dropped, 3);

    match reception.termination.into_result() {
        Err(Error::Protocol(message)) => assert!(message.contains("unknown packet")),
        other => panic!("Expected Protocol error, got {:?}", other),
    }
}

/// Oversized datagrams are not silently truncated
#[tokio::test]
async fn test_oversized_datagram_is_protocol_error() {
    let receiver = Receiver::bind(receiver_config(2)).await.unwrap();
    let addr = receiver.local_addr().unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.send_to(&build_payload(0, 1, 65), addr).unwrap();

    let reception = receiver.run().await.unwrap();
    assert!(matches!(
        reception.termination,
        Termination::ProtocolError { received: 65, .. }
    ));
    assert_eq!(reception.buffer.filled(), 0);
}

/// Configuration is rejected before any socket is bound
#[tokio::test]
async fn test_small_payload_rejected_before_bind() {
    // Hold the port so a bind attempt would fail with a different error.
    let occupied = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let config = Config::receiver(port)
        .with_bind_addr(Ipv4Addr::LOCALHOST)
        .with_packet_count(4)
        .with_payload_size(RECORD_SIZE - 1);

    match Receiver::bind(config).await {
        Err(Error::Config(message)) => assert!(message.contains("at least")),
        Err(other) => panic!("Expected configuration error, got {}", other),
        Ok(_) => panic!("Expected configuration error"),
    }
}

/// A port already in use is a setup failure
#[tokio::test]
async fn test_bind_failure_is_reported() {
    let occupied = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let config = Config::receiver(port)
        .with_bind_addr(Ipv4Addr::LOCALHOST)
        .with_packet_count(1);

    assert!(matches!(
        Receiver::bind(config).await,
        Err(Error::Bind { .. })
    ));
}

/// Cancelling mid-run reports the slots collected so far
#[tokio::test]
async fn test_interrupt_reports_partial_buffer() {
    let config = receiver_config(5).with_tolerance(Duration::from_secs(10));
    let receiver = Receiver::bind_with_clock(config, Arc::new(MonotonicClock))
        .await
        .unwrap();
    let addr = receiver.local_addr().unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    for seq in 0..2u32 {
        peer.send_to(&build_payload(seq, MonotonicClock.now(), 64), addr)
            .unwrap();
    }

    let token = receiver.cancellation_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let reception = receiver.run().await.unwrap();
    assert_eq!(reception.termination, Termination::Interrupted);
    assert_eq!(reception.buffer.filled(), 2);
    assert_eq!(reception.report().summary.dropped, 3);
    assert!(reception.termination.into_result().is_ok());
}

/// The inactivity deadline only starts once the first packet has arrived
#[tokio::test]
async fn test_waits_for_first_packet() {
    let receiver = Receiver::bind(receiver_config(3)).await.unwrap();

    let token = receiver.cancellation_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        token.cancel();
    });

    let reception = receiver.run().await.unwrap();
    assert_eq!(reception.termination, Termination::Interrupted);
    assert_eq!(reception.report().summary.throughput_mb_per_sec, 0.0);
}
