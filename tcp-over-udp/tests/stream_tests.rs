//! Integration tests for the reliable stream.
//!
//! The loopback tests bind real `tokio::net::UdpSocket`s; the others run two
//! [`Connection`]s over the in-memory simulator so faults can be injected
//! precisely.  Every blocking `recv` is wrapped in a timeout so a protocol
//! bug fails the test instead of hanging it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tcp_over_udp::{
    simulator::{SimChannel, SimulatorConfig},
    Config, Connection, Marker,
};

const WAIT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reserve a loopback port by binding and immediately releasing it.
fn free_port() -> SocketAddr {
    let sock = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind probe socket");
    sock.local_addr().expect("probe local_addr")
}

async fn recv_within(conn: &Connection, max_len: usize) -> Vec<u8> {
    tokio::time::timeout(WAIT, conn.recv(max_len))
        .await
        .expect("recv timed out")
        .expect("recv failed")
}

fn sim_config() -> Config {
    Config {
        retransmit_timeout: 5,
        heartbeat_timeout: 15,
        ..Config::default()
    }
}

// ---------------------------------------------------------------------------
// Test 1: hello over loopback on fixed ports
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hello_over_fixed_loopback_ports() {
    let a_addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
    let b_addr: SocketAddr = "127.0.0.1:9002".parse().unwrap();

    let mut a = Connection::new("A", a_addr, b_addr).await.expect("bind A");
    let mut b = Connection::new("B", b_addr, a_addr).await.expect("bind B");

    assert_eq!(a.send(b"hello"), 5 + 9);
    assert_eq!(recv_within(&b, 5).await, b"hello");

    a.close().await;
    b.close().await;
}

// ---------------------------------------------------------------------------
// Test 2: 70 000-byte message fragments and reassembles over UDP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn large_message_over_loopback() {
    let a_addr = free_port();
    let b_addr = free_port();
    let a = Connection::new("A", a_addr, b_addr).await.expect("bind A");
    let b = Connection::new("B", b_addr, a_addr).await.expect("bind B");

    let data: Vec<u8> = (0..70_000u32).map(|i| (i % 253) as u8).collect();
    assert_eq!(a.send(&data), 70_000 + 3 * 9);

    let got = recv_within(&b, 100_000).await;
    assert_eq!(got.len(), 70_000);
    assert_eq!(got, data);
}

// ---------------------------------------------------------------------------
// Test 3: fragment layout on the wire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn large_message_fragment_layout() {
    let (ca, cb) = SimChannel::pair(SimulatorConfig::default());
    let tap = ca.clone();
    let a = Connection::with_channel("A", ca, sim_config()).unwrap();
    let b = Connection::with_channel("B", cb, sim_config()).unwrap();

    let data: Vec<u8> = (0..70_000u32).map(|i| (i % 7) as u8).collect();
    a.send(&data);
    assert_eq!(recv_within(&b, usize::MAX).await, data);

    let mut seen = std::collections::HashSet::new();
    let first_tx: Vec<_> = tap
        .sent_packets()
        .into_iter()
        .filter(|p| !p.is_pure_ack() && seen.insert(p.id))
        .collect();
    let ids: Vec<u32> = first_tx.iter().map(|p| p.id).collect();
    let sizes: Vec<usize> = first_tx.iter().map(|p| p.payload.len()).collect();
    let markers: Vec<Marker> = first_tx.iter().map(|p| p.marker).collect();

    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(sizes, vec![32_767, 32_767, 4_466]);
    assert_eq!(markers, vec![Marker::More, Marker::More, Marker::Last]);
}

// ---------------------------------------------------------------------------
// Test 4: many messages arrive in order, exactly once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn many_messages_in_order_over_loopback() {
    const COUNT: usize = 200;

    let a_addr = free_port();
    let b_addr = free_port();
    let a = Connection::new("A", a_addr, b_addr).await.expect("bind A");
    let b = Connection::new("B", b_addr, a_addr).await.expect("bind B");

    for i in 0..COUNT {
        a.send(format!("msg-{i:04}").as_bytes());
    }
    for i in 0..COUNT {
        let expected = format!("msg-{i:04}");
        assert_eq!(recv_within(&b, 1024).await, expected.as_bytes(), "message {i}");
    }
    assert!(b.try_recv(1024).is_none(), "unexpected extra message");
}

// ---------------------------------------------------------------------------
// Test 5: recv bounds the read and keeps the remainder
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recv_max_len_splits_message() {
    let (ca, cb) = SimChannel::pair(SimulatorConfig::default());
    let a = Connection::with_channel("A", ca, sim_config()).unwrap();
    let b = Connection::with_channel("B", cb, sim_config()).unwrap();

    a.send(b"abcdefghij");
    a.send(b"next");
    assert_eq!(recv_within(&b, 4).await, b"abcd");
    assert_eq!(recv_within(&b, 4).await, b"efgh");
    assert_eq!(recv_within(&b, 4).await, b"ij");
    assert_eq!(recv_within(&b, 4).await, b"next");
}

// ---------------------------------------------------------------------------
// Test 6: a dropped packet is recovered
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropped_packet_recovered() {
    let (ca, cb) = SimChannel::pair(SimulatorConfig::default());
    ca.drop_next(1);
    let tap = ca.clone();
    let a = Connection::with_channel("A", ca, sim_config()).unwrap();
    let b = Connection::with_channel("B", cb, sim_config()).unwrap();

    a.send(b"survives");
    assert_eq!(recv_within(&b, 64).await, b"survives");
    assert_eq!(tap.dropped(), 1);
    assert!(a.stats().retransmits >= 1);
}

// ---------------------------------------------------------------------------
// Test 7: lossy, duplicating, reordering network
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lossy_network_delivers_everything_once() {
    const COUNT: usize = 50;

    let (ca, cb) = SimChannel::pair(SimulatorConfig {
        loss_rate: 0.25,
        duplicate_rate: 0.15,
        reorder_rate: 0.15,
        seed: 2024,
    });
    let config = Config {
        max_fragment_size: 64,
        recv_buffer_size: 64 + 9,
        ..sim_config()
    };
    let a = Connection::with_channel("A", ca, config.clone()).unwrap();
    let b = Connection::with_channel("B", cb, config).unwrap();

    let msgs: Vec<Vec<u8>> = (0..COUNT)
        .map(|i| (0..(10 + i * 13)).map(|j| (i ^ j) as u8).collect())
        .collect();
    for m in &msgs {
        a.send(m);
    }
    for (i, m) in msgs.iter().enumerate() {
        assert_eq!(&recv_within(&b, usize::MAX).await, m, "message {i}");
    }
    assert!(b.stats().duplicates > 0 || b.stats().out_of_order > 0);
}

// ---------------------------------------------------------------------------
// Test 8: concurrent senders get unique, gap-free, increasing ids
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_senders_get_unique_ids() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 40;
    const TOTAL: usize = THREADS * PER_THREAD;

    let (ca, cb) = SimChannel::pair(SimulatorConfig::default());
    let tap = ca.clone();
    let config = Config {
        max_fragment_size: 16,
        recv_buffer_size: 16 + 9,
        recv_batch: 64,
        ..sim_config()
    };
    let a = Arc::new(Connection::with_channel("A", ca, config.clone()).unwrap());
    let b = Connection::with_channel("B", cb, config).unwrap();

    let mut senders = Vec::new();
    for t in 0..THREADS {
        let a = a.clone();
        senders.push(tokio::task::spawn_blocking(move || {
            for i in 0..PER_THREAD {
                // Some messages span two fragments.
                let msg = format!("t{t}-{i:03}{}", "x".repeat(i % 12));
                a.send(msg.as_bytes());
            }
        }));
    }
    for s in senders {
        s.await.unwrap();
    }

    let mut received = Vec::with_capacity(TOTAL);
    for _ in 0..TOTAL {
        received.push(String::from_utf8(recv_within(&b, usize::MAX).await).unwrap());
    }

    // Per-thread order is preserved.
    for t in 0..THREADS {
        let prefix = format!("t{t}-");
        let seq: Vec<usize> = received
            .iter()
            .filter(|m| m.starts_with(&prefix))
            .map(|m| m[prefix.len()..prefix.len() + 3].parse().unwrap())
            .collect();
        assert_eq!(seq, (0..PER_THREAD).collect::<Vec<_>>(), "thread {t}");
    }

    // First transmissions carry ids 1, 2, 3, ... with no gaps or repeats.
    let mut seen = std::collections::HashSet::new();
    let first_tx: Vec<u32> = tap
        .sent_packets()
        .into_iter()
        .filter(|p| !p.is_pure_ack() && seen.insert(p.id))
        .map(|p| p.id)
        .collect();
    let expected: Vec<u32> = (1..=first_tx.len() as u32).collect();
    assert_eq!(first_tx, expected);
    assert_eq!(a.stats().next_id as usize, first_tx.len() + 1);
}

// ---------------------------------------------------------------------------
// Test 9: binding an address already in use fails synchronously
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bind_conflict_is_reported() {
    let holder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let taken = holder.local_addr().unwrap();
    let res = Connection::new("A", taken, free_port()).await;
    assert!(res.is_err());
}
