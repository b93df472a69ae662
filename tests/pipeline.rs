//! End-to-end packet path: capture hook, chain and built-in NFs
//!
//! Run with: cargo test --test pipeline

use loom_nfv::dataplane::{
    parse_l4, CaptureHook, InputHandler, ManualClock, Netif, NetworkFunction, NfEngine, Packet,
    PacketRef, Verdict, MAX_ALLOWED_PORTS, MAX_RATE_LIMITS,
};
use loom_nfv::protocol::ethernet::FrameBuilder;
use loom_nfv::protocol::ipv4::{Ipv4Builder, Protocol};
use loom_nfv::protocol::tcp::TcpBuilder;
use loom_nfv::protocol::udp::UdpBuilder;
use loom_nfv::protocol::{EtherType, MacAddr};
use loom_nfv::{Error, Result};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
const SERVER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

fn frame(protocol: Protocol, l4: &[u8]) -> Vec<u8> {
    let ip = Ipv4Builder::new()
        .protocol(protocol as u8)
        .src_addr(CLIENT)
        .dst_addr(SERVER)
        .payload(l4)
        .build();
    FrameBuilder::new()
        .dst_mac(MacAddr([0x02, 0, 0, 0, 0, 0x01]))
        .src_mac(MacAddr([0x02, 0, 0, 0, 0, 0x0a]))
        .ethertype(EtherType::Ipv4 as u16)
        .payload(&ip)
        .build()
}

fn tcp(port: u16) -> Vec<u8> {
    frame(
        Protocol::Tcp,
        &TcpBuilder::new()
            .src_port(51000)
            .dst_port(port)
            .build(CLIENT, SERVER),
    )
}

fn udp(port: u16, payload: &[u8]) -> Vec<u8> {
    frame(
        Protocol::Udp,
        &UdpBuilder::new()
            .src_port(51000)
            .dst_port(port)
            .payload(payload)
            .build(CLIENT, SERVER),
    )
}

fn ping() -> Vec<u8> {
    frame(Protocol::Icmp, &[8, 0, 0xf7, 0xff, 0, 0, 0, 0])
}

/// Host stack stand-in
#[derive(Default)]
struct Stack {
    delivered: AtomicUsize,
}

impl InputHandler for Stack {
    fn input(&self, _pkt: Packet, _netif: &Netif) -> Result<()> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct Wire {
    netif: Netif,
    stack: Arc<Stack>,
    engine: Arc<NfEngine>,
}

impl Wire {
    fn new(engine: NfEngine) -> Self {
        let stack = Arc::new(Stack::default());
        let netif = Netif::with_input("eth0", stack.clone());
        let engine = Arc::new(engine);
        CaptureHook::install(&netif, engine.clone()).unwrap();
        Self {
            netif,
            stack,
            engine,
        }
    }

    fn send(&self, data: Vec<u8>) {
        self.netif.deliver(Packet::new(data)).unwrap();
    }

    fn delivered(&self) -> usize {
        self.stack.delivered.load(Ordering::Relaxed)
    }
}

fn verdict(engine: &NfEngine, data: &[u8]) -> Verdict {
    engine.process(&PacketRef::from_bytes(data))
}

#[test]
fn test_truncated_buffers_never_classify() {
    let full = tcp(80);
    for len in 0..full.len() {
        let pkt = PacketRef::new(&full, len);
        if len < 34 + 4 {
            assert_eq!(parse_l4(&pkt), None, "length {}", len);
        }
        // Shorter slices of the same bytes behave the same
        assert_eq!(parse_l4(&PacketRef::from_bytes(&full[..len])), parse_l4(&pkt));
    }
}

#[test]
fn test_empty_chain_allows() {
    let engine = NfEngine::new();
    engine.chain().clear();
    engine.allowlist().add(1).unwrap();

    for data in [tcp(80), udp(53, b"q"), ping(), vec![0u8; 3]] {
        assert_eq!(verdict(&engine, &data), Verdict::Allow);
    }
}

#[test]
fn test_allowlist_policy() {
    let engine = NfEngine::new();
    assert_eq!(verdict(&engine, &tcp(8080)), Verdict::Allow);

    engine.allowlist().add(443).unwrap();
    engine.allowlist().add(443).unwrap();
    assert_eq!(engine.allowlist().list(), vec![443]);

    assert_eq!(verdict(&engine, &tcp(443)), Verdict::Allow);
    assert_eq!(verdict(&engine, &udp(443, b"quic")), Verdict::Allow);
    assert_eq!(verdict(&engine, &tcp(80)), Verdict::Deny);
    assert_eq!(verdict(&engine, &udp(53, b"")), Verdict::Deny);
    assert_eq!(verdict(&engine, &ping()), Verdict::Allow);

    engine.allowlist().clear();
    assert_eq!(verdict(&engine, &tcp(80)), Verdict::Allow);
}

#[test]
fn test_malformed_tcp_still_filtered() {
    let engine = NfEngine::new();
    engine.allowlist().add(22).unwrap();

    // Data offset of zero words
    let mut bad_offset = tcp(80);
    bad_offset[14 + 20 + 12] = 0;
    assert_eq!(verdict(&engine, &bad_offset), Verdict::Deny);

    // Only 8 bytes of TCP header survive
    let full = tcp(80);
    let truncated = &full[..14 + 20 + 8];
    assert_eq!(verdict(&engine, truncated), Verdict::Deny);

    let ssh = tcp(22);
    assert_eq!(verdict(&engine, &ssh[..14 + 20 + 4]), Verdict::Allow);
    assert_eq!(engine.chain().list()[1].dropped, 2);
}

#[test]
fn test_rate_limit_window() {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let engine = NfEngine::with_clock(clock.clone());
    engine.rate_limiter().set_limit(80, 3).unwrap();

    let data = tcp(80);
    for _ in 0..3 {
        assert_eq!(verdict(&engine, &data), Verdict::Allow);
    }
    assert_eq!(verdict(&engine, &data), Verdict::Deny);
    assert_eq!(verdict(&engine, &tcp(81)), Verdict::Allow);
    assert_eq!(engine.rate_limiter().list()[0].count, 3);

    clock.advance(1);
    assert_eq!(verdict(&engine, &data), Verdict::Allow);
    assert_eq!(engine.rate_limiter().list()[0].count, 1);
}

#[test]
fn test_chain_order_decides_attribution() {
    let clock = Arc::new(ManualClock::new(100));

    // rate_limiter -> allowlist
    let forward = NfEngine::with_clock(clock.clone());
    // allowlist -> rate_limiter
    let reversed = NfEngine::with_clock(clock.clone());
    reversed.chain().remove("rate_limiter").unwrap();
    reversed.add_builtin("rate_limiter").unwrap();

    for engine in [&forward, &reversed] {
        engine.rate_limiter().set_limit(80, 10).unwrap();
        engine.allowlist().add(22).unwrap();
    }

    let data = tcp(80);
    assert_eq!(verdict(&forward, &data), Verdict::Deny);
    assert_eq!(verdict(&reversed, &data), Verdict::Deny);

    // Same outcome, different side effects
    assert_eq!(forward.rate_limiter().list()[0].count, 1);
    assert_eq!(reversed.rate_limiter().list()[0].count, 0);

    let forward_chain = forward.chain().list();
    assert_eq!(forward_chain[0].evaluated, 1);
    assert_eq!(forward_chain[1].dropped, 1);

    let reversed_chain = reversed.chain().list();
    assert_eq!(reversed_chain[0].name, "allowlist");
    assert_eq!(reversed_chain[0].dropped, 1);
    assert_eq!(reversed_chain[1].evaluated, 0);
}

#[test]
fn test_disabled_entry_has_no_side_effects() {
    let clock = Arc::new(ManualClock::new(5));
    let engine = NfEngine::with_clock(clock);
    engine.rate_limiter().set_limit(53, 1).unwrap();
    engine.chain().set_enabled("rate_limiter", false).unwrap();

    let data = udp(53, b"query");
    assert_eq!(verdict(&engine, &data), Verdict::Allow);
    assert_eq!(verdict(&engine, &data), Verdict::Allow);
    assert_eq!(engine.rate_limiter().list()[0].count, 0);
    assert_eq!(engine.chain().list()[0].evaluated, 0);

    engine.chain().set_enabled("rate_limiter", true).unwrap();
    assert_eq!(verdict(&engine, &data), Verdict::Allow);
    assert_eq!(verdict(&engine, &data), Verdict::Deny);
}

#[test]
fn test_stats_invariant() {
    let clock = Arc::new(ManualClock::new(0));
    let wire = Wire::new(NfEngine::with_clock(clock));
    wire.engine.rate_limiter().set_limit(53, 2).unwrap();
    wire.engine.allowlist().add(53).unwrap();
    wire.engine.allowlist().add(443).unwrap();

    let traffic = vec![
        udp(53, b"a"),
        udp(53, b"bb"),
        udp(53, b"ccc"),
        tcp(443),
        tcp(80),
        ping(),
        vec![0xffu8; 20],
        tcp(9000),
    ];
    let bytes: usize = traffic.iter().map(Vec::len).sum();
    let n = traffic.len() as u64;
    for data in traffic {
        wire.send(data);
    }

    let stats = wire.engine.stats();
    assert_eq!(stats.total_packets, n);
    assert_eq!(stats.passed_packets + stats.dropped_packets, n);
    assert_eq!(stats.total_bytes, bytes as u64);
    assert_eq!(stats.dropped_packets, 2);
    assert_eq!(stats.bypassed_packets, 1);
    assert_eq!(wire.delivered() as u64, stats.passed_packets);
}

#[test]
fn test_control_port_bypasses_deny_all() {
    let wire = Wire::new(NfEngine::new());
    let deny_all: Arc<dyn NetworkFunction> = Arc::new(|_: &PacketRef<'_>| Verdict::Deny);
    wire.engine.chain().add("deny_all", deny_all).unwrap();

    wire.send(tcp(9000));
    wire.send(tcp(9000));
    wire.send(udp(9000, b"not control"));
    wire.send(tcp(22));

    assert_eq!(wire.delivered(), 2);
    let stats = wire.engine.stats();
    assert_eq!(stats.passed_packets, 2);
    assert_eq!(stats.bypassed_packets, 2);
    assert_eq!(stats.dropped_packets, 2);
}

#[test]
fn test_capacity_limits() {
    let engine = NfEngine::new();

    for port in 1..=MAX_RATE_LIMITS as u16 {
        engine.rate_limiter().set_limit(port, 100).unwrap();
    }
    let err = engine.rate_limiter().set_limit(5000, 1).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { max, .. } if max == MAX_RATE_LIMITS));
    assert_eq!(engine.rate_limiter().len(), MAX_RATE_LIMITS);
    // Updating an existing rule still works when full
    engine.rate_limiter().set_limit(1, 5).unwrap();
    assert_eq!(engine.rate_limiter().list()[0].pps, 5);

    for port in 1..=MAX_ALLOWED_PORTS as u16 {
        engine.allowlist().add(port).unwrap();
    }
    let err = engine.allowlist().add(5000).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { max, .. } if max == MAX_ALLOWED_PORTS));
    assert_eq!(engine.allowlist().len(), MAX_ALLOWED_PORTS);
    assert_eq!(engine.allowlist().list().last(), Some(&(MAX_ALLOWED_PORTS as u16)));
}

#[test]
fn test_reconfigure_while_processing() {
    let engine = Arc::new(NfEngine::new());
    let data = Arc::new(tcp(80));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let data = data.clone();
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    engine.process(&PacketRef::from_bytes(&data));
                }
            })
        })
        .collect();

    for i in 0..200u16 {
        engine.allowlist().add(1000 + (i % 32)).unwrap();
        engine.chain().set_enabled("allowlist", i % 2 == 0).unwrap();
        if i % 50 == 0 {
            engine.chain().remove("rate_limiter").unwrap();
            engine.add_builtin("rate_limiter").unwrap();
        }
        engine.allowlist().remove(1000 + (i % 32)).unwrap();
    }

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(engine.chain().len(), 2);
}
