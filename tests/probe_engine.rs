//! Ping and traceroute behaviour against scripted echo transports.
//!
//! No packets are sent: `FakeTransport` answers each TTL from a script and
//! records every request it receives, `FakeResolver` stands in for DNS.
//!
//! Run with: `cargo test --test probe_engine`

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use netdiag::model::ProbeStatus;
use netdiag::probe::{
    self, DEFAULT_PAYLOAD_LEN, EchoReply, EchoRequest, EchoStatus, EchoTransport, HostResolver,
    TransportError, TransportErrorKind,
};

#[derive(Debug, Clone, PartialEq)]
struct Sent {
    target: String,
    ttl: Option<u8>,
    timeout: Duration,
    payload_len: usize,
    dont_fragment: bool,
}

/// Replies per TTL from `script`; TTLs without an entry time out.
/// Requests without a TTL use `default`.
struct FakeTransport {
    script: HashMap<u8, Result<EchoReply, TransportError>>,
    default: Result<EchoReply, TransportError>,
    ipv6: bool,
    sent: Mutex<Vec<Sent>>,
}

impl FakeTransport {
    fn new() -> Self {
        Self {
            script: HashMap::new(),
            default: Ok(timed_out()),
            ipv6: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    fn answering(default: Result<EchoReply, TransportError>) -> Self {
        Self {
            default,
            ..Self::new()
        }
    }

    fn on_ttl(mut self, ttl: u8, outcome: Result<EchoReply, TransportError>) -> Self {
        self.script.insert(ttl, outcome);
        self
    }

    fn ipv4_only(mut self) -> Self {
        self.ipv6 = false;
        self
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

impl EchoTransport for FakeTransport {
    fn send_echo(&self, request: &EchoRequest<'_>) -> Result<EchoReply, TransportError> {
        self.sent.lock().unwrap().push(Sent {
            target: request.target.to_string(),
            ttl: request.ttl,
            timeout: request.timeout,
            payload_len: request.payload.len(),
            dont_fragment: request.dont_fragment,
        });
        match request.ttl {
            Some(ttl) => self.script.get(&ttl).cloned().unwrap_or(Ok(timed_out())),
            None => self.default.clone(),
        }
    }

    fn supports_ipv6(&self) -> bool {
        self.ipv6
    }
}

struct FakeResolver {
    answer: Result<Vec<IpAddr>, String>,
    calls: Mutex<usize>,
}

impl FakeResolver {
    fn new(answer: Result<Vec<IpAddr>, String>) -> Self {
        Self {
            answer,
            calls: Mutex::new(0),
        }
    }
}

impl HostResolver for FakeResolver {
    fn lookup(&self, _host: &str) -> Result<Vec<IpAddr>, String> {
        *self.calls.lock().unwrap() += 1;
        self.answer.clone()
    }
}

fn no_lookup() -> FakeResolver {
    FakeResolver::new(Err("must not be called".into()))
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn timed_out() -> EchoReply {
    EchoReply {
        status: EchoStatus::TimedOut,
        address: None,
        roundtrip_ms: None,
    }
}

fn ttl_expired(from: &str, rtt: u64) -> Result<EchoReply, TransportError> {
    Ok(EchoReply {
        status: EchoStatus::TtlExpired,
        address: Some(ip(from)),
        roundtrip_ms: Some(rtt),
    })
}

fn success(from: &str, rtt: u64) -> Result<EchoReply, TransportError> {
    Ok(EchoReply {
        status: EchoStatus::Success,
        address: Some(ip(from)),
        roundtrip_ms: Some(rtt),
    })
}

const TIMEOUT: Duration = Duration::from_millis(1000);

// ---------------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------------

#[test]
fn ping_blank_target_is_invalid_and_sends_nothing() {
    let transport = FakeTransport::answering(success("8.8.8.8", 10));
    let result = probe::ping(&transport, &no_lookup(), "", TIMEOUT);
    assert_eq!(result.status, ProbeStatus::InvalidTarget);
    assert_eq!(result.roundtrip_time_ms, None);
    assert!(transport.sent().is_empty());
}

#[test]
fn ping_timeout_has_no_roundtrip() {
    let transport = FakeTransport::new();
    let result = probe::ping(&transport, &no_lookup(), "192.0.2.1", Duration::from_millis(200));
    assert_eq!(result.status, ProbeStatus::TimedOut);
    assert_eq!(result.roundtrip_time_ms, None);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].timeout, Duration::from_millis(200));
    assert_eq!(sent[0].ttl, None);
    assert_eq!(sent[0].payload_len, DEFAULT_PAYLOAD_LEN);
}

#[test]
fn ping_success_reports_roundtrip() {
    let transport = FakeTransport::answering(success("8.8.8.8", 17));
    let result = probe::ping(&transport, &no_lookup(), "8.8.8.8", TIMEOUT);
    assert_eq!(result.status, ProbeStatus::Success);
    assert_eq!(result.roundtrip_time_ms, Some(17));
    assert_eq!(result.error, None);
}

#[test]
fn ping_is_repeatable() {
    let transport = FakeTransport::answering(success("8.8.8.8", 9));
    let first = probe::ping(&transport, &no_lookup(), "8.8.8.8", TIMEOUT);
    let second = probe::ping(&transport, &no_lookup(), "8.8.8.8", TIMEOUT);
    assert_eq!(first, second);
    assert_eq!(transport.sent().len(), 2);
}

#[test]
fn ping_hostname_reports_target_not_gateway() {
    let transport = FakeTransport::answering(Ok(EchoReply {
        status: EchoStatus::DestinationUnreachable,
        address: Some(ip("192.168.1.1")),
        roundtrip_ms: Some(2),
    }));
    let resolver = FakeResolver::new(Ok(vec![ip("93.184.216.34")]));

    let result = probe::ping(&transport, &resolver, "example.com", Duration::from_millis(500));

    assert_eq!(result.status, ProbeStatus::Unreachable);
    assert_eq!(result.resolved_address, Some(ip("93.184.216.34")));
    assert_eq!(transport.sent()[0].target, "93.184.216.34");
}

#[test]
fn ping_transport_failure_becomes_status() {
    let transport = FakeTransport::answering(Err(TransportError::new(
        TransportErrorKind::Socket,
        "Operation not permitted (os error 1)",
    )));
    let result = probe::ping(&transport, &no_lookup(), "10.1.1.1", TIMEOUT);
    assert_eq!(result.status, ProbeStatus::TransportError);
    assert_eq!(result.error.as_deref(), Some("Operation not permitted"));
    assert_eq!(result.roundtrip_time_ms, None);
}

// ---------------------------------------------------------------------------
// Traceroute
// ---------------------------------------------------------------------------

#[test]
fn trace_stops_at_destination() {
    let transport = FakeTransport::new()
        .on_ttl(1, ttl_expired("192.168.1.1", 1))
        .on_ttl(2, ttl_expired("10.20.0.1", 6))
        .on_ttl(3, ttl_expired("72.14.215.85", 9))
        .on_ttl(4, success("8.8.8.8", 11));
    let resolver = FakeResolver::new(Err("must not be called".into()));

    let run = probe::traceroute(&transport, &resolver, "8.8.8.8", 30, TIMEOUT);

    assert_eq!(run.hops.len(), 4);
    let numbers: Vec<u32> = run.hops.iter().map(|h| h.hop_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(run.hops[3].status, ProbeStatus::Success);
    assert_eq!(run.hops[3].address, Some(ip("8.8.8.8")));
    assert_eq!(run.hops[0].roundtrip_time_ms, Some(1));
    assert!(run.reached_target());
    assert_eq!(*resolver.calls.lock().unwrap(), 0);

    let ttls: Vec<Option<u8>> = transport.sent().iter().map(|s| s.ttl).collect();
    assert_eq!(ttls, vec![Some(1), Some(2), Some(3), Some(4)]);
    assert!(transport.sent().iter().all(|s| s.dont_fragment));
}

#[test]
fn trace_resolution_failure_is_single_hop_zero() {
    let transport = FakeTransport::new();
    let resolver = FakeResolver::new(Err("Name or service not known".into()));

    let run = probe::traceroute(&transport, &resolver, "nonexistent.invalid", 30, TIMEOUT);

    assert_eq!(run.hops.len(), 1);
    let hop = &run.hops[0];
    assert_eq!(hop.hop_number, 0);
    assert_eq!(hop.address, None);
    assert_eq!(hop.address_display(), "*");
    assert_eq!(hop.status, ProbeStatus::ResolutionFailed);
    assert_eq!(hop.error.as_deref(), Some("Name or service not known"));
    assert!(transport.sent().is_empty());
}

#[test]
fn trace_probes_the_resolved_address() {
    let transport = FakeTransport::new().on_ttl(1, success("93.184.216.34", 20));
    let resolver = FakeResolver::new(Ok(vec![ip("2606:2800:220:1::"), ip("93.184.216.34")]));

    let run = probe::traceroute(&transport, &resolver, "example.com", 30, TIMEOUT);

    assert_eq!(run.resolved_address, Some(ip("93.184.216.34")));
    assert_eq!(run.hops.len(), 1);
    assert_eq!(transport.sent()[0].target, "93.184.216.34");
}

#[test]
fn trace_silent_path_runs_to_max_hops() {
    let transport = FakeTransport::new();
    let resolver = FakeResolver::new(Ok(vec![ip("203.0.113.9")]));

    let run = probe::traceroute(&transport, &resolver, "203.0.113.9", 5, TIMEOUT);

    assert_eq!(run.hops.len(), 5);
    assert!(run.hops.iter().all(|h| h.status == ProbeStatus::TimedOut));
    assert!(run.hops.iter().all(|h| h.address.is_none()));
    assert!(run.hops.iter().all(|h| h.roundtrip_time_ms.is_none()));
    assert!(!run.reached_target());
}

#[test]
fn trace_stops_on_unreachable() {
    let transport = FakeTransport::new()
        .on_ttl(1, ttl_expired("192.168.1.1", 1))
        .on_ttl(
            2,
            Ok(EchoReply {
                status: EchoStatus::DestinationUnreachable,
                address: Some(ip("10.0.0.1")),
                roundtrip_ms: Some(4),
            }),
        );
    let resolver = FakeResolver::new(Ok(vec![ip("198.51.100.1")]));

    let run = probe::traceroute(&transport, &resolver, "198.51.100.1", 30, TIMEOUT);

    assert_eq!(run.hops.len(), 2);
    assert_eq!(run.terminal_status(), Some(ProbeStatus::Unreachable));
    assert_eq!(run.hops[1].roundtrip_time_ms, None);
    assert_eq!(transport.sent().len(), 2);
}

#[test]
fn trace_stops_on_transport_failure() {
    let transport = FakeTransport::new().on_ttl(
        1,
        Err(TransportError::new(TransportErrorKind::Disposed, "handle closed")),
    );
    let resolver = FakeResolver::new(Ok(vec![ip("198.51.100.1")]));

    let run = probe::traceroute(&transport, &resolver, "198.51.100.1", 30, TIMEOUT);

    assert_eq!(run.hops.len(), 1);
    assert_eq!(run.hops[0].status, ProbeStatus::TransportError);
    assert_eq!(run.hops[0].error.as_deref(), Some("handle closed"));
}

#[test]
fn trace_continues_past_success_from_another_address() {
    let transport = FakeTransport::new()
        .on_ttl(1, success("192.168.1.1", 1))
        .on_ttl(2, success("198.51.100.1", 5));
    let resolver = FakeResolver::new(Ok(vec![ip("198.51.100.1")]));

    let run = probe::traceroute(&transport, &resolver, "198.51.100.1", 30, TIMEOUT);

    assert_eq!(run.hops.len(), 2);
    assert_eq!(run.hops[0].status, ProbeStatus::Success);
    assert!(run.reached_target());
}

#[test]
fn trace_ipv6_only_target_on_ipv4_transport_is_resolution_failure() {
    let transport = FakeTransport::new().ipv4_only();
    let resolver = FakeResolver::new(Ok(vec![ip("2001:db8::10")]));

    let run = probe::traceroute(&transport, &resolver, "v6only.test", 30, TIMEOUT);

    assert_eq!(run.hops.len(), 1);
    assert_eq!(run.hops[0].hop_number, 0);
    assert_eq!(run.hops[0].status, ProbeStatus::ResolutionFailed);
    assert!(run.hops[0].error.as_deref().unwrap().contains("IPv6 echo is not supported"));
    assert!(transport.sent().is_empty());
}

#[test]
fn trace_zero_max_hops_sends_nothing() {
    let transport = FakeTransport::new();
    let resolver = FakeResolver::new(Ok(vec![ip("198.51.100.1")]));
    let run = probe::traceroute(&transport, &resolver, "198.51.100.1", 0, TIMEOUT);
    assert!(run.hops.is_empty());
    assert!(transport.sent().is_empty());
}

#[test]
fn trace_max_hops_is_capped_at_ttl_range() {
    let transport = FakeTransport::new();
    let resolver = FakeResolver::new(Ok(vec![ip("198.51.100.1")]));
    let run = probe::traceroute(&transport, &resolver, "198.51.100.1", 1000, Duration::from_millis(1));
    assert_eq!(run.hops.len(), 255);
    assert_eq!(run.hops.last().map(|h| h.hop_number), Some(255));
}
