// TTL-stepped traceroute over the echo transport.
//
// Hops are probed strictly one after another: whether TTL n+1 is sent at all
// depends on the outcome of TTL n.

use std::net::IpAddr;
use std::time::Duration;

use crate::model::{ProbeStatus, TracerouteHop, TracerouteRun};
use crate::probe::classify;
use crate::probe::{ECHO_PAYLOAD, EchoRequest, EchoTransport};

/// Forward name resolution used to pin a probe to one address.
pub trait HostResolver: Send + Sync {
    fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String>;
}

/// System resolver (getaddrinfo).
pub struct DnsResolver;

impl HostResolver for DnsResolver {
    fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        dns_lookup::lookup_host(host).map_err(|e| e.to_string())
    }
}

/// Pick the probe address: first IPv4 result, else the first of any family.
pub fn pick_address(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

/// Resolve `target` to the single address every hop is probed against.
pub fn resolve_target(resolver: &dyn HostResolver, target: &str) -> Result<IpAddr, String> {
    let host = target.trim();
    if host.is_empty() {
        return Err("target is empty".to_string());
    }
    if let Ok(addr) = host.parse::<IpAddr>() {
        return Ok(addr);
    }
    let addrs = resolver.lookup(host)?;
    pick_address(&addrs).ok_or_else(|| format!("no addresses found for {host}"))
}

/// Resolve `target` and check that `transport` can reach its address family.
///
/// `pick_address` only falls back to IPv6 when no IPv4 address exists, so an
/// IPv6 result on an IPv4-only transport leaves nothing to probe.
pub fn probe_address(
    transport: &dyn EchoTransport,
    resolver: &dyn HostResolver,
    target: &str,
) -> Result<IpAddr, String> {
    let addr = resolve_target(resolver, target)?;
    if addr.is_ipv6() && !transport.supports_ipv6() {
        let host = target.trim();
        return Err(if host.parse::<IpAddr>().is_ok() {
            "IPv6 echo is not supported on this platform".to_string()
        } else {
            format!("{host} has no IPv4 address and IPv6 echo is not supported on this platform")
        });
    }
    Ok(addr)
}

/// Trace the path to `target`, at most `max_hops` probes (capped at 255).
///
/// Never fails. An unresolvable target yields a run whose only hop is the
/// hop-0 "resolution failed" record, and nothing is sent.
pub fn traceroute(
    transport: &dyn EchoTransport,
    resolver: &dyn HostResolver,
    target: &str,
    max_hops: u32,
    per_hop_timeout: Duration,
) -> TracerouteRun {
    let resolved = match probe_address(transport, resolver, target) {
        Ok(addr) => addr,
        Err(detail) => {
            log::debug!("traceroute {target}: resolution failed: {detail}");
            return TracerouteRun {
                target: target.to_string(),
                resolved_address: None,
                hops: vec![TracerouteHop {
                    hop_number: 0,
                    address: None,
                    status: ProbeStatus::ResolutionFailed,
                    roundtrip_time_ms: None,
                    error: Some(classify::first_clause(&detail)),
                }],
            };
        }
    };

    let destination = resolved.to_string();
    let max_ttl = max_hops.min(u8::MAX as u32) as u8;
    let mut hops = Vec::with_capacity(max_ttl as usize);

    for ttl in 1..=max_ttl {
        let request = EchoRequest {
            target: &destination,
            timeout: per_hop_timeout,
            ttl: Some(ttl),
            payload: &ECHO_PAYLOAD,
            dont_fragment: true,
        };

        let hop = probe_hop(transport, &request, ttl);
        log::debug!(
            "traceroute {target} hop {ttl}: {} from {}",
            hop.status,
            hop.address_display()
        );

        let reached = hop.status == ProbeStatus::Success && hop.address == Some(resolved);
        let fatal = !matches!(
            hop.status,
            ProbeStatus::Success | ProbeStatus::TtlExpired | ProbeStatus::TimedOut
        );
        hops.push(hop);

        if reached || fatal {
            break;
        }
    }

    TracerouteRun {
        target: target.to_string(),
        resolved_address: Some(resolved),
        hops,
    }
}

fn probe_hop(transport: &dyn EchoTransport, request: &EchoRequest<'_>, ttl: u8) -> TracerouteHop {
    match transport.send_echo(request) {
        Ok(reply) => {
            let status = classify::reply_status(&reply);
            TracerouteHop {
                hop_number: ttl as u32,
                address: reply.address,
                status,
                roundtrip_time_ms: match status {
                    ProbeStatus::Success | ProbeStatus::TtlExpired => reply.roundtrip_ms,
                    _ => None,
                },
                error: classify::reply_error(&reply),
            }
        }
        Err(e) => {
            let (status, message) = classify::failure(&e);
            TracerouteHop {
                hop_number: ttl as u32,
                address: None,
                status,
                roundtrip_time_ms: None,
                error: Some(message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<Vec<IpAddr>, String>);

    impl HostResolver for Fixed {
        fn lookup(&self, _host: &str) -> Result<Vec<IpAddr>, String> {
            self.0.clone()
        }
    }

    #[test]
    fn prefers_ipv4() {
        let addrs: Vec<IpAddr> = vec!["2001:db8::1".parse().unwrap(), "192.0.2.7".parse().unwrap()];
        assert_eq!(pick_address(&addrs), Some("192.0.2.7".parse().unwrap()));
    }

    #[test]
    fn falls_back_to_first_of_any_family() {
        let addrs: Vec<IpAddr> = vec!["2001:db8::1".parse().unwrap(), "2001:db8::2".parse().unwrap()];
        assert_eq!(pick_address(&addrs), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(pick_address(&[]), None);
    }

    #[test]
    fn literal_address_skips_resolver() {
        let resolver = Fixed(Err("must not be called".into()));
        assert_eq!(
            resolve_target(&resolver, "8.8.8.8"),
            Ok("8.8.8.8".parse().unwrap())
        );
    }

    #[test]
    fn empty_lookup_is_a_failure() {
        let resolver = Fixed(Ok(Vec::new()));
        assert!(resolve_target(&resolver, "nothing.example").is_err());
        assert!(resolve_target(&resolver, "  ").is_err());
    }
}
