use std::net::IpAddr;
use std::time::Duration;

use crate::model::{PingResult, ProbeStatus};
use crate::probe::classify;
use crate::probe::traceroute::{HostResolver, probe_address};
use crate::probe::{ECHO_PAYLOAD, EchoRequest, EchoTransport};

/// Send one echo request to `target`.
///
/// Never fails: every outcome, including an empty target, is a field of the
/// returned result. No request is sent for an empty or blank target.
///
/// Hostnames are resolved once up front and the echo goes to that address, so
/// `resolved_address` is the target's address whatever the reply status.
pub fn ping(
    transport: &dyn EchoTransport,
    resolver: &dyn HostResolver,
    target: &str,
    timeout: Duration,
) -> PingResult {
    let host = target.trim();
    if host.is_empty() {
        return PingResult::failed(target, ProbeStatus::InvalidTarget, "target is empty");
    }

    let is_hostname = host.parse::<IpAddr>().is_err();
    let address = match probe_address(transport, resolver, host) {
        Ok(addr) => addr,
        Err(detail) => {
            log::debug!("ping {host}: resolution failed: {detail}");
            return PingResult::failed(
                target,
                ProbeStatus::TransportError,
                classify::first_clause(&detail),
            );
        }
    };
    let resolved_address = is_hostname.then_some(address);

    let destination = address.to_string();
    let request = EchoRequest {
        target: &destination,
        timeout,
        ttl: None,
        payload: &ECHO_PAYLOAD,
        dont_fragment: false,
    };

    let reply = match transport.send_echo(&request) {
        Ok(reply) => reply,
        Err(e) => {
            let (status, message) = classify::failure(&e);
            log::debug!("ping {host}: {status}: {e}");
            return PingResult {
                resolved_address,
                ..PingResult::failed(target, status, message)
            };
        }
    };

    let status = classify::reply_status(&reply);

    PingResult {
        target: target.to_string(),
        status,
        roundtrip_time_ms: match status {
            ProbeStatus::Success => reply.roundtrip_ms,
            _ => None,
        },
        resolved_address,
        error: classify::reply_error(&reply),
    }
}
