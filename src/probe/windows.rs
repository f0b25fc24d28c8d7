// Windows echo transport over IcmpSendEcho from the IP Helper API.
//
// IcmpSendEcho blocks until a reply arrives or the timeout elapses. TTL and
// the don't-fragment flag travel in IP_OPTION_INFORMATION. IPv4 only.

use std::net::{IpAddr, Ipv4Addr};

use windows_sys::Win32::Foundation::{GetLastError, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::NetworkManagement::IpHelper::{
    ICMP_ECHO_REPLY, IP_OPTION_INFORMATION, IcmpCloseHandle, IcmpCreateFile, IcmpSendEcho,
};

use crate::probe::{EchoReply, EchoRequest, EchoStatus, EchoTransport, TransportError, TransportErrorKind};

const IP_FLAG_DF: u8 = 0x2;
const DEFAULT_TTL: u8 = 128;

// IP_STATUS codes (ipexport.h)
const IP_SUCCESS: u32 = 0;
const IP_STATUS_BASE: u32 = 11000;
const IP_DEST_NET_UNREACHABLE: u32 = 11002;
const IP_DEST_HOST_UNREACHABLE: u32 = 11003;
const IP_DEST_PROT_UNREACHABLE: u32 = 11004;
const IP_DEST_PORT_UNREACHABLE: u32 = 11005;
const IP_PACKET_TOO_BIG: u32 = 11009;
const IP_REQ_TIMED_OUT: u32 = 11010;
const IP_TTL_EXPIRED_TRANSIT: u32 = 11013;
const IP_TTL_EXPIRED_REASSEM: u32 = 11014;
const IP_STATUS_MAX: u32 = 11050;

const ERROR_INVALID_HANDLE: u32 = 6;
const ERROR_INVALID_PARAMETER: u32 = 87;
const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;

pub struct IcmpEchoTransport;

/// Closes the ICMP handle on every exit path.
struct IcmpHandle(HANDLE);

impl Drop for IcmpHandle {
    fn drop(&mut self) {
        unsafe { IcmpCloseHandle(self.0) };
    }
}

impl EchoTransport for IcmpEchoTransport {
    fn send_echo(&self, request: &EchoRequest<'_>) -> Result<EchoReply, TransportError> {
        let destination = resolve_ipv4(request.target)?;
        let payload_len = u16::try_from(request.payload.len()).map_err(|_| {
            TransportError::new(TransportErrorKind::InvalidArgument, "echo payload too large")
        })?;

        let raw = unsafe { IcmpCreateFile() };
        if raw == INVALID_HANDLE_VALUE {
            let code = unsafe { GetLastError() };
            return Err(TransportError::new(
                TransportErrorKind::Socket,
                format!("IcmpCreateFile failed with error {code}"),
            ));
        }
        let handle = IcmpHandle(raw);

        let options = IP_OPTION_INFORMATION {
            Ttl: request.ttl.unwrap_or(DEFAULT_TTL),
            Tos: 0,
            Flags: if request.dont_fragment { IP_FLAG_DF } else { 0 },
            OptionsSize: 0,
            OptionsData: std::ptr::null_mut(),
        };

        // Room for one reply, the echoed payload and an ICMP error header.
        let reply_len = std::mem::size_of::<ICMP_ECHO_REPLY>() + request.payload.len() + 8;
        let mut reply_buf = vec![0u8; reply_len];
        let timeout_ms = request.timeout.as_millis().clamp(1, u32::MAX as u128) as u32;

        let count = unsafe {
            IcmpSendEcho(
                handle.0,
                u32::from_ne_bytes(destination.octets()),
                request.payload.as_ptr() as *const _,
                payload_len,
                &options,
                reply_buf.as_mut_ptr() as *mut _,
                reply_len as u32,
                timeout_ms,
            )
        };

        if count == 0 {
            let code = unsafe { GetLastError() };
            return match code {
                IP_STATUS_BASE..=IP_STATUS_MAX => Ok(EchoReply {
                    status: status_from_ip(code),
                    address: None,
                    roundtrip_ms: None,
                }),
                ERROR_INVALID_HANDLE => Err(TransportError::new(
                    TransportErrorKind::Disposed,
                    "ICMP handle is no longer valid",
                )),
                ERROR_INVALID_PARAMETER => Err(TransportError::new(
                    TransportErrorKind::InvalidArgument,
                    format!("IcmpSendEcho rejected the request for {destination}"),
                )),
                ERROR_NOT_ENOUGH_MEMORY => Err(TransportError::new(
                    TransportErrorKind::Unexpected,
                    "IcmpSendEcho: not enough memory",
                )),
                other => Err(TransportError::new(
                    TransportErrorKind::Socket,
                    format!("IcmpSendEcho failed with error {other}"),
                )),
            };
        }

        let reply = unsafe { std::ptr::read_unaligned(reply_buf.as_ptr() as *const ICMP_ECHO_REPLY) };
        let responder = Ipv4Addr::from(reply.Address.to_ne_bytes());

        Ok(EchoReply {
            status: status_from_ip(reply.Status),
            address: (!responder.is_unspecified()).then_some(IpAddr::V4(responder)),
            roundtrip_ms: Some(reply.RoundTripTime as u64),
        })
    }

    // IcmpSendEcho is IPv4 only; Icmp6SendEcho2 is not wired up.
    fn supports_ipv6(&self) -> bool {
        false
    }
}

fn resolve_ipv4(target: &str) -> Result<Ipv4Addr, TransportError> {
    if let Ok(addr) = target.parse::<IpAddr>() {
        return match addr {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => Err(TransportError::new(
                TransportErrorKind::InvalidArgument,
                "IPv6 echo requests are not supported",
            )),
        };
    }

    let addrs = dns_lookup::lookup_host(target)
        .map_err(|e| TransportError::new(TransportErrorKind::Resolution, e.to_string()))?;
    addrs
        .into_iter()
        .find_map(|a| match a {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| {
            TransportError::new(
                TransportErrorKind::Resolution,
                format!("no IPv4 address found for {target}"),
            )
        })
}

fn status_from_ip(code: u32) -> EchoStatus {
    match code {
        IP_SUCCESS => EchoStatus::Success,
        IP_REQ_TIMED_OUT => EchoStatus::TimedOut,
        IP_TTL_EXPIRED_TRANSIT | IP_TTL_EXPIRED_REASSEM => EchoStatus::TtlExpired,
        IP_DEST_NET_UNREACHABLE
        | IP_DEST_HOST_UNREACHABLE
        | IP_DEST_PROT_UNREACHABLE
        | IP_DEST_PORT_UNREACHABLE => EchoStatus::DestinationUnreachable,
        IP_PACKET_TOO_BIG => EchoStatus::Other("packet too big".to_string()),
        other => EchoStatus::Other(format!("IP status {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_status_mapping() {
        assert_eq!(status_from_ip(0), EchoStatus::Success);
        assert_eq!(status_from_ip(11010), EchoStatus::TimedOut);
        assert_eq!(status_from_ip(11013), EchoStatus::TtlExpired);
        assert_eq!(status_from_ip(11003), EchoStatus::DestinationUnreachable);
        assert!(matches!(status_from_ip(11050), EchoStatus::Other(_)));
    }

    #[test]
    fn ipv6_literal_is_rejected() {
        let err = resolve_ipv4("::1").unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::InvalidArgument);
    }
}
