// Reachability probes: single echo (ping) and TTL-stepped traceroute.
//
// Probes never send packets themselves; they drive an `EchoTransport`, which
// wraps the host's echo facility:
//   - Windows: IcmpSendEcho (probe::windows)
//   - Unix: the system ping utility (probe::command)

pub mod classify;
#[cfg(unix)]
pub mod command;
pub mod ping;
pub mod traceroute;
#[cfg(target_os = "windows")]
pub mod windows;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

pub use self::ping::ping;
pub use self::traceroute::{DnsResolver, HostResolver, probe_address, traceroute};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_HOPS: u32 = 30;
pub const DEFAULT_PAYLOAD_LEN: usize = 32;

/// Fixed, non-empty echo payload.
pub const ECHO_PAYLOAD: [u8; DEFAULT_PAYLOAD_LEN] = [b'a'; DEFAULT_PAYLOAD_LEN];

/// Probe parameters shared by the CLI and the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub max_hops: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }
}

/// One echo request as handed to the transport.
#[derive(Debug, Clone)]
pub struct EchoRequest<'a> {
    /// Hostname or literal address.
    pub target: &'a str,
    pub timeout: Duration,
    /// `None` leaves the transport's default TTL.
    pub ttl: Option<u8>,
    pub payload: &'a [u8],
    pub dont_fragment: bool,
}

/// Status reported by the echo facility for a reply (or lack of one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoStatus {
    Success,
    TtlExpired,
    TimedOut,
    DestinationUnreachable,
    /// Any other facility status, with its description.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    pub status: EchoStatus,
    /// Responder address, if the facility identified one.
    pub address: Option<IpAddr>,
    pub roundtrip_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Resolution,
    Socket,
    InvalidArgument,
    Disposed,
    Unexpected,
}

/// The echo facility failed before producing any status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Sends exactly one echo request and waits at most `request.timeout`.
pub trait EchoTransport: Send + Sync {
    fn send_echo(&self, request: &EchoRequest<'_>) -> Result<EchoReply, TransportError>;

    /// Whether IPv6 destinations can be probed at all.
    fn supports_ipv6(&self) -> bool {
        true
    }
}

/// Echo transport for the current platform.
pub fn system_transport() -> Arc<dyn EchoTransport> {
    #[cfg(target_os = "windows")]
    return Arc::new(windows::IcmpEchoTransport);

    #[cfg(unix)]
    return Arc::new(command::PingCommand::default());

    #[cfg(not(any(unix, target_os = "windows")))]
    Arc::new(UnsupportedTransport)
}

#[cfg(not(any(unix, target_os = "windows")))]
struct UnsupportedTransport;

#[cfg(not(any(unix, target_os = "windows")))]
impl EchoTransport for UnsupportedTransport {
    fn send_echo(&self, _request: &EchoRequest<'_>) -> Result<EchoReply, TransportError> {
        Err(TransportError::new(
            TransportErrorKind::Socket,
            "echo requests are not supported on this platform",
        ))
    }
}
