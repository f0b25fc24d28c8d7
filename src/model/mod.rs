pub mod lookup;

use std::net::{IpAddr, Ipv4Addr};

use serde::{Serialize, Serializer};

/// Canonical TCP connection state.
///
/// Raw codes from the extended table query are 1-based in declaration order
/// (`Closed` = 1 ... `DeleteTcb` = 12). Anything else decodes to `Unknown`.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SocketState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    DeleteTcb,
    Unknown,
}

const STATE_BY_CODE: [SocketState; 12] = [
    SocketState::Closed,
    SocketState::Listen,
    SocketState::SynSent,
    SocketState::SynReceived,
    SocketState::Established,
    SocketState::FinWait1,
    SocketState::FinWait2,
    SocketState::CloseWait,
    SocketState::Closing,
    SocketState::LastAck,
    SocketState::TimeWait,
    SocketState::DeleteTcb,
];

impl SocketState {
    /// Map a raw state code from the extended TCP table.
    pub fn from_code(code: u32) -> Self {
        match code {
            1..=12 => STATE_BY_CODE[(code - 1) as usize],
            _ => Self::Unknown,
        }
    }

    /// Map a state code from `/proc/net/tcp` (kernel `TCP_*` numbering).
    pub fn from_linux_code(code: u8) -> Self {
        match code {
            0x01 => Self::Established,
            0x02 => Self::SynSent,
            0x03 | 0x0C => Self::SynReceived,
            0x04 => Self::FinWait1,
            0x05 => Self::FinWait2,
            0x06 => Self::TimeWait,
            0x07 => Self::Closed,
            0x08 => Self::CloseWait,
            0x09 => Self::LastAck,
            0x0A => Self::Listen,
            0x0B => Self::Closing,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Listen => write!(f, "LISTEN"),
            Self::SynSent => write!(f, "SYN_SENT"),
            Self::SynReceived => write!(f, "SYN_RECEIVED"),
            Self::Established => write!(f, "ESTABLISHED"),
            Self::FinWait1 => write!(f, "FIN_WAIT_1"),
            Self::FinWait2 => write!(f, "FIN_WAIT_2"),
            Self::CloseWait => write!(f, "CLOSE_WAIT"),
            Self::Closing => write!(f, "CLOSING"),
            Self::LastAck => write!(f, "LAST_ACK"),
            Self::TimeWait => write!(f, "TIME_WAIT"),
            Self::DeleteTcb => write!(f, "DELETE_TCB"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One IPv4 TCP socket with its owning process.
///
/// For `Listen` rows the remote endpoint is zero-valued and carries no meaning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TcpSocketRecord {
    pub local_address: Ipv4Addr,
    pub local_port: u16,
    pub remote_address: Ipv4Addr,
    pub remote_port: u16,
    pub state: SocketState,
    /// `None` when the platform cannot attribute the socket to a process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owning_pid: Option<u32>,
}

/// One IPv4 UDP endpoint with its owning process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UdpSocketRecord {
    pub local_address: Ipv4Addr,
    pub local_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owning_pid: Option<u32>,
}

/// Outcome vocabulary shared by ping results and traceroute hops.
///
/// `TtlExpired` only occurs on hops; `ResolutionFailed` only on the synthetic
/// hop 0 of a traceroute whose target could not be resolved.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Success,
    TtlExpired,
    TimedOut,
    Unreachable,
    TransportError,
    InvalidTarget,
    ResolutionFailed,
    Unknown,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::TtlExpired => write!(f, "ttl expired"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::TransportError => write!(f, "transport error"),
            Self::InvalidTarget => write!(f, "invalid target"),
            Self::ResolutionFailed => write!(f, "resolution failed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PingResult {
    pub target: String,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roundtrip_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_address: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PingResult {
    pub(crate) fn failed(target: &str, status: ProbeStatus, error: impl Into<String>) -> Self {
        Self {
            target: target.to_string(),
            status,
            roundtrip_time_ms: None,
            resolved_address: None,
            error: Some(error.into()),
        }
    }
}

/// Marker rendered for a hop whose responder could not be identified.
pub const WILDCARD_ADDRESS: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TracerouteHop {
    /// 1-based; 0 is reserved for the single "resolution failed" record.
    pub hop_number: u32,
    #[serde(serialize_with = "serialize_hop_address")]
    pub address: Option<IpAddr>,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roundtrip_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TracerouteHop {
    pub fn address_display(&self) -> String {
        match self.address {
            Some(addr) => addr.to_string(),
            None => WILDCARD_ADDRESS.to_string(),
        }
    }

    pub fn is_resolution_failure(&self) -> bool {
        self.hop_number == 0
    }
}

fn serialize_hop_address<S: Serializer>(
    address: &Option<IpAddr>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match address {
        Some(addr) => serializer.collect_str(addr),
        None => serializer.serialize_str(WILDCARD_ADDRESS),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TracerouteRun {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_address: Option<IpAddr>,
    pub hops: Vec<TracerouteHop>,
}

impl TracerouteRun {
    /// Status of the last recorded hop, which is the reason the run ended.
    pub fn terminal_status(&self) -> Option<ProbeStatus> {
        self.hops.last().map(|h| h.status)
    }

    /// True if some hop was answered by the resolved target itself.
    pub fn reached_target(&self) -> bool {
        match self.resolved_address {
            Some(target) => self
                .hops
                .iter()
                .any(|h| h.status == ProbeStatus::Success && h.address == Some(target)),
            None => false,
        }
    }
}
