use std::net::Ipv4Addr;

use rustc_hash::FxHashMap;

use crate::model::{SocketState, TcpSocketRecord, UdpSocketRecord};

/// Key for a listening TCP socket or any UDP socket: `"{addr}:{port}"`.
pub fn listen_key(local_address: Ipv4Addr, local_port: u16) -> String {
    format!("{local_address}:{local_port}")
}

/// Key for a non-listening TCP socket: `"{local}:{port}-{remote}:{port}"`.
pub fn connection_key(
    local_address: Ipv4Addr,
    local_port: u16,
    remote_address: Ipv4Addr,
    remote_port: u16,
) -> String {
    format!("{local_address}:{local_port}-{remote_address}:{remote_port}")
}

/// Composite key for a TCP row. Listeners never contribute a remote segment.
pub fn tcp_key(record: &TcpSocketRecord) -> String {
    if record.state == SocketState::Listen {
        listen_key(record.local_address, record.local_port)
    } else {
        connection_key(
            record.local_address,
            record.local_port,
            record.remote_address,
            record.remote_port,
        )
    }
}

pub fn udp_key(record: &UdpSocketRecord) -> String {
    listen_key(record.local_address, record.local_port)
}

/// Socket → owning PID map for one table snapshot.
///
/// Built once, never mutated afterwards; share it behind `Arc` for concurrent
/// readers. Portable connection listings that lack owner information are
/// joined against it with the same key rule.
#[derive(Debug, Default, Clone)]
pub struct SocketPidLookup {
    map: FxHashMap<String, u32>,
}

impl SocketPidLookup {
    pub fn from_records(tcp: &[TcpSocketRecord], udp: &[UdpSocketRecord]) -> Self {
        let mut map = FxHashMap::default();
        map.reserve(tcp.len() + udp.len());

        // Unattributed sockets stay out of the map.
        let keys = tcp
            .iter()
            .filter_map(|r| Some((tcp_key(r), r.owning_pid?)))
            .chain(udp.iter().filter_map(|r| Some((udp_key(r), r.owning_pid?))));

        for (key, pid) in keys {
            // First owner wins; a TCP listener and a UDP socket on the same
            // local endpoint share a key.
            if let Some(existing) = map.get(&key) {
                if *existing != pid {
                    log::debug!("duplicate socket key {key}: keeping pid {existing}, ignoring {pid}");
                }
                continue;
            }
            map.insert(key, pid);
        }

        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<u32> {
        self.map.get(key).copied()
    }

    /// Owner of a TCP socket described by a portable connection listing.
    pub fn owner_of_tcp(
        &self,
        local: (Ipv4Addr, u16),
        remote: (Ipv4Addr, u16),
        state: SocketState,
    ) -> Option<u32> {
        let key = if state == SocketState::Listen {
            listen_key(local.0, local.1)
        } else {
            connection_key(local.0, local.1, remote.0, remote.1)
        };
        self.get(&key)
    }

    pub fn owner_of_udp(&self, local: (Ipv4Addr, u16)) -> Option<u32> {
        self.get(&listen_key(local.0, local.1))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.map.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Build the socket → PID map for one snapshot of both tables.
pub fn build_pid_lookup(tcp: &[TcpSocketRecord], udp: &[UdpSocketRecord]) -> SocketPidLookup {
    SocketPidLookup::from_records(tcp, udp)
}
