// Linux socket tables read from /proc, the equivalent of the extended table query.
//
// 1. Parse /proc/net/tcp and /proc/net/udp → socket rows keyed by inode
// 2. Iterate /proc/<pid>/fd/ → readlink → "socket:[INODE]" → owning pid
// 3. Rows whose inode has no visible owner (TIME_WAIT, other users' sockets
//    without privilege) have no owning pid

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::error::NetdiagError;
use crate::model::{SocketState, TcpSocketRecord, UdpSocketRecord};
use crate::system::codec::decode_addr_dword;
use crate::system::table::SocketTableSource;

pub struct ProcNetTables {
    root: PathBuf,
}

impl ProcNetTables {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_net(&self, name: &str) -> Result<String, NetdiagError> {
        let path = self.root.join("net").join(name);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                NetdiagError::PermissionDenied(format!("cannot read {}", path.display()))
            }
            _ => NetdiagError::Io(e),
        })
    }

    /// Scan /proc/<pid>/fd/ for the socket inodes in `wanted`.
    fn owners(&self, wanted: &HashSet<u64>) -> HashMap<u64, u32> {
        let mut owners = HashMap::new();
        if wanted.is_empty() {
            return owners;
        }

        let proc_dir = match fs::read_dir(&self.root) {
            Ok(d) => d,
            Err(e) => {
                log::debug!("cannot list {}: {e}", self.root.display());
                return owners;
            }
        };

        for entry in proc_dir.flatten() {
            let pid: u32 = match entry.file_name().to_string_lossy().parse() {
                Ok(v) => v,
                Err(_) => continue,
            };

            // EACCES for other users' processes without privilege
            let fd_entries = match fs::read_dir(entry.path().join("fd")) {
                Ok(d) => d,
                Err(_) => continue,
            };

            for fd_entry in fd_entries.flatten() {
                let Ok(link) = fs::read_link(fd_entry.path()) else {
                    continue;
                };
                if let Some(inode) = parse_socket_inode(&link.to_string_lossy())
                    && wanted.contains(&inode)
                {
                    owners.entry(inode).or_insert(pid);
                }
            }
        }

        owners
    }
}

impl Default for ProcNetTables {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketTableSource for ProcNetTables {
    fn tcp_table(&self) -> Result<Vec<TcpSocketRecord>, NetdiagError> {
        let content = self.read_net("tcp")?;
        let rows = parse_proc_net_tcp(&content);
        let wanted = index_inodes(rows.iter().map(|(_, inode)| *inode));
        let owners = self.owners(&wanted);

        Ok(rows
            .into_iter()
            .map(|(mut record, inode)| {
                record.owning_pid = owners.get(&inode).copied();
                record
            })
            .collect())
    }

    fn udp_table(&self) -> Result<Vec<UdpSocketRecord>, NetdiagError> {
        let content = self.read_net("udp")?;
        let rows = parse_proc_net_udp(&content);
        let wanted = index_inodes(rows.iter().map(|(_, inode)| *inode));
        let owners = self.owners(&wanted);

        Ok(rows
            .into_iter()
            .map(|(mut record, inode)| {
                record.owning_pid = owners.get(&inode).copied();
                record
            })
            .collect())
    }
}

fn index_inodes(inodes: impl Iterator<Item = u64>) -> HashSet<u64> {
    inodes.filter(|inode| *inode != 0).collect()
}

/// Parse /proc/net/tcp. Returns unattributed rows plus their socket inode.
///
/// Each line after the header has the format:
///   sl  local_address rem_address st tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode
pub(crate) fn parse_proc_net_tcp(content: &str) -> Vec<(TcpSocketRecord, u64)> {
    let mut out = Vec::new();
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }

        let Some((local_address, local_port)) = parse_addr_v4(fields[1]) else {
            continue;
        };
        let Some((remote_address, remote_port)) = parse_addr_v4(fields[2]) else {
            continue;
        };
        let state = u8::from_str_radix(fields[3], 16)
            .map(SocketState::from_linux_code)
            .unwrap_or(SocketState::Unknown);
        let inode = fields[9].parse().unwrap_or(0);

        out.push((
            TcpSocketRecord {
                local_address,
                local_port,
                remote_address,
                remote_port,
                state,
                owning_pid: None,
            },
            inode,
        ));
    }
    out
}

pub(crate) fn parse_proc_net_udp(content: &str) -> Vec<(UdpSocketRecord, u64)> {
    let mut out = Vec::new();
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }

        let Some((local_address, local_port)) = parse_addr_v4(fields[1]) else {
            continue;
        };
        let inode = fields[9].parse().unwrap_or(0);

        out.push((
            UdpSocketRecord {
                local_address,
                local_port,
                owning_pid: None,
            },
            inode,
        ));
    }
    out
}

/// Parse "AABBCCDD:PORT". The address hex is the host-order (little-endian)
/// DWORD, the port hex is already host order.
pub(crate) fn parse_addr_v4(s: &str) -> Option<(Ipv4Addr, u16)> {
    let (addr_hex, port_hex) = s.split_once(':')?;
    if addr_hex.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(addr_hex, 16).ok()?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    Some((decode_addr_dword(raw), port))
}

/// Parse a readlink result like "socket:[12345]" → Some(12345)
pub(crate) fn parse_socket_inode(link: &str) -> Option<u64> {
    let s = link.strip_prefix("socket:[")?;
    let s = s.strip_suffix(']')?;
    s.parse().ok()
}
