pub mod codec;
pub mod table;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "windows")]
pub mod windows;

use std::sync::Arc;

use crate::error::NetdiagError;
use crate::model::lookup::{SocketPidLookup, build_pid_lookup};
use crate::model::{TcpSocketRecord, UdpSocketRecord};

use self::table::SocketTableSource;

/// Socket table backend for the current platform.
pub fn system_tables() -> Arc<dyn SocketTableSource> {
    #[cfg(target_os = "windows")]
    return Arc::new(windows::system_tables());

    #[cfg(target_os = "linux")]
    return Arc::new(linux::ProcNetTables::new());

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    Arc::new(UnsupportedTables)
}

/// Read the IPv4 TCP table with owning PIDs.
pub fn read_tcp_table() -> Result<Vec<TcpSocketRecord>, NetdiagError> {
    system_tables().tcp_table()
}

/// Read the IPv4 UDP table with owning PIDs.
pub fn read_udp_table() -> Result<Vec<UdpSocketRecord>, NetdiagError> {
    system_tables().udp_table()
}

/// Read both tables and build the socket -> PID map from one snapshot.
pub fn snapshot_pid_lookup() -> Result<SocketPidLookup, NetdiagError> {
    let tables = system_tables();
    let tcp = tables.tcp_table()?;
    let udp = tables.udp_table()?;
    Ok(build_pid_lookup(&tcp, &udp))
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
struct UnsupportedTables;

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
impl SocketTableSource for UnsupportedTables {
    fn tcp_table(&self) -> Result<Vec<TcpSocketRecord>, NetdiagError> {
        Err(NetdiagError::Unsupported("TCP table with owning process".to_string()))
    }

    fn udp_table(&self) -> Result<Vec<UdpSocketRecord>, NetdiagError> {
        Err(NetdiagError::Unsupported("UDP table with owning process".to_string()))
    }
}
