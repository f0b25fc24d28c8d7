// Windows socket tables via the IP Helper API.
//
// GetExtendedTcpTable/GetExtendedUdpTable return socket → owning PID rows
// directly; only the IPv4 tables are queried.

use windows_sys::Win32::NetworkManagement::IpHelper::{
    GetExtendedTcpTable, GetExtendedUdpTable, TCP_TABLE_OWNER_PID_ALL, UDP_TABLE_OWNER_PID,
};
use windows_sys::Win32::Networking::WinSock::AF_INET;

use crate::system::table::{NegotiatedTables, TableKind, TableQuery};

/// Raw extended table query for IPv4, unsorted.
pub struct IpHelperQuery;

impl TableQuery for IpHelperQuery {
    fn query(&self, kind: TableKind, buffer: Option<&mut [u8]>, size: &mut u32) -> u32 {
        let ptr = match buffer {
            Some(buf) => {
                *size = buf.len() as u32;
                buf.as_mut_ptr() as *mut _
            }
            None => {
                *size = 0;
                std::ptr::null_mut()
            }
        };

        match kind {
            TableKind::Tcp => unsafe {
                GetExtendedTcpTable(ptr, size, 0, AF_INET as u32, TCP_TABLE_OWNER_PID_ALL, 0)
            },
            TableKind::Udp => unsafe {
                GetExtendedUdpTable(ptr, size, 0, AF_INET as u32, UDP_TABLE_OWNER_PID, 0)
            },
        }
    }
}

pub fn system_tables() -> NegotiatedTables<IpHelperQuery> {
    NegotiatedTables::new(IpHelperQuery)
}
