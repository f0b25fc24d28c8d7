// Endpoint decoding for raw IP Helper table rows.
//
// Addresses are DWORDs whose in-memory bytes are already in network order,
// so the dotted quad is the bytes as laid out. Ports are DWORDs whose first
// two bytes hold the port big-endian; the upper two bytes are unused.

use std::net::Ipv4Addr;

/// Decode a raw 4-byte address field into an IPv4 address.
pub fn decode_addr(bytes: [u8; 4]) -> Ipv4Addr {
    Ipv4Addr::from(bytes)
}

/// Decode a raw address DWORD as read little-endian from the table.
pub fn decode_addr_dword(raw: u32) -> Ipv4Addr {
    decode_addr(raw.to_le_bytes())
}

/// Decode a raw 4-byte port field into a host-order port.
pub fn decode_port(bytes: [u8; 4]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Copy a fixed 4-byte field out of a row slice.
///
/// Callers guarantee `offset + 4 <= row.len()` through the fixed row size.
pub(crate) fn field(row: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&row[offset..offset + 4]);
    out
}

pub(crate) fn field_u32(row: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(field(row, offset))
}
