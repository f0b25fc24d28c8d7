// Extended socket table reader.
//
// The OS query is called twice: once with no buffer to learn the size, then
// with a buffer of exactly that size. The returned bytes are a u32 row count
// followed by fixed-size rows, decoded field by field rather than cast.

use crate::error::NetdiagError;
use crate::model::{SocketState, TcpSocketRecord, UdpSocketRecord};
use crate::system::codec::{decode_addr, decode_port, field, field_u32};

/// Status returned when the supplied buffer is smaller than the table.
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const NO_ERROR: u32 = 0;

const HEADER_LEN: usize = 4;

/// `MIB_TCPROW_OWNER_PID`: state, local addr, local port, remote addr,
/// remote port, owning pid.
pub const TCP_ROW_LEN: usize = 24;
/// `MIB_UDPROW_OWNER_PID`: local addr, local port, owning pid.
pub const UDP_ROW_LEN: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableKind {
    Tcp,
    Udp,
}

impl TableKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }

    fn row_len(self) -> usize {
        match self {
            Self::Tcp => TCP_ROW_LEN,
            Self::Udp => UDP_ROW_LEN,
        }
    }
}

/// The raw OS table query: all IPv4 entries annotated with owning PID.
///
/// `buffer` is `None` for the size probe. `size` is in/out like the
/// underlying API: on entry the buffer length, on return the required size.
pub trait TableQuery: Send + Sync {
    fn query(&self, kind: TableKind, buffer: Option<&mut [u8]>, size: &mut u32) -> u32;
}

/// Source of decoded socket inventories. Implemented by the platform
/// backends and by test fakes.
pub trait SocketTableSource: Send + Sync {
    fn tcp_table(&self) -> Result<Vec<TcpSocketRecord>, NetdiagError>;
    fn udp_table(&self) -> Result<Vec<UdpSocketRecord>, NetdiagError>;
}

/// Any `TableQuery` is a table source through the negotiate/decode path.
pub struct NegotiatedTables<Q> {
    query: Q,
}

impl<Q: TableQuery> NegotiatedTables<Q> {
    pub fn new(query: Q) -> Self {
        Self { query }
    }
}

impl<Q: TableQuery> SocketTableSource for NegotiatedTables<Q> {
    fn tcp_table(&self) -> Result<Vec<TcpSocketRecord>, NetdiagError> {
        read_tcp_table_with(&self.query)
    }

    fn udp_table(&self) -> Result<Vec<UdpSocketRecord>, NetdiagError> {
        read_udp_table_with(&self.query)
    }
}

pub fn read_tcp_table_with(query: &dyn TableQuery) -> Result<Vec<TcpSocketRecord>, NetdiagError> {
    with_table(query, TableKind::Tcp, parse_tcp_table)
}

pub fn read_udp_table_with(query: &dyn TableQuery) -> Result<Vec<UdpSocketRecord>, NetdiagError> {
    with_table(query, TableKind::Udp, parse_udp_table)
}

/// Negotiate, fill and decode one table. The buffer lives only inside this
/// call and is dropped on every return path.
fn with_table<T>(
    query: &dyn TableQuery,
    kind: TableKind,
    decode: fn(&[u8]) -> Result<Vec<T>, NetdiagError>,
) -> Result<Vec<T>, NetdiagError> {
    let mut size: u32 = 0;
    let status = query.query(kind, None, &mut size);
    match status {
        ERROR_INSUFFICIENT_BUFFER => {}
        NO_ERROR => {
            log::debug!("{} table size probe returned no data", kind.name());
            return Ok(Vec::new());
        }
        other => return Err(negotiation_error(kind, "size probe", other)),
    }

    if (size as usize) < HEADER_LEN {
        return Err(NetdiagError::BufferNegotiation {
            table: kind.name(),
            stage: "size probe",
            status,
        });
    }

    let mut buffer = vec![0u8; size as usize];
    let status = query.query(kind, Some(&mut buffer), &mut size);
    if status != NO_ERROR {
        return Err(negotiation_error(kind, "fetch", status));
    }

    decode(&buffer)
}

fn negotiation_error(kind: TableKind, stage: &'static str, status: u32) -> NetdiagError {
    if status == ERROR_ACCESS_DENIED {
        return NetdiagError::PermissionDenied(format!(
            "{} table query denied during {stage}",
            kind.name()
        ));
    }
    log::debug!("{} table {stage} failed with status {status}", kind.name());
    NetdiagError::BufferNegotiation {
        table: kind.name(),
        stage,
        status,
    }
}

/// Validate the row-count header against the buffer and return the rows.
fn rows(buf: &[u8], kind: TableKind) -> Result<std::slice::ChunksExact<'_, u8>, NetdiagError> {
    if buf.len() < HEADER_LEN {
        return Err(NetdiagError::DecodeBounds {
            table: kind.name(),
            declared: 0,
            available: 0,
        });
    }

    let declared = field_u32(buf, 0) as usize;
    let row_len = kind.row_len();
    let body = &buf[HEADER_LEN..];
    let available = body.len() / row_len;

    let fits = declared
        .checked_mul(row_len)
        .is_some_and(|needed| needed <= body.len());
    if !fits {
        log::warn!(
            "{} table declares {declared} rows, buffer holds {available}",
            kind.name()
        );
        return Err(NetdiagError::DecodeBounds {
            table: kind.name(),
            declared,
            available,
        });
    }

    Ok(body[..declared * row_len].chunks_exact(row_len))
}

/// Decode a `MIB_TCPTABLE_OWNER_PID` buffer.
pub fn parse_tcp_table(buf: &[u8]) -> Result<Vec<TcpSocketRecord>, NetdiagError> {
    let rows = rows(buf, TableKind::Tcp)?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(TcpSocketRecord {
            state: SocketState::from_code(field_u32(row, 0)),
            local_address: decode_addr(field(row, 4)),
            local_port: decode_port(field(row, 8)),
            remote_address: decode_addr(field(row, 12)),
            remote_port: decode_port(field(row, 16)),
            owning_pid: Some(field_u32(row, 20)),
        });
    }
    Ok(out)
}

/// Decode a `MIB_UDPTABLE_OWNER_PID` buffer.
pub fn parse_udp_table(buf: &[u8]) -> Result<Vec<UdpSocketRecord>, NetdiagError> {
    let rows = rows(buf, TableKind::Udp)?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(UdpSocketRecord {
            local_address: decode_addr(field(row, 0)),
            local_port: decode_port(field(row, 4)),
            owning_pid: Some(field_u32(row, 8)),
        });
    }
    Ok(out)
}
