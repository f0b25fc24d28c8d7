// Concurrent collection run: socket inventory, pings and traceroutes.
//
// Every unit (the socket inventory, each ping, each traceroute) runs on its
// own named thread and reports back over one channel. Units share nothing
// but the `CancelToken`, which each unit checks once before it starts; a
// unit that finds the token cancelled is reported as skipped. Results are
// put back into request order before the report is returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::NetdiagError;
use crate::model::{PingResult, TcpSocketRecord, TracerouteRun, UdpSocketRecord};
use crate::probe::{self, EchoTransport, HostResolver, ProbeConfig};
use crate::process::{self, ProcessLookup};
use crate::system::{self, table::SocketTableSource};

/// Shared cancellation: an explicit flag plus an optional global deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that cancels itself once `budget` has elapsed from now.
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(budget),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// The OS-facing seams a collection run goes through.
#[derive(Clone)]
pub struct Backends {
    pub tables: Arc<dyn SocketTableSource>,
    pub processes: Arc<dyn ProcessLookup>,
    pub transport: Arc<dyn EchoTransport>,
    pub resolver: Arc<dyn HostResolver>,
}

impl Backends {
    /// Backends for the current platform.
    pub fn system() -> Self {
        Self {
            tables: system::system_tables(),
            processes: process::system_lookup(),
            transport: probe::system_transport(),
            resolver: Arc::new(probe::DnsResolver),
        }
    }
}

/// What a run should collect.
#[derive(Debug, Clone, Default)]
pub struct CollectPlan {
    pub sockets: bool,
    pub pings: Vec<String>,
    pub traces: Vec<String>,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedTcpSocket {
    #[serde(flatten)]
    pub record: TcpSocketRecord,
    pub process_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedUdpSocket {
    #[serde(flatten)]
    pub record: UdpSocketRecord,
    pub process_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableErrorKind {
    PermissionDenied,
    /// Buffer negotiation or row decoding failed.
    QueryFailed,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableError {
    pub kind: TableErrorKind,
    pub message: String,
}

impl From<&NetdiagError> for TableError {
    fn from(err: &NetdiagError) -> Self {
        let kind = match err {
            NetdiagError::PermissionDenied(_) => TableErrorKind::PermissionDenied,
            NetdiagError::BufferNegotiation { .. } | NetdiagError::DecodeBounds { .. } => {
                TableErrorKind::QueryFailed
            }
            _ => TableErrorKind::Other,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// One table of the inventory: its rows, or why it could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSection<T> {
    Rows(Vec<T>),
    Error(TableError),
}

impl<T> TableSection<T> {
    pub fn rows(&self) -> &[T] {
        match self {
            Self::Rows(rows) => rows,
            Self::Error(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&TableError> {
        match self {
            Self::Rows(_) => None,
            Self::Error(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocketInventory {
    pub tcp: TableSection<OwnedTcpSocket>,
    pub udp: TableSection<OwnedUdpSocket>,
}

impl SocketInventory {
    pub fn errors(&self) -> impl Iterator<Item = &TableError> {
        self.tcp.error().into_iter().chain(self.udp.error())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sockets: Option<SocketInventory>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pings: Vec<PingResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<TracerouteRun>,
    /// Units that never started, e.g. "ping 8.8.8.8".
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

enum UnitResult {
    Sockets(SocketInventory),
    Ping(usize, PingResult),
    Trace(usize, TracerouteRun),
    Skipped,
}

/// Read both socket tables and name every owner.
///
/// A failure of one table does not affect the other. Names are cached per
/// PID for the duration of the call.
pub fn socket_inventory(
    tables: &dyn SocketTableSource,
    processes: &dyn ProcessLookup,
) -> SocketInventory {
    let mut names: FxHashMap<u32, String> = FxHashMap::default();
    let mut name_of = |pid: u32| -> String {
        names
            .entry(pid)
            .or_insert_with(|| process::resolve_owner(processes, pid))
            .clone()
    };

    let tcp = match tables.tcp_table() {
        Ok(rows) => TableSection::Rows(
            rows.into_iter()
                .map(|record| OwnedTcpSocket {
                    process_name: record.owning_pid.map_or_else(unknown_owner, &mut name_of),
                    record,
                })
                .collect(),
        ),
        Err(e) => {
            log::warn!("tcp table read failed: {e}");
            TableSection::Error(TableError::from(&e))
        }
    };

    let udp = match tables.udp_table() {
        Ok(rows) => TableSection::Rows(
            rows.into_iter()
                .map(|record| OwnedUdpSocket {
                    process_name: record.owning_pid.map_or_else(unknown_owner, &mut name_of),
                    record,
                })
                .collect(),
        ),
        Err(e) => {
            log::warn!("udp table read failed: {e}");
            TableSection::Error(TableError::from(&e))
        }
    };

    SocketInventory { tcp, udp }
}

fn unknown_owner() -> String {
    process::UNKNOWN_OWNER.to_string()
}

/// Run every unit of `plan` concurrently and assemble the report.
///
/// Only thread spawn failures are errors; everything a unit observes ends
/// up inside the report.
pub fn collect(
    backends: &Backends,
    plan: &CollectPlan,
    cancel: &CancelToken,
) -> Result<NetworkReport, NetdiagError> {
    let (tx, rx) = crossbeam_channel::unbounded::<UnitResult>();
    let mut handles = Vec::new();

    if plan.sockets {
        let tx = tx.clone();
        let cancel = cancel.clone();
        let tables = Arc::clone(&backends.tables);
        let processes = Arc::clone(&backends.processes);
        let h = thread::Builder::new()
            .name("netdiag-sockets".into())
            .spawn(move || {
                let result = if cancel.is_cancelled() {
                    UnitResult::Skipped
                } else {
                    UnitResult::Sockets(socket_inventory(tables.as_ref(), processes.as_ref()))
                };
                let _ = tx.send(result);
            })
            .map_err(|e| NetdiagError::Fatal(format!("spawn sockets worker: {e}")))?;
        handles.push(h);
    }

    for (i, target) in plan.pings.iter().enumerate() {
        let tx = tx.clone();
        let cancel = cancel.clone();
        let transport = Arc::clone(&backends.transport);
        let resolver = Arc::clone(&backends.resolver);
        let target = target.clone();
        let timeout = plan.probe.timeout;
        let h = thread::Builder::new()
            .name(format!("netdiag-ping-{i}"))
            .spawn(move || {
                let result = if cancel.is_cancelled() {
                    UnitResult::Skipped
                } else {
                    UnitResult::Ping(
                        i,
                        probe::ping(transport.as_ref(), resolver.as_ref(), &target, timeout),
                    )
                };
                let _ = tx.send(result);
            })
            .map_err(|e| NetdiagError::Fatal(format!("spawn ping worker: {e}")))?;
        handles.push(h);
    }

    for (i, target) in plan.traces.iter().enumerate() {
        let tx = tx.clone();
        let cancel = cancel.clone();
        let transport = Arc::clone(&backends.transport);
        let resolver = Arc::clone(&backends.resolver);
        let target = target.clone();
        let config = plan.probe;
        let h = thread::Builder::new()
            .name(format!("netdiag-trace-{i}"))
            .spawn(move || {
                let result = if cancel.is_cancelled() {
                    UnitResult::Skipped
                } else {
                    UnitResult::Trace(
                        i,
                        probe::traceroute(
                            transport.as_ref(),
                            resolver.as_ref(),
                            &target,
                            config.max_hops,
                            config.timeout,
                        ),
                    )
                };
                let _ = tx.send(result);
            })
            .map_err(|e| NetdiagError::Fatal(format!("spawn trace worker: {e}")))?;
        handles.push(h);
    }
    drop(tx); // only workers hold senders

    let mut sockets = None;
    let mut pings: Vec<Option<PingResult>> = vec![None; plan.pings.len()];
    let mut traces: Vec<Option<TracerouteRun>> = vec![None; plan.traces.len()];

    for result in rx.iter() {
        match result {
            UnitResult::Sockets(inventory) => sockets = Some(inventory),
            UnitResult::Ping(i, r) => pings[i] = Some(r),
            UnitResult::Trace(i, r) => traces[i] = Some(r),
            UnitResult::Skipped => {}
        }
    }

    for h in handles {
        if h.join().is_err() {
            log::error!("collection worker panicked");
        }
    }

    // Anything without a result never ran (or died); list it in request order.
    let mut skipped = Vec::new();
    if plan.sockets && sockets.is_none() {
        skipped.push("sockets".to_string());
    }
    for (target, slot) in plan.pings.iter().zip(&pings) {
        if slot.is_none() {
            skipped.push(format!("ping {target}"));
        }
    }
    for (target, slot) in plan.traces.iter().zip(&traces) {
        if slot.is_none() {
            skipped.push(format!("trace {target}"));
        }
    }
    if !skipped.is_empty() {
        log::warn!("{} unit(s) skipped: {}", skipped.len(), skipped.join(", "));
    }

    Ok(NetworkReport {
        sockets,
        pings: pings.into_iter().flatten().collect(),
        traces: traces.into_iter().flatten().collect(),
        skipped,
    })
}
