use std::io::Write;

use crate::collect::{NetworkReport, SocketInventory, TableSection};
use crate::error::NetdiagError;
use crate::model::{PingResult, SocketState, TracerouteRun};

/// Write the report as plain-text tables.
///
/// Sections that were not requested are omitted. Per-table and per-probe
/// errors are shown inline; they never abort rendering.
pub fn write_pretty(report: &NetworkReport, writer: &mut impl Write) -> Result<(), NetdiagError> {
    write_pretty_inner(report, writer).map_err(NetdiagError::Serialization)
}

fn write_pretty_inner(report: &NetworkReport, w: &mut impl Write) -> Result<(), std::io::Error> {
    let mut first = true;

    if let Some(inventory) = &report.sockets {
        section_gap(&mut first, w)?;
        write_sockets(inventory, w)?;
    }
    if !report.pings.is_empty() {
        section_gap(&mut first, w)?;
        write_pings(&report.pings, w)?;
    }
    for run in &report.traces {
        section_gap(&mut first, w)?;
        write_trace(run, w)?;
    }
    if !report.skipped.is_empty() {
        section_gap(&mut first, w)?;
        writeln!(w, "Skipped: {}", report.skipped.join(", "))?;
    }
    Ok(())
}

fn section_gap(first: &mut bool, w: &mut impl Write) -> Result<(), std::io::Error> {
    if !std::mem::take(first) {
        writeln!(w)?;
    }
    Ok(())
}

fn write_sockets(inv: &SocketInventory, w: &mut impl Write) -> Result<(), std::io::Error> {
    writeln!(w, "TCP Sockets")?;
    writeln!(w, "{}", "=".repeat(96))?;
    match &inv.tcp {
        TableSection::Rows(rows) => {
            writeln!(
                w,
                "{:<22} {:<22} {:<13} {:>8}  {}",
                "LOCAL", "REMOTE", "STATE", "PID", "PROCESS"
            )?;
            writeln!(w, "{}", "-".repeat(96))?;
            for row in rows {
                let r = &row.record;
                let remote = if r.state == SocketState::Listen {
                    "*:*".to_string()
                } else {
                    format!("{}:{}", r.remote_address, r.remote_port)
                };
                writeln!(
                    w,
                    "{:<22} {:<22} {:<13} {:>8}  {}",
                    format!("{}:{}", r.local_address, r.local_port),
                    remote,
                    r.state.to_string(),
                    pid_cell(r.owning_pid),
                    truncate(&row.process_name, 32),
                )?;
            }
            if rows.is_empty() {
                writeln!(w, "(no TCP sockets)")?;
            }
        }
        TableSection::Error(e) => writeln!(w, "error: {}", e.message)?,
    }

    writeln!(w)?;
    writeln!(w, "UDP Sockets")?;
    writeln!(w, "{}", "=".repeat(96))?;
    match &inv.udp {
        TableSection::Rows(rows) => {
            writeln!(w, "{:<22} {:>8}  {}", "LOCAL", "PID", "PROCESS")?;
            writeln!(w, "{}", "-".repeat(96))?;
            for row in rows {
                let r = &row.record;
                writeln!(
                    w,
                    "{:<22} {:>8}  {}",
                    format!("{}:{}", r.local_address, r.local_port),
                    pid_cell(r.owning_pid),
                    truncate(&row.process_name, 32),
                )?;
            }
            if rows.is_empty() {
                writeln!(w, "(no UDP sockets)")?;
            }
        }
        TableSection::Error(e) => writeln!(w, "error: {}", e.message)?,
    }
    Ok(())
}

fn write_pings(pings: &[PingResult], w: &mut impl Write) -> Result<(), std::io::Error> {
    writeln!(w, "Ping")?;
    writeln!(w, "{}", "=".repeat(78))?;
    writeln!(w, "{:<32} {:<16} {:>8}  {}", "TARGET", "STATUS", "RTT", "DETAIL")?;
    writeln!(w, "{}", "-".repeat(78))?;
    for p in pings {
        let detail = match (&p.resolved_address, &p.error) {
            (_, Some(e)) => e.clone(),
            (Some(addr), None) => addr.to_string(),
            (None, None) => String::new(),
        };
        writeln!(
            w,
            "{:<32} {:<16} {:>8}  {}",
            truncate(&p.target, 32),
            p.status.to_string(),
            format_rtt(p.roundtrip_time_ms),
            detail,
        )?;
    }
    Ok(())
}

fn write_trace(run: &TracerouteRun, w: &mut impl Write) -> Result<(), std::io::Error> {
    match run.resolved_address {
        Some(addr) if addr.to_string() != run.target => {
            writeln!(w, "Traceroute to {} ({addr})", run.target)?
        }
        _ => writeln!(w, "Traceroute to {}", run.target)?,
    }
    writeln!(w, "{}", "=".repeat(78))?;
    writeln!(w, "{:>4}  {:<40} {:<16} {:>8}", "HOP", "ADDRESS", "STATUS", "RTT")?;
    writeln!(w, "{}", "-".repeat(78))?;
    for hop in &run.hops {
        writeln!(
            w,
            "{:>4}  {:<40} {:<16} {:>8}",
            hop.hop_number,
            hop.address_display(),
            hop.status.to_string(),
            format_rtt(hop.roundtrip_time_ms),
        )?;
        if let Some(e) = &hop.error {
            writeln!(w, "      {e}")?;
        }
    }
    if run.hops.is_empty() {
        writeln!(w, "(no hops probed)")?;
    }
    Ok(())
}

fn pid_cell(pid: Option<u32>) -> String {
    pid.map_or_else(|| "-".to_string(), |p| p.to_string())
}

fn format_rtt(ms: Option<u64>) -> String {
    match ms {
        Some(ms) => format!("{ms} ms"),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 3).collect();
        format!("{head}...")
    }
}
