// Echo transport backed by the system ping utility.
//
// One invocation per request (`-c 1`), numeric output, TTL and don't-fragment
// passed as flags. The utility's output is parsed by `parse_ping_output`.

use std::io;
use std::net::IpAddr;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::probe::{EchoReply, EchoRequest, EchoStatus, EchoTransport, TransportError, TransportErrorKind};

const SPAWN_GRACE: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct PingCommand {
    program: String,
}

impl PingCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PingCommand {
    fn default() -> Self {
        Self::new("ping")
    }
}

impl EchoTransport for PingCommand {
    fn send_echo(&self, request: &EchoRequest<'_>) -> Result<EchoReply, TransportError> {
        if request.target.starts_with('-') {
            return Err(TransportError::new(
                TransportErrorKind::InvalidArgument,
                format!("invalid target {:?}", request.target),
            ));
        }

        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(ping_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => TransportError::new(
                    TransportErrorKind::Socket,
                    format!("{} utility not found", self.program),
                ),
                io::ErrorKind::PermissionDenied => TransportError::new(
                    TransportErrorKind::Socket,
                    format!("not permitted to run {}", self.program),
                ),
                _ => TransportError::new(
                    TransportErrorKind::Unexpected,
                    format!("spawn {}: {e}", self.program),
                ),
            })?;

        // The utility's own wait covers the reply; the grace covers process
        // startup. Past that the child is killed and the request timed out.
        let deadline = request.timeout + SPAWN_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if started.elapsed() >= deadline => {
                    log::debug!(
                        "{} to {} still running after {deadline:?}, killing it",
                        self.program,
                        request.target
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(EchoReply {
                        status: EchoStatus::TimedOut,
                        address: None,
                        roundtrip_ms: None,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(TransportError::new(
                        TransportErrorKind::Unexpected,
                        format!("wait for {}: {e}", self.program),
                    ));
                }
            }
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let output = child.wait_with_output().map_err(|e| {
            TransportError::new(
                TransportErrorKind::Unexpected,
                format!("read {} output: {e}", self.program),
            )
        })?;

        parse_ping_output(
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
            output.status.code(),
            elapsed_ms,
        )
    }
}

#[cfg(not(target_os = "macos"))]
fn ping_args(request: &EchoRequest<'_>) -> Vec<String> {
    // iputils: -W is the reply wait in seconds, fractional since 20190709.
    let wait_secs = format!("{:.3}", request.timeout.as_secs_f64().max(0.001));
    let mut args = vec![
        "-n".to_string(),
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        wait_secs,
        "-s".to_string(),
        request.payload.len().to_string(),
    ];
    if let Some(ttl) = request.ttl {
        args.extend(["-t".to_string(), ttl.to_string()]);
    }
    if request.dont_fragment {
        args.extend(["-M".to_string(), "do".to_string()]);
    }
    args.push(request.target.to_string());
    args
}

#[cfg(target_os = "macos")]
fn ping_args(request: &EchoRequest<'_>) -> Vec<String> {
    // BSD ping: -W is the reply wait in milliseconds, -m sets the TTL.
    let wait_ms = request.timeout.as_millis().max(1);
    let mut args = vec![
        "-n".to_string(),
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        wait_ms.to_string(),
        "-s".to_string(),
        request.payload.len().to_string(),
    ];
    if let Some(ttl) = request.ttl {
        args.extend(["-m".to_string(), ttl.to_string()]);
    }
    if request.dont_fragment {
        args.push("-D".to_string());
    }
    args.push(request.target.to_string());
    args
}

const RESOLUTION_MARKERS: [&str; 5] = [
    "name or service not known",
    "temporary failure in name resolution",
    "unknown host",
    "cannot resolve",
    "no address associated with hostname",
];

/// Interpret one ping invocation.
///
/// `elapsed_ms` stands in for the round-trip time when the utility does not
/// print one (e.g. for TTL-exceeded replies).
pub fn parse_ping_output(
    stdout: &str,
    stderr: &str,
    exit_code: Option<i32>,
    elapsed_ms: u64,
) -> Result<EchoReply, TransportError> {
    for line in stdout.lines() {
        let lower = line.to_ascii_lowercase();
        let is_reply_line = lower.starts_with("from ") || lower.contains(" bytes from ");
        if !is_reply_line {
            continue;
        }

        let address = responder(line);
        if lower.contains("time to live exceeded") {
            return Ok(EchoReply {
                status: EchoStatus::TtlExpired,
                address,
                roundtrip_ms: Some(elapsed_ms),
            });
        }
        if lower.contains("unreachable") {
            return Ok(EchoReply {
                status: EchoStatus::DestinationUnreachable,
                address,
                roundtrip_ms: None,
            });
        }
        if lower.contains("time=") {
            return Ok(EchoReply {
                status: EchoStatus::Success,
                address,
                roundtrip_ms: Some(roundtrip(line).unwrap_or(elapsed_ms)),
            });
        }
        return Ok(EchoReply {
            status: EchoStatus::Other(reply_description(line)),
            address,
            roundtrip_ms: None,
        });
    }

    let err_lower = stderr.to_ascii_lowercase();
    if RESOLUTION_MARKERS.iter().any(|m| err_lower.contains(m)) {
        return Err(TransportError::new(
            TransportErrorKind::Resolution,
            strip_program_prefix(stderr),
        ));
    }

    let timed_out = Ok(EchoReply {
        status: EchoStatus::TimedOut,
        address: None,
        roundtrip_ms: None,
    });
    match exit_code {
        // No reply within the wait.
        Some(0) | Some(1) => timed_out,
        // BSD ping exits 2 when the request went out but nothing came back.
        Some(_) if stderr.trim().is_empty() && sent_without_reply(stdout) => timed_out,
        Some(2) if !stderr.trim().is_empty() => Err(TransportError::new(
            TransportErrorKind::InvalidArgument,
            strip_program_prefix(stderr),
        )),
        Some(code) => Err(TransportError::new(
            TransportErrorKind::Socket,
            format!("ping exited with status {code}: {}", strip_program_prefix(stderr)),
        )),
        None => Err(TransportError::new(
            TransportErrorKind::Unexpected,
            "ping terminated by signal",
        )),
    }
}

/// The statistics line reports packets sent and none received.
///
/// iputils: "1 packets transmitted, 0 received, 100% packet loss"
/// BSD: "1 packets transmitted, 0 packets received, 100.0% packet loss"
fn sent_without_reply(stdout: &str) -> bool {
    stdout.lines().any(|line| {
        let mut fields = line.split(',').map(str::trim);
        let transmitted = fields
            .next()
            .and_then(|f| f.strip_suffix("packets transmitted"))
            .and_then(|n| n.trim().parse::<u32>().ok());
        let received = fields.next().is_some_and(|f| {
            f == "0 received" || f == "0 packets received"
        });
        matches!(transmitted, Some(n) if n > 0) && received
    })
}

/// Address after "from", either bare or in parentheses after a hostname.
fn responder(line: &str) -> Option<IpAddr> {
    let lower = line.to_ascii_lowercase();
    let start = lower.find("from ")? + "from ".len();
    let mut tokens = line[start..].split_whitespace();
    let first = tokens.next()?.trim_end_matches(':');
    if let Ok(addr) = first.parse() {
        return Some(addr);
    }
    tokens
        .next()
        .map(|t| t.trim_matches(|c| c == '(' || c == ')' || c == ':'))
        .and_then(|t| t.parse().ok())
}

/// "time=11.8 ms" → 12
fn roundtrip(line: &str) -> Option<u64> {
    let start = line.find("time=")? + "time=".len();
    let value: String = line[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    value.parse::<f64>().ok().map(|ms| ms.round() as u64)
}

fn reply_description(line: &str) -> String {
    // "From 10.0.0.1 icmp_seq=1 Frag needed and DF set (mtu = 1400)"
    let desc = line
        .split_whitespace()
        .skip_while(|t| !t.starts_with("icmp_seq"))
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    if desc.is_empty() {
        line.trim().to_string()
    } else {
        desc
    }
}

/// "ping: example.invalid: Name or service not known" → the part after "ping: ".
fn strip_program_prefix(stderr: &str) -> String {
    let line = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    line.strip_prefix("ping: ").unwrap_or(line).to_string()
}
