use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::collect::CollectPlan;
use crate::probe::{DEFAULT_MAX_HOPS, ProbeConfig};

#[derive(Parser, Debug)]
#[command(
    name = "netdiag",
    version,
    about = "Socket ownership inventory and ICMP reachability probes"
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List IPv4 TCP and UDP sockets with their owning process
    Sockets(SocketsArgs),
    /// Send one echo request to each target
    Ping(PingArgs),
    /// Trace the route to a target
    Trace(TraceArgs),
    /// Collect sockets, pings and traces in one concurrent run
    Report(ReportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SocketsArgs {
    /// Output format [default: pretty]
    #[arg(long, default_value = "pretty")]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct PingArgs {
    /// Hostnames or IPv4 addresses
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Per-request timeout in milliseconds [default: 1000]
    #[arg(long, default_value_t = 1000, value_parser = validate_timeout)]
    pub timeout: u64,

    /// Output format [default: pretty]
    #[arg(long, default_value = "pretty")]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct TraceArgs {
    pub target: String,

    /// Maximum number of hops to probe [default: 30]
    #[arg(long, default_value_t = DEFAULT_MAX_HOPS, value_parser = validate_max_hops)]
    pub max_hops: u32,

    /// Per-hop timeout in milliseconds [default: 1000]
    #[arg(long, default_value_t = 1000, value_parser = validate_timeout)]
    pub timeout: u64,

    /// Output format [default: pretty]
    #[arg(long, default_value = "pretty")]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Ping this target (repeatable)
    #[arg(long = "ping", value_name = "TARGET")]
    pub pings: Vec<String>,

    /// Trace this target (repeatable)
    #[arg(long = "trace", value_name = "TARGET")]
    pub traces: Vec<String>,

    /// Skip the socket inventory
    #[arg(long)]
    pub no_sockets: bool,

    /// Maximum number of hops per trace [default: 30]
    #[arg(long, default_value_t = DEFAULT_MAX_HOPS, value_parser = validate_max_hops)]
    pub max_hops: u32,

    /// Per-probe timeout in milliseconds [default: 1000]
    #[arg(long, default_value_t = 1000, value_parser = validate_timeout)]
    pub timeout: u64,

    /// Stop starting new units after this many seconds
    #[arg(long, value_parser = validate_deadline)]
    pub deadline: Option<f64>,

    /// Output format [default: pretty]
    #[arg(long, default_value = "pretty")]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Pretty,
}

fn validate_timeout(s: &str) -> Result<u64, String> {
    let val: u64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid integer"))?;
    if val < 1 {
        Err("timeout must be at least 1 ms".to_string())
    } else if val > 60_000 {
        Err("timeout must be at most 60000 ms".to_string())
    } else {
        Ok(val)
    }
}

fn validate_max_hops(s: &str) -> Result<u32, String> {
    let val: u32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid integer"))?;
    if val < 1 {
        Err("max-hops must be at least 1".to_string())
    } else if val > 255 {
        Err("max-hops must be at most 255".to_string())
    } else {
        Ok(val)
    }
}

fn validate_deadline(s: &str) -> Result<f64, String> {
    let val: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if !(val > 0.0) {
        Err("deadline must be greater than 0 seconds".to_string())
    } else if val > 3600.0 {
        Err("deadline must be at most 3600 seconds".to_string())
    } else {
        Ok(val)
    }
}

/// A command resolved into one collection run.
pub struct ResolvedCli {
    pub plan: CollectPlan,
    pub format: OutputFormat,
    pub deadline: Option<Duration>,
}

impl Command {
    pub fn resolve(self) -> ResolvedCli {
        match self {
            Command::Sockets(s) => ResolvedCli {
                plan: CollectPlan {
                    sockets: true,
                    ..CollectPlan::default()
                },
                format: s.format,
                deadline: None,
            },
            Command::Ping(p) => ResolvedCli {
                plan: CollectPlan {
                    pings: p.targets,
                    probe: ProbeConfig {
                        timeout: Duration::from_millis(p.timeout),
                        ..ProbeConfig::default()
                    },
                    ..CollectPlan::default()
                },
                format: p.format,
                deadline: None,
            },
            Command::Trace(t) => ResolvedCli {
                plan: CollectPlan {
                    traces: vec![t.target],
                    probe: ProbeConfig {
                        timeout: Duration::from_millis(t.timeout),
                        max_hops: t.max_hops,
                    },
                    ..CollectPlan::default()
                },
                format: t.format,
                deadline: None,
            },
            Command::Report(r) => ResolvedCli {
                plan: CollectPlan {
                    sockets: !r.no_sockets,
                    pings: r.pings,
                    traces: r.traces,
                    probe: ProbeConfig {
                        timeout: Duration::from_millis(r.timeout),
                        max_hops: r.max_hops,
                    },
                },
                format: r.format,
                deadline: r.deadline.map(Duration::from_secs_f64),
            },
        }
    }
}
