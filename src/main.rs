use std::io::{self, Write};

use clap::Parser;

use netdiag::cli::Cli;
use netdiag::collect::{self, Backends, CancelToken, NetworkReport, TableErrorKind};
use netdiag::error::NetdiagError;
use netdiag::output;
use netdiag::privilege;

/// Exit codes: 1 permission, 2 socket table query, 4 anything else.
fn exit_code(err: &NetdiagError) -> i32 {
    match err {
        NetdiagError::PermissionDenied(_) => 1,
        NetdiagError::BufferNegotiation { .. } | NetdiagError::DecodeBounds { .. } => 2,
        _ => 4,
    }
}

/// Exit code for a report that was produced but whose socket tables failed.
fn report_exit_code(report: &NetworkReport) -> i32 {
    let Some(inventory) = &report.sockets else {
        return 0;
    };
    inventory
        .errors()
        .map(|e| match e.kind {
            TableErrorKind::PermissionDenied => 1,
            TableErrorKind::QueryFailed => 2,
            TableErrorKind::Other => 4,
        })
        .max()
        .unwrap_or(0)
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(cli)));

    match result {
        Ok(Ok(code)) => std::process::exit(code),
        Ok(Err(e)) => {
            eprintln!("error: {e}");
            std::process::exit(exit_code(&e));
        }
        Err(_) => {
            eprintln!("error: fatal: unexpected panic");
            std::process::exit(4);
        }
    }
}

fn run(cli: Cli) -> Result<i32, NetdiagError> {
    let resolved = cli.command.resolve();

    if !privilege::is_elevated() {
        log::warn!("not running elevated; socket owners and process names may be incomplete");
    }

    let backends = Backends::system();
    let cancel = match resolved.deadline {
        Some(budget) => CancelToken::with_deadline(budget),
        None => CancelToken::new(),
    };

    let report = collect::collect(&backends, &resolved.plan, &cancel)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    output::write_report(&report, resolved.format, &mut out)?;
    out.flush().map_err(NetdiagError::Io)?;

    Ok(report_exit_code(&report))
}
