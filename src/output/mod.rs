pub mod json;
pub mod pretty;

use std::io::Write;

use crate::cli::OutputFormat;
use crate::collect::NetworkReport;
use crate::error::NetdiagError;

/// Write a collection report in the specified format.
pub fn write_report(
    report: &NetworkReport,
    format: OutputFormat,
    writer: &mut impl Write,
) -> Result<(), NetdiagError> {
    match format {
        OutputFormat::Json => json::write_json(report, writer),
        OutputFormat::Pretty => pretty::write_pretty(report, writer),
    }
}
