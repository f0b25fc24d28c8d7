use std::io::Write;

use crate::collect::NetworkReport;
use crate::error::NetdiagError;

/// Write the report as pretty-printed JSON, newline-terminated.
pub fn write_json(report: &NetworkReport, writer: &mut impl Write) -> Result<(), NetdiagError> {
    serde_json::to_writer_pretty(&mut *writer, report)
        .map_err(|e| NetdiagError::Serialization(std::io::Error::other(e.to_string())))?;
    writeln!(writer).map_err(NetdiagError::Serialization)
}
