#[derive(Debug, thiserror::Error)]
pub enum NetdiagError {
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{table} table query failed during {stage}: status {status}")]
    BufferNegotiation {
        table: &'static str,
        stage: &'static str,
        status: u32,
    },
    #[error("{table} table declares {declared} rows but buffer holds only {available}")]
    DecodeBounds {
        table: &'static str,
        declared: usize,
        available: usize,
    },
    #[error("unsupported on this platform: {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[source] std::io::Error),
    #[error("fatal: {0}")]
    Fatal(String),
}
