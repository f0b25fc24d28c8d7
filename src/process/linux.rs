use std::fs;
use std::io;
use std::path::PathBuf;

use super::{LookupFailure, ProcessLookup};

/// Reads /proc/<pid>/comm.
pub struct ProcCommLookup {
    root: PathBuf,
}

impl ProcCommLookup {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }
}

impl Default for ProcCommLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLookup for ProcCommLookup {
    fn image_name(&self, pid: u32) -> Result<String, LookupFailure> {
        let path = self.root.join(pid.to_string()).join("comm");
        match fs::read_to_string(&path) {
            Ok(s) => Ok(s.trim().to_string()),
            Err(e) => Err(classify_io(&e)),
        }
    }
}

pub(crate) fn classify_io(e: &io::Error) -> LookupFailure {
    match e.kind() {
        io::ErrorKind::NotFound => LookupFailure::Exited,
        io::ErrorKind::PermissionDenied => LookupFailure::AccessDenied,
        _ if e.raw_os_error() == Some(libc::ESRCH) => LookupFailure::Exited,
        _ => LookupFailure::Other(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_resolves() {
        let lookup = ProcCommLookup::new();
        let name = lookup.image_name(std::process::id()).unwrap();
        assert!(!name.is_empty());
    }

    #[test]
    fn missing_pid_is_exited() {
        let lookup = ProcCommLookup::new();
        // Above the default pid_max of 4194304.
        assert_eq!(lookup.image_name(999_999_999), Err(LookupFailure::Exited));
    }

    #[test]
    fn io_error_kinds() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(classify_io(&denied), LookupFailure::AccessDenied);
        let esrch = io::Error::from_raw_os_error(libc::ESRCH);
        assert_eq!(classify_io(&esrch), LookupFailure::Exited);
        let other = io::Error::other("disk on fire");
        assert!(matches!(classify_io(&other), LookupFailure::Other(_)));
    }
}
