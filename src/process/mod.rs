// Process name resolution for socket owners.
//
// Platform backends implement `ProcessLookup`; `resolve_process_name` applies
// the sentinel policy and never fails.
//
// On Linux: /proc/<pid>/comm.
// On Windows: OpenProcess + QueryFullProcessImageNameW.

#[cfg(target_os = "linux")]
pub(crate) mod linux;
#[cfg(target_os = "windows")]
pub(crate) mod windows;

use std::sync::Arc;

pub const SYSTEM_IDLE_PROCESS: &str = "System Idle Process";
pub const SYSTEM_PROCESS: &str = "System";
pub const INVALID_PID: &str = "Invalid PID";
pub const PROCESS_EXITED: &str = "Process Exited";
pub const ACCESS_DENIED: &str = "Access Denied";
pub const LOOKUP_ERROR: &str = "Lookup Error";
/// Socket rows the platform could not attribute to any process.
pub const UNKNOWN_OWNER: &str = "Unknown Owner";

/// Why a live process lookup did not produce a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// The pid no longer names a running process.
    Exited,
    AccessDenied,
    Other(String),
}

pub trait ProcessLookup: Send + Sync {
    fn image_name(&self, pid: u32) -> Result<String, LookupFailure>;
}

/// Best-effort display name for a socket owner.
pub fn resolve_process_name_with(lookup: &dyn ProcessLookup, pid: i32) -> String {
    match pid {
        0 => return SYSTEM_IDLE_PROCESS.to_string(),
        4 => return SYSTEM_PROCESS.to_string(),
        p if p < 0 => return INVALID_PID.to_string(),
        _ => {}
    }

    match lookup.image_name(pid as u32) {
        Ok(name) => name,
        Err(LookupFailure::Exited) => PROCESS_EXITED.to_string(),
        Err(LookupFailure::AccessDenied) => {
            log::debug!("process name lookup for pid {pid}: access denied");
            ACCESS_DENIED.to_string()
        }
        Err(LookupFailure::Other(cause)) => {
            log::warn!("process name lookup for pid {pid} failed: {cause}");
            LOOKUP_ERROR.to_string()
        }
    }
}

/// Resolve with the platform lookup.
pub fn resolve_process_name(pid: i32) -> String {
    resolve_process_name_with(system_lookup().as_ref(), pid)
}

/// Owning PIDs arrive as u32 from socket rows.
pub fn resolve_owner(lookup: &dyn ProcessLookup, owning_pid: u32) -> String {
    match i32::try_from(owning_pid) {
        Ok(pid) => resolve_process_name_with(lookup, pid),
        Err(_) => INVALID_PID.to_string(),
    }
}

pub fn system_lookup() -> Arc<dyn ProcessLookup> {
    #[cfg(target_os = "linux")]
    return Arc::new(linux::ProcCommLookup::new());

    #[cfg(target_os = "windows")]
    return Arc::new(windows::ProcessHandleLookup);

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    Arc::new(UnsupportedLookup)
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
struct UnsupportedLookup;

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
impl ProcessLookup for UnsupportedLookup {
    fn image_name(&self, _pid: u32) -> Result<String, LookupFailure> {
        Err(LookupFailure::Other("process lookup not supported on this platform".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        result: Result<String, LookupFailure>,
        calls: Mutex<Vec<u32>>,
    }

    impl Recording {
        fn new(result: Result<String, LookupFailure>) -> Self {
            Self {
                result,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProcessLookup for Recording {
        fn image_name(&self, pid: u32) -> Result<String, LookupFailure> {
            self.calls.lock().unwrap().push(pid);
            self.result.clone()
        }
    }

    #[test]
    fn sentinels_skip_the_lookup() {
        let lookup = Recording::new(Ok("never".into()));
        assert_eq!(resolve_process_name_with(&lookup, 0), "System Idle Process");
        assert_eq!(resolve_process_name_with(&lookup, 4), "System");
        assert_eq!(resolve_process_name_with(&lookup, -1), "Invalid PID");
        assert!(lookup.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn failures_map_to_display_strings() {
        let exited = Recording::new(Err(LookupFailure::Exited));
        assert_eq!(resolve_process_name_with(&exited, 1234), "Process Exited");

        let denied = Recording::new(Err(LookupFailure::AccessDenied));
        assert_eq!(resolve_process_name_with(&denied, 1234), "Access Denied");

        let other = Recording::new(Err(LookupFailure::Other("boom".into())));
        assert_eq!(resolve_process_name_with(&other, 1234), "Lookup Error");
    }

    #[test]
    fn resolved_name_is_returned() {
        let lookup = Recording::new(Ok("sshd".into()));
        assert_eq!(resolve_process_name_with(&lookup, 812), "sshd");
        assert_eq!(*lookup.calls.lock().unwrap(), vec![812]);
    }

    #[test]
    fn owner_pid_above_i32_is_invalid() {
        let lookup = Recording::new(Ok("x".into()));
        assert_eq!(resolve_owner(&lookup, u32::MAX), "Invalid PID");
        assert_eq!(resolve_owner(&lookup, 4), "System");
    }
}
