// Windows process names via a limited-information process handle.

use std::path::Path;

use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, GetLastError, HANDLE,
};
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    QueryFullProcessImageNameW,
};

use super::{LookupFailure, ProcessLookup};

const STILL_ACTIVE: u32 = 259;
const MAX_IMAGE_PATH: usize = 1024;

pub struct ProcessHandleLookup;

/// Closes the process handle on every exit path.
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.0) };
    }
}

impl ProcessLookup for ProcessHandleLookup {
    fn image_name(&self, pid: u32) -> Result<String, LookupFailure> {
        let raw = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
        if raw.is_null() {
            return Err(match unsafe { GetLastError() } {
                // A pid that names no process is rejected as an invalid parameter.
                ERROR_INVALID_PARAMETER => LookupFailure::Exited,
                ERROR_ACCESS_DENIED => LookupFailure::AccessDenied,
                code => LookupFailure::Other(format!("OpenProcess failed with error {code}")),
            });
        }
        let handle = OwnedHandle(raw);

        let mut exit_code: u32 = 0;
        if unsafe { GetExitCodeProcess(handle.0, &mut exit_code) } != 0
            && exit_code != STILL_ACTIVE
        {
            return Err(LookupFailure::Exited);
        }

        let mut buf = vec![0u16; MAX_IMAGE_PATH];
        let mut len = buf.len() as u32;
        if unsafe { QueryFullProcessImageNameW(handle.0, 0, buf.as_mut_ptr(), &mut len) } == 0 {
            return Err(match unsafe { GetLastError() } {
                ERROR_ACCESS_DENIED => LookupFailure::AccessDenied,
                code => LookupFailure::Other(format!(
                    "QueryFullProcessImageNameW failed with error {code}"
                )),
            });
        }

        let path = String::from_utf16_lossy(&buf[..len as usize]);
        Ok(image_stem(&path))
    }
}

/// "C:\Windows\System32\svchost.exe" → "svchost"
fn image_stem(path: &str) -> String {
    let file = path.rsplit(['\\', '/']).next().unwrap_or(path);
    Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}
