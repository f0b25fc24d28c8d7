/// True when running as root (Unix) or with an elevated token (Windows).
///
/// Without elevation the socket tables may hide owners of other users'
/// sockets and process names come back as "Access Denied".
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    return unsafe { libc::geteuid() } == 0;

    #[cfg(target_os = "windows")]
    return windows_token_elevated();

    #[cfg(not(any(unix, target_os = "windows")))]
    false
}

#[cfg(target_os = "windows")]
fn windows_token_elevated() -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::Security::{
        GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    unsafe {
        let mut token: HANDLE = std::ptr::null_mut();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
            return false;
        }

        let mut elevation = TOKEN_ELEVATION { TokenIsElevated: 0 };
        let mut returned = 0u32;
        let ok = GetTokenInformation(
            token,
            TokenElevation,
            &mut elevation as *mut _ as *mut _,
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        );
        CloseHandle(token);

        ok != 0 && elevation.TokenIsElevated != 0
    }
}
