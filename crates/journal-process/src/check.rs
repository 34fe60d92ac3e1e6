//! Process existence checking.
//!
//! Non-destructive liveness checks used by the readiness probe and by
//! shutdown confirmation. On Unix this is `kill(pid, 0)`; on Windows,
//! `OpenProcess`.

use journal_common::{ServiceError, ServiceResult};

/// Check if a process with the given PID exists and is running.
///
/// Returns `Ok(true)` if the process exists (including processes we lack
/// permission to signal), `Ok(false)` if it does not.
pub fn process_exists(pid: u32) -> ServiceResult<bool> {
    #[cfg(unix)]
    {
        process_exists_unix(pid)
    }

    #[cfg(windows)]
    {
        process_exists_windows(pid)
    }
}

#[cfg(unix)]
fn process_exists_unix(pid: u32) -> ServiceResult<bool> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        // Exists, but owned by someone else.
        Err(nix::errno::Errno::EPERM) => Ok(true),
        Err(e) => Err(ServiceError::signal_failed(
            pid.to_string(),
            format!("failed to check process: {}", e),
        )),
    }
}

#[cfg(windows)]
fn process_exists_windows(pid: u32) -> ServiceResult<bool> {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    unsafe {
        let handle: HANDLE = match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
            Ok(h) => h,
            Err(e) => {
                let error_code = e.code().0 as u32;
                const ERROR_INVALID_PARAMETER: u32 = 0x80070057;
                const ERROR_ACCESS_DENIED: u32 = 0x80070005;

                if error_code == ERROR_INVALID_PARAMETER || error_code == ERROR_ACCESS_DENIED {
                    return Ok(false);
                }
                return Err(ServiceError::signal_failed(
                    pid.to_string(),
                    format!("failed to check process: {}", e),
                ));
            }
        };

        let _ = CloseHandle(handle);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_exists() {
        let current_pid = std::process::id();
        assert!(process_exists(current_pid).unwrap());
    }

    #[test]
    #[cfg(unix)]
    fn test_init_process_exists() {
        assert!(process_exists(1).unwrap());
    }

    #[test]
    fn test_unlikely_pid() {
        let unlikely_pid = if cfg!(windows) { 99_999_999 } else { 9_999_999 };
        // Should not error; existence itself is timing-dependent.
        let _ = process_exists(unlikely_pid).unwrap();
    }
}
