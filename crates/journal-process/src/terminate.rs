//! Cross-platform process termination signals.

use journal_common::{ServiceError, ServiceResult};

/// Ask a process to terminate (SIGTERM on Unix, TerminateProcess on Windows).
///
/// Signalling a process that no longer exists is a no-op, not an error.
pub fn terminate_gracefully(pid: u32) -> ServiceResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(ServiceError::signal_failed(pid.to_string(), e.to_string())),
        }
    }

    #[cfg(windows)]
    {
        // The supervised backends speak no console-signal protocol, so
        // termination goes straight through the process handle.
        terminate_windows(pid)
    }
}

/// Force kill a process (SIGKILL on Unix, TerminateProcess on Windows).
pub fn force_kill(pid: u32) -> ServiceResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(ServiceError::signal_failed(pid.to_string(), e.to_string())),
        }
    }

    #[cfg(windows)]
    {
        terminate_windows(pid)
    }
}

#[cfg(windows)]
fn terminate_windows(pid: u32) -> ServiceResult<()> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

    unsafe {
        let handle = match OpenProcess(PROCESS_TERMINATE, false, pid) {
            Ok(h) if !h.is_invalid() => h,
            // Process already gone.
            _ => return Ok(()),
        };

        let result = TerminateProcess(handle, 1);
        let _ = CloseHandle(handle);

        result.map_err(|e| ServiceError::signal_failed(pid.to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signalling_nonexistent_pid_is_noop() {
        // Reserved/very high PIDs should not exist; either way the call
        // must not error for a missing process.
        let unlikely_pid = if cfg!(windows) { 99_999_999 } else { 9_999_999 };
        assert!(terminate_gracefully(unlikely_pid).is_ok());
        assert!(force_kill(unlikely_pid).is_ok());
    }
}
