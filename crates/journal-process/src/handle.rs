//! ProcessHandle - ownership wrapper around one spawned backend process.
//!
//! The `tokio::process::Child` is moved into a wait task immediately after
//! spawning; it publishes exactly one [`ExitNotice`] on a watch channel.
//! Everything else (the supervisor, the readiness probe's liveness check)
//! observes the process through cheap clones of that channel, and
//! termination is PID-signal based.

use crate::output::{spawn_sink_fanout, spawn_stream_reader, OutputSink, StreamKind};
use crate::terminate;
use journal_common::{ServiceError, ServiceName, ServiceResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Hard ceiling on the force-kill confirmation wait.
const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// Everything needed to spawn one backend process.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub service: ServiceName,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
}

impl SpawnOptions {
    pub fn new(service: ServiceName, program: impl Into<String>) -> Self {
        Self {
            service,
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            capture_stdout: true,
            capture_stderr: true,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Launch-time failure, with "executable missing" kept distinguishable from
/// every other reason - the launcher's fallback decision depends on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpawnError {
    #[error("executable not found: {command}")]
    NotFound { command: String },

    #[error("spawn failed: {command} - {reason}")]
    Other { command: String, reason: String },
}

impl SpawnError {
    pub fn command(&self) -> &str {
        match self {
            SpawnError::NotFound { command } => command,
            SpawnError::Other { command, .. } => command,
        }
    }

    pub fn into_service_error(self) -> ServiceError {
        match self {
            SpawnError::NotFound { command } => ServiceError::SpawnNotFound { command },
            SpawnError::Other { command, reason } => ServiceError::SpawnFailed { command, reason },
        }
    }
}

/// The single terminal notification of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitNotice {
    /// Exit code; `None` when the process was ended by a signal.
    pub code: Option<i32>,
}

/// Cheap observer of a process's exit state.
#[derive(Debug, Clone)]
pub struct ExitWatch {
    rx: watch::Receiver<Option<ExitNotice>>,
}

impl ExitWatch {
    /// True while no exit notice has been published.
    pub fn is_alive(&self) -> bool {
        self.rx.borrow().is_none() && self.rx.has_changed().is_ok()
    }

    pub fn notice(&self) -> Option<ExitNotice> {
        *self.rx.borrow()
    }

    /// Wait for the exit notice. Returns `None` only if the wait task
    /// disappeared without publishing, which should not happen.
    pub async fn wait(mut self) -> Option<ExitNotice> {
        loop {
            if let Some(notice) = *self.rx.borrow() {
                return Some(notice);
            }
            if self.rx.changed().await.is_err() {
                return *self.rx.borrow();
            }
        }
    }
}

/// Handle to one spawned backend process.
///
/// Owned exclusively by a single supervisor session; never cloned. Dropping
/// the handle does not kill the process - teardown is explicit via
/// [`ProcessHandle::stop`].
pub struct ProcessHandle {
    service: ServiceName,
    command: String,
    pid: u32,
    exit_rx: watch::Receiver<Option<ExitNotice>>,
    kill_sent: AtomicBool,
}

impl ProcessHandle {
    /// Spawn a process and wire its output streams to the given sinks.
    pub fn spawn(
        options: SpawnOptions,
        sinks: Vec<Arc<dyn OutputSink>>,
    ) -> Result<ProcessHandle, SpawnError> {
        let SpawnOptions {
            service,
            program,
            args,
            working_dir,
            env,
            capture_stdout,
            capture_stderr,
        } = options;

        let mut cmd = Command::new(&program);
        cmd.args(&args);

        if let Some(ref dir) = working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &env {
            cmd.env(key, value);
        }

        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(if capture_stdout {
            std::process::Stdio::piped()
        } else {
            std::process::Stdio::null()
        });
        cmd.stderr(if capture_stderr {
            std::process::Stdio::piped()
        } else {
            std::process::Stdio::null()
        });

        // Isolate the child from console signals aimed at the host.
        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SpawnError::NotFound {
                    command: program.clone(),
                }
            } else {
                SpawnError::Other {
                    command: program.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let pid = child.id().unwrap_or(0);

        if capture_stdout || capture_stderr {
            let (line_tx, _fanout) = spawn_sink_fanout(service.clone(), sinks);
            let dropped = Arc::new(AtomicU64::new(0));

            if let Some(stdout) = child.stdout.take() {
                spawn_stream_reader(
                    stdout,
                    StreamKind::Stdout,
                    service.clone(),
                    line_tx.clone(),
                    Arc::clone(&dropped),
                );
            }
            if let Some(stderr) = child.stderr.take() {
                spawn_stream_reader(
                    stderr,
                    StreamKind::Stderr,
                    service.clone(),
                    line_tx.clone(),
                    Arc::clone(&dropped),
                );
            }
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        {
            let service = service.clone();
            tokio::spawn(async move {
                let notice = match child.wait().await {
                    Ok(status) => ExitNotice {
                        code: status.code(),
                    },
                    Err(e) => {
                        warn!(service = %service, error = %e, "failed to await child exit");
                        ExitNotice { code: None }
                    }
                };
                debug!(service = %service, code = ?notice.code, "process exited");
                let _ = exit_tx.send(Some(notice));
            });
        }

        info!(service = %service, %pid, command = %program, "process spawned");

        Ok(ProcessHandle {
            service,
            command: program,
            pid,
            exit_rx,
            kill_sent: AtomicBool::new(false),
        })
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    /// The program string this handle was spawned with.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    pub fn exit_notice(&self) -> Option<ExitNotice> {
        *self.exit_rx.borrow()
    }

    /// Get a cloneable exit observer for liveness checks and exit watching.
    pub fn exit_watch(&self) -> ExitWatch {
        ExitWatch {
            rx: self.exit_rx.clone(),
        }
    }

    /// Send the termination signal. Idempotent: killing an already-dead or
    /// already-signalled process is a no-op.
    pub fn kill(&self) -> ServiceResult<()> {
        if self.exit_notice().is_some() {
            return Ok(());
        }
        if self.kill_sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(service = %self.service, pid = self.pid, "sending termination signal");
        terminate::terminate_gracefully(self.pid)
    }

    /// Kill the process and wait for its exit to be confirmed, escalating
    /// to a force kill after `graceful_timeout`.
    pub async fn stop(&self, graceful_timeout: Duration) -> ServiceResult<Option<ExitNotice>> {
        if let Some(notice) = self.exit_notice() {
            return Ok(Some(notice));
        }

        self.kill()?;

        if let Ok(notice) = timeout(graceful_timeout, self.exit_watch().wait()).await {
            debug!(service = %self.service, "process terminated gracefully");
            return Ok(notice);
        }

        warn!(service = %self.service, pid = self.pid,
              "graceful shutdown timed out, force killing");
        terminate::force_kill(self.pid)?;

        match timeout(FORCE_KILL_TIMEOUT, self.exit_watch().wait()).await {
            Ok(notice) => Ok(notice),
            Err(_) => {
                warn!(service = %self.service, pid = self.pid,
                      "process exit not confirmed after force kill");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("service", &self.service)
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("alive", &self.is_alive())
            .finish()
    }
}
