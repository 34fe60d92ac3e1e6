//! Output sinks for captured process stdout/stderr.
//!
//! Lines read from a child's pipes are pushed through a bounded channel to
//! a single fan-out task which writes to every configured sink. When the
//! channel is full the line is dropped and counted - a slow sink must never
//! stall the child process.

use chrono::{DateTime, Utc};
use journal_common::{ServiceError, ServiceName, ServiceResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the line channel between stream readers and the sink fan-out.
pub const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Stream a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// One captured output line with its source metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputLine {
    pub service: ServiceName,
    pub stream: StreamKind,
    pub line: String,
    pub timestamp: DateTime<Utc>,
}

/// Destination for captured process output.
///
/// `write` runs on the fan-out task and should return quickly; buffering
/// belongs inside the sink.
pub trait OutputSink: Send + Sync {
    fn write(&self, line: &OutputLine) -> ServiceResult<()>;

    fn flush(&self) -> ServiceResult<()> {
        Ok(())
    }
}

/// Sink that forwards captured lines into the host's `tracing` output.
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn write(&self, line: &OutputLine) -> ServiceResult<()> {
        match line.stream {
            StreamKind::Stdout => {
                debug!(service = %line.service, "{}", line.line);
            }
            StreamKind::Stderr => {
                debug!(service = %line.service, stream = "stderr", "{}", line.line);
            }
        }
        Ok(())
    }
}

/// Sink that appends captured lines to a file.
pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> ServiceResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ServiceError::configuration(
                    path.display().to_string(),
                    format!("failed to create log directory: {}", e),
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ServiceError::configuration(
                    path.display().to_string(),
                    format!("failed to open log file: {}", e),
                )
            })?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl OutputSink for FileSink {
    fn write(&self, line: &OutputLine) -> ServiceResult<()> {
        let mut writer = self.writer.lock();
        writeln!(
            writer,
            "[{}] [{}/{}] {}",
            line.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            line.service,
            line.stream,
            line.line
        )
        .map_err(|e| {
            ServiceError::configuration(
                self.path.display().to_string(),
                format!("failed to write log line: {}", e),
            )
        })
    }

    fn flush(&self) -> ServiceResult<()> {
        self.writer.lock().flush().map_err(|e| {
            ServiceError::configuration(
                self.path.display().to_string(),
                format!("failed to flush log file: {}", e),
            )
        })
    }
}

/// Spawn the fan-out task draining captured lines into the sinks.
///
/// The task ends when every reader has dropped its sender.
pub(crate) fn spawn_sink_fanout(
    service: ServiceName,
    sinks: Vec<Arc<dyn OutputSink>>,
) -> (mpsc::Sender<OutputLine>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<OutputLine>(OUTPUT_CHANNEL_CAPACITY);

    let task = tokio::spawn(async move {
        let mut write_errors = 0u64;
        while let Some(line) = rx.recv().await {
            for sink in &sinks {
                if let Err(e) = sink.write(&line) {
                    write_errors += 1;
                    if write_errors == 1 || write_errors % 1000 == 0 {
                        warn!(service = %service, error = %e, total = write_errors,
                              "sink write failed");
                    }
                }
            }
        }
        for sink in &sinks {
            let _ = sink.flush();
        }
        debug!(service = %service, "output fan-out finished");
    });

    (tx, task)
}

/// Spawn a reader task that splits one child stream into lines and forwards
/// them through the bounded channel, dropping on overflow.
pub(crate) fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    kind: StreamKind,
    service: ServiceName,
    tx: mpsc::Sender<OutputLine>,
    dropped: Arc<AtomicU64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reader = BufReader::new(stream);
        let mut lines = reader.lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let entry = OutputLine {
                        service: service.clone(),
                        stream: kind,
                        line,
                        timestamp: Utc::now(),
                    };
                    match tx.try_send(entry) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                            if total == 1 || total % 1000 == 0 {
                                warn!(service = %service, stream = %kind, dropped = total,
                                      "output channel full, dropping lines");
                            }
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(service = %service, stream = %kind, error = %e,
                           "error reading process output");
                    break;
                }
            }
        }
    })
}
