//! # Journal Process
//!
//! Low-level process plumbing for the supervisor:
//! - [`ProcessHandle`]: spawn a backend process, observe its exit, kill it
//! - output capture: stdout/stderr line forwarding to pluggable sinks
//! - cross-platform liveness checks and termination signals
//!
//! A `ProcessHandle` is owned by exactly one supervisor session. The
//! underlying `Child` lives inside a wait task that publishes a single
//! [`ExitNotice`]; everything else observes that notice through a cheap
//! watch channel.

pub mod check;
pub mod handle;
pub mod output;
pub mod terminate;

pub use check::process_exists;
pub use handle::{ExitNotice, ExitWatch, ProcessHandle, SpawnError, SpawnOptions};
pub use output::{FileSink, OutputLine, OutputSink, StreamKind, TracingSink};
