//! Error types for the supervisor.
//!
//! Every terminal startup failure resolves to exactly one of the taxonomy
//! variants below, so subscribers can distinguish "the launcher executable
//! was missing" from "the process booted and then died" without parsing
//! message strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for supervisor operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Error type for service supervision.
///
/// Errors are `Clone` + `Serialize` because they travel inside state-change
/// events to an arbitrary number of subscribers.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceError {
    /// No service with this name is registered.
    #[error("service not found: {name}")]
    NotFound { name: String },

    /// The launch executable could not be located. This is the one spawn
    /// failure that triggers the fallback command, when one is configured.
    #[error("executable not found: {command}")]
    SpawnNotFound { command: String },

    /// The process failed to start for a reason other than a missing
    /// executable. Terminal; the fallback is not attempted.
    #[error("spawn failed: {command} - {reason}")]
    SpawnFailed { command: String, reason: String },

    /// The child exited before the supervisor observed it as ready, or
    /// died unexpectedly while running.
    #[error("process exited: {name} - exit code {code:?}")]
    ExitedEarly { name: String, code: Option<i32> },

    /// Every readiness attempt was used without any endpoint answering.
    #[error("readiness probe exhausted: {name} - no endpoint ready after {attempts} attempt(s)")]
    ProbeExhausted { name: String, attempts: u32 },

    /// The liveness check failed mid-probe; polling a dead process is
    /// pointless and stops immediately.
    #[error("process died while probing: {name}")]
    ProbeProcessDied { name: String },

    /// Invalid or inconsistent configuration.
    #[error("configuration error: {name} - {reason}")]
    Configuration { name: String, reason: String },

    /// The supervisor actor is gone (channel closed).
    #[error("supervisor unavailable: {name} - {reason}")]
    SupervisorGone { name: String, reason: String },

    /// Sending a termination signal failed.
    #[error("signal failed: {name} - {reason}")]
    SignalFailed { name: String, reason: String },
}

impl ServiceError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn spawn_not_found(command: impl Into<String>) -> Self {
        Self::SpawnNotFound {
            command: command.into(),
        }
    }

    pub fn spawn_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn exited_early(name: impl Into<String>, code: Option<i32>) -> Self {
        Self::ExitedEarly {
            name: name.into(),
            code,
        }
    }

    pub fn probe_exhausted(name: impl Into<String>, attempts: u32) -> Self {
        Self::ProbeExhausted {
            name: name.into(),
            attempts,
        }
    }

    pub fn probe_process_died(name: impl Into<String>) -> Self {
        Self::ProbeProcessDied { name: name.into() }
    }

    pub fn configuration(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn supervisor_gone(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SupervisorGone {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn signal_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for the failure variants that end a start attempt.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Self::SpawnNotFound { .. }
                | Self::SpawnFailed { .. }
                | Self::ExitedEarly { .. }
                | Self::ProbeExhausted { .. }
                | Self::ProbeProcessDied { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = ServiceError::spawn_not_found("uv");
        assert!(matches!(err, ServiceError::SpawnNotFound { .. }));
        assert_eq!(err.to_string(), "executable not found: uv");

        let err = ServiceError::probe_exhausted("journal-api", 30);
        assert!(err.to_string().contains("30 attempt(s)"));
    }

    #[test]
    fn test_startup_failure_classification() {
        assert!(ServiceError::spawn_not_found("x").is_startup_failure());
        assert!(ServiceError::exited_early("x", Some(1)).is_startup_failure());
        assert!(ServiceError::probe_process_died("x").is_startup_failure());
        assert!(!ServiceError::not_found("x").is_startup_failure());
        assert!(!ServiceError::supervisor_gone("x", "closed").is_startup_failure());
    }

    #[test]
    fn test_error_pattern_matching() {
        let err = ServiceError::exited_early("journal-mcp", Some(3));
        match err {
            ServiceError::ExitedEarly { name, code } => {
                assert_eq!(name, "journal-mcp");
                assert_eq!(code, Some(3));
            }
            _ => panic!("wrong error variant"),
        }
    }
}
