//! Core domain types: service identity and lifecycle phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Service identifier - uniquely identifies one supervised backend service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle phase of a supervised service.
///
/// Within one session the phase only ever moves forward:
/// `Idle -> Starting -> Probing -> Running`, with `Starting`/`Probing`
/// falling to `Failed` and `Running` falling to `Stopped` or `Failed`.
/// `Failed` and `Stopped` both permit a fresh start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServicePhase {
    /// Never started in this registry's lifetime.
    Idle,
    /// A start was accepted; the process is being launched.
    Starting,
    /// The process is up and the readiness probe is polling.
    Probing,
    /// A readiness endpoint answered; the service is usable.
    Running,
    /// A terminal startup failure or unexpected death occurred.
    Failed,
    /// Explicitly stopped.
    Stopped,
}

impl ServicePhase {
    /// A fresh `start` is only legal outside the active phases.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed | Self::Stopped)
    }

    /// Active means a live process may exist (or is being created).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Probing | Self::Running)
    }

    /// Check whether moving to `target` is a legal transition.
    pub fn can_transition(&self, target: ServicePhase) -> bool {
        use ServicePhase::*;
        match (*self, target) {
            (Idle, Starting) => true,
            (Starting, Probing) | (Starting, Failed) => true,
            (Probing, Running) | (Probing, Failed) | (Probing, Stopped) => true,
            (Running, Stopped) | (Running, Failed) => true,
            (Failed, Starting) | (Stopped, Starting) => true,
            (from, to) if from == to => true,
            _ => false,
        }
    }
}

impl fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServicePhase::Idle => "idle",
            ServicePhase::Starting => "starting",
            ServicePhase::Probing => "probing",
            ServicePhase::Running => "running",
            ServicePhase::Failed => "failed",
            ServicePhase::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name() {
        let name = ServiceName::from("journal-api");
        assert_eq!(name.as_str(), "journal-api");
        assert_eq!(name.to_string(), "journal-api");
    }

    #[test]
    fn test_phase_can_start() {
        assert!(ServicePhase::Idle.can_start());
        assert!(ServicePhase::Failed.can_start());
        assert!(ServicePhase::Stopped.can_start());
        assert!(!ServicePhase::Starting.can_start());
        assert!(!ServicePhase::Probing.can_start());
        assert!(!ServicePhase::Running.can_start());
    }

    #[test]
    fn test_valid_transitions() {
        use ServicePhase::*;
        assert!(Idle.can_transition(Starting));
        assert!(Starting.can_transition(Probing));
        assert!(Probing.can_transition(Running));
        assert!(Probing.can_transition(Stopped));
        assert!(Running.can_transition(Failed));
        assert!(Failed.can_transition(Starting));
        assert!(Stopped.can_transition(Starting));
    }

    #[test]
    fn test_invalid_transitions() {
        use ServicePhase::*;
        // Running requires a successful probe first.
        assert!(!Idle.can_transition(Running));
        assert!(!Starting.can_transition(Running));
        // Terminal states never regress to intermediate ones.
        assert!(!Failed.can_transition(Probing));
        assert!(!Stopped.can_transition(Running));
    }
}
