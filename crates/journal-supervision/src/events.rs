//! Public state types: subscriber events and status snapshots.

use chrono::{DateTime, Utc};
use journal_common::{ServiceError, ServiceName, ServicePhase};
use serde::{Deserialize, Serialize};

/// Which configured command a service was actually launched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedCommand {
    Primary,
    Fallback,
}

/// One state transition, delivered to every subscriber in transition order.
///
/// `resolved_command` and `resolved_endpoint` are filled in as soon as they
/// are known (from `Probing` and `Running` on, respectively); `failure` is
/// present exactly when `phase` is `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub service: ServiceName,
    pub phase: ServicePhase,
    pub resolved_command: Option<ResolvedCommand>,
    pub resolved_endpoint: Option<String>,
    pub failure: Option<ServiceError>,
    pub at: DateTime<Utc>,
}

/// Point-in-time snapshot of one service's state.
///
/// Published through a watch channel, so reading it never blocks and never
/// touches the supervisor actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: ServiceName,
    pub phase: ServicePhase,
    /// Attempt counter of the active probe cycle; resets on every start.
    pub probe_attempts: u32,
    pub resolved_command: Option<ResolvedCommand>,
    pub resolved_endpoint: Option<String>,
    pub last_failure: Option<ServiceError>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
}

impl ServiceStatus {
    /// The snapshot of a service that has never been started.
    pub fn idle(service: ServiceName) -> Self {
        Self {
            service,
            phase: ServicePhase::Idle,
            probe_attempts: 0,
            resolved_command: None,
            resolved_endpoint: None,
            last_failure: None,
            pid: None,
            started_at: None,
        }
    }
}
