//! # Journal Probe
//!
//! Readiness probing for supervised backend services.
//!
//! A [`ReadinessProbe`] polls an ordered list of HTTP endpoints on a fixed
//! interval, up to a bounded attempt count, and resolves to exactly one
//! outcome: the first endpoint that answers 2xx wins, attempt exhaustion or
//! process death fails the cycle. A service may expose more than one
//! plausible health surface (an event-stream endpoint and a root path), so
//! endpoints are tried cheaply in priority order instead of requiring a
//! dedicated health route.

pub mod http;
pub mod probe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use http::HttpEndpointChecker;
pub use probe::ReadinessProbe;

/// Response type expected from a readiness endpoint; selects the Accept
/// header sent with the GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseKind {
    Json,
    EventStream,
}

impl ResponseKind {
    pub fn accept_header(&self) -> &'static str {
        match self {
            ResponseKind::Json => "application/json",
            ResponseKind::EventStream => "text/event-stream",
        }
    }
}

impl Default for ResponseKind {
    fn default() -> Self {
        ResponseKind::Json
    }
}

/// One readiness endpoint to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub url: String,
    #[serde(default)]
    pub expect: ResponseKind,
}

impl EndpointSpec {
    pub fn json(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expect: ResponseKind::Json,
        }
    }

    pub fn event_stream(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expect: ResponseKind::EventStream,
        }
    }
}

/// Result of checking a single endpoint once.
#[derive(Debug, Clone)]
pub struct ProbeCheckData {
    pub ok: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

impl ProbeCheckData {
    pub fn success(latency: Duration) -> Self {
        Self {
            ok: true,
            latency,
            error: None,
        }
    }

    pub fn failure(latency: Duration, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            latency,
            error: Some(error.into()),
        }
    }
}

/// Seam for endpoint checking so the probe loop is testable with a
/// deterministic fake.
#[async_trait]
pub trait EndpointChecker: Send + Sync {
    async fn check(&self, endpoint: &EndpointSpec, request_timeout: Duration) -> ProbeCheckData;
}

/// Parameters of one probe cycle.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Endpoints in priority order.
    pub endpoints: Vec<EndpointSpec>,
    /// Wait between ticks.
    pub interval: Duration,
    /// Maximum ticks; 0 means unbounded.
    pub max_attempts: u32,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// Terminal outcome of a probe cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// An endpoint answered with a success status.
    Ready {
        endpoint: String,
        latency: Duration,
        attempts: u32,
    },
    Failed(ProbeFailure),
}

/// Ways a probe cycle fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    /// Every attempt was used without any endpoint answering.
    Exhausted { attempts: u32 },
    /// The liveness check reported the process dead mid-cycle.
    ProcessDied { attempts: u32 },
}
