//! The readiness probe loop.
//!
//! A bounded polling loop with a single exit point per terminal condition:
//! first 2xx endpoint ends the cycle as ready, attempt exhaustion and
//! process death end it as failed, cancellation ends it silently. The loop
//! never outlives the process it is polling: the liveness check runs after
//! every fully-failed tick.

use crate::{
    EndpointChecker, ProbeCheckData, ProbeFailure, ProbeOutcome, ProbeSettings,
};
use journal_common::ServiceName;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often failed-tick detail is logged after the first attempt.
const FAILURE_LOG_EVERY: u32 = 5;

type LivenessFn = Box<dyn Fn() -> bool + Send + Sync>;
type AttemptHook = Box<dyn Fn(u32) + Send + Sync>;

/// One readiness probe cycle for one service session.
///
/// Constructed per start attempt, consumed by [`ReadinessProbe::run`].
pub struct ReadinessProbe<C> {
    service: ServiceName,
    settings: ProbeSettings,
    checker: C,
    liveness: LivenessFn,
    attempt_hook: Option<AttemptHook>,
}

impl<C: EndpointChecker> ReadinessProbe<C> {
    pub fn new(
        service: ServiceName,
        settings: ProbeSettings,
        checker: C,
        liveness: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            service,
            settings,
            checker,
            liveness: Box::new(liveness),
            attempt_hook: None,
        }
    }

    /// Install a hook invoked with the attempt counter after every
    /// fully-failed tick, for live status reporting.
    pub fn on_attempt(mut self, hook: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.attempt_hook = Some(Box::new(hook));
        self
    }

    /// Run the probe cycle to completion.
    ///
    /// Returns `None` when cancelled; otherwise exactly one
    /// [`ProbeOutcome`]. Cancellation is honored between ticks - no new
    /// tick begins once the token is cancelled.
    pub async fn run(self, cancel: CancellationToken) -> Option<ProbeOutcome> {
        let mut attempts: u32 = 0;

        info!(
            service = %self.service,
            endpoints = self.settings.endpoints.len(),
            interval = ?self.settings.interval,
            max_attempts = self.settings.max_attempts,
            "readiness probe started"
        );

        loop {
            if cancel.is_cancelled() {
                debug!(service = %self.service, "readiness probe cancelled");
                return None;
            }

            let log_this_tick = attempts == 0 || (attempts + 1) % FAILURE_LOG_EVERY == 0;

            for endpoint in &self.settings.endpoints {
                let data: ProbeCheckData = self
                    .checker
                    .check(endpoint, self.settings.request_timeout)
                    .await;

                if data.ok {
                    info!(
                        service = %self.service,
                        endpoint = %endpoint.url,
                        latency = ?data.latency,
                        attempts = attempts + 1,
                        "service ready"
                    );
                    return Some(ProbeOutcome::Ready {
                        endpoint: endpoint.url.clone(),
                        latency: data.latency,
                        attempts: attempts + 1,
                    });
                }

                if log_this_tick {
                    debug!(
                        service = %self.service,
                        endpoint = %endpoint.url,
                        error = data.error.as_deref().unwrap_or("unknown"),
                        attempt = attempts + 1,
                        "endpoint not ready"
                    );
                }
            }

            attempts += 1;
            if let Some(ref hook) = self.attempt_hook {
                hook(attempts);
            }

            if !(self.liveness)() {
                warn!(service = %self.service, attempts, "process died during readiness probing");
                return Some(ProbeOutcome::Failed(ProbeFailure::ProcessDied { attempts }));
            }

            if self.settings.max_attempts != 0 && attempts >= self.settings.max_attempts {
                warn!(service = %self.service, attempts, "readiness attempts exhausted");
                return Some(ProbeOutcome::Failed(ProbeFailure::Exhausted { attempts }));
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(service = %self.service, "readiness probe cancelled");
                    return None;
                }
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EndpointSpec, ProbeCheckData};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Checker scripted by URL: listed URLs succeed, everything else fails.
    struct FakeChecker {
        ok_urls: HashSet<String>,
        calls: Arc<AtomicU32>,
    }

    impl FakeChecker {
        fn new(ok_urls: &[&str]) -> Self {
            Self {
                ok_urls: ok_urls.iter().map(|s| s.to_string()).collect(),
                calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl EndpointChecker for FakeChecker {
        async fn check(&self, endpoint: &EndpointSpec, _timeout: Duration) -> ProbeCheckData {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok_urls.contains(&endpoint.url) {
                ProbeCheckData::success(Duration::from_millis(1))
            } else {
                ProbeCheckData::failure(Duration::from_millis(1), "connection refused")
            }
        }
    }

    fn settings(urls: &[&str], max_attempts: u32) -> ProbeSettings {
        ProbeSettings {
            endpoints: urls.iter().map(|u| EndpointSpec::json(*u)).collect(),
            interval: Duration::from_millis(2),
            max_attempts,
            request_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_exhausts_after_exactly_max_attempts() {
        let checker = FakeChecker::new(&[]);
        let calls = Arc::clone(&checker.calls);
        let probe = ReadinessProbe::new(
            ServiceName::from("svc"),
            settings(&["http://127.0.0.1:1/a", "http://127.0.0.1:1/b"], 3),
            checker,
            || true,
        );

        let outcome = probe.run(CancellationToken::new()).await.unwrap();
        assert_eq!(
            outcome,
            ProbeOutcome::Failed(ProbeFailure::Exhausted { attempts: 3 })
        );
        // 2 endpoints x exactly 3 ticks, never a 4th.
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_second_endpoint_wins_when_first_fails() {
        let checker = FakeChecker::new(&["http://127.0.0.1:1/ok"]);
        let probe = ReadinessProbe::new(
            ServiceName::from("svc"),
            settings(&["http://127.0.0.1:1/dead", "http://127.0.0.1:1/ok"], 5),
            checker,
            || true,
        );

        match probe.run(CancellationToken::new()).await.unwrap() {
            ProbeOutcome::Ready {
                endpoint, attempts, ..
            } => {
                assert_eq!(endpoint, "http://127.0.0.1:1/ok");
                assert_eq!(attempts, 1);
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dead_process_stops_probing() {
        let checker = FakeChecker::new(&[]);
        let calls = Arc::clone(&checker.calls);
        // Unbounded attempts: only the liveness check can end this cycle.
        let probe = ReadinessProbe::new(
            ServiceName::from("svc"),
            settings(&["http://127.0.0.1:1/a"], 0),
            checker,
            || false,
        );

        let outcome = probe.run(CancellationToken::new()).await.unwrap();
        assert_eq!(
            outcome,
            ProbeOutcome::Failed(ProbeFailure::ProcessDied { attempts: 1 })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_yields_no_outcome() {
        let checker = FakeChecker::new(&[]);
        let probe = ReadinessProbe::new(
            ServiceName::from("svc"),
            settings(&["http://127.0.0.1:1/a"], 0),
            checker,
            || true,
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(probe.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_attempt_hook_reports_monotonic_counts() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let checker = FakeChecker::new(&[]);
        let seen_clone = Arc::clone(&seen);
        let probe = ReadinessProbe::new(
            ServiceName::from("svc"),
            settings(&["http://127.0.0.1:1/a"], 4),
            checker,
            || true,
        )
        .on_attempt(move |n| seen_clone.lock().unwrap().push(n));

        probe.run(CancellationToken::new()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
    }
}
