//! ServiceSupervisor - one actor per supervised backend service.
//!
//! The actor task owns the process handle and all lifecycle state; nothing
//! else mutates them. A cloneable [`ServiceSupervisor`] handle sends it
//! commands over a channel, reads status snapshots from a watch channel,
//! and hands out broadcast subscriptions for state-change events.
//!
//! Probe results and process-exit notices arrive as internal messages
//! tagged with a session epoch; messages from a previous session (a probe
//! cancelled by `stop`, the exit of a process we killed ourselves) are
//! discarded, which keeps transitions monotonic within a session.

use crate::config::ServiceSpec;
use crate::events::{ResolvedCommand, ServiceEvent, ServiceStatus};
use crate::launcher::{Launched, Launcher};
use chrono::{DateTime, Utc};
use journal_common::{ServiceError, ServiceName, ServicePhase, ServiceResult};
use journal_probe::{
    EndpointChecker, HttpEndpointChecker, ProbeFailure, ProbeOutcome, ReadinessProbe,
};
use journal_process::{ExitNotice, OutputSink, ProcessHandle};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CMD_CHANNEL_CAPACITY: usize = 16;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Immediate acknowledgement of a `start` request. The eventual outcome
/// arrives through the event stream, never here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAck {
    Accepted,
    /// A start, probe or running session is already in progress.
    AlreadyActive(ServicePhase),
}

enum SupervisorCommand {
    Start { resp: oneshot::Sender<StartAck> },
    Stop { resp: oneshot::Sender<()> },
}

enum InternalEvent {
    ProbeAttempt { session: u64, attempts: u32 },
    ProbeFinished { session: u64, outcome: ProbeOutcome },
    ProcessExited { session: u64, notice: ExitNotice },
}

/// Cloneable handle to one service's supervisor actor.
#[derive(Clone)]
pub struct ServiceSupervisor {
    name: ServiceName,
    cmd_tx: mpsc::Sender<SupervisorCommand>,
    events_tx: broadcast::Sender<ServiceEvent>,
    status_rx: watch::Receiver<ServiceStatus>,
}

impl ServiceSupervisor {
    /// Create a supervisor probing over real loopback HTTP.
    pub fn new(spec: ServiceSpec, sinks: Vec<Arc<dyn OutputSink>>) -> Self {
        Self::with_checker(spec, sinks, HttpEndpointChecker::new())
    }

    /// Create a supervisor with a custom endpoint checker (tests inject a
    /// deterministic one here).
    pub fn with_checker<C>(spec: ServiceSpec, sinks: Vec<Arc<dyn OutputSink>>, checker: C) -> Self
    where
        C: EndpointChecker + Clone + 'static,
    {
        let name = spec.name.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(ServiceStatus::idle(name.clone()));
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let actor = SupervisorActor {
            spec,
            checker,
            sinks,
            session: 0,
            phase: ServicePhase::Idle,
            handle: None,
            resolved: None,
            resolved_endpoint: None,
            last_failure: None,
            probe_attempts: 0,
            started_at: None,
            probe_cancel: None,
            internal_tx,
            events_tx: events_tx.clone(),
            status_tx,
        };
        tokio::spawn(actor.run(cmd_rx, internal_rx));

        Self {
            name,
            cmd_tx,
            events_tx,
            status_rx,
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    /// Request a start. Returns as soon as the request is acknowledged;
    /// subscribe to events for the outcome.
    pub async fn start(&self) -> ServiceResult<StartAck> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCommand::Start { resp: tx })
            .await
            .map_err(|_| self.gone("start: actor unavailable (channel closed)"))?;
        rx.await
            .map_err(|_| self.gone("start: actor dropped response"))
    }

    /// Stop the service. Idempotent and legal in every phase; when this
    /// returns, any live process has been observed as killed and no further
    /// probe tick will run for the old session.
    pub async fn stop(&self) -> ServiceResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCommand::Stop { resp: tx })
            .await
            .map_err(|_| self.gone("stop: actor unavailable (channel closed)"))?;
        rx.await
            .map_err(|_| self.gone("stop: actor dropped response"))
    }

    /// Current state snapshot; a non-blocking read that never touches the
    /// actor.
    pub fn status(&self) -> ServiceStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to state-change events, delivered in transition order.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events_tx.subscribe()
    }

    fn gone(&self, reason: &str) -> ServiceError {
        ServiceError::supervisor_gone(self.name.as_str(), reason)
    }
}

struct SupervisorActor<C> {
    spec: ServiceSpec,
    checker: C,
    sinks: Vec<Arc<dyn OutputSink>>,

    /// Epoch incremented on every start and stop; internal events carrying
    /// an older value are stale.
    session: u64,
    phase: ServicePhase,
    handle: Option<ProcessHandle>,
    resolved: Option<ResolvedCommand>,
    resolved_endpoint: Option<String>,
    last_failure: Option<ServiceError>,
    probe_attempts: u32,
    started_at: Option<DateTime<Utc>>,
    probe_cancel: Option<CancellationToken>,

    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    events_tx: broadcast::Sender<ServiceEvent>,
    status_tx: watch::Sender<ServiceStatus>,
}

impl<C> SupervisorActor<C>
where
    C: EndpointChecker + Clone + 'static,
{
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<SupervisorCommand>,
        mut internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
    ) {
        loop {
            // Internal events first: they resolve the fate of the session a
            // command may be about to act on.
            tokio::select! {
                biased;

                Some(event) = internal_rx.recv() => {
                    self.handle_internal(event).await;
                }

                maybe_cmd = cmd_rx.recv() => {
                    match maybe_cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            self.teardown().await;
                            break;
                        }
                    }
                }
            }
        }
        debug!(service = %self.spec.name, "supervisor actor terminated");
    }

    async fn handle_command(&mut self, cmd: SupervisorCommand) {
        match cmd {
            SupervisorCommand::Start { resp } => {
                if !self.phase.can_start() {
                    debug!(service = %self.spec.name, phase = %self.phase,
                           "start rejected: already active");
                    let _ = resp.send(StartAck::AlreadyActive(self.phase));
                    return;
                }
                let _ = resp.send(StartAck::Accepted);
                self.begin_session();
            }
            SupervisorCommand::Stop { resp } => {
                self.handle_stop().await;
                let _ = resp.send(());
            }
        }
    }

    /// Start a fresh session: launch the process and kick off its probe.
    fn begin_session(&mut self) {
        self.session += 1;
        self.probe_attempts = 0;
        self.resolved = None;
        self.resolved_endpoint = None;
        self.last_failure = None;
        self.started_at = None;

        self.set_phase(ServicePhase::Starting);
        info!(service = %self.spec.name, "starting service");

        let launcher = Launcher::new(self.sinks.clone());
        let Launched { handle, resolved } = match launcher.launch(&self.spec) {
            Ok(launched) => launched,
            Err(err) => {
                self.fail(err);
                return;
            }
        };

        self.resolved = Some(resolved);
        self.started_at = Some(Utc::now());

        // Exit watcher: translates the one terminal process notification
        // into an internal event for this session.
        let session = self.session;
        let exit_watch = handle.exit_watch();
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            if let Some(notice) = exit_watch.wait().await {
                let _ = internal_tx.send(InternalEvent::ProcessExited { session, notice });
            }
        });

        let liveness = handle.exit_watch();
        self.handle = Some(handle);
        self.set_phase(ServicePhase::Probing);

        let cancel = CancellationToken::new();
        self.probe_cancel = Some(cancel.clone());

        let attempt_tx = self.internal_tx.clone();
        let probe = ReadinessProbe::new(
            self.spec.name.clone(),
            self.spec.probe_settings(),
            self.checker.clone(),
            move || liveness.is_alive(),
        )
        .on_attempt(move |attempts| {
            let _ = attempt_tx.send(InternalEvent::ProbeAttempt { session, attempts });
        });

        let outcome_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            if let Some(outcome) = probe.run(cancel).await {
                let _ = outcome_tx.send(InternalEvent::ProbeFinished { session, outcome });
            }
        });
    }

    async fn handle_stop(&mut self) {
        if let Some(cancel) = self.probe_cancel.take() {
            cancel.cancel();
        }

        let Some(handle) = self.handle.take() else {
            debug!(service = %self.spec.name, phase = %self.phase, "stop: nothing to do");
            return;
        };

        info!(service = %self.spec.name, pid = handle.pid(), "stopping service");
        if let Err(e) = handle.stop(self.spec.graceful_timeout).await {
            warn!(service = %self.spec.name, error = %e, "error while stopping process");
        }

        // Anything still in flight for the old session is now stale.
        self.session += 1;
        self.set_phase(ServicePhase::Stopped);
    }

    async fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::ProbeAttempt { session, attempts } => {
                if session == self.session && self.phase == ServicePhase::Probing {
                    self.probe_attempts = attempts;
                    self.publish_status();
                }
            }
            InternalEvent::ProbeFinished { session, outcome } => {
                if session != self.session || self.phase != ServicePhase::Probing {
                    debug!(service = %self.spec.name, "discarding stale probe outcome");
                    return;
                }
                match outcome {
                    ProbeOutcome::Ready {
                        endpoint,
                        latency,
                        attempts,
                    } => {
                        info!(
                            service = %self.spec.name,
                            %endpoint,
                            ?latency,
                            attempts,
                            "service is ready"
                        );
                        self.probe_attempts = attempts;
                        self.resolved_endpoint = Some(endpoint);
                        self.set_phase(ServicePhase::Running);
                    }
                    ProbeOutcome::Failed(ProbeFailure::Exhausted { attempts }) => {
                        self.probe_attempts = attempts;
                        self.kill_current_process().await;
                        self.fail(ServiceError::probe_exhausted(
                            self.spec.name.as_str(),
                            attempts,
                        ));
                    }
                    ProbeOutcome::Failed(ProbeFailure::ProcessDied { attempts }) => {
                        self.probe_attempts = attempts;
                        self.kill_current_process().await;
                        self.fail(ServiceError::probe_process_died(self.spec.name.as_str()));
                    }
                }
            }
            InternalEvent::ProcessExited { session, notice } => {
                if session != self.session {
                    return;
                }
                match self.phase {
                    ServicePhase::Probing => {
                        if let Some(cancel) = self.probe_cancel.take() {
                            cancel.cancel();
                        }
                        self.handle = None;
                        self.fail(ServiceError::exited_early(
                            self.spec.name.as_str(),
                            notice.code,
                        ));
                    }
                    ServicePhase::Running => {
                        error!(
                            service = %self.spec.name,
                            code = ?notice.code,
                            "process died unexpectedly"
                        );
                        self.handle = None;
                        self.fail(ServiceError::exited_early(
                            self.spec.name.as_str(),
                            notice.code,
                        ));
                    }
                    _ => {}
                }
            }
        }
    }

    /// Kill and drop the current process handle, if any.
    async fn kill_current_process(&mut self) {
        if let Some(cancel) = self.probe_cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.stop(self.spec.graceful_timeout).await {
                warn!(service = %self.spec.name, error = %e, "error killing process");
            }
        }
    }

    /// Teardown when every supervisor handle is gone: the process must not
    /// outlive its supervisor.
    async fn teardown(&mut self) {
        if self.handle.is_some() {
            info!(service = %self.spec.name, "supervisor dropped, stopping process");
        }
        self.kill_current_process().await;
        self.session += 1;
    }

    fn fail(&mut self, err: ServiceError) {
        warn!(service = %self.spec.name, error = %err, "service failed");
        self.last_failure = Some(err);
        self.set_phase(ServicePhase::Failed);
    }

    fn set_phase(&mut self, to: ServicePhase) {
        if !self.phase.can_transition(to) {
            // Internal invariant violation; log it rather than corrupting
            // the event stream with a silent skip.
            warn!(service = %self.spec.name, from = %self.phase, to = %to,
                  "unexpected phase transition");
        }
        self.phase = to;

        let event = ServiceEvent {
            service: self.spec.name.clone(),
            phase: to,
            resolved_command: self.resolved,
            resolved_endpoint: self.resolved_endpoint.clone(),
            failure: if to == ServicePhase::Failed {
                self.last_failure.clone()
            } else {
                None
            },
            at: Utc::now(),
        };
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(ServiceStatus {
            service: self.spec.name.clone(),
            phase: self.phase,
            probe_attempts: self.probe_attempts,
            resolved_command: self.resolved,
            resolved_endpoint: self.resolved_endpoint.clone(),
            last_failure: self.last_failure.clone(),
            pid: self.handle.as_ref().map(|h| h.pid()),
            started_at: self.started_at,
        });
    }
}
