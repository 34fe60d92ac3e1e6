//! SupervisorRegistry - the one object the presentation layer talks to.
//!
//! Built once at host startup from the loaded configuration, read-only
//! afterwards. Start/stop/status/subscribe calls are delegated to the named
//! member; `stop_all` is the host shutdown hook and must run before process
//! exit so no child outlives the host.

use crate::config::SupervisorConfig;
use crate::events::{ServiceEvent, ServiceStatus};
use crate::supervisor::{ServiceSupervisor, StartAck};
use futures::future::join_all;
use journal_common::{ServiceError, ServiceName, ServiceResult};
use journal_process::OutputSink;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// One supervisor per named backend service.
pub struct SupervisorRegistry {
    supervisors: HashMap<ServiceName, ServiceSupervisor>,
}

impl SupervisorRegistry {
    /// Build the registry, wiring every service's output to the same sinks.
    ///
    /// The configuration is expected to be validated; duplicate names are
    /// still rejected here to protect the map invariant.
    pub fn new(config: SupervisorConfig, sinks: Vec<Arc<dyn OutputSink>>) -> ServiceResult<Self> {
        let mut supervisors = HashMap::new();
        for spec in config.services {
            let name = spec.name.clone();
            if supervisors.contains_key(&name) {
                return Err(ServiceError::configuration(
                    name.as_str(),
                    "duplicate service name",
                ));
            }
            supervisors.insert(name.clone(), ServiceSupervisor::new(spec, sinks.clone()));
            info!(service = %name, "service registered");
        }
        Ok(Self { supervisors })
    }

    pub fn get(&self, name: &ServiceName) -> Option<&ServiceSupervisor> {
        self.supervisors.get(name)
    }

    pub fn service_names(&self) -> Vec<ServiceName> {
        self.supervisors.keys().cloned().collect()
    }

    pub async fn start(&self, name: &ServiceName) -> ServiceResult<StartAck> {
        self.require(name)?.start().await
    }

    pub async fn stop(&self, name: &ServiceName) -> ServiceResult<()> {
        self.require(name)?.stop().await
    }

    pub fn status(&self, name: &ServiceName) -> ServiceResult<ServiceStatus> {
        Ok(self.require(name)?.status())
    }

    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.supervisors.values().map(|s| s.status()).collect()
    }

    pub fn subscribe(&self, name: &ServiceName) -> ServiceResult<broadcast::Receiver<ServiceEvent>> {
        Ok(self.require(name)?.subscribe())
    }

    /// Start every registered service concurrently. Individual launch
    /// failures surface through each service's event stream, not here;
    /// only an unreachable supervisor is an error.
    pub async fn start_all(&self) -> ServiceResult<()> {
        info!(services = self.supervisors.len(), "starting all services");
        let results = join_all(
            self.supervisors
                .iter()
                .map(|(name, s)| async move { (name.clone(), s.start().await.map(|_| ())) }),
        )
        .await;
        collect_failures(results, "start")
    }

    /// Stop every registered service concurrently. Tolerates members that
    /// are already stopped, failed, or were never started.
    pub async fn stop_all(&self) -> ServiceResult<()> {
        info!(services = self.supervisors.len(), "stopping all services");
        let results = join_all(
            self.supervisors
                .iter()
                .map(|(name, s)| async move { (name.clone(), s.stop().await) }),
        )
        .await;
        collect_failures(results, "stop")
    }

    fn require(&self, name: &ServiceName) -> ServiceResult<&ServiceSupervisor> {
        self.supervisors
            .get(name)
            .ok_or_else(|| ServiceError::not_found(name.as_str()))
    }
}

fn collect_failures(
    results: Vec<(ServiceName, ServiceResult<()>)>,
    operation: &str,
) -> ServiceResult<()> {
    let failed: Vec<String> = results
        .into_iter()
        .filter_map(|(name, result)| match result {
            Ok(()) => None,
            Err(e) => {
                warn!(service = %name, error = %e, "{} failed", operation);
                Some(name.to_string())
            }
        })
        .collect();

    if failed.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::supervisor_gone(
            failed.join(", "),
            format!("{} failed for listed services", operation),
        ))
    }
}
