//! Launching with fallback substitution.
//!
//! The launcher makes at most two spawn attempts: the primary command, and
//! - only when the primary executable cannot be located and a fallback is
//! configured - the fallback command with identical output and exit wiring.
//! Any other failure is terminal here; retry policy beyond this single
//! substitution belongs to the caller.

use crate::config::ServiceSpec;
use crate::events::ResolvedCommand;
use journal_common::{ServiceError, ServiceResult};
use journal_process::{OutputSink, ProcessHandle, SpawnError};
use std::sync::Arc;
use tracing::{info, warn};

/// A successfully launched process and the command that produced it.
#[derive(Debug)]
pub struct Launched {
    pub handle: ProcessHandle,
    pub resolved: ResolvedCommand,
}

/// Spawns a service's process, resolving primary vs. fallback command.
pub struct Launcher {
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl Launcher {
    pub fn new(sinks: Vec<Arc<dyn OutputSink>>) -> Self {
        Self { sinks }
    }

    /// Launch the service described by `spec`.
    ///
    /// Records which command actually succeeded so the supervisor can
    /// report it. The fallback substitution itself is informational, not a
    /// failure.
    pub fn launch(&self, spec: &ServiceSpec) -> ServiceResult<Launched> {
        match ProcessHandle::spawn(
            spec.spawn_options(ResolvedCommand::Primary),
            self.sinks.clone(),
        ) {
            Ok(handle) => Ok(Launched {
                handle,
                resolved: ResolvedCommand::Primary,
            }),
            Err(SpawnError::NotFound { command }) => match spec.fallback_command {
                Some(ref fallback) => {
                    info!(
                        service = %spec.name,
                        primary = %command,
                        fallback = %fallback.program,
                        "primary command not found, trying fallback"
                    );
                    ProcessHandle::spawn(
                        spec.spawn_options(ResolvedCommand::Fallback),
                        self.sinks.clone(),
                    )
                    .map(|handle| Launched {
                        handle,
                        resolved: ResolvedCommand::Fallback,
                    })
                    .map_err(|e| {
                        warn!(service = %spec.name, error = %e, "fallback command failed too");
                        e.into_service_error()
                    })
                }
                None => Err(ServiceError::spawn_not_found(command)),
            },
            Err(e) => Err(e.into_service_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommandSpec, SupervisorConfig};
    use journal_probe::EndpointSpec;
    use std::time::Duration;

    fn spec_with(primary: &str, fallback: Option<&str>) -> ServiceSpec {
        let yaml = r#"
services:
  - name: launch-test
    command: { program: placeholder }
    readiness: [{ url: "http://127.0.0.1:1/" }]
"#;
        let mut spec = SupervisorConfig::load_from_string(yaml)
            .unwrap()
            .services
            .remove(0);
        spec.command = CommandSpec::new(primary, vec!["30".to_string()]);
        spec.fallback_command = fallback.map(|p| CommandSpec::new(p, vec!["30".to_string()]));
        spec
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_fallback_used_when_primary_missing() {
        let launcher = Launcher::new(vec![]);
        let spec = spec_with("definitely-not-a-real-command-xyz", Some("sleep"));

        let launched = launcher.launch(&spec).unwrap();
        assert_eq!(launched.resolved, ResolvedCommand::Fallback);
        assert!(launched.handle.is_alive());
        launched.handle.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_primary_without_fallback_is_terminal() {
        let launcher = Launcher::new(vec![]);
        let spec = spec_with("definitely-not-a-real-command-xyz", None);

        let err = launcher.launch(&spec).unwrap_err();
        assert_eq!(
            err,
            ServiceError::spawn_not_found("definitely-not-a-real-command-xyz")
        );
    }

    #[tokio::test]
    async fn test_missing_primary_and_fallback_is_terminal() {
        let launcher = Launcher::new(vec![]);
        let spec = spec_with(
            "definitely-not-a-real-command-xyz",
            Some("also-not-a-real-command-xyz"),
        );

        let err = launcher.launch(&spec).unwrap_err();
        assert!(matches!(err, ServiceError::SpawnNotFound { .. }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_non_not_found_failure_skips_fallback() {
        use std::os::unix::fs::PermissionsExt;

        // A regular file without the execute bit: spawning fails with
        // PermissionDenied, which must not trigger the fallback.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-executable");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let launcher = Launcher::new(vec![]);
        let mut spec = spec_with(path.to_str().unwrap(), Some("sleep"));
        spec.command.args.clear();

        let err = launcher.launch(&spec).unwrap_err();
        assert!(
            matches!(err, ServiceError::SpawnFailed { .. }),
            "expected SpawnFailed, got {:?}",
            err
        );
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_primary_preferred_when_available() {
        let launcher = Launcher::new(vec![]);
        let mut spec = spec_with("sleep", Some("definitely-not-a-real-command-xyz"));
        spec.readiness = vec![EndpointSpec::json("http://127.0.0.1:1/")];

        let launched = launcher.launch(&spec).unwrap();
        assert_eq!(launched.resolved, ResolvedCommand::Primary);
        launched.handle.stop(Duration::from_secs(5)).await.unwrap();
    }
}
