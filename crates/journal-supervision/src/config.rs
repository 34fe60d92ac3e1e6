//! Service configuration.
//!
//! One [`ServiceSpec`] per managed backend service, loaded once from YAML
//! at host startup and read-only thereafter. Durations are written as
//! strings with a unit suffix: `"250ms"`, `"2s"`, `"1m"`.

use anyhow::{Context, Result};
use journal_common::ServiceName;
use journal_probe::{EndpointSpec, ProbeSettings};
use journal_process::SpawnOptions;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::events::ResolvedCommand;

/// Top-level configuration: the set of supervised services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub services: Vec<ServiceSpec>,
}

/// A launch command: program plus argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Immutable description of one supervised service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique service key.
    pub name: ServiceName,

    /// Preferred launch command.
    pub command: CommandSpec,

    /// Alternate command, tried once when the preferred program cannot be
    /// located.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_command: Option<CommandSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Readiness-check URLs in priority order.
    pub readiness: Vec<EndpointSpec>,

    /// Wait between readiness ticks.
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Maximum readiness ticks; 0 means poll until the process dies.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-request timeout for a single readiness check.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// How long to wait for a graceful exit before force killing.
    #[serde(default = "default_graceful_timeout", with = "duration_serde")]
    pub graceful_timeout: Duration,

    #[serde(default = "default_true")]
    pub capture_stdout: bool,

    #[serde(default = "default_true")]
    pub capture_stderr: bool,
}

impl ServiceSpec {
    /// The command for a given resolution. Callers only pass `Fallback`
    /// after checking the fallback exists.
    pub fn command_for(&self, resolved: ResolvedCommand) -> &CommandSpec {
        match resolved {
            ResolvedCommand::Primary => &self.command,
            ResolvedCommand::Fallback => self
                .fallback_command
                .as_ref()
                .unwrap_or(&self.command),
        }
    }

    /// Build the spawn options for the given command resolution.
    pub fn spawn_options(&self, resolved: ResolvedCommand) -> SpawnOptions {
        let command = self.command_for(resolved);
        let mut options = SpawnOptions::new(self.name.clone(), command.program.clone())
            .with_args(command.args.clone());
        if let Some(ref dir) = self.working_dir {
            options = options.with_working_dir(dir.clone());
        }
        options.env = self.env.clone();
        options.capture_stdout = self.capture_stdout;
        options.capture_stderr = self.capture_stderr;
        options
    }

    /// Probe parameters for one readiness cycle.
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            endpoints: self.readiness.clone(),
            interval: self.poll_interval,
            max_attempts: self.max_attempts,
            request_timeout: self.request_timeout,
        }
    }
}

impl SupervisorConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.as_ref().display()))?;
        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string.
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: SupervisorConfig =
            serde_yaml::from_str(content).context("failed to parse YAML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.services {
            if spec.name.as_str().is_empty() {
                anyhow::bail!("service with empty name");
            }
            if !seen.insert(spec.name.clone()) {
                anyhow::bail!("duplicate service name: {}", spec.name);
            }
            if spec.command.program.is_empty() {
                anyhow::bail!("service {}: empty launch command", spec.name);
            }
            if spec.readiness.is_empty() {
                anyhow::bail!("service {}: no readiness endpoints", spec.name);
            }
            if spec.poll_interval.is_zero() {
                anyhow::bail!("service {}: poll_interval must be positive", spec.name);
            }
        }
        Ok(())
    }
}

// Default value functions

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_attempts() -> u32 {
    30
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_graceful_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

// Custom serialization for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, String> {
        // "ms" must be checked before "s".
        if let Some(num) = s.strip_suffix("ms") {
            let millis: u64 = num.parse().map_err(|_| format!("invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num) = s.strip_suffix('s') {
            let secs: u64 = num.parse().map_err(|_| format!("invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num) = s.strip_suffix('m') {
            let mins: u64 = num.parse().map_err(|_| format!("invalid duration: {}", s))?;
            Ok(Duration::from_secs(mins * 60))
        } else {
            Err(format!("duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal_probe::ResponseKind;

    const JOURNAL_CONFIG: &str = r#"
services:
  - name: journal-api
    command:
      program: uv
      args: ["run", "uvicorn", "app.main:app", "--port", "8000"]
    fallback_command:
      program: python3
      args: ["-m", "uvicorn", "app.main:app", "--port", "8000"]
    working_dir: backend
    readiness:
      - url: http://127.0.0.1:8000/
        expect: json
    poll_interval: 500ms
    max_attempts: 40
  - name: journal-mcp
    command:
      program: uv
      args: ["run", "python", "-m", "app.mcp.server"]
    readiness:
      - url: http://127.0.0.1:8001/sse
        expect: event-stream
      - url: http://127.0.0.1:8001/
"#;

    #[test]
    fn test_parse_journal_config() {
        let config = SupervisorConfig::load_from_string(JOURNAL_CONFIG).unwrap();
        assert_eq!(config.services.len(), 2);

        let api = &config.services[0];
        assert_eq!(api.name.as_str(), "journal-api");
        assert_eq!(api.command.program, "uv");
        assert_eq!(api.fallback_command.as_ref().unwrap().program, "python3");
        assert_eq!(api.poll_interval, Duration::from_millis(500));
        assert_eq!(api.max_attempts, 40);
        // Defaults fill in what the file omits.
        assert_eq!(api.request_timeout, Duration::from_secs(2));
        assert_eq!(api.graceful_timeout, Duration::from_secs(5));
        assert!(api.capture_stdout);

        let mcp = &config.services[1];
        assert!(mcp.fallback_command.is_none());
        assert_eq!(mcp.readiness.len(), 2);
        assert_eq!(mcp.readiness[0].expect, ResponseKind::EventStream);
        assert_eq!(mcp.readiness[1].expect, ResponseKind::Json);
        assert_eq!(mcp.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = r#"
services:
  - name: journal-api
    command: { program: uv }
    readiness: [{ url: "http://127.0.0.1:8000/" }]
  - name: journal-api
    command: { program: uv }
    readiness: [{ url: "http://127.0.0.1:8000/" }]
"#;
        let err = SupervisorConfig::load_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate service name"));
    }

    #[test]
    fn test_missing_readiness_rejected() {
        let yaml = r#"
services:
  - name: journal-api
    command: { program: uv }
    readiness: []
"#;
        let err = SupervisorConfig::load_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("no readiness endpoints"));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let yaml = r#"
services:
  - name: journal-api
    command: { program: uv }
    readiness: [{ url: "http://127.0.0.1:8000/" }]
    poll_interval: half-a-second
"#;
        assert!(SupervisorConfig::load_from_string(yaml).is_err());
    }

    #[test]
    fn test_spawn_options_resolution() {
        let config = SupervisorConfig::load_from_string(JOURNAL_CONFIG).unwrap();
        let api = &config.services[0];

        let primary = api.spawn_options(ResolvedCommand::Primary);
        assert_eq!(primary.program, "uv");
        assert_eq!(primary.working_dir.as_deref(), Some(Path::new("backend")));

        let fallback = api.spawn_options(ResolvedCommand::Fallback);
        assert_eq!(fallback.program, "python3");
        assert_eq!(fallback.args[0], "-m");
    }

    #[test]
    fn test_probe_settings() {
        let config = SupervisorConfig::load_from_string(JOURNAL_CONFIG).unwrap();
        let settings = config.services[1].probe_settings();
        assert_eq!(settings.endpoints.len(), 2);
        assert_eq!(settings.max_attempts, 30);
        assert_eq!(settings.interval, Duration::from_secs(1));
    }
}
