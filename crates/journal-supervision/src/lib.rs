//! # Journal Supervision
//!
//! The supervision layer for the Journal's backend processes.
//!
//! The presentation layer talks to a single [`SupervisorRegistry`] holding
//! one [`ServiceSupervisor`] per named backend service. Each supervisor is
//! an actor: one task owns the process handle and lifecycle state, a
//! cloneable handle sends it commands, and state transitions fan out to
//! subscribers as [`ServiceEvent`]s. Launching goes through [`Launcher`],
//! which substitutes the configured fallback command when the primary
//! executable cannot be located.
//!
//! No automatic restart policy exists anywhere in this crate: a failed or
//! stopped service stays down until explicitly started again.

pub mod config;
pub mod events;
pub mod launcher;
pub mod registry;
pub mod supervisor;

pub use config::{CommandSpec, ServiceSpec, SupervisorConfig};
pub use events::{ResolvedCommand, ServiceEvent, ServiceStatus};
pub use launcher::{Launched, Launcher};
pub use registry::SupervisorRegistry;
pub use supervisor::{ServiceSupervisor, StartAck};
