//! Structured observability hooks for bootstrap lifecycle events.
//!
//! This module provides:
//! - A launch-scoped tracing span via the `BootstrapSpan` RAII guard
//! - Emission functions for state transitions, outcomes, remediation stages,
//!   subprocesses and unhandled faults
//!
//! Events are emitted at `info!` level (configurable via `CORONA_LOG`).
//! For JSON output, set `CORONA_LOG_FORMAT=json`.

use std::fmt::Display;

use tracing::{error, info, warn};

use crate::process::{CommandLine, ProcessExit};

/// RAII guard that enters a launch-scoped span for the duration of a run.
///
/// ```ignore
/// let _span = BootstrapSpan::enter("CoronaLauncher.dll");
/// // every event below carries entry = "CoronaLauncher.dll"
/// ```
pub struct BootstrapSpan {
    _span: tracing::span::EnteredSpan,
}

impl BootstrapSpan {
    pub fn enter(entry_component: &str) -> Self {
        let span = tracing::info_span!("corona.bootstrap", entry = %entry_component);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: the state machine entered `state`.
pub fn emit_state(state: &dyn Display) {
    info!(event = "bootstrap.state", state = %state);
}

/// Emit event: the launch finished with `outcome` and `exit_code`.
pub fn emit_outcome(outcome: &str, exit_code: i32) {
    info!(event = "bootstrap.outcome", outcome = %outcome, exit_code = exit_code);
}

/// Emit event: a remediation stage (`download`, `install`) finished.
pub fn emit_remediation_stage(stage: &dyn Display, artifact: &str, success: bool) {
    if success {
        info!(event = "remediation.stage", stage = %stage, artifact = %artifact, success);
    } else {
        warn!(event = "remediation.stage", stage = %stage, artifact = %artifact, success);
    }
}

pub fn emit_process_spawned(command: &CommandLine) {
    info!(event = "process.spawned", command = %command);
}

pub fn emit_process_exited(command: &CommandLine, exit: &ProcessExit) {
    info!(
        event = "process.exited",
        program = %command.program.display(),
        code = ?exit.code(),
        success = exit.success(),
    );
}

/// Emit event: an unhandled fault reached the crash boundary (error level).
pub fn emit_fault(message: &str, location: Option<&str>) {
    error!(event = "crash.fault", message = %message, location = location.unwrap_or("unknown"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_span_create() {
        let _span = BootstrapSpan::enter("CoronaLauncher.dll");
    }
}
