use crate::status::ServiceStatus;
use thiserror::Error;

/// Errors raised while resolving a dependency graph into launch layers.
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("failed to resolve service requirements: unresolved ids {unresolved:?} (cycle or missing dependency)")]
    RequirementResolveFailed { unresolved: Vec<String> },

    #[error("cannot remove service '{id}' because '{dependent}' still depends on it")]
    DependencyBroken { id: String, dependent: String },
}

/// Programmer-error transitions on a [`ServiceContext`](crate::context::ServiceContext).
///
/// This is fatal: it indicates the orchestrator or a service implementation
/// attempted to move a context's `(Stage, Phase)` backwards (outside the one
/// permitted regression from the `EXIT` idle sentinel).
#[derive(Error, Debug)]
#[error("illegal lifecycle transition for '{id}': {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub id: String,
    pub from: ServiceStatus,
    pub to: ServiceStatus,
}

/// A daemon that terminated without the orchestrator expecting it to.
#[derive(Error, Debug)]
#[error("service '{id}' exited without an error while cleanup still expected it alive")]
pub struct UnhandledExit {
    pub id: String,
}

/// Any error a service's `launch` may produce.
pub type DaemonError = anyhow::Error;

/// One failed daemon, tagged with which phase of orchestration it failed during.
#[derive(Debug)]
pub struct FailedDaemon {
    pub id: String,
    pub error: DaemonError,
}

/// The aggregated failure surfaced from [`LifespanController::launch`](crate::lifespan::LifespanController::launch).
///
/// Bring-up failures are listed before tear-down failures, each group in the
/// layer order it occurred — this mirrors the source's `ExceptionGroup`
/// aggregation, which nests bring-up and rollback exceptions together
/// rather than interleaving them by wall-clock time.
#[derive(Error, Debug)]
pub struct LifespanError {
    pub bring_up_failures: Vec<FailedDaemon>,
    pub teardown_failures: Vec<FailedDaemon>,
}

impl std::fmt::Display for LifespanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "service lifecycle failed:")?;
        for failed in &self.bring_up_failures {
            writeln!(f, "  [bring-up] {}: {}", failed.id, failed.error)?;
        }
        for failed in &self.teardown_failures {
            writeln!(f, "  [tear-down] {}: {}", failed.id, failed.error)?;
        }
        Ok(())
    }
}

impl LifespanError {
    pub fn is_empty(&self) -> bool {
        self.bring_up_failures.is_empty() && self.teardown_failures.is_empty()
    }
}

/// Errors from building or mutating a [`ServiceGraph`](crate::graph::ServiceGraph).
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("service id '{0}' is already live in this graph")]
    IdConflict(String),

    #[error("service '{service}' references unknown id '{reference}' via after/before")]
    UnknownReference { service: String, reference: String },
}
