//! Per-service synchronization object carrying `(Stage, Phase)` and the
//! cooperative-cancellation / phase-barrier signals.
//!
//! Grounded on `firework/bootstrap/context.py`'s `ServiceContext`. The
//! Python original pulses an `asyncio.Event` on every status change; here we
//! use `tokio::sync::watch`, which is the idiomatic Rust analogue of
//! "latest value plus wake waiters on change" and avoids the
//! set-then-immediately-clear dance the original needs to fake an edge
//! trigger out of a level-triggered primitive.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::IllegalTransition;
use crate::status::{Phase, ServiceStatus, Stage, IDLE};

#[derive(Debug)]
struct Inner {
    id: String,
    status_tx: watch::Sender<ServiceStatus>,
    status_rx: watch::Receiver<ServiceStatus>,
    exit_tx: watch::Sender<bool>,
    exit_rx: watch::Receiver<bool>,
}

/// The orchestrator-facing and service-facing handle for one service's
/// position in the lifecycle. Cheaply cloneable; all clones observe the same
/// underlying state.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    inner: Arc<Inner>,
}

impl ServiceContext {
    pub fn new(id: impl Into<String>) -> Self {
        let (status_tx, status_rx) = watch::channel(IDLE);
        let (exit_tx, exit_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { id: id.into(), status_tx, status_rx, exit_tx, exit_rx }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The current `(Stage, Phase)`.
    pub fn status(&self) -> ServiceStatus {
        *self.inner.status_rx.borrow()
    }

    /// Validated transition: regress is fatal except from the `EXIT` idle
    /// sentinel; advancing stage resets phase to `WAITING`; same-stage phase
    /// must strictly increase.
    fn forward(&self, stage: Stage, phase: Phase) -> Result<(), IllegalTransition> {
        let prev = self.status();
        let (prev_stage, prev_phase) = prev;

        let next_phase = if stage < prev_stage && prev_stage != Stage::Exit {
            return Err(IllegalTransition { id: self.inner.id.clone(), from: prev, to: (stage, phase) });
        } else if stage == prev_stage {
            if phase <= prev_phase {
                return Err(IllegalTransition { id: self.inner.id.clone(), from: prev, to: (stage, phase) });
            }
            phase
        } else {
            Phase::Waiting
        };

        tracing::debug!(id = %self.inner.id, from = ?prev, to = ?(stage, next_phase), "lifecycle transition");
        let _ = self.inner.status_tx.send((stage, next_phase));
        Ok(())
    }

    /// Block until the context reaches `(stage, phase)` or later.
    pub async fn wait_for(&self, stage: Stage, phase: Phase) {
        let target = (stage, phase);
        let mut rx = self.inner.status_rx.clone();
        loop {
            if *rx.borrow() >= target {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Block until [`exit`](Self::exit) has been called.
    pub async fn wait_for_sigexit(&self) {
        let mut rx = self.inner.exit_rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Cooperative cancellation flag. Services observe this in their `online()`
    /// loop and fall through into `cleanup()` when it flips.
    pub fn should_exit(&self) -> bool {
        *self.inner.exit_rx.borrow()
    }

    /// Called by the orchestrator: sets the sticky cancellation flag.
    pub fn exit(&self) {
        let _ = self.inner.exit_tx.send(true);
    }

    /// Called by the orchestrator's daemon wrapper once the service's
    /// `launch` future has returned, whatever scopes it did or didn't pass
    /// through. This is a direct terminal assignment, not a validated
    /// `forward` — the daemon is done regardless of where its state machine
    /// left off.
    pub fn exit_complete(&self) {
        let _ = self.inner.status_tx.send((Stage::Exit, Phase::Completed));
    }

    /// Orchestrator-side counterpart to the service-side `prepare`/`online`/
    /// `cleanup` calls: advances the phase within the current stage. Only
    /// valid once the service has itself announced arrival at `(stage,
    /// WAITING)` — calling this while the context is still in an earlier
    /// stage resets it to `WAITING` in that (wrong) stage instead, same as
    /// any other stage-changing `forward`.
    pub(crate) fn dispatch(&self, stage: Stage, phase: Phase) -> Result<(), IllegalTransition> {
        self.forward(stage, phase)
    }

    async fn enter_scope(&self, stage: Stage) -> Result<PhaseGuard, IllegalTransition> {
        self.forward(stage, Phase::Waiting)?;
        self.wait_for(stage, Phase::Pending).await;
        Ok(PhaseGuard { ctx: self.clone(), stage })
    }

    /// Scoped acquisition for the PREPARE stage. Dropping the guard (whether
    /// by falling off the end of the block or via an early `?` return)
    /// advances the context to `(PREPARE, COMPLETED)`.
    pub async fn prepare(&self) -> Result<PhaseGuard, IllegalTransition> {
        self.enter_scope(Stage::Prepare).await
    }

    /// Scoped acquisition for the ONLINE stage.
    pub async fn online(&self) -> Result<PhaseGuard, IllegalTransition> {
        self.enter_scope(Stage::Online).await
    }

    /// Scoped acquisition for the CLEANUP stage.
    pub async fn cleanup(&self) -> Result<PhaseGuard, IllegalTransition> {
        self.enter_scope(Stage::Cleanup).await
    }
}

/// RAII guard returned by [`ServiceContext::prepare`]/[`online`](ServiceContext::online)/[`cleanup`](ServiceContext::cleanup).
///
/// Advances its stage to `COMPLETED` on drop, guaranteeing the context
/// reaches `COMPLETED` even if the scope's body returns early or panics
/// during unwind — the orchestrator's barrier waits rely on this.
pub struct PhaseGuard {
    ctx: ServiceContext,
    stage: Stage,
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        let _ = self.ctx.forward(self.stage, Phase::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_lifecycle_advances_monotonically() {
        let ctx = ServiceContext::new("svc-a");
        assert_eq!(ctx.status(), IDLE);

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.wait_for(Stage::Prepare, Phase::Waiting).await;
                ctx.forward(Stage::Prepare, Phase::Pending).unwrap();
            })
        };

        {
            let _guard = ctx.prepare().await.unwrap();
            assert_eq!(ctx.status(), (Stage::Prepare, Phase::Pending));
        }
        waiter.await.unwrap();
        assert_eq!(ctx.status(), (Stage::Prepare, Phase::Completed));
    }

    #[tokio::test]
    async fn guard_completes_even_on_early_return() {
        let ctx = ServiceContext::new("svc-b");

        async fn fails(ctx: &ServiceContext) -> anyhow::Result<()> {
            ctx.forward(Stage::Prepare, Phase::Pending).unwrap();
            let _guard = ctx.prepare().await?;
            anyhow::bail!("boom");
        }

        // Drive the forced PENDING transition concurrently with the scope.
        let driver = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.wait_for(Stage::Prepare, Phase::Waiting).await;
            })
        };
        let _ = fails(&ctx).await;
        driver.await.unwrap();

        assert_eq!(ctx.status(), (Stage::Prepare, Phase::Completed));
    }

    #[test]
    fn regression_outside_exit_is_illegal() {
        let ctx = ServiceContext::new("svc-c");
        ctx.forward(Stage::Prepare, Phase::Waiting).unwrap();
        ctx.forward(Stage::Prepare, Phase::Pending).unwrap();
        ctx.forward(Stage::Online, Phase::Waiting).unwrap();

        let err = ctx.forward(Stage::Prepare, Phase::Pending).unwrap_err();
        assert_eq!(err.from, (Stage::Online, Phase::Waiting));
    }

    #[test]
    fn same_stage_phase_must_strictly_increase() {
        let ctx = ServiceContext::new("svc-d");
        ctx.forward(Stage::Prepare, Phase::Waiting).unwrap();
        let err = ctx.forward(Stage::Prepare, Phase::Waiting).unwrap_err();
        assert_eq!(err.to, (Stage::Prepare, Phase::Waiting));
    }

    #[test]
    fn exit_is_the_only_permitted_regression_origin() {
        let ctx = ServiceContext::new("svc-e");
        assert_eq!(ctx.status().0, Stage::Exit);
        // From idle EXIT, moving to PREPARE is a stage *advance* in source order
        // only because EXIT is exempted from the regression check.
        ctx.forward(Stage::Prepare, Phase::Waiting).unwrap();
        assert_eq!(ctx.status(), (Stage::Prepare, Phase::Waiting));
    }

    #[tokio::test]
    async fn should_exit_flips_after_exit_call() {
        let ctx = ServiceContext::new("svc-f");
        assert!(!ctx.should_exit());
        ctx.exit();
        assert!(ctx.should_exit());
        ctx.wait_for_sigexit().await;
    }

    #[test]
    fn exit_complete_bypasses_validation() {
        let ctx = ServiceContext::new("svc-g");
        ctx.forward(Stage::Prepare, Phase::Waiting).unwrap();
        ctx.exit_complete();
        assert_eq!(ctx.status(), (Stage::Exit, Phase::Completed));
    }
}
