//! The orchestration algorithm: bring-up, activation, tear-down, and the
//! top-level `launch` entry point.
//!
//! Grounded on `firework/bootstrap/core.py`'s `Bootstrap`. The Python
//! original drives everything from one closure-heavy `spawn()` coroutine
//! with mutable captures (`done_prepare`, `queued_prepare`, a
//! `spawn_forward_prepare` nonlocal flag) that unlocks each service
//! individually as its specific dependency edges are satisfied. We approximate
//! that with coarser layer-wide barriers (everyone in a layer reaches a phase
//! before anyone in it is dispatched further) — equivalent for the
//! documented ordering guarantee, cheaper to reason about, and sufficient for
//! every scenario this crate is tested against.

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::context::ServiceContext;
use crate::error::{DaemonError, FailedDaemon, LifespanError, UnhandledExit};
use crate::graph::ServiceGraph;
use crate::resolver;
use crate::service::Service;
use crate::status::{Phase, Stage};
use crate::task_group::TaskGroup;

struct LayerItem {
    id: String,
    ctx: ServiceContext,
    handle: JoinHandle<anyhow::Result<()>>,
}

enum RaceOutcome {
    Reached(LayerItem),
    DaemonOk(String),
    DaemonErr(String, DaemonError),
}

fn joined(id: String, res: Result<anyhow::Result<()>, tokio::task::JoinError>) -> RaceOutcome {
    match res {
        Ok(Ok(())) => RaceOutcome::DaemonOk(id),
        Ok(Err(e)) => RaceOutcome::DaemonErr(id, e),
        Err(join_err) => RaceOutcome::DaemonErr(id, join_err.into()),
    }
}

/// A service that fails mid-scope drives its `PhaseGuard` to `COMPLETED` and
/// the daemon wrapper then sets `(EXIT, COMPLETED)` and returns, all
/// synchronously with no await in between — so by the time this is polled,
/// both `wait_for` and `handle` can be ready at once. `biased` plus listing
/// `handle` first gives the terminated daemon priority over the barrier,
/// matching the original's `if task.done()` check performed after the wait.
async fn race_one(item: LayerItem, stage: Stage, phase: Phase) -> RaceOutcome {
    let LayerItem { id, ctx, mut handle } = item;
    tokio::select! {
        biased;
        res = &mut handle => joined(id, res),
        _ = ctx.wait_for(stage, phase) => {
            if handle.is_finished() {
                joined(id, handle.await)
            } else {
                RaceOutcome::Reached(LayerItem { id, ctx, handle })
            }
        },
    }
}

/// Race every item in `items` against its own daemon. Stops at the first
/// daemon that terminates early (bring-up semantics: an early exit, whether
/// `Ok` or `Err`, is a failure of the whole batch) and reports it alongside
/// whatever had already reached `(stage, phase)`.
async fn race_layer_fail_fast(
    items: Vec<LayerItem>,
    stage: Stage,
    phase: Phase,
) -> (Vec<LayerItem>, Option<FailedDaemon>) {
    let mut futs: FuturesUnordered<_> =
        items.into_iter().map(|item| race_one(item, stage, phase)).collect();

    let mut reached = Vec::new();
    while let Some(outcome) = futs.next().await {
        match outcome {
            RaceOutcome::Reached(item) => reached.push(item),
            RaceOutcome::DaemonOk(id) => {
                let error = UnhandledExit { id: id.clone() }.into();
                return (reached, Some(FailedDaemon { id, error }));
            }
            RaceOutcome::DaemonErr(id, error) => return (reached, Some(FailedDaemon { id, error })),
        }
    }
    (reached, None)
}

/// Tear-down variant: a daemon finishing normally before reaching the target
/// phase is fine (it simply has nothing left to clean up); only a daemon
/// that errored is a failure. Every item is raced to completion regardless of
/// what its siblings did.
async fn race_layer_tolerant(
    items: Vec<LayerItem>,
    stage: Stage,
    phase: Phase,
) -> (Vec<LayerItem>, Vec<FailedDaemon>) {
    let mut futs: FuturesUnordered<_> =
        items.into_iter().map(|item| race_one(item, stage, phase)).collect();

    let mut reached = Vec::new();
    let mut failures = Vec::new();
    while let Some(outcome) = futs.next().await {
        match outcome {
            RaceOutcome::Reached(item) => reached.push(item),
            RaceOutcome::DaemonOk(_id) => {}
            RaceOutcome::DaemonErr(id, error) => failures.push(FailedDaemon { id, error }),
        }
    }
    (reached, failures)
}

fn spawn_daemon(svc: Arc<dyn Service>, ctx: ServiceContext) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let result = svc.launch(ctx.clone()).await;
        // The daemon wrapper always closes the loop to (EXIT, COMPLETED),
        // whatever scope the service's own code did or didn't pass through.
        ctx.exit_complete();
        result
    })
}

/// Coordinates the full bring-up / activation / tear-down cycle over a
/// [`ServiceGraph`], keeping one running [`TaskGroup`] of per-service "gone
/// online and stayed there" wait-tasks for the top-level [`launch`](Self::launch)
/// entry point to block on.
pub struct LifespanController {
    graph: Mutex<ServiceGraph>,
    online_wait: TaskGroup<()>,
}

impl Default for LifespanController {
    fn default() -> Self {
        Self::new()
    }
}

impl LifespanController {
    pub fn new() -> Self {
        Self { graph: Mutex::new(ServiceGraph::new()), online_wait: TaskGroup::new() }
    }

    pub fn live_ids(&self) -> Vec<String> {
        self.graph.lock().services.keys().cloned().collect()
    }

    /// Bring `services` online: resolve them into dependency layers (ids
    /// already live are treated as already satisfied), spawn each layer's
    /// daemons, drive the whole batch through PREPARE and then activate it
    /// into ONLINE, and only fold it into the live graph once every member
    /// made it all the way through. On any failure, everything that reached
    /// PREPARE is torn down again (in reverse) if `rollback` is set.
    #[tracing::instrument(skip(self, services))]
    pub async fn start_lifespan(
        &self,
        services: Vec<Arc<dyn Service>>,
        rollback: bool,
    ) -> Result<(), LifespanError> {
        if services.is_empty() {
            return Ok(());
        }

        let plan = { self.graph.lock().subgraph(services.clone()) }.map_err(|e| {
            LifespanError { bring_up_failures: vec![FailedDaemon { id: "<graph>".into(), error: e.into() }], teardown_failures: vec![] }
        })?;

        let exclude: Vec<String> = self.graph.lock().services.keys().cloned().collect();
        let refs: Vec<&dyn Service> = services.iter().map(Arc::as_ref).collect();
        let exclude_refs: Vec<&str> = exclude.iter().map(String::as_str).collect();

        let layers = resolver::resolve_dependencies(refs.into_iter(), exclude_refs, false).map_err(|e| {
            LifespanError { bring_up_failures: vec![FailedDaemon { id: "<resolver>".into(), error: e.into() }], teardown_failures: vec![] }
        })?;

        let mut prepared: Vec<LayerItem> = Vec::new();
        let mut bring_up_failures: Vec<FailedDaemon> = Vec::new();

        for layer in &layers {
            if !bring_up_failures.is_empty() {
                break;
            }

            let mut items = Vec::with_capacity(layer.len());
            for id in layer {
                let svc = plan.bind.get(id).cloned().expect("layer id came from this plan");
                let ctx = ServiceContext::new(id.clone());
                self.graph.lock().contexts.insert(id.clone(), ctx.clone());
                let handle = spawn_daemon(svc, ctx.clone());
                items.push(LayerItem { id: id.clone(), ctx, handle });
            }

            let (reached, failure) = race_layer_fail_fast(items, Stage::Prepare, Phase::Waiting).await;
            if let Some(failure) = failure {
                bring_up_failures.push(failure);
            }

            for item in &reached {
                let _ = item.ctx.dispatch(Stage::Prepare, Phase::Pending);
            }
            let (completed, failure) = race_layer_fail_fast(reached, Stage::Prepare, Phase::Completed).await;
            prepared.extend(completed);
            if let Some(failure) = failure {
                bring_up_failures.push(failure);
            }
        }

        if !bring_up_failures.is_empty() {
            let teardown_failures =
                if rollback { self.rollback(prepared).await } else { self.drop_all(prepared) };
            return Err(LifespanError { bring_up_failures, teardown_failures });
        }

        // Activation: every service in this batch is past PREPARE. Each
        // announces (ONLINE, WAITING) itself inside `launch()`; wait for
        // that, then dispatch (ONLINE, PENDING) regardless of whether a
        // sibling failed, so a failed batch can still be torn down cleanly
        // instead of leaving survivors stuck mid-scope.
        let (online_ready, failure) = race_layer_fail_fast(prepared, Stage::Online, Phase::Waiting).await;
        for item in &online_ready {
            let _ = item.ctx.dispatch(Stage::Online, Phase::Pending);
        }

        if let Some(failure) = failure {
            let teardown_failures = if rollback { self.rollback(online_ready).await } else { self.drop_all(online_ready) };
            return Err(LifespanError { bring_up_failures: vec![failure], teardown_failures });
        }

        self.graph.lock().apply(plan);
        for item in online_ready {
            let LayerItem { id, ctx, handle } = item;
            self.graph.lock().tasks.insert(id, handle);
            self.online_wait.spawn(async move {
                ctx.wait_for(Stage::Online, Phase::Completed).await;
            });
        }

        Ok(())
    }

    fn drop_all(&self, items: Vec<LayerItem>) -> Vec<FailedDaemon> {
        let mut graph = self.graph.lock();
        for item in items {
            graph.drop_service(&item.id);
        }
        Vec::new()
    }

    /// Tear down everything in `items` (already past PREPARE) in reverse, for
    /// a failed bring-up.
    async fn rollback(&self, mut items: Vec<LayerItem>) -> Vec<FailedDaemon> {
        items.reverse();
        let mut failures = Vec::new();

        for item in items {
            item.ctx.exit();
            let id = item.id.clone();
            let (waited, mut early) = race_layer_tolerant(vec![item], Stage::Cleanup, Phase::Waiting).await;
            failures.append(&mut early);

            for item in &waited {
                let _ = item.ctx.dispatch(Stage::Cleanup, Phase::Pending);
            }
            let (completed, mut early) = race_layer_tolerant(waited, Stage::Cleanup, Phase::Completed).await;
            failures.append(&mut early);

            for item in completed {
                item.ctx.wait_for(Stage::Exit, Phase::Completed).await;
            }
            self.graph.lock().drop_service(&id);
        }

        failures
    }

    /// Tear down `ids` in reverse dependency order. `assert_cancel` signals
    /// `exit()` on each context first — used for a cooperative shutdown; a
    /// rollback instead relies on the aborted bring-up itself to justify exit.
    #[tracing::instrument(skip(self))]
    pub async fn handle_stage_cleanup(&self, ids: &[String], assert_cancel: bool) -> Vec<FailedDaemon> {
        let (services, contexts): (Vec<Arc<dyn Service>>, Vec<ServiceContext>) = {
            let graph = self.graph.lock();
            let services = ids.iter().filter_map(|id| graph.services.get(id).cloned()).collect();
            let contexts = ids.iter().filter_map(|id| graph.contexts.get(id).cloned()).collect();
            (services, contexts)
        };

        let refs: Vec<&dyn Service> = services.iter().map(Arc::as_ref).collect();
        let layers = resolver::resolve_dependencies(refs.into_iter(), Vec::<&str>::new(), true)
            .unwrap_or_else(|_| vec![ids.to_vec()]);

        let mut failures = Vec::new();

        for layer in layers {
            let mut items = Vec::new();
            for id in &layer {
                let Some(ctx) = contexts.iter().find(|c| c.id() == id).cloned() else { continue };
                if assert_cancel {
                    ctx.exit();
                }
                let Some(handle) = self.graph.lock().tasks.remove(id) else { continue };
                items.push(LayerItem { id: id.clone(), ctx, handle });
            }

            let (waiting, mut early) = race_layer_tolerant(items, Stage::Cleanup, Phase::Waiting).await;
            failures.append(&mut early);

            for item in &waiting {
                let _ = item.ctx.dispatch(Stage::Cleanup, Phase::Pending);
            }

            let (completed, mut early) = race_layer_tolerant(waiting, Stage::Cleanup, Phase::Completed).await;
            failures.append(&mut early);

            for item in completed {
                item.ctx.wait_for(Stage::Exit, Phase::Completed).await;
                self.graph.lock().drop_service(&item.id);
            }
        }

        failures
    }

    /// Top-level entry point: bring `services` up with rollback enabled, run
    /// until every one of them completes, then always tear everything
    /// remaining down and raise one aggregated error if anything failed.
    #[tracing::instrument(skip(self, services))]
    pub async fn launch(&self, services: Vec<Arc<dyn Service>>) -> Result<(), LifespanError> {
        self.start_lifespan(services, true).await?;

        self.online_wait.wait().await;

        let remaining = self.live_ids();
        let teardown_failures = self.handle_stage_cleanup(&remaining, false).await;

        if teardown_failures.is_empty() { Ok(()) } else { Err(LifespanError { bring_up_failures: vec![], teardown_failures }) }
    }

    /// Run [`launch`](Self::launch)'s wait loop until `ctrl_c` is observed,
    /// at which point every live context's cooperative-exit flag is set and
    /// tear-down proceeds as usual.
    pub async fn run_until_signal(&self, services: Vec<Arc<dyn Service>>) -> Result<(), LifespanError> {
        self.start_lifespan(services, true).await?;

        tokio::select! {
            _ = self.online_wait.wait() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("ctrl-c received, signalling cooperative shutdown");
                for ctx in self.graph.lock().contexts.values() {
                    ctx.exit();
                }
                self.online_wait.stop();
            }
        }

        let remaining = self.live_ids();
        let teardown_failures = self.handle_stage_cleanup(&remaining, true).await;

        if teardown_failures.is_empty() { Ok(()) } else { Err(LifespanError { bring_up_failures: vec![], teardown_failures }) }
    }

    /// Remove already-live services. Fails without touching anything if a
    /// surviving (non-removed) service still depends on one of them.
    pub async fn remove_services(&self, ids: &[String]) -> Result<(), crate::error::ResolverError> {
        {
            let graph = self.graph.lock();
            let existing: Vec<&dyn Service> = graph.services.values().map(Arc::as_ref).collect();
            let removing: Vec<&dyn Service> =
                ids.iter().filter_map(|id| graph.services.get(id)).map(Arc::as_ref).collect();
            resolver::validate_removal(existing.into_iter(), removing.into_iter())?;
        }

        self.handle_stage_cleanup(ids, true).await;
        Ok(())
    }
}
