//! A [`Service`] wrapper around an async-acquire/async-release resource.
//!
//! Grounded on `firework/bootstrap/tools.py`'s `LifespanHelper`: the Python
//! original wraps an `AsyncContextManager` factory so arbitrary `async with`
//! resources can ride the lifecycle without a bespoke `Service` impl per
//! resource. Rust has no `__aenter__`/`__aexit__` protocol, so the factory is
//! replaced with a small [`ScopedResource`] trait with explicit `enter`/`exit`
//! methods.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::context::ServiceContext;
use crate::service::Service;

/// An async resource with a paired acquire/release, run once each across a
/// [`ScopedService`]'s PREPARE and CLEANUP scopes respectively.
#[async_trait]
pub trait ScopedResource: Send + Sync {
    type Value: Send + Sync;

    async fn enter(&self) -> anyhow::Result<Self::Value>;
    async fn exit(&self, value: Self::Value) -> anyhow::Result<()>;
}

/// Adapts a [`ScopedResource`] into a [`Service`]: acquires during PREPARE,
/// sits idle through ONLINE, releases during CLEANUP.
pub struct ScopedService<R: ScopedResource> {
    id: String,
    resource: R,
    value: Mutex<Option<R::Value>>,
    dependencies: HashSet<String>,
}

impl<R: ScopedResource> ScopedService<R> {
    pub fn new(id: impl Into<String>, resource: R) -> Self {
        Self { id: id.into(), resource, value: Mutex::new(None), dependencies: HashSet::new() }
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Access the acquired value while the service is ONLINE. `None` before
    /// PREPARE completes or after CLEANUP has taken it back.
    pub async fn with_value<T>(&self, f: impl FnOnce(Option<&R::Value>) -> T) -> T {
        f(self.value.lock().await.as_ref())
    }
}

#[async_trait]
impl<R: ScopedResource + Send + Sync + 'static> Service for ScopedService<R>
where
    R::Value: 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &HashSet<String> {
        &self.dependencies
    }

    async fn launch(&self, context: ServiceContext) -> anyhow::Result<()> {
        {
            let _guard = context.prepare().await?;
            let value = self.resource.enter().await?;
            *self.value.lock().await = Some(value);
        }

        {
            let _guard = context.online().await?;
        }

        {
            let _guard = context.cleanup().await?;
            if let Some(value) = self.value.lock().await.take() {
                self.resource.exit(value).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    struct Counter {
        entered: Arc<AtomicU32>,
        exited: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ScopedResource for Counter {
        type Value = u32;

        async fn enter(&self) -> anyhow::Result<u32> {
            Ok(self.entered.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn exit(&self, _value: u32) -> anyhow::Result<()> {
            self.exited.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn acquires_then_releases_across_the_full_lifecycle() {
        let entered = Arc::new(AtomicU32::new(0));
        let exited = Arc::new(AtomicBool::new(false));
        let svc = ScopedService::new("resource", Counter { entered: entered.clone(), exited: exited.clone() });

        let ctx = ServiceContext::new("resource");
        let driver = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.wait_for(crate::status::Stage::Prepare, crate::status::Phase::Waiting).await;
                ctx.dispatch(crate::status::Stage::Prepare, crate::status::Phase::Pending).unwrap();
                ctx.wait_for(crate::status::Stage::Online, crate::status::Phase::Waiting).await;
                ctx.dispatch(crate::status::Stage::Online, crate::status::Phase::Pending).unwrap();
                ctx.wait_for(crate::status::Stage::Cleanup, crate::status::Phase::Waiting).await;
                ctx.dispatch(crate::status::Stage::Cleanup, crate::status::Phase::Pending).unwrap();
            })
        };

        svc.launch(ctx).await.unwrap();
        driver.await.unwrap();

        assert_eq!(entered.load(Ordering::SeqCst), 1);
        assert!(exited.load(Ordering::SeqCst));
        assert!(svc.with_value(|v| v.is_none()).await);
    }
}
