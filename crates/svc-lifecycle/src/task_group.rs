//! A group of in-flight tasks that can be waited on, grown, shrunk and
//! stopped while the wait is in progress.
//!
//! Grounded on `firework/util/_task_group.py`. The Python original drives a
//! single `asyncio.Event` to wake a sleeping `wait()` whenever the tracked
//! task list changes, then re-derives `asyncio.wait(self.tasks)` each time
//! around the loop. We follow the same "race completion against a mutation
//! signal, then re-snapshot" shape, but poll the tracked
//! [`JoinHandle`]s in place with [`std::future::poll_fn`] instead of
//! consuming them into a fresh combinator every iteration.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Opaque handle returned by [`TaskGroup::spawn`]/[`TaskGroup::update`],
/// usable with [`TaskGroup::drop_tasks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

pub struct TaskGroup<T = ()> {
    tasks: Mutex<Vec<(TaskId, JoinHandle<T>)>>,
    notify: Notify,
    stop: AtomicBool,
    next_id: AtomicU64,
}

impl<T> Default for TaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            notify: Notify::new(),
            stop: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
        }
    }

    fn alloc_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Spawn `fut` onto the runtime and begin tracking it.
    pub fn spawn(&self, fut: impl Future<Output = T> + Send + 'static) -> TaskId {
        let id = self.alloc_id();
        let handle = tokio::spawn(fut);
        self.tasks.lock().push((id, handle));
        self.notify.notify_waiters();
        id
    }

    /// Spawn and track several futures at once.
    pub fn update(
        &self,
        futs: impl IntoIterator<Item = impl Future<Output = T> + Send + 'static>,
    ) -> Vec<TaskId> {
        let mut ids = Vec::new();
        let mut guard = self.tasks.lock();
        for fut in futs {
            let id = self.alloc_id();
            guard.push((id, tokio::spawn(fut)));
            ids.push(id);
        }
        drop(guard);
        self.notify.notify_waiters();
        ids
    }

    /// Stop tracking the given ids without awaiting them. The underlying
    /// tasks keep running on the executor; only bookkeeping is dropped.
    pub fn drop_tasks(&self, ids: impl IntoIterator<Item = TaskId>) {
        let ids: Vec<TaskId> = ids.into_iter().collect();
        self.tasks.lock().retain(|(id, _)| !ids.contains(id));
        self.notify.notify_waiters();
    }

    /// Idempotent: ask any in-progress [`wait`](Self::wait) to return once
    /// every currently-tracked task has completed, without requiring any
    /// further tasks to finish.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Block until every tracked task has completed, or [`stop`](Self::stop)
    /// has been called. Spawns and drops that happen while this is in
    /// progress are observed on the next loop iteration.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.stop.load(Ordering::SeqCst) {
                return;
            }

            let all_done = std::future::poll_fn(|cx| {
                let mut guard = self.tasks.lock();
                guard.retain_mut(|(id, handle)| match Pin::new(handle).poll(cx) {
                    std::task::Poll::Ready(result) => {
                        if let Err(err) = result {
                            if err.is_panic() {
                                tracing::error!(task = ?id, ?err, "task group member panicked");
                            }
                        }
                        false
                    }
                    std::task::Poll::Pending => true,
                });
                if guard.is_empty() {
                    std::task::Poll::Ready(())
                } else {
                    std::task::Poll::Pending
                }
            });
            tokio::pin!(all_done);

            tokio::select! {
                _ = &mut all_done => return,
                _ = notified => {
                    if self.stop.load(Ordering::SeqCst) {
                        return;
                    }
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_once_all_tasks_finish() {
        let group: Arc<TaskGroup<()>> = Arc::new(TaskGroup::new());
        group.spawn(async { tokio::time::sleep(Duration::from_millis(5)).await });
        group.spawn(async { tokio::time::sleep(Duration::from_millis(10)).await });

        tokio::time::timeout(Duration::from_secs(1), group.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn spawn_during_wait_extends_the_wait() {
        let group: Arc<TaskGroup<()>> = Arc::new(TaskGroup::new());
        group.spawn(async { tokio::time::sleep(Duration::from_millis(5)).await });

        let waiter = {
            let group = group.clone();
            tokio::spawn(async move { group.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(1)).await;
        group.spawn(async { tokio::time::sleep(Duration::from_millis(30)).await });

        // The wait must not have returned yet: the freshly-spawned, longer task
        // should still be tracked.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_returns_immediately_without_waiting_for_tasks() {
        let group: Arc<TaskGroup<()>> = Arc::new(TaskGroup::new());
        group.spawn(async { tokio::time::sleep(Duration::from_secs(30)).await });
        group.stop();
        tokio::time::timeout(Duration::from_secs(1), group.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_task_is_no_longer_tracked() {
        let group: Arc<TaskGroup<()>> = Arc::new(TaskGroup::new());
        let id = group.spawn(async { tokio::time::sleep(Duration::from_secs(30)).await });
        group.drop_tasks([id]);
        tokio::time::timeout(Duration::from_secs(1), group.wait()).await.unwrap();
    }
}
