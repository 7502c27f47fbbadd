use std::collections::HashSet;
use std::sync::OnceLock;

use async_trait::async_trait;

use crate::context::ServiceContext;
use crate::resolver::Requirement;

/// A long-running unit with a three-phase lifecycle.
///
/// `launch` is expected to pass through `context.prepare()`, `context.online()`
/// and `context.cleanup()` in order (a service that needs only two scopes
/// treats the unused one as an immediate pass-through). The future returned by
/// `launch` is the daemon; it runs until cancellation is observed through
/// `context.should_exit()` or the service's own work completes.
#[async_trait]
pub trait Service: Send + Sync {
    /// Stable, unique identifier.
    fn id(&self) -> &str;

    /// Ids this service requires to have completed `PREPARE` first.
    fn dependencies(&self) -> &HashSet<String> {
        empty_set()
    }

    /// Ids this service must precede (reverse dependency).
    fn before(&self) -> &HashSet<String> {
        empty_set()
    }

    /// Ids this service must follow (equivalent to an extra dependency).
    fn after(&self) -> &HashSet<String> {
        empty_set()
    }

    /// Run the service through its three phases until cancelled.
    async fn launch(&self, context: ServiceContext) -> anyhow::Result<()>;
}

fn empty_set() -> &'static HashSet<String> {
    static EMPTY: OnceLock<HashSet<String>> = OnceLock::new();
    EMPTY.get_or_init(HashSet::new)
}

impl Requirement for dyn Service {
    fn req_id(&self) -> &str {
        self.id()
    }
    fn req_dependencies(&self) -> &HashSet<String> {
        self.dependencies()
    }
    fn req_before(&self) -> &HashSet<String> {
        self.before()
    }
    fn req_after(&self) -> &HashSet<String> {
        self.after()
    }
}
