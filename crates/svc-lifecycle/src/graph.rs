//! Mutable registry of live services, their contexts and daemon handles, plus
//! the forward/back edge maps used to order bring-up and tear-down.
//!
//! Grounded on `firework/bootstrap/graph.py`'s `ServiceGraph`. The Python
//! original builds its new-service fragment on top of a `ChainMap` so the
//! fragment can be validated against the live set without mutating it; we get
//! the same "propose, then commit" split more plainly by returning an owned
//! [`SubgraphPlan`] from [`ServiceGraph::subgraph`] and only folding it into
//! the live maps in [`ServiceGraph::apply`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::context::ServiceContext;
use crate::error::GraphError;
use crate::service::Service;

/// A validated-but-uncommitted set of new services and the edge fragments
/// they contribute, checked against (but not yet merged into) the live graph.
pub struct SubgraphPlan {
    pub(crate) bind: HashMap<String, Arc<dyn Service>>,
    pub(crate) previous: HashMap<String, HashSet<String>>,
    pub(crate) next: HashMap<String, HashSet<String>>,
}

impl SubgraphPlan {
    /// The new ids this plan would introduce, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.bind.keys().map(String::as_str)
    }
}

#[derive(Default)]
pub struct ServiceGraph {
    pub services: HashMap<String, Arc<dyn Service>>,
    pub contexts: HashMap<String, ServiceContext>,
    pub tasks: HashMap<String, JoinHandle<anyhow::Result<()>>>,

    previous: HashMap<String, HashSet<String>>,
    next: HashMap<String, HashSet<String>>,
}

impl ServiceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous_of(&self, id: &str) -> HashSet<String> {
        self.previous.get(id).cloned().unwrap_or_default()
    }

    pub fn next_of(&self, id: &str) -> HashSet<String> {
        self.next.get(id).cloned().unwrap_or_default()
    }

    /// Validate `services` against the live set and compute the `previous`/
    /// `next` edge fragments they would contribute, without mutating `self`.
    ///
    /// `after` edges may reference ids already live; `before` edges likewise.
    /// Any reference to an unknown id (neither among `services` nor already
    /// live) is an error.
    pub fn subgraph(&self, services: Vec<Arc<dyn Service>>) -> Result<SubgraphPlan, GraphError> {
        let mut bind: HashMap<String, Arc<dyn Service>> = HashMap::new();
        for svc in &services {
            if self.services.contains_key(svc.id()) || bind.contains_key(svc.id()) {
                return Err(GraphError::IdConflict(svc.id().to_string()));
            }
            bind.insert(svc.id().to_string(), svc.clone());
        }

        let known = |id: &str| bind.contains_key(id) || self.services.contains_key(id);

        let mut previous: HashMap<String, HashSet<String>> = HashMap::new();
        let mut next: HashMap<String, HashSet<String>> = HashMap::new();

        for svc in &services {
            previous.entry(svc.id().to_string()).or_default().extend(svc.after().iter().cloned());
            next.entry(svc.id().to_string()).or_default().extend(svc.before().iter().cloned());

            for after in svc.after() {
                if !known(after) {
                    return Err(GraphError::UnknownReference {
                        service: svc.id().to_string(),
                        reference: after.clone(),
                    });
                }
                next.entry(after.clone()).or_default().insert(svc.id().to_string());
            }

            for before in svc.before() {
                if !known(before) {
                    return Err(GraphError::UnknownReference {
                        service: svc.id().to_string(),
                        reference: before.clone(),
                    });
                }
                previous.entry(before.clone()).or_default().insert(svc.id().to_string());
            }
        }

        Ok(SubgraphPlan { bind, previous, next })
    }

    /// Commit a plan produced by [`subgraph`](Self::subgraph) atomically.
    pub fn apply(&mut self, plan: SubgraphPlan) {
        self.services.extend(plan.bind);
        for (id, edges) in plan.previous {
            self.previous.entry(id).or_default().extend(edges);
        }
        for (id, edges) in plan.next {
            self.next.entry(id).or_default().extend(edges);
        }
    }

    /// Remove `id` from every map and every other id's edge sets.
    pub fn drop_service(&mut self, id: &str) {
        self.services.remove(id);
        self.contexts.remove(id);
        self.tasks.remove(id);
        self.previous.remove(id);
        self.next.remove(id);

        for edges in self.previous.values_mut() {
            edges.remove(id);
        }
        for edges in self.next.values_mut() {
            edges.remove(id);
        }
    }
}
