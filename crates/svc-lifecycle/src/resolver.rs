//! Layered topological sort over services' `dependencies`/`before`/`after` edges.
//!
//! Grounded on `firework/bootstrap/_resolve.py`: the effective dependency map
//! unions `dependencies` with `after`, and every `before` edge `u before v`
//! additionally inserts `u` into `v`'s dependency set. Layers are then peeled
//! off by repeatedly taking every unresolved id whose full dependency set is
//! already resolved.

use std::collections::{HashMap, HashSet};

use crate::error::ResolverError;

/// Anything with a stable id and the three edge sets the resolver needs.
///
/// Implemented by [`Service`](crate::service::Service) (as a trait object) for
/// real orchestration, and directly by [`ServiceDescriptor`] in tests so the
/// resolver can be exercised without standing up a full service.
pub trait Requirement {
    fn req_id(&self) -> &str;
    fn req_dependencies(&self) -> &HashSet<String>;
    fn req_before(&self) -> &HashSet<String>;
    fn req_after(&self) -> &HashSet<String>;
}

/// A minimal, owned [`Requirement`] for tests and ad-hoc resolution calls.
#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    pub id: String,
    pub dependencies: HashSet<String>,
    pub before: HashSet<String>,
    pub after: HashSet<String>,
}

impl ServiceDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn before(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.before.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn after(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.after.extend(ids.into_iter().map(Into::into));
        self
    }
}

impl Requirement for ServiceDescriptor {
    fn req_id(&self) -> &str {
        &self.id
    }
    fn req_dependencies(&self) -> &HashSet<String> {
        &self.dependencies
    }
    fn req_before(&self) -> &HashSet<String> {
        &self.before
    }
    fn req_after(&self) -> &HashSet<String> {
        &self.after
    }
}

fn build_dependency_map<'a, R: Requirement + ?Sized>(
    services: impl IntoIterator<Item = &'a R>,
) -> HashMap<String, HashSet<String>> {
    let services: Vec<&R> = services.into_iter().collect();
    let mut map: HashMap<String, HashSet<String>> = HashMap::new();

    for svc in &services {
        let mut deps = svc.req_dependencies().clone();
        deps.extend(svc.req_after().iter().cloned());
        map.entry(svc.req_id().to_string()).or_default().extend(deps);
    }

    for svc in &services {
        for before in svc.req_before() {
            map.entry(before.clone()).or_default().insert(svc.req_id().to_string());
        }
    }

    map
}

/// One layer of the resolved order: ids whose dependencies are already
/// satisfied by `exclude` and every earlier layer. Ordered with ids that
/// carry no `before` constraint first — a stable-sort hint only, per the
/// source's ambiguity on whether this tie-break is load-bearing.
pub type Layer = Vec<String>;

/// Resolve `services` into launch layers, treating every id in `exclude` as
/// already satisfied. Set `reverse` to get tear-down order instead.
pub fn resolve_dependencies<'a, R: Requirement + ?Sized>(
    services: impl IntoIterator<Item = &'a R>,
    exclude: impl IntoIterator<Item = &'a str>,
    reverse: bool,
) -> Result<Vec<Layer>, ResolverError> {
    let services: Vec<&R> = services.into_iter().collect();
    let dependency_map = build_dependency_map(services.iter().copied());

    let mut resolved: HashSet<String> = exclude.into_iter().map(str::to_string).collect();
    let mut unresolved: HashMap<String, &R> =
        services.iter().map(|s| (s.req_id().to_string(), *s)).collect();

    let has_before: HashSet<&str> =
        services.iter().filter(|s| !s.req_before().is_empty()).map(|s| s.req_id()).collect();

    let mut layers = Vec::new();

    while !unresolved.is_empty() {
        let ready: Vec<String> = unresolved
            .keys()
            .filter(|id| {
                dependency_map.get(id.as_str()).map(|deps| deps.is_subset(&resolved)).unwrap_or(true)
            })
            .cloned()
            .collect();

        if ready.is_empty() {
            let mut unresolved_ids: Vec<String> = unresolved.into_keys().collect();
            unresolved_ids.sort();
            return Err(ResolverError::RequirementResolveFailed { unresolved: unresolved_ids });
        }

        let mut layer = ready.clone();
        layer.sort_by_key(|id| (has_before.contains(id.as_str()), id.clone()));

        for id in &ready {
            unresolved.remove(id);
            resolved.insert(id.clone());
        }

        layers.push(layer);
    }

    if reverse {
        layers.reverse();
    }

    Ok(layers)
}

/// Reject a removal set if any surviving service still depends on a removed one.
///
/// Grounded on `validate_services_removal` / `validate_service_removal`: build
/// the reverse-edge map over the full live set, then for every id being
/// removed, fail if a dependent outside the removal set remains.
pub fn validate_removal<'a, R: Requirement + ?Sized>(
    existing: impl IntoIterator<Item = &'a R>,
    to_remove: impl IntoIterator<Item = &'a R>,
) -> Result<(), ResolverError> {
    let existing: Vec<&R> = existing.into_iter().collect();
    let dependency_map = build_dependency_map(existing.iter().copied());

    let mut dependents: HashMap<&str, HashSet<&str>> = HashMap::new();
    for svc in &existing {
        dependents.entry(svc.req_id()).or_default();
    }
    for (id, deps) in &dependency_map {
        for dep in deps {
            if dependents.contains_key(dep.as_str()) {
                dependents.entry(dep.as_str()).or_default().insert(id.as_str());
            }
        }
    }

    let removed: HashSet<&str> = to_remove.into_iter().map(|s| s.req_id()).collect();

    for id in &removed {
        if let Some(deps) = dependents.get(id) {
            for dependent in deps {
                if !removed.contains(dependent) {
                    return Err(ResolverError::DependencyBroken {
                        id: id.to_string(),
                        dependent: dependent.to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(id: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(id)
    }

    #[test]
    fn linear_chain_resolves_in_order() {
        let a = svc("a");
        let b = svc("b").depends_on(["a"]);
        let c = svc("c").depends_on(["b"]);

        let layers = resolve_dependencies([&a, &b, &c], [], false).unwrap();
        assert_eq!(layers, vec![vec!["a".to_string()], vec!["b".to_string()], vec!["c".to_string()]]);
    }

    #[test]
    fn independent_services_share_a_layer() {
        let a = svc("a");
        let b = svc("b");
        let layers = resolve_dependencies([&a, &b], [], false).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].len(), 2);
    }

    #[test]
    fn before_edge_is_equivalent_to_reversed_dependency() {
        // "a before b" means b depends on a, same as b.depends_on(["a"]).
        let a = svc("a").before(["b"]);
        let b = svc("b");
        let layers = resolve_dependencies([&a, &b], [], false).unwrap();
        assert_eq!(layers, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }

    #[test]
    fn cycle_is_rejected() {
        let a = svc("a").depends_on(["b"]);
        let b = svc("b").depends_on(["a"]);
        let err = resolve_dependencies([&a, &b], [], false).unwrap_err();
        assert!(matches!(err, ResolverError::RequirementResolveFailed { .. }));
    }

    #[test]
    fn missing_dependency_is_a_cycle_shaped_failure() {
        let a = svc("a").depends_on(["ghost"]);
        let err = resolve_dependencies([&a], [], false).unwrap_err();
        assert!(matches!(err, ResolverError::RequirementResolveFailed { .. }));
    }

    #[test]
    fn reverse_flips_layer_order_not_contents() {
        let a = svc("a");
        let b = svc("b").depends_on(["a"]);
        let forward = resolve_dependencies([&a, &b], [], false).unwrap();
        let backward = resolve_dependencies([&a, &b], [], true).unwrap();
        assert_eq!(forward.len(), backward.len());
        assert_eq!(forward[0], backward[1]);
        assert_eq!(forward[1], backward[0]);
    }

    #[test]
    fn exclude_satisfies_dependencies_up_front() {
        let a = svc("a").depends_on(["already_up"]);
        let layers = resolve_dependencies([&a], ["already_up"], false).unwrap();
        assert_eq!(layers, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn removal_fails_when_a_survivor_depends_on_it() {
        let a = svc("a");
        let b = svc("b").depends_on(["a"]);
        let existing = [a.clone(), b];
        let err = validate_removal(existing.iter(), [&a]).unwrap_err();
        assert!(matches!(err, ResolverError::DependencyBroken { .. }));
    }

    #[test]
    fn removal_succeeds_when_nothing_depends_on_it() {
        let a = svc("a");
        let d = svc("d").depends_on(["a"]);
        let existing = [a.clone(), d.clone()];
        // Removing d (the dependent), not a, is fine.
        validate_removal(existing.iter(), [&d]).unwrap();
    }

    #[test]
    fn universal_property_every_dep_satisfied_before_its_layer() {
        let a = svc("a");
        let b = svc("b").depends_on(["a"]);
        let c = svc("c").depends_on(["a", "b"]);
        let layers = resolve_dependencies([&a, &b, &c], [], false).unwrap();

        let mut satisfied: HashSet<String> = HashSet::new();
        for layer in &layers {
            for id in layer {
                let deps: HashSet<String> = match id.as_str() {
                    "a" => HashSet::new(),
                    "b" => ["a".to_string()].into_iter().collect(),
                    "c" => ["a".to_string(), "b".to_string()].into_iter().collect(),
                    _ => unreachable!(),
                };
                assert!(deps.is_subset(&satisfied), "{id} launched before its deps were satisfied");
            }
            satisfied.extend(layer.iter().cloned());
        }
    }
}
