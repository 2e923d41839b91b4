//! Name → node registry of a router.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::node::RouteNode;

/// Outcome of a successful [`RouteRegistry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The name was free.
    Inserted,
    /// The same node was already registered under the name.
    AlreadyPresent,
}

/// A different node already holds the name.
#[derive(Debug, thiserror::Error)]
#[error("route name '{0}' is already registered")]
pub struct DuplicateRoute(pub String);

/// Routes by name, in registration order.
#[derive(Default)]
pub struct RouteRegistry {
    routes: RwLock<IndexMap<String, Arc<RouteNode>>>,
}

impl RouteRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node` under its name.
    pub fn insert(&self, node: &Arc<RouteNode>) -> Result<Registration, DuplicateRoute> {
        let mut routes = self.routes.write();
        match routes.get(node.name()) {
            Some(existing) if Arc::ptr_eq(existing, node) => Ok(Registration::AlreadyPresent),
            Some(_) => Err(DuplicateRoute(node.name().to_string())),
            None => {
                routes.insert(node.name().to_string(), Arc::clone(node));
                Ok(Registration::Inserted)
            }
        }
    }

    /// Looks up a route.
    pub fn get(&self, name: &str) -> Option<Arc<RouteNode>> {
        self.routes.read().get(name).cloned()
    }

    /// Returns whether `name` is taken.
    pub fn contains(&self, name: &str) -> bool {
        self.routes.read().contains_key(name)
    }

    /// Returns the registered names in order.
    pub fn names(&self) -> Vec<String> {
        self.routes.read().keys().cloned().collect()
    }

    /// Drops every route registered after the first `len`, returning how
    /// many were dropped.
    pub fn truncate(&self, len: usize) -> usize {
        let mut routes = self.routes.write();
        let dropped = routes.len().saturating_sub(len);
        routes.truncate(len);
        dropped
    }

    /// Returns the number of routes.
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Returns whether no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

impl std::fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("routes", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::ParsedPattern;

    fn node(name: &str) -> Arc<RouteNode> {
        Arc::new(RouteNode::segment(name, ParsedPattern::parse("/").unwrap()))
    }

    #[test]
    fn test_insert_results() {
        let registry = RouteRegistry::new();
        let a = node("a");
        assert_eq!(registry.insert(&a).unwrap(), Registration::Inserted);
        assert_eq!(registry.insert(&a).unwrap(), Registration::AlreadyPresent);

        let err = registry.insert(&node("a")).unwrap_err();
        assert_eq!(err.to_string(), "route name 'a' is already registered");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_truncate_keeps_earlier_routes() {
        let registry = RouteRegistry::new();
        for name in ["a", "b", "c"] {
            registry.insert(&node(name)).unwrap();
        }
        assert_eq!(registry.truncate(1), 2);
        assert_eq!(registry.names(), vec!["a"]);
        assert_eq!(registry.truncate(5), 0);
    }
}
