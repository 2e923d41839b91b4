//! Route tree nodes.
//!
//! A tree is made of segments (groups of child routes under a shared
//! prefix) and actions (leaves bound to controller handlers), hanging off a
//! single root. Children are owned by their segment; a node only keeps a
//! weak reference to its parent.
//!
//! Nodes are mutable (middleware, parameter hooks, children) until they
//! are mounted into a dispatch router, which happens exactly once.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use oxide_router::{
    BoxFuture, Flow, Middleware, Mount, ParamHandler, PathParams, Request, Response,
    Router as Dispatcher,
};
use parking_lot::RwLock;

use crate::action::ActionRoute;
use crate::error::{Result, RoutingError};
use crate::events::{EventBus, RouterEvent};
use crate::pattern::{ParsedPattern, RenderError};
use crate::segment::SegmentRoute;

/// Name given to the root node. The root is never registered by name.
pub const ROOT_NAME: &str = "root";

/// Middleware registered on a node.
#[derive(Clone)]
pub(crate) struct MiddlewareEntry {
    pub(crate) path: Option<String>,
    pub(crate) middleware: Arc<dyn Middleware>,
}

/// What a node is.
pub enum NodeKind {
    /// Groups children under a shared prefix.
    Segment(SegmentRoute),
    /// Handles requests.
    Action(ActionRoute),
}

/// Options for [`RouteNode::generate_path`].
#[derive(Clone)]
pub struct GenerateOptions {
    /// Stop below this ancestor: its pattern and those above it are left
    /// out.
    pub stop_at: Option<Arc<RouteNode>>,
    /// Check values against requirements.
    pub validate: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            stop_at: None,
            validate: true,
        }
    }
}

/// A node in a route tree.
pub struct RouteNode {
    name: String,
    pattern: ParsedPattern,
    kind: NodeKind,
    parent: RwLock<Option<Weak<RouteNode>>>,
    middleware: RwLock<Vec<MiddlewareEntry>>,
    param_handlers: RwLock<Vec<(String, Arc<dyn ParamHandler>)>>,
    metadata: serde_json::Map<String, serde_json::Value>,
    mounted: AtomicBool,
    mount_point: OnceLock<Arc<Mount>>,
}

impl RouteNode {
    pub(crate) fn with_kind(name: impl Into<String>, pattern: ParsedPattern, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            pattern,
            kind,
            parent: RwLock::new(None),
            middleware: RwLock::new(Vec::new()),
            param_handlers: RwLock::new(Vec::new()),
            metadata: serde_json::Map::new(),
            mounted: AtomicBool::new(false),
            mount_point: OnceLock::new(),
        }
    }

    /// Attaches free-form metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the route name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parsed pattern.
    pub fn pattern(&self) -> &ParsedPattern {
        &self.pattern
    }

    /// Returns the node's metadata.
    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.metadata
    }

    /// Returns what the node is.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Returns the action part of an action node.
    pub fn as_action(&self) -> Option<&ActionRoute> {
        match &self.kind {
            NodeKind::Action(action) => Some(action),
            NodeKind::Segment(_) => None,
        }
    }

    /// Returns the segment part of a segment node.
    pub fn as_segment(&self) -> Option<&SegmentRoute> {
        match &self.kind {
            NodeKind::Segment(segment) => Some(segment),
            NodeKind::Action(_) => None,
        }
    }

    /// Returns whether the node handles requests itself.
    pub fn is_actionable(&self) -> bool {
        matches!(self.kind, NodeKind::Action(_))
    }

    /// Returns whether this is a tree root.
    pub fn is_root(&self) -> bool {
        self.as_segment().is_some_and(SegmentRoute::is_root)
    }

    /// Returns whether the node has been mounted.
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_mounted(&self) {
        self.mounted.store(true, Ordering::Release);
    }

    /// Returns the dispatch mount created for this node, if any.
    pub fn mount_point(&self) -> Option<&Arc<Mount>> {
        self.mount_point.get()
    }

    pub(crate) fn set_mount_point(&self, mount: Arc<Mount>) -> Result<()> {
        self.mount_point
            .set(mount)
            .map_err(|_| RoutingError::State(format!("route '{}' already has a mount point", self.name)))
    }

    fn ensure_unmounted(&self, what: &str) -> Result<()> {
        if self.is_mounted() {
            return Err(RoutingError::State(format!(
                "cannot {what} on route '{}' after it has been mounted",
                self.name
            )));
        }
        Ok(())
    }

    /// Registers middleware that runs before anything at or below this
    /// node, optionally only for paths under `mount_path`.
    pub fn use_middleware(
        &self,
        middleware: Arc<dyn Middleware>,
        mount_path: Option<&str>,
    ) -> Result<()> {
        self.ensure_unmounted("register middleware")?;
        self.middleware.write().push(MiddlewareEntry {
            path: mount_path.map(str::to_string),
            middleware,
        });
        Ok(())
    }

    /// Registers a hook run once per request when `name` is present,
    /// before this node's middleware.
    pub fn param(&self, name: impl Into<String>, handler: Arc<dyn ParamHandler>) -> Result<()> {
        self.ensure_unmounted("register a parameter handler")?;
        self.param_handlers.write().push((name.into(), handler));
        Ok(())
    }

    pub(crate) fn middleware_entries(&self) -> Vec<MiddlewareEntry> {
        self.middleware.read().clone()
    }

    pub(crate) fn param_entries(&self) -> Vec<(String, Arc<dyn ParamHandler>)> {
        self.param_handlers.read().clone()
    }

    pub(crate) fn has_own_layers(&self) -> bool {
        !self.middleware.read().is_empty() || !self.param_handlers.read().is_empty()
    }

    /// Installs this node's parameter hooks and middleware on `router`, in
    /// that order.
    pub(crate) fn install_layers(&self, router: &mut Dispatcher) -> Result<()> {
        for (name, handler) in self.param_entries() {
            router.param(name, handler);
        }
        for entry in self.middleware_entries() {
            match entry.path.as_deref() {
                None | Some("" | "/") => router.use_middleware(entry.middleware),
                Some(path) => router.use_at(path, entry.middleware)?,
            }
        }
        Ok(())
    }

    /// Sets the node's parent.
    ///
    /// A node has at most one parent, the root has none, and actions
    /// cannot have children.
    pub fn set_parent_route(&self, parent: &Arc<Self>) -> Result<()> {
        if self.is_root() {
            return Err(RoutingError::State("the root route cannot have a parent".into()));
        }
        if parent.is_actionable() {
            return Err(RoutingError::State(format!(
                "route '{}' is an action and cannot be the parent of '{}'",
                parent.name, self.name
            )));
        }
        let mut slot = self.parent.write();
        if slot.as_ref().and_then(Weak::upgrade).is_some() {
            return Err(RoutingError::State(format!(
                "route '{}' already has a parent",
                self.name
            )));
        }
        *slot = Some(Arc::downgrade(parent));
        Ok(())
    }

    /// Returns the parent, if it is set and still alive.
    pub fn parent_route(&self) -> Option<Arc<Self>> {
        self.parent.read().as_ref().and_then(Weak::upgrade)
    }

    /// Returns the ancestors, nearest first.
    pub fn ancestors(&self) -> Vec<Arc<Self>> {
        let mut ancestors = Vec::new();
        let mut cursor = self.parent_route();
        while let Some(node) = cursor {
            cursor = node.parent_route();
            ancestors.push(node);
        }
        ancestors
    }

    /// Returns the nodes from the top of the tree down to `self`.
    pub fn lineage(self: &Arc<Self>) -> Vec<Arc<Self>> {
        let mut lineage = self.ancestors();
        lineage.reverse();
        lineage.push(Arc::clone(self));
        lineage
    }

    /// Returns the nodes strictly below `ancestor` down to `self`. When
    /// `ancestor` is not on the chain the whole lineage is returned.
    pub fn lineage_below(self: &Arc<Self>, ancestor: &Arc<Self>) -> Vec<Arc<Self>> {
        let lineage = self.lineage();
        match lineage.iter().position(|n| Arc::ptr_eq(n, ancestor)) {
            Some(i) => lineage[i + 1..].to_vec(),
            None => lineage,
        }
    }

    /// Returns whether `node` is an ancestor of `self`, looking at most
    /// `max_depth` levels up.
    pub fn is_child_route_of(&self, node: &Arc<Self>, max_depth: Option<usize>) -> bool {
        let mut cursor = self.parent_route();
        let mut depth = 0;
        while let Some(current) = cursor {
            depth += 1;
            if max_depth.is_some_and(|max| depth > max) {
                return false;
            }
            if Arc::ptr_eq(&current, node) {
                return true;
            }
            cursor = current.parent_route();
        }
        false
    }

    /// Returns whether `self` is an ancestor of `node`.
    pub fn is_parent_route_of(self: &Arc<Self>, node: &Arc<Self>) -> bool {
        node.is_child_route_of(self, None)
    }

    /// Returns whether `self` and `node` are distinct children of the same
    /// parent.
    pub fn is_sibling_of(self: &Arc<Self>, node: &Arc<Self>) -> bool {
        if Arc::ptr_eq(self, node) {
            return false;
        }
        match (self.parent_route(), node.parent_route()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }

    /// Walks up from `self` to the first node that is the root, `node`
    /// itself, or an ancestor of `node`.
    pub fn find_connecting_route(self: &Arc<Self>, node: &Arc<Self>) -> Option<Arc<Self>> {
        let mut cursor = Some(Arc::clone(self));
        while let Some(current) = cursor {
            if Arc::ptr_eq(&current, node) || current.is_root() || node.is_child_route_of(&current, None) {
                return Some(current);
            }
            cursor = current.parent_route();
        }
        None
    }

    /// Returns `root > … > self` for diagnostics.
    pub fn chain_description(self: &Arc<Self>) -> String {
        self.lineage()
            .iter()
            .map(|n| n.name.as_str())
            .collect::<Vec<_>>()
            .join(" > ")
    }

    /// Generates the path of this node by rendering every pattern on the
    /// way down from the root (or from below `options.stop_at`).
    ///
    /// Supplied values win over defaults; optional parameters without a
    /// value are left out. A missing mandatory parameter or a value failing
    /// its requirement is an error naming the parameter and the chain.
    pub fn generate_path(
        self: &Arc<Self>,
        params: &PathParams,
        query: &IndexMap<String, String>,
        options: &GenerateOptions,
    ) -> Result<String> {
        let lineage = self.lineage();
        let start = match &options.stop_at {
            Some(stop) => lineage
                .iter()
                .position(|n| Arc::ptr_eq(n, stop))
                .map(|i| i + 1)
                .ok_or_else(|| {
                    RoutingError::State(format!(
                        "route '{}' is not an ancestor of '{}'",
                        stop.name, self.name
                    ))
                })?,
            None => 0,
        };

        let mut path = String::new();
        let mut omitted = None;
        for node in &lineage[start..] {
            node.pattern
                .render_into(&mut path, params, options.validate, &mut omitted)
                .map_err(|e| self.generation_error(e))?;
        }
        if path.is_empty() {
            path.push('/');
        }
        if !query.is_empty() {
            path.push('?');
            path.push_str(&encode_query(query));
        }
        Ok(path)
    }

    fn generation_error(self: &Arc<Self>, err: RenderError) -> RoutingError {
        let (param, reason) = match err {
            RenderError::Missing(param) => (param, "is required but was not supplied".to_string()),
            RenderError::Invalid { param, value } => {
                (param, format!("value '{value}' does not satisfy its requirement"))
            }
            RenderError::AfterOmitted { param, omitted } => (
                param,
                format!("cannot follow the omitted optional parameter '{omitted}'"),
            ),
        };
        RoutingError::PathGeneration {
            route: self.name.clone(),
            param,
            reason,
            chain: self.chain_description(),
        }
    }

    /// Mounts the node on `router`. A node can be mounted once.
    pub fn mount(self: &Arc<Self>, router: &mut Dispatcher, events: &EventBus) -> Result<()> {
        if self.is_mounted() {
            return Err(RoutingError::State(format!(
                "route '{}' is already mounted",
                self.name
            )));
        }
        events.emit(&RouterEvent::BeforeMount(self));
        match &self.kind {
            NodeKind::Segment(segment) => self.mount_segment(segment, router, events),
            NodeKind::Action(action) => self.mount_action(action, router, events),
        }
    }

    /// Dispatches a request that is known to target this node.
    ///
    /// `req.path` must be relative to the node's parent. With `direct`, an
    /// action without its own middleware calls its handler immediately;
    /// otherwise dispatch goes through the node's mount (or, for an action
    /// without one, its parent's).
    pub fn invoke<'a>(
        self: &'a Arc<Self>,
        req: &'a mut Request,
        res: &'a mut Response,
        direct: bool,
    ) -> BoxFuture<'a, oxide_router::Result<Flow>> {
        Box::pin(async move {
            match &self.kind {
                NodeKind::Segment(_) => self.invoke_segment(req, res).await,
                NodeKind::Action(action) => {
                    if let Some(mount) = self.mount_point() {
                        return mount.handle(req, res).await;
                    }
                    if direct {
                        return self.invoke_direct(action, req, res).await;
                    }
                    match self.parent_route() {
                        Some(parent) => parent.invoke(req, res, false).await,
                        None => Err(RoutingError::State(format!(
                            "route '{}' is not attached to a tree",
                            self.name
                        ))
                        .into()),
                    }
                }
            }
        })
    }
}

impl fmt::Debug for RouteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteNode")
            .field("name", &self.name)
            .field("pattern", &self.pattern.source())
            .field("actionable", &self.is_actionable())
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}

/// Serializes a query map.
pub fn encode_query(query: &IndexMap<String, String>) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str, pattern: &str) -> Arc<RouteNode> {
        Arc::new(RouteNode::segment(name, ParsedPattern::parse(pattern).unwrap()))
    }

    fn attach(parent: &Arc<RouteNode>, child: &Arc<RouteNode>) {
        child.set_parent_route(parent).unwrap();
        parent.add_sub_route(Arc::clone(child)).unwrap();
    }

    fn tree() -> (Arc<RouteNode>, Arc<RouteNode>, Arc<RouteNode>, Arc<RouteNode>) {
        let root = Arc::new(RouteNode::root(ParsedPattern::parse("/").unwrap()));
        let users = segment("users", "/users/:id");
        let posts = segment("posts", "/posts");
        let admin = segment("admin", "/admin");
        attach(&root, &users);
        attach(&users, &posts);
        attach(&root, &admin);
        (root, users, posts, admin)
    }

    #[test]
    fn test_ancestry_predicates() {
        let (root, users, posts, admin) = tree();
        assert!(posts.is_child_route_of(&users, None));
        assert!(posts.is_child_route_of(&root, None));
        assert!(!posts.is_child_route_of(&root, Some(1)));
        assert!(root.is_parent_route_of(&posts));
        assert!(users.is_sibling_of(&admin));
        assert!(!users.is_sibling_of(&users));
        assert!(!posts.is_sibling_of(&admin));
    }

    #[test]
    fn test_find_connecting_route() {
        let (root, users, posts, admin) = tree();
        let found = posts.find_connecting_route(&admin).unwrap();
        assert!(Arc::ptr_eq(&found, &root));
        let found = posts.find_connecting_route(&users).unwrap();
        assert!(Arc::ptr_eq(&found, &users));
    }

    #[test]
    fn test_single_parent() {
        let (_root, users, posts, admin) = tree();
        assert!(matches!(posts.set_parent_route(&admin), Err(RoutingError::State(_))));
        assert!(Arc::ptr_eq(&posts.parent_route().unwrap(), &users));
    }

    #[test]
    fn test_root_cannot_have_parent() {
        let (root, users, _, _) = tree();
        assert!(matches!(root.set_parent_route(&users), Err(RoutingError::State(_))));
    }

    #[test]
    fn test_generate_path_walks_ancestors() {
        let (root, _users, posts, _) = tree();
        let params: PathParams = [("id", "42")].into_iter().collect();
        let mut query = IndexMap::new();
        query.insert("page".to_string(), "2".to_string());

        let path = posts
            .generate_path(&params, &query, &GenerateOptions::default())
            .unwrap();
        assert_eq!(path, "/users/42/posts?page=2");

        let relative = posts
            .generate_path(
                &params,
                &IndexMap::new(),
                &GenerateOptions {
                    stop_at: Some(root),
                    ..GenerateOptions::default()
                },
            )
            .unwrap();
        assert_eq!(relative, "/users/42/posts");
    }

    #[test]
    fn test_generate_path_reports_chain() {
        let (_root, _users, posts, _) = tree();
        let err = posts
            .generate_path(&PathParams::new(), &IndexMap::new(), &GenerateOptions::default())
            .unwrap_err();
        match err {
            RoutingError::PathGeneration { param, chain, .. } => {
                assert_eq!(param, "id");
                assert_eq!(chain, "root > users > posts");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_root_path() {
        let (root, ..) = tree();
        let path = root
            .generate_path(&PathParams::new(), &IndexMap::new(), &GenerateOptions::default())
            .unwrap();
        assert_eq!(path, "/");
    }

    #[test]
    fn test_middleware_rejected_after_mount() {
        let (root, ..) = tree();
        root.mark_mounted();
        let mw: Arc<dyn Middleware> = Arc::new(oxide_router::LoggingMiddleware);
        assert!(matches!(root.use_middleware(mw, None), Err(RoutingError::State(_))));
    }
}
