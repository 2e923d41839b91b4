//! Segment routes: groups of children under a shared prefix.

use std::sync::{Arc, OnceLock, Weak};

use oxide_router::{BoxFuture, Flow, Middleware, Request, Response, Router as Dispatcher};
use parking_lot::RwLock;
use tracing::debug;

use crate::context;
use crate::error::{Result, RoutingError};
use crate::events::{EventBus, RouterEvent};
use crate::node::{NodeKind, RouteNode, ROOT_NAME};
use crate::pattern::ParsedPattern;

/// The segment part of a [`RouteNode`].
pub struct SegmentRoute {
    root: bool,
    children: RwLock<Vec<Arc<RouteNode>>>,
    index: OnceLock<Arc<RouteNode>>,
}

impl SegmentRoute {
    fn new(root: bool) -> Self {
        Self {
            root,
            children: RwLock::new(Vec::new()),
            index: OnceLock::new(),
        }
    }

    /// Returns whether this segment is a tree root.
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Returns the children in registration order.
    pub fn children(&self) -> Vec<Arc<RouteNode>> {
        self.children.read().clone()
    }

    /// Returns the action serving the segment's own path, if one was
    /// declared.
    pub fn index_action(&self) -> Option<Arc<RouteNode>> {
        self.index.get().cloned()
    }
}

impl RouteNode {
    /// Creates a tree root mounted at `pattern`.
    pub fn root(pattern: ParsedPattern) -> Self {
        Self::with_kind(ROOT_NAME, pattern, NodeKind::Segment(SegmentRoute::new(true)))
    }

    /// Creates a segment.
    pub fn segment(name: impl Into<String>, pattern: ParsedPattern) -> Self {
        Self::with_kind(name, pattern, NodeKind::Segment(SegmentRoute::new(false)))
    }

    /// Returns the children of a segment; actions have none.
    pub fn children(&self) -> Vec<Arc<RouteNode>> {
        self.as_segment().map(SegmentRoute::children).unwrap_or_default()
    }

    /// Returns the segment's index action.
    pub fn index_action(&self) -> Option<Arc<RouteNode>> {
        self.as_segment().and_then(SegmentRoute::index_action)
    }

    /// Attaches a child. The child's parent must already be set to `self`.
    pub fn add_sub_route(self: &Arc<Self>, child: Arc<RouteNode>) -> Result<()> {
        let Some(segment) = self.as_segment() else {
            return Err(RoutingError::Structure(format!(
                "route '{}' is an action and cannot have children",
                self.name()
            )));
        };
        if self.is_mounted() {
            return Err(RoutingError::State(format!(
                "cannot add '{}' to route '{}' after it has been mounted",
                child.name(),
                self.name()
            )));
        }
        if !child.parent_route().is_some_and(|p| Arc::ptr_eq(&p, self)) {
            return Err(RoutingError::Structure(format!(
                "route '{}' must have '{}' as its parent before being added",
                child.name(),
                self.name()
            )));
        }
        let mut children = segment.children.write();
        if children.iter().any(|c| Arc::ptr_eq(c, &child)) {
            return Err(RoutingError::Structure(format!(
                "route '{}' is already a child of '{}'",
                child.name(),
                self.name()
            )));
        }
        children.push(child);
        Ok(())
    }

    /// Detaches every child added after the first `len`.
    pub(crate) fn truncate_children(&self, len: usize) {
        if let Some(segment) = self.as_segment() {
            segment.children.write().truncate(len);
        }
    }

    /// Attaches several children in order.
    pub fn add_sub_routes(self: &Arc<Self>, children: impl IntoIterator<Item = Arc<RouteNode>>) -> Result<()> {
        for child in children {
            self.add_sub_route(child)?;
        }
        Ok(())
    }

    /// Attaches `action` as the child serving this segment's own path.
    pub fn set_index_action(self: &Arc<Self>, action: Arc<RouteNode>) -> Result<()> {
        if !action.is_actionable() {
            return Err(RoutingError::Structure(format!(
                "index route '{}' must be an action",
                action.name()
            )));
        }
        self.add_sub_route(Arc::clone(&action))?;
        if let Some(segment) = self.as_segment() {
            segment.index.set(action).map_err(|_| {
                RoutingError::Structure(format!("route '{}' already has an index action", self.name()))
            })?;
        }
        Ok(())
    }

    pub(crate) fn mount_segment(
        self: &Arc<Self>,
        segment: &SegmentRoute,
        router: &mut Dispatcher,
        events: &EventBus,
    ) -> Result<()> {
        let children = segment.children();
        if children.is_empty() {
            self.mark_mounted();
            debug!(route = %self.name(), "skipping segment without children");
            events.emit(&RouterEvent::SkipMount(self));
            return Ok(());
        }

        let mut sub = Dispatcher::new();
        sub.use_middleware(Arc::new(MarkRoute(Arc::downgrade(self))));
        self.install_layers(&mut sub)?;
        for child in &children {
            child.mount(&mut sub, events)?;
        }

        let mount = router.mount(self.pattern().source(), sub)?;
        self.set_mount_point(mount)?;
        self.mark_mounted();
        debug!(
            route = %self.name(),
            pattern = %self.pattern().source(),
            children = children.len(),
            "mounted segment"
        );
        events.emit(&RouterEvent::Mounted(self));
        Ok(())
    }

    pub(crate) async fn invoke_segment(
        self: &Arc<Self>,
        req: &mut Request,
        res: &mut Response,
    ) -> oxide_router::Result<Flow> {
        match self.mount_point() {
            Some(mount) => mount.handle(req, res).await,
            None => Ok(Flow::Continue),
        }
    }
}

/// Records the segment as the request's current route on entry.
struct MarkRoute(Weak<RouteNode>);

impl Middleware for MarkRoute {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        _res: &'a mut Response,
    ) -> BoxFuture<'a, oxide_router::Result<Flow>> {
        Box::pin(async move {
            if let Some(node) = self.0.upgrade() {
                context::mark_current(req, &node);
            }
            Ok(Flow::Continue)
        })
    }
}
