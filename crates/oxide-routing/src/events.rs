//! Lifecycle notifications for route trees.

use std::sync::Arc;

use oxide_router::Request;
use parking_lot::RwLock;

use crate::node::RouteNode;

/// Something that happened to a route tree.
#[derive(Clone, Copy)]
pub enum RouterEvent<'a> {
    /// The factory built a node.
    RouteCreated(&'a Arc<RouteNode>),
    /// A node was attached to its parent.
    RouteAdded {
        /// The new child.
        node: &'a Arc<RouteNode>,
        /// The segment it was attached to.
        parent: &'a Arc<RouteNode>,
    },
    /// A node is about to be mounted. Listeners may still register
    /// middleware or parameter hooks on it.
    BeforeMount(&'a Arc<RouteNode>),
    /// A node was mounted.
    Mounted(&'a Arc<RouteNode>),
    /// A segment without children was skipped.
    SkipMount(&'a Arc<RouteNode>),
    /// An action is about to invoke its handler.
    Request {
        /// The action.
        route: &'a Arc<RouteNode>,
        /// The request it will see.
        request: &'a Request,
    },
}

impl RouterEvent<'_> {
    /// Short event name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RouteCreated(_) => "route_created",
            Self::RouteAdded { .. } => "route_added",
            Self::BeforeMount(_) => "before_mount",
            Self::Mounted(_) => "mount",
            Self::SkipMount(_) => "skip_mount",
            Self::Request { .. } => "request",
        }
    }

    /// The node the event is about.
    pub fn node(&self) -> &Arc<RouteNode> {
        match self {
            Self::RouteCreated(node)
            | Self::BeforeMount(node)
            | Self::Mounted(node)
            | Self::SkipMount(node) => node,
            Self::RouteAdded { node, .. } => node,
            Self::Request { route, .. } => route,
        }
    }
}

type Listener = Arc<dyn Fn(&RouterEvent<'_>) + Send + Sync>;

/// Fan-out of [`RouterEvent`]s to registered listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    /// Creates a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn subscribe(&self, listener: impl Fn(&RouterEvent<'_>) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Delivers an event to every listener, in subscription order.
    pub fn emit(&self, event: &RouterEvent<'_>) {
        // Listeners may subscribe further listeners or touch the tree.
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
