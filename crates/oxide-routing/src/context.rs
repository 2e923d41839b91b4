//! Per-request routing state and helpers for handlers.
//!
//! A [`RouteContext`] travels in the request's extensions. It knows which
//! router dispatched the request, which route is currently running it and,
//! for forwarded requests, where they came from.

use std::sync::Arc;

use indexmap::IndexMap;
use oxide_router::{Method, PathParams, Request, Response};

use crate::error::{Result, RoutingError};
use crate::node::RouteNode;
use crate::router::NamedRouter;

/// A route visited while forwarding, with the verb it was visited for.
#[derive(Clone)]
pub(crate) struct Visit {
    pub(crate) node: Arc<RouteNode>,
    pub(crate) method: Method,
}

/// A snapshot of a request in a forwarding chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLink {
    /// Request method.
    pub method: Method,
    /// Full URL, including the query string.
    pub url: String,
    /// Route that was handling the request, if known.
    pub route: Option<String>,
    /// Forwarding depth; `0` for the original request.
    pub depth: usize,
}

impl RequestLink {
    /// Captures `req`.
    pub fn of(req: &Request) -> Self {
        let ctx = context(req);
        Self {
            method: req.method,
            url: req.original_url.clone(),
            route: ctx.and_then(|c| c.current.as_ref()).map(|n| n.name().to_string()),
            depth: ctx.map_or(0, |c| c.depth),
        }
    }
}

/// The request currently being served through a response.
///
/// Swapped in while a forwarded request runs and restored afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRequest(pub RequestLink);

/// Routing state of a request.
#[derive(Clone)]
pub struct RouteContext {
    pub(crate) router: NamedRouter,
    pub(crate) current: Option<Arc<RouteNode>>,
    pub(crate) history: Vec<Visit>,
    pub(crate) depth: usize,
    pub(crate) parent: Option<RequestLink>,
    pub(crate) original: Option<RequestLink>,
}

impl RouteContext {
    pub(crate) fn new(router: NamedRouter) -> Self {
        Self {
            router,
            current: None,
            history: Vec::new(),
            depth: 0,
            parent: None,
            original: None,
        }
    }

    /// Returns the router that dispatched the request.
    pub fn router(&self) -> &NamedRouter {
        &self.router
    }

    /// Returns the route currently handling the request.
    pub fn current(&self) -> Option<&Arc<RouteNode>> {
        self.current.as_ref()
    }

    /// Returns how many forwards led to this request.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns whether the request was produced by a forward.
    pub fn is_forwarded(&self) -> bool {
        self.depth > 0
    }

    /// Returns the request this one was forwarded from.
    pub fn parent(&self) -> Option<&RequestLink> {
        self.parent.as_ref()
    }

    /// Returns the request that started the forwarding chain.
    pub fn original(&self) -> Option<&RequestLink> {
        self.original.as_ref()
    }

    /// Returns the names of the routes visited by the forwarding chain.
    pub fn forward_chain(&self) -> Vec<String> {
        self.history.iter().map(|v| v.node.name().to_string()).collect()
    }
}

impl std::fmt::Debug for RouteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteContext")
            .field("current", &self.current.as_ref().map(|n| n.name()))
            .field("depth", &self.depth)
            .field("chain", &self.forward_chain())
            .finish_non_exhaustive()
    }
}

/// Returns the routing state of `req`.
pub fn context(req: &Request) -> Option<&RouteContext> {
    req.extensions.get::<RouteContext>()
}

/// Returns the route currently handling `req`.
pub fn current_route(req: &Request) -> Option<Arc<RouteNode>> {
    context(req).and_then(|c| c.current.clone())
}

/// Returns the request currently served through `res`.
pub fn active_request(res: &Response) -> Option<&RequestLink> {
    res.extensions.get::<ActiveRequest>().map(|a| &a.0)
}

pub(crate) fn mark_current(req: &mut Request, node: &Arc<RouteNode>) {
    if let Some(ctx) = req.extensions.get_mut::<RouteContext>() {
        ctx.current = Some(Arc::clone(node));
    }
}

pub(crate) fn router_of(req: &Request) -> Option<NamedRouter> {
    context(req).map(|c| c.router.clone())
}

fn require_context(req: &Request) -> Result<&RouteContext> {
    context(req).ok_or_else(|| {
        RoutingError::State("request was not dispatched through a named router".into())
    })
}

/// Generates the path of the route `name`.
///
/// Parameters of the current request fill in whatever `params` does not
/// supply.
pub fn path_for(
    req: &Request,
    name: &str,
    params: &PathParams,
    query: &IndexMap<String, String>,
) -> Result<String> {
    let ctx = require_context(req)?;
    let mut merged = req.params.clone();
    merged.extend(params);
    ctx.router.path_for(name, &merged, query)
}

/// Redirects to the route `name`.
pub fn redirect_to(
    req: &Request,
    res: &mut Response,
    name: &str,
    params: &PathParams,
    query: &IndexMap<String, String>,
) -> Result<()> {
    let location = path_for(req, name, params, query)?;
    res.redirect(location);
    Ok(())
}
