//! Internal forwarding: re-dispatching a request to another named route
//! without a client round trip.
//!
//! A forward builds a fresh sub-request for the target and re-enters the
//! tree at the shallowest point that still runs every middleware the target
//! needs but that the current request has not already run:
//!
//! * the target itself, when it is a sibling of the current route or sits
//!   directly below their common ancestor;
//! * otherwise the common ancestor's child on the way to the target.
//!
//! Every request remembers the `(route, verb)` pairs its chain has visited.
//! Revisiting one, or going deeper than the configured limit, is a loop.

use std::sync::Arc;

use indexmap::IndexMap;
use oxide_router::{BoxFuture, Flow, Method, PathParams, Request, Response};
use tracing::{debug, warn};

use crate::action::ActionRoute;
use crate::context::{self, ActiveRequest, RequestLink, RouteContext, Visit};
use crate::controller::Verb;
use crate::error::{Result, RoutingError};
use crate::node::{GenerateOptions, RouteNode};

/// How to build a forwarded request.
#[derive(Debug, Clone, Default)]
pub struct ForwardOptions {
    /// Verb override. Defaults to the current verb when the target handles
    /// it, else the target's only verb.
    pub method: Option<Method>,
    /// Parameters of the forwarded request.
    pub params: PathParams,
    /// Query of the forwarded request; the current query when `None`.
    pub query: Option<IndexMap<String, String>>,
}

impl ForwardOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the verb.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// Replaces the parameters.
    #[must_use]
    pub fn params(mut self, params: PathParams) -> Self {
        self.params = params;
        self
    }

    /// Replaces the query.
    #[must_use]
    pub fn query(mut self, query: IndexMap<String, String>) -> Self {
        self.query = Some(query);
        self
    }
}

/// Where a forwarded request enters the tree.
#[derive(Debug, Clone)]
enum DispatchPoint {
    /// Call the target's handler without re-running ancestor middleware.
    Direct(Arc<RouteNode>),
    /// Run the framework dispatch of this node, which leads to the target.
    Enter(Arc<RouteNode>),
}

impl DispatchPoint {
    fn node(&self) -> &Arc<RouteNode> {
        match self {
            Self::Direct(node) | Self::Enter(node) => node,
        }
    }

    fn is_direct(&self) -> bool {
        matches!(self, Self::Direct(_))
    }
}

struct ForwardPlan {
    request: Request,
    dispatch: DispatchPoint,
    target: Arc<RouteNode>,
}

/// Forwards the request to the route `target`.
///
/// Resolves once the target has handled the forwarded request. The
/// forwarded request shares the body of `req`; everything else is its own.
/// While it runs, [`context::active_request`] on `res` reports it.
pub fn forward<'a>(
    req: &'a Request,
    res: &'a mut Response,
    target: &'a str,
    options: ForwardOptions,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let ForwardPlan {
            mut request,
            dispatch,
            target,
        } = plan(req, target, options)?;

        debug!(
            from = ?context::current_route(req).map(|n| n.name().to_string()),
            to = %target.name(),
            method = %request.method,
            path = %request.path,
            direct = dispatch.is_direct(),
            via = %dispatch.node().name(),
            "forwarding request"
        );

        let previous = res
            .extensions
            .insert(ActiveRequest(RequestLink::of(&request)));
        tokio::task::yield_now().await;
        let outcome = dispatch
            .node()
            .invoke(&mut request, res, dispatch.is_direct())
            .await;
        match previous {
            Some(previous) => {
                res.extensions.insert(previous);
            }
            None => {
                res.extensions.remove::<ActiveRequest>();
            }
        }

        match outcome.map_err(RoutingError::from)? {
            Flow::Handled => Ok(()),
            Flow::Continue => {
                warn!(route = %target.name(), path = %request.path, "forwarded request was not handled");
                Err(RoutingError::NotFound(format!(
                    "forwarded request to '{}' was not handled",
                    target.name()
                )))
            }
        }
    })
}

fn plan(req: &Request, target_name: &str, options: ForwardOptions) -> Result<ForwardPlan> {
    let ctx = context::context(req).ok_or_else(|| {
        RoutingError::State("request was not dispatched through a named router".into())
    })?;
    let router = ctx.router();
    let current = ctx
        .current()
        .cloned()
        .ok_or_else(|| RoutingError::State("no route is handling this request".into()))?;

    let mut target = router.route(target_name)?;
    if let Some(index) = target.index_action() {
        target = index;
    }
    let action = target
        .as_action()
        .ok_or_else(|| RoutingError::InvalidTarget(target_name.to_string()))?;
    if Arc::ptr_eq(&current, &target) && !action.is_verb_style() {
        return Err(RoutingError::Loop {
            chain: vec![current.name().to_string(), target.name().to_string()],
        });
    }
    let method = effective_method(req.method, options.method, &target, action)?;

    let mut history = ctx.history.clone();
    if history.is_empty() {
        history.push(Visit {
            node: Arc::clone(&current),
            method: req.method,
        });
    }
    let mut chain: Vec<String> = history.iter().map(|v| v.node.name().to_string()).collect();
    chain.push(target.name().to_string());
    if history
        .iter()
        .any(|v| Arc::ptr_eq(&v.node, &target) && v.method == method)
    {
        return Err(RoutingError::Loop { chain });
    }
    let depth = ctx.depth + 1;
    if depth > router.options().max_forward_depth {
        warn!(depth, limit = router.options().max_forward_depth, "forward depth limit reached");
        return Err(RoutingError::Loop { chain });
    }
    history.push(Visit {
        node: Arc::clone(&target),
        method,
    });

    let dispatch = dispatch_point(&current, &target)?;

    let generate = router.generate_options();
    let no_query = IndexMap::new();
    let full = target.generate_path(&options.params, &no_query, &generate)?;
    let relative = match dispatch.node().parent_route() {
        Some(base) => target.generate_path(
            &options.params,
            &no_query,
            &GenerateOptions {
                stop_at: Some(base),
                ..generate
            },
        )?,
        None => full.clone(),
    };
    let base_path = base_path_of(&full, &relative);
    let query = options.query.unwrap_or_else(|| req.query.clone());

    let mut request = Request::new(method, relative);
    request.base_path = base_path;
    request.original_url = if query.is_empty() {
        full
    } else {
        format!("{full}?{}", crate::node::encode_query(&query))
    };
    request.params = options.params;
    request.query = query;
    request.headers = req.headers.clone();
    request.remote_addr = req.remote_addr;
    request.body = req.body.clone();

    let parent = RequestLink::of(req);
    let original = ctx.original().cloned().unwrap_or_else(|| parent.clone());
    request.extensions.insert(RouteContext {
        router: router.clone(),
        current: None,
        history,
        depth,
        parent: Some(parent),
        original: Some(original),
    });

    Ok(ForwardPlan {
        request,
        dispatch,
        target,
    })
}

fn effective_method(
    current: Method,
    requested: Option<Method>,
    target: &RouteNode,
    action: &ActionRoute,
) -> Result<Method> {
    let mismatch = |method: Method| RoutingError::VerbMismatch {
        route: target.name().to_string(),
        method: method.to_string(),
        declared: action.describe_verbs(),
    };
    if let Some(method) = requested {
        return if action.handles_method(method) {
            Ok(method)
        } else {
            Err(mismatch(method))
        };
    }
    if action.handles_method(current) {
        return Ok(current);
    }
    match action.verbs().as_slice() {
        [Verb::Method(only)] => Ok(*only),
        _ => Err(mismatch(current)),
    }
}

fn dispatch_point(current: &Arc<RouteNode>, target: &Arc<RouteNode>) -> Result<DispatchPoint> {
    if Arc::ptr_eq(current, target) || current.is_sibling_of(target) {
        return Ok(DispatchPoint::Direct(Arc::clone(target)));
    }
    let common = current.find_connecting_route(target).ok_or_else(|| {
        RoutingError::State(format!(
            "routes '{}' and '{}' are not in the same tree",
            current.name(),
            target.name()
        ))
    })?;
    let below = target.lineage_below(&common);
    match below.as_slice() {
        [first, _, ..] => Ok(DispatchPoint::Enter(Arc::clone(first))),
        _ => Ok(DispatchPoint::Direct(Arc::clone(target))),
    }
}

/// The part of `full` in front of `relative`.
fn base_path_of(full: &str, relative: &str) -> String {
    let base = if relative == "/" {
        full
    } else {
        full.strip_suffix(relative).unwrap_or("")
    };
    if base == "/" {
        String::new()
    } else {
        base.to_string()
    }
}
