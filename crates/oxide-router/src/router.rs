//! Main router implementation.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::Result;
use crate::handler::{Handler, ParamHandler};
use crate::middleware::{BoxFuture, Flow, Middleware};
use crate::path::PathPattern;
use crate::request::{Method, PathParams, Request};
use crate::response::Response;

/// A single entry in a router's stack.
enum Layer {
    /// Middleware, optionally restricted to a path prefix.
    Middleware {
        pattern: Option<PathPattern>,
        middleware: Arc<dyn Middleware>,
    },
    /// A verb route. `method == None` matches every method.
    Route {
        method: Option<Method>,
        pattern: PathPattern,
        handler: Arc<dyn Handler>,
    },
    /// A mounted sub-router.
    Mount(Arc<Mount>),
}

/// A router mounted under a path prefix.
///
/// While the sub-router runs, the matched prefix moves from
/// [`Request::path`] to [`Request::base_path`] and the prefix's parameters
/// are merged into [`Request::params`]. All three are restored afterwards.
pub struct Mount {
    pattern: PathPattern,
    router: Router,
}

/// Request state saved while a mount is active.
struct Scope {
    path: String,
    base_path: String,
    params: PathParams,
}

impl Scope {
    fn restore(self, req: &mut Request) {
        req.path = self.path;
        req.base_path = self.base_path;
        req.params = self.params;
    }
}

impl Mount {
    /// Returns the mount's path pattern.
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Returns the mounted router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Dispatches a request whose path is relative to the mount's parent.
    ///
    /// Returns [`Flow::Continue`] when the prefix does not match or nothing
    /// inside the sub-router handled the request.
    pub fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            let Some((scope, _)) = self.enter(req) else {
                return Ok(Flow::Continue);
            };
            let result = self.router.handle(req, res).await;
            scope.restore(req);
            result
        })
    }

    fn enter(&self, req: &mut Request) -> Option<(Scope, PathParams)> {
        let m = self.pattern.match_path(&req.path)?;
        let scope = Scope {
            path: req.path.clone(),
            base_path: req.base_path.clone(),
            params: req.params.clone(),
        };
        req.base_path.push_str(&m.matched);
        req.path = m.rest;
        req.params.extend(&m.params);
        Some((scope, m.params))
    }
}

/// A layered router.
///
/// Layers run in registration order. Middleware may continue or finish the
/// request, routes finish it, and mounted routers fall through to the next
/// layer when none of their own layers handled the request.
#[derive(Default)]
pub struct Router {
    layers: Vec<Layer>,
    params: Vec<(String, Arc<dyn ParamHandler>)>,
}

impl Router {
    /// Creates a new empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds middleware that runs for every request reaching this router.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.layers.push(Layer::Middleware {
            pattern: None,
            middleware,
        });
    }

    /// Adds middleware that runs for paths under `path`.
    pub fn use_at(&mut self, path: &str, middleware: Arc<dyn Middleware>) -> Result<()> {
        let pattern = PathPattern::prefix(path)?;
        self.layers.push(Layer::Middleware {
            pattern: Some(pattern),
            middleware,
        });
        Ok(())
    }

    /// Registers a hook for the named path parameter.
    pub fn param(&mut self, name: impl Into<String>, handler: Arc<dyn ParamHandler>) {
        self.params.push((name.into(), handler));
    }

    /// Adds a route. `None` matches every method.
    pub fn route(
        &mut self,
        method: Option<Method>,
        path: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        let pattern = PathPattern::exact(path)?;
        self.layers.push(Layer::Route {
            method,
            pattern,
            handler,
        });
        Ok(())
    }

    /// Adds a GET route.
    pub fn get(&mut self, path: &str, handler: Arc<dyn Handler>) -> Result<()> {
        self.route(Some(Method::Get), path, handler)
    }

    /// Adds a POST route.
    pub fn post(&mut self, path: &str, handler: Arc<dyn Handler>) -> Result<()> {
        self.route(Some(Method::Post), path, handler)
    }

    /// Mounts a sub-router under `path` and returns the mount so callers
    /// can dispatch into it directly later.
    pub fn mount(&mut self, path: &str, router: Self) -> Result<Arc<Mount>> {
        let mount = Arc::new(Mount {
            pattern: PathPattern::prefix(path)?,
            router,
        });
        self.layers.push(Layer::Mount(Arc::clone(&mount)));
        Ok(mount)
    }

    /// Returns the number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns whether the router has no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Runs the request through this router's layers.
    pub fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            let mut called = HashSet::new();
            let present = req.params.clone();
            self.run_params(req, res, &present, &mut called).await?;

            for layer in &self.layers {
                match layer {
                    Layer::Middleware {
                        pattern,
                        middleware,
                    } => {
                        if pattern
                            .as_ref()
                            .is_some_and(|p| p.match_path(&req.path).is_none())
                        {
                            continue;
                        }
                        if middleware.handle(req, res).await? == Flow::Handled {
                            return Ok(Flow::Handled);
                        }
                    }
                    Layer::Route {
                        method,
                        pattern,
                        handler,
                    } => {
                        if method.is_some_and(|m| m != req.method) {
                            continue;
                        }
                        let Some(m) = pattern.match_path(&req.path) else {
                            continue;
                        };
                        trace!(pattern = %pattern.pattern(), path = %req.path, "route matched");
                        let saved = req.params.clone();
                        req.params.extend(&m.params);
                        let result = match self.run_params(req, res, &m.params, &mut called).await
                        {
                            Ok(()) => handler.call(req, res).await,
                            Err(e) => Err(e),
                        };
                        req.params = saved;
                        result?;
                        return Ok(Flow::Handled);
                    }
                    Layer::Mount(mount) => {
                        let Some((scope, matched)) = mount.enter(req) else {
                            continue;
                        };
                        let result = match self.run_params(req, res, &matched, &mut called).await {
                            Ok(()) => mount.router.handle(req, res).await,
                            Err(e) => Err(e),
                        };
                        scope.restore(req);
                        if result? == Flow::Handled {
                            return Ok(Flow::Handled);
                        }
                    }
                }
            }

            Ok(Flow::Continue)
        })
    }

    /// Runs parameter hooks for parameters that have not been seen yet.
    async fn run_params(
        &self,
        req: &mut Request,
        res: &mut Response,
        params: &PathParams,
        called: &mut HashSet<String>,
    ) -> Result<()> {
        for (name, hook) in &self.params {
            let Some(value) = params.get(name) else {
                continue;
            };
            if !called.insert(name.clone()) {
                continue;
            }
            hook.call(req, res, value.to_string()).await?;
        }
        Ok(())
    }

    /// Handles a complete request and renders the outcome.
    ///
    /// Unhandled requests become `404 Not Found`; errors become a response
    /// with the error's status code.
    pub async fn dispatch(&self, request: Request) -> Response {
        let mut req = request;
        let mut res = Response::ok();
        match self.handle(&mut req, &mut res).await {
            Ok(Flow::Handled) => res,
            Ok(Flow::Continue) => Response::not_found(),
            Err(e) => {
                warn!(method = %req.method, path = %req.path, error = %e, "request failed");
                Response::error(e.status(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::RouterError;
    use crate::handler::{handler_fn, param_fn};
    use crate::middleware::middleware_fn;

    fn text(body: &'static str) -> Arc<dyn Handler> {
        Arc::new(handler_fn(move |_req, res| {
            Box::pin(async move {
                res.send_text(body);
                Ok(())
            })
        }))
    }

    fn echo_param(name: &'static str) -> Arc<dyn Handler> {
        Arc::new(handler_fn(move |req, res| {
            Box::pin(async move {
                let value = req.params.get(name).unwrap_or("unknown").to_string();
                res.send_text(value);
                Ok(())
            })
        }))
    }

    #[tokio::test]
    async fn test_basic_routing() {
        let mut router = Router::new();
        router.get("/", text("Hello, World!")).unwrap();

        let res = router.dispatch(Request::get("/")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body_string(), Some("Hello, World!".to_string()));
    }

    #[tokio::test]
    async fn test_not_found() {
        let mut router = Router::new();
        router.get("/", text("home")).unwrap();

        let res = router.dispatch(Request::get("/nonexistent")).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_method_filter() {
        let mut router = Router::new();
        router.get("/", text("home")).unwrap();

        let res = router.dispatch(Request::post("/")).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_mount_merges_params() {
        let mut posts = Router::new();
        posts.get("/posts/:post_id", echo_param("user_id")).unwrap();

        let mut router = Router::new();
        router.mount("/users/:user_id", posts).unwrap();

        let res = router.dispatch(Request::get("/users/7/posts/3")).await;
        assert_eq!(res.body_string(), Some("7".to_string()));
    }

    #[tokio::test]
    async fn test_mount_falls_through() {
        let mut api = Router::new();
        api.get("/health", text("ok")).unwrap();

        let mut router = Router::new();
        router.mount("/api", api).unwrap();
        router.get("/api/other", text("outer")).unwrap();

        let res = router.dispatch(Request::get("/api/other")).await;
        assert_eq!(res.body_string(), Some("outer".to_string()));
    }

    #[tokio::test]
    async fn test_middleware_order_and_short_circuit() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let mut router = Router::new();
        router.use_middleware(Arc::new(middleware_fn(move |_req, _res| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Continue)
            })
        })));
        router
            .use_at(
                "/admin",
                Arc::new(middleware_fn(|_req, res| {
                    Box::pin(async move {
                        res.status = 403;
                        Ok(Flow::Handled)
                    })
                })),
            )
            .unwrap();
        router.get("/admin", text("secret")).unwrap();
        router.get("/", text("home")).unwrap();

        let res = router.dispatch(Request::get("/admin")).await;
        assert_eq!(res.status, 403);
        let res = router.dispatch(Request::get("/")).await;
        assert_eq!(res.body_string(), Some("home".to_string()));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_param_hook_runs_once_before_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let mut inner = Router::new();
        inner.get("/", echo_param("id")).unwrap();
        inner.get("/edit", echo_param("id")).unwrap();

        let mut router = Router::new();
        router.param(
            "id",
            Arc::new(param_fn(move |req, _res, value| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    req.params.insert("id", value.to_uppercase());
                    Ok(())
                })
            })),
        );
        router.mount("/items/:id", inner).unwrap();

        let res = router.dispatch(Request::get("/items/abc/edit")).await;
        assert_eq!(res.body_string(), Some("ABC".to_string()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_response() {
        let mut router = Router::new();
        router
            .get(
                "/boom",
                Arc::new(handler_fn(|_req, _res| {
                    Box::pin(async move { Err(RouterError::handler(400, "bad input")) })
                })),
            )
            .unwrap();

        let res = router.dispatch(Request::get("/boom")).await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body_string(), Some("bad input".to_string()));
    }

    #[tokio::test]
    async fn test_direct_mount_dispatch_restores_request() {
        let mut inner = Router::new();
        inner.get("/:id", echo_param("id")).unwrap();
        let mut outer = Router::new();
        let mount = outer.mount("/things", inner).unwrap();

        let mut req = Request::get("/things/9");
        let mut res = Response::ok();
        let flow = mount.handle(&mut req, &mut res).await.unwrap();
        assert_eq!(flow, Flow::Handled);
        assert_eq!(res.body_string(), Some("9".to_string()));
        assert_eq!(req.path, "/things/9");
        assert!(req.base_path.is_empty());
        assert!(req.params.is_empty());
    }
}
