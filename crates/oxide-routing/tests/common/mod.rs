#![allow(dead_code)]

use std::sync::Arc;

use indexmap::IndexMap;
use oxide_router::{
    handler_fn, middleware_fn, Flow, Handler, Middleware, PathParams, Request, Response,
    RouterError,
};
use oxide_routing::{context, forward, ForwardOptions, NamedRouter, RouterOptions};
use parking_lot::Mutex;

/// Ordered record of what ran during a request.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

pub fn router() -> NamedRouter {
    router_with(RouterOptions::default())
}

pub fn router_with(options: RouterOptions) -> NamedRouter {
    init_tracing();
    NamedRouter::new(options).unwrap_or_else(|e| panic!("Failed to build router: {e}"))
}

pub async fn send(router: &NamedRouter, req: Request) -> Response {
    router
        .dispatch(req)
        .await
        .unwrap_or_else(|e| panic!("Failed to mount router: {e}"))
}

pub fn body(res: &Response) -> String {
    res.body_string().unwrap_or_default()
}

/// Records `label` and answers with it.
pub fn reply(log: &Log, label: &'static str) -> impl Handler {
    let log = Arc::clone(log);
    handler_fn(move |_req, res| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().push(label.to_string());
            res.send_text(label);
            Ok(())
        })
    })
}

/// Records `label` with the request's method and path.
pub fn describe(log: &Log, label: &'static str) -> impl Handler {
    let log = Arc::clone(log);
    handler_fn(move |req, res| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().push(label.to_string());
            res.send_text(format!("{label} {} {}", req.method, req.path));
            Ok(())
        })
    })
}

/// Records `label` and forwards to `target`.
pub fn forwarder(
    log: &Log,
    label: &'static str,
    target: &'static str,
    options: ForwardOptions,
) -> impl Handler {
    let log = Arc::clone(log);
    handler_fn(move |req, res| {
        let log = Arc::clone(&log);
        let options = options.clone();
        Box::pin(async move {
            log.lock().push(label.to_string());
            forward(req, res, target, options)
                .await
                .map_err(RouterError::from)
        })
    })
}

/// Forwards to `target` and answers with the forward's error, if any.
pub fn forward_reporting(target: &'static str, options: ForwardOptions) -> impl Handler {
    handler_fn(move |req, res| {
        let options = options.clone();
        Box::pin(async move {
            if let Err(e) = forward(req, res, target, options).await {
                res.status = e.status();
                res.send_text(e.to_string());
            }
            Ok(())
        })
    })
}

/// Answers with the forwarding chain of the request.
pub fn chain_reporter() -> impl Handler {
    handler_fn(|req, res| {
        Box::pin(async move {
            let ctx = context(req);
            let chain = ctx.map(|c| c.forward_chain().join(",")).unwrap_or_default();
            let depth = ctx.map_or(0, |c| c.depth());
            res.send_text(format!("{chain}@{depth}"));
            Ok(())
        })
    })
}

/// Records `label` and continues.
pub fn mark(log: &Log, label: &'static str) -> impl Middleware {
    let log = Arc::clone(log);
    middleware_fn(move |_req, _res| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().push(label.to_string());
            Ok(Flow::Continue)
        })
    })
}

pub fn shared<M: Middleware + 'static>(middleware: M) -> Arc<dyn Middleware> {
    Arc::new(middleware)
}

/// Answers with the value of a path parameter.
pub fn echo_param(name: &'static str) -> impl Handler {
    handler_fn(move |req, res| {
        Box::pin(async move {
            res.send_text(req.params.get(name).unwrap_or("-").to_string());
            Ok(())
        })
    })
}

pub fn params(pairs: &[(&str, &str)]) -> PathParams {
    pairs.iter().copied().collect()
}

pub fn no_query() -> IndexMap<String, String> {
    IndexMap::new()
}
