//! Middleware support for request/response processing.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info};

use crate::error::{Result, RouterError};
use crate::request::Request;
use crate::response::Response;

/// A boxed future for async middleware operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next layer.
    Continue,
    /// The response is complete; stop processing.
    Handled,
}

/// Trait for middleware that processes a request before it reaches a
/// route.
///
/// Middleware can:
/// - Modify the request (params, body, extensions)
/// - Short-circuit processing by returning [`Flow::Handled`]
/// - Abort processing by returning an error
///
/// # Example
///
/// ```ignore
/// struct RequireJson;
///
/// impl Middleware for RequireJson {
///     fn handle<'a>(
///         &'a self,
///         req: &'a mut Request,
///         res: &'a mut Response,
///     ) -> BoxFuture<'a, Result<Flow>> {
///         Box::pin(async move {
///             if req.get_header("Content-Type") == Some("application/json") {
///                 return Ok(Flow::Continue);
///             }
///             res.status = 415;
///             Ok(Flow::Handled)
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    /// Processes the request.
    fn handle<'a>(&'a self, req: &'a mut Request, res: &'a mut Response)
        -> BoxFuture<'a, Result<Flow>>;
}

impl<F> Middleware for F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<Flow>> + Send + Sync,
{
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Result<Flow>> {
        self(req, res)
    }
}

/// Wraps a closure as middleware.
///
/// Passing the closure through this function lets the compiler infer its
/// higher-ranked signature.
pub fn middleware_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<Flow>> + Send + Sync,
{
    f
}

/// Middleware that logs requests.
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        _res: &'a mut Response,
    ) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            info!(method = %req.method, url = %req.original_url, "request");
            Ok(Flow::Continue)
        })
    }
}

/// Middleware that parses a JSON body into the request's body cell.
///
/// Bodies that were already parsed are left alone, so running the parser
/// again for a forwarded request is cheap and keeps one parse result.
pub struct JsonBodyParser;

impl Middleware for JsonBodyParser {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        _res: &'a mut Response,
    ) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            if req.body.is_parsed() {
                return Ok(Flow::Continue);
            }
            let raw = req.body.raw();
            if raw.is_empty() {
                return Ok(Flow::Continue);
            }
            let value: serde_json::Value =
                serde_json::from_slice(&raw).map_err(|e| RouterError::handler(400, e))?;
            debug!(bytes = raw.len(), "parsed JSON body");
            req.body.set_parsed(value);
            Ok(Flow::Continue)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_body_parser() {
        let mut req = Request::post("/items").body(r#"{"name":"widget"}"#);
        let mut res = Response::ok();
        let flow = JsonBodyParser.handle(&mut req, &mut res).await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            req.body.parsed(),
            Some(serde_json::json!({"name": "widget"}))
        );
    }

    #[tokio::test]
    async fn test_json_body_parser_rejects_garbage() {
        let mut req = Request::post("/items").body("{not json");
        let mut res = Response::ok();
        let err = JsonBodyParser.handle(&mut req, &mut res).await.unwrap_err();
        assert_eq!(err.status(), 400);
    }
}
