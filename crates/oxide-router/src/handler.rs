//! Route handlers and parameter hooks.

use crate::error::Result;
use crate::middleware::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// A terminal request handler.
///
/// A handler that returns `Ok(())` has completed the response.
pub trait Handler: Send + Sync {
    /// Handles the request.
    fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Result<()>>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Result<()>> {
        self(req, res)
    }
}

/// Wraps a closure as a handler.
///
/// ```ignore
/// let show = handler_fn(|req, res| {
///     Box::pin(async move {
///         let id = req.params.require("id").unwrap_or("unknown").to_string();
///         res.send_text(format!("User: {id}"));
///         Ok(())
///     })
/// });
/// ```
pub fn handler_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    f
}

/// A hook run once per request when a named path parameter is present.
pub trait ParamHandler: Send + Sync {
    /// Inspects (and may rewrite) the request for the given value.
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        value: String,
    ) -> BoxFuture<'a, Result<()>>;
}

impl<F> ParamHandler for F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, String) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        value: String,
    ) -> BoxFuture<'a, Result<()>> {
        self(req, res, value)
    }
}

/// Wraps a closure as a parameter hook.
pub fn param_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, String) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
{
    f
}
