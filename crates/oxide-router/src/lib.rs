//! # oxide-router
//!
//! Layered request dispatch with middleware support.
//!
//! This crate provides:
//! - Path pattern matching with required, optional and wildcard parameters
//! - HTTP method-based routes
//! - Middleware that can continue, finish or fail a request
//! - Per-parameter hooks
//! - Mountable sub-routers with prefix stripping and parameter merging
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use oxide_router::{handler_fn, Request, Router};
//!
//! let mut router = Router::new();
//! router.get("/users/:id", Arc::new(handler_fn(|req, res| {
//!     Box::pin(async move {
//!         let id = req.params.get("id").unwrap_or("unknown").to_string();
//!         res.send_text(format!("User: {id}"));
//!         Ok(())
//!     })
//! })))?;
//!
//! let response = router.dispatch(Request::get("/users/123")).await;
//! ```
//!
//! ## Sub-routers
//!
//! ```ignore
//! let mut api = Router::new();
//! api.get("/health", health)?;
//!
//! let mut app = Router::new();
//! app.use_middleware(Arc::new(LoggingMiddleware));
//! let mount = app.mount("/api/v1", api)?;
//! ```
//!
//! The returned [`Mount`] can be used to dispatch a request straight into
//! the sub-router, which is how internal redispatch re-enters a tree.

mod error;
mod handler;
mod middleware;
mod path;
mod request;
mod response;
mod router;

pub use error::{BoxError, Result, RouterError};
pub use handler::{handler_fn, param_fn, Handler, ParamHandler};
pub use middleware::{middleware_fn, BoxFuture, Flow, JsonBodyParser, LoggingMiddleware, Middleware};
pub use path::{PathMatch, PathPattern, PathSegment};
pub use request::{Body, BodyData, Method, PathParams, Request, UnknownMethod};
pub use response::Response;
pub use router::{Mount, Router};
