//! # oxide-routing
//!
//! Named route trees on top of [`oxide_router`].
//!
//! This crate provides:
//! - Route trees of segments and actions declared inline or in YAML files
//! - Path generation by route name, with defaults and requirements
//! - Middleware and parameter hooks scoped to a subtree
//! - Internal forwarding to another named route, with loop detection
//!
//! ## Declaring routes
//!
//! ```yaml
//! users:
//!   pattern: /users
//!   controller: users.index
//!   routes:
//!     show:
//!       pattern: /:id
//!       controller: users.show
//!       requirements:
//!         id: \d+
//!     admin:
//!       pattern: /admin
//!       resource: admin.yml
//! ```
//!
//! An entry with a `controller` and no children is an action. An entry with
//! `routes` or `resource` is a segment; when it also names a controller,
//! that controller serves the segment's own path.
//!
//! ## Mounting
//!
//! ```ignore
//! use std::sync::Arc;
//! use oxide_routing::{Controller, NamedRouter, RouterOptions};
//!
//! let router = NamedRouter::new(RouterOptions::default().base_path("config"))?;
//! router.register_controller(
//!     Controller::new("users")
//!         .action("index", list_users)
//!         .action("show", show_user),
//! );
//! router.load_file("routes.yml")?;
//!
//! let mut app = oxide_router::Router::new();
//! app.use_middleware(Arc::new(router.middleware()?));
//! ```
//!
//! ## Inside handlers
//!
//! ```ignore
//! let show = handler_fn(|req, res| {
//!     Box::pin(async move {
//!         if req.params.get("id") == Some("me") {
//!             let options = ForwardOptions::new().param("id", current_user_id());
//!             return oxide_routing::forward(req, res, "show", options)
//!                 .await
//!                 .map_err(Into::into);
//!         }
//!         let url = oxide_routing::path_for(req, "show", &PathParams::new(), &IndexMap::new())?;
//!         res.send_text(url);
//!         Ok(())
//!     })
//! });
//! ```

mod action;
mod config;
mod context;
mod controller;
mod error;
mod events;
mod factory;
mod forward;
mod node;
mod pattern;
mod registry;
mod router;
mod segment;

pub use action::ActionRoute;
pub use config::{
    load_route_table, parse_route_table, DefaultValue, Methods, RouteConfig, RouteTable,
    RouterOptions,
};
pub use context::{
    active_request, context, current_route, path_for, redirect_to, ActiveRequest, RequestLink,
    RouteContext,
};
pub use controller::{ActionBinding, Controller, ControllerFactory, ControllerRef, Verb};
pub use error::{Result, RoutingError};
pub use events::{EventBus, RouterEvent};
pub use factory::{CreatedRoutes, RouteFactory, RESERVED_NAME_CHAR};
pub use forward::{forward, ForwardOptions};
pub use node::{encode_query, GenerateOptions, NodeKind, RouteNode, ROOT_NAME};
pub use pattern::{ParamSpec, ParseOptions, ParsedPattern, RenderError, Segment};
pub use registry::{DuplicateRoute, Registration, RouteRegistry};
pub use router::{NamedRouter, RouterMiddleware};
pub use segment::SegmentRoute;
