//! The router facade.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use oxide_router::{
    BoxFuture, Flow, Middleware, ParamHandler, PathParams, Request, Response,
    Router as Dispatcher,
};
use tracing::{info, trace};

use crate::config::{load_route_table, RouteConfig, RouteTable, RouterOptions};
use crate::context::{ActiveRequest, RequestLink, RouteContext};
use crate::controller::{Controller, ControllerFactory};
use crate::error::{Result, RoutingError};
use crate::events::{EventBus, RouterEvent};
use crate::factory::{CreatedRoutes, RouteFactory};
use crate::node::{GenerateOptions, RouteNode};
use crate::pattern::ParsedPattern;
use crate::registry::RouteRegistry;

struct RouterInner {
    options: RouterOptions,
    root: Arc<RouteNode>,
    registry: RouteRegistry,
    controllers: ControllerFactory,
    events: EventBus,
    dispatcher: OnceLock<Arc<Dispatcher>>,
}

/// A tree of named routes mounted as one middleware.
///
/// Cloning is cheap; clones share the same tree.
///
/// ```ignore
/// let router = NamedRouter::new(RouterOptions::default())?;
/// router.register_controller(
///     Controller::new("users").action("show", show_user),
/// );
/// router.load_str("user:\n  pattern: /users/:id\n  controller: users.show\n")?;
///
/// let mut app = oxide_router::Router::new();
/// app.use_middleware(Arc::new(router.middleware()?));
/// ```
#[derive(Clone)]
pub struct NamedRouter {
    inner: Arc<RouterInner>,
}

impl NamedRouter {
    /// Creates a router with an empty tree.
    pub fn new(options: RouterOptions) -> Result<Self> {
        let root = Arc::new(RouteNode::root(ParsedPattern::parse(&options.mount_path)?));
        let controllers = ControllerFactory::new(options.controller_prefix.clone());
        Ok(Self {
            inner: Arc::new(RouterInner {
                options,
                root,
                registry: RouteRegistry::new(),
                controllers,
                events: EventBus::new(),
                dispatcher: OnceLock::new(),
            }),
        })
    }

    /// Returns the options the router was built with.
    pub fn options(&self) -> &RouterOptions {
        &self.inner.options
    }

    /// Returns the root of the tree.
    pub fn root(&self) -> &Arc<RouteNode> {
        &self.inner.root
    }

    /// Returns the controller factory.
    pub fn controllers(&self) -> &ControllerFactory {
        &self.inner.controllers
    }

    /// Registers a ready-made controller.
    pub fn register_controller(&self, controller: Controller) {
        self.inner.controllers.register_instance(controller);
    }

    /// Returns the event bus.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Subscribes to tree events.
    pub fn on_event(&self, listener: impl Fn(&RouterEvent<'_>) + Send + Sync + 'static) {
        self.inner.events.subscribe(listener);
    }

    /// Returns whether [`mount`](Self::mount) has run.
    pub fn is_mounted(&self) -> bool {
        self.inner.dispatcher.get().is_some()
    }

    fn ensure_unmounted(&self) -> Result<()> {
        if self.is_mounted() {
            return Err(RoutingError::State(
                "no routes can be added after the router has been mounted".into(),
            ));
        }
        Ok(())
    }

    fn factory(&self) -> RouteFactory<'_> {
        RouteFactory::new(
            &self.inner.registry,
            &self.inner.controllers,
            &self.inner.events,
            &self.inner.options,
        )
    }

    /// Loads a YAML route file. Relative paths resolve against the
    /// configured base path.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<CreatedRoutes> {
        self.ensure_unmounted()?;
        let path = self.inner.options.base_path.join(path.as_ref());
        self.factory().create_routes_from_resource(&path, &self.inner.root)
    }

    /// Loads a YAML route table held in memory.
    pub fn load_str(&self, yaml: &str) -> Result<CreatedRoutes> {
        let table = load_route_table(yaml, Path::new("<inline>"))?;
        self.load_config(&table)
    }

    /// Loads an already deserialized route table.
    pub fn load_config(&self, table: &RouteTable) -> Result<CreatedRoutes> {
        self.ensure_unmounted()?;
        let created = self.factory().create_routes_from_config(
            table,
            &self.inner.root,
            &self.inner.options.base_path,
        )?;
        info!(routes = created.len(), "loaded route table");
        Ok(created)
    }

    /// Adds a single top-level route.
    pub fn add_route(&self, name: &str, config: RouteConfig) -> Result<Arc<RouteNode>> {
        let mut table = RouteTable::new();
        table.insert(name.to_string(), config);
        let mut created = self.load_config(&table)?;
        created
            .swap_remove(name)
            .ok_or_else(|| RoutingError::NotFound(name.to_string()))
    }

    /// Registers middleware on the root.
    pub fn use_middleware(
        &self,
        middleware: impl Middleware + 'static,
        mount_path: Option<&str>,
    ) -> Result<()> {
        self.inner.root.use_middleware(Arc::new(middleware), mount_path)
    }

    /// Registers a parameter hook on the root.
    pub fn param(&self, name: &str, handler: impl ParamHandler + 'static) -> Result<()> {
        self.inner.root.param(name, Arc::new(handler))
    }

    /// Looks up a route by name.
    pub fn route(&self, name: &str) -> Result<Arc<RouteNode>> {
        self.inner
            .registry
            .get(name)
            .ok_or_else(|| RoutingError::NotFound(name.to_string()))
    }

    /// Returns whether a route is registered under `name`.
    pub fn has_route(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    /// Returns the registered route names in registration order.
    pub fn route_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    pub(crate) fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            stop_at: None,
            validate: self.inner.options.validate_generated_paths,
        }
    }

    /// Generates the path of the route `name`.
    pub fn path_for(
        &self,
        name: &str,
        params: &PathParams,
        query: &IndexMap<String, String>,
    ) -> Result<String> {
        self.route(name)?
            .generate_path(params, query, &self.generate_options())
    }

    /// Generates an absolute URL for the route `name` under `origin`
    /// (e.g. `https://example.com`).
    pub fn url_for(
        &self,
        name: &str,
        params: &PathParams,
        query: &IndexMap<String, String>,
        origin: &str,
    ) -> Result<String> {
        let path = self.path_for(name, params, query)?;
        Ok(format!("{}{path}", origin.trim_end_matches('/')))
    }

    /// Mounts the tree. Runs once.
    pub fn mount(&self) -> Result<()> {
        if self.is_mounted() {
            return Err(RoutingError::State("router is already mounted".into()));
        }
        let mut dispatcher = Dispatcher::new();
        self.inner.root.mount(&mut dispatcher, &self.inner.events)?;
        self.inner
            .dispatcher
            .set(Arc::new(dispatcher))
            .map_err(|_| RoutingError::State("router is already mounted".into()))?;
        info!(
            routes = self.inner.registry.len(),
            mount_path = %self.inner.options.mount_path,
            "router mounted"
        );
        Ok(())
    }

    /// Returns the middleware serving this tree, mounting it first if
    /// needed.
    pub fn middleware(&self) -> Result<RouterMiddleware> {
        if !self.is_mounted() {
            self.mount()?;
        }
        let dispatcher = self
            .inner
            .dispatcher
            .get()
            .cloned()
            .ok_or_else(|| RoutingError::State("router is not mounted".into()))?;
        Ok(RouterMiddleware {
            router: self.clone(),
            dispatcher,
        })
    }

    /// Dispatches a standalone request through the tree and renders the
    /// outcome, like [`oxide_router::Router::dispatch`].
    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        let mut app = Dispatcher::new();
        app.use_middleware(Arc::new(self.middleware()?));
        Ok(app.dispatch(request).await)
    }
}

impl std::fmt::Debug for NamedRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedRouter")
            .field("options", &self.inner.options)
            .field("routes", &self.inner.registry)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

/// Middleware that runs requests through a mounted [`NamedRouter`].
///
/// Installs the request's routing context and the response's
/// current-request slot when they are absent.
pub struct RouterMiddleware {
    router: NamedRouter,
    dispatcher: Arc<Dispatcher>,
}

impl Middleware for RouterMiddleware {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, oxide_router::Result<Flow>> {
        Box::pin(async move {
            if req.extensions.get::<RouteContext>().is_none() {
                req.extensions.insert(RouteContext::new(self.router.clone()));
            }
            if res.extensions.get::<ActiveRequest>().is_none() {
                res.extensions.insert(ActiveRequest(RequestLink::of(req)));
            }
            trace!(method = %req.method, path = %req.path, "dispatching through route tree");
            self.dispatcher.handle(req, res).await
        })
    }
}
