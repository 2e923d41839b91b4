//! Action routes: leaves bound to controller handlers.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use indexmap::IndexMap;
use oxide_router::{BoxFuture, Flow, Handler, Method, Request, Response, Router as Dispatcher};
use tracing::{debug, trace};

use crate::context;
use crate::controller::{ActionBinding, Controller, Verb};
use crate::error::{Result, RoutingError};
use crate::events::{EventBus, RouterEvent};
use crate::node::{NodeKind, RouteNode};
use crate::pattern::ParsedPattern;

/// The action part of a [`RouteNode`].
pub struct ActionRoute {
    controller: Arc<Controller>,
    method: Option<String>,
    handlers: IndexMap<Verb, Arc<dyn Handler>>,
}

impl ActionRoute {
    fn bind(route: &str, controller: Arc<Controller>, binding: ActionBinding) -> Result<Self> {
        match binding {
            ActionBinding::Single { method, verbs } => {
                let handler = controller.get(&method).ok_or_else(|| {
                    RoutingError::Config(format!(
                        "route '{route}': controller '{}' has no action '{method}'",
                        controller.id()
                    ))
                })?;
                if verbs.is_empty() {
                    return Err(RoutingError::Config(format!(
                        "route '{route}' declares no methods"
                    )));
                }
                let handlers = verbs
                    .into_iter()
                    .map(|verb| (verb, Arc::clone(&handler)))
                    .collect();
                Ok(Self {
                    controller,
                    method: Some(method),
                    handlers,
                })
            }
            ActionBinding::VerbStyle => {
                let handlers = controller.verb_actions();
                if handlers.is_empty() {
                    return Err(RoutingError::Config(format!(
                        "route '{route}': controller '{}' has no verb actions",
                        controller.id()
                    )));
                }
                Ok(Self {
                    controller,
                    method: None,
                    handlers,
                })
            }
        }
    }

    /// Returns the controller.
    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Returns the bound action name; `None` for verb-style actions.
    pub fn method_name(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Returns whether each verb maps to its own controller action.
    pub fn is_verb_style(&self) -> bool {
        self.method.is_none()
    }

    /// Returns the declared verbs in order.
    pub fn verbs(&self) -> Vec<Verb> {
        self.handlers.keys().copied().collect()
    }

    /// Returns whether a request with `method` can be handled.
    pub fn handles_method(&self, method: Method) -> bool {
        self.handlers.keys().any(|verb| verb.matches(method))
    }

    /// Picks the handler for `method`. A single declared handler serves
    /// every method.
    pub fn handler_for(&self, method: Method) -> Option<Arc<dyn Handler>> {
        if self.handlers.len() == 1 {
            return self.handlers.values().next().cloned();
        }
        self.handlers
            .get(&Verb::Method(method))
            .or_else(|| self.handlers.get(&Verb::All))
            .cloned()
    }

    /// Comma-separated verb list, for diagnostics.
    pub fn describe_verbs(&self) -> String {
        self.handlers
            .keys()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl RouteNode {
    /// Creates an action bound to `controller`.
    pub fn action(
        name: impl Into<String>,
        pattern: ParsedPattern,
        controller: Arc<Controller>,
        binding: ActionBinding,
    ) -> Result<Self> {
        let name = name.into();
        let action = ActionRoute::bind(&name, controller, binding)?;
        Ok(Self::with_kind(name, pattern, NodeKind::Action(action)))
    }

    /// Returns whether this action can handle `method`. Segments handle
    /// nothing.
    pub fn handles_method(&self, method: Method) -> bool {
        self.as_action().is_some_and(|a| a.handles_method(method))
    }

    pub(crate) fn mount_action(
        self: &Arc<Self>,
        action: &ActionRoute,
        router: &mut Dispatcher,
        events: &EventBus,
    ) -> Result<()> {
        let source = self.pattern().source();
        if self.has_own_layers() {
            let mut sub = Dispatcher::new();
            self.install_layers(&mut sub)?;
            for (verb, handler) in &action.handlers {
                sub.route(verb.method(), "/", self.endpoint(handler))?;
            }
            let mount = router.mount(source, sub)?;
            self.set_mount_point(mount)?;
        } else {
            for (verb, handler) in &action.handlers {
                router.route(verb.method(), source, self.endpoint(handler))?;
            }
        }
        self.mark_mounted();
        debug!(
            route = %self.name(),
            pattern = %source,
            verbs = %action.describe_verbs(),
            "mounted action"
        );
        events.emit(&RouterEvent::Mounted(self));
        Ok(())
    }

    fn endpoint(self: &Arc<Self>, handler: &Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(ActionEndpoint {
            node: Arc::downgrade(self),
            handler: Arc::clone(handler),
        })
    }

    pub(crate) async fn invoke_direct(
        self: &Arc<Self>,
        action: &ActionRoute,
        req: &mut Request,
        res: &mut Response,
    ) -> oxide_router::Result<Flow> {
        let handler = action.handler_for(req.method).ok_or_else(|| RoutingError::VerbMismatch {
            route: self.name().to_string(),
            method: req.method.to_string(),
            declared: action.describe_verbs(),
        })?;
        self.run_handler(&handler, req, res).await?;
        Ok(Flow::Handled)
    }

    /// Prepares the request's parameters and calls `handler`.
    async fn run_handler(
        self: &Arc<Self>,
        handler: &Arc<dyn Handler>,
        req: &mut Request,
        res: &mut Response,
    ) -> oxide_router::Result<()> {
        context::mark_current(req, self);
        self.prepare_params(req)?;

        if let Some(router) = context::router_of(req) {
            router.events().emit(&RouterEvent::Request {
                route: self,
                request: req,
            });
        }
        trace!(route = %self.name(), method = %req.method, path = %req.path, "invoking action");
        tokio::task::yield_now().await;

        match AssertUnwindSafe(handler.call(req, res)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(RoutingError::HandlerPanicked {
                route: self.name().to_string(),
                message: panic_message(payload.as_ref()),
            }
            .into()),
        }
    }

    /// Applies defaults and requirements of every pattern from the root
    /// down to this action, then injects extra parameters.
    pub(crate) fn prepare_params(self: &Arc<Self>, req: &mut Request) -> Result<()> {
        for node in self.lineage() {
            let pattern = node.pattern();
            for (name, spec) in pattern.param_data() {
                let value = match req.params.get(name) {
                    Some(value) => value.to_string(),
                    None => match &spec.default {
                        Some(default) => default.clone(),
                        None if spec.optional => continue,
                        None => {
                            return Err(RoutingError::InvalidParameter {
                                route: self.name().to_string(),
                                param: name.clone(),
                                reason: "is required but missing".into(),
                            });
                        }
                    },
                };
                if !spec.accepts(&value) {
                    return Err(RoutingError::InvalidParameter {
                        route: self.name().to_string(),
                        param: name.clone(),
                        reason: format!("value '{value}' does not satisfy its requirement"),
                    });
                }
                if !req.params.contains(name) {
                    req.params.insert(name.clone(), value);
                }
            }
            for (name, value) in pattern.extra_params() {
                if !req.params.contains(name) {
                    req.params.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(())
    }
}

/// Dispatch-layer handler for one verb of an action.
struct ActionEndpoint {
    node: Weak<RouteNode>,
    handler: Arc<dyn Handler>,
}

impl Handler for ActionEndpoint {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, oxide_router::Result<()>> {
        Box::pin(async move {
            let node = self.node.upgrade().ok_or_else(|| {
                RoutingError::State("route was dropped while still mounted".into())
            })?;
            node.run_handler(&self.handler, req, res).await
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use oxide_router::{handler_fn, PathParams};

    use super::*;
    use crate::pattern::ParseOptions;

    fn controller() -> Arc<Controller> {
        let ok = |label: &'static str| {
            handler_fn(move |_req, res| {
                Box::pin(async move {
                    res.send_text(label);
                    Ok(())
                })
            })
        };
        Arc::new(
            Controller::new("items")
                .action("get", ok("get"))
                .action("post", ok("post"))
                .action("show", ok("show")),
        )
    }

    #[test]
    fn test_single_binding() {
        let node = RouteNode::action(
            "show",
            ParsedPattern::parse("/:id").unwrap(),
            controller(),
            ActionBinding::Single {
                method: "show".into(),
                verbs: vec![Verb::Method(Method::Get), Verb::Method(Method::Head)],
            },
        )
        .unwrap();
        let action = node.as_action().unwrap();
        assert!(!action.is_verb_style());
        assert!(action.handles_method(Method::Head));
        assert!(!action.handles_method(Method::Post));
    }

    #[test]
    fn test_missing_action_is_config_error() {
        let result = RouteNode::action(
            "nope",
            ParsedPattern::parse("/").unwrap(),
            controller(),
            ActionBinding::Single {
                method: "destroy".into(),
                verbs: vec![Verb::Method(Method::Delete)],
            },
        );
        assert!(matches!(result, Err(RoutingError::Config(_))));
    }

    #[test]
    fn test_verb_style_binding() {
        let node =
            RouteNode::action("items", ParsedPattern::parse("/").unwrap(), controller(), ActionBinding::VerbStyle)
                .unwrap();
        let action = node.as_action().unwrap();
        assert!(action.is_verb_style());
        assert_eq!(
            action.verbs(),
            vec![Verb::Method(Method::Get), Verb::Method(Method::Post)]
        );
        assert!(action.handler_for(Method::Put).is_none());
    }

    #[test]
    fn test_prepare_params_applies_defaults_and_requirements() {
        let mut requirements = IndexMap::new();
        requirements.insert("page".to_string(), r"\d+".to_string());
        let mut defaults = IndexMap::new();
        defaults.insert("page".to_string(), "1".to_string());
        defaults.insert("format".to_string(), "html".to_string());
        let pattern =
            ParsedPattern::parse_with("/list/:page?", &requirements, &defaults, ParseOptions::default())
                .unwrap();
        let node = Arc::new(
            RouteNode::action(
                "list",
                pattern,
                controller(),
                ActionBinding::Single {
                    method: "show".into(),
                    verbs: vec![Verb::Method(Method::Get)],
                },
            )
            .unwrap(),
        );

        let mut req = Request::get("/list");
        node.prepare_params(&mut req).unwrap();
        assert_eq!(req.params.get("page"), Some("1"));
        assert_eq!(req.params.get("format"), Some("html"));

        let mut req = Request::get("/list/abc");
        req.params = [("page", "abc")].into_iter().collect::<PathParams>();
        assert!(matches!(
            node.prepare_params(&mut req),
            Err(RoutingError::InvalidParameter { ref param, .. }) if param == "page"
        ));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
