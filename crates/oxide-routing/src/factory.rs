//! Builds route trees from declarations.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::config::{load_route_table, RouteConfig, RouteTable, RouterOptions};
use crate::controller::{ActionBinding, ControllerFactory, ControllerRef, Verb};
use crate::error::{Result, RoutingError};
use crate::events::{EventBus, RouterEvent};
use crate::node::RouteNode;
use crate::pattern::{ParseOptions, ParsedPattern};
use crate::registry::RouteRegistry;

/// Marks internal route names. Not allowed in declared names.
pub const RESERVED_NAME_CHAR: char = '#';

/// Routes created by one call, by name, in declaration order.
pub type CreatedRoutes = IndexMap<String, Arc<RouteNode>>;

/// Turns route tables into nodes attached to a tree.
pub struct RouteFactory<'a> {
    registry: &'a RouteRegistry,
    controllers: &'a ControllerFactory,
    events: &'a EventBus,
    options: &'a RouterOptions,
}

impl<'a> RouteFactory<'a> {
    /// Creates a factory registering into `registry`.
    pub fn new(
        registry: &'a RouteRegistry,
        controllers: &'a ControllerFactory,
        events: &'a EventBus,
        options: &'a RouterOptions,
    ) -> Self {
        Self {
            registry,
            controllers,
            events,
            options,
        }
    }

    /// Builds every entry of `table` under `parent`. `resource` entries
    /// resolve against `base_path`.
    ///
    /// On error nothing built by the call stays registered or attached.
    pub fn create_routes_from_config(
        &self,
        table: &RouteTable,
        parent: &Arc<RouteNode>,
        base_path: &Path,
    ) -> Result<CreatedRoutes> {
        self.all_or_nothing(parent, || self.build_table(table, parent, base_path))
    }

    /// Reads a YAML route file and builds its entries under `parent`.
    /// Nested `resource` entries resolve against the file's directory.
    ///
    /// On error nothing built by the call stays registered or attached.
    pub fn create_routes_from_resource(
        &self,
        path: &Path,
        parent: &Arc<RouteNode>,
    ) -> Result<CreatedRoutes> {
        self.all_or_nothing(parent, || self.build_resource(path, parent))
    }

    /// Runs `build`, dropping the registrations and children it added to
    /// `parent` when it fails. Registration order is append-only, so
    /// truncating to the earlier length undoes exactly this call.
    fn all_or_nothing(
        &self,
        parent: &Arc<RouteNode>,
        build: impl FnOnce() -> Result<CreatedRoutes>,
    ) -> Result<CreatedRoutes> {
        let registered = self.registry.len();
        let children = parent.children().len();
        match build() {
            Ok(created) => Ok(created),
            Err(e) => {
                let discarded = self.registry.truncate(registered);
                parent.truncate_children(children);
                warn!(route = %parent.name(), discarded, error = %e, "discarded partially built routes");
                Err(e)
            }
        }
    }

    fn build_table(
        &self,
        table: &RouteTable,
        parent: &Arc<RouteNode>,
        base_path: &Path,
    ) -> Result<CreatedRoutes> {
        let mut created = CreatedRoutes::new();
        for (name, config) in table {
            let node = self.create_route(name, config, parent, base_path)?;
            created.insert(name.clone(), node);
        }
        Ok(created)
    }

    fn build_resource(&self, path: &Path, parent: &Arc<RouteNode>) -> Result<CreatedRoutes> {
        let text = fs::read_to_string(path).map_err(|source| RoutingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = load_route_table(&text, path)?;
        info!(path = %path.display(), routes = table.len(), "loaded route file");
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        self.build_table(&table, parent, base)
    }

    fn create_route(
        &self,
        name: &str,
        config: &RouteConfig,
        parent: &Arc<RouteNode>,
        base_path: &Path,
    ) -> Result<Arc<RouteNode>> {
        validate_name(name)?;
        if config.controller.is_none() && !config.has_children() {
            return Err(RoutingError::Config(format!(
                "route '{name}' declares none of controller, routes or resource"
            )));
        }
        if self.registry.contains(name) {
            return Err(RoutingError::Config(format!(
                "route name '{name}' is already registered"
            )));
        }

        let pattern = self.parse_pattern(name, config)?;
        if !config.has_children() {
            let node = self.build_action(name, pattern, config)?;
            let node = Arc::new(node.with_metadata(config.metadata.clone()));
            self.attach(&node, parent)?;
            return Ok(node);
        }

        let segment = Arc::new(RouteNode::segment(name, pattern).with_metadata(config.metadata.clone()));
        segment.set_parent_route(parent)?;
        self.register(&segment)?;

        if config.controller.is_some() {
            let index_name = format!("{name}{RESERVED_NAME_CHAR}index");
            let index = Arc::new(self.build_action(&index_name, ParsedPattern::parse("/")?, config)?);
            index.set_parent_route(&segment)?;
            self.register(&index)?;
            segment.set_index_action(Arc::clone(&index))?;
            self.events.emit(&RouterEvent::RouteAdded {
                node: &index,
                parent: &segment,
            });
        }
        if let Some(routes) = &config.routes {
            self.build_table(routes, &segment, base_path)?;
        }
        if let Some(resource) = &config.resource {
            self.build_resource(&base_path.join(resource), &segment)?;
        }

        parent.add_sub_route(Arc::clone(&segment))?;
        self.events.emit(&RouterEvent::RouteAdded {
            node: &segment,
            parent,
        });
        Ok(segment)
    }

    fn parse_pattern(&self, name: &str, config: &RouteConfig) -> Result<ParsedPattern> {
        let options = ParseOptions {
            strict_requirements: self.options.strict_requirements,
        };
        ParsedPattern::parse_with(
            &config.pattern,
            &config.requirements,
            &config.default_strings(),
            options,
        )
        .map_err(|e| match e {
            RoutingError::Pattern { pattern, message } => RoutingError::Pattern {
                pattern,
                message: format!("{message} (route '{name}')"),
            },
            other => other,
        })
    }

    fn build_action(&self, name: &str, pattern: ParsedPattern, config: &RouteConfig) -> Result<RouteNode> {
        let reference = config.controller.as_deref().ok_or_else(|| {
            RoutingError::Config(format!("route '{name}' has no controller"))
        })?;
        let reference = ControllerRef::parse(reference)?;
        let controller = self.controllers.resolve(&reference.id)?;
        let binding = match reference.action {
            Some(method) => ActionBinding::Single {
                method,
                verbs: config
                    .method_list()
                    .iter()
                    .map(|m| m.parse::<Verb>())
                    .collect::<Result<Vec<_>>>()?,
            },
            None => {
                if config.methods.is_some() {
                    debug!(route = %name, "ignoring methods on verb-style controller");
                }
                ActionBinding::VerbStyle
            }
        };
        RouteNode::action(name, pattern, controller, binding)
    }

    fn attach(&self, node: &Arc<RouteNode>, parent: &Arc<RouteNode>) -> Result<()> {
        node.set_parent_route(parent)?;
        self.register(node)?;
        parent.add_sub_route(Arc::clone(node))?;
        self.events.emit(&RouterEvent::RouteAdded { node, parent });
        Ok(())
    }

    fn register(&self, node: &Arc<RouteNode>) -> Result<()> {
        self.registry
            .insert(node)
            .map_err(|e| RoutingError::Config(e.to_string()))?;
        debug!(route = %node.name(), pattern = %node.pattern().source(), "created route");
        self.events.emit(&RouterEvent::RouteCreated(node));
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RoutingError::Config("route names cannot be empty".into()));
    }
    if name.contains(RESERVED_NAME_CHAR) {
        return Err(RoutingError::Config(format!(
            "route name '{name}' contains the reserved character '{RESERVED_NAME_CHAR}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use oxide_router::handler_fn;

    use super::*;
    use crate::config::parse_route_table;
    use crate::controller::Controller;

    struct Fixture {
        registry: RouteRegistry,
        controllers: ControllerFactory,
        events: EventBus,
        options: RouterOptions,
        root: Arc<RouteNode>,
    }

    impl Fixture {
        fn new() -> Self {
            let controllers = ControllerFactory::new("");
            let ok = || handler_fn(|_req, _res| Box::pin(async move { Ok(()) }));
            controllers.register_instance(
                Controller::new("users")
                    .action("index", ok())
                    .action("show", ok()),
            );
            Self {
                registry: RouteRegistry::new(),
                controllers,
                events: EventBus::new(),
                options: RouterOptions::default(),
                root: Arc::new(RouteNode::root(ParsedPattern::parse("/").unwrap())),
            }
        }

        fn factory(&self) -> RouteFactory<'_> {
            RouteFactory::new(&self.registry, &self.controllers, &self.events, &self.options)
        }
    }

    #[test]
    fn test_segment_with_controller_gets_index() {
        let fixture = Fixture::new();
        let table = parse_route_table(
            "users:\n  pattern: /users\n  controller: users.index\n  routes:\n    show:\n      pattern: /:id\n      controller: users.show\n",
        )
        .unwrap();
        let created = fixture
            .factory()
            .create_routes_from_config(&table, &fixture.root, Path::new("."))
            .unwrap();

        let users = &created["users"];
        assert!(!users.is_actionable());
        let index = users.index_action().unwrap();
        assert_eq!(index.name(), "users#index");
        assert_eq!(
            users.children().iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            vec!["users#index", "show"]
        );
        assert_eq!(fixture.registry.names(), vec!["users", "users#index", "show"]);
    }

    #[test]
    fn test_rejections() {
        let fixture = Fixture::new();
        let factory = fixture.factory();
        let base = PathBuf::from(".");

        let table = parse_route_table("bad#name:\n  controller: users.index\n").unwrap();
        assert!(matches!(
            factory.create_routes_from_config(&table, &fixture.root, &base),
            Err(RoutingError::Config(_))
        ));

        let table = parse_route_table("empty:\n  pattern: /x\n").unwrap();
        assert!(matches!(
            factory.create_routes_from_config(&table, &fixture.root, &base),
            Err(RoutingError::Config(_))
        ));

        let table = parse_route_table("nope:\n  controller: missing.index\n").unwrap();
        assert!(matches!(
            factory.create_routes_from_config(&table, &fixture.root, &base),
            Err(RoutingError::Config(_))
        ));
    }

    #[test]
    fn test_missing_resource_is_io_error() {
        let fixture = Fixture::new();
        let err = fixture
            .factory()
            .create_routes_from_resource(Path::new("/definitely/not/here.yml"), &fixture.root)
            .unwrap_err();
        assert!(matches!(err, RoutingError::Io { .. }));
    }

    #[test]
    fn test_failed_build_is_rolled_back() {
        let fixture = Fixture::new();
        let factory = fixture.factory();
        let base = PathBuf::from(".");

        let table = parse_route_table("home:\n  controller: users.index\n").unwrap();
        factory
            .create_routes_from_config(&table, &fixture.root, &base)
            .unwrap();

        let table = parse_route_table(
            "first:\n  pattern: /first\n  controller: users.show\ngrp:\n  pattern: /grp\n  routes:\n    ok:\n      controller: users.index\n    bad:\n      controller: users.missing\n",
        )
        .unwrap();
        assert!(matches!(
            factory.create_routes_from_config(&table, &fixture.root, &base),
            Err(RoutingError::Config(_))
        ));
        assert_eq!(fixture.registry.names(), vec!["home"]);
        assert_eq!(
            fixture.root.children().iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            vec!["home"]
        );

        let table = parse_route_table("ok:\n  controller: users.index\n").unwrap();
        assert!(factory
            .create_routes_from_config(&table, &fixture.root, &base)
            .is_ok());
    }
}
