//! Controllers and their resolution.
//!
//! A controller is a named set of actions. Routes refer to controllers by
//! id, either as `"id.action"` (one action bound to a verb list) or as a
//! bare `"id"` (verb-style: every action named after an HTTP verb, or
//! `all`, handles that verb).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use oxide_router::{Handler, Method};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, RoutingError};

/// A verb an action can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Every method.
    All,
    /// One method.
    Method(Method),
}

impl Verb {
    /// Returns whether a request with `method` is handled by this verb.
    pub fn matches(self, method: Method) -> bool {
        match self {
            Self::All => true,
            Self::Method(m) => m == method,
        }
    }

    /// The method filter the dispatch layer understands.
    pub fn method(self) -> Option<Method> {
        match self {
            Self::All => None,
            Self::Method(m) => Some(m),
        }
    }
}

impl FromStr for Verb {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<Method>()
            .map(Self::Method)
            .map_err(|e| RoutingError::Config(e.to_string()))
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Method(m) => f.write_str(&m.as_str().to_lowercase()),
        }
    }
}

/// A named set of actions.
#[derive(Clone)]
pub struct Controller {
    id: String,
    actions: IndexMap<String, Arc<dyn Handler>>,
}

impl Controller {
    /// Creates an empty controller.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            actions: IndexMap::new(),
        }
    }

    /// Adds an action.
    #[must_use]
    pub fn action(mut self, name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.actions.insert(name.into(), Arc::new(handler));
        self
    }

    /// Returns the controller id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Looks up an action by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.actions.get(name).cloned()
    }

    /// Returns the action names in declaration order.
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Returns the verb-style actions: those named after a verb or `all`,
    /// keyed by verb, in declaration order.
    pub fn verb_actions(&self) -> IndexMap<Verb, Arc<dyn Handler>> {
        self.actions
            .iter()
            .filter(|(name, _)| name.chars().all(|c| c.is_ascii_lowercase()))
            .filter_map(|(name, handler)| {
                name.parse::<Verb>()
                    .ok()
                    .map(|verb| (verb, Arc::clone(handler)))
            })
            .collect()
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.id)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// How an action node is bound to its controller.
#[derive(Clone)]
pub enum ActionBinding {
    /// One controller action for the listed verbs.
    Single {
        /// Action name on the controller.
        method: String,
        /// Verbs it answers.
        verbs: Vec<Verb>,
    },
    /// One controller action per verb.
    VerbStyle,
}

/// A parsed `controller` reference from route configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerRef {
    /// Controller id (may contain `/`).
    pub id: String,
    /// Action name, absent for verb-style references.
    pub action: Option<String>,
}

impl ControllerRef {
    /// Parses `"id.action"` or `"id"`.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(RoutingError::Config("empty controller reference".into()));
        }
        match reference.rsplit_once('.') {
            Some((id, action)) if !id.is_empty() && !action.is_empty() => Ok(Self {
                id: id.to_string(),
                action: Some(action.to_string()),
            }),
            Some(_) => Err(RoutingError::Config(format!(
                "malformed controller reference '{reference}'"
            ))),
            None => Ok(Self {
                id: reference.to_string(),
                action: None,
            }),
        }
    }
}

type Constructor = Arc<dyn Fn() -> Controller + Send + Sync>;

/// Resolves controller ids to live controllers.
///
/// Ids are resolved relative to a prefix (`.` and `..` components are
/// normalized), instantiated on first use from a registered constructor and
/// cached under the resolved id.
pub struct ControllerFactory {
    prefix: String,
    constructors: RwLock<HashMap<String, Constructor>>,
    cache: RwLock<HashMap<String, Arc<Controller>>>,
}

impl ControllerFactory {
    /// Creates a factory resolving ids under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            constructors: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a constructor for `id`.
    pub fn register(&self, id: &str, constructor: impl Fn() -> Controller + Send + Sync + 'static) {
        let key = self.resolve_id(id);
        self.cache.write().remove(&key);
        self.constructors.write().insert(key, Arc::new(constructor));
    }

    /// Registers a ready-made controller under its own id.
    pub fn register_instance(&self, controller: Controller) {
        let key = self.resolve_id(controller.id());
        self.cache.write().insert(key, Arc::new(controller));
    }

    /// Returns the controller for `id`, instantiating it on first use.
    pub fn resolve(&self, id: &str) -> Result<Arc<Controller>> {
        let key = self.resolve_id(id);
        if let Some(controller) = self.cache.read().get(&key) {
            return Ok(Arc::clone(controller));
        }

        let constructor = self
            .constructors
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| RoutingError::Config(format!("unknown controller '{id}' ({key})")))?;

        let mut cache = self.cache.write();
        let controller = cache
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(controller = %key, "instantiating controller");
                Arc::new(constructor())
            })
            .clone();
        Ok(controller)
    }

    /// Normalizes `id` against the prefix.
    pub fn resolve_id(&self, id: &str) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let joined = if id.starts_with('/') {
            id.to_string()
        } else {
            format!("{}/{id}", self.prefix)
        };
        for part in joined.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }
        parts.join("/")
    }
}

impl fmt::Debug for ControllerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerFactory")
            .field("prefix", &self.prefix)
            .field("cached", &self.cache.read().len())
            .finish()
    }
}
