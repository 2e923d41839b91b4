//! Router options and route table declarations.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, RoutingError};

/// Routes by name, in match order.
pub type RouteTable = IndexMap<String, RouteConfig>;

/// Parses a YAML route table. An empty document is an empty table.
pub fn parse_route_table(yaml: &str) -> std::result::Result<RouteTable, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(RouteTable::new());
    }
    let table: Option<RouteTable> = serde_yaml::from_str(yaml)?;
    Ok(table.unwrap_or_default())
}

/// Parses a YAML route table read from `source`.
///
/// Unlike [`parse_route_table`], a name declared twice in the same mapping
/// is a [`RoutingError::Config`] instead of the later entry replacing the
/// earlier one.
pub fn load_route_table(yaml: &str, source: &Path) -> Result<RouteTable> {
    let parse_error = |e: serde_yaml::Error| RoutingError::Parse {
        path: source.to_path_buf(),
        message: e.to_string(),
    };
    let table = parse_route_table(yaml).map_err(parse_error)?;
    if table.is_empty() {
        return Ok(table);
    }
    let outline: NameOutline = serde_yaml::from_str(yaml).map_err(parse_error)?;
    if let Some(name) = outline.find_duplicate() {
        return Err(RoutingError::Config(format!(
            "route name '{name}' is declared twice in '{}'",
            source.display()
        )));
    }
    Ok(table)
}

/// Entry names of a route table as written, repeated names included.
struct NameOutline(Vec<(String, Option<NameOutline>)>);

impl NameOutline {
    fn find_duplicate(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        for (name, children) in &self.0 {
            if !seen.insert(name.as_str()) {
                return Some(name);
            }
            if let Some(name) = children.as_ref().and_then(Self::find_duplicate) {
                return Some(name);
            }
        }
        None
    }
}

#[derive(Deserialize)]
struct OutlineEntry {
    #[serde(default)]
    routes: Option<NameOutline>,
}

impl<'de> Deserialize<'de> for NameOutline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OutlineVisitor;

        impl<'de> Visitor<'de> for OutlineVisitor {
            type Value = NameOutline;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a route table")
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<NameOutline, E> {
                Ok(NameOutline(Vec::new()))
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<NameOutline, A::Error> {
                let mut entries = Vec::new();
                while let Some((name, entry)) = map.next_entry::<String, OutlineEntry>()? {
                    entries.push((name, entry.routes));
                }
                Ok(NameOutline(entries))
            }
        }

        deserializer.deserialize_any(OutlineVisitor)
    }
}

/// One entry of a route table.
///
/// ```yaml
/// users:
///   pattern: /users
///   controller: users.index
///   routes:
///     show:
///       pattern: /:id
///       controller: users.show
///       requirements:
///         id: \d+
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Path pattern relative to the parent.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// `"controller.action"` or a verb-style `"controller"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    /// Verbs for a single-action controller.
    #[serde(default, alias = "method", skip_serializing_if = "Option::is_none")]
    pub methods: Option<Methods>,
    /// Parameter defaults.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub defaults: IndexMap<String, DefaultValue>,
    /// Parameter requirements (regular expressions).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub requirements: IndexMap<String, String>,
    /// Inline children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<RouteTable>,
    /// Route file holding further children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Free-form data for event listeners.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_pattern() -> String {
    "/".to_string()
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            controller: None,
            methods: None,
            defaults: IndexMap::new(),
            requirements: IndexMap::new(),
            routes: None,
            resource: None,
            metadata: serde_json::Map::new(),
        }
    }
}

impl RouteConfig {
    /// An action entry bound to `controller`.
    pub fn action(pattern: impl Into<String>, controller: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            controller: Some(controller.into()),
            ..Self::default()
        }
    }

    /// A segment entry with no children yet.
    pub fn segment(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            routes: Some(RouteTable::new()),
            ..Self::default()
        }
    }

    /// Sets the verbs.
    #[must_use]
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = Some(Methods::Many(methods.into_iter().map(Into::into).collect()));
        self
    }

    /// Adds a default.
    #[must_use]
    pub fn default_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults
            .insert(name.into(), DefaultValue::String(value.into()));
        self
    }

    /// Adds a requirement.
    #[must_use]
    pub fn requirement(mut self, name: impl Into<String>, regex: impl Into<String>) -> Self {
        self.requirements.insert(name.into(), regex.into());
        self
    }

    /// Adds an inline child.
    #[must_use]
    pub fn route(mut self, name: impl Into<String>, config: Self) -> Self {
        self.routes
            .get_or_insert_with(RouteTable::new)
            .insert(name.into(), config);
        self
    }

    /// Sets the route file holding further children.
    #[must_use]
    pub fn resource(mut self, path: impl Into<String>) -> Self {
        self.resource = Some(path.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns whether the entry has children (inline or from a file).
    pub fn has_children(&self) -> bool {
        self.routes.is_some() || self.resource.is_some()
    }

    /// Returns the declared verbs, `["get"]` when none are declared.
    pub fn method_list(&self) -> Vec<String> {
        match &self.methods {
            Some(methods) => methods.to_vec(),
            None => vec!["get".to_string()],
        }
    }

    /// Returns the defaults as strings.
    pub fn default_strings(&self) -> IndexMap<String, String> {
        self.defaults
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

/// `methods: get` or `methods: [get, post]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Methods {
    /// A single verb.
    One(String),
    /// Several verbs.
    Many(Vec<String>),
}

impl Methods {
    /// Returns the verbs as a list.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(m) => vec![m.clone()],
            Self::Many(ms) => ms.clone(),
        }
    }
}

/// A scalar default value. Non-scalar defaults are rejected when the table
/// is parsed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    String(String),
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Router-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterOptions {
    /// Pattern of the root node.
    pub mount_path: String,
    /// Directory route files and inline `resource` entries resolve against.
    pub base_path: PathBuf,
    /// Prefix controller ids resolve against.
    pub controller_prefix: String,
    /// Check requirements when generating paths.
    pub validate_generated_paths: bool,
    /// Fail on requirements that name no path parameter.
    pub strict_requirements: bool,
    /// Maximum forwarding depth from an original request.
    pub max_forward_depth: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            mount_path: "/".to_string(),
            base_path: PathBuf::from("."),
            controller_prefix: String::new(),
            validate_generated_paths: true,
            strict_requirements: true,
            max_forward_depth: 16,
        }
    }
}

impl RouterOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from YAML. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
            .map_err(|e| RoutingError::Config(format!("invalid router options: {e}")))
    }

    /// Sets the root pattern.
    #[must_use]
    pub fn mount_path(mut self, path: impl Into<String>) -> Self {
        self.mount_path = path.into();
        self
    }

    /// Sets the resource directory.
    #[must_use]
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Sets the controller prefix.
    #[must_use]
    pub fn controller_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.controller_prefix = prefix.into();
        self
    }

    /// Toggles requirement checks during path generation.
    #[must_use]
    pub fn validate_generated_paths(mut self, validate: bool) -> Self {
        self.validate_generated_paths = validate;
        self
    }

    /// Toggles strict requirement handling.
    #[must_use]
    pub fn strict_requirements(mut self, strict: bool) -> Self {
        self.strict_requirements = strict;
        self
    }

    /// Sets the forwarding depth limit.
    #[must_use]
    pub fn max_forward_depth(mut self, depth: usize) -> Self {
        self.max_forward_depth = depth;
        self
    }
}
