//! Route pattern parsing and path rendering.
//!
//! A route pattern is the `/`-separated path declared for a node, e.g.
//! `/users/:id/posts/:slug?`. Parameters named here are *managed*: they get
//! defaults and validators from the route's `defaults` and `requirements`
//! and are checked both when a request matches and when a path is
//! generated. Segments using the dispatch layer's richer syntax
//! (`:id(\d+)`, `:rest*`, `*`) are passed to the matcher untouched; only
//! their values are encoded when a path is rendered.

use indexmap::IndexMap;
use oxide_router::PathParams;
use regex::Regex;
use tracing::warn;

use crate::error::{Result, RoutingError};

/// Characters that mark a parameter as dispatch-layer syntax.
const NATIVE_MARKERS: [char; 5] = ['?', '*', '+', '(', ')'];

/// A managed parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Whether the segment may be omitted.
    pub optional: bool,
    /// Value used when the parameter is not supplied.
    pub default: Option<String>,
    /// Whole-value validator compiled from the route's requirements.
    pub validator: Option<Regex>,
}

impl ParamSpec {
    /// Returns whether `value` satisfies the validator, if any.
    pub fn accepts(&self, value: &str) -> bool {
        self.validator.as_ref().map_or(true, |re| re.is_match(value))
    }
}

/// One segment of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Static(String),
    /// A managed parameter, by name.
    Param(String),
    /// Dispatch-layer syntax, kept verbatim.
    Native(String),
}

/// Why a parameter could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Mandatory parameter without a value.
    Missing(String),
    /// Value rejected by the validator.
    Invalid {
        /// Parameter name.
        param: String,
        /// Rejected value.
        value: String,
    },
    /// A value for a parameter placed after an omitted optional one. The
    /// rendered path would match with the value in the omitted slot.
    AfterOmitted {
        /// Parameter name.
        param: String,
        /// The optional parameter that was left out.
        omitted: String,
    },
}

/// The result of parsing a route pattern.
#[derive(Debug, Clone)]
pub struct ParsedPattern {
    source: String,
    segments: Vec<Segment>,
    params: IndexMap<String, ParamSpec>,
    extra: IndexMap<String, String>,
}

/// Options for [`ParsedPattern::parse_with`].
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Fail (instead of warning) when a requirement names no parameter.
    pub strict_requirements: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_requirements: true,
        }
    }
}

impl ParsedPattern {
    /// Parses a pattern without defaults or requirements.
    pub fn parse(pattern: &str) -> Result<Self> {
        Self::parse_with(
            pattern,
            &IndexMap::new(),
            &IndexMap::new(),
            ParseOptions::default(),
        )
    }

    /// Parses a pattern, attaching defaults and requirements to its
    /// parameters.
    ///
    /// Defaults naming no path parameter become extra parameters that are
    /// injected into every match. A requirement naming no path parameter is
    /// an error, or a warning when `strict_requirements` is off.
    pub fn parse_with(
        pattern: &str,
        requirements: &IndexMap<String, String>,
        defaults: &IndexMap<String, String>,
        options: ParseOptions,
    ) -> Result<Self> {
        let mut segments = Vec::new();
        let mut params = IndexMap::new();

        for part in pattern.split('/').filter(|s| !s.is_empty()) {
            let Some(spec) = part.strip_prefix(':') else {
                if part.contains(NATIVE_MARKERS) {
                    segments.push(Segment::Native(part.to_string()));
                } else {
                    segments.push(Segment::Static(part.to_string()));
                }
                continue;
            };

            let (name, optional) = match spec.strip_suffix('?') {
                Some(name) => (name, true),
                None => (spec, false),
            };
            if name.is_empty() || name.contains(NATIVE_MARKERS) {
                segments.push(Segment::Native(part.to_string()));
                continue;
            }
            if params.contains_key(name) {
                return Err(RoutingError::Pattern {
                    pattern: pattern.to_string(),
                    message: format!("parameter '{name}' appears twice"),
                });
            }

            params.insert(
                name.to_string(),
                ParamSpec {
                    name: name.to_string(),
                    optional,
                    default: defaults.get(name).cloned(),
                    validator: None,
                },
            );
            segments.push(Segment::Param(name.to_string()));
        }

        for (name, requirement) in requirements {
            let Some(spec) = params.get_mut(name) else {
                if options.strict_requirements {
                    return Err(RoutingError::Pattern {
                        pattern: pattern.to_string(),
                        message: format!("requirement for unknown parameter '{name}'"),
                    });
                }
                warn!(pattern, param = %name, "ignoring requirement for unknown parameter");
                continue;
            };
            spec.validator = Some(compile_requirement(pattern, name, requirement)?);
        }

        let extra = defaults
            .iter()
            .filter(|(name, _)| !params.contains_key(*name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            source: pattern.to_string(),
            segments,
            params,
            extra,
        })
    }

    /// Returns the pattern as declared.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the managed parameter names in pattern order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Returns the managed parameters.
    pub fn param_data(&self) -> &IndexMap<String, ParamSpec> {
        &self.params
    }

    /// Returns a managed parameter.
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    /// Returns the optional parameter names.
    pub fn optional_params(&self) -> Vec<&str> {
        self.params
            .values()
            .filter(|p| p.optional)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Returns the mandatory parameter names.
    pub fn mandatory_params(&self) -> Vec<&str> {
        self.params
            .values()
            .filter(|p| !p.optional)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Returns defaults that name no path parameter.
    pub fn extra_params(&self) -> &IndexMap<String, String> {
        &self.extra
    }

    /// Returns whether the pattern has no segments (`/`).
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Appends this pattern, with parameters substituted, to `out`.
    ///
    /// An optional parameter without a value is left out together with
    /// every parameter after it; `omitted` carries that state across the
    /// patterns of a route chain. A later parameter that does have a value
    /// is an error.
    pub fn render_into(
        &self,
        out: &mut String,
        params: &PathParams,
        validate: bool,
        omitted: &mut Option<String>,
    ) -> std::result::Result<(), RenderError> {
        for segment in &self.segments {
            match segment {
                Segment::Static(text) => {
                    out.push('/');
                    out.push_str(text);
                }
                Segment::Param(name) => {
                    let spec = &self.params[name.as_str()];
                    let value = params.get(name).or(spec.default.as_deref());
                    let Some(value) = value else {
                        if spec.optional {
                            omitted.get_or_insert_with(|| name.clone());
                            continue;
                        }
                        return Err(RenderError::Missing(name.clone()));
                    };
                    if let Some(omitted) = omitted {
                        return Err(RenderError::AfterOmitted {
                            param: name.clone(),
                            omitted: omitted.clone(),
                        });
                    }
                    if validate && !spec.accepts(value) {
                        return Err(RenderError::Invalid {
                            param: name.clone(),
                            value: value.to_string(),
                        });
                    }
                    out.push('/');
                    out.push_str(&urlencoding::encode(value));
                }
                Segment::Native(raw) => render_native(out, raw, params, omitted)?,
            }
        }
        Ok(())
    }
}

fn render_native(
    out: &mut String,
    raw: &str,
    params: &PathParams,
    omitted: &mut Option<String>,
) -> std::result::Result<(), RenderError> {
    let Some(spec) = raw.strip_prefix(':') else {
        out.push('/');
        out.push_str(raw);
        return Ok(());
    };
    let name: String = spec
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    let repeated = raw.ends_with('*') || raw.ends_with('+');
    match params.get(&name) {
        Some(value) => {
            if let Some(omitted) = omitted {
                return Err(RenderError::AfterOmitted {
                    param: name,
                    omitted: omitted.clone(),
                });
            }
            out.push('/');
            if repeated {
                let encoded: Vec<_> = value.split('/').map(urlencoding::encode).collect();
                out.push_str(&encoded.join("/"));
            } else {
                out.push_str(&urlencoding::encode(value));
            }
            Ok(())
        }
        None if raw.ends_with('?') || raw.ends_with('*') => {
            omitted.get_or_insert(name);
            Ok(())
        }
        None => Err(RenderError::Missing(name)),
    }
}

fn compile_requirement(pattern: &str, name: &str, requirement: &str) -> Result<Regex> {
    let body = requirement
        .strip_prefix('/')
        .and_then(|r| r.strip_suffix('/'))
        .filter(|r| !r.is_empty())
        .unwrap_or(requirement);
    Regex::new(&format!("^(?:{body})$")).map_err(|e| RoutingError::Pattern {
        pattern: pattern.to_string(),
        message: format!("requirement for '{name}' is not a valid expression: {e}"),
    })
}
