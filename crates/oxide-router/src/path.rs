//! Path pattern matching.

use std::borrow::Cow;

use regex::Regex;

use crate::error::{Result, RouterError};
use crate::request::PathParams;

/// A segment in a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A literal string segment.
    Literal(String),
    /// A parameter segment (e.g., `:id`, `:id?`, `:id(\d+)`).
    Param {
        /// Parameter name.
        name: String,
        /// Whether the segment may be absent.
        optional: bool,
        /// Inline expression the value must match.
        expr: Option<String>,
    },
    /// A wildcard segment (matches the remainder of the path).
    Wildcard(String),
}

/// A compiled path pattern for matching URLs.
///
/// Exact patterns must consume the whole path; prefix patterns (used for
/// mounted routers and middleware) match a leading run of whole segments.
#[derive(Debug, Clone)]
pub struct PathPattern {
    /// The original pattern string.
    pattern: String,
    /// Parsed segments.
    segments: Vec<PathSegment>,
    /// Compiled regex for matching.
    regex: Regex,
    /// Parameter names in capture order.
    param_names: Vec<String>,
    /// Whether the pattern must match the whole path.
    exact: bool,
}

/// A successful prefix or exact match.
#[derive(Debug, Clone, Default)]
pub struct PathMatch {
    /// Parameters captured by the pattern.
    pub params: PathParams,
    /// The portion of the path consumed by the pattern.
    pub matched: String,
    /// The unconsumed remainder, always starting with `/`.
    pub rest: String,
}

impl PathPattern {
    /// Parses a pattern that must match the whole path.
    ///
    /// Pattern syntax:
    /// - `/users` - Literal path
    /// - `/users/:id` - Path with parameter
    /// - `/users/:id?` - Optional parameter
    /// - `/users/:id(\d+)` - Parameter with an inline expression
    /// - `/files/:path*` or `/files/*` - Wildcard (rest of path)
    ///
    /// # Example
    ///
    /// ```
    /// use oxide_router::PathPattern;
    ///
    /// let pattern = PathPattern::exact("/posts/:id/comments/:comment_id").unwrap();
    /// let m = pattern.match_path("/posts/123/comments/456").unwrap();
    /// assert_eq!(m.params.get("id"), Some("123"));
    /// assert_eq!(m.params.get("comment_id"), Some("456"));
    /// ```
    pub fn exact(pattern: &str) -> Result<Self> {
        Self::compile(pattern, true)
    }

    /// Parses a pattern that matches a leading run of path segments.
    pub fn prefix(pattern: &str) -> Result<Self> {
        Self::compile(pattern, false)
    }

    fn compile(pattern: &str, exact: bool) -> Result<Self> {
        let mut segments = Vec::new();
        let mut param_names = Vec::new();
        let mut regex_str = String::from("^");

        for part in pattern.split('/').filter(|s| !s.is_empty()) {
            let segment = parse_segment(part);
            let group = format!("p{}", param_names.len());
            match &segment {
                PathSegment::Literal(s) => {
                    regex_str.push('/');
                    regex_str.push_str(&regex::escape(s));
                }
                PathSegment::Param {
                    name,
                    optional,
                    expr,
                } => {
                    let body = expr.as_deref().unwrap_or("[^/]+");
                    if *optional {
                        regex_str.push_str(&format!("(?:/(?P<{group}>{body}))?"));
                    } else {
                        regex_str.push_str(&format!("/(?P<{group}>{body})"));
                    }
                    param_names.push(name.clone());
                }
                PathSegment::Wildcard(name) => {
                    regex_str.push_str(&format!("(?:/(?P<{group}>.*))?"));
                    param_names.push(name.clone());
                }
            }
            segments.push(segment);
        }

        if exact {
            regex_str.push_str("/?$");
        }

        let regex = Regex::new(&regex_str).map_err(|e| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
            regex,
            param_names,
            exact,
        })
    }

    /// Attempts to match a path against this pattern.
    ///
    /// Returns extracted parameters if the path matches.
    pub fn match_path(&self, path: &str) -> Option<PathMatch> {
        let caps = self.regex.captures(path)?;
        let whole = caps.get(0)?;
        let rest = &path[whole.end()..];

        // Prefix matches must stop on a segment boundary.
        if !self.exact && !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }

        let mut params = PathParams::new();
        for (i, name) in self.param_names.iter().enumerate() {
            if let Some(value) = caps.name(&format!("p{i}")) {
                params.insert(name.clone(), decode(value.as_str()));
            }
        }

        let rest = if self.exact || rest.is_empty() {
            "/".to_string()
        } else {
            rest.to_string()
        };

        Some(PathMatch {
            params,
            matched: whole.as_str().trim_end_matches('/').to_string(),
            rest,
        })
    }

    /// Returns the original pattern string.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns the parameter names.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Returns whether the pattern must consume the whole path.
    pub fn is_exact(&self) -> bool {
        self.exact
    }
}

fn parse_segment(part: &str) -> PathSegment {
    if part == "*" {
        return PathSegment::Wildcard("*".to_string());
    }
    let Some(spec) = part.strip_prefix(':') else {
        return PathSegment::Literal(part.to_string());
    };
    if let Some(name) = spec.strip_suffix('*') {
        return PathSegment::Wildcard(name.to_string());
    }
    let (spec, optional) = match spec.strip_suffix('?') {
        Some(rest) => (rest, true),
        None => (spec, false),
    };
    match spec.find('(') {
        Some(open) if spec.ends_with(')') => PathSegment::Param {
            name: spec[..open].to_string(),
            optional,
            expr: Some(spec[open + 1..spec.len() - 1].to_string()),
        },
        _ => PathSegment::Param {
            name: spec.to_string(),
            optional,
            expr: None,
        },
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_path() {
        let pattern = PathPattern::exact("/users").unwrap();
        assert!(pattern.match_path("/users").is_some());
        assert!(pattern.match_path("/users/").is_some());
        assert!(pattern.match_path("/posts").is_none());
    }

    #[test]
    fn test_single_param() {
        let pattern = PathPattern::exact("/users/:id").unwrap();
        let m = pattern.match_path("/users/123").unwrap();
        assert_eq!(m.params.get("id"), Some("123"));
    }

    #[test]
    fn test_encoded_param_is_decoded() {
        let pattern = PathPattern::exact("/tags/:tag").unwrap();
        let m = pattern.match_path("/tags/rust%20lang").unwrap();
        assert_eq!(m.params.get("tag"), Some("rust lang"));
    }

    #[test]
    fn test_optional_param() {
        let pattern = PathPattern::exact("/archive/:year?").unwrap();
        assert!(pattern.match_path("/archive").is_some());
        let m = pattern.match_path("/archive/2024").unwrap();
        assert_eq!(m.params.get("year"), Some("2024"));
    }

    #[test]
    fn test_inline_expression() {
        let pattern = PathPattern::exact("/users/:id(\\d+)").unwrap();
        assert!(pattern.match_path("/users/42").is_some());
        assert!(pattern.match_path("/users/abc").is_none());
    }

    #[test]
    fn test_wildcard_param() {
        let pattern = PathPattern::exact("/files/:path*").unwrap();
        let m = pattern.match_path("/files/docs/readme.md").unwrap();
        assert_eq!(m.params.get("path"), Some("docs/readme.md"));
    }

    #[test]
    fn test_prefix_match_stops_on_boundary() {
        let pattern = PathPattern::prefix("/api").unwrap();
        let m = pattern.match_path("/api/users/1").unwrap();
        assert_eq!(m.matched, "/api");
        assert_eq!(m.rest, "/users/1");
        assert!(pattern.match_path("/apis").is_none());
    }

    #[test]
    fn test_root_prefix_matches_everything() {
        let pattern = PathPattern::prefix("/").unwrap();
        let m = pattern.match_path("/anything/here").unwrap();
        assert_eq!(m.matched, "");
        assert_eq!(m.rest, "/anything/here");
    }

    #[test]
    fn test_invalid_expression() {
        assert!(PathPattern::exact("/users/:id([)").is_err());
    }
}
