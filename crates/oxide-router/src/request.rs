//! HTTP request type.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use http::Extensions;
use indexmap::IndexMap;
use parking_lot::RwLock;

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method
    Get,
    /// POST method
    Post,
    /// PUT method
    Put,
    /// PATCH method
    Patch,
    /// DELETE method
    Delete,
    /// HEAD method
    Head,
    /// OPTIONS method
    Options,
}

impl Method {
    /// All supported methods, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Head,
        Self::Options,
    ];

    /// Returns the method as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

/// Error returned when a string is not a known method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown HTTP method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Path parameters extracted from the URL, in match order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: IndexMap<String, String>,
}

impl PathParams {
    /// Creates new empty path params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Gets a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns whether a parameter is present.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Gets a parameter value or returns an error.
    pub fn require(&self, key: &str) -> Result<&str, String> {
        self.get(key)
            .ok_or_else(|| format!("Missing path parameter: {key}"))
    }

    /// Parses a parameter as a specific type.
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Copies every parameter of `other` into `self`, overwriting.
    pub fn extend(&mut self, other: &Self) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Raw and parsed request body.
#[derive(Debug, Default)]
pub struct BodyData {
    /// Bytes as received.
    pub raw: Vec<u8>,
    /// Result of a body parser, if one ran.
    pub parsed: Option<serde_json::Value>,
}

/// A request body cell.
///
/// Cloning a `Body` shares the cell: a parse result written through one
/// handle is visible through every clone.
#[derive(Debug, Clone, Default)]
pub struct Body(Arc<RwLock<BodyData>>);

impl Body {
    /// Creates a body holding the given bytes.
    pub fn from_bytes(raw: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(RwLock::new(BodyData {
            raw: raw.into(),
            parsed: None,
        })))
    }

    /// Returns a copy of the raw bytes.
    pub fn raw(&self) -> Vec<u8> {
        self.0.read().raw.clone()
    }

    /// Returns the parsed body, if a parser has run.
    pub fn parsed(&self) -> Option<serde_json::Value> {
        self.0.read().parsed.clone()
    }

    /// Returns whether a parser has already filled the cell.
    pub fn is_parsed(&self) -> bool {
        self.0.read().parsed.is_some()
    }

    /// Stores a parse result.
    pub fn set_parsed(&self, value: serde_json::Value) {
        self.0.write().parsed = Some(value);
    }

    /// Returns whether two handles point at the same cell.
    pub fn shares_cell_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// An HTTP request as seen by the dispatch chain.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the router currently handling the request.
    pub path: String,
    /// Path consumed by the enclosing mounted routers.
    pub base_path: String,
    /// Full URL as received, including the query string.
    pub original_url: String,
    /// Path parameters extracted from URL patterns.
    pub params: PathParams,
    /// Query string parameters.
    pub query: IndexMap<String, String>,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Body,
    /// Peer address, when known.
    pub remote_addr: Option<SocketAddr>,
    /// Typed per-request state owned by layers.
    pub extensions: Extensions,
}

impl Request {
    /// Creates a new request. A query string in `url` is parsed into
    /// [`Request::query`].
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), Self::parse_query_string(query)),
            None => (url.clone(), IndexMap::new()),
        };
        let path = if path.is_empty() { "/".to_string() } else { path };
        Self {
            method,
            path,
            base_path: String::new(),
            original_url: url,
            params: PathParams::new(),
            query,
            headers: HashMap::new(),
            body: Body::default(),
            remote_addr: None,
            extensions: Extensions::new(),
        }
    }

    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Creates a POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Creates a PUT request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::from_bytes(body);
        self
    }

    /// Sets a query parameter.
    #[must_use]
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Gets a header value.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        // Case-insensitive header lookup
        let key_lower = key.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == key_lower)
            .map(|(_, v)| v.as_str())
    }

    /// Gets a query parameter.
    pub fn get_query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Returns the full path, base included, without the query string.
    pub fn full_path(&self) -> String {
        if self.path == "/" && !self.base_path.is_empty() {
            self.base_path.clone()
        } else {
            format!("{}{}", self.base_path, self.path)
        }
    }

    /// Parses the raw body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body.raw())
    }

    /// Parses query parameters from a query string.
    pub fn parse_query_string(query: &str) -> IndexMap<String, String> {
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                let key = parts.next()?;
                let value = parts.next().unwrap_or("");
                Some((decode_component(key), decode_component(value)))
            })
            .collect()
    }
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s).map_or_else(|_| s.clone(), Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("GET".parse::<Method>(), Ok(Method::Get));
        assert_eq!("post".parse::<Method>(), Ok(Method::Post));
        assert!("INVALID".parse::<Method>().is_err());
    }

    #[test]
    fn test_path_params() {
        let mut params = PathParams::new();
        params.insert("id", "123");
        params.insert("name", "test");

        assert_eq!(params.get("id"), Some("123"));
        assert_eq!(params.parse::<i64>("id"), Some(123));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn test_request_builder() {
        let req = Request::get("/users")
            .header("Content-Type", "application/json")
            .query_param("page", "1");

        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/users");
        assert_eq!(req.get_header("content-type"), Some("application/json"));
        assert_eq!(req.get_query("page"), Some("1"));
    }

    #[test]
    fn test_url_with_query() {
        let req = Request::get("/search?q=rust&page=2");
        assert_eq!(req.path, "/search");
        assert_eq!(req.get_query("q"), Some("rust"));
        assert_eq!(req.original_url, "/search?q=rust&page=2");
    }

    #[test]
    fn test_query_string_parsing() {
        let query = Request::parse_query_string("name=John+Doe&age=30&city=New%20York");
        assert_eq!(query.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(query.get("age"), Some(&"30".to_string()));
        assert_eq!(query.get("city"), Some(&"New York".to_string()));
    }

    #[test]
    fn test_body_cell_is_shared_between_clones() {
        let req = Request::post("/items").body(r#"{"a":1}"#);
        let copy = req.clone();
        copy.body.set_parsed(serde_json::json!({"a": 1}));
        assert!(req.body.is_parsed());
        assert!(req.body.shares_cell_with(&copy.body));
    }
}
