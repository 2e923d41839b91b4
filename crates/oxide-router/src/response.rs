//! HTTP response type.

use std::collections::HashMap;

use http::Extensions;

/// An HTTP response.
///
/// Handlers receive the response by mutable reference and fill it in place;
/// the dispatch chain returns it to the host once a layer reports the
/// request as handled.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
    /// Typed state attached by layers (e.g. the active request).
    pub extensions: Extensions,
}

impl Response {
    /// Creates a new response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            extensions: Extensions::new(),
        }
    }

    /// Creates a 200 OK response.
    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        Self::new(404).body("Not Found")
    }

    /// Creates a response for a failed dispatch.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(status).body(message.into())
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the status code.
    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Writes a plain text body.
    pub fn send_text(&mut self, body: impl Into<String>) {
        self.headers.insert(
            "Content-Type".to_string(),
            "text/plain; charset=utf-8".to_string(),
        );
        self.body = body.into().into_bytes();
    }

    /// Writes a JSON body.
    pub fn send_json<T: serde::Serialize>(&mut self, data: &T) -> Result<(), serde_json::Error> {
        self.body = serde_json::to_vec(data)?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(())
    }

    /// Turns this response into a `302 Found` redirect.
    pub fn redirect(&mut self, location: impl Into<String>) {
        self.status = 302;
        self.headers.insert("Location".to_string(), location.into());
        self.body.clear();
    }

    /// Returns a header value.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Returns the body as a string.
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}
