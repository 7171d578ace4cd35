//! Response snapshot handed to test scripts and the rule engine.

use super::request::{find_header, Header};
use serde::{Deserialize, Serialize};

/// Immutable view of a received HTTP response.
///
/// The body is stored as text; the pipeline decodes it before handing the
/// snapshot over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    /// HTTP status code (e.g., 200, 404, 500).
    pub status: u16,

    /// HTTP status text (e.g., "OK", "Not Found").
    #[serde(default)]
    pub status_text: String,

    /// Response headers in receive order.
    #[serde(default)]
    pub headers: Vec<Header>,

    /// Response body as text.
    #[serde(default)]
    pub body: String,

    /// Total request duration in milliseconds.
    #[serde(default)]
    pub response_time: u64,

    /// Total response size in bytes (headers and body).
    #[serde(default)]
    pub response_size: usize,
}

impl ResponseSnapshot {
    /// Creates a new response with the given status code and text.
    ///
    /// # Arguments
    ///
    /// * `status` - HTTP status code
    /// * `status_text` - HTTP status text description
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: String::new(),
            response_time: 0,
            response_size: 0,
        }
    }

    /// Adds a header and updates the computed response size.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
        self.response_size = self.calculate_headers_size() + self.body.len();
    }

    /// Sets the body and updates the computed response size.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
        self.response_size = self.calculate_headers_size() + self.body.len();
    }

    /// Builder variant of [`ResponseSnapshot::add_header`].
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    /// Builder variant of [`ResponseSnapshot::set_body`].
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.set_body(body);
        self
    }

    /// Sets the response time in milliseconds, builder style.
    pub fn with_response_time(mut self, millis: u64) -> Self {
        self.response_time = millis;
        self
    }

    /// Checks if the response status indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Gets the Content-Type header value if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Approximate size of headers in bytes.
    fn calculate_headers_size(&self) -> usize {
        self.headers
            .iter()
            .map(|h| h.name.len() + h.value.len() + 4) // +4 for ": " and "\r\n"
            .sum()
    }
}
