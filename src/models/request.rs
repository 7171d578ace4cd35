//! Request snapshot handed to scripts by the request pipeline.
//!
//! The snapshot is an immutable copy of the request as it will be (pre-request)
//! or was (test script) sent. Scripts can read it through `pm.request` but never
//! mutate it.

use serde::{Deserialize, Serialize};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    /// HTTP GET method - retrieve a resource
    GET,
    /// HTTP POST method - submit data to create a resource
    POST,
    /// HTTP PUT method - replace a resource
    PUT,
    /// HTTP DELETE method - remove a resource
    DELETE,
    /// HTTP PATCH method - partially modify a resource
    PATCH,
    /// HTTP OPTIONS method - describe communication options
    OPTIONS,
    /// HTTP HEAD method - retrieve headers only
    HEAD,
}

impl HttpMethod {
    /// Returns the string representation of the HTTP method.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::HEAD => "HEAD",
        }
    }

    /// Parses a string into an HttpMethod (case-insensitive).
    ///
    /// # Returns
    ///
    /// `Some(HttpMethod)` if the string is a valid HTTP method, `None` otherwise.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            "HEAD" => Some(HttpMethod::HEAD),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single HTTP header.
///
/// Headers are kept as an ordered list so duplicates survive and the original
/// casing is preserved; lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name as sent on the wire.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl Header {
    /// Creates a new header.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Finds the first header matching `name`, ignoring ASCII case.
pub fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Immutable view of an outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// HTTP method (GET, POST, PUT, DELETE, etc.).
    pub method: HttpMethod,

    /// Target URL.
    ///
    /// May still contain `{{variableName}}` tokens until the pipeline runs
    /// substitution.
    pub url: String,

    /// Request headers in send order.
    #[serde(default)]
    pub headers: Vec<Header>,

    /// Optional request body.
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestSnapshot {
    /// Creates a new request snapshot without headers or body.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Adds a header, builder style.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Sets the body, builder style.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Gets the Content-Type header value if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the first value of a query parameter in the URL.
    ///
    /// Returns `None` when the URL cannot be parsed (for example while it still
    /// contains unresolved `{{...}}` tokens in the host) or the parameter is absent.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let parsed = url::Url::parse(&self.url).ok()?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method_parse() {
        assert_eq!(HttpMethod::parse("GET"), Some(HttpMethod::GET));
        assert_eq!(HttpMethod::parse("post"), Some(HttpMethod::POST));
        assert_eq!(HttpMethod::parse("INVALID"), None);
    }

    #[test]
    fn test_http_method_display() {
        assert_eq!(format!("{}", HttpMethod::PATCH), "PATCH");
    }

    #[test]
    fn test_request_header_lookup_is_case_insensitive() {
        let request = RequestSnapshot::new(HttpMethod::POST, "https://example.com")
            .with_header("Content-Type", "application/json")
            .with_header("X-Trace", "1");

        assert_eq!(request.content_type(), Some("application/json"));
        assert_eq!(request.header("x-trace"), Some("1"));
        assert_eq!(request.header("missing"), None);
    }

    #[test]
    fn test_query_param() {
        let request = RequestSnapshot::new(
            HttpMethod::GET,
            "https://api.example.com/users?page=2&q=rust%20lang",
        );
        assert_eq!(request.query_param("page"), Some("2".to_string()));
        assert_eq!(request.query_param("q"), Some("rust lang".to_string()));
        assert_eq!(request.query_param("none"), None);

        let unresolved = RequestSnapshot::new(HttpMethod::GET, "{{baseUrl}}/users?page=1");
        assert_eq!(unresolved.query_param("page"), None);
    }

    #[test]
    fn test_serialization() {
        let request = RequestSnapshot::new(HttpMethod::GET, "https://api.example.com/data")
            .with_body("{}");

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("GET"));

        let deserialized: RequestSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.method, HttpMethod::GET);
        assert_eq!(deserialized.url, request.url);
        assert_eq!(deserialized.body.as_deref(), Some("{}"));
    }
}
