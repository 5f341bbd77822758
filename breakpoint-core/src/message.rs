//! Intercepted traffic as seen by breakpoints and the operator

use crate::filter::ScopeMatcher;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Which leg of the exchange is being intercepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Request leaving the client
    Request,
    /// Response leaving the server
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => write!(f, "request"),
            Direction::Response => write!(f, "response"),
        }
    }
}

/// Request half of a proxied exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestData {
    pub method: String,
    pub url: String,
    /// Header names are stored lowercase
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Response half of a proxied exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
    pub status: u16,
    /// Header names are stored lowercase
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// A single unit of intercepted work.
///
/// The response is only present once the server has answered; breakpoints
/// evaluated in the response direction see both halves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpMessage {
    pub id: Uuid,
    pub request: RequestData,
    pub response: Option<ResponseData>,
    pub in_scope: bool,
}

impl HttpMessage {
    /// Create an in-scope request message with no headers or body
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request: RequestData {
                method: method.into(),
                url: url.into(),
                headers: HashMap::new(),
                body: Vec::new(),
            },
            response: None,
            in_scope: true,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.request
            .headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request.body = body.into();
        self
    }

    pub fn with_response(mut self, response: ResponseData) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_scope(mut self, in_scope: bool) -> Self {
        self.in_scope = in_scope;
        self
    }

    pub fn is_in_scope(&self) -> bool {
        self.in_scope
    }

    /// Recompute scope membership from the request host
    pub fn mark_scope(&mut self, matcher: &ScopeMatcher) {
        self.in_scope = match self.host() {
            Some(host) => matcher.is_allowed(&host),
            None => false,
        };
    }

    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.request.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }

    /// Explicit port, or the scheme default
    pub fn port(&self) -> Option<u16> {
        url::Url::parse(&self.request.url)
            .ok()
            .and_then(|u| u.port_or_known_default())
    }

    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request
            .headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Request line followed by headers, one per line
    pub fn request_header_text(&self) -> String {
        let mut text = format!("{} {}\r\n", self.request.method, self.request.url);
        push_headers(&mut text, &self.request.headers);
        text
    }

    /// Status line followed by headers, or `None` before the server answered
    pub fn response_header_text(&self) -> Option<String> {
        self.response.as_ref().map(|res| {
            let mut text = format!("{}\r\n", res.status);
            push_headers(&mut text, &res.headers);
            text
        })
    }
}

fn push_headers(text: &mut String, headers: &HashMap<String, String>) {
    // Sorted so that pattern matching is deterministic
    let mut names: Vec<&String> = headers.keys().collect();
    names.sort();
    for name in names {
        text.push_str(name);
        text.push_str(": ");
        text.push_str(&headers[name]);
        text.push_str("\r\n");
    }
}
