//! Response builder and wire serialization.
//!
//! # Design Decisions
//! - One response per connection: every response carries
//!   `Connection: close` and an exact `Content-Length`
//! - Headers reuse the request header list, so setting a header twice
//!   replaces it

use http::StatusCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::request::Headers;

pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    /// Empty response with `status`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", CONTENT_TYPE_HTML)
            .with_body(body.into().into_bytes())
    }

    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header("Content-Type", CONTENT_TYPE_JSON)
            .with_body(value.to_string().into_bytes())
    }

    /// `302 Found` to `location`.
    pub fn redirect(location: &str) -> Self {
        Self::new(StatusCode::FOUND).with_header("Location", location)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.starts_with(CONTENT_TYPE_JSON))
    }

    /// Serialize status line, headers and body.
    ///
    /// With `include_body` false (HEAD) the `Content-Length` still
    /// describes the body that a GET would have returned.
    pub fn to_bytes(&self, include_body: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("Unknown")
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection") {
                continue;
            }
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(b"Connection: close\r\n\r\n");
        if include_body {
            out.extend_from_slice(&self.body);
        }
        out
    }

    pub async fn write_to<W>(&self, writer: &mut W, include_body: bool) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes(include_body)).await?;
        writer.flush().await
    }
}
