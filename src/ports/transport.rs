use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

/// ResponseSink defines the port (interface) a [`Response`](crate::core::Response)
/// writes to.
///
/// The status and headers are pushed exactly once, before the first body
/// chunk. `end` is called exactly once per response.
#[async_trait]
pub trait ResponseSink: Send {
    /// Set the status line
    fn set_status_code(&mut self, status: StatusCode);

    /// Set (or replace) a header field
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);

    /// Append a chunk to the body
    async fn write(&mut self, chunk: Bytes) -> io::Result<()>;

    /// Complete the response
    async fn end(&mut self) -> io::Result<()>;
}

/// A request as handed over by the transport, before canonicalization.
///
/// The body is expected to be fully read by the transport adapter.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IncomingRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

impl From<http::Request<Bytes>> for IncomingRequest {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();

        Self {
            target: parts.uri.to_string(),
            method: parts.method,
            headers: parts.headers,
            body,
        }
    }
}
