//! Reusable middleware for router chains.
//!
//! Everything here is an ordinary [`Handler`] meant to be registered with
//! [`Router::hook`](crate::core::Router::hook): request timing and request-id
//! diagnostics, security and custom headers, CORS and HTTP basic auth.
//! Response headers are set before the rest of the chain runs since they
//! cannot change once a response is sent.
use std::{collections::HashMap, sync::Arc, time::Instant};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use http::{HeaderName, HeaderValue, Method, StatusCode, header};
use sha2::{Digest, Sha256};
use tracing::Instrument;

use crate::{
    core::{
        handler::{BoxFuture, Handler, Middleware, Next},
        request::Request,
        response::Response,
        route::RouteError,
        url::is_ascii,
    },
    error::HandlerResult,
    tracing_setup::create_request_span,
};

/// Log start/end of a request including latency.
pub fn request_timing_middleware() -> Handler {
    Handler::chained(|req, res, next| {
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method().clone();
            let url = req.url().to_string();

            tracing::info!("Started processing {} {}", method, url);

            let result = next.run(req, res).await;
            let status = if res.is_sent() {
                res.status().as_u16()
            } else {
                0
            };
            let elapsed = start.elapsed();

            let span = tracing::Span::current();
            span.record("http.status_code", status);
            span.record("duration_ms", elapsed.as_millis() as u64);

            tracing::info!("Completed {} {} - {} in {:?}", method, url, status, elapsed);

            result
        })
    })
}

/// Generate a per-request UUID and expose it via tracing plus `X-Request-ID`.
pub fn request_id_middleware() -> Handler {
    Handler::chained(|req, res, next| {
        Box::pin(async move {
            let request_id = uuid::Uuid::new_v4().to_string();

            if let Ok(header_value) = HeaderValue::from_str(&request_id) {
                res.set_header(HeaderName::from_static("x-request-id"), header_value);
            }

            let span = create_request_span(req.method().as_str(), req.pathname(), &request_id);
            next.run(req, res).instrument(span).await
        })
    })
}

/// Add common security hardening headers.
pub fn security_headers_middleware() -> Handler {
    Handler::terminal(|_req, res| {
        Box::pin(async move {
            res.set_header(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            );
            res.set_header(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
            res.set_header(
                header::REFERRER_POLICY,
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            );
            Ok(())
        })
    })
}

/// Inject custom headers defined in configuration (invalid pairs are skipped
/// with a warning).
pub fn custom_headers_middleware(custom_headers: Arc<HashMap<String, String>>) -> Handler {
    Handler::terminal(move |_req, res| {
        let custom_headers = custom_headers.clone();
        Box::pin(async move {
            for (name, value) in custom_headers.iter() {
                if let (Ok(header_name), Ok(header_value)) =
                    (name.parse::<HeaderName>(), HeaderValue::from_str(value))
                {
                    res.set_header(header_name, header_value);
                } else {
                    tracing::warn!("Invalid custom header: {} = {}", name, value);
                }
            }
            Ok(())
        })
    })
}

const CORS_ALLOW_HEADERS: &str = "Authorization,Content-Type,User-Agent";
const CORS_ALLOW_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

/// Cross-origin resource sharing.
///
/// With no configured origins the caller's origin (or `*`) is allowed. With a
/// single origin that origin is always advertised. With several, the caller's
/// origin is echoed back only when it is one of them. Preflight (`OPTIONS`)
/// requests are answered here with `204 No Content`.
#[derive(Debug, Clone, Default)]
pub struct Cors {
    origins: Vec<String>,
}

impl Cors {
    pub fn new(origins: Vec<String>) -> Result<Self, RouteError> {
        for origin in &origins {
            if origin.is_empty() || origin == "*" || origin == "null" {
                return Err(RouteError::InvalidOptions {
                    middleware: "cors",
                    reason: format!("invalid origin {origin:?}"),
                });
            }
        }

        Ok(Self { origins })
    }

    pub fn into_handler(self) -> Handler {
        Handler::middleware(self)
    }

    fn allowed_origin(&self, requested: Option<&HeaderValue>) -> Option<HeaderValue> {
        match self.origins.as_slice() {
            [] => Some(
                requested
                    .cloned()
                    .unwrap_or_else(|| HeaderValue::from_static("*")),
            ),
            [only] => HeaderValue::from_str(only).ok(),
            many => {
                let requested = requested?;
                let origin = requested.to_str().ok()?;
                many.iter()
                    .any(|allowed| allowed == origin)
                    .then(|| requested.clone())
            }
        }
    }
}

impl Middleware for Cors {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            res.set_header(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );

            if let Some(origin) = self.allowed_origin(req.header(header::ORIGIN)) {
                res.set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            }

            if *req.method() != Method::OPTIONS {
                return next.run(req, res).await;
            }

            res.set_header(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(CORS_ALLOW_HEADERS),
            );
            res.set_header(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(CORS_ALLOW_METHODS),
            );

            res.send(StatusCode::NO_CONTENT, None, None).await
        })
    }
}

/// Longest `Authorization` value accepted, enough for two 255-byte
/// credentials in base64 plus the scheme.
const MAX_AUTHORIZATION_LEN: usize = 674;
const MAX_CREDENTIAL_LEN: usize = 255;

/// HTTP basic authentication.
///
/// Credentials are kept as SHA-256 digests and compared in constant time. On
/// success the username is recorded on the request and the chain continues;
/// otherwise the request is answered with `401` and a `WWW-Authenticate`
/// challenge.
#[derive(Clone)]
pub struct BasicAuth {
    username: Option<[u8; 32]>,
    password: [u8; 32],
    challenge: HeaderValue,
}

impl BasicAuth {
    /// `username` may be omitted to accept any user with the right password.
    /// `realm` defaults to `server`.
    pub fn new(
        username: Option<&str>,
        password: &str,
        realm: Option<&str>,
    ) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidOptions {
            middleware: "basic_auth",
            reason: reason.to_string(),
        };

        if let Some(username) = username {
            if username.len() > MAX_CREDENTIAL_LEN || !is_ascii(username) {
                return Err(invalid("username must be ASCII and at most 255 bytes"));
            }
        }

        if password.len() > MAX_CREDENTIAL_LEN || !is_ascii(password) {
            return Err(invalid("password must be ASCII and at most 255 bytes"));
        }

        let realm = realm.unwrap_or("server");

        if realm.contains('"') || !is_ascii(realm) {
            return Err(invalid("realm must be ASCII without quotes"));
        }

        let challenge = HeaderValue::from_str(&format!("Basic realm=\"{realm}\""))
            .map_err(|_| invalid("realm is not a valid header value"))?;

        Ok(Self {
            username: username.map(sha256),
            password: sha256(password),
            challenge,
        })
    }

    pub fn into_handler(self) -> Handler {
        Handler::middleware(self)
    }

    /// Check an `Authorization` header value, returning the username.
    fn authenticate(&self, value: Option<&HeaderValue>) -> Option<String> {
        let value = value?.to_str().ok()?;

        if value.len() > MAX_AUTHORIZATION_LEN {
            return None;
        }

        let (scheme, encoded) = value.split_once(' ')?;

        if scheme != "Basic" || encoded.contains(' ') {
            return None;
        }

        let decoded = STANDARD.decode(encoded).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        if let Some(expected) = &self.username {
            if !constant_time_eq(&sha256(username), expected) {
                return None;
            }
        }

        if !constant_time_eq(&sha256(password), &self.password) {
            return None;
        }

        Some(username.to_string())
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

impl Middleware for BasicAuth {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            match self.authenticate(req.header(header::AUTHORIZATION)) {
                Some(username) => {
                    req.set_username(username);
                    next.run(req, res).await
                }
                None => {
                    tracing::debug!(path = %req.pathname(), "Basic auth rejected");
                    res.set_header(header::WWW_AUTHENTICATE, self.challenge.clone());
                    res.set_status(StatusCode::UNAUTHORIZED);
                    res.end().await
                }
            }
        })
    }
}

fn sha256(input: &str) -> [u8; 32] {
    Sha256::digest(input.as_bytes()).into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
