use std::collections::BTreeMap;

use bytes::Bytes;
use http::{Extensions, HeaderMap, HeaderValue, Method, StatusCode, header};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        route::{Params, prefix_depth},
        url::{CanonicalUrl, Normalizer, Query, UrlError, UrlLimits, parse_form},
    },
    error::Error,
    ports::transport::IncomingRequest,
};

/// Canonical URL fields plus the mount point they are relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UrlState {
    location: CanonicalUrl,
    prefix: String,
}

/// A request travelling through the handler chain.
///
/// Created once per incoming request. URL fields always satisfy the
/// canonical-URL invariants; `params` is replaced every time a route matches.
#[derive(Debug)]
pub struct Request {
    method: Method,
    headers: HeaderMap,
    target: String,
    location: CanonicalUrl,
    prefix: String,
    normalizer: Normalizer,
    params: Params,
    body: Bytes,
    cookies: BTreeMap<String, String>,
    username: Option<String>,
    admin: bool,
    extensions: Extensions,
    cancel: CancellationToken,
}

impl Request {
    /// Build a request with default URL limits and no headers or body.
    pub fn new(method: Method, target: &str) -> Result<Self, UrlError> {
        Self::from_incoming(IncomingRequest::new(method, target), UrlLimits::default())
    }

    pub fn from_incoming(incoming: IncomingRequest, limits: UrlLimits) -> Result<Self, UrlError> {
        let normalizer = Normalizer::with_limits(limits);
        let location = normalizer.normalize(&incoming.target)?;
        let cookies = parse_cookies(incoming.headers.get_all(header::COOKIE).iter());

        Ok(Self {
            method: incoming.method,
            headers: incoming.headers,
            target: incoming.target,
            location,
            prefix: String::new(),
            normalizer,
            params: Params::new(),
            body: incoming.body,
            cookies,
            username: None,
            admin: false,
            extensions: Extensions::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Attach the token the transport cancels when the client goes away.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// The target exactly as received.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn url(&self) -> &str {
        self.location.url()
    }

    pub fn pathname(&self) -> &str {
        self.location.pathname()
    }

    pub fn path(&self) -> &[String] {
        self.location.path()
    }

    pub fn query(&self) -> &Query {
        self.location.query()
    }

    pub fn trailing(&self) -> bool {
        self.location.trailing()
    }

    /// Mount point the URL fields are currently relative to, `""` at the top.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Decode the body as JSON. A body that does not parse is a client error.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|err| {
            Error::status(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {err}"))
        })
    }

    /// Decode an `application/x-www-form-urlencoded` body.
    pub fn form(&self) -> Result<Query, Error> {
        let text = std::str::from_utf8(&self.body)
            .map_err(|_| Error::status(StatusCode::BAD_REQUEST, "Form body is not UTF-8"))?;
        Ok(parse_form(text, self.normalizer.limits().max_query_keys)?)
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Identity established by an authentication middleware.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn set_admin(&mut self, admin: bool) {
        self.admin = admin;
    }

    /// Typed slots for application-specific identity or state.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Re-point the request at `target`.
    ///
    /// On failure the request is left exactly as it was.
    pub fn navigate(&mut self, target: &str) -> Result<(), UrlError> {
        let location = self.normalizer.normalize(target)?;
        self.location = location;
        Ok(())
    }

    pub(crate) fn url_state(&self) -> UrlState {
        UrlState {
            location: self.location.clone(),
            prefix: self.prefix.clone(),
        }
    }

    pub(crate) fn restore_url(&mut self, state: UrlState) {
        self.location = state.location;
        self.prefix = state.prefix;
    }

    /// Descend below `prefix` (a normalized mount prefix).
    pub(crate) fn rebase(&mut self, prefix: &str) {
        if prefix == "/" {
            return;
        }

        self.location = self.location.rebased(prefix_depth(prefix));
        self.prefix.push_str(prefix);
    }
}

fn parse_cookies<'a>(values: impl Iterator<Item = &'a HeaderValue>) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();

    for value in values {
        let Ok(value) = value.to_str() else {
            continue;
        };

        for pair in value.split(';') {
            let Some((name, raw)) = pair.trim().split_once('=') else {
                continue;
            };

            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            let raw = raw.trim().trim_matches('"');
            let decoded = urlencoding::decode(raw)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.to_string());

            cookies.entry(name.to_string()).or_insert(decoded);
        }
    }

    cookies
}
