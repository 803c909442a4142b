//! Path patterns.
//!
//! A pattern is a `/`-separated list of segments. A segment starting with
//! `:` captures the request segment at the same position under that name;
//! every other segment must match literally. Patterns never span a different
//! number of segments than the path they match.
use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::handler::Handler;

/// Values captured by a pattern.
///
/// Named parameters are stored under their name and, in addition, under the
/// decimal index of the capture (`"0"`, `"1"`, ...).
pub type Params = BTreeMap<String, String>;

/// Errors raised while building a router.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouteError {
    #[error("Invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },

    #[error("Duplicate parameter {name:?} in route pattern {pattern:?}")]
    DuplicateParam { pattern: String, name: String },

    #[error("Invalid prefix {prefix:?}: must start with '/'")]
    InvalidPrefix { prefix: String },

    #[error("Invalid options for {middleware}: {reason}")]
    InvalidOptions {
        middleware: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled pattern plus the handler it dispatches to.
pub struct Route {
    pattern: String,
    segments: Vec<Segment>,
    params: Vec<String>,
    handler: Handler,
}

impl Route {
    pub fn new(pattern: impl Into<String>, handler: Handler) -> Result<Self, RouteError> {
        let pattern = pattern.into();

        let invalid = |reason| RouteError::InvalidPattern {
            pattern: pattern.clone(),
            reason,
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let mut segments = Vec::new();
        let mut params: Vec<String> = Vec::new();

        for part in split_segments(&pattern) {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }

            let Some(name) = part.strip_prefix(':') else {
                segments.push(Segment::Literal(part.to_string()));
                continue;
            };

            if name.is_empty() {
                return Err(invalid("parameter without a name"));
            }

            if name.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("parameter names cannot be numeric"));
            }

            if params.iter().any(|existing| existing == name) {
                return Err(RouteError::DuplicateParam {
                    pattern: pattern.clone(),
                    name: name.to_string(),
                });
            }

            params.push(name.to_string());
            segments.push(Segment::Param(name.to_string()));
        }

        Ok(Self {
            pattern,
            segments,
            params,
            handler,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parameter names in capture order.
    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Match a pathname such as `/users/42`.
    pub fn matches(&self, pathname: &str) -> Option<Params> {
        let parts: Vec<&str> = split_segments(pathname).collect();
        self.match_segments(&parts)
    }

    /// Match an already split path.
    pub fn match_segments<S: AsRef<str>>(&self, path: &[S]) -> Option<Params> {
        if path.len() != self.segments.len() {
            return None;
        }

        let mut params = Params::new();
        let mut index = 0;

        for (segment, part) in self.segments.iter().zip(path) {
            let part = part.as_ref();

            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                    params.insert(index.to_string(), part.to_string());
                    index += 1;
                }
            }
        }

        Some(params)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .field("handler", &self.handler)
            .finish()
    }
}

/// A handler that runs for every request below a path prefix.
///
/// Hooks never satisfy a request on their own; see [`Router::hook`](crate::core::Router::hook).
#[derive(Debug, Clone)]
pub struct Hook {
    prefix: String,
    handler: Handler,
}

impl Hook {
    pub fn new(prefix: &str, handler: Handler) -> Result<Self, RouteError> {
        Ok(Self {
            prefix: normalize_prefix(prefix)?,
            handler,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn matches(&self, pathname: &str) -> bool {
        prefix_matches(&self.prefix, pathname)
    }
}

/// Split a pathname into segments, `/` yielding none.
fn split_segments(pathname: &str) -> impl Iterator<Item = &str> {
    let trimmed = pathname.strip_prefix('/').unwrap_or(pathname);
    (!trimmed.is_empty())
        .then(|| trimmed.split('/'))
        .into_iter()
        .flatten()
}

/// Normalize a hook or mount prefix: leading slash required, trailing slash
/// dropped (except for `/` itself), repeated slashes collapsed.
pub(crate) fn normalize_prefix(prefix: &str) -> Result<String, RouteError> {
    if !prefix.starts_with('/') {
        return Err(RouteError::InvalidPrefix {
            prefix: prefix.to_string(),
        });
    }

    let parts: Vec<&str> = prefix.split('/').filter(|p| !p.is_empty()).collect();

    if parts.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", parts.join("/")))
    }
}

/// Segment-aware prefix test: `/api` covers `/api` and `/api/x` but not
/// `/apix`. `/` covers everything.
pub(crate) fn prefix_matches(prefix: &str, pathname: &str) -> bool {
    if prefix == "/" || pathname == prefix {
        return true;
    }

    pathname.starts_with(prefix) && pathname.as_bytes().get(prefix.len()) == Some(&b'/')
}

/// Number of path segments in a normalized prefix.
pub(crate) fn prefix_depth(prefix: &str) -> usize {
    split_segments(prefix).count()
}
