//! Request-target canonicalization.
//!
//! Turns the raw target of an HTTP request line into a [`CanonicalUrl`]:
//! a decoded, slash-collapsed pathname split into segments, the parsed query
//! map and a trailing-slash flag. Anything that could be used to smuggle a
//! path separator or escape a routing base (encoded slashes, dot segments,
//! control bytes, backslashes) is rejected here so later stages can treat the
//! path as plain data.
use std::{borrow::Cow, collections::BTreeMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parsed query string. Keys are unique, the last occurrence wins.
pub type Query = BTreeMap<String, String>;

/// Default upper bound for the complete request target.
pub const MAX_URL_LEN: usize = 4096;
/// Default upper bound for the path portion of the target.
pub const MAX_PATH_LEN: usize = 1024;
/// Default number of keys accepted in a query string.
pub const MAX_QUERY_KEYS: usize = 100;

/// Errors produced while canonicalizing a request target.
///
/// All of these are client errors and are answered with `400 Bad Request`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UrlError {
    #[error("Malformed URL: {0}")]
    MalformedUrl(&'static str),

    #[error("Path resolution disallowed")]
    PathTraversal,

    #[error("Invalid characters in path")]
    InvalidCharacters,

    #[error("Invalid query string: {0}")]
    InvalidQuery(&'static str),

    #[error("Too many keys in querystring (limit {limit})")]
    TooManyKeys { limit: usize },
}

/// Size limits applied by the [`Normalizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlLimits {
    /// Maximum length of the full target in bytes
    pub max_url_len: usize,
    /// Maximum length of the path portion in bytes
    pub max_path_len: usize,
    /// Maximum number of `&`-separated query parts
    pub max_query_keys: usize,
}

impl Default for UrlLimits {
    fn default() -> Self {
        Self {
            max_url_len: MAX_URL_LEN,
            max_path_len: MAX_PATH_LEN,
            max_query_keys: MAX_QUERY_KEYS,
        }
    }
}

/// The canonical form of a request target.
///
/// `url` keeps the client's (still percent-encoded) path so it can be logged
/// or echoed back in redirects; `pathname` and `path` hold the decoded,
/// validated values used for routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUrl {
    url: String,
    pathname: String,
    path: Vec<String>,
    query: Query,
    trailing: bool,
}

impl CanonicalUrl {
    /// Encoded pathname plus the original query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Decoded pathname, always starting with `/`.
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    /// Decoded path segments. Empty for `/`.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Whether the original path ended with a slash.
    pub fn trailing(&self) -> bool {
        self.trailing
    }

    /// Drop the first `depth` segments, keeping `url` and `query` as they are.
    ///
    /// Used when a request descends into a mounted router: the mounted side
    /// sees the remainder of the path below its prefix.
    pub(crate) fn rebased(&self, depth: usize) -> CanonicalUrl {
        let path: Vec<String> = self.path.iter().skip(depth).cloned().collect();
        let pathname = if path.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", path.join("/"))
        };

        CanonicalUrl {
            url: self.url.clone(),
            trailing: self.trailing && !path.is_empty(),
            pathname,
            path,
            query: self.query.clone(),
        }
    }
}

/// Canonicalizes request targets under a fixed set of [`UrlLimits`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    limits: UrlLimits,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: UrlLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> UrlLimits {
        self.limits
    }

    /// Parse `raw` into its canonical form.
    pub fn normalize(&self, raw: &str) -> Result<CanonicalUrl, UrlError> {
        if raw.len() > self.limits.max_url_len {
            return Err(UrlError::MalformedUrl("URI is too long"));
        }

        let mut target = raw;

        // Absolute-form targets: keep only what follows the authority.
        if let Some(rest) = target
            .strip_prefix("http://")
            .or_else(|| target.strip_prefix("https://"))
        {
            target = match rest.find('/') {
                Some(index) => &rest[index..],
                None => "/",
            };
        }

        if let Some(index) = target.find('#') {
            target = &target[..index];
        }

        let (raw_path, search) = match target.find('?') {
            Some(index) => (&target[..index], &target[index..]),
            None => (target, ""),
        };

        let mut trailing = false;

        let (encoded, pathname) = if raw_path.is_empty() {
            ("/".to_string(), "/".to_string())
        } else {
            if raw_path.len() > self.limits.max_path_len {
                return Err(UrlError::MalformedUrl("Pathname is too long"));
            }

            let mut encoded = collapse_slashes(raw_path);

            if !encoded.starts_with('/') {
                encoded.insert(0, '/');
            }

            if encoded.len() > 1 && encoded.ends_with('/') {
                encoded.pop();
                trailing = true;
            }

            if has_encoded_slash(&encoded) {
                return Err(UrlError::MalformedUrl("Percent-encoded slashes in path"));
            }

            let decoded = percent_decode(&encoded)
                .ok_or(UrlError::MalformedUrl("Malformed percent-encoding in path"))?;

            (encoded, decoded)
        };

        if has_invalid_characters(&pathname) {
            return Err(UrlError::InvalidCharacters);
        }

        debug_assert!(pathname.starts_with('/'));
        debug_assert!(pathname == "/" || !pathname.ends_with('/'));

        let path: Vec<String> = if pathname == "/" {
            Vec::new()
        } else {
            pathname[1..].split('/').map(str::to_string).collect()
        };

        if path.iter().any(|part| part == "." || part == "..") {
            return Err(UrlError::PathTraversal);
        }

        let mut url = encoded;
        let mut query = Query::new();

        if search.len() > 1 {
            url.push_str(search);
            query = parse_form(&search[1..], self.limits.max_query_keys)?;
        }

        Ok(CanonicalUrl {
            url,
            pathname,
            path,
            query,
            trailing,
        })
    }
}

/// Normalize `raw` with the default limits.
pub fn normalize(raw: &str) -> Result<CanonicalUrl, UrlError> {
    Normalizer::new().normalize(raw)
}

/// Decode an `application/x-www-form-urlencoded` string.
///
/// At most `limit` `&`-separated parts are accepted. Parts with an empty
/// decoded key are skipped and later keys overwrite earlier ones.
pub fn parse_form(input: &str, limit: usize) -> Result<Query, UrlError> {
    let mut data = Query::new();

    if input.is_empty() {
        return Ok(data);
    }

    let parts: Vec<&str> = input.splitn(limit.saturating_add(1), '&').collect();

    if parts.len() > limit {
        return Err(UrlError::TooManyKeys { limit });
    }

    for pair in parts {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));

        let key = unescape(key)?;

        if key.is_empty() {
            continue;
        }

        data.insert(key, unescape(value)?);
    }

    Ok(data)
}

/// Form-decode a single component: `+` becomes a space, then `%XX` escapes
/// are resolved. Decoded NUL bytes are refused.
pub fn unescape(input: &str) -> Result<String, UrlError> {
    let spaced: Cow<'_, str> = if input.contains('+') {
        Cow::Owned(input.replace('+', " "))
    } else {
        Cow::Borrowed(input)
    };

    let decoded =
        percent_decode(&spaced).ok_or(UrlError::InvalidQuery("Malformed percent-encoding"))?;

    if decoded.contains('\0') {
        return Err(UrlError::InvalidQuery("Percent-encoded NUL disallowed"));
    }

    Ok(decoded)
}

/// True if `input` only holds printable ASCII, tab, CR or LF.
pub fn is_ascii(input: &str) -> bool {
    input
        .bytes()
        .all(|b| matches!(b, b'\t' | b'\n' | b'\r' | 0x20..=0x7e))
}

fn collapse_slashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous_slash = false;

    for ch in input.chars() {
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(ch);
    }

    out
}

fn has_encoded_slash(input: &str) -> bool {
    input
        .as_bytes()
        .windows(3)
        .any(|w| w[0] == b'%' && w[1] == b'2' && (w[2] == b'f' || w[2] == b'F'))
}

/// Strict percent-decoding: every `%` must introduce two hex digits and the
/// decoded bytes must form valid UTF-8.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'%' {
            let escape = bytes.get(index + 1..index + 3)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            index += 3;
        } else {
            index += 1;
        }
    }

    urlencoding::decode(input).ok().map(Cow::into_owned)
}

fn has_invalid_characters(pathname: &str) -> bool {
    // Range from ` ` to `~`, backslash excluded.
    pathname.chars().any(|ch| !(' '..='~').contains(&ch) || ch == '\\')
}
