//! Immutable client configuration and header construction.

use std::fmt;
use std::time::Duration;

/// Production API root.
pub const API_URL: &str = "https://api.crossengage.io";

/// Deadline applied to every request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const AUTH_HEADER: &str = "X-XNG-AuthToken";
pub const API_VERSION_HEADER: &str = "X-XNG-ApiVersion";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Value of the `X-XNG-ApiVersion` header.
///
/// `V1` endpoints answer synchronously with the result body. `V2` endpoints
/// are task based: they accept the work with `202` and a `trackingId`
/// (except `GET /users/{id}` and task tracking, which only exist on v2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub fn header_value(self) -> &'static str {
        match self {
            ApiVersion::V1 => "1",
            ApiVersion::V2 => "2",
        }
    }
}

/// Connection settings captured once at construction.
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    default_headers: Vec<(String, String)>,
}

impl ClientConfig {
    /// Configuration against the production API.
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, API_URL)
    }

    /// Configuration against another API root, e.g. a staging or local server.
    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Self {
        let default_headers = vec![
            (AUTH_HEADER.to_string(), token.into()),
            (
                API_VERSION_HEADER.to_string(),
                ApiVersion::V1.header_value().to_string(),
            ),
            (
                CONTENT_TYPE_HEADER.to_string(),
                "application/json".to_string(),
            ),
        ];
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_headers,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_headers(&self) -> &[(String, String)] {
        &self.default_headers
    }

    /// Default headers with the version header replaced. Returns a new list;
    /// the defaults are never modified.
    pub fn headers_for(&self, version: ApiVersion) -> Vec<(String, String)> {
        merge_headers(
            &self.default_headers,
            &[(API_VERSION_HEADER, version.header_value())],
        )
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Copy `base` and apply `overrides`, replacing headers with the same
/// (case-insensitive) name and appending new ones.
pub fn merge_headers(base: &[(String, String)], overrides: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut merged = base.to_vec();
    for (name, value) in overrides {
        match merged
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.1 = value.to_string(),
            None => merged.push((name.to_string(), value.to_string())),
        }
    }
    merged
}
