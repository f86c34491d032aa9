//! Turns transport outcomes into the uniform result contract.
//!
//! Every operation of the client funnels through here. Nothing in this module
//! returns an error: connection failures, local failures, HTTP error statuses
//! and unreadable bodies all become data.
//!
//! Rules for `NormalizedResult`, in order:
//! 1. connection failure: `status_code = 0`, `connection_error`;
//! 2. any other local failure: `status_code = 0`, `client_error`;
//! 3. status `500`: `server_error` with a fixed message, body ignored;
//! 4. otherwise the body (empty, or a JSON object) is merged in and
//!    `success` is decided by the status: only `2xx` can succeed, and within
//!    `2xx` an explicit `success` in the body wins.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::TransportError;
use crate::http::HttpResponse;

/// Message reported for every `500`, whatever the server sent.
pub const SERVER_ERROR_MESSAGE: &str = "error on crossengage side";

const BODY_PREVIEW_CHARS: usize = 200;

/// Why a request did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultError {
    /// No response: DNS, connect, timeout or socket failure.
    Connection(String),
    /// Failure on this side: bad payload, unreadable or non-JSON body.
    Client(String),
    /// The server answered `500`.
    Server(String),
    /// The `errors` value of the server's body, passed through verbatim.
    Remote(Value),
}

impl ResultError {
    /// JSON shape exposed under the `errors` key.
    pub fn to_value(&self) -> Value {
        match self {
            ResultError::Connection(message) => json!({ "connection_error": message }),
            ResultError::Client(message) => json!({ "client_error": message }),
            ResultError::Server(message) => json!({ "server_error": message }),
            ResultError::Remote(value) => value.clone(),
        }
    }
}

/// Uniform outcome of a single API call.
///
/// Besides the normalized `status_code`, `success` and `errors`, every
/// top-level key of a JSON object body is kept and reachable via
/// [`NormalizedResult::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResult {
    status_code: u16,
    success: bool,
    errors: Option<ResultError>,
    fields: Map<String, Value>,
}

impl NormalizedResult {
    /// Normalize the outcome of one transport call.
    pub fn from_outcome(outcome: Result<HttpResponse, TransportError>) -> Self {
        match outcome {
            Ok(response) => Self::from_response(&response),
            Err(TransportError::Connection(message)) => {
                Self::failure(ResultError::Connection(message))
            }
            Err(TransportError::Other(message)) => Self::failure(ResultError::Client(message)),
        }
    }

    /// Normalize a response that reached us.
    pub fn from_response(response: &HttpResponse) -> Self {
        let status_code = response.status;
        if status_code == 500 {
            return Self {
                status_code,
                success: false,
                errors: Some(ResultError::Server(SERVER_ERROR_MESSAGE.to_string())),
                fields: Map::new(),
            };
        }

        let mut fields = match decode_object(&response.body) {
            Ok(fields) => fields,
            Err(message) => return Self::failure(ResultError::Client(message)),
        };
        fields.remove("status_code");
        let declared = fields.remove("success").and_then(|value| as_flag(&value));
        let errors = fields.remove("errors").map(ResultError::Remote);

        let success = is_success_status(status_code) && declared.unwrap_or(true);

        Self {
            status_code,
            success,
            errors,
            fields,
        }
    }

    /// A result for a request that never produced a response.
    pub fn failure(error: ResultError) -> Self {
        Self {
            status_code: 0,
            success: false,
            errors: Some(error),
            fields: Map::new(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn errors(&self) -> Option<&ResultError> {
        self.errors.as_ref()
    }

    /// A top-level key of the server's body, e.g. `"xngId"` or `"trackingId"`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All body keys except the normalized ones.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The flat JSON mapping: body keys plus `status_code`, `success` and,
    /// when present, `errors`.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("status_code".to_string(), Value::from(self.status_code));
        map.insert("success".to_string(), Value::Bool(self.success));
        if let Some(errors) = &self.errors {
            map.insert("errors".to_string(), errors.to_value());
        }
        Value::Object(map)
    }
}

impl Serialize for NormalizedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Status code and decoded body of the bulk and task-tracking endpoints.
///
/// These endpoints answer with their own envelopes (`updated`/`deleted`
/// sections, task stages), so no fix-ups are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPair {
    pub status_code: u16,
    /// `None` when the body was empty or not JSON.
    pub body: Option<Value>,
}

impl RawPair {
    pub fn from_outcome(outcome: Result<HttpResponse, TransportError>) -> Self {
        match outcome {
            Ok(response) => Self {
                status_code: response.status,
                body: serde_json::from_str(&response.body).ok(),
            },
            Err(error) => {
                let error = match error {
                    TransportError::Connection(message) => ResultError::Connection(message),
                    TransportError::Other(message) => ResultError::Client(message),
                };
                Self::failure(error)
            }
        }
    }

    /// A pair for a request that never produced a response.
    pub fn failure(error: ResultError) -> Self {
        Self {
            status_code: 0,
            body: Some(json!({ "success": false, "errors": error.to_value() })),
        }
    }
}

/// `2xx` is success, `202 Accepted` included.
pub fn is_success_status(status: u16) -> bool {
    (200..=299).contains(&status)
}

fn decode_object(body: &str) -> Result<Map<String, Value>, String> {
    if body.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(format!("expected a JSON object: {}", preview(body))),
        Err(e) => Err(format!("{e}: {}", preview(body))),
    }
}

/// `true`/`false`, also when the server sends them as strings.
fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) if text.eq_ignore_ascii_case("true") => Some(true),
        Value::String(text) if text.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() <= BODY_PREVIEW_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}
