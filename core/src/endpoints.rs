//! Request builders for every CrossEngage endpoint.
//!
//! # Design
//! `Endpoints` holds only the immutable `ClientConfig`. Each `build_*` method
//! assembles URL, headers and body into a fresh `HttpRequest` and performs no
//! I/O, so the mapping from arguments to requests can be checked without a
//! network. The only decisions made here are preconditions: a missing path
//! identifier is reported as `ApiError::MissingField`, a recipient-less event
//! batch as `ApiError::MissingRecipient`.

use serde::Serialize;
use serde_json::Value;

use crate::config::{ApiVersion, ClientConfig};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};
use crate::types::{
    AttributeType, BatchPayload, Channel, EventRecipient, EventsPayload, NewAttribute,
    OptOutPayload, User, TRAITS_PREFIX,
};

const USERS: &str = "users";
const USERS_BATCH: &str = "users/batch";
const USERS_TRACK: &str = "users/track";
const USERS_BY_XNG_ID: &str = "users/xngId";
const USER_ATTRIBUTES: &str = "users/attributes";
const EVENTS: &str = "events";
const OPT_OUT: &str = "optout-status";

/// Stateless request builder for the CrossEngage API.
#[derive(Debug, Clone)]
pub struct Endpoints {
    config: ClientConfig,
}

impl Endpoints {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `GET /users/{id}` (v2).
    pub fn build_get_user(&self, user: &User) -> Result<HttpRequest, ApiError> {
        let id = required(user.id.as_deref(), "id")?;
        Ok(self.request(HttpMethod::Get, format!("{USERS}/{id}"), ApiVersion::V2, None))
    }

    /// `PUT /users/{id}` (v1).
    pub fn build_update_user(&self, user: &User) -> Result<HttpRequest, ApiError> {
        let id = required(user.id.as_deref(), "id")?;
        let body = serde_json::to_string(user)?;
        Ok(self.request(HttpMethod::Put, format!("{USERS}/{id}"), ApiVersion::V1, Some(body)))
    }

    /// `PUT /users` (v2). The id travels in the body only.
    pub fn build_update_user_async(&self, user: &User) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(user)?;
        Ok(self.request(HttpMethod::Put, USERS.to_string(), ApiVersion::V2, Some(body)))
    }

    /// `POST /users/batch` (v1) with updates only.
    pub fn build_update_users_bulk(&self, users: &[User]) -> Result<HttpRequest, ApiError> {
        let payload = BatchPayload {
            updated: users,
            deleted: None,
        };
        self.json_request(HttpMethod::Post, USERS_BATCH.to_string(), ApiVersion::V1, &payload)
    }

    /// `POST /users/batch`, v1 answers per user, v2 answers with a task.
    pub fn build_batch_process(
        &self,
        update_list: &[User],
        delete_list: &[User],
        version: ApiVersion,
    ) -> Result<HttpRequest, ApiError> {
        let payload = BatchPayload {
            updated: update_list,
            deleted: Some(delete_list),
        };
        self.json_request(HttpMethod::Post, USERS_BATCH.to_string(), version, &payload)
    }

    /// `DELETE /users/{id}`, v1 synchronous or v2 task based.
    pub fn build_delete_user(&self, user: &User, version: ApiVersion) -> Result<HttpRequest, ApiError> {
        let id = required(user.id.as_deref(), "id")?;
        let body = serde_json::to_string(user)?;
        Ok(self.request(HttpMethod::Delete, format!("{USERS}/{id}"), version, Some(body)))
    }

    /// `DELETE /users/xngId/{xngId}` (v1).
    pub fn build_delete_user_by_xng_id(&self, user: &User) -> Result<HttpRequest, ApiError> {
        let xng_id = required(user.xng_id.as_deref(), "xngId")?;
        let body = serde_json::to_string(user)?;
        Ok(self.request(
            HttpMethod::Delete,
            format!("{USERS_BY_XNG_ID}/{xng_id}"),
            ApiVersion::V1,
            Some(body),
        ))
    }

    /// `POST /users/attributes` for a top-level attribute. The name gets the
    /// `traits.` prefix.
    pub fn build_add_user_attribute(
        &self,
        attribute_name: &str,
        attribute_type: AttributeType,
        nested_type: Option<AttributeType>,
    ) -> Result<HttpRequest, ApiError> {
        let payload = NewAttribute {
            name: format!("{TRAITS_PREFIX}{attribute_name}"),
            attribute_type,
            nested_type,
            parent_name: None,
        };
        self.json_request(HttpMethod::Post, USER_ATTRIBUTES.to_string(), ApiVersion::V1, &payload)
    }

    /// `POST /users/attributes` for an attribute nested under `parent_name`.
    /// The name is sent as given.
    pub fn build_add_nested_user_attribute(
        &self,
        parent_name: &str,
        attribute_name: &str,
        attribute_type: AttributeType,
    ) -> Result<HttpRequest, ApiError> {
        let payload = NewAttribute {
            name: attribute_name.to_string(),
            attribute_type,
            nested_type: None,
            parent_name: Some(parent_name),
        };
        self.json_request(HttpMethod::Post, USER_ATTRIBUTES.to_string(), ApiVersion::V1, &payload)
    }

    /// `GET /users/attributes?offset=..&limit=..` (v1).
    pub fn build_list_user_attributes(&self, offset: u64, limit: u64) -> HttpRequest {
        self.request(
            HttpMethod::Get,
            format!("{USER_ATTRIBUTES}?offset={offset}&limit={limit}"),
            ApiVersion::V1,
            None,
        )
    }

    /// `DELETE /users/attributes/{id}` (v1) with an empty JSON object body.
    pub fn build_delete_user_attribute(&self, attribute_id: u64) -> HttpRequest {
        self.request(
            HttpMethod::Delete,
            format!("{USER_ATTRIBUTES}/{attribute_id}"),
            ApiVersion::V1,
            Some("{}".to_string()),
        )
    }

    /// `POST /events` (v1).
    pub fn build_send_events(
        &self,
        events: &[Value],
        recipient: &EventRecipient,
    ) -> Result<HttpRequest, ApiError> {
        if recipient.email.is_none() && recipient.user_id.is_none() {
            return Err(ApiError::MissingRecipient);
        }
        let payload = EventsPayload {
            events,
            email: recipient.email.as_deref(),
            id: recipient.user_id.as_deref(),
            business_unit: recipient.business_unit.as_deref(),
        };
        self.json_request(HttpMethod::Post, EVENTS.to_string(), ApiVersion::V1, &payload)
    }

    /// `GET /users/track/{trackingId}` (v2).
    pub fn build_track_user_task(&self, tracking_id: &str) -> HttpRequest {
        self.request(
            HttpMethod::Get,
            format!("{USERS_TRACK}/{tracking_id}"),
            ApiVersion::V2,
            None,
        )
    }

    /// `GET /users/{id}/optout-status` (v1).
    pub fn build_get_user_opt_out_status(&self, user_id: &str) -> HttpRequest {
        self.request(
            HttpMethod::Get,
            format!("{USERS}/{user_id}/{OPT_OUT}"),
            ApiVersion::V1,
            None,
        )
    }

    /// `PUT /users/{id}/optout-status?channelType=..` (v1). `opt_out = false`
    /// opts the user back in.
    pub fn build_update_user_opt_out_status(
        &self,
        user_id: &str,
        channel: Channel,
        opt_out: bool,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(
            HttpMethod::Put,
            format!("{USERS}/{user_id}/{OPT_OUT}?channelType={}", channel.as_str()),
            ApiVersion::V1,
            &OptOutPayload { opt_out },
        )
    }

    fn json_request<T: Serialize>(
        &self,
        method: HttpMethod,
        path: String,
        version: ApiVersion,
        payload: &T,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(payload)?;
        Ok(self.request(method, path, version, Some(body)))
    }

    fn request(
        &self,
        method: HttpMethod,
        path: String,
        version: ApiVersion,
        body: Option<String>,
    ) -> HttpRequest {
        HttpRequest {
            method,
            url: format!("{}/{path}", self.config.base_url()),
            headers: self.config.headers_for(version),
            body,
        }
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ApiError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ApiError::MissingField(field)),
    }
}
