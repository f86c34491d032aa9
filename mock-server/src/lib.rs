//! In-memory imitation of the CrossEngage API.
//!
//! Covers the endpoints the client talks to, with the same status codes and
//! envelopes: `202` plus `trackingId` for version 2 calls, per-user
//! `updated`/`deleted` sections for batches, field-level `errors` lists for
//! validation failures. The user id `crash` makes `GET /users/{id}` fail with
//! a plain-text `500`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

pub const AUTH_HEADER: &str = "x-xng-authtoken";
pub const API_VERSION_HEADER: &str = "x-xng-apiversion";

/// User id that makes `GET /users/{id}` answer `500`.
pub const CRASH_USER_ID: &str = "crash";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub id: u64,
    pub name: String,
    pub attribute_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttribute {
    pub name: String,
    pub attribute_type: String,
    pub nested_type: Option<String>,
    pub parent_name: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Task {
    pub stage: &'static str,
    pub total: usize,
    pub success: usize,
    pub error: usize,
}

#[derive(Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub updated: Vec<Value>,
    #[serde(default)]
    pub deleted: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Events {
    pub events: Vec<Value>,
    pub email: Option<String>,
    pub id: Option<String>,
    pub business_unit: Option<String>,
}

#[derive(Deserialize)]
pub struct Page {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelQuery {
    pub channel_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptOut {
    pub opt_out: bool,
}

#[derive(Default)]
pub struct Store {
    users: HashMap<String, Map<String, Value>>,
    attributes: Vec<Attribute>,
    next_attribute_id: u64,
    tasks: HashMap<String, Task>,
    opt_outs: HashMap<String, BTreeSet<String>>,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/users", put(update_user_async))
        .route("/users/batch", post(batch))
        .route("/users/track/{tracking_id}", get(track_task))
        .route("/users/xngId/{xng_id}", delete(delete_user_by_xng_id))
        .route("/users/attributes", get(list_attributes).post(create_attribute))
        .route("/users/attributes/{id}", delete(delete_attribute))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/users/{id}/optout-status", get(get_opt_out).put(update_opt_out))
        .route("/events", post(send_events))
        .layer(middleware::from_fn(require_token))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_token(request: Request, next: Next) -> Response {
    if request.headers().contains_key(AUTH_HEADER) {
        return next.run(request).await;
    }
    rejection(
        StatusCode::UNAUTHORIZED,
        vec![field_error("X-XNG-AuthToken", "MISSING")],
    )
}

fn is_v2(headers: &HeaderMap) -> bool {
    headers
        .get(API_VERSION_HEADER)
        .and_then(|value| value.to_str().ok())
        == Some("2")
}

fn field_error(field: &str, kind: &str) -> Value {
    json!({ "field": field, "type": kind })
}

fn rejection(status: StatusCode, errors: Vec<Value>) -> Response {
    (status, Json(json!({ "success": false, "errors": errors }))).into_response()
}

fn accepted(tracking_id: String) -> Response {
    (StatusCode::ACCEPTED, Json(json!({ "trackingId": tracking_id }))).into_response()
}

fn validate_user(user: &Map<String, Value>) -> Vec<Value> {
    let mut errors = Vec::new();
    match user.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => {}
        _ => errors.push(field_error("id", "NOT_NULL")),
    }
    if let Some(email) = user.get("email") {
        if !email.as_str().is_some_and(|email| email.contains('@')) {
            errors.push(field_error("email", "WRONG_FORMAT"));
        }
    }
    errors
}

impl Store {
    /// Insert or merge a valid user, returning its `xngId`.
    fn upsert(&mut self, mut user: Map<String, Value>) -> String {
        let id = user
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let xng_id = self
            .users
            .get(&id)
            .and_then(|existing| existing.get("xngId"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        user.insert("xngId".to_string(), Value::String(xng_id.clone()));
        match self.users.get_mut(&id) {
            Some(existing) => existing.extend(user),
            None => {
                self.users.insert(id, user);
            }
        }
        xng_id
    }

    fn record_task(&mut self, total: usize, success: usize) -> String {
        let tracking_id = Uuid::new_v4().to_string();
        self.tasks.insert(
            tracking_id.clone(),
            Task {
                stage: "PROCESSED",
                total,
                success,
                error: total - success,
            },
        );
        debug!(%tracking_id, total, success, "task recorded");
        tracking_id
    }

    /// Apply one batch entry, returning its per-user report.
    fn apply_update(&mut self, user: Value) -> Value {
        let Value::Object(user) = user else {
            return json!({ "success": false, "errors": [field_error("id", "NOT_NULL")] });
        };
        let id = user.get("id").cloned().unwrap_or(Value::Null);
        let errors = validate_user(&user);
        if !errors.is_empty() {
            return json!({ "id": id, "success": false, "errors": errors });
        }
        let xng_id = self.upsert(user);
        json!({ "id": id, "xngId": xng_id, "success": true })
    }

    fn apply_delete(&mut self, user: Value) -> Value {
        let id = user.get("id").and_then(Value::as_str).unwrap_or_default();
        match self.users.remove(id) {
            Some(removed) => {
                json!({ "id": id, "xngId": removed.get("xngId"), "success": true })
            }
            None => json!({
                "id": id,
                "success": false,
                "errors": [field_error("id", "NOT_FOUND")]
            }),
        }
    }
}

async fn get_user(State(db): State<Db>, Path(id): Path<String>) -> Response {
    if id == CRASH_USER_ID {
        return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
    }
    let store = db.read().await;
    match store.users.get(&id) {
        Some(user) => Json(user.clone()).into_response(),
        None => rejection(StatusCode::NOT_FOUND, vec![field_error("id", "NOT_FOUND")]),
    }
}

async fn update_user(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(mut user): Json<Map<String, Value>>,
) -> Response {
    user.insert("id".to_string(), Value::String(id.clone()));
    let errors = validate_user(&user);
    if !errors.is_empty() {
        return rejection(StatusCode::BAD_REQUEST, errors);
    }
    let xng_id = db.write().await.upsert(user);
    Json(json!({ "id": id, "xngId": xng_id, "success": true })).into_response()
}

async fn update_user_async(State(db): State<Db>, Json(user): Json<Map<String, Value>>) -> Response {
    let errors = validate_user(&user);
    if !errors.is_empty() {
        return rejection(StatusCode::BAD_REQUEST, errors);
    }
    let mut store = db.write().await;
    store.upsert(user);
    accepted(store.record_task(1, 1))
}

async fn delete_user(State(db): State<Db>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut store = db.write().await;
    let removed = store.users.remove(&id).is_some();
    if is_v2(&headers) {
        return accepted(store.record_task(1, usize::from(removed)));
    }
    if removed {
        StatusCode::NO_CONTENT.into_response()
    } else {
        rejection(StatusCode::NOT_FOUND, vec![field_error("id", "NOT_FOUND")])
    }
}

async fn delete_user_by_xng_id(State(db): State<Db>, Path(xng_id): Path<String>) -> Response {
    let mut store = db.write().await;
    let id = store
        .users
        .iter()
        .find(|(_, user)| user.get("xngId").and_then(Value::as_str) == Some(xng_id.as_str()))
        .map(|(id, _)| id.clone());
    match id {
        Some(id) => {
            store.users.remove(&id);
            StatusCode::NO_CONTENT.into_response()
        }
        None => rejection(StatusCode::NOT_FOUND, vec![field_error("xngId", "NOT_FOUND")]),
    }
}

async fn batch(State(db): State<Db>, headers: HeaderMap, Json(batch): Json<Batch>) -> Response {
    let mut store = db.write().await;
    let updated: Vec<Value> = batch
        .updated
        .into_iter()
        .map(|user| store.apply_update(user))
        .collect();
    let deleted: Vec<Value> = batch
        .deleted
        .into_iter()
        .map(|user| store.apply_delete(user))
        .collect();

    let total = updated.len() + deleted.len();
    let succeeded = updated
        .iter()
        .chain(deleted.iter())
        .filter(|report| report["success"] == true)
        .count();

    if is_v2(&headers) {
        return accepted(store.record_task(total, succeeded));
    }
    let status = if succeeded == total {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(json!({ "updated": updated, "deleted": deleted }))).into_response()
}

async fn track_task(State(db): State<Db>, Path(tracking_id): Path<String>) -> Response {
    let store = db.read().await;
    match store.tasks.get(&tracking_id) {
        Some(task) => Json(task.clone()).into_response(),
        None => rejection(
            StatusCode::NOT_FOUND,
            vec![field_error("trackingId", "NOT_FOUND")],
        ),
    }
}

async fn create_attribute(State(db): State<Db>, Json(input): Json<NewAttribute>) -> Response {
    let mut store = db.write().await;
    if store.attributes.iter().any(|a| a.name == input.name) {
        return rejection(StatusCode::CONFLICT, vec![field_error("name", "DUPLICATE")]);
    }
    store.next_attribute_id += 1;
    let attribute = Attribute {
        id: store.next_attribute_id,
        name: input.name,
        attribute_type: input.attribute_type,
        nested_type: input.nested_type,
        parent_name: input.parent_name,
    };
    store.attributes.push(attribute.clone());
    (
        StatusCode::CREATED,
        Json(json!({
            "id": attribute.id,
            "name": attribute.name,
            "attributeType": attribute.attribute_type,
            "success": true
        })),
    )
        .into_response()
}

async fn list_attributes(State(db): State<Db>, Query(page): Query<Page>) -> Json<Value> {
    let store = db.read().await;
    let attributes: Vec<&Attribute> = store
        .attributes
        .iter()
        .skip(page.offset)
        .take(page.limit)
        .collect();
    Json(json!({ "attributes": attributes, "total": store.attributes.len() }))
}

async fn delete_attribute(State(db): State<Db>, Path(id): Path<u64>) -> Response {
    let mut store = db.write().await;
    let before = store.attributes.len();
    store.attributes.retain(|a| a.id != id);
    if store.attributes.len() < before {
        StatusCode::NO_CONTENT.into_response()
    } else {
        rejection(StatusCode::NOT_FOUND, vec![field_error("id", "NOT_FOUND")])
    }
}

async fn send_events(Json(input): Json<Events>) -> Response {
    if input.email.is_none() && input.id.is_none() {
        return rejection(StatusCode::BAD_REQUEST, vec![field_error("id", "NOT_NULL")]);
    }
    debug!(
        events = input.events.len(),
        business_unit = input.business_unit.as_deref().unwrap_or("-"),
        "events received"
    );
    Json(json!({ "success": true })).into_response()
}

async fn get_opt_out(State(db): State<Db>, Path(id): Path<String>) -> Json<Value> {
    let store = db.read().await;
    let opted_out = store.opt_outs.get(&id).is_some_and(|channels| !channels.is_empty());
    Json(json!({ "optOut": opted_out }))
}

async fn update_opt_out(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(query): Query<ChannelQuery>,
    Json(input): Json<OptOut>,
) -> Response {
    let Some(channel) = query.channel_type else {
        return rejection(
            StatusCode::BAD_REQUEST,
            vec![field_error("channelType", "NOT_NULL")],
        );
    };
    let mut store = db.write().await;
    let channels = store.opt_outs.entry(id).or_default();
    if input.opt_out {
        channels.insert(channel);
    } else {
        channels.remove(&channel);
    }
    Json(json!({ "optOut": input.opt_out })).into_response()
}
