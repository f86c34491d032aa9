//! Verify request building and normalization against JSON test vectors stored
//! in `test-vectors/`.
//!
//! Each vector file lists inputs and the expected outcome. Comparing parsed
//! JSON (not raw strings) avoids false negatives from field ordering.

use crossengage_core::{
    ApiVersion, AttributeType, Channel, ClientConfig, Endpoints, EventRecipient, HttpMethod,
    HttpRequest, HttpResponse, NormalizedResult, RawPair, TransportError, User,
};
use serde_json::Value;

const BASE_URL: &str = "http://localhost:3000";
const TOKEN: &str = "SOME_TOKEN";

fn endpoints() -> Endpoints {
    Endpoints::new(ClientConfig::with_base_url(TOKEN, BASE_URL))
}

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

/// A vector case is either a received response or a transport failure.
fn outcome(case: &Value) -> Result<HttpResponse, TransportError> {
    if let Some(error) = case.get("transport_error") {
        let message = error["message"].as_str().unwrap().to_string();
        return match error["kind"].as_str().unwrap() {
            "connection" => Err(TransportError::Connection(message)),
            "other" => Err(TransportError::Other(message)),
            other => panic!("unknown transport error kind: {other}"),
        };
    }
    let response = &case["response"];
    Ok(HttpResponse::new(
        response["status"].as_u64().unwrap() as u16,
        response["body"].as_str().unwrap(),
    ))
}

fn user(value: &Value) -> User {
    serde_json::from_value(value.clone()).unwrap()
}

fn users(value: &Value) -> Vec<User> {
    serde_json::from_value(value.clone()).unwrap()
}

fn build(e: &Endpoints, operation: &str, input: &Value) -> HttpRequest {
    match operation {
        "update_user" => e.build_update_user(&user(&input["user"])).unwrap(),
        "get_user" => e.build_get_user(&user(&input["user"])).unwrap(),
        "update_user_async" => e.build_update_user_async(&user(&input["user"])).unwrap(),
        "batch_process" => e
            .build_batch_process(
                &users(&input["update_list"]),
                &users(&input["delete_list"]),
                ApiVersion::V1,
            )
            .unwrap(),
        "delete_user_by_xng_id" => e.build_delete_user_by_xng_id(&user(&input["user"])).unwrap(),
        "add_user_attribute" => {
            let attribute_type: AttributeType =
                serde_json::from_value(input["attribute_type"].clone()).unwrap();
            let nested_type: Option<AttributeType> =
                serde_json::from_value(input["nested_type"].clone()).unwrap();
            e.build_add_user_attribute(input["name"].as_str().unwrap(), attribute_type, nested_type)
                .unwrap()
        }
        "list_user_attributes" => e.build_list_user_attributes(
            input["offset"].as_u64().unwrap(),
            input["limit"].as_u64().unwrap(),
        ),
        "send_events" => {
            let events: Vec<Value> = serde_json::from_value(input["events"].clone()).unwrap();
            let recipient = EventRecipient {
                email: input["email"].as_str().map(str::to_string),
                user_id: input["user_id"].as_str().map(str::to_string),
                business_unit: input["business_unit"].as_str().map(str::to_string),
            };
            e.build_send_events(&events, &recipient).unwrap()
        }
        "update_user_opt_in_status" => {
            let channel: Channel = serde_json::from_value(input["channel"].clone()).unwrap();
            e.build_update_user_opt_out_status(input["user_id"].as_str().unwrap(), channel, false)
                .unwrap()
        }
        other => panic!("unknown operation: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[test]
fn request_test_vectors() {
    let raw = include_str!("../../test-vectors/requests.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    let e = endpoints();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let expected = &case["expected_request"];
        let req = build(&e, case["operation"].as_str().unwrap(), &case["input"]);

        assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.url, format!("{BASE_URL}{}", expected["path"].as_str().unwrap()), "{name}: url");
        assert_eq!(req.header("X-XNG-AuthToken"), Some(TOKEN), "{name}: token");
        assert_eq!(
            req.header("X-XNG-ApiVersion"),
            expected["version"].as_str(),
            "{name}: version"
        );
        assert_eq!(req.header("Content-Type"), Some("application/json"), "{name}: content type");

        let body: Value = match req.body.as_deref() {
            Some(body) => serde_json::from_str(body).unwrap(),
            None => Value::Null,
        };
        assert_eq!(body, expected["body"], "{name}: body");
    }
}

// ---------------------------------------------------------------------------
// Normalized results
// ---------------------------------------------------------------------------

#[test]
fn normalize_test_vectors() {
    let raw = include_str!("../../test-vectors/normalize.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let result = NormalizedResult::from_outcome(outcome(case));
        assert_eq!(result.to_value(), case["expected"], "{name}");
    }
}

// ---------------------------------------------------------------------------
// Raw pairs
// ---------------------------------------------------------------------------

#[test]
fn raw_pair_test_vectors() {
    let raw = include_str!("../../test-vectors/raw_pair.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let expected = &case["expected"];
        let pair = RawPair::from_outcome(outcome(case));
        assert_eq!(
            u64::from(pair.status_code),
            expected["status_code"].as_u64().unwrap(),
            "{name}: status"
        );
        assert_eq!(pair.body.unwrap_or(Value::Null), expected["body"], "{name}: body");
    }
}
