//! Blocking client for the CrossEngage API.
//!
//! # Design
//! `CrossengageClient` owns an immutable `Endpoints` builder and a
//! `Transport`. Every operation builds a request as a local value, sends it
//! exactly once and hands the outcome to the normalizer, so one client can
//! be shared between threads. Nothing here retries.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ApiVersion, ClientConfig};
use crate::endpoints::Endpoints;
use crate::error::{ApiError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::normalize::{NormalizedResult, RawPair, ResultError};
use crate::transport::{Transport, UreqTransport};
use crate::types::{AttributeType, Channel, EventRecipient, User};

/// Client for the CrossEngage public API.
///
/// ```no_run
/// use crossengage_core::{CrossengageClient, User};
///
/// let client = CrossengageClient::new("token");
/// let user = User {
///     email: Some("jane@example.com".to_string()),
///     ..User::with_id("1")
/// };
/// let result = client.update_user(&user);
/// if !result.success() {
///     eprintln!("{:?}", result.errors());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CrossengageClient<T = UreqTransport> {
    endpoints: Endpoints,
    transport: T,
}

impl CrossengageClient<UreqTransport> {
    /// Client for the production API.
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_transport(ClientConfig::new(token), UreqTransport::new())
    }

    /// Client for another API root.
    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Self {
        Self::with_transport(
            ClientConfig::with_base_url(token, base_url),
            UreqTransport::new(),
        )
    }
}

impl<T: Transport> CrossengageClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            endpoints: Endpoints::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.endpoints.config()
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Fetch a user by `id`. The user's fields are merged into the result.
    pub fn get_user(&self, user: &User) -> NormalizedResult {
        self.execute(self.endpoints.build_get_user(user))
    }

    /// Create or update the user keyed by `user.id`.
    pub fn update_user(&self, user: &User) -> NormalizedResult {
        self.execute(self.endpoints.build_update_user(user))
    }

    /// Create or update a user as a background task; answers `202` with a
    /// `trackingId`.
    pub fn update_user_async(&self, user: &User) -> NormalizedResult {
        self.execute(self.endpoints.build_update_user_async(user))
    }

    /// Create or update many users in one call.
    #[deprecated(note = "use `batch_process`, which also supports deletions")]
    pub fn update_users_bulk(&self, users: &[User]) -> NormalizedResult {
        self.execute(self.endpoints.build_update_users_bulk(users))
    }

    /// Update and delete up to 1000 users in one call. The server reports
    /// per user under `updated` and `deleted`; that envelope is returned as is.
    pub fn batch_process(&self, update_list: &[User], delete_list: &[User]) -> RawPair {
        self.execute_raw(
            self.endpoints
                .build_batch_process(update_list, delete_list, ApiVersion::V1),
        )
    }

    /// Like `batch_process`, but as a background task; answers `202` with a
    /// `trackingId`.
    pub fn batch_process_async(&self, update_list: &[User], delete_list: &[User]) -> RawPair {
        self.execute_raw(
            self.endpoints
                .build_batch_process(update_list, delete_list, ApiVersion::V2),
        )
    }

    pub fn delete_user(&self, user: &User) -> NormalizedResult {
        self.execute(self.endpoints.build_delete_user(user, ApiVersion::V1))
    }

    /// Delete a user as a background task; answers `202` with a `trackingId`.
    pub fn delete_user_async(&self, user: &User) -> NormalizedResult {
        self.execute(self.endpoints.build_delete_user(user, ApiVersion::V2))
    }

    /// Delete the user identified by `user.xng_id`.
    pub fn delete_user_by_xng_id(&self, user: &User) -> NormalizedResult {
        self.execute(self.endpoints.build_delete_user_by_xng_id(user))
    }

    /// Register a custom attribute; it is created as `traits.<name>`.
    pub fn add_user_attribute(
        &self,
        attribute_name: &str,
        attribute_type: AttributeType,
        nested_type: Option<AttributeType>,
    ) -> NormalizedResult {
        self.execute(self.endpoints.build_add_user_attribute(
            attribute_name,
            attribute_type,
            nested_type,
        ))
    }

    pub fn add_nested_user_attribute(
        &self,
        parent_name: &str,
        attribute_name: &str,
        attribute_type: AttributeType,
    ) -> NormalizedResult {
        self.execute(self.endpoints.build_add_nested_user_attribute(
            parent_name,
            attribute_name,
            attribute_type,
        ))
    }

    /// One page of attribute definitions: `attributes` and `total`.
    pub fn list_user_attributes(&self, offset: u64, limit: u64) -> NormalizedResult {
        self.dispatch(&self.endpoints.build_list_user_attributes(offset, limit))
    }

    pub fn delete_user_attribute(&self, attribute_id: u64) -> NormalizedResult {
        self.dispatch(&self.endpoints.build_delete_user_attribute(attribute_id))
    }

    /// Send events for one user.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::MissingRecipient` without sending anything when the
    /// recipient has neither an email nor a user id. Every other failure is
    /// reported inside the `NormalizedResult`.
    pub fn send_events(
        &self,
        events: &[Value],
        recipient: &EventRecipient,
    ) -> Result<NormalizedResult, ApiError> {
        match self.endpoints.build_send_events(events, recipient) {
            Err(ApiError::MissingRecipient) => Err(ApiError::MissingRecipient),
            built => Ok(self.execute(built)),
        }
    }

    /// Poll a background task. The body is `None` when it is not JSON.
    pub fn track_user_task(&self, tracking_id: &str) -> RawPair {
        self.execute_raw(Ok(self.endpoints.build_track_user_task(tracking_id)))
    }

    pub fn get_user_opt_out_status(&self, user_id: &str) -> NormalizedResult {
        self.dispatch(&self.endpoints.build_get_user_opt_out_status(user_id))
    }

    /// Opt the user out of `channel`.
    pub fn update_user_opt_out_status(&self, user_id: &str, channel: Channel) -> NormalizedResult {
        self.execute(
            self.endpoints
                .build_update_user_opt_out_status(user_id, channel, true),
        )
    }

    /// Opt the user back into `channel`.
    pub fn update_user_opt_in_status(&self, user_id: &str, channel: Channel) -> NormalizedResult {
        self.execute(
            self.endpoints
                .build_update_user_opt_out_status(user_id, channel, false),
        )
    }

    fn execute(&self, built: Result<HttpRequest, ApiError>) -> NormalizedResult {
        match built {
            Ok(request) => self.dispatch(&request),
            Err(e) => {
                warn!(error = %e, "request not sent");
                NormalizedResult::failure(ResultError::Client(e.to_string()))
            }
        }
    }

    fn dispatch(&self, request: &HttpRequest) -> NormalizedResult {
        NormalizedResult::from_outcome(self.send(request))
    }

    fn execute_raw(&self, built: Result<HttpRequest, ApiError>) -> RawPair {
        match built {
            Ok(request) => RawPair::from_outcome(self.send(&request)),
            Err(e) => {
                warn!(error = %e, "request not sent");
                RawPair::failure(ResultError::Client(e.to_string()))
            }
        }
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(
            method = %request.method,
            url = %request.url,
            body_len = request.body.as_ref().map_or(0, String::len),
            "sending crossengage request"
        );
        let outcome = self.transport.send(request);
        match &outcome {
            Ok(response) => debug!(
                method = %request.method,
                url = %request.url,
                status = response.status,
                content_type = response.header("content-type").unwrap_or("-"),
                "crossengage response received"
            ),
            Err(e) => warn!(
                method = %request.method,
                url = %request.url,
                error = %e,
                "crossengage request failed"
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::http::HttpMethod;
    use crate::normalize::SERVER_ERROR_MESSAGE;

    type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

    /// Records every request and answers with `responder`.
    struct RecordingTransport {
        requests: Mutex<Vec<HttpRequest>>,
        responder: Responder,
    }

    impl RecordingTransport {
        fn new(
            responder: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        fn replying(status: u16, body: &'static str) -> Self {
            Self::new(move |_| Ok(HttpResponse::new(status, body)))
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.responder)(request)
        }
    }

    fn client(transport: &RecordingTransport) -> CrossengageClient<&RecordingTransport> {
        CrossengageClient::with_transport(ClientConfig::new("SOME_TOKEN"), transport)
    }

    fn sample_user() -> User {
        User {
            email: Some("e@x.com".to_string()),
            first_name: Some("Firstname".to_string()),
            ..User::with_id("1234")
        }
    }

    /// Every operation that yields a `NormalizedResult`.
    fn all_normalized(client: &CrossengageClient<&RecordingTransport>) -> Vec<NormalizedResult> {
        let user = User {
            xng_id: Some("x-1".to_string()),
            ..sample_user()
        };
        #[allow(deprecated)]
        let bulk = client.update_users_bulk(std::slice::from_ref(&user));
        vec![
            client.get_user(&user),
            client.update_user(&user),
            client.update_user_async(&user),
            bulk,
            client.delete_user(&user),
            client.delete_user_async(&user),
            client.delete_user_by_xng_id(&user),
            client.add_user_attribute("a", AttributeType::Array, Some(AttributeType::String)),
            client.add_nested_user_attribute("p", "a", AttributeType::String),
            client.list_user_attributes(0, 10),
            client.delete_user_attribute(1),
            client
                .send_events(&[json!({"foo": "bar"})], &EventRecipient::email("e@x.com"))
                .unwrap(),
            client.get_user_opt_out_status("1234"),
            client.update_user_opt_out_status("1234", Channel::Mail),
            client.update_user_opt_in_status("1234", Channel::Mail),
        ]
    }

    #[test]
    fn update_user_round_trip() {
        let transport = RecordingTransport::replying(
            200,
            r#"{"id":"1234","xngGlobalUserId":"xng-id","success":true}"#,
        );
        let user = sample_user();
        let result = client(&transport).update_user(&user);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let sent = &requests[0];
        assert_eq!(sent.method, HttpMethod::Put);
        assert_eq!(sent.url, "https://api.crossengage.io/users/1234");
        assert_eq!(sent.header("X-XNG-ApiVersion"), Some("1"));
        let sent_body: Value = serde_json::from_str(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent_body, serde_json::to_value(&user).unwrap());

        assert!(result.success());
        assert_eq!(result.status_code(), 200);
        assert_eq!(result.get("xngGlobalUserId").unwrap(), "xng-id");
    }

    #[test]
    fn get_user_merges_user_fields() {
        let transport = RecordingTransport::replying(
            200,
            r#"{"id":"1234","email":"e@x.com","xngId":"123e4567"}"#,
        );
        let result = client(&transport).get_user(&User::with_id("1234"));
        assert_eq!(
            result.to_value(),
            json!({
                "id": "1234",
                "email": "e@x.com",
                "xngId": "123e4567",
                "status_code": 200,
                "success": true
            })
        );
        assert_eq!(transport.requests()[0].header("X-XNG-ApiVersion"), Some("2"));
    }

    #[test]
    fn connection_failure_on_every_operation() {
        let transport = RecordingTransport::new(|_| {
            Err(TransportError::Connection("connection refused".to_string()))
        });
        let client = client(&transport);

        let results = all_normalized(&client);
        assert_eq!(transport.requests().len(), results.len());
        for result in results {
            assert_eq!(
                result.to_value(),
                json!({
                    "status_code": 0,
                    "success": false,
                    "errors": {"connection_error": "connection refused"}
                })
            );
        }

        let pair = client.batch_process(&[], &[]);
        assert_eq!(pair.status_code, 0);
        let pair = client.track_user_task("t-1");
        assert_eq!(pair.status_code, 0);
    }

    #[test]
    fn server_error_on_every_operation() {
        let transport = RecordingTransport::replying(500, r#"{"success":true,"id":"leak"}"#);
        for result in all_normalized(&client(&transport)) {
            assert!(!result.success());
            assert_eq!(result.status_code(), 500);
            assert_eq!(
                result.errors(),
                Some(&ResultError::Server(SERVER_ERROR_MESSAGE.to_string()))
            );
            assert!(result.get("id").is_none());
        }
    }

    #[test]
    fn delete_with_no_content() {
        let transport = RecordingTransport::replying(204, "");
        let client = client(&transport);

        for result in [
            client.delete_user(&User::with_id("1")),
            client.delete_user_by_xng_id(&User::with_xng_id("1")),
            client.delete_user_attribute(7),
        ] {
            assert_eq!(result.status_code(), 204);
            assert!(result.success());
            assert!(result.errors().is_none());
        }
        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://api.crossengage.io/users/1",
                "https://api.crossengage.io/users/xngId/1",
                "https://api.crossengage.io/users/attributes/7",
            ]
        );
    }

    #[test]
    fn bad_request_passes_server_errors_through() {
        let transport = RecordingTransport::replying(
            400,
            r#"{"success":false,"errors":[{"field":"email","type":"WRONG_FORMAT"}]}"#,
        );
        let result = client(&transport).update_user(&sample_user());
        assert!(!result.success());
        assert_eq!(result.status_code(), 400);
        assert_eq!(
            result.to_value()["errors"],
            json!([{"field":"email","type":"WRONG_FORMAT"}])
        );
    }

    #[test]
    fn missing_id_is_reported_without_a_request() {
        let transport = RecordingTransport::replying(200, "{}");
        let client = client(&transport);

        let results = [
            client.get_user(&User::default()),
            client.update_user(&User::default()),
            client.delete_user(&User::default()),
            client.delete_user_async(&User::default()),
            client.delete_user_by_xng_id(&User::with_id("1")),
        ];
        assert!(transport.requests().is_empty());
        for result in results {
            assert_eq!(result.status_code(), 0);
            assert!(!result.success());
            match result.errors() {
                Some(ResultError::Client(message)) => {
                    assert!(message.starts_with("missing required field"))
                }
                other => panic!("unexpected errors: {other:?}"),
            }
        }
    }

    #[test]
    fn send_events_without_recipient_sends_nothing() {
        let transport = RecordingTransport::replying(200, r#"{"success":true}"#);
        let err = client(&transport)
            .send_events(&[json!({"foo": "bar"})], &EventRecipient::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingRecipient));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn batch_process_returns_raw_pair() {
        let transport = RecordingTransport::replying(
            400,
            r#"{"updated":[{"id":"u1","success":false,"errors":[{"field":"id","type":"NOT_NULL"}]}],"deleted":[]}"#,
        );
        let u1 = User::with_id("u1");
        let u2 = User::with_id("u2");
        let pair = client(&transport).batch_process(&[u1], &[u2]);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "https://api.crossengage.io/users/batch");
        assert_eq!(requests[0].header("X-XNG-ApiVersion"), Some("1"));
        let sent: Value = serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({"updated": [{"id": "u1"}], "deleted": [{"id": "u2"}]}));

        assert_eq!(pair.status_code, 400);
        let body = pair.body.unwrap();
        assert_eq!(body["updated"][0]["success"], false);
        assert!(body.get("success").is_none());
    }

    #[test]
    fn batch_process_async_is_accepted() {
        let transport = RecordingTransport::replying(202, r#"{"trackingId":"t-1"}"#);
        let pair = client(&transport).batch_process_async(&[User::with_id("u1")], &[]);
        assert_eq!(pair.status_code, 202);
        assert_eq!(pair.body, Some(json!({"trackingId": "t-1"})));
        assert_eq!(transport.requests()[0].header("X-XNG-ApiVersion"), Some("2"));
    }

    #[test]
    fn batch_process_keeps_500_body() {
        let transport = RecordingTransport::replying(500, r#"{"message":"boom"}"#);
        let pair = client(&transport).batch_process(&[], &[]);
        assert_eq!(pair.status_code, 500);
        assert_eq!(pair.body, Some(json!({"message": "boom"})));
    }

    #[test]
    fn track_user_task_with_undecodable_body() {
        let transport = RecordingTransport::replying(200, "<html></html>");
        let pair = client(&transport).track_user_task("t-1");
        assert_eq!(pair.status_code, 200);
        assert!(pair.body.is_none());
        assert_eq!(
            transport.requests()[0].url,
            "https://api.crossengage.io/users/track/t-1"
        );
    }

    #[test]
    fn async_update_is_accepted_with_tracking_id() {
        let transport = RecordingTransport::replying(202, r#"{"trackingId":"t-9"}"#);
        let result = client(&transport).update_user_async(&sample_user());
        assert!(result.success());
        assert_eq!(result.status_code(), 202);
        assert_eq!(result.get("trackingId").unwrap(), "t-9");
    }

    #[test]
    fn opt_in_and_opt_out() {
        let transport = RecordingTransport::new(|request| {
            let body = request.body.clone().unwrap_or_else(|| r#"{"optOut":false}"#.to_string());
            Ok(HttpResponse::new(200, body))
        });
        let client = client(&transport);

        let result = client.update_user_opt_out_status("1234", Channel::PushNotification);
        assert_eq!(result.get("optOut"), Some(&Value::Bool(true)));
        let result = client.update_user_opt_in_status("1234", Channel::PushNotification);
        assert_eq!(result.get("optOut"), Some(&Value::Bool(false)));
        let result = client.get_user_opt_out_status("1234");
        assert_eq!(result.get("optOut"), Some(&Value::Bool(false)));

        let requests = transport.requests();
        assert_eq!(
            requests[0].url,
            "https://api.crossengage.io/users/1234/optout-status?channelType=PUSH_NOTIFICATION"
        );
        assert_eq!(requests[2].method, HttpMethod::Get);
    }

    #[test]
    fn shared_client_builds_requests_independently() {
        let transport = RecordingTransport::replying(200, "{}");
        let client = client(&transport);

        std::thread::scope(|scope| {
            for i in 0..8 {
                let client = &client;
                scope.spawn(move || {
                    let result = client.update_user(&User::with_id(i.to_string()));
                    assert!(result.success());
                });
            }
        });

        let mut urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        urls.sort();
        let mut expected: Vec<String> = (0..8)
            .map(|i| format!("https://api.crossengage.io/users/{i}"))
            .collect();
        expected.sort();
        assert_eq!(urls, expected);
    }
}
