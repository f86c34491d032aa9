//! Blocking client for the CrossEngage customer-data API.
//!
//! # Overview
//! Maps method calls onto HTTP requests: user records, user attribute
//! schema, events, bulk operations, task tracking and opt-out status. Each
//! operation issues exactly one request and returns a uniform result.
//!
//! # Design
//! - `Endpoints` builds `HttpRequest` values without touching the network.
//! - A `Transport` executes them; `UreqTransport` is the default.
//! - The normalizer folds every outcome (connection failure, error status,
//!   unreadable body) into a `NormalizedResult`, or a `RawPair` for the bulk
//!   and tracking endpoints. Only `send_events` returns an `Err`, for a
//!   missing recipient.
//! - `CrossengageClient` holds only immutable configuration, so a single
//!   instance can be shared across threads.

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod normalize;
pub mod transport;
pub mod types;

pub use client::CrossengageClient;
pub use config::{ApiVersion, ClientConfig};
pub use endpoints::Endpoints;
pub use error::{ApiError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use normalize::{NormalizedResult, RawPair, ResultError};
pub use transport::{Transport, UreqTransport};
pub use types::{AttributeType, Channel, EventRecipient, User};
