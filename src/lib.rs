//! `chatmock` mocks a chat platform's HTTP API for testing API clients.
//!
//! A [Mocker] starts a local test server (HTTPS with a self-signed certificate by default).
//! Tests register one handler per request they expect the client under test to send. Each
//! handler serves exactly one request: handlers registered for the same path and method
//! are used in registration order. Handlers run checks on the request they receive and
//! answer with a canned response.
//!
//! Failures never surface as return values. They are reported to a [TestReporter], which
//! either records them and lets the test continue or aborts the test:
//! * requests for a path or method without a pending handler are recorded as failures,
//! * mismatching request bodies, queries and headers are recorded as failures,
//! * malformed request bodies abort the handler,
//! * handlers left over when the mocker is finalized (explicitly or on drop) are reported
//!   together, grouped by path and handler name.
//!
//! [TestContext] is the reporter to use in `#[test]` functions. It fails the test when it
//! goes out of scope with failures recorded.
//!
//! # Getting Started
//! ```
//! use chatmock::{check_json_request, response, Mocker, NullableString, TestContext};
//! use http::{Method, StatusCode};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Serialize, Deserialize)]
//! struct EditChannel {
//!     name: String,
//!     #[serde(default, skip_serializing_if = "Option::is_none")]
//!     topic: Option<NullableString>,
//! }
//!
//! let ctx = TestContext::new("edit channel");
//! let mocker = Mocker::start(ctx.clone());
//!
//! mocker.register("ModifyChannel", Method::PATCH, "/channels/1", |req, reporter| {
//!     let expected = EditChannel { name: "general".into(), topic: Some(NullableString::Null) };
//!     check_json_request(reporter, req, &expected);
//!     response::no_content()
//! });
//!
//! // The client under test would send this request.
//! let res = mocker
//!     .blocking_client()
//!     .patch(mocker.url("/channels/1"))
//!     .json(&json!({"name": "general", "topic": null}))
//!     .send()
//!     .unwrap();
//!
//! assert_eq!(res.status(), StatusCode::NO_CONTENT);
//! mocker.finalize();
//! ctx.assert_passed();
//! ```
//!
//! # Sub-tests
//! A mocker with a common setup can be [forked](Mocker::fork) for every sub-test. Forks run
//! their own server and consume their own copy of the handlers.
//!
//! # Configuration
//! [MockerBuilder] configures HTTPS, a base path prepended to every registered path, a
//! fixed port and an access log. HTTPS and the access log fall back to the environment
//! variables `CHATMOCK_HTTPS` and `CHATMOCK_ACCESS_LOG` when the builder leaves them
//! unset. The certificate additionally covers the names listed in `CHATMOCK_EXTRA_SANS`.
//!
//! # Logging
//! The crate logs through `tracing`. Without a subscriber, events are forwarded to the `log`
//! crate, so `env_logger` works as well.
//!
//! # Feature Flags
//! * `https` (default): serve HTTPS. Without it, the server only speaks plain HTTP.
pub use api::{pagination, response, Error, Mocker, MockerBuilder, ACCESS_LOG_ENV, HTTPS_ENV};
pub use check::{
    check_header, check_json, check_json_request, check_multipart, check_multipart_request,
    check_query, check_request_query, compare_streams, parse_query, ExpectedFile, QueryMap,
};
pub use common::{
    nullable::{Nullable, NullableBool, NullableInt, NullableString, NullableUint},
    reporter::{TestContext, TestReporter},
};
pub use server::{Handler, HandlerRegistry};

#[cfg(feature = "https")]
pub use server::tls::EXTRA_SANS_ENV;

mod api;
pub mod check;
mod common;
mod server;
