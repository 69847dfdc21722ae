use crate::{
    check::compare::{compare, Error},
    common::reporter::TestReporter,
};
use bytes::Bytes;
use http::Request;
use serde::{de::DeserializeOwned, Serialize};
use std::io::Read;

/// Decodes `body` as JSON into a fresh `T` and checks it against `expected`.
///
/// Works for request and response bodies alike. Fields of `expected` holding
/// `Some(Nullable::Null)` match fields that were sent as `null` as well as fields that were
/// omitted, see [normalize_expected](crate::check::normalize_expected).
///
/// A body that cannot be decoded into `T` aborts via
/// [fail_now](TestReporter::fail_now); a value mismatch is recorded via
/// [fail](TestReporter::fail).
///
/// **Example**:
/// ```
/// use chatmock::{check_json, TestContext, TestReporter};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct CreateMessage {
///     content: String,
/// }
///
/// let ctx = TestContext::new("doc");
/// let expected = CreateMessage { content: "hello".into() };
///
/// check_json(&ctx, &br#"{"content":"hello"}"#[..], &expected);
/// assert!(!ctx.has_failed());
/// ```
pub fn check_json<T, R>(reporter: &dyn TestReporter, body: R, expected: &T)
where
    T: Serialize + DeserializeOwned,
    R: Read,
{
    let actual: T = match serde_json::from_reader(body) {
        Ok(value) => value,
        Err(err) => reporter.fail_now(format!("cannot decode JSON body: {}", err)),
    };

    match compare(expected, &actual) {
        Ok(()) => {}
        Err(err @ Error::Mismatch(_)) => {
            reporter.fail(format!("JSON body does not match the expected value: {}", err))
        }
        Err(err) => reporter.fail_now(format!("cannot compare JSON body: {}", err)),
    }
}

/// Runs [check_json] on the body of a buffered request.
pub fn check_json_request<T>(reporter: &dyn TestReporter, req: &Request<Bytes>, expected: &T)
where
    T: Serialize + DeserializeOwned,
{
    check_json(reporter, req.body().as_ref(), expected)
}
