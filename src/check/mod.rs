//! Assertions on request and response contents.
//!
//! Every check reports through a [TestReporter](crate::TestReporter) instead of returning
//! its outcome, so handlers can run several checks on one request and have all mismatches
//! reported.
pub mod compare;
pub mod header;
pub mod json;
pub mod multipart;
pub mod query;
pub mod stream;

pub use compare::{normalize_expected, structural_diff};
pub use header::check_header;
pub use json::{check_json, check_json_request};
pub use multipart::{
    check_multipart, check_multipart_request, ExpectedFile, FILE_PART_PREFIX, PAYLOAD_JSON_PART,
};
pub use query::{check_query, check_request_query, parse_query, QueryMap};
pub use stream::compare_streams;
