use crate::{
    check::{
        json::check_json,
        stream::{compare_streams, Error as StreamError},
    },
    common::{
        multipart::{parse_boundary, MultipartReader, Part},
        reporter::TestReporter,
    },
};
use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderMap, Request};
use serde::{de::DeserializeOwned, Serialize};

/// Name of the part carrying the JSON payload of a multipart request.
pub const PAYLOAD_JSON_PART: &str = "payload_json";

/// Prefix of the parts carrying files; the file index follows it (`file0`, `file1`, ...).
pub const FILE_PART_PREFIX: &str = "file";

const JSON_CONTENT_TYPE: &str = "application/json";

/// A file that is expected to be uploaded as part of a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    /// The expected filename of the part.
    pub name: String,
    /// The expected content of the part.
    pub content: Bytes,
}

impl ExpectedFile {
    pub fn new<S: Into<String>, B: Into<Bytes>>(name: S, content: B) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Checks a `multipart/form-data` body.
///
/// Parts are processed in arrival order:
/// - `payload_json` is checked with [check_json](crate::check_json) against
///   `expected_json` and, if it declares a content type, must be `application/json`;
///   receiving it when no JSON is expected is a failure,
/// - `file<N>` must refer to an entry of `expected_files`, carry the same filename and the
///   same bytes,
/// - any other part is a failure.
///
/// Afterwards, an expected JSON payload that was never received and every expected file that
/// was never received are reported.
///
/// A missing or malformed boundary, a body that cannot be parsed and read errors abort via
/// [fail_now](TestReporter::fail_now). Everything else is recorded via
/// [fail](TestReporter::fail), so one request can report several problems.
pub fn check_multipart<T>(
    reporter: &dyn TestReporter,
    body: &[u8],
    headers: &HeaderMap,
    expected_json: Option<&T>,
    expected_files: &[ExpectedFile],
) where
    T: Serialize + DeserializeOwned,
{
    let content_type = match headers.get(CONTENT_TYPE).map(|v| v.to_str()) {
        Some(Ok(value)) => value,
        Some(Err(err)) => reporter.fail_now(format!("cannot read Content-Type header: {}", err)),
        None => reporter.fail_now(String::from("multipart body without Content-Type header")),
    };

    let boundary = match parse_boundary(content_type) {
        Ok(boundary) => boundary,
        Err(err) => reporter.fail_now(format!("cannot read multipart boundary: {}", err)),
    };

    let mut reader = MultipartReader::new(body, &boundary);
    let mut json_seen = false;
    let mut files_seen = vec![false; expected_files.len()];

    loop {
        let part = match reader.next_part() {
            Ok(Some(part)) => part,
            Ok(None) => break,
            Err(err) => reporter.fail_now(format!("cannot read multipart body: {}", err)),
        };

        if part.name == PAYLOAD_JSON_PART {
            match expected_json {
                Some(expected) => {
                    check_payload_content_type(reporter, &part);
                    check_json(reporter, part.data, expected);
                    json_seen = true;
                }
                None => reporter.fail(String::from("got JSON payload but none expected")),
            }
            continue;
        }

        if let Some(raw_index) = part.name.strip_prefix(FILE_PART_PREFIX) {
            if let Some(index) = check_file_part(reporter, raw_index, &part, expected_files) {
                files_seen[index] = true;
            }
            continue;
        }

        reporter.fail(format!("unexpected multipart part '{}'", part.name));
    }

    if expected_json.is_some() && !json_seen {
        reporter.fail(String::from("no JSON payload received"));
    }

    let missing: Vec<String> = files_seen
        .iter()
        .enumerate()
        .filter(|(_, seen)| !**seen)
        .map(|(index, _)| index.to_string())
        .collect();

    if !missing.is_empty() {
        reporter.fail(format!("missing files: {}", missing.join(", ")));
    }
}

// Parts without a Content-Type header are accepted.
fn check_payload_content_type(reporter: &dyn TestReporter, part: &Part) {
    if let Some(content_type) = &part.content_type {
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        if !mime.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
            reporter.fail(format!(
                "JSON payload has content type '{}', expected '{}'",
                content_type, JSON_CONTENT_TYPE
            ));
        }
    }
}

/// Runs [check_multipart] on a buffered request.
pub fn check_multipart_request<T>(
    reporter: &dyn TestReporter,
    req: &Request<Bytes>,
    expected_json: Option<&T>,
    expected_files: &[ExpectedFile],
) where
    T: Serialize + DeserializeOwned,
{
    check_multipart(
        reporter,
        req.body(),
        req.headers(),
        expected_json,
        expected_files,
    )
}

// Returns the index of the file if the part refers to an expected file.
fn check_file_part(
    reporter: &dyn TestReporter,
    raw_index: &str,
    part: &Part,
    expected_files: &[ExpectedFile],
) -> Option<usize> {
    let index: usize = match raw_index.parse() {
        Ok(index) => index,
        Err(_) => {
            reporter.fail(format!("invalid file part name '{}'", part.name));
            return None;
        }
    };

    let Some(expected) = expected_files.get(index) else {
        reporter.fail(format!(
            "file index {} is out of range, expected {} file(s)",
            index,
            expected_files.len()
        ));
        return None;
    };

    if part.filename.as_deref() != Some(expected.name.as_str()) {
        reporter.fail(format!(
            "file {}: expected filename '{}', got {:?}",
            index, expected.name, part.filename
        ));
    }

    match compare_streams(expected.content.as_ref(), part.data) {
        Ok(()) => {}
        Err(err @ StreamError::ChunkMismatch { .. }) => {
            reporter.fail(format!("file {} ('{}'): {}", index, expected.name, err))
        }
        Err(err @ StreamError::Io(_)) => {
            reporter.fail_now(format!("file {} ('{}'): {}", index, expected.name, err))
        }
    }

    Some(index)
}
