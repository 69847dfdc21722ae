use crate::common::reporter::TestReporter;
use bytes::Bytes;
use http::Request;
use std::collections::{BTreeMap, BTreeSet};

/// Query parameters as an ordered multi-value map.
pub type QueryMap = BTreeMap<String, Vec<String>>;

/// Decodes a raw (URL-encoded) query string into a [QueryMap].
pub fn parse_query(query: &str) -> QueryMap {
    let mut map = QueryMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        map.entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    map
}

/// Checks the actual query parameters against the expected ones.
///
/// - every actual field with at least one value must be expected with the exact same value
///   list, unexpected fields are reported one by one,
/// - actual fields without values are ignored,
/// - every expected field must be present.
///
/// All findings are recorded via [fail](TestReporter::fail).
pub fn check_query(reporter: &dyn TestReporter, expected: &QueryMap, actual: &QueryMap) {
    let mut missing: BTreeSet<&String> = expected.keys().collect();

    for (name, values) in actual {
        if values.is_empty() {
            continue;
        }

        match expected.get(name) {
            None => reporter.fail(format!(
                "unexpected query field '{}' with values {:?}",
                name, values
            )),
            Some(expected_values) => {
                missing.remove(name);
                if expected_values != values {
                    reporter.fail(format!(
                        "query field '{}' does not match: expected {:?}, got {:?}",
                        name, expected_values, values
                    ));
                }
            }
        }
    }

    for name in missing {
        reporter.fail(format!("missing query field '{}'", name));
    }
}

/// Runs [check_query] on the query string of a buffered request.
pub fn check_request_query(
    reporter: &dyn TestReporter,
    req: &Request<Bytes>,
    expected: &QueryMap,
) {
    let actual = parse_query(req.uri().query().unwrap_or_default());
    check_query(reporter, expected, &actual)
}
