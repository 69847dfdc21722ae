use crate::common::reporter::TestReporter;
use http::{HeaderMap, HeaderValue};

/// Checks that every expected header value is present in the actual headers.
///
/// This is a containment check: the actual headers may carry additional headers and
/// additional values for expected headers.
pub fn check_header(reporter: &dyn TestReporter, expected: &HeaderMap, actual: &HeaderMap) {
    for name in expected.keys() {
        let actual_values: Vec<&HeaderValue> = actual.get_all(name).iter().collect();

        for value in expected.get_all(name) {
            if !actual_values.contains(&value) {
                reporter.fail(format!(
                    "header '{}': expected value {:?} not found in {:?}",
                    name, value, actual_values
                ));
            }
        }
    }
}
