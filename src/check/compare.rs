use assert_json_diff::{assert_json_matches_no_panic, CompareMode, Config};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot convert value to its JSON representation: {0}")]
    Encode(serde_json::Error),
    #[error("cannot restore value from its JSON representation: {0}")]
    Decode(serde_json::Error),
    #[error("values are not equal (lhs = actual, rhs = expected):\n{0}")]
    Mismatch(String),
}

/// Brings an expected value into the shape a decoded value of the same type would have.
///
/// The value is encoded and decoded again through `T`, exactly like a request body travels
/// over the wire. Every `Option<Nullable<_>>` holding `Nullable::Null` comes back as `None`,
/// which is what decoding produces for both an explicit `null` and an omitted field, and
/// the same happens in nested structs, sequences and maps. The caller's value is not
/// touched.
///
/// As a consequence a check cannot tell whether a field was sent as `null` or omitted.
pub fn normalize_expected<T>(expected: &T) -> Result<Value, Error>
where
    T: Serialize + DeserializeOwned,
{
    let encoded = serde_json::to_value(expected).map_err(Error::Encode)?;
    let decoded: T = serde_json::from_value(encoded).map_err(Error::Decode)?;
    serde_json::to_value(&decoded).map_err(Error::Encode)
}

/// Deep-compares two JSON trees. Object member order is irrelevant, array order is not.
pub fn structural_diff(expected: &Value, actual: &Value) -> Result<(), Error> {
    assert_json_matches_no_panic(actual, expected, Config::new(CompareMode::Strict))
        .map_err(Error::Mismatch)
}

/// Compares a decoded value with an expected one of the same type, normalizing the expected
/// side first.
pub fn compare<T>(expected: &T, actual: &T) -> Result<(), Error>
where
    T: Serialize + DeserializeOwned,
{
    let expected = normalize_expected(expected)?;
    let actual = serde_json::to_value(actual).map_err(Error::Encode)?;
    structural_diff(&expected, &actual)
}
