use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A JSON value that can be explicitly set to `null`.
///
/// Chat API payloads use three states for updatable fields: the field is omitted (leave the
/// value unchanged), the field is `null` (clear the value), or the field holds a value.
/// Request types model this as `Option<Nullable<T>>`, usually combined with
/// `#[serde(default, skip_serializing_if = "Option::is_none")]`:
///
/// | Rust value                     | Wire representation |
/// |--------------------------------|---------------------|
/// | `None`                         | field omitted       |
/// | `Some(Nullable::Null)`         | `null`              |
/// | `Some(Nullable::Value(v))`     | `v`                 |
///
/// Decoding does not preserve the middle row: serde decodes `null` into an `Option` as
/// `None`. The JSON checks account for this, see [check_json](crate::check_json).
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Nullable<T> {
    Null,
    Value(T),
}

pub type NullableBool = Nullable<bool>;
pub type NullableUint = Nullable<u64>;
pub type NullableInt = Nullable<i64>;
pub type NullableString = Nullable<String>;

impl<T> Nullable<T> {
    pub fn is_null(&self) -> bool {
        matches!(self, Nullable::Null)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Nullable::Null => None,
            Nullable::Value(v) => Some(v),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Nullable::Null => None,
            Nullable::Value(v) => Some(v),
        }
    }
}

impl<T> Default for Nullable<T> {
    fn default() -> Self {
        Nullable::Null
    }
}

impl<T> From<T> for Nullable<T> {
    fn from(value: T) -> Self {
        Nullable::Value(value)
    }
}

impl From<&str> for Nullable<String> {
    fn from(value: &str) -> Self {
        Nullable::Value(value.to_string())
    }
}

impl<T: fmt::Debug> fmt::Debug for Nullable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nullable::Null => f.write_str("null"),
            Nullable::Value(v) => v.fmt(f),
        }
    }
}

impl<T: Serialize> Serialize for Nullable<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Nullable::Null => serializer.serialize_none(),
            Nullable::Value(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Nullable<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => Nullable::Null,
            Some(v) => Nullable::Value(v),
        })
    }
}
