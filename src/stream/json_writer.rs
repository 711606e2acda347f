use crate::error::{Error, Result};
use crate::plist::Plist;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::SecondsFormat;
use serde_json::{Map, Number, Value};

/// How plist types without a JSON counterpart are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonPolicy {
    /// Dates become RFC 3339 strings in UTC, data becomes padded base64 and
    /// UIDs become `{"CF$UID": n}`.
    #[default]
    Convert,
    /// Dates, data and UIDs fail with [`Error::UnsupportedType`].
    Reject,
}

pub trait JsonWriter {
    fn convert_json(&self, policy: JsonPolicy) -> Result<Value>;

    /// The whole tree as a `serde_json::Value`. Error paths start at `$`.
    fn to_json_value(&self, policy: JsonPolicy) -> Result<Value> {
        self.convert_json(policy)
            .map_err(|err| within(err, || "$".to_string()))
    }

    /// Compact JSON text. Nothing is returned unless every value converted.
    fn to_json_string(&self, policy: JsonPolicy) -> Result<String> {
        let value = self.to_json_value(policy)?;
        Ok(serde_json::to_string(&value)?)
    }
}

impl JsonWriter for Plist {
    fn convert_json(&self, policy: JsonPolicy) -> Result<Value> {
        let value = match self {
            Plist::Dictionary(dict) => {
                let mut object = Map::with_capacity(dict.len());
                for (key, item) in dict {
                    let item = item
                        .convert_json(policy)
                        .map_err(|err| within(err, || format!(".{}", key)))?;
                    object.insert(key.clone(), item);
                }
                Value::Object(object)
            }
            Plist::Array(list) => {
                let mut array = Vec::with_capacity(list.len());
                for (index, item) in list.iter().enumerate() {
                    let item = item
                        .convert_json(policy)
                        .map_err(|err| within(err, || format!("[{}]", index)))?;
                    array.push(item);
                }
                Value::Array(array)
            }
            Plist::String(value) => Value::String(value.clone()),
            Plist::Boolean(value) => Value::Bool(*value),
            Plist::Integer(value) => {
                let number = i64::try_from(*value)
                    .map(Number::from)
                    .or_else(|_| u64::try_from(*value).map(Number::from))
                    .map_err(|_| unsupported("integer outside the 64-bit range"))?;
                Value::Number(number)
            }
            Plist::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .ok_or_else(|| unsupported("non-finite real"))?,
            Plist::Date(_) | Plist::Data(_) | Plist::Uid(_) if policy == JsonPolicy::Reject => {
                return Err(unsupported(self.kind()));
            }
            Plist::Date(date) => Value::String(date.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Plist::Data(bytes) => Value::String(STANDARD.encode(bytes)),
            Plist::Uid(uid) => {
                let mut object = Map::new();
                object.insert("CF$UID".to_string(), Value::from(*uid));
                Value::Object(object)
            }
        };
        Ok(value)
    }
}

fn unsupported(kind: &'static str) -> Error {
    Error::UnsupportedType {
        kind,
        path: String::new(),
    }
}

// Paths are assembled on the way out of the recursion, so the happy path
// never formats them.
fn within(err: Error, segment: impl FnOnce() -> String) -> Error {
    match err {
        Error::UnsupportedType { kind, path } => Error::UnsupportedType {
            kind,
            path: segment() + &path,
        },
        other => other,
    }
}
