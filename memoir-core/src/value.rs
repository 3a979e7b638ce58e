//! Canonical argument values for cache key derivation and metadata capture.
//!
//! Cache keys must be deterministic and collision-resistant, so every call
//! argument is converted into an [`ArgValue`]: a canonical, hashable
//! representation with stable ordering. Primitives pass through unchanged,
//! sequences keep their order, mappings are sorted by key (order-independent),
//! types canonicalize to their qualified name, and arbitrary object instances
//! canonicalize to `"<type>#<identity>"` when identity-sensitivity is
//! requested.
//!
//! Identity-sensitivity is a deliberate feature: two structurally-equal but
//! distinct instances of a non-primitive type produce different keys unless
//! the caller opts out, enabling per-instance caching.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Reserved envelope key for instants.
const DATETIME_KEY: &str = "__datetime__";
/// Reserved envelope key for type references.
const TYPE_KEY: &str = "__type__";
/// Reserved envelope keys for object instances.
const INSTANCE_KEY: &str = "__instance__";
const IDENTITY_KEY: &str = "__identity__";
/// Reserved envelope key for raw bytes (hex encoded).
const BYTES_KEY: &str = "__bytes__";

/// Canonical, order-stable representation of a call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// A timezone-aware instant, kept distinct from strings so it
    /// round-trips as an instant.
    Instant(DateTime<Utc>),
    /// Ordered sequence of canonicalized elements.
    Seq(Vec<ArgValue>),
    /// Mapping as a sorted sequence of (key, value) pairs. Sorting makes
    /// the representation order-independent.
    Map(Vec<(String, ArgValue)>),
    /// A class/type value, canonicalized to its qualified name.
    Type { name: String },
    /// An arbitrary object instance. With `identity` set the value is
    /// identity-sensitive; without, it is keyed by type name alone.
    Instance {
        type_name: String,
        identity: Option<u64>,
    },
}

impl ArgValue {
    /// Build a map value, normalizing pair order by key.
    pub fn map<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, ArgValue)>,
    {
        // BTreeMap both sorts and deduplicates (last entry wins), matching
        // JSON object semantics.
        let pairs: std::collections::BTreeMap<String, ArgValue> = pairs.into_iter().collect();
        ArgValue::Map(pairs.into_iter().collect())
    }

    /// Canonicalize a reference to an arbitrary object, identity-sensitive.
    ///
    /// The identity is derived from the referenced address, so two distinct
    /// live instances of the same type produce different values.
    pub fn instance_of<T>(value: &T) -> Self {
        ArgValue::Instance {
            type_name: qualified_name::<T>().to_string(),
            identity: Some(value as *const T as usize as u64),
        }
    }

    /// Canonicalize an object by its type alone (identity-insensitive).
    pub fn instance_of_type<T: ?Sized>() -> Self {
        ArgValue::Instance {
            type_name: qualified_name::<T>().to_string(),
            identity: None,
        }
    }

    /// Canonicalize a type value to its qualified name.
    pub fn type_of<T: ?Sized>() -> Self {
        ArgValue::Type {
            name: qualified_name::<T>().to_string(),
        }
    }

    /// Deterministic string form used by the key generator. Maps are
    /// already sorted and `serde_json` orders object keys, so equal values
    /// always stringify identically.
    pub fn canonical_string(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_default()
    }

    /// Convert to the transport JSON representation.
    ///
    /// Instants, types, instances and bytes use reserved single-key
    /// envelopes so they survive a JSON round-trip unambiguously.
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Null => Value::Null,
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::Int(i) => Value::from(*i),
            ArgValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ArgValue::Str(s) => Value::String(s.clone()),
            ArgValue::Bytes(b) => {
                serde_json::json!({ BYTES_KEY: hex::encode(b) })
            }
            ArgValue::Instant(dt) => {
                serde_json::json!({ DATETIME_KEY: dt.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
            }
            ArgValue::Seq(items) => Value::Array(items.iter().map(ArgValue::to_json).collect()),
            ArgValue::Map(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            ArgValue::Type { name } => serde_json::json!({ TYPE_KEY: name }),
            ArgValue::Instance {
                type_name,
                identity,
            } => serde_json::json!({ INSTANCE_KEY: type_name, IDENTITY_KEY: identity }),
        }
    }

    /// Reconstruct from the transport JSON representation. Total: every
    /// JSON value maps to some `ArgValue`.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ArgValue::Null,
            Value::Bool(b) => ArgValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ArgValue::Int(i)
                } else {
                    ArgValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => ArgValue::Str(s.clone()),
            Value::Array(items) => ArgValue::Seq(items.iter().map(ArgValue::from_json).collect()),
            Value::Object(obj) => {
                if let Some(env) = decode_envelope(obj) {
                    return env;
                }
                ArgValue::map(
                    obj.iter()
                        .map(|(k, v)| (k.clone(), ArgValue::from_json(v))),
                )
            }
        }
    }
}

/// Try to decode a reserved envelope object; None means a plain mapping.
fn decode_envelope(obj: &serde_json::Map<String, Value>) -> Option<ArgValue> {
    if obj.len() == 1 {
        if let Some(Value::String(s)) = obj.get(DATETIME_KEY) {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(ArgValue::Instant(dt.with_timezone(&Utc)));
            }
        }
        if let Some(Value::String(name)) = obj.get(TYPE_KEY) {
            return Some(ArgValue::Type { name: name.clone() });
        }
        if let Some(Value::String(s)) = obj.get(BYTES_KEY) {
            if let Ok(bytes) = hex::decode(s) {
                return Some(ArgValue::Bytes(bytes));
            }
        }
    }
    if obj.len() == 2 {
        if let (Some(Value::String(type_name)), Some(identity)) =
            (obj.get(INSTANCE_KEY), obj.get(IDENTITY_KEY))
        {
            let identity = match identity {
                Value::Null => None,
                Value::Number(n) => n.as_u64(),
                _ => return None,
            };
            return Some(ArgValue::Instance {
                type_name: type_name.clone(),
                identity,
            });
        }
    }
    None
}

/// Qualified name of a type, used for canonicalization and `data_type`
/// metadata.
pub fn qualified_name<T: ?Sized>() -> &'static str {
    std::any::type_name::<T>()
}

impl Serialize for ArgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(ArgValue::from_json(&value))
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

impl From<DateTime<Utc>> for ArgValue {
    fn from(v: DateTime<Utc>) -> Self {
        ArgValue::Instant(v)
    }
}

impl<T: Into<ArgValue>> From<Vec<T>> for ArgValue {
    fn from(v: Vec<T>) -> Self {
        ArgValue::Seq(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => ArgValue::Null,
        }
    }
}
