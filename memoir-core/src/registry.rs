//! Pluggable type registry for payload serialization.
//!
//! The registry maps concrete payload types to serializers (by `TypeId`)
//! and recorded type names to deserializers. Model types get a generic
//! envelope `{"__model__": <qualified name>, "__data__": <field map>}`
//! registered automatically at encode time; either direction can be
//! overridden per type. Instants are built in, encoded as
//! `{"__datetime__": <ISO-8601>}`.
//!
//! The registry is an owned, explicit object: callers extend their own
//! instance rather than mutating process-global state.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::SerializationError;
use crate::value::qualified_name;

/// Envelope key recording the payload's type name.
pub const MODEL_KEY: &str = "__model__";
/// Envelope key holding the payload's field map.
pub const DATA_KEY: &str = "__data__";
/// Envelope key for instants.
pub const DATETIME_KEY: &str = "__datetime__";

type SerializeFn = Arc<dyn Fn(&dyn Any) -> Result<Value, SerializationError> + Send + Sync>;
type DeserializeFn =
    Arc<dyn Fn(&Value) -> Result<Box<dyn Any + Send>, SerializationError> + Send + Sync>;

/// Registry of per-type serialization behavior.
pub struct TypeRegistry {
    serializers: HashMap<TypeId, SerializeFn>,
    deserializers: HashMap<String, DeserializeFn>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// A registry with the built-in registrations (instants).
    pub fn new() -> Self {
        let mut registry = Self {
            serializers: HashMap::new(),
            deserializers: HashMap::new(),
        };
        registry.register_builtin_datetime();
        registry
    }

    fn register_builtin_datetime(&mut self) {
        self.serializers.insert(
            TypeId::of::<DateTime<Utc>>(),
            Arc::new(|any| {
                let dt = downcast::<DateTime<Utc>>(any)?;
                Ok(serde_json::json!({
                    DATETIME_KEY: dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
                }))
            }),
        );
        self.deserializers.insert(
            qualified_name::<DateTime<Utc>>().to_string(),
            Arc::new(|value| {
                let text = datetime_text(value).ok_or_else(|| SerializationError::Decode {
                    reason: format!("expected a datetime envelope, got {value}"),
                })?;
                let dt = DateTime::parse_from_rfc3339(text)
                    .map_err(|err| SerializationError::Decode {
                        reason: format!("invalid ISO-8601 instant '{text}': {err}"),
                    })?
                    .with_timezone(&Utc);
                Ok(Box::new(dt) as Box<dyn Any + Send>)
            }),
        );
    }

    /// Register the generic envelope serializer/deserializer pair for `T`.
    pub fn register<T>(&mut self)
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let name = qualified_name::<T>();
        self.serializers.insert(
            TypeId::of::<T>(),
            Arc::new(move |any| {
                let value = downcast::<T>(any)?;
                let data = serde_json::to_value(value).map_err(|err| {
                    SerializationError::Encode {
                        reason: format!("cannot serialize {name}: {err}"),
                    }
                })?;
                Ok(serde_json::json!({ MODEL_KEY: name, DATA_KEY: data }))
            }),
        );
        self.deserializers.insert(
            name.to_string(),
            Arc::new(move |value| {
                let data = model_envelope(value).map(|(_, data)| data).unwrap_or(value);
                let typed: T =
                    serde_json::from_value(data.clone()).map_err(|err| {
                        SerializationError::Decode {
                            reason: format!("cannot reconstruct {name}: {err}"),
                        }
                    })?;
                Ok(Box::new(typed) as Box<dyn Any + Send>)
            }),
        );
    }

    /// Override the serializer for `T`.
    pub fn register_serializer<T, F>(&mut self, serializer: F)
    where
        T: 'static,
        F: Fn(&T) -> Result<Value, SerializationError> + Send + Sync + 'static,
    {
        self.serializers.insert(
            TypeId::of::<T>(),
            Arc::new(move |any| serializer(downcast::<T>(any)?)),
        );
    }

    /// Override the deserializer recorded under `type_name`.
    pub fn register_deserializer<T, F>(&mut self, type_name: impl Into<String>, deserializer: F)
    where
        T: Send + 'static,
        F: Fn(&Value) -> Result<T, SerializationError> + Send + Sync + 'static,
    {
        self.deserializers.insert(
            type_name.into(),
            Arc::new(move |value| Ok(Box::new(deserializer(value)?) as Box<dyn Any + Send>)),
        );
    }

    /// Whether `T` has a registered serializer.
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.serializers.contains_key(&TypeId::of::<T>())
    }

    /// Whether a deserializer is registered under `type_name`.
    pub fn is_registered_name(&self, type_name: &str) -> bool {
        self.deserializers.contains_key(type_name)
    }

    /// Encode a payload into transport form.
    ///
    /// Registered types go through their serializer. An unregistered
    /// struct-like type (one that serializes to a field map) is
    /// auto-registered with the generic envelope pair first; scalars and
    /// sequences pass through unchanged.
    pub fn encode<T>(&mut self, value: &T) -> Result<Value, SerializationError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        if let Some(serializer) = self.serializers.get(&TypeId::of::<T>()) {
            return serializer(value as &dyn Any);
        }
        let plain = serde_json::to_value(value).map_err(|err| SerializationError::Encode {
            reason: err.to_string(),
        })?;
        if plain.is_object() {
            self.register::<T>();
            let serializer = self
                .serializers
                .get(&TypeId::of::<T>())
                .expect("just registered");
            return serializer(value as &dyn Any);
        }
        Ok(plain)
    }

    /// Decode a transport value back into `T`.
    ///
    /// A `__model__` envelope resolves through the deserializer registered
    /// under its recorded name; an unregistered name falls back to direct
    /// reconstruction of `T` from the envelope's data, and failure there
    /// surfaces as [`SerializationError::UnresolvableType`] rather than a
    /// silent miss. Without an envelope, a declared `data_type` with a
    /// registered deserializer is preferred; plain serde reconstruction is
    /// the final path.
    pub fn decode<T>(
        &self,
        value: &Value,
        declared_type: Option<&str>,
    ) -> Result<T, SerializationError>
    where
        T: DeserializeOwned + 'static,
    {
        if let Some((recorded_name, data)) = model_envelope(value) {
            if let Some(deserializer) = self.deserializers.get(recorded_name) {
                return downcast_boxed::<T>(deserializer(value)?, recorded_name);
            }
            // Unregistered name: reconstruct directly as the requested type.
            return serde_json::from_value(data.clone()).map_err(|_| {
                SerializationError::UnresolvableType {
                    type_name: recorded_name.to_string(),
                }
            });
        }

        if let Some(name) = declared_type {
            if let Some(deserializer) = self.deserializers.get(name) {
                return downcast_boxed::<T>(deserializer(value)?, name);
            }
        }

        // Datetime envelopes decode through chrono's own serde form; the
        // walk handles envelopes nested inside sequences and mappings.
        serde_json::from_value(strip_datetime_envelopes(value)).map_err(|err| {
            SerializationError::Decode {
                reason: err.to_string(),
            }
        })
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("serializers", &self.serializers.len())
            .field("deserializers", &self.deserializers.keys())
            .finish()
    }
}

fn downcast<T: 'static>(any: &dyn Any) -> Result<&T, SerializationError> {
    any.downcast_ref::<T>()
        .ok_or_else(|| SerializationError::Encode {
            reason: format!(
                "serializer invoked with a value that is not a {}",
                qualified_name::<T>()
            ),
        })
}

fn downcast_boxed<T: 'static>(
    boxed: Box<dyn Any + Send>,
    recorded_name: &str,
) -> Result<T, SerializationError> {
    boxed
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| SerializationError::Decode {
            reason: format!(
                "deserializer for '{recorded_name}' produced a value that is not a {}",
                qualified_name::<T>()
            ),
        })
}

/// Extract `(recorded type name, data)` from a model envelope.
pub fn model_envelope(value: &Value) -> Option<(&str, &Value)> {
    let obj = value.as_object()?;
    let name = obj.get(MODEL_KEY)?.as_str()?;
    let data = obj.get(DATA_KEY)?;
    Some((name, data))
}

/// Recursively replace datetime envelopes with their ISO-8601 strings so
/// serde-driven reconstruction sees the form chrono expects.
fn strip_datetime_envelopes(value: &Value) -> Value {
    if let Some(text) = datetime_text(value) {
        return Value::String(text.to_string());
    }
    match value {
        Value::Array(items) => Value::Array(items.iter().map(strip_datetime_envelopes).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), strip_datetime_envelopes(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Extract the ISO-8601 text from a datetime envelope.
fn datetime_text(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.len() == 1 {
        obj.get(DATETIME_KEY)?.as_str()
    } else {
        None
    }
}

/// Whether a recorded type name denotes a bare primitive/built-in.
///
/// Used by return shaping: primitives do not get metadata attached unless
/// explicitly requested.
pub fn is_primitive_type(name: &str) -> bool {
    matches!(
        name,
        "i8" | "i16"
            | "i32"
            | "i64"
            | "i128"
            | "isize"
            | "u8"
            | "u16"
            | "u32"
            | "u64"
            | "u128"
            | "usize"
            | "f32"
            | "f64"
            | "bool"
            | "char"
            | "str"
            | "&str"
            | "()"
            | "alloc::string::String"
            | "std::string::String"
    )
}
