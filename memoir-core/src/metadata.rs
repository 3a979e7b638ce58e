//! Cache entry metadata and the entry pairing metadata with a payload.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::ArgValue;

/// Metadata stored alongside every cached payload.
///
/// Mutated only at creation and once on recall (the `from_cache` flip);
/// it lives and dies with its entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// When the entry was created.
    #[serde(default)]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// When the entry was last updated.
    #[serde(default)]
    pub last_update_timestamp: Option<DateTime<Utc>>,
    /// Explicit expiry instant, if one was resolved at creation.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Recorded positional arguments (post bound-entity filtering).
    #[serde(default)]
    pub args: Vec<ArgValue>,
    /// Recorded named arguments.
    #[serde(default)]
    pub kwargs: BTreeMap<String, ArgValue>,
    /// Set only when the entry is returned from cache, never at creation.
    #[serde(default)]
    pub from_cache: bool,
    /// Qualified name of the stored payload's type; drives deserialization.
    #[serde(default)]
    pub data_type: Option<String>,
    /// Whether the entry is stored in the flat layout.
    #[serde(default)]
    pub is_flat_data: bool,
}

impl Metadata {
    /// Metadata for a freshly computed entry: both timestamps are `now`,
    /// `from_cache` is false.
    pub fn new_at(now: DateTime<Utc>) -> Self {
        Self {
            creation_timestamp: Some(now),
            last_update_timestamp: Some(now),
            expires_at: None,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            from_cache: false,
            data_type: None,
            is_flat_data: false,
        }
    }

    /// Empty metadata with no timestamps, used when a flat document
    /// arrives without a `_metadata` field.
    pub fn empty() -> Self {
        Self {
            creation_timestamp: None,
            last_update_timestamp: None,
            expires_at: None,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            from_cache: false,
            data_type: None,
            is_flat_data: false,
        }
    }
}

/// A cached entry: metadata plus the payload in transport form.
///
/// The payload is held as a [`serde_json::Value`]; typed reconstruction
/// goes through the type registry using the metadata's `data_type`. Once
/// persisted the backend owns the stored bytes exclusively, and every read
/// reconstructs a fresh entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub metadata: Metadata,
    pub data: Value,
}

impl CacheEntry {
    pub fn new(metadata: Metadata, data: Value) -> Self {
        Self { metadata, data }
    }
}
