//! Entry codec: cache entries to/from their stored document form.
//!
//! Two layouts exist. The nested (default) layout wraps the entry as
//! `{"metadata": …, "data": …}`. The flat layout hoists the payload's own
//! field map to the top level and attaches the metadata under the reserved
//! `_metadata` key, for payload types that must present without an envelope
//! wrapper (the document-store backend's native query shape).

use serde_json::Value;

use crate::error::SerializationError;
use crate::metadata::{CacheEntry, Metadata};
use crate::registry::model_envelope;
use crate::settings::CacheSettings;

/// Reserved top-level key carrying metadata in the flat layout.
pub const FLAT_METADATA_KEY: &str = "_metadata";

/// Codec configured with the layout-affecting settings.
#[derive(Debug, Clone, Default)]
pub struct EntryCodec {
    is_flat_data: bool,
    force_data_type: Option<String>,
}

impl EntryCodec {
    pub fn new(is_flat_data: bool, force_data_type: Option<String>) -> Self {
        Self {
            is_flat_data,
            force_data_type,
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.is_flat_data, settings.force_data_type.clone())
    }

    /// Serialize an entry to its stored text form.
    pub fn serialize(&self, entry: &CacheEntry) -> Result<String, SerializationError> {
        let document = self.to_document(entry)?;
        serde_json::to_string(&document).map_err(|err| SerializationError::Encode {
            reason: err.to_string(),
        })
    }

    /// Build the stored document for an entry.
    pub fn to_document(&self, entry: &CacheEntry) -> Result<Value, SerializationError> {
        if self.is_flat_data || entry.metadata.is_flat_data {
            return self.to_flat_document(entry);
        }
        serde_json::to_value(entry).map_err(|err| SerializationError::Encode {
            reason: err.to_string(),
        })
    }

    fn to_flat_document(&self, entry: &CacheEntry) -> Result<Value, SerializationError> {
        // A model envelope flattens to its field map; anything else must
        // already be a mapping.
        let fields = match model_envelope(&entry.data) {
            Some((_, data)) => data.as_object(),
            None => entry.data.as_object(),
        };
        let mut fields = fields
            .ok_or_else(|| SerializationError::Encode {
                reason: "flat layout requires a mapping payload".to_string(),
            })?
            .clone();

        let metadata = serde_json::to_value(&entry.metadata).map_err(|err| {
            SerializationError::Encode {
                reason: err.to_string(),
            }
        })?;
        fields.insert(FLAT_METADATA_KEY.to_string(), metadata);
        Ok(Value::Object(fields))
    }

    /// Deserialize an entry from stored text.
    ///
    /// Structurally invalid text fails with a parse error carrying the
    /// offending content.
    pub fn deserialize(&self, text: &str) -> Result<CacheEntry, SerializationError> {
        let document: Value =
            serde_json::from_str(text).map_err(|err| SerializationError::MalformedDocument {
                content: text.to_string(),
                reason: err.to_string(),
            })?;
        self.from_document(document)
    }

    /// Reconstruct an entry from an already-structured document, as a
    /// document-store backend would hand over.
    pub fn from_document(&self, document: Value) -> Result<CacheEntry, SerializationError> {
        if self.is_flat_data {
            return self.from_flat_document(document);
        }

        let content = document.to_string();
        let mut entry: CacheEntry =
            serde_json::from_value(document).map_err(|err| {
                SerializationError::MalformedDocument {
                    content,
                    reason: err.to_string(),
                }
            })?;
        if let Some(forced) = &self.force_data_type {
            entry.metadata.data_type = Some(forced.clone());
        }
        Ok(entry)
    }

    fn from_flat_document(&self, document: Value) -> Result<CacheEntry, SerializationError> {
        let content = document.to_string();
        let Value::Object(mut fields) = document else {
            return Err(SerializationError::MalformedDocument {
                content,
                reason: "flat document is not a mapping".to_string(),
            });
        };

        let mut metadata = match fields.remove(FLAT_METADATA_KEY) {
            Some(raw) => serde_json::from_value(raw).map_err(|err| {
                SerializationError::MalformedDocument {
                    content,
                    reason: format!("invalid _metadata: {err}"),
                }
            })?,
            None => Metadata::empty(),
        };
        if let Some(forced) = &self.force_data_type {
            metadata.data_type = Some(forced.clone());
        }
        metadata.is_flat_data = true;

        Ok(CacheEntry::new(metadata, Value::Object(fields)))
    }
}
