//! Deterministic cache key derivation.
//!
//! A key is derived from the function's qualified name and the effective
//! (post-filtering) arguments: the canonical `{func_name, args, kwargs}`
//! record is stringified deterministically, hashed with SHA-256, and the
//! final key is `"<function_name>_<hash_prefix>"`. The name prefix keeps
//! keys human-debuggable and namespaces functions away from each other.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::descriptor::CallDescriptor;

/// Length of the hex hash prefix appended to the function name.
const HASH_PREFIX_LEN: usize = 10;

/// Derive the cache key for a call.
///
/// Deterministic: identical function identity, effective arguments, and
/// keying configuration always produce the same key. Arguments excluded by
/// `key_parameters` or bound-entity exclusion do not participate at all.
pub fn generate_key(descriptor: &CallDescriptor) -> String {
    let content = key_content(descriptor);
    let canonical = serde_json::to_string(&content).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!(
        "{}_{}",
        descriptor.function_name(),
        &digest[..HASH_PREFIX_LEN]
    )
}

/// The canonical key-content record. `serde_json` object keys are ordered,
/// and map-valued arguments are pre-sorted, so the stringified record is
/// stable.
fn key_content(descriptor: &CallDescriptor) -> Value {
    let args: Vec<Value> = descriptor
        .key_args()
        .iter()
        .map(|value| value.to_json())
        .collect();
    let kwargs: serde_json::Map<String, Value> = descriptor
        .key_kwargs()
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();

    serde_json::json!({
        "func_name": descriptor.function_name(),
        "args": args,
        "kwargs": kwargs,
    })
}
