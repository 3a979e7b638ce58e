//! MEMOIR core - data types and algorithms for the memoization engine.
//!
//! This crate holds everything that is independent of a storage medium:
//! canonical argument values, call descriptors, deterministic key
//! derivation, the pluggable type registry, the entry codec, the
//! expiration policy, and the human date-expression parser. Storage
//! backends and the call wrapper live in `memoir-storage`.

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod expiry;
pub mod key;
pub mod metadata;
pub mod registry;
pub mod settings;
pub mod timeparse;
pub mod value;

pub use codec::{EntryCodec, FLAT_METADATA_KEY};
pub use descriptor::CallDescriptor;
pub use error::{CacheError, CacheResult, ConfigError, SerializationError, TimeParseError};
pub use expiry::is_valid;
pub use key::generate_key;
pub use metadata::{CacheEntry, Metadata};
pub use registry::{is_primitive_type, TypeRegistry};
pub use settings::{CacheSettings, Expiration, FileCacheSettings, TimeCheck};
pub use timeparse::parse_date_string;
pub use value::{qualified_name, ArgValue};
