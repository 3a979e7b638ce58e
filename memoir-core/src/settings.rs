//! Configuration for cache behavior.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::timeparse::parse_date_string;

/// Which reference clock the expiration policy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeCheck {
    /// Measure entry age from its creation timestamp.
    #[default]
    Creation,
    /// Measure from the last update, falling back to creation.
    LastUpdate,
    /// Compare the current time directly against the explicit expiry.
    ExpiresAt,
}

impl TimeCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeCheck::Creation => "creation",
            TimeCheck::LastUpdate => "last_update",
            TimeCheck::ExpiresAt => "expires_at",
        }
    }
}

impl fmt::Display for TimeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TimeCheck {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "creation" => Ok(TimeCheck::Creation),
            "last_update" => Ok(TimeCheck::LastUpdate),
            "expires_at" => Ok(TimeCheck::ExpiresAt),
            other => Err(ConfigError::InvalidValue {
                field: "time_check".to_string(),
                reason: format!("unknown mode '{other}'"),
            }),
        }
    }
}

/// How long an entry stays fresh: an absolute duration in seconds, or a
/// human-readable expression resolved by the date-expression parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expiration {
    Seconds(f64),
    Expression(String),
}

impl Expiration {
    /// Resolve to an absolute instant relative to `reference`.
    pub fn resolve(&self, reference: DateTime<Utc>) -> Result<DateTime<Utc>, ConfigError> {
        match self {
            Expiration::Seconds(secs) => Duration::try_milliseconds((secs * 1000.0).round() as i64)
                .map(|d| reference + d)
                .ok_or_else(|| ConfigError::InvalidExpiration {
                    expression: secs.to_string(),
                    reason: "duration out of range".to_string(),
                }),
            Expiration::Expression(expr) => parse_date_string(expr, Some(reference)).map_err(
                |err| ConfigError::InvalidExpiration {
                    expression: expr.clone(),
                    reason: err.to_string(),
                },
            ),
        }
    }
}

impl From<f64> for Expiration {
    fn from(secs: f64) -> Self {
        Expiration::Seconds(secs)
    }
}

impl From<i64> for Expiration {
    fn from(secs: i64) -> Self {
        Expiration::Seconds(secs as f64)
    }
}

impl From<&str> for Expiration {
    fn from(expr: &str) -> Self {
        Expiration::Expression(expr.to_string())
    }
}

/// Configuration settings for cache behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// How long entries stay fresh. `None` means entries never expire.
    pub expiration: Option<Expiration>,
    /// Explicit subset of parameter names used for keying. `None` keys on
    /// all arguments.
    pub key_parameters: Option<Vec<String>>,
    /// Which reference clock the expiration policy checks.
    pub time_check: TimeCheck,
    /// Attach metadata to returned values.
    pub return_metadata_as_member: bool,
    /// Attach metadata even when the payload is a bare primitive.
    pub return_metadata_on_primitives: bool,
    /// Store entries in the flat layout (payload fields at top level,
    /// metadata under `_metadata`).
    pub is_flat_data: bool,
    /// Override the type name used for deserialization. Useful when the
    /// stored data predates `data_type` recording.
    pub force_data_type: Option<String>,
    /// Treat a miss as a hard error instead of computing a fresh value.
    pub cache_only: bool,
    /// Exclude the bound entity (method receiver) from key and metadata.
    pub ignore_bound_entity: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            expiration: None,
            key_parameters: None,
            time_check: TimeCheck::Creation,
            return_metadata_as_member: true,
            return_metadata_on_primitives: false,
            is_flat_data: false,
            force_data_type: None,
            cache_only: false,
            ignore_bound_entity: false,
        }
    }
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expiration (seconds or a human expression).
    pub fn with_expiration(mut self, expiration: impl Into<Expiration>) -> Self {
        self.expiration = Some(expiration.into());
        self
    }

    /// Restrict keying to the named parameters.
    pub fn with_key_parameters(mut self, names: Vec<String>) -> Self {
        self.key_parameters = Some(names);
        self
    }

    /// Set the reference clock for expiration checks.
    pub fn with_time_check(mut self, time_check: TimeCheck) -> Self {
        self.time_check = time_check;
        self
    }

    pub fn with_return_metadata_as_member(mut self, enabled: bool) -> Self {
        self.return_metadata_as_member = enabled;
        self
    }

    pub fn with_return_metadata_on_primitives(mut self, enabled: bool) -> Self {
        self.return_metadata_on_primitives = enabled;
        self
    }

    pub fn with_flat_data(mut self, enabled: bool) -> Self {
        self.is_flat_data = enabled;
        self
    }

    pub fn with_force_data_type(mut self, type_name: impl Into<String>) -> Self {
        self.force_data_type = Some(type_name.into());
        self
    }

    pub fn with_cache_only(mut self, enabled: bool) -> Self {
        self.cache_only = enabled;
        self
    }

    pub fn with_ignore_bound_entity(mut self, enabled: bool) -> Self {
        self.ignore_bound_entity = enabled;
        self
    }

    /// Resolve the configured expiration into an absolute expiry instant
    /// relative to `now`. `None` when no expiration is configured.
    pub fn resolve_expires_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ConfigError> {
        self.expiration
            .as_ref()
            .map(|expiration| expiration.resolve(now))
            .transpose()
    }
}

/// Settings for the file-backed cache: the base behavior plus the storage
/// location and lock timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCacheSettings {
    pub base: CacheSettings,
    /// Directory where entry files are stored.
    pub cache_dir: PathBuf,
    /// How long to wait for a file lock before failing.
    pub lock_timeout: StdDuration,
}

impl Default for FileCacheSettings {
    fn default() -> Self {
        Self {
            base: CacheSettings::default(),
            cache_dir: PathBuf::from("cache"),
            lock_timeout: StdDuration::from_secs(10),
        }
    }
}

impl FileCacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: StdDuration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_base(mut self, base: CacheSettings) -> Self {
        self.base = base;
        self
    }
}
