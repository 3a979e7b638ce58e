//! Expiration policy: a pure freshness decision over entry metadata.

use chrono::{DateTime, Utc};

use crate::error::ConfigError;
use crate::metadata::Metadata;
use crate::settings::{CacheSettings, TimeCheck};

/// Decide whether a cached entry is still fresh at `now`.
///
/// - No expiration configured: always valid.
/// - `Creation`/`LastUpdate`: the configured duration or expression is
///   applied to the reference timestamp; an absent reference cannot be
///   judged and counts as valid.
/// - `ExpiresAt`: `now` is compared directly against the recorded expiry;
///   a null expiry never expires.
///
/// An invalid expiration expression is a configuration error and surfaces
/// rather than being treated as stale.
pub fn is_valid(
    metadata: &Metadata,
    now: DateTime<Utc>,
    settings: &CacheSettings,
) -> Result<bool, ConfigError> {
    let Some(expiration) = &settings.expiration else {
        return Ok(true);
    };

    let reference = match settings.time_check {
        TimeCheck::Creation => metadata.creation_timestamp,
        TimeCheck::LastUpdate => metadata
            .last_update_timestamp
            .or(metadata.creation_timestamp),
        TimeCheck::ExpiresAt => {
            return Ok(match metadata.expires_at {
                Some(expires_at) => now < expires_at,
                None => true,
            });
        }
    };

    let Some(reference) = reference else {
        return Ok(true);
    };

    let expiration_instant = expiration.resolve(reference)?;
    Ok(now < expiration_instant)
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    proptest! {
        /// For creation-referenced expiry, validity is monotone: valid at
        /// creation, invalid at any instant past creation + duration.
        #[test]
        fn prop_expiration_monotonic(
            duration_secs in 1i64..1_000_000,
            after_secs in 0i64..1_000_000,
        ) {
            let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let md = Metadata::new_at(created);
            let settings = CacheSettings::new().with_expiration(duration_secs);

            prop_assert!(is_valid(&md, created, &settings).unwrap());
            let past_expiry = created
                + Duration::seconds(duration_secs)
                + Duration::seconds(after_secs);
            prop_assert!(!is_valid(&md, past_expiry, &settings).unwrap());
        }
    }
}
