//! End-to-end memoization over the file backend.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use memoir_core::{ArgValue, CacheSettings, CallDescriptor, FileCacheSettings, TimeCheck};
use memoir_storage::{FileBackend, Memoized, Memoizer, Outcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Forecast {
    city: String,
    temperature: f64,
    observed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Error)]
#[error("upstream unavailable")]
struct UpstreamError;

fn forecast() -> Forecast {
    Forecast {
        city: "oslo".to_string(),
        temperature: -4.5,
        observed_at: chrono::Utc::now(),
    }
}

fn memoizer(dir: &std::path::Path, base: CacheSettings) -> Memoizer<FileBackend> {
    let settings = FileCacheSettings::new()
        .with_cache_dir(dir)
        .with_base(base.clone());
    Memoizer::new(FileBackend::new(settings).unwrap(), base)
}

fn descriptor() -> CallDescriptor {
    CallDescriptor::new("weather::forecast").arg("city", "oslo")
}

#[test]
fn test_recall_survives_a_new_memoizer() {
    let dir = tempfile::tempdir().unwrap();
    let calls = AtomicUsize::new(0);
    let compute = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Outcome::<_, UpstreamError>::Success(forecast())
    };

    let first = memoizer(dir.path(), CacheSettings::default())
        .call(&descriptor(), compute)
        .unwrap();
    assert!(!first.from_cache());

    // A fresh memoizer over the same directory, as a second process would
    // construct.
    let second: Memoized<Forecast> = memoizer(dir.path(), CacheSettings::default())
        .call(&descriptor(), compute)
        .unwrap();
    assert!(second.from_cache());
    assert_eq!(second.value(), first.value());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_expiration_window_recomputes_after_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CacheSettings::new()
        .with_expiration(0.3)
        .with_time_check(TimeCheck::Creation);
    let m = memoizer(dir.path(), settings);
    let calls = AtomicUsize::new(0);
    let compute = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Outcome::<_, UpstreamError>::Success(forecast())
    };

    m.call(&descriptor(), compute).unwrap();
    let hit = m.call(&descriptor(), compute).unwrap();
    assert!(hit.from_cache());

    std::thread::sleep(std::time::Duration::from_millis(400));
    let recomputed = m.call(&descriptor(), compute).unwrap();
    assert!(!recomputed.from_cache());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_expiration_expression_sets_expires_at() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CacheSettings::new()
        .with_expiration("2 days")
        .with_time_check(TimeCheck::ExpiresAt);
    let m = memoizer(dir.path(), settings);

    let result = m
        .call(&descriptor(), || {
            Outcome::<_, UpstreamError>::Success(forecast())
        })
        .unwrap();
    let expires_at = result.metadata().unwrap().expires_at.unwrap();
    let delta = expires_at - chrono::Utc::now();
    assert!(delta > chrono::Duration::hours(47));
    assert!(delta <= chrono::Duration::hours(48));
}

#[test]
fn test_flat_data_round_trips_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CacheSettings::new().with_flat_data(true);
    let calls = AtomicUsize::new(0);
    let compute = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Outcome::<_, UpstreamError>::Success(forecast())
    };

    let first = memoizer(dir.path(), CacheSettings::new().with_flat_data(true))
        .call(&descriptor(), compute)
        .unwrap();
    let second: Memoized<Forecast> = memoizer(dir.path(), settings)
        .call(&descriptor(), compute)
        .unwrap();

    assert!(second.from_cache());
    assert_eq!(second.value(), first.value());
    assert!(second.metadata().unwrap().is_flat_data);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_key_parameters_ignore_volatile_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CacheSettings::new().with_key_parameters(vec!["city".to_string()]);
    let m = memoizer(dir.path(), settings);
    let calls = AtomicUsize::new(0);
    let compute = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Outcome::<_, UpstreamError>::Success(forecast())
    };

    m.call(
        &CallDescriptor::new("weather::forecast")
            .arg("city", "oslo")
            .kwarg("request_id", "r-1"),
        compute,
    )
    .unwrap();
    let second = m
        .call(
            &CallDescriptor::new("weather::forecast")
                .arg("city", "oslo")
                .kwarg("request_id", "r-2"),
            compute,
        )
        .unwrap();

    assert!(second.from_cache());
    // Metadata still records the volatile argument of the original call.
    assert_eq!(
        second.metadata().unwrap().kwargs.get("request_id"),
        Some(&ArgValue::from("r-1"))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_recoverable_value_recalled_on_later_failure() {
    let dir = tempfile::tempdir().unwrap();
    let m = memoizer(dir.path(), CacheSettings::default());

    m.call(&descriptor(), || {
        Outcome::Recoverable(forecast(), UpstreamError)
    })
    .unwrap_err();

    let recalled: Memoized<Forecast> = m
        .call(&descriptor(), || {
            Outcome::<_, UpstreamError>::Failure(UpstreamError)
        })
        .unwrap();
    assert!(recalled.from_cache());
}
