//! Integration tests for the file-backed cache backend.

use std::fs;
use std::time::Duration;

use chrono::Utc;
use memoir_core::{CacheEntry, CacheError, CacheSettings, FileCacheSettings, Metadata};
use memoir_storage::{CacheBackend, FileBackend, FileLock};

const KEY: &str = "fetch_weather_a1b2c3d4e5";

fn backend(dir: &std::path::Path) -> FileBackend {
    FileBackend::new(FileCacheSettings::new().with_cache_dir(dir)).unwrap()
}

fn entry(data: serde_json::Value) -> CacheEntry {
    CacheEntry::new(Metadata::new_at(Utc::now()), data)
}

#[test]
fn test_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(dir.path());

    assert!(backend.get(KEY).unwrap().is_none());
    assert!(!backend.exists(KEY).unwrap());

    let stored = entry(serde_json::json!({"city": "oslo", "temperature": -4.5}));
    backend.set(KEY, &stored).unwrap();

    assert!(backend.exists(KEY).unwrap());
    assert_eq!(backend.get(KEY).unwrap(), Some(stored));
}

#[test]
fn test_entry_file_naming() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(dir.path());
    backend.set(KEY, &entry(serde_json::json!(1))).unwrap();
    assert!(dir.path().join(format!("cache_{KEY}.json")).exists());
}

#[test]
fn test_corrupted_file_heals_to_miss() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(dir.path());
    let path = backend.entry_path(KEY);
    fs::write(&path, "{definitely not json").unwrap();

    assert!(backend.get(KEY).unwrap().is_none());
    assert!(!path.exists(), "corrupted file should be removed");

    // The slot is reusable afterwards.
    let stored = entry(serde_json::json!({"ok": true}));
    backend.set(KEY, &stored).unwrap();
    assert_eq!(backend.get(KEY).unwrap(), Some(stored));
}

#[test]
fn test_held_lock_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let settings = FileCacheSettings::new()
        .with_cache_dir(dir.path())
        .with_lock_timeout(Duration::from_millis(250));
    let backend = FileBackend::new(settings).unwrap();
    backend.set(KEY, &entry(serde_json::json!(1))).unwrap();

    let _held = FileLock::acquire(&backend.entry_path(KEY), Duration::from_secs(1)).unwrap();
    let err = backend.get(KEY).unwrap_err();
    assert!(matches!(err, CacheError::LockTimeout { .. }));
    assert!(err.is_recoverable());
}

#[test]
fn test_writes_wait_for_lock_release() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(dir.path());
    let path = backend.entry_path(KEY);

    let held = FileLock::acquire(&path, Duration::from_secs(1)).unwrap();
    let writer = std::thread::spawn({
        let dir = dir.path().to_path_buf();
        move || {
            let backend = FileBackend::new(FileCacheSettings::new().with_cache_dir(dir)).unwrap();
            backend.set(KEY, &entry(serde_json::json!(7)))
        }
    });
    std::thread::sleep(Duration::from_millis(200));
    drop(held);
    writer.join().unwrap().unwrap();
    assert_eq!(
        backend.get(KEY).unwrap().unwrap().data,
        serde_json::json!(7)
    );
}

#[test]
fn test_removed_directory_is_recreated_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let backend = backend(&cache_dir);

    fs::remove_dir_all(&cache_dir).unwrap();
    backend.set(KEY, &entry(serde_json::json!(1))).unwrap();
    assert!(backend.exists(KEY).unwrap());
}

#[test]
fn test_no_temp_files_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(dir.path());
    backend.set(KEY, &entry(serde_json::json!({"n": 1}))).unwrap();
    backend.set(KEY, &entry(serde_json::json!({"n": 2}))).unwrap();

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.ends_with(".tmp") || name.ends_with(".lock"))
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
}

#[test]
fn test_flat_layout_document_shape() {
    let dir = tempfile::tempdir().unwrap();
    let settings = FileCacheSettings::new()
        .with_cache_dir(dir.path())
        .with_base(CacheSettings::new().with_flat_data(true));
    let backend = FileBackend::new(settings).unwrap();

    let mut stored = entry(serde_json::json!({"city": "oslo", "temperature": -4.5}));
    stored.metadata.is_flat_data = true;
    backend.set(KEY, &stored).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(backend.entry_path(KEY)).unwrap()).unwrap();
    assert_eq!(raw["city"], "oslo");
    assert!(raw.get("_metadata").is_some());
    assert!(raw.get("data").is_none());

    assert_eq!(backend.get(KEY).unwrap(), Some(stored));
}

#[test]
fn test_concurrent_writers_leave_a_complete_document() {
    let dir = tempfile::tempdir().unwrap();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let dir = dir.path().to_path_buf();
            std::thread::spawn(move || {
                let backend =
                    FileBackend::new(FileCacheSettings::new().with_cache_dir(dir)).unwrap();
                backend.set(KEY, &entry(serde_json::json!({"writer": i})))
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Last writer wins; the document is whole either way.
    let backend = backend(dir.path());
    let read = backend.get(KEY).unwrap().unwrap();
    assert!(read.data.get("writer").is_some());
}
